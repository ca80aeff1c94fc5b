mod app_tray;
mod cli;
mod commands;
mod config;
mod core;
mod popup;
mod state;

use std::sync::Mutex;

use tauri::{Manager, RunEvent, WindowEvent};

use crate::core::ai::AiClient;
use crate::core::sessions::SessionRegistry;
use crate::core::{hotkeys, runtime};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let initial_action = cli::parse_cli_action(&std::env::args().collect::<Vec<_>>());

    tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, argv, _cwd| {
            if let Some(action) = cli::parse_cli_action(&argv) {
                cli::handle_action(app, action);
            }
        }))
        .plugin(tauri_plugin_global_shortcut::Builder::new().build())
        .manage(Mutex::new(state::AppState::load()))
        .manage(Mutex::new(hotkeys::HotkeyState::default()))
        .manage(SessionRegistry::new())
        .manage(AiClient::new())
        .setup(move |app| {
            let handle = app.handle().clone();
            app_tray::setup_tray(&handle)?;

            let session = runtime::detect_session_type();
            if !runtime::hotkeys_supported(session) {
                log::warn!("global hotkeys are not supported in this session type");
            }

            let config = {
                let state = app.state::<Mutex<state::AppState>>();
                let guard = state.lock().expect("state lock poisoned");
                guard.config.clone()
            };
            hotkeys::sync(&handle, &config);

            if let Some(action) = initial_action {
                cli::handle_action(&handle, action);
            }
            Ok(())
        })
        .on_window_event(|window, event| {
            if let WindowEvent::Focused(focused) = event {
                popup::handle_focus_change(window.app_handle(), window.label(), *focused);
            } else {
                app_tray::handle_window_event(window, event);
            }
        })
        .invoke_handler(tauri::generate_handler![
            commands::load_config,
            commands::save_config,
            commands::export_config,
            commands::import_config,
            commands::show_popup_window,
            commands::hide_popup_window,
            commands::resize_popup_window,
            commands::set_popup_pinned,
            commands::is_popup_pinned,
            commands::get_captured_text,
            commands::take_screenshot,
            commands::capture_screenshot_region,
            commands::get_screenshots,
            commands::clear_screenshots,
            commands::remove_screenshot,
            commands::show_screenshot_selector,
            commands::replace_text_in_source,
            commands::stream_ai_response,
        ])
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|app, event| {
            if let RunEvent::ExitRequested { .. } = event {
                app.state::<SessionRegistry>().cancel_all();
                hotkeys::unregister_all(app);
            }
        });
}
