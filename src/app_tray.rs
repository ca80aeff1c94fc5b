use tauri::menu::{Menu, MenuItem, PredefinedMenuItem};
use tauri::tray::{MouseButton, MouseButtonState, TrayIconBuilder, TrayIconEvent};
use tauri::{AppHandle, Window, WindowEvent};

use crate::cli;

const TRAY_ID: &str = "main";
const MENU_POPUP_ID: &str = "tray_popup";
const MENU_SETTINGS_ID: &str = "tray_settings";
const MENU_QUIT_ID: &str = "tray_quit";

pub fn setup_tray(app: &AppHandle) -> Result<(), String> {
    let popup_item = MenuItem::with_id(app, MENU_POPUP_ID, "Open Popup", true, None::<&str>)
        .map_err(|err| err.to_string())?;
    let settings_item = MenuItem::with_id(app, MENU_SETTINGS_ID, "Settings", true, None::<&str>)
        .map_err(|err| err.to_string())?;
    let quit_item = MenuItem::with_id(app, MENU_QUIT_ID, "Quit", true, None::<&str>)
        .map_err(|err| err.to_string())?;
    let separator = PredefinedMenuItem::separator(app).map_err(|err| err.to_string())?;

    let menu = Menu::with_items(app, &[&popup_item, &separator, &settings_item, &quit_item])
        .map_err(|err| err.to_string())?;

    let icon = tauri::image::Image::from_bytes(include_bytes!("../icons/icon.png"))
        .map_err(|err| err.to_string())?;

    TrayIconBuilder::with_id(TRAY_ID)
        .icon(icon)
        .menu(&menu)
        .tooltip("AskAnywhere")
        .show_menu_on_left_click(false)
        .on_menu_event(|app, event| handle_menu_event(app, event))
        .on_tray_icon_event(|tray, event| handle_tray_event(tray, event))
        .build(app)
        .map_err(|err| err.to_string())?;

    Ok(())
}

fn handle_menu_event(app: &AppHandle, event: tauri::menu::MenuEvent) {
    match event.id().as_ref() {
        MENU_POPUP_ID => cli::handle_action(app, cli::CliAction::Popup),
        MENU_SETTINGS_ID => cli::handle_action(app, cli::CliAction::ShowSettings),
        MENU_QUIT_ID => cli::handle_action(app, cli::CliAction::Quit),
        _ => {}
    }
}

fn handle_tray_event(tray: &tauri::tray::TrayIcon, event: TrayIconEvent) {
    if let TrayIconEvent::Click {
        button,
        button_state,
        ..
    } = event
    {
        if button == MouseButton::Left && button_state == MouseButtonState::Up {
            cli::handle_action(tray.app_handle(), cli::CliAction::ShowSettings);
        }
    }
}

/// The settings window closes to the tray instead of exiting the app.
pub fn handle_window_event(window: &Window, event: &WindowEvent) {
    if window.label() != "main" {
        return;
    }
    if let WindowEvent::CloseRequested { api, .. } = event {
        let _ = window.hide();
        api.prevent_close();
    }
}
