use std::sync::Mutex;

use futures::StreamExt;
use serde::Serialize;
use tauri::{AppHandle, Emitter, State, Window};

use crate::config::{AppConfig, PostAction};
use crate::core::sessions::SessionRegistry;
use crate::core::{ai, automation, hotkeys, screenshot, storage};
use crate::popup;
use crate::state::AppState;

#[derive(Clone, Serialize)]
struct ChunkEvent {
    session_id: u64,
    content: String,
}

#[derive(Clone, Serialize)]
struct StreamErrorEvent {
    session_id: u64,
    message: String,
}

#[derive(Clone, Serialize)]
struct StreamDoneEvent {
    session_id: u64,
}

#[derive(Clone, Serialize)]
struct TriggerReplaceEvent {
    session_id: u64,
}

#[tauri::command]
pub fn load_config(state: State<'_, Mutex<AppState>>) -> Result<AppConfig, String> {
    let guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    Ok(guard.config.clone())
}

#[tauri::command]
pub fn save_config(
    app: AppHandle,
    state: State<'_, Mutex<AppState>>,
    config: AppConfig,
) -> Result<(), String> {
    config.validate()?;

    {
        let mut guard = state
            .lock()
            .map_err(|_| "state lock poisoned".to_string())?;
        storage::save_config(&guard.config_path, &config)?;
        guard.config = config.clone();
    }

    hotkeys::sync(&app, &config);
    popup::apply_config_geometry(&app);
    let _ = app.emit("config-updated", config);
    Ok(())
}

#[tauri::command]
pub fn export_config(state: State<'_, Mutex<AppState>>) -> Result<String, String> {
    let guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    serde_json::to_string_pretty(&guard.config).map_err(|err| err.to_string())
}

#[tauri::command]
pub fn import_config(
    app: AppHandle,
    state: State<'_, Mutex<AppState>>,
    json: String,
) -> Result<(), String> {
    let imported: AppConfig =
        serde_json::from_str(&json).map_err(|err| format!("Invalid config: {err}"))?;

    let merged = {
        let guard = state
            .lock()
            .map_err(|_| "state lock poisoned".to_string())?;
        let mut merged = guard.config.clone();
        merged.merge_import(imported);
        merged
    };
    merged.validate()?;

    {
        let mut guard = state
            .lock()
            .map_err(|_| "state lock poisoned".to_string())?;
        storage::save_config(&guard.config_path, &merged)?;
        guard.config = merged.clone();
    }

    hotkeys::sync(&app, &merged);
    popup::apply_config_geometry(&app);
    let _ = app.emit("config-updated", merged);
    Ok(())
}

#[tauri::command]
pub async fn show_popup_window(app: AppHandle) -> Result<(), String> {
    popup::show_popup(&app)
}

#[tauri::command]
pub async fn hide_popup_window(
    app: AppHandle,
    registry: State<'_, SessionRegistry>,
) -> Result<(), String> {
    registry.cancel_active_unless_replacing();
    popup::hide_popup(&app)
}

#[tauri::command]
pub async fn resize_popup_window(app: AppHandle, width: f64, height: f64) -> Result<(), String> {
    popup::resize_popup(&app, width, height)
}

#[tauri::command]
pub fn set_popup_pinned(state: State<'_, Mutex<AppState>>, pinned: bool) -> Result<(), String> {
    let mut guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    guard.popup_pinned = pinned;
    Ok(())
}

#[tauri::command]
pub fn is_popup_pinned(state: State<'_, Mutex<AppState>>) -> Result<bool, String> {
    let guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    Ok(guard.popup_pinned)
}

#[tauri::command]
pub fn get_captured_text(state: State<'_, Mutex<AppState>>) -> Result<String, String> {
    let guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    Ok(guard.captured.text.clone())
}

#[tauri::command]
pub async fn take_screenshot(state: State<'_, Mutex<AppState>>) -> Result<String, String> {
    let uri = screenshot::capture_full().await?;

    let mut guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    guard.captured.screenshots.push(uri.clone());
    Ok(uri)
}

#[tauri::command]
pub async fn capture_screenshot_region(
    state: State<'_, Mutex<AppState>>,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
) -> Result<String, String> {
    let uri = screenshot::capture_region(x, y, width, height).await?;

    let mut guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    guard.captured.screenshots.push(uri.clone());
    Ok(uri)
}

#[tauri::command]
pub fn get_screenshots(state: State<'_, Mutex<AppState>>) -> Result<Vec<String>, String> {
    let guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    Ok(guard.captured.screenshots.clone())
}

#[tauri::command]
pub fn clear_screenshots(state: State<'_, Mutex<AppState>>) -> Result<(), String> {
    let mut guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    guard.captured.screenshots.clear();
    Ok(())
}

#[tauri::command]
pub fn remove_screenshot(state: State<'_, Mutex<AppState>>, index: usize) -> Result<(), String> {
    let mut guard = state
        .lock()
        .map_err(|_| "state lock poisoned".to_string())?;
    if index >= guard.captured.screenshots.len() {
        return Err(format!("No screenshot at index {index}"));
    }
    guard.captured.screenshots.remove(index);
    Ok(())
}

#[tauri::command]
pub async fn show_screenshot_selector(app: AppHandle) -> Result<(), String> {
    popup::show_screenshot_selector(&app)
}

/// The replace flow: hide the popup so focus falls back to the origin
/// window, then write the clipboard and synthesize a paste there.
#[tauri::command]
pub async fn replace_text_in_source(
    app: AppHandle,
    state: State<'_, Mutex<AppState>>,
    registry: State<'_, SessionRegistry>,
    text: String,
) -> Result<(), String> {
    let (origin, gate) = {
        let guard = state
            .lock()
            .map_err(|_| "state lock poisoned".to_string())?;
        (
            guard.captured.origin_window.clone(),
            guard.clipboard_gate.clone(),
        )
    };

    registry.set_replace_in_progress(true);
    let hide = popup::hide_popup(&app);

    let pasted = tauri::async_runtime::spawn_blocking(move || {
        let _guard = gate
            .lock()
            .map_err(|_| "clipboard gate poisoned".to_string())?;
        automation::paste_into_origin(&text, origin.as_deref())
    })
    .await
    .map_err(|err| err.to_string())?;

    registry.set_replace_in_progress(false);
    hide?;
    pasted
}

#[tauri::command]
pub async fn stream_ai_response(
    app: AppHandle,
    window: Window,
    state: State<'_, Mutex<AppState>>,
    registry: State<'_, SessionRegistry>,
    client: State<'_, ai::AiClient>,
    base_url: String,
    api_key: String,
    model_name: String,
    messages: Vec<ai::ChatMessage>,
    screenshots: Option<Vec<String>>,
    action: Option<PostAction>,
) -> Result<(), String> {
    let session = registry.begin_popup();
    let action = action.unwrap_or_default();
    let messages = ai::attach_screenshots(messages, screenshots.unwrap_or_default());

    let mut stream = match client
        .stream_chat(&base_url, &api_key, &model_name, messages)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            registry.finish(session.id);
            let message = err.to_string();
            let _ = window.emit(
                "ai-stream-error",
                StreamErrorEvent {
                    session_id: session.id,
                    message: message.clone(),
                },
            );
            return Err(message);
        }
    };

    let mut accumulated = String::new();
    let mut first_chunk = true;
    let mut failure: Option<String> = None;

    while let Some(item) = stream.next().await {
        if session.is_cancelled() {
            break;
        }
        match item {
            Ok(content) => {
                if first_chunk {
                    popup::expand_popup(&app);
                    first_chunk = false;
                }
                accumulated.push_str(&content);
                let _ = window.emit(
                    "ai-stream-chunk",
                    ChunkEvent {
                        session_id: session.id,
                        content,
                    },
                );
            }
            Err(err) => {
                failure = Some(err.to_string());
                break;
            }
        }
    }
    drop(stream);

    if session.is_cancelled() {
        // Clean terminal: a newer session owns the popup now.
        registry.finish(session.id);
        return Ok(());
    }

    if let Some(message) = failure {
        registry.finish(session.id);
        let _ = window.emit(
            "ai-stream-error",
            StreamErrorEvent {
                session_id: session.id,
                message: message.clone(),
            },
        );
        return Err(message);
    }

    let _ = window.emit(
        "ai-stream-done",
        StreamDoneEvent {
            session_id: session.id,
        },
    );

    match action {
        PostAction::None => {}
        PostAction::Copy => {
            let gate = {
                let guard = state
                    .lock()
                    .map_err(|_| "state lock poisoned".to_string())?;
                guard.clipboard_gate.clone()
            };
            let text = accumulated.clone();
            let copied = tauri::async_runtime::spawn_blocking(move || {
                let _guard = gate
                    .lock()
                    .map_err(|_| "clipboard gate poisoned".to_string())?;
                automation::copy_text(&text)
            })
            .await;
            match copied {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::warn!("copy post-action failed: {err}"),
                Err(err) => log::warn!("copy post-action task failed: {err}"),
            }
        }
        PostAction::Replace => {
            // The UI owns the final text; it answers with replace_text_in_source.
            let _ = window.emit(
                "trigger-replace",
                TriggerReplaceEvent {
                    session_id: session.id,
                },
            );
        }
    }

    registry.finish(session.id);
    Ok(())
}
