use std::sync::Mutex;

use tauri::{
    AppHandle, LogicalPosition, LogicalSize, Manager, WebviewUrl, WebviewWindow,
    WebviewWindowBuilder,
};

use crate::core::sessions::SessionRegistry;
use crate::state::AppState;

pub const POPUP_LABEL: &str = "popup";
pub const SELECTOR_LABEL: &str = "screenshot_selector";

/// Height of the popup before any response content has arrived.
const COMPACT_HEIGHT: f64 = 200.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopupPhase {
    #[default]
    Hidden,
    Compact,
    Expanded,
}

fn popup_window(app: &AppHandle) -> Result<WebviewWindow, String> {
    if let Some(window) = app.get_webview_window(POPUP_LABEL) {
        return Ok(window);
    }

    WebviewWindowBuilder::new(app, POPUP_LABEL, WebviewUrl::App("popup.html".into()))
        .title("AskAnywhere")
        .inner_size(500.0, COMPACT_HEIGHT)
        .resizable(true)
        .decorations(true)
        .always_on_top(true)
        .skip_taskbar(true)
        .visible(false)
        .build()
        .map_err(|err| err.to_string())
}

/// Show the popup in its compact shape, centered on the display the cursor
/// is on. A pinned popup that is already visible keeps its place.
pub fn show_popup(app: &AppHandle) -> Result<(), String> {
    let (width, pinned) = {
        let state = app.state::<Mutex<AppState>>();
        let mut guard = state.lock().map_err(|_| "state lock poisoned".to_string())?;
        guard.popup_phase = PopupPhase::Compact;
        (guard.config.popup_width, guard.popup_pinned)
    };

    let window = popup_window(app)?;

    if pinned && window.is_visible().unwrap_or(false) {
        window.set_focus().map_err(|err| err.to_string())?;
        return Ok(());
    }

    window
        .set_size(LogicalSize::new(width, COMPACT_HEIGHT))
        .map_err(|err| err.to_string())?;
    // A pinned popup keeps whatever position the user moved it to.
    if !pinned {
        if let Some(position) = centered_on_cursor_monitor(app, width, COMPACT_HEIGHT) {
            let _ = window.set_position(position);
        }
    }

    window.show().map_err(|err| err.to_string())?;
    window.set_focus().map_err(|err| err.to_string())?;
    Ok(())
}

pub fn hide_popup(app: &AppHandle) -> Result<(), String> {
    {
        let state = app.state::<Mutex<AppState>>();
        if let Ok(mut guard) = state.lock() {
            guard.popup_phase = PopupPhase::Hidden;
        }
    }
    if let Some(window) = app.get_webview_window(POPUP_LABEL) {
        window.hide().map_err(|err| err.to_string())?;
    }
    Ok(())
}

/// Grow the popup to its expanded shape. Called when the first chunk of a
/// response arrives; a no-op unless the popup is currently compact.
pub fn expand_popup(app: &AppHandle) {
    let size = {
        let state = app.state::<Mutex<AppState>>();
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard.popup_phase != PopupPhase::Compact {
            return;
        }
        guard.popup_phase = PopupPhase::Expanded;
        LogicalSize::new(guard.config.popup_width, guard.config.max_popup_height)
    };

    if let Some(window) = app.get_webview_window(POPUP_LABEL) {
        let _ = window.set_size(size);
    }
}

pub fn resize_popup(app: &AppHandle, width: f64, height: f64) -> Result<(), String> {
    {
        let state = app.state::<Mutex<AppState>>();
        if let Ok(mut guard) = state.lock() {
            if guard.popup_phase == PopupPhase::Compact && height > COMPACT_HEIGHT {
                guard.popup_phase = PopupPhase::Expanded;
            }
        }
    }
    if let Some(window) = app.get_webview_window(POPUP_LABEL) {
        window
            .set_size(LogicalSize::new(width, height))
            .map_err(|err| err.to_string())?;
    }
    Ok(())
}

/// Re-apply configured geometry after a config save, if the popup is showing.
pub fn apply_config_geometry(app: &AppHandle) {
    let size = {
        let state = app.state::<Mutex<AppState>>();
        let guard = match state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        match guard.popup_phase {
            PopupPhase::Hidden => return,
            PopupPhase::Compact => LogicalSize::new(guard.config.popup_width, COMPACT_HEIGHT),
            PopupPhase::Expanded => {
                LogicalSize::new(guard.config.popup_width, guard.config.max_popup_height)
            }
        }
    };

    if let Some(window) = app.get_webview_window(POPUP_LABEL) {
        let _ = window.set_size(size);
    }
}

pub fn popup_is_visible(app: &AppHandle) -> bool {
    app.get_webview_window(POPUP_LABEL)
        .map(|window| window.is_visible().unwrap_or(false))
        .unwrap_or(false)
}

/// Borderless transparent overlay covering the primary display, used by the
/// UI to rubber-band a screenshot region.
pub fn show_screenshot_selector(app: &AppHandle) -> Result<(), String> {
    if let Some(window) = app.get_webview_window(SELECTOR_LABEL) {
        window.show().map_err(|err| err.to_string())?;
        window.set_focus().map_err(|err| err.to_string())?;
        return Ok(());
    }

    let mut builder =
        WebviewWindowBuilder::new(app, SELECTOR_LABEL, WebviewUrl::App("selector.html".into()))
            .title("AskAnywhere")
            .decorations(false)
            .transparent(true)
            .always_on_top(true)
            .skip_taskbar(true)
            .position(0.0, 0.0);

    if let Ok(Some(monitor)) = app.primary_monitor() {
        let scale = monitor.scale_factor();
        let size = monitor.size();
        builder = builder.inner_size(
            size.width as f64 / scale,
            size.height as f64 / scale,
        );
    }

    let window = builder.build().map_err(|err| err.to_string())?;
    window.set_focus().map_err(|err| err.to_string())?;
    Ok(())
}

/// Focus loss hides the popup and cancels its session, unless pinned.
pub fn handle_focus_change(app: &AppHandle, label: &str, focused: bool) {
    if label != POPUP_LABEL || focused {
        return;
    }

    let pinned = {
        let state = app.state::<Mutex<AppState>>();
        match state.lock() {
            Ok(guard) => guard.popup_pinned,
            Err(_) => return,
        }
    };
    if pinned {
        return;
    }

    app.state::<SessionRegistry>().cancel_active_unless_replacing();
    if let Err(err) = hide_popup(app) {
        log::warn!("failed to hide popup on focus loss: {err}");
    }
}

fn centered_on_cursor_monitor(
    app: &AppHandle,
    width: f64,
    height: f64,
) -> Option<LogicalPosition<f64>> {
    let cursor = app.cursor_position().ok();
    let monitor = cursor
        .and_then(|cursor| {
            app.available_monitors().ok().and_then(|monitors| {
                monitors.into_iter().find(|monitor| {
                    let position = monitor.position();
                    let size = monitor.size();
                    monitor_contains(
                        position.x as f64,
                        position.y as f64,
                        size.width as f64,
                        size.height as f64,
                        cursor.x,
                        cursor.y,
                    )
                })
            })
        })
        .or_else(|| app.primary_monitor().ok().flatten())?;

    let scale = monitor.scale_factor();
    let position = monitor.position();
    let size = monitor.size();
    let (x, y) = centered_rect(
        position.x as f64 / scale,
        position.y as f64 / scale,
        size.width as f64 / scale,
        size.height as f64 / scale,
        width,
        height,
    );
    Some(LogicalPosition::new(x, y))
}

fn monitor_contains(x: f64, y: f64, w: f64, h: f64, px: f64, py: f64) -> bool {
    px >= x && px < x + w && py >= y && py < y + h
}

fn centered_rect(
    screen_x: f64,
    screen_y: f64,
    screen_w: f64,
    screen_h: f64,
    width: f64,
    height: f64,
) -> (f64, f64) {
    (
        screen_x + ((screen_w - width) / 2.0).max(0.0),
        screen_y + ((screen_h - height) / 2.0).max(0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_within_the_screen() {
        let (x, y) = centered_rect(0.0, 0.0, 1920.0, 1080.0, 500.0, 200.0);
        assert_eq!(x, 710.0);
        assert_eq!(y, 440.0);
    }

    #[test]
    fn offsets_by_the_monitor_origin() {
        let (x, y) = centered_rect(1920.0, 200.0, 1920.0, 1080.0, 500.0, 200.0);
        assert_eq!(x, 1920.0 + 710.0);
        assert_eq!(y, 200.0 + 440.0);
    }

    #[test]
    fn never_places_above_or_left_of_the_screen() {
        let (x, y) = centered_rect(0.0, 0.0, 400.0, 150.0, 500.0, 200.0);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn popup_phase_defaults_to_hidden() {
        assert_eq!(PopupPhase::default(), PopupPhase::Hidden);
    }

    #[test]
    fn monitor_containment_uses_half_open_bounds() {
        assert!(monitor_contains(0.0, 0.0, 1920.0, 1080.0, 0.0, 0.0));
        assert!(monitor_contains(0.0, 0.0, 1920.0, 1080.0, 1919.0, 1079.0));
        assert!(!monitor_contains(0.0, 0.0, 1920.0, 1080.0, 1920.0, 500.0));
        assert!(monitor_contains(1920.0, 0.0, 1920.0, 1080.0, 2000.0, 10.0));
    }
}
