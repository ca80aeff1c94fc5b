use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use arboard::Clipboard;
use enigo::{Enigo, Key, KeyboardControllable};

use crate::config::PostAction;

/// Total budget for waiting on the foreground app to service the copy.
const CAPTURE_TIMEOUT_MS: u64 = 200;
const POLL_INTERVAL_MS: u64 = 15;

/// Everything captured for one popup session. Replaced wholesale on each
/// fresh hotkey invocation.
#[derive(Debug, Clone, Default)]
pub struct CapturedContext {
    pub text: String,
    pub prompt: Option<String>,
    pub action: PostAction,
    pub origin_window: Option<String>,
    pub screenshots: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CapturedSelection {
    pub text: String,
    pub origin_window: Option<String>,
}

/// Capture the current selection of the foreground application by
/// synthesizing a copy gesture, without disturbing the user's clipboard.
///
/// The previous text contents are snapshotted before the gesture and put
/// back afterwards, success or timeout alike. Callers hold the process-wide
/// clipboard gate so post-actions cannot interleave with a capture.
pub fn capture_selection(gate: &Mutex<()>) -> Result<CapturedSelection, String> {
    let _guard = gate.lock().map_err(|_| "clipboard gate poisoned".to_string())?;

    let origin_window = current_origin_window();

    let mut clipboard =
        Clipboard::new().map_err(|err| format!("clipboard unavailable: {err}"))?;
    let previous = clipboard.get_text().ok();

    send_copy_chord();

    let text = poll_for_change(&mut clipboard, previous.as_deref());

    let restore = match previous {
        Some(ref previous_text) => clipboard
            .set_text(previous_text.to_string())
            .map_err(|err| err.to_string()),
        None => clipboard.clear().map_err(|err| err.to_string()),
    };
    if let Err(err) = restore {
        log::warn!("failed to restore clipboard after capture: {err}");
    }

    Ok(CapturedSelection {
        text,
        origin_window,
    })
}

/// Identity of the window holding focus right now, as an opaque id.
pub fn current_origin_window() -> Option<String> {
    match active_win_pos_rs::get_active_window() {
        Ok(window) => {
            let id = window.window_id;
            if id.is_empty() {
                None
            } else {
                Some(id)
            }
        }
        Err(_) => None,
    }
}

fn send_copy_chord() {
    let mut enigo = Enigo::new();
    let modifier = copy_modifier_key();
    enigo.key_down(modifier);
    enigo.key_click(Key::Layout('c'));
    enigo.key_up(modifier);
}

fn poll_for_change(clipboard: &mut Clipboard, previous: Option<&str>) -> String {
    let deadline = Instant::now() + Duration::from_millis(CAPTURE_TIMEOUT_MS);

    loop {
        thread::sleep(Duration::from_millis(POLL_INTERVAL_MS));

        if let Ok(current) = clipboard.get_text() {
            if selection_arrived(previous, &current) {
                return current;
            }
        }

        if Instant::now() >= deadline {
            log::debug!("selection capture timed out; returning empty text");
            return String::new();
        }
    }
}

/// The copy landed once the clipboard holds non-empty text that differs
/// from the pre-capture snapshot.
fn selection_arrived(previous: Option<&str>, current: &str) -> bool {
    !current.is_empty() && previous != Some(current)
}

fn copy_modifier_key() -> Key {
    #[cfg(target_os = "macos")]
    {
        Key::Meta
    }

    #[cfg(not(target_os = "macos"))]
    {
        Key::Control
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_arrived_requires_a_change() {
        assert!(!selection_arrived(Some("HELLO"), "HELLO"));
        assert!(selection_arrived(Some("HELLO"), "WORLD"));
        assert!(selection_arrived(None, "WORLD"));
    }

    #[test]
    fn empty_clipboard_text_is_not_a_capture() {
        assert!(!selection_arrived(Some("HELLO"), ""));
        assert!(!selection_arrived(None, ""));
    }

    #[test]
    fn captured_context_defaults_are_empty() {
        let context = CapturedContext::default();
        assert!(context.text.is_empty());
        assert!(context.prompt.is_none());
        assert_eq!(context.action, PostAction::None);
        assert!(context.origin_window.is_none());
        assert!(context.screenshots.is_empty());
    }
}
