use std::process::Command;
use std::thread;
use std::time::Duration;

use arboard::Clipboard;
use enigo::{Enigo, Key, KeyboardControllable};

use crate::core::runtime::{self, SessionType};

/// Delay between writing the clipboard and synthesizing the paste chord, so
/// the target application sees the new contents.
const PASTE_DELAY_MS: u64 = 250;

pub fn copy_text(text: &str) -> Result<(), String> {
    let mut clipboard = Clipboard::new().map_err(|err| err.to_string())?;
    clipboard
        .set_text(text.to_string())
        .map_err(|err| err.to_string())
}

/// Replace the selection in the origin window with `text`: clipboard write,
/// focus hand-back, synthesized paste. The response text intentionally stays
/// on the clipboard afterwards.
pub fn paste_into_origin(text: &str, origin_window: Option<&str>) -> Result<(), String> {
    copy_text(text)?;
    maybe_focus_window(origin_window);

    thread::sleep(Duration::from_millis(PASTE_DELAY_MS));

    let mut enigo = Enigo::new();
    let modifier = paste_modifier_key();
    enigo.key_down(modifier);
    enigo.key_click(Key::Layout('v'));
    enigo.key_up(modifier);

    Ok(())
}

/// Programmatic focus restore is only available on X11 via xdotool. On the
/// other platforms the popup is hidden before the paste, which hands focus
/// back to the origin window.
fn maybe_focus_window(origin_window: Option<&str>) {
    if runtime::detect_session_type() != SessionType::X11 || !runtime::command_exists("xdotool") {
        return;
    }
    let Some(window_id) = origin_window else {
        return;
    };

    let status = Command::new("xdotool")
        .args(["windowactivate", "--sync", window_id])
        .status();
    match status {
        Ok(status) if status.success() => {}
        Ok(status) => log::debug!("xdotool windowactivate exited with {status}"),
        Err(err) => log::debug!("xdotool windowactivate failed: {err}"),
    }
}

fn paste_modifier_key() -> Key {
    #[cfg(target_os = "macos")]
    {
        Key::Meta
    }

    #[cfg(not(target_os = "macos"))]
    {
        Key::Control
    }
}
