use tauri::{AppHandle, Manager};

use crate::popup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliAction {
    Popup,
    ShowSettings,
    Quit,
}

pub fn parse_cli_action(args: &[String]) -> Option<CliAction> {
    args.iter().find_map(|arg| action_from_arg(arg))
}

pub fn handle_action(app: &AppHandle, action: CliAction) {
    match action {
        CliAction::Popup => {
            if let Err(err) = popup::show_popup(app) {
                log::warn!("failed to show popup: {err}");
            }
        }
        CliAction::ShowSettings => {
            if let Some(window) = app.get_webview_window("main") {
                let _ = window.show();
                let _ = window.set_focus();
            }
        }
        CliAction::Quit => {
            app.exit(0);
        }
    }
}

fn action_from_arg(arg: &str) -> Option<CliAction> {
    match arg {
        "--popup" | "popup" => Some(CliAction::Popup),
        "--settings" | "settings" | "--show-settings" | "show-settings" => {
            Some(CliAction::ShowSettings)
        }
        "--quit" | "quit" | "--exit" | "exit" => Some(CliAction::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cli_action_popup() {
        let args = vec!["askanywhere".to_string(), "--popup".to_string()];
        assert_eq!(parse_cli_action(&args), Some(CliAction::Popup));
    }

    #[test]
    fn parse_cli_action_settings() {
        let args = vec!["askanywhere".to_string(), "--settings".to_string()];
        assert_eq!(parse_cli_action(&args), Some(CliAction::ShowSettings));
    }

    #[test]
    fn parse_cli_action_ignores_unknown_args() {
        let args = vec!["askanywhere".to_string(), "--verbose".to_string()];
        assert_eq!(parse_cli_action(&args), None);
    }
}
