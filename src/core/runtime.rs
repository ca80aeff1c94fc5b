use std::env;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Wayland,
    X11,
    Macos,
    Windows,
    Unknown,
}

pub fn detect_session_type() -> SessionType {
    if cfg!(target_os = "macos") {
        return SessionType::Macos;
    }

    if cfg!(target_os = "windows") {
        return SessionType::Windows;
    }

    if let Ok(value) = env::var("XDG_SESSION_TYPE") {
        match value.to_lowercase().as_str() {
            "wayland" => return SessionType::Wayland,
            "x11" => return SessionType::X11,
            _ => {}
        }
    }

    if env::var_os("WAYLAND_DISPLAY").is_some() {
        return SessionType::Wayland;
    }

    if env::var_os("DISPLAY").is_some() {
        return SessionType::X11;
    }

    SessionType::Unknown
}

/// Global accelerators need a real display session to register against.
pub fn hotkeys_supported(session: SessionType) -> bool {
    matches!(
        session,
        SessionType::X11 | SessionType::Windows | SessionType::Macos
    )
}

pub fn command_exists(name: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };

    env::split_paths(&paths).any(|path| {
        let candidate = path.join(name);
        if candidate.is_file() {
            return is_executable(&candidate);
        }
        false
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|metadata| metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_sessions_support_hotkeys() {
        assert!(hotkeys_supported(SessionType::X11));
        assert!(hotkeys_supported(SessionType::Windows));
        assert!(hotkeys_supported(SessionType::Macos));
        assert!(!hotkeys_supported(SessionType::Wayland));
        assert!(!hotkeys_supported(SessionType::Unknown));
    }

    #[test]
    fn missing_command_is_reported_absent() {
        assert!(!command_exists("definitely-not-a-real-binary-name"));
    }
}
