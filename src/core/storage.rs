use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AppConfig;

const APP_DIR: &str = "askanywhere";
const CONFIG_FILE: &str = "config.json";

fn default_data_dir_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        if let Some(base) = std::env::var_os("LOCALAPPDATA")
            .or_else(|| std::env::var_os("APPDATA"))
            .or_else(|| std::env::var_os("USERPROFILE"))
        {
            return PathBuf::from(base).join(APP_DIR);
        }
    }

    if cfg!(target_os = "macos") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join(APP_DIR);
        }
    }

    if cfg!(target_os = "linux") {
        if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(dir).join(APP_DIR);
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR);
        }
    }

    std::env::temp_dir().join(APP_DIR)
}

pub fn config_path() -> PathBuf {
    default_data_dir_path().join(CONFIG_FILE)
}

/// Load the persisted configuration, falling back to (and persisting)
/// defaults when the file is missing. A file that no longer parses is left
/// untouched on disk and defaults are used for the session.
pub fn load_config(path: &Path) -> AppConfig {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("config at {} is unreadable: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(_) => {
            let config = AppConfig::default();
            if let Err(err) = save_config(path, &config) {
                log::warn!("could not write default config: {err}");
            }
            config
        }
    }
}

/// Persist atomically: write a sibling temp file, then rename over the
/// destination.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| err.to_string())?;
    }

    let payload = serde_json::to_string_pretty(config).map_err(|err| err.to_string())?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|err| err.to_string())?;
    fs::rename(&tmp_path, path).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, PostAction, QuestionTemplate};
    use uuid::Uuid;

    fn temp_config_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("askanywhere-test-{}", Uuid::new_v4()))
            .join(CONFIG_FILE)
    }

    #[test]
    fn save_then_load_round_trips() {
        let path = temp_config_path();

        let mut config = AppConfig::default();
        config.models = vec![
            ModelConfig {
                name: "OpenAI".to_string(),
                ..ModelConfig::default()
            },
            ModelConfig {
                name: "Local".to_string(),
                base_url: "http://localhost:11434/v1".to_string(),
                ..ModelConfig::default()
            },
        ];
        config.templates = vec![QuestionTemplate {
            id: "t1".to_string(),
            name: "Explain".to_string(),
            prompt: "Explain:".to_string(),
            action: PostAction::Copy,
            hotkey: Some("Alt+E".to_string()),
            background_mode: false,
        }];
        config.hotkeys.popup_hotkey = "Alt+S".to_string();
        config.selected_model_index = 1;

        save_config(&path, &config).expect("save");
        let loaded = load_config(&path);

        assert_eq!(loaded.models.len(), 2);
        assert_eq!(loaded.models[1].name, "Local");
        assert_eq!(loaded.selected_model_index, 1);
        assert_eq!(loaded.templates.len(), 1);
        assert_eq!(loaded.templates[0].action, PostAction::Copy);
        assert_eq!(loaded.templates[0].hotkey.as_deref(), Some("Alt+E"));
        assert_eq!(loaded.hotkeys.popup_hotkey, "Alt+S");

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_yields_defaults_and_writes_them() {
        let path = temp_config_path();

        let loaded = load_config(&path);
        assert_eq!(loaded.models.len(), 1);
        assert!(path.exists());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults_without_clobbering() {
        let path = temp_config_path();
        fs::create_dir_all(path.parent().unwrap()).expect("dir");
        fs::write(&path, "{ not json").expect("write");

        let loaded = load_config(&path);
        assert_eq!(loaded.hotkeys.popup_hotkey, "Alt+S");
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let path = temp_config_path();
        save_config(&path, &AppConfig::default()).expect("save");
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
