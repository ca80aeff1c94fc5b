use serde::{Deserialize, Serialize};

use crate::core::hotkeys;

pub const MIN_POPUP_DIM: f64 = 300.0;
pub const MAX_POPUP_DIM: f64 = 1200.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub models: Vec<ModelConfig>,
    pub templates: Vec<QuestionTemplate>,
    pub hotkeys: HotkeyConfig,
    pub selected_model_index: usize,
    #[serde(default = "default_popup_width")]
    pub popup_width: f64,
    #[serde(default = "default_max_popup_height")]
    pub max_popup_height: f64,
}

fn default_popup_width() -> f64 {
    500.0
}

fn default_max_popup_height() -> f64 {
    600.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    #[serde(default)]
    pub supports_vision: bool,
}

/// What happens to the finished response of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostAction {
    #[default]
    None,
    Copy,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionTemplate {
    pub id: String,
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub action: PostAction,
    #[serde(default)]
    pub hotkey: Option<String>,
    #[serde(default)]
    pub background_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub popup_hotkey: String,
    #[serde(default)]
    pub screenshot_hotkey: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models: vec![ModelConfig::default()],
            templates: vec![
                QuestionTemplate {
                    id: "background_translate".to_string(),
                    name: "Background Translation".to_string(),
                    prompt: "If the selected text is mostly Chinese, translate it into English; if it is mostly English or other languages, translate it into Chinese. Please only provide the translated text.".to_string(),
                    action: PostAction::Replace,
                    hotkey: Some("Alt+Shift+Q".to_string()),
                    background_mode: true,
                },
                QuestionTemplate {
                    id: "translate".to_string(),
                    name: "Translate".to_string(),
                    prompt: "If the selected text is mostly Chinese, translate it into English; if it is mostly English or other languages, translate it into Chinese. Please only provide the translated text.".to_string(),
                    action: PostAction::None,
                    hotkey: Some("Alt+Q".to_string()),
                    background_mode: false,
                },
                QuestionTemplate {
                    id: "summarize".to_string(),
                    name: "Summarize".to_string(),
                    prompt: "Summarize the following text:".to_string(),
                    action: PostAction::Copy,
                    hotkey: None,
                    background_mode: false,
                },
            ],
            hotkeys: HotkeyConfig {
                popup_hotkey: "Alt+S".to_string(),
                screenshot_hotkey: Some("Alt+Shift+S".to_string()),
            },
            selected_model_index: 0,
            popup_width: default_popup_width(),
            max_popup_height: default_max_popup_height(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "Default OpenAI".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model_name: "gpt-4.1".to_string(),
            supports_vision: false,
        }
    }
}

impl AppConfig {
    /// Full validation applied before anything is persisted or registered.
    pub fn validate(&self) -> Result<(), String> {
        if self.models.is_empty() {
            return Err("At least one model is required".to_string());
        }
        if self.selected_model_index >= self.models.len() {
            return Err(format!(
                "Selected model index {} is out of range (have {} models)",
                self.selected_model_index,
                self.models.len()
            ));
        }

        for dim in [self.popup_width, self.max_popup_height] {
            if !(MIN_POPUP_DIM..=MAX_POPUP_DIM).contains(&dim) {
                return Err(format!(
                    "Popup dimensions must be between {MIN_POPUP_DIM} and {MAX_POPUP_DIM}, got {dim}"
                ));
            }
        }

        hotkeys::parse_accelerator(&self.hotkeys.popup_hotkey)
            .map_err(|err| format!("Invalid popup hotkey: {err}"))?;
        if let Some(screenshot) = self.hotkeys.screenshot_hotkey.as_deref() {
            hotkeys::parse_accelerator(screenshot)
                .map_err(|err| format!("Invalid screenshot hotkey: {err}"))?;
        }

        let mut seen_names = Vec::new();
        for template in &self.templates {
            let name = template.name.trim();
            if name.is_empty() {
                return Err("Template names must not be empty".to_string());
            }
            let lowered = name.to_lowercase();
            if seen_names.contains(&lowered) {
                return Err(format!("Duplicate template name: {name}"));
            }
            seen_names.push(lowered);

            if let Some(hotkey) = template.hotkey.as_deref() {
                hotkeys::parse_accelerator(hotkey)
                    .map_err(|err| format!("Invalid hotkey for template {name}: {err}"))?;
            }
            if template.background_mode && template.hotkey.is_none() {
                return Err(format!(
                    "Template {name} is background-mode but has no hotkey"
                ));
            }
        }

        Ok(())
    }

    /// Merge an imported configuration into this one.
    ///
    /// Templates replace existing entries with the same id, otherwise append.
    /// Models are unioned by name with existing entries preserved. Hotkeys
    /// and popup geometry from the import are ignored.
    pub fn merge_import(&mut self, imported: AppConfig) {
        for template in imported.templates {
            match self
                .templates
                .iter_mut()
                .find(|existing| existing.id == template.id)
            {
                Some(existing) => *existing = template,
                None => self.templates.push(template),
            }
        }

        for model in imported.models {
            let exists = self
                .models
                .iter()
                .any(|existing| existing.name == model.name);
            if !exists {
                self.models.push(model);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(id: &str, name: &str) -> QuestionTemplate {
        QuestionTemplate {
            id: id.to_string(),
            name: name.to_string(),
            prompt: "Explain:".to_string(),
            action: PostAction::None,
            hotkey: None,
            background_mode: false,
        }
    }

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().expect("default config");
    }

    #[test]
    fn missing_fields_adopt_defaults() {
        let raw = r#"{
            "models": [{"name":"M","base_url":"https://api.openai.com/v1","api_key":"","model_name":"gpt-4.1"}],
            "templates": [{"id":"t1","name":"Explain","prompt":"Explain:"}],
            "hotkeys": {"popup_hotkey":"Alt+S"},
            "selected_model_index": 0
        }"#;
        let config: AppConfig = serde_json::from_str(raw).expect("parse");
        assert_eq!(config.popup_width, 500.0);
        assert_eq!(config.max_popup_height, 600.0);
        assert!(config.hotkeys.screenshot_hotkey.is_none());
        assert_eq!(config.templates[0].action, PostAction::None);
        assert!(!config.templates[0].background_mode);
        assert!(!config.models[0].supports_vision);
    }

    #[test]
    fn post_action_round_trips_as_lowercase() {
        assert_eq!(
            serde_json::to_string(&PostAction::Replace).unwrap(),
            "\"replace\""
        );
        let parsed: PostAction = serde_json::from_str("\"copy\"").unwrap();
        assert_eq!(parsed, PostAction::Copy);
    }

    #[test]
    fn validate_rejects_out_of_range_model_index() {
        let mut config = AppConfig::default();
        config.selected_model_index = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_names_case_insensitively() {
        let mut config = AppConfig::default();
        config.templates = vec![template("a", "Explain"), template("b", "explain")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_background_template_without_hotkey() {
        let mut config = AppConfig::default();
        config.templates = vec![QuestionTemplate {
            background_mode: true,
            ..template("a", "Headless")
        }];
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_popup_width() {
        let mut config = AppConfig::default();
        config.popup_width = 120.0;
        assert!(config.validate().is_err());
        config.popup_width = 1500.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn merge_replaces_by_template_id_and_appends_new() {
        let mut config = AppConfig::default();
        config.templates = vec![template("a", "A"), template("b", "B")];

        let mut incoming = AppConfig::default();
        incoming.templates = vec![template("b", "B2"), template("c", "C")];

        config.merge_import(incoming);

        let names: Vec<&str> = config
            .templates
            .iter()
            .map(|template| template.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B2", "C"]);
    }

    #[test]
    fn merge_unions_models_by_name_preserving_existing() {
        let mut config = AppConfig::default();
        config.models = vec![ModelConfig {
            name: "OpenAI".to_string(),
            api_key: "keep-me".to_string(),
            ..ModelConfig::default()
        }];

        let mut incoming = AppConfig::default();
        incoming.models = vec![
            ModelConfig {
                name: "OpenAI".to_string(),
                api_key: "overwrite-attempt".to_string(),
                ..ModelConfig::default()
            },
            ModelConfig {
                name: "Local".to_string(),
                base_url: "http://localhost:11434/v1".to_string(),
                ..ModelConfig::default()
            },
        ];

        config.merge_import(incoming);

        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[0].api_key, "keep-me");
        assert_eq!(config.models[1].name, "Local");
    }

    #[test]
    fn merge_ignores_imported_hotkeys_and_geometry() {
        let mut config = AppConfig::default();
        let mut incoming = AppConfig::default();
        incoming.hotkeys.popup_hotkey = "Ctrl+Shift+Z".to_string();
        incoming.popup_width = 900.0;

        config.merge_import(incoming);

        assert_eq!(config.hotkeys.popup_hotkey, "Alt+S");
        assert_eq!(config.popup_width, 500.0);
    }
}
