use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::AppConfig;
use crate::core::capture::CapturedContext;
use crate::core::storage;
use crate::popup::PopupPhase;

pub struct AppState {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub captured: CapturedContext,
    pub popup_phase: PopupPhase,
    /// Process-scoped; a pinned popup ignores focus-loss auto-hide.
    pub popup_pinned: bool,
    /// Serializes every clipboard touch (capture and post-actions).
    pub clipboard_gate: Arc<Mutex<()>>,
}

impl AppState {
    pub fn load() -> Self {
        let config_path = storage::config_path();
        let config = storage::load_config(&config_path);

        Self {
            config,
            config_path,
            captured: CapturedContext::default(),
            popup_phase: PopupPhase::default(),
            popup_pinned: false,
            clipboard_gate: Arc::new(Mutex::new(())),
        }
    }
}
