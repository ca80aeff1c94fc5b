use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_global_shortcut::{Code, GlobalShortcutExt, Modifiers, Shortcut, ShortcutState};

use crate::config::{AppConfig, PostAction, QuestionTemplate};
use crate::core::{ai, automation, capture, sessions::SessionRegistry};
use crate::popup;
use crate::state::AppState;

/// Repeated activations of the same binding inside this window are dropped.
const DEBOUNCE_MS: u64 = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accelerator {
    ctrl: bool,
    alt: bool,
    shift: bool,
    superkey: bool,
    key_label: &'static str,
    code: Code,
}

impl Accelerator {
    /// Canonical rendering: modifiers in Ctrl, Alt, Shift, Super order.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        if self.shift {
            parts.push("Shift");
        }
        if self.superkey {
            parts.push("Super");
        }
        parts.push(self.key_label);
        parts.join("+")
    }

    pub fn to_shortcut(&self) -> Shortcut {
        let mut mods = Modifiers::empty();
        if self.ctrl {
            mods |= Modifiers::CONTROL;
        }
        if self.alt {
            mods |= Modifiers::ALT;
        }
        if self.shift {
            mods |= Modifiers::SHIFT;
        }
        if self.superkey {
            mods |= Modifiers::META;
        }
        Shortcut::new(Some(mods), self.code)
    }
}

/// Parse an accelerator string such as `Ctrl+Alt+S`.
///
/// Lenient on case and whitespace; duplicate tokens and missing or multiple
/// non-modifier keys are errors.
pub fn parse_accelerator(input: &str) -> Result<Accelerator, String> {
    let mut ctrl = false;
    let mut alt = false;
    let mut shift = false;
    let mut superkey = false;
    let mut key: Option<(&'static str, Code)> = None;

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Empty accelerator".to_string());
    }

    for token in trimmed.split('+') {
        let token = token.trim();
        if token.is_empty() {
            return Err(format!("Empty token in accelerator: {input}"));
        }

        let lowered = token.to_lowercase();
        let flag = match lowered.as_str() {
            "ctrl" | "control" => Some(&mut ctrl),
            "alt" | "option" => Some(&mut alt),
            "shift" => Some(&mut shift),
            "super" | "meta" | "win" | "cmd" | "command" => Some(&mut superkey),
            "commandorcontrol" | "cmdorctrl" => {
                if cfg!(target_os = "macos") {
                    Some(&mut superkey)
                } else {
                    Some(&mut ctrl)
                }
            }
            _ => None,
        };

        if let Some(flag) = flag {
            if *flag {
                return Err(format!("Duplicate modifier {token} in accelerator: {input}"));
            }
            *flag = true;
            continue;
        }

        let parsed = parse_key(token)
            .ok_or_else(|| format!("Unknown key {token} in accelerator: {input}"))?;
        if key.is_some() {
            return Err(format!("More than one key in accelerator: {input}"));
        }
        key = Some(parsed);
    }

    let (key_label, code) =
        key.ok_or_else(|| format!("Accelerator has no non-modifier key: {input}"))?;

    Ok(Accelerator {
        ctrl,
        alt,
        shift,
        superkey,
        key_label,
        code,
    })
}

fn parse_key(token: &str) -> Option<(&'static str, Code)> {
    let upper = token.to_uppercase();
    let entry = match upper.as_str() {
        "A" => ("A", Code::KeyA),
        "B" => ("B", Code::KeyB),
        "C" => ("C", Code::KeyC),
        "D" => ("D", Code::KeyD),
        "E" => ("E", Code::KeyE),
        "F" => ("F", Code::KeyF),
        "G" => ("G", Code::KeyG),
        "H" => ("H", Code::KeyH),
        "I" => ("I", Code::KeyI),
        "J" => ("J", Code::KeyJ),
        "K" => ("K", Code::KeyK),
        "L" => ("L", Code::KeyL),
        "M" => ("M", Code::KeyM),
        "N" => ("N", Code::KeyN),
        "O" => ("O", Code::KeyO),
        "P" => ("P", Code::KeyP),
        "Q" => ("Q", Code::KeyQ),
        "R" => ("R", Code::KeyR),
        "S" => ("S", Code::KeyS),
        "T" => ("T", Code::KeyT),
        "U" => ("U", Code::KeyU),
        "V" => ("V", Code::KeyV),
        "W" => ("W", Code::KeyW),
        "X" => ("X", Code::KeyX),
        "Y" => ("Y", Code::KeyY),
        "Z" => ("Z", Code::KeyZ),
        "0" => ("0", Code::Digit0),
        "1" => ("1", Code::Digit1),
        "2" => ("2", Code::Digit2),
        "3" => ("3", Code::Digit3),
        "4" => ("4", Code::Digit4),
        "5" => ("5", Code::Digit5),
        "6" => ("6", Code::Digit6),
        "7" => ("7", Code::Digit7),
        "8" => ("8", Code::Digit8),
        "9" => ("9", Code::Digit9),
        "F1" => ("F1", Code::F1),
        "F2" => ("F2", Code::F2),
        "F3" => ("F3", Code::F3),
        "F4" => ("F4", Code::F4),
        "F5" => ("F5", Code::F5),
        "F6" => ("F6", Code::F6),
        "F7" => ("F7", Code::F7),
        "F8" => ("F8", Code::F8),
        "F9" => ("F9", Code::F9),
        "F10" => ("F10", Code::F10),
        "F11" => ("F11", Code::F11),
        "F12" => ("F12", Code::F12),
        "F13" => ("F13", Code::F13),
        "F14" => ("F14", Code::F14),
        "F15" => ("F15", Code::F15),
        "F16" => ("F16", Code::F16),
        "F17" => ("F17", Code::F17),
        "F18" => ("F18", Code::F18),
        "F19" => ("F19", Code::F19),
        "F20" => ("F20", Code::F20),
        "F21" => ("F21", Code::F21),
        "F22" => ("F22", Code::F22),
        "F23" => ("F23", Code::F23),
        "F24" => ("F24", Code::F24),
        "SPACE" => ("Space", Code::Space),
        "ENTER" | "RETURN" => ("Enter", Code::Enter),
        "TAB" => ("Tab", Code::Tab),
        "ESC" | "ESCAPE" => ("Esc", Code::Escape),
        "UP" => ("Up", Code::ArrowUp),
        "DOWN" => ("Down", Code::ArrowDown),
        "LEFT" => ("Left", Code::ArrowLeft),
        "RIGHT" => ("Right", Code::ArrowRight),
        "HOME" => ("Home", Code::Home),
        "END" => ("End", Code::End),
        "PAGEUP" => ("PageUp", Code::PageUp),
        "PAGEDOWN" => ("PageDown", Code::PageDown),
        "INSERT" => ("Insert", Code::Insert),
        "DELETE" => ("Delete", Code::Delete),
        "BACKSPACE" => ("Backspace", Code::Backspace),
        "," | "COMMA" => (",", Code::Comma),
        "." | "PERIOD" => (".", Code::Period),
        "/" | "SLASH" => ("/", Code::Slash),
        ";" | "SEMICOLON" => (";", Code::Semicolon),
        "'" | "QUOTE" => ("'", Code::Quote),
        "[" => ("[", Code::BracketLeft),
        "]" => ("]", Code::BracketRight),
        "\\" | "BACKSLASH" => ("\\", Code::Backslash),
        "-" | "MINUS" => ("-", Code::Minus),
        "=" | "EQUAL" => ("=", Code::Equal),
        "`" | "BACKQUOTE" => ("`", Code::Backquote),
        _ => return None,
    };
    Some(entry)
}

/// What a registered binding does when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingAction {
    Popup,
    Screenshot,
    Template(String),
}

struct Binding {
    accel: Accelerator,
    action: BindingAction,
}

#[derive(Default)]
pub struct HotkeyState {
    bindings: HashMap<String, Binding>,
    last_fired: HashMap<String, Instant>,
}

#[derive(Clone, Serialize)]
struct HotkeyDiagnosticEvent {
    accelerator: String,
    message: String,
}

fn emit_diagnostic(app: &AppHandle, accelerator: &str, message: String) {
    log::warn!("hotkey {accelerator}: {message}");
    let _ = app.emit(
        "hotkey-diagnostic",
        HotkeyDiagnosticEvent {
            accelerator: accelerator.to_string(),
            message,
        },
    );
}

/// The binding set implied by a configuration, keyed by canonical rendering.
/// Strings that fail to parse are returned as diagnostics instead.
fn desired_bindings(
    config: &AppConfig,
) -> (HashMap<String, (Accelerator, BindingAction)>, Vec<(String, String)>) {
    let mut desired = HashMap::new();
    let mut failures = Vec::new();

    let mut add = |raw: &str, action: BindingAction| match parse_accelerator(raw) {
        Ok(accel) => {
            desired.insert(accel.render(), (accel, action));
        }
        Err(err) => failures.push((raw.to_string(), err)),
    };

    add(&config.hotkeys.popup_hotkey, BindingAction::Popup);
    if let Some(screenshot) = config.hotkeys.screenshot_hotkey.as_deref() {
        if !screenshot.trim().is_empty() {
            add(screenshot, BindingAction::Screenshot);
        }
    }
    for template in &config.templates {
        if let Some(hotkey) = template.hotkey.as_deref() {
            if !hotkey.trim().is_empty() {
                add(hotkey, BindingAction::Template(template.id.clone()));
            }
        }
    }

    (desired, failures)
}

/// Compute which canonical accelerators must be unregistered and which must
/// be (re-)registered to move from `current` to `desired`.
fn plan_sync(
    current: &HashMap<String, BindingAction>,
    desired: &HashMap<String, BindingAction>,
) -> (Vec<String>, Vec<String>) {
    let mut remove: Vec<String> = current
        .iter()
        .filter(|(canonical, action)| desired.get(*canonical) != Some(*action))
        .map(|(canonical, _)| canonical.clone())
        .collect();
    let mut add: Vec<String> = desired
        .iter()
        .filter(|(canonical, action)| current.get(*canonical) != Some(*action))
        .map(|(canonical, _)| canonical.clone())
        .collect();
    remove.sort();
    add.sort();
    (remove, add)
}

/// Synchronize OS-registered accelerators with the given configuration.
///
/// Individual registration failures are reported and skipped; the sweep
/// always runs to completion.
pub fn sync(app: &AppHandle, config: &AppConfig) {
    let (desired, failures) = desired_bindings(config);
    for (accelerator, err) in failures {
        emit_diagnostic(app, &accelerator, err);
    }

    let state = app.state::<Mutex<HotkeyState>>();
    let mut guard = match state.lock() {
        Ok(guard) => guard,
        Err(_) => return,
    };

    let current: HashMap<String, BindingAction> = guard
        .bindings
        .iter()
        .map(|(canonical, binding)| (canonical.clone(), binding.action.clone()))
        .collect();
    let desired_actions: HashMap<String, BindingAction> = desired
        .iter()
        .map(|(canonical, (_, action))| (canonical.clone(), action.clone()))
        .collect();
    let (remove, add) = plan_sync(&current, &desired_actions);

    for canonical in remove {
        if let Some(binding) = guard.bindings.remove(&canonical) {
            if let Err(err) = app.global_shortcut().unregister(binding.accel.to_shortcut()) {
                emit_diagnostic(app, &canonical, format!("unregister failed: {err}"));
            }
        }
    }

    for canonical in add {
        let Some((accel, action)) = desired.get(&canonical) else {
            continue;
        };
        let handler_key = canonical.clone();
        let result = app.global_shortcut().on_shortcut(
            accel.to_shortcut(),
            move |app, _shortcut, event| {
                if event.state == ShortcutState::Pressed {
                    on_activated(app, &handler_key);
                }
            },
        );
        match result {
            Ok(()) => {
                guard.bindings.insert(
                    canonical,
                    Binding {
                        accel: *accel,
                        action: action.clone(),
                    },
                );
            }
            Err(err) => emit_diagnostic(app, &canonical, format!("register failed: {err}")),
        }
    }
}

pub fn unregister_all(app: &AppHandle) {
    if let Err(err) = app.global_shortcut().unregister_all() {
        log::warn!("failed to unregister shortcuts on shutdown: {err}");
    }
}

fn on_activated(app: &AppHandle, canonical: &str) {
    let action = {
        let state = app.state::<Mutex<HotkeyState>>();
        let mut guard = match state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };

        let now = Instant::now();
        if let Some(last) = guard.last_fired.get(canonical) {
            if now.duration_since(*last) < Duration::from_millis(DEBOUNCE_MS) {
                return;
            }
        }
        guard.last_fired.insert(canonical.to_string(), now);

        match guard.bindings.get(canonical) {
            Some(binding) => binding.action.clone(),
            None => return,
        }
    };

    match action {
        BindingAction::Popup => activate_popup(app.clone()),
        BindingAction::Screenshot => activate_screenshot(app.clone()),
        BindingAction::Template(id) => activate_template(app.clone(), id),
    }
}

fn capture_selection_blocking(
    app: &AppHandle,
) -> tauri::async_runtime::JoinHandle<Result<capture::CapturedSelection, String>> {
    let gate = {
        let state = app.state::<Mutex<AppState>>();
        match state.lock() {
            Ok(guard) => guard.clipboard_gate.clone(),
            Err(_) => {
                return tauri::async_runtime::spawn_blocking(|| {
                    Err("state lock poisoned".to_string())
                })
            }
        }
    };
    tauri::async_runtime::spawn_blocking(move || capture::capture_selection(&gate))
}

fn activate_popup(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        let selection = match capture_selection_blocking(&app).await {
            Ok(Ok(selection)) => selection,
            Ok(Err(err)) => {
                log::warn!("selection capture failed: {err}");
                return;
            }
            Err(err) => {
                log::warn!("capture task failed: {err}");
                return;
            }
        };

        {
            let state = app.state::<Mutex<AppState>>();
            if let Ok(mut guard) = state.lock() {
                guard.captured = capture::CapturedContext {
                    text: selection.text,
                    prompt: None,
                    action: PostAction::None,
                    origin_window: selection.origin_window,
                    screenshots: Vec::new(),
                };
            }
        }

        if let Err(err) = popup::show_popup(&app) {
            log::warn!("failed to show popup: {err}");
        }
    });
}

fn activate_screenshot(app: AppHandle) {
    tauri::async_runtime::spawn(async move {
        if let Err(err) = popup::show_screenshot_selector(&app) {
            log::warn!("failed to show screenshot selector: {err}");
        }
    });
}

#[derive(Clone, Serialize)]
struct ExecuteTemplateEvent {
    id: String,
    prompt: String,
    action: PostAction,
}

fn activate_template(app: AppHandle, template_id: String) {
    tauri::async_runtime::spawn(async move {
        let template = {
            let state = app.state::<Mutex<AppState>>();
            let guard = match state.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            guard
                .config
                .templates
                .iter()
                .find(|template| template.id == template_id)
                .cloned()
        };
        let Some(template) = template else {
            log::warn!("hotkey fired for unknown template {template_id}");
            return;
        };

        let selection = match capture_selection_blocking(&app).await {
            Ok(Ok(selection)) => selection,
            Ok(Err(err)) => {
                log::warn!("selection capture failed: {err}");
                return;
            }
            Err(err) => {
                log::warn!("capture task failed: {err}");
                return;
            }
        };

        if template.background_mode {
            if selection.text.trim().is_empty() {
                log::info!(
                    "background template {} skipped: nothing captured",
                    template.name
                );
                return;
            }
            if popup::popup_is_visible(&app) {
                emit_execute_template(&app, &template);
            }
            run_background_template(app, template, selection).await;
            return;
        }

        {
            let state = app.state::<Mutex<AppState>>();
            if let Ok(mut guard) = state.lock() {
                guard.captured = capture::CapturedContext {
                    text: selection.text,
                    prompt: Some(template.prompt.clone()),
                    action: template.action,
                    origin_window: selection.origin_window,
                    screenshots: Vec::new(),
                };
            }
        }

        if let Err(err) = popup::show_popup(&app) {
            log::warn!("failed to show popup: {err}");
            return;
        }
        emit_execute_template(&app, &template);
    });
}

fn emit_execute_template(app: &AppHandle, template: &QuestionTemplate) {
    let _ = app.emit(
        "execute-template",
        ExecuteTemplateEvent {
            id: template.id.clone(),
            prompt: template.prompt.clone(),
            action: template.action,
        },
    );
}

/// Run a background-mode template end to end: one streaming request, the
/// accumulated text handed to the template's post-action, no popup.
async fn run_background_template(
    app: AppHandle,
    template: QuestionTemplate,
    selection: capture::CapturedSelection,
) {
    let model = {
        let state = app.state::<Mutex<AppState>>();
        let guard = match state.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        match guard.config.models.get(guard.config.selected_model_index) {
            Some(model) => model.clone(),
            None => return,
        }
    };

    let registry = app.state::<SessionRegistry>();
    let session = registry.begin_background();

    let client = app.state::<ai::AiClient>();
    let prompt = format!("{}\n\n{}", template.prompt, selection.text);
    let messages = vec![ai::ChatMessage::user(prompt)];

    let outcome = ai::collect_stream(
        &client,
        &model.base_url,
        &model.api_key,
        &model.model_name,
        messages,
        session.cancel.clone(),
    )
    .await;

    registry.finish(session.id);

    let text = match outcome {
        Ok(Some(text)) => text,
        Ok(None) => return,
        Err(err) => {
            log::warn!("background template {} failed: {err}", template.name);
            return;
        }
    };

    let origin = selection.origin_window.clone();
    let action = template.action;
    let gate = {
        let state = app.state::<Mutex<AppState>>();
        match state.lock() {
            Ok(guard) => guard.clipboard_gate.clone(),
            Err(_) => return,
        }
    };
    let result = tauri::async_runtime::spawn_blocking(move || {
        let _guard = gate.lock().map_err(|_| "clipboard gate poisoned".to_string())?;
        match action {
            PostAction::None => Ok(()),
            PostAction::Copy => automation::copy_text(&text),
            PostAction::Replace => automation::paste_into_origin(&text, origin.as_deref()),
        }
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::warn!("post-action for {} failed: {err}", template.name),
        Err(err) => log::warn!("post-action task for {} failed: {err}", template.name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_accelerator() {
        let accel = parse_accelerator("Alt+S").expect("parse");
        assert_eq!(accel.render(), "Alt+S");
        assert_eq!(accel.code, Code::KeyS);
    }

    #[test]
    fn parse_is_lenient_on_case_and_whitespace() {
        let accel = parse_accelerator("  ctrl +  shift + p ").expect("parse");
        assert_eq!(accel.render(), "Ctrl+Shift+P");
    }

    #[test]
    fn render_parse_round_trip_is_identity() {
        for raw in [
            "Ctrl+Alt+Shift+Super+F12",
            "Alt+Space",
            "Ctrl+PageDown",
            "Shift+,",
            "Super+Enter",
        ] {
            let accel = parse_accelerator(raw).expect("parse");
            let rendered = accel.render();
            let reparsed = parse_accelerator(&rendered).expect("reparse");
            assert_eq!(accel, reparsed, "round trip failed for {raw}");
            assert_eq!(rendered, reparsed.render());
        }
    }

    #[test]
    fn modifier_order_is_normalized() {
        let accel = parse_accelerator("Shift+Ctrl+A").expect("parse");
        assert_eq!(accel.render(), "Ctrl+Shift+A");
    }

    #[test]
    fn command_or_control_maps_per_platform() {
        let accel = parse_accelerator("CommandOrControl+K").expect("parse");
        if cfg!(target_os = "macos") {
            assert_eq!(accel.render(), "Super+K");
        } else {
            assert_eq!(accel.render(), "Ctrl+K");
        }
    }

    #[test]
    fn rejects_duplicate_modifiers() {
        assert!(parse_accelerator("Ctrl+Ctrl+A").is_err());
        assert!(parse_accelerator("Ctrl+Control+A").is_err());
    }

    #[test]
    fn rejects_missing_or_multiple_keys() {
        assert!(parse_accelerator("Ctrl+Shift").is_err());
        assert!(parse_accelerator("Ctrl+A+B").is_err());
        assert!(parse_accelerator("").is_err());
        assert!(parse_accelerator("Ctrl+Fn1").is_err());
    }

    fn action_map(entries: &[(&str, BindingAction)]) -> HashMap<String, BindingAction> {
        entries
            .iter()
            .map(|(canonical, action)| (canonical.to_string(), action.clone()))
            .collect()
    }

    #[test]
    fn plan_sync_swaps_changed_bindings() {
        let current = action_map(&[("Alt+S", BindingAction::Popup)]);
        let desired = action_map(&[
            ("Alt+Q", BindingAction::Popup),
            ("Ctrl+T", BindingAction::Template("t1".to_string())),
        ]);
        let (remove, add) = plan_sync(&current, &desired);
        assert_eq!(remove, vec!["Alt+S".to_string()]);
        assert_eq!(add, vec!["Alt+Q".to_string(), "Ctrl+T".to_string()]);
    }

    #[test]
    fn plan_sync_reregisters_when_action_changes() {
        let current = action_map(&[("Alt+S", BindingAction::Popup)]);
        let desired = action_map(&[("Alt+S", BindingAction::Template("t1".to_string()))]);
        let (remove, add) = plan_sync(&current, &desired);
        assert_eq!(remove, vec!["Alt+S".to_string()]);
        assert_eq!(add, vec!["Alt+S".to_string()]);
    }

    #[test]
    fn plan_sync_leaves_unchanged_bindings_alone() {
        let current = action_map(&[("Alt+S", BindingAction::Popup)]);
        let desired = action_map(&[
            ("Alt+S", BindingAction::Popup),
            ("Alt+Shift+S", BindingAction::Screenshot),
        ]);
        let (remove, add) = plan_sync(&current, &desired);
        assert!(remove.is_empty());
        assert_eq!(add, vec!["Alt+Shift+S".to_string()]);
    }

    #[test]
    fn desired_bindings_cover_popup_screenshot_and_templates() {
        let config = AppConfig::default();
        let (desired, failures) = desired_bindings(&config);
        assert!(failures.is_empty());
        assert_eq!(desired.get("Alt+S").map(|(_, action)| action), Some(&BindingAction::Popup));
        assert_eq!(
            desired.get("Alt+Shift+S").map(|(_, action)| action),
            Some(&BindingAction::Screenshot)
        );
        assert_eq!(
            desired.get("Alt+Shift+Q").map(|(_, action)| action),
            Some(&BindingAction::Template("background_translate".to_string()))
        );
        assert_eq!(
            desired.get("Alt+Q").map(|(_, action)| action),
            Some(&BindingAction::Template("translate".to_string()))
        );
    }

    #[test]
    fn desired_bindings_reports_parse_failures() {
        let mut config = AppConfig::default();
        config.hotkeys.popup_hotkey = "NotAKey+Q".to_string();
        let (desired, failures) = desired_bindings(&config);
        assert!(!desired.contains_key("NotAKey+Q"));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "NotAKey+Q");
    }
}
