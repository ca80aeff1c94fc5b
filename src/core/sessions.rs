use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One in-flight AI request.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: u64,
    pub cancel: Arc<AtomicBool>,
}

impl Session {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<u64, Arc<AtomicBool>>,
    /// The popup's single active session; older ones are cancelled on a
    /// new send.
    active: Option<u64>,
    replace_in_progress: bool,
}

/// Process-wide table of in-flight AI requests. Session ids are a monotonic
/// counter; cancellation is a per-session flag shared with the streaming
/// task.
pub struct SessionRegistry {
    next_id: AtomicU64,
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Begin a popup session, cancelling whichever session was active.
    pub fn begin_popup(&self) -> Session {
        let session = self.allocate();
        let mut inner = self.lock();
        if let Some(previous) = inner.active.take() {
            if let Some(cancel) = inner.sessions.get(&previous) {
                cancel.store(true, Ordering::Relaxed);
            }
        }
        inner.sessions.insert(session.id, session.cancel.clone());
        inner.active = Some(session.id);
        session
    }

    /// Begin a headless session for a background-mode template. Does not
    /// touch the popup's active session.
    pub fn begin_background(&self) -> Session {
        let session = self.allocate();
        self.lock()
            .sessions
            .insert(session.id, session.cancel.clone());
        session
    }

    pub fn finish(&self, id: u64) {
        let mut inner = self.lock();
        inner.sessions.remove(&id);
        if inner.active == Some(id) {
            inner.active = None;
        }
    }

    pub fn cancel_active(&self) {
        let mut inner = self.lock();
        if let Some(id) = inner.active.take() {
            if let Some(cancel) = inner.sessions.get(&id) {
                cancel.store(true, Ordering::Relaxed);
            }
        }
    }

    /// Popup-hide path: the active session dies unless a replace post-action
    /// is running to completion.
    pub fn cancel_active_unless_replacing(&self) {
        {
            let inner = self.lock();
            if inner.replace_in_progress {
                return;
            }
        }
        self.cancel_active();
    }

    pub fn cancel_all(&self) {
        let mut inner = self.lock();
        for cancel in inner.sessions.values() {
            cancel.store(true, Ordering::Relaxed);
        }
        inner.active = None;
    }

    pub fn set_replace_in_progress(&self, value: bool) {
        self.lock().replace_in_progress = value;
    }

    pub fn active_id(&self) -> Option<u64> {
        self.lock().active
    }

    fn allocate(&self) -> Session {
        Session {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic() {
        let registry = SessionRegistry::new();
        let first = registry.begin_popup();
        let second = registry.begin_popup();
        assert!(second.id > first.id);
    }

    #[test]
    fn new_popup_session_cancels_the_previous_one() {
        let registry = SessionRegistry::new();
        let first = registry.begin_popup();
        assert!(!first.is_cancelled());

        let second = registry.begin_popup();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(registry.active_id(), Some(second.id));
    }

    #[test]
    fn background_sessions_do_not_disturb_the_popup() {
        let registry = SessionRegistry::new();
        let popup = registry.begin_popup();
        let background = registry.begin_background();

        assert!(!popup.is_cancelled());
        assert_eq!(registry.active_id(), Some(popup.id));

        registry.finish(background.id);
        assert_eq!(registry.active_id(), Some(popup.id));
    }

    #[test]
    fn finish_clears_the_active_pointer() {
        let registry = SessionRegistry::new();
        let session = registry.begin_popup();
        registry.finish(session.id);
        assert_eq!(registry.active_id(), None);
    }

    #[test]
    fn cancel_active_unless_replacing_respects_the_latch() {
        let registry = SessionRegistry::new();
        let session = registry.begin_popup();

        registry.set_replace_in_progress(true);
        registry.cancel_active_unless_replacing();
        assert!(!session.is_cancelled());

        registry.set_replace_in_progress(false);
        registry.cancel_active_unless_replacing();
        assert!(session.is_cancelled());
    }

    #[test]
    fn cancel_all_reaches_background_sessions() {
        let registry = SessionRegistry::new();
        let popup = registry.begin_popup();
        let background = registry.begin_background();

        registry.cancel_all();
        assert!(popup.is_cancelled());
        assert!(background.is_cancelled());
        assert_eq!(registry.active_id(), None);
    }
}
