//! Live handles to attached application instances.

use crate::errors::AutomationError;
use crate::platforms::AccessibilityEngine;
use crate::UIElement;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

/// One attached instance of the driven application
pub struct Session {
    id: String,
    process_id: u32,
    main_window_title: Option<String>,
    engine: Arc<dyn AccessibilityEngine>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("process_id", &self.process_id)
            .field("main_window_title", &self.main_window_title)
            .finish()
    }
}

impl Session {
    pub fn new(
        process_id: u32,
        main_window_title: Option<String>,
        engine: Arc<dyn AccessibilityEngine>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            process_id,
            main_window_title,
            engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Title captured when the session was opened
    pub fn main_window_title(&self) -> Option<&str> {
        self.main_window_title.as_deref()
    }

    pub fn engine(&self) -> &Arc<dyn AccessibilityEngine> {
        &self.engine
    }

    /// Looks the main window up again; windows can be recreated between calls.
    #[instrument(level = "debug", skip(self), fields(session = %self.id))]
    pub fn main_window(&self, timeout: Duration) -> Result<UIElement, AutomationError> {
        self.engine
            .main_window(self.process_id, timeout)
            .map_err(|e| match e {
                AutomationError::ElementNotFound(_) => {
                    AutomationError::ElementNotFound("Main window not found.".to_string())
                }
                AutomationError::Timeout(_) => AutomationError::Timeout("Main window not found.".to_string()),
                other => other,
            })
    }

    pub fn desktop(&self) -> Result<UIElement, AutomationError> {
        self.engine.desktop()
    }
}

/// Sessions opened by one automation host
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        debug!("registering session {}", session.id());
        self.sessions()
            .insert(session.id().to_string(), Arc::clone(&session));
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        if session_id.trim().is_empty() {
            return None;
        }
        self.sessions().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        if session_id.trim().is_empty() {
            return None;
        }
        self.sessions().remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
