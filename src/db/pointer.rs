use std::sync::Mutex;

use anyhow::Result;

/// Key under which the last-active session id is persisted.
pub const CURRENT_SESSION_KEY: &str = "current_session_id";

/// Durable pointer to the last-active session.
///
/// The store sets it whenever the loaded session changes to a new id and
/// clears it whenever no session is loaded.
pub trait SessionPointer: Send + Sync {
    fn load(&self) -> Result<Option<String>>;

    fn store(&self, session_id: &str) -> Result<()>;

    fn clear(&self) -> Result<()>;
}

/// Process-local pointer, for tests and throwaway stores.
#[derive(Debug, Default)]
pub struct MemoryPointer {
    value: Mutex<Option<String>>,
}

impl MemoryPointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a pointer already set, as if left by an earlier run.
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(session_id.into())),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.value.lock().expect("pointer lock poisoned").clone()
    }
}

impl SessionPointer for MemoryPointer {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.get())
    }

    fn store(&self, session_id: &str) -> Result<()> {
        *self.value.lock().expect("pointer lock poisoned") = Some(session_id.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.value.lock().expect("pointer lock poisoned") = None;
        Ok(())
    }
}
