use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;

type Handler = Box<dyn FnMut(&[Value]) -> anyhow::Result<()> + Send>;

/// Named notification channel from the editor to its host.
///
/// One handler per name; registering again replaces the previous handler.
/// Handler failures never reach the emitter.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<String, Handler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: FnMut(&[Value]) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            tracing::debug!(event = %name, "replaced event handler");
        }
    }

    pub fn off(&mut self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Invokes the handler for `name`, if any. Returns whether one ran
    /// successfully.
    pub fn emit(&mut self, name: &str, args: &[Value]) -> bool {
        let Some(handler) = self.handlers.get_mut(name) else {
            tracing::debug!(event = name, "no handler registered");
            return false;
        };
        match catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::error!(event = name, error = %err, "event handler failed");
                false
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(event = name, panic = %message, "event handler panicked");
                false
            }
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("EventBus").field("handlers", &names).finish()
    }
}
