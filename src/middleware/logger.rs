//! Middleware that reports store activity through `tracing`.

use super::pipeline::{HookResult, Middleware};
use crate::types::{PassLog, UpdateLog};
use tracing::Level;

macro_rules! emit {
    ($level:expr, $($rest:tt)+) => {
        match $level {
            Level::ERROR => tracing::event!(Level::ERROR, $($rest)+),
            Level::WARN => tracing::event!(Level::WARN, $($rest)+),
            Level::INFO => tracing::event!(Level::INFO, $($rest)+),
            Level::DEBUG => tracing::event!(Level::DEBUG, $($rest)+),
            _ => tracing::event!(Level::TRACE, $($rest)+),
        }
    };
}

/// Logs every committed update and every provider pass.
#[derive(Clone, Debug)]
pub struct TracingMiddleware {
    name: String,
    level: Level,
}

impl TracingMiddleware {
    /// Log under `name` at INFO.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: Level::INFO,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Middleware for TracingMiddleware {
    fn after_set_state(&self, log: &mut UpdateLog) -> HookResult {
        let change = serde_json::to_string(&log.state_change)?;
        emit!(
            self.level,
            store = %self.name,
            caller = %log.caller,
            change = %change,
            "State updated"
        );
        Ok(())
    }

    fn new_provider_value(&self, log: &mut PassLog) -> HookResult {
        let change = serde_json::to_string(&log.state_change)?;
        emit!(
            self.level,
            store = %self.name,
            pass = log.pass,
            change = %change,
            "Provider value"
        );
        Ok(())
    }
}
