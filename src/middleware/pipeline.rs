//! Ordered middleware dispatch.

use crate::error::{HookError, Result, StoreError};
use crate::types::{Hook, PassLog, StoreId, UpdateLog};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{trace, warn};

/// Outcome of a single hook.
pub type HookResult = std::result::Result<(), HookError>;

/// Observer of a store's updates and provider passes.
///
/// Every hook is optional: the provided methods do nothing, so an
/// implementation only overrides the points it cares about.
pub trait Middleware: Send + Sync {
    /// Runs before an update is committed.
    fn before_set_state(&self, _log: &mut UpdateLog) -> HookResult {
        Ok(())
    }

    /// Runs after an update is committed.
    fn after_set_state(&self, _log: &mut UpdateLog) -> HookResult {
        Ok(())
    }

    /// Runs once per provider pass with the aggregated change.
    fn new_provider_value(&self, _log: &mut PassLog) -> HookResult {
        Ok(())
    }
}

type UpdateHook = Box<dyn Fn(&mut UpdateLog) -> HookResult + Send + Sync>;
type PassHook = Box<dyn Fn(&mut PassLog) -> HookResult + Send + Sync>;

/// Middleware assembled from closures.
///
/// ```ignore
/// let audit = Hooks::new().after_set_state(|log| {
///     println!("{} changed {:?}", log.caller, log.state_change);
///     Ok(())
/// });
/// ```
#[derive(Default)]
pub struct Hooks {
    before: Option<UpdateHook>,
    after: Option<UpdateHook>,
    provider: Option<PassHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_set_state<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut UpdateLog) -> HookResult + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn after_set_state<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut UpdateLog) -> HookResult + Send + Sync + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }

    pub fn new_provider_value<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut PassLog) -> HookResult + Send + Sync + 'static,
    {
        self.provider = Some(Box::new(hook));
        self
    }

    /// Whether a hook is set for `hook`.
    pub fn has(&self, hook: Hook) -> bool {
        match hook {
            Hook::BeforeSetState => self.before.is_some(),
            Hook::AfterSetState => self.after.is_some(),
            Hook::NewProviderValue => self.provider.is_some(),
        }
    }
}

impl Middleware for Hooks {
    fn before_set_state(&self, log: &mut UpdateLog) -> HookResult {
        self.before.as_ref().map_or(Ok(()), |hook| hook(log))
    }

    fn after_set_state(&self, log: &mut UpdateLog) -> HookResult {
        self.after.as_ref().map_or(Ok(()), |hook| hook(log))
    }

    fn new_provider_value(&self, log: &mut PassLog) -> HookResult {
        self.provider.as_ref().map_or(Ok(()), |hook| hook(log))
    }
}

/// How a log is handed to successive hooks of one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogSharing {
    /// One log object flows through every hook; edits made by a hook are
    /// seen by all hooks after it, including `afterSetState`.
    #[default]
    Shared,
    /// Each hook receives its own copy of the log.
    Isolated,
}

/// Ordered middleware of one store.
pub struct MiddlewarePipeline {
    store: StoreId,
    middlewares: RwLock<Option<Arc<[Arc<dyn Middleware>]>>>,
}

impl MiddlewarePipeline {
    pub fn new(store: StoreId) -> Self {
        Self {
            store,
            middlewares: RwLock::new(None),
        }
    }

    /// Store the ordered middleware list. Allowed once.
    pub fn register(&self, middlewares: Vec<Arc<dyn Middleware>>) -> Result<()> {
        let mut slot = self.middlewares.write();
        if slot.is_some() {
            return Err(StoreError::MiddlewareAlreadyRegistered(self.store));
        }
        trace!(store = %self.store, count = middlewares.len(), "Registered middleware");
        *slot = Some(middlewares.into());
        Ok(())
    }

    pub fn is_registered(&self) -> bool {
        self.middlewares.read().is_some()
    }

    pub fn len(&self) -> usize {
        self.middlewares.read().as_ref().map_or(0, |list| list.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `beforeSetState` or `afterSetState` on every middleware.
    pub fn dispatch_update(
        &self,
        hook: Hook,
        log: &mut UpdateLog,
        sharing: LogSharing,
    ) -> Result<()> {
        self.dispatch(hook, log, sharing, |middleware, log| match hook {
            Hook::BeforeSetState => middleware.before_set_state(log),
            Hook::AfterSetState => middleware.after_set_state(log),
            Hook::NewProviderValue => Ok(()),
        })
    }

    /// Run `newProviderValue` on every middleware.
    pub fn dispatch_pass(&self, log: &mut PassLog, sharing: LogSharing) -> Result<()> {
        self.dispatch(Hook::NewProviderValue, log, sharing, |middleware, log| {
            middleware.new_provider_value(log)
        })
    }

    /// Invoke `call` on each middleware in registration order; the first
    /// failure stops the dispatch.
    fn dispatch<L, F>(&self, hook: Hook, log: &mut L, sharing: LogSharing, call: F) -> Result<()>
    where
        L: Clone,
        F: Fn(&dyn Middleware, &mut L) -> HookResult,
    {
        // Snapshot the list so hooks may re-enter the store.
        let Some(middlewares) = self.middlewares.read().clone() else {
            return Ok(());
        };

        for (index, middleware) in middlewares.iter().enumerate() {
            trace!(store = %self.store, %hook, index, "Dispatching hook");

            let outcome = match sharing {
                LogSharing::Shared => call(middleware.as_ref(), log),
                LogSharing::Isolated => {
                    let mut copy = log.clone();
                    call(middleware.as_ref(), &mut copy)
                }
            };

            if let Err(source) = outcome {
                warn!(store = %self.store, %hook, index, error = %source, "Middleware hook failed");
                return Err(StoreError::Middleware {
                    hook,
                    index,
                    source,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{State, StateChange};
    use parking_lot::Mutex;

    fn update_log() -> UpdateLog {
        UpdateLog {
            state_change: StateChange::single("count", 1),
            old_state: State::new().with("count", 0),
            new_state: State::new().with("count", 1),
            stack: vec!["frame".to_string()],
            caller: "frame".to_string(),
        }
    }

    fn recorder(name: &'static str, seen: Arc<Mutex<Vec<String>>>) -> Arc<dyn Middleware> {
        Arc::new(Hooks::new().before_set_state(move |_| {
            seen.lock().push(name.to_string());
            Ok(())
        }))
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new(StoreId(1));
        pipeline
            .register(vec![
                recorder("first", seen.clone()),
                Arc::new(Hooks::new()),
                recorder("second", seen.clone()),
            ])
            .unwrap();

        pipeline
            .dispatch_update(Hook::BeforeSetState, &mut update_log(), LogSharing::Shared)
            .unwrap();

        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_register_twice_fails() {
        let pipeline = MiddlewarePipeline::new(StoreId(7));
        pipeline.register(vec![]).unwrap();

        let result = pipeline.register(vec![]);
        assert!(matches!(
            result,
            Err(StoreError::MiddlewareAlreadyRegistered(StoreId(7)))
        ));
    }

    #[test]
    fn test_unregistered_pipeline_is_noop() {
        let pipeline = MiddlewarePipeline::new(StoreId(1));
        assert!(!pipeline.is_registered());
        pipeline
            .dispatch_update(Hook::AfterSetState, &mut update_log(), LogSharing::Shared)
            .unwrap();
    }

    #[test]
    fn test_failure_stops_remaining_hooks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = MiddlewarePipeline::new(StoreId(1));
        pipeline
            .register(vec![
                Arc::new(Hooks::new().before_set_state(|_| Err("boom".into()))),
                recorder("never", seen.clone()),
            ])
            .unwrap();

        let result =
            pipeline.dispatch_update(Hook::BeforeSetState, &mut update_log(), LogSharing::Shared);

        match result {
            Err(StoreError::Middleware { hook, index, .. }) => {
                assert_eq!(hook, Hook::BeforeSetState);
                assert_eq!(index, 0);
            }
            other => panic!("Expected middleware error, got {:?}", other),
        }
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_shared_log_edits_are_visible_downstream() {
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();

        let pipeline = MiddlewarePipeline::new(StoreId(1));
        pipeline
            .register(vec![
                Arc::new(Hooks::new().before_set_state(|log| {
                    log.caller = "rewritten".to_string();
                    Ok(())
                })),
                Arc::new(Hooks::new().before_set_state(move |log| {
                    *observed_clone.lock() = Some(log.caller.clone());
                    Ok(())
                })),
            ])
            .unwrap();

        let mut log = update_log();
        pipeline
            .dispatch_update(Hook::BeforeSetState, &mut log, LogSharing::Shared)
            .unwrap();

        assert_eq!(observed.lock().as_deref(), Some("rewritten"));
        assert_eq!(log.caller, "rewritten");
    }

    #[test]
    fn test_isolated_log_edits_stay_local() {
        let observed = Arc::new(Mutex::new(None));
        let observed_clone = observed.clone();

        let pipeline = MiddlewarePipeline::new(StoreId(1));
        pipeline
            .register(vec![
                Arc::new(Hooks::new().before_set_state(|log| {
                    log.caller = "rewritten".to_string();
                    Ok(())
                })),
                Arc::new(Hooks::new().before_set_state(move |log| {
                    *observed_clone.lock() = Some(log.caller.clone());
                    Ok(())
                })),
            ])
            .unwrap();

        let mut log = update_log();
        pipeline
            .dispatch_update(Hook::BeforeSetState, &mut log, LogSharing::Isolated)
            .unwrap();

        assert_eq!(observed.lock().as_deref(), Some("frame"));
        assert_eq!(log.caller, "frame");
    }

    #[test]
    fn test_hooks_has() {
        let hooks = Hooks::new().new_provider_value(|_| Ok(()));
        assert!(hooks.has(Hook::NewProviderValue));
        assert!(!hooks.has(Hook::BeforeSetState));
    }
}
