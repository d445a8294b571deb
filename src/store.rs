//! Main Store struct tying all components together.

use crate::aggregator::ChangeAggregator;
use crate::binding::{Accessor, Binding, ConsumedState};
use crate::caller::{self, Attribution};
use crate::error::{Result, StoreError};
use crate::middleware::{LogSharing, Middleware, MiddlewarePipeline};
use crate::types::{Hook, State, StateChange, StoreId, UpdateLog};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// The rendering side of a store: told whenever the live state changes.
pub trait RenderScheduler: Send + Sync {
    fn request_render(&self, store: StoreId);
}

/// Store configuration.
#[derive(Clone)]
pub struct StoreConfig {
    /// Name used in logs.
    pub name: Option<String>,

    /// How updates are attributed to a call site.
    pub attribution: Attribution,

    /// Symbol prefixes treated as store machinery when resolving callers
    /// from a backtrace.
    pub internal_frames: Vec<String>,

    /// How the log is shared between hooks of one update.
    pub log_sharing: LogSharing,

    /// Notified on every commit.
    pub render_scheduler: Option<Arc<dyn RenderScheduler>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: None,
            attribution: Attribution::default(),
            internal_frames: caller::default_internal_frames(),
            log_sharing: LogSharing::default(),
            render_scheduler: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("name", &self.name)
            .field("attribution", &self.attribution)
            .field("internal_frames", &self.internal_frames)
            .field("log_sharing", &self.log_sharing)
            .field("render_scheduler", &self.render_scheduler.is_some())
            .finish()
    }
}

struct Shared {
    id: StoreId,
    config: StoreConfig,
    /// Fixed at creation.
    keys: BTreeSet<String>,
    /// State the binding layer renders from.
    live: RwLock<State>,
    aggregator: Mutex<ChangeAggregator>,
    pipeline: MiddlewarePipeline,
    render_requests: AtomicU64,
}

/// A keyed state container.
///
/// Provides:
/// - Partial updates, aggregated until the next provider pass
/// - Middleware around every update and once per pass
/// - Attribution of every update to its call site
///
/// `Store` is a handle; clones refer to the same container.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Shared>,
}

impl Store {
    /// Create a store. An empty middleware list leaves the pipeline open for
    /// a later [`Store::register_middleware`].
    pub fn new(
        initial: State,
        middlewares: Vec<Arc<dyn Middleware>>,
        config: StoreConfig,
    ) -> Result<Self> {
        Self::with_id(StoreId::next(), initial, middlewares, config)
    }

    pub(crate) fn with_id(
        id: StoreId,
        initial: State,
        middlewares: Vec<Arc<dyn Middleware>>,
        config: StoreConfig,
    ) -> Result<Self> {
        let pipeline = MiddlewarePipeline::new(id);
        if !middlewares.is_empty() {
            pipeline.register(middlewares)?;
        }

        info!(
            store = %id,
            name = config.name.as_deref().unwrap_or(""),
            keys = initial.len(),
            middlewares = pipeline.len(),
            "Created store"
        );

        Ok(Self {
            inner: Arc::new(Shared {
                id,
                keys: initial.keys().cloned().collect(),
                live: RwLock::new(initial.clone()),
                aggregator: Mutex::new(ChangeAggregator::new(initial)),
                pipeline,
                render_requests: AtomicU64::new(0),
                config,
            }),
        })
    }

    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Register the middleware list; allowed once per store.
    pub fn register_middleware(&self, middlewares: Vec<Arc<dyn Middleware>>) -> Result<()> {
        self.inner.pipeline.register(middlewares)
    }

    // --- Reads ---

    /// The live state.
    pub fn state(&self) -> State {
        self.inner.live.read().clone()
    }

    /// Live value of one key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.live.read().get(key).cloned()
    }

    /// The declared key set.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys.iter()
    }

    /// Changes aggregated since the last provider pass.
    pub fn pending_change(&self) -> StateChange {
        self.inner.aggregator.lock().pending().clone()
    }

    /// State as of the last provider pass.
    pub fn last_committed(&self) -> State {
        self.inner.aggregator.lock().last_committed().clone()
    }

    /// Provider passes run so far.
    pub fn passes(&self) -> u64 {
        self.inner.aggregator.lock().passes()
    }

    /// Commits that asked the binding layer to re-render.
    pub fn render_requests(&self) -> u64 {
        self.inner.render_requests.load(Ordering::SeqCst)
    }

    // --- Updates ---

    /// Merge a partial change, run the hooks around it, and commit it.
    ///
    /// The new state is the last pass's snapshot merged with every change
    /// since then, this one included. `beforeSetState` sees it before it is
    /// live, `afterSetState` after. A failing `beforeSetState` hook vetoes the
    /// change: it is neither aggregated nor committed. A failing
    /// `afterSetState` hook does not undo the commit.
    ///
    /// With the default [`Attribution::Location`] the log's `stack` is the
    /// single `file:line:col` of this call; [`Attribution::Backtrace`]
    /// captures the full call stack and resolves the caller from it.
    #[track_caller]
    pub fn update(&self, change: StateChange) -> Result<()> {
        self.update_with(change, Location::caller(), None)
    }

    /// Like [`Store::update`], attributed to `label` instead of a call site.
    #[track_caller]
    pub fn update_labeled(&self, label: impl Into<String>, change: StateChange) -> Result<()> {
        self.update_with(change, Location::caller(), Some(label.into()))
    }

    /// Update a single key.
    #[track_caller]
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.update_with(StateChange::single(key, value), Location::caller(), None)
    }

    fn update_with(
        &self,
        change: StateChange,
        location: &'static Location<'static>,
        label: Option<String>,
    ) -> Result<()> {
        let inner = &self.inner;
        self.check_keys(&change)?;

        let (stack, caller) = match label {
            Some(label) => (vec![label.clone()], label),
            None => caller::attribute(
                inner.config.attribution,
                location,
                &inner.config.internal_frames,
            )?,
        };

        let mut log = {
            let aggregator = inner.aggregator.lock();
            let old_state = aggregator.projected();
            UpdateLog {
                new_state: old_state.merged(&change),
                old_state,
                state_change: change.clone(),
                stack,
                caller,
            }
        };
        let sharing = inner.config.log_sharing;

        inner
            .pipeline
            .dispatch_update(Hook::BeforeSetState, &mut log, sharing)?;

        // Re-read under the lock: hooks may have re-entered and merged more.
        {
            let mut aggregator = inner.aggregator.lock();
            aggregator.merge(&change);
            *inner.live.write() = aggregator.projected();
        }
        self.request_render();
        debug!(
            store = %inner.id,
            caller = %log.caller,
            keys = ?log.state_change.keys().collect::<Vec<_>>(),
            "Committed update"
        );

        inner
            .pipeline
            .dispatch_update(Hook::AfterSetState, &mut log, sharing)
    }

    fn check_keys(&self, change: &StateChange) -> Result<()> {
        match change.keys().find(|key| !self.inner.keys.contains(*key)) {
            Some(key) => Err(StoreError::UnknownKey {
                store: self.inner.id,
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Replace the live state and ask for a re-render.
    fn commit(&self, state: State) {
        *self.inner.live.write() = state;
        self.request_render();
    }

    fn request_render(&self) {
        self.inner.render_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(scheduler) = &self.inner.config.render_scheduler {
            scheduler.request_render(self.inner.id);
        }
    }

    /// Replace the live state without aggregation or hooks.
    pub(crate) fn commit_raw(&self, state: State) -> Result<()> {
        if let Some(key) = state.keys().find(|key| !self.inner.keys.contains(*key)) {
            return Err(StoreError::UnknownKey {
                store: self.inner.id,
                key: key.clone(),
            });
        }
        debug!(store = %self.inner.id, "Committed raw state");
        self.commit(state);
        Ok(())
    }

    // --- Binding Layer ---

    /// Run one provider pass.
    ///
    /// Called by the binding layer once per rendering pass: the live state is
    /// re-derived, the aggregated change is flushed, `newProviderValue` runs
    /// once, and a fresh binding value is returned.
    pub fn provider_pass(&self) -> Result<Binding> {
        let inner = &self.inner;
        let current = self.state();
        let mut log = inner.aggregator.lock().flush(current.clone());

        debug!(
            store = %inner.id,
            pass = log.pass,
            changed = log.state_change.len(),
            "Provider pass"
        );

        inner.pipeline.dispatch_pass(&mut log, inner.config.log_sharing)?;
        Ok(Binding::new(self.clone(), current))
    }

    /// Mount the store: the first provider pass.
    pub fn mount(&self) -> Result<Binding> {
        self.provider_pass()
    }

    /// Per-key `(value, setter)` view of the live state.
    pub fn accessors(&self) -> BTreeMap<String, Accessor> {
        Accessor::view(self, &self.state())
    }

    /// Read the live state with raw setters, outside any provider pass.
    pub fn consume(&self) -> ConsumedState {
        ConsumedState::new(self.clone(), self.state())
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("name", &self.inner.config.name)
            .finish()
    }
}
