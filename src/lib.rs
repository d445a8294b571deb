//! # State Context
//!
//! A keyed state container shared by many parts of a UI layer, with
//! observers notified around every mutation and once per rendering pass.
//!
//! ## Core Concepts
//!
//! - **Store**: one flat keyed record; its key set is fixed at creation
//! - **Updates**: partial changes, merged over the running aggregate
//! - **Provider pass**: one rendering cycle, closed by a single flush that
//!   reports everything changed since the previous pass
//! - **Middleware**: `beforeSetState`, `afterSetState`, `newProviderValue`
//! - **Attribution**: every update carries the call site that made it
//!
//! ## Example
//!
//! ```ignore
//! use state_context::{Hooks, State, StateChange, StoreRegistry};
//! use std::sync::Arc;
//!
//! let registry = StoreRegistry::new();
//! let logger = Hooks::new().new_provider_value(|log| {
//!     println!("pass {}: {:?}", log.pass, log.state_change);
//!     Ok(())
//! });
//! let id = registry.create_store(State::new().with("count", 0), vec![Arc::new(logger)])?;
//!
//! // Binding layer, once per rendering pass
//! let binding = registry.mount(id)?;
//!
//! // Application code
//! binding.accessor("count").unwrap().set(1)?;
//! binding.set_state(StateChange::single("count", 2))?;
//!
//! // Next pass reports {count: 2} once
//! let binding = registry.provider_pass(id)?;
//! ```

pub mod aggregator;
pub mod binding;
pub mod caller;
pub mod error;
pub mod middleware;
pub mod registry;
pub mod store;
pub mod types;

// Re-exports
pub use aggregator::ChangeAggregator;
pub use binding::{Accessor, Binding, ConsumedState, RawAccessor, RawSetter, Setter};
pub use caller::Attribution;
pub use error::{HookError, Result, StoreError};
pub use middleware::{
    ChannelMiddleware, DropReason, EventFilter, HookResult, Hooks, LogSharing, Middleware,
    MiddlewarePipeline, StoreEvent, SubscriptionConfig, SubscriptionHandle, TracingMiddleware,
};
pub use registry::StoreRegistry;
pub use store::{RenderScheduler, Store, StoreConfig};
pub use types::*;
