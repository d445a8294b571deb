//! Middleware: observers invoked around every update and once per pass.
//!
//! A store runs its middleware at three points:
//! - `beforeSetState`: an update has been attributed but not yet merged or committed
//! - `afterSetState`: the update is the live state
//! - `newProviderValue`: a provider pass flushed the aggregated change
//!
//! Hooks run synchronously in registration order. The first failing hook
//! stops the remaining hooks of that point and fails the surrounding call.
//!
//! # Example
//!
//! ```ignore
//! let audit = Hooks::new().before_set_state(|log| {
//!     println!("{} -> {:?}", log.caller, log.state_change);
//!     Ok(())
//! });
//! let (events, handle) = ChannelMiddleware::subscribe(SubscriptionConfig::default());
//!
//! let store = Store::new(initial, vec![Arc::new(audit), events], StoreConfig::default())?;
//! ```

mod channel;
mod logger;
mod pipeline;

pub use channel::{
    ChannelMiddleware, DropReason, EventFilter, StoreEvent, SubscriptionConfig, SubscriptionHandle,
};
pub use logger::TracingMiddleware;
pub use pipeline::{HookResult, Hooks, LogSharing, Middleware, MiddlewarePipeline};
