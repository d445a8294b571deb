//! Values handed to the binding layer and to application code.
//!
//! A [`Binding`] is what one provider pass produces: the state of that pass,
//! a `set_state` that runs the full update path, and one [`Accessor`] per
//! key. A [`ConsumedState`] reads the live state directly; its setters
//! replace the state raw, skipping aggregation and the update hooks.

use crate::error::Result;
use crate::store::Store;
use crate::types::{State, StateChange, StoreId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Binding value of one provider pass.
#[derive(Clone, Debug)]
pub struct Binding {
    store: Store,
    state: State,
    use_state: BTreeMap<String, Accessor>,
}

impl Binding {
    pub(crate) fn new(store: Store, state: State) -> Self {
        let use_state = Accessor::view(&store, &state);
        Self {
            store,
            state,
            use_state,
        }
    }

    pub fn store_id(&self) -> StoreId {
        self.store.id()
    }

    /// State as of this pass.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// State of this pass as a typed record.
    pub fn state_as<T: DeserializeOwned>(&self) -> Result<T> {
        self.state.deserialize_into()
    }

    /// Full update path: aggregated, attributed, hooks run.
    #[track_caller]
    pub fn set_state(&self, change: StateChange) -> Result<()> {
        self.store.update(change)
    }

    /// `(value, setter)` per key.
    pub fn use_state(&self) -> &BTreeMap<String, Accessor> {
        &self.use_state
    }

    pub fn accessor(&self, key: &str) -> Option<&Accessor> {
        self.use_state.get(key)
    }
}

/// A value paired with the setter for its key.
#[derive(Clone, Debug)]
pub struct Accessor {
    value: Value,
    setter: Setter,
}

impl Accessor {
    /// One accessor per key of `state`.
    pub(crate) fn view(store: &Store, state: &State) -> BTreeMap<String, Accessor> {
        state
            .iter()
            .map(|(key, value)| {
                let accessor = Accessor {
                    value: value.clone(),
                    setter: Setter {
                        store: store.clone(),
                        key: key.clone(),
                    },
                };
                (key.clone(), accessor)
            })
            .collect()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The value as a typed field.
    pub fn get<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    pub fn setter(&self) -> &Setter {
        &self.setter
    }

    #[track_caller]
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.setter.set(value)
    }

    pub fn into_pair(self) -> (Value, Setter) {
        (self.value, self.setter)
    }
}

/// Updates a single key through the full update path.
#[derive(Clone, Debug)]
pub struct Setter {
    store: Store,
    key: String,
}

impl Setter {
    pub fn key(&self) -> &str {
        &self.key
    }

    #[track_caller]
    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.store
            .update(StateChange::single(self.key.clone(), value))
    }
}

/// The live state read outside a provider pass.
#[derive(Clone, Debug)]
pub struct ConsumedState {
    state: Arc<State>,
    use_state: BTreeMap<String, RawAccessor>,
}

impl ConsumedState {
    pub(crate) fn new(store: Store, state: State) -> Self {
        let state = Arc::new(state);
        let use_state = state
            .iter()
            .map(|(key, value)| {
                let accessor = RawAccessor {
                    value: value.clone(),
                    setter: RawSetter {
                        store: store.clone(),
                        snapshot: Arc::clone(&state),
                        key: key.clone(),
                    },
                };
                (key.clone(), accessor)
            })
            .collect();

        Self { state, use_state }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn use_state(&self) -> &BTreeMap<String, RawAccessor> {
        &self.use_state
    }

    pub fn accessor(&self, key: &str) -> Option<&RawAccessor> {
        self.use_state.get(key)
    }
}

/// A value paired with its raw setter.
#[derive(Clone, Debug)]
pub struct RawAccessor {
    value: Value,
    setter: RawSetter,
}

impl RawAccessor {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn get<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.value.clone())?)
    }

    pub fn setter(&self) -> &RawSetter {
        &self.setter
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        self.setter.set(value)
    }
}

/// Replaces the live state with the consumed snapshot plus one key.
///
/// Nothing is aggregated and no update hook runs, so the next provider pass
/// reports the new state without the change that produced it. Changes made
/// after the snapshot was consumed are overwritten.
#[derive(Clone, Debug)]
pub struct RawSetter {
    store: Store,
    snapshot: Arc<State>,
    key: String,
}

impl RawSetter {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&self, value: impl Into<Value>) -> Result<()> {
        let next = self
            .snapshot
            .merged(&StateChange::single(self.key.clone(), value));
        self.store.commit_raw(next)
    }
}
