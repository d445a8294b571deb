//! Core types for the state store.

use crate::error::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter shared by every registry so identities never collide.
static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a store.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StoreId(pub u64);

impl StoreId {
    /// Allocate a fresh identity.
    pub fn next() -> Self {
        StoreId(NEXT_STORE_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Debug for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreId({})", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A full snapshot of a store: one flat keyed record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Map<String, Value>);

impl State {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a state from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidState(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// Build a state from a struct; its fields become the key set.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Read the state back into a typed record.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new snapshot with `change` laid over this one.
    pub fn merged(&self, change: &StateChange) -> State {
        let mut map = self.0.clone();
        for (key, value) in change.iter() {
            map.insert(key.clone(), value.clone());
        }
        State(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for State {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A sparse key-to-value mapping.
///
/// Used both for a single requested mutation and for the aggregate of all
/// mutations since the last provider pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateChange(Map<String, Value>);

impl StateChange {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a change from a JSON object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidState(format!(
                "expected a JSON object, got {}",
                kind_of(&other)
            ))),
        }
    }

    /// A change touching exactly one key.
    pub fn single(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(key, value)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Overwrite per key with the entries of `other` (last write wins).
    pub fn extend(&mut self, other: &StateChange) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for StateChange {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Log handed to `beforeSetState` and `afterSetState`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLog {
    /// The change requested by this call only.
    pub state_change: StateChange,
    /// Base snapshot merged with the aggregate before this call.
    pub old_state: State,
    /// Base snapshot merged with the aggregate including this call.
    pub new_state: State,
    /// Captured frames, most recent first.
    pub stack: Vec<String>,
    /// The frame the update is attributed to.
    pub caller: String,
}

/// Log handed to `newProviderValue`, once per provider pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassLog {
    /// State as of the previous pass.
    pub old_state: State,
    /// Live state re-derived for this pass.
    pub new_state: State,
    /// Union of every change since the previous pass.
    pub state_change: StateChange,
    /// 1-based pass number.
    pub pass: u64,
}

/// The three points at which middleware is invoked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Hook {
    BeforeSetState,
    AfterSetState,
    NewProviderValue,
}

impl Hook {
    pub fn name(self) -> &'static str {
        match self {
            Hook::BeforeSetState => "beforeSetState",
            Hook::AfterSetState => "afterSetState",
            Hook::NewProviderValue => "newProviderValue",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_ids_are_unique() {
        let a = StoreId::next();
        let b = StoreId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_merged_leaves_original_untouched() {
        let state = State::new().with("count", 0).with("name", "a");
        let next = state.merged(&StateChange::single("count", 5));

        assert_eq!(state.get("count"), Some(&json!(0)));
        assert_eq!(next.get("count"), Some(&json!(5)));
        assert_eq!(next.get("name"), Some(&json!("a")));
    }

    #[test]
    fn test_extend_last_write_wins() {
        let mut change = StateChange::new().with("a", 1).with("b", 1);
        change.extend(&StateChange::new().with("b", 2).with("c", 3));

        assert_eq!(change.get("a"), Some(&json!(1)));
        assert_eq!(change.get("b"), Some(&json!(2)));
        assert_eq!(change.get("c"), Some(&json!(3)));
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        let result = State::from_value(json!([1, 2]));
        assert!(matches!(result, Err(StoreError::InvalidState(_))));

        let result = StateChange::from_value(json!("nope"));
        assert!(matches!(result, Err(StoreError::InvalidState(_))));
    }

    #[test]
    fn test_typed_round_trip() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Counter {
            count: u32,
            label: String,
        }

        let state = State::from_serializable(&Counter {
            count: 3,
            label: "clicks".into(),
        })
        .unwrap();
        assert_eq!(state.keys().count(), 2);

        let back: Counter = state
            .merged(&StateChange::single("count", 4))
            .deserialize_into()
            .unwrap();
        assert_eq!(back.count, 4);
        assert_eq!(back.label, "clicks");
    }

    #[test]
    fn test_hook_names() {
        assert_eq!(Hook::BeforeSetState.to_string(), "beforeSetState");
        assert_eq!(Hook::NewProviderValue.name(), "newProviderValue");
    }
}
