//! Parameter settings attached to and carried by messages.

use std::collections::BTreeMap;

use rmpv::Value;

use crate::error::{Error, Result};

/// An ordered mapping of parameter names to structured values.
///
/// Settings travel with every message as the parameter overlay, and can also
/// be sent as a first-class payload (see [`Data::Settings`](crate::Data)).
/// Keys are strings; values are anything the structured-value codec can
/// represent.
///
/// Conversion to and from the codec's value model happens only at the
/// encode/decode boundary, via [`Settings::as_value`] and
/// [`Settings::from_value`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    store: BTreeMap<String, Value>,
}

impl Settings {
    /// Creates an empty Settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of parameters in this Settings.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether this Settings holds no parameters.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns whether a parameter with the given name exists.
    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    /// Returns the value of a parameter, if set.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    /// Sets a parameter, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.store.insert(key.into(), value.into());
    }

    /// Removes a parameter, returning its value if it was set.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.store.remove(key)
    }

    /// Iterates over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.store.iter()
    }

    /// Expresses this Settings as a plain string-keyed map value.
    pub fn as_value(&self) -> Value {
        Value::Map(
            self.store
                .iter()
                .map(|(key, value)| (Value::from(key.as_str()), value.clone()))
                .collect(),
        )
    }

    /// Builds a Settings from a plain string-keyed map value.
    ///
    /// Fails with [`Error::Codec`] if the value is not a map or has a
    /// non-string key.
    pub fn from_value(value: Value) -> Result<Self> {
        let entries = match value {
            Value::Map(entries) => entries,
            other => {
                return Err(Error::Codec(format!(
                    "expected a settings map, got {}",
                    other
                )))
            }
        };

        let mut store = BTreeMap::new();
        for (key, value) in entries {
            let key = key
                .as_str()
                .ok_or_else(|| Error::Codec(format!("non-string settings key {}", key)))?;
            store.insert(key.to_string(), value);
        }
        Ok(Self { store })
    }
}
