//! User-facing messages and their payloads.

use rmpv::Value;

use crate::settings::Settings;

/// The payload of a [`Message`].
///
/// Most payloads are generic structured values, but two kinds get their own
/// tagged wire encoding: the port-closed sentinel, and a settings object
/// sent as ordinary data (distinct from the per-message overlay). Modeling
/// them as variants keeps the special tags out of user code; the codec maps
/// them to stable extension type numbers on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// A generic structured value.
    Value(Value),
    /// A settings object sent as the payload proper.
    Settings(Settings),
    /// Sentinel: no further messages will arrive on this port.
    ClosePort,
}

impl Data {
    /// Creates a generic value payload.
    pub fn value(value: impl Into<Value>) -> Self {
        Data::Value(value.into())
    }

    /// Returns whether this payload is the port-closed sentinel.
    pub fn is_close_port(&self) -> bool {
        matches!(self, Data::ClosePort)
    }

    /// Returns the generic value, if this is a [`Data::Value`] payload.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Data::Value(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the settings, if this is a [`Data::Settings`] payload.
    pub fn as_settings(&self) -> Option<&Settings> {
        match self {
            Data::Settings(settings) => Some(settings),
            _ => None,
        }
    }
}

impl From<Value> for Data {
    fn from(value: Value) -> Self {
        Data::Value(value)
    }
}

impl From<Settings> for Data {
    fn from(settings: Settings) -> Self {
        Data::Settings(settings)
    }
}

/// A message to be sent or that has been received.
///
/// This is what user code works with; the wire representation is
/// [`Envelope`](crate::Envelope). Timestamps are simulation time, not wall
/// clock: `timestamp` is the time the payload is valid for, and
/// `next_timestamp` the time of the next message expected on the same port,
/// if known.
///
/// On the send path `settings` may be left `None` (an empty overlay is
/// transmitted); on the receive path it is always `Some`.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Simulation time for which the payload is valid.
    pub timestamp: f64,
    /// Simulation time of the next message on this port, if known.
    pub next_timestamp: Option<f64>,
    /// The payload.
    pub data: Data,
    /// The parameter overlay travelling with the payload.
    pub settings: Option<Settings>,
}

impl Message {
    /// Creates a Message without a next timestamp or settings overlay.
    pub fn new(timestamp: f64, data: impl Into<Data>) -> Self {
        Self {
            timestamp,
            next_timestamp: None,
            data: data.into(),
            settings: None,
        }
    }

    /// Sets the expected timestamp of the next message on the port.
    pub fn with_next_timestamp(mut self, next_timestamp: f64) -> Self {
        self.next_timestamp = Some(next_timestamp);
        self
    }

    /// Attaches a settings overlay.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }
}
