//! Encoding of payloads and overlays to MessagePack bytes.
//!
//! Payloads are generic structured values, except for two special kinds
//! that ride inside the generic encoding as tagged extension values: the
//! port-closed sentinel and settings-as-payload. The tag numbers are part of
//! the wire contract and must never change.

use rmpv::{decode, encode, Value};

use crate::error::{Error, Result};
use crate::message::Data;
use crate::settings::Settings;

/// Extension type tag for the port-closed sentinel.
pub const EXT_CLOSE_PORT: i8 = 0;
/// Extension type tag for a settings object sent as payload.
pub const EXT_SETTINGS: i8 = 1;

/// Encodes a structured value to bytes.
pub fn encode_value(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    encode::write_value(&mut buf, value).expect("writing to a Vec cannot fail");
    buf
}

/// Decodes a structured value from bytes.
pub fn decode_value(mut bytes: &[u8]) -> Result<Value> {
    decode::read_value(&mut bytes).map_err(|err| Error::Codec(err.to_string()))
}

/// Encodes a payload for transmission.
///
/// The port-closed sentinel becomes an empty extension value with tag
/// [`EXT_CLOSE_PORT`]; a settings payload becomes an extension value with
/// tag [`EXT_SETTINGS`] wrapping its own encoded map. Everything else is
/// encoded as a plain value.
pub fn encode_data(data: &Data) -> Vec<u8> {
    let value = match data {
        Data::ClosePort => Value::Ext(EXT_CLOSE_PORT, Vec::new()),
        Data::Settings(settings) => {
            Value::Ext(EXT_SETTINGS, encode_value(&settings.as_value()))
        }
        Data::Value(value) => value.clone(),
    };
    encode_value(&value)
}

/// Decodes a received payload, unwrapping the tagged special kinds.
pub fn decode_data(bytes: &[u8]) -> Result<Data> {
    match decode_value(bytes)? {
        Value::Ext(EXT_CLOSE_PORT, _) => Ok(Data::ClosePort),
        Value::Ext(EXT_SETTINGS, packed) => {
            Ok(Data::Settings(Settings::from_value(decode_value(&packed)?)?))
        }
        Value::Ext(tag, _) => Err(Error::Codec(format!("unknown extension type {}", tag))),
        value => Ok(Data::Value(value)),
    }
}

/// Encodes a parameter overlay for transmission.
pub fn encode_settings(settings: &Settings) -> Vec<u8> {
    encode_value(&settings.as_value())
}

/// Decodes a received parameter overlay.
pub fn decode_settings(bytes: &[u8]) -> Result<Settings> {
    Settings::from_value(decode_value(bytes)?)
}
