//! Typed accessors over an event's `extra` payload.
use feed_engine_shared::types::Event;
use uuid::Uuid;

use crate::errors::ProcessorError;

fn field<'a>(event: &'a Event, name: &str) -> Option<&'a serde_json::Value> {
    event.extra.get(name).filter(|value| !value.is_null())
}

pub fn required_actor(event: &Event) -> Result<Uuid, ProcessorError> {
    event.actor_id.ok_or_else(|| ProcessorError::missing("actor_id"))
}

pub fn optional_uuid(event: &Event, name: &str) -> Result<Option<Uuid>, ProcessorError> {
    match field(event, name) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .as_str()
                .ok_or_else(|| ProcessorError::invalid(name, "expected a uuid string"))?;
            Uuid::parse_str(raw)
                .map(Some)
                .map_err(|err| ProcessorError::invalid(name, err.to_string()))
        }
    }
}

pub fn required_uuid(event: &Event, name: &str) -> Result<Uuid, ProcessorError> {
    optional_uuid(event, name)?.ok_or_else(|| ProcessorError::missing(name))
}

pub fn optional_str<'a>(event: &'a Event, name: &str) -> Result<Option<&'a str>, ProcessorError> {
    match field(event, name) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| ProcessorError::invalid(name, "expected a string")),
    }
}

pub fn required_str<'a>(event: &'a Event, name: &str) -> Result<&'a str, ProcessorError> {
    optional_str(event, name)?.ok_or_else(|| ProcessorError::missing(name))
}

pub fn optional_i64(event: &Event, name: &str) -> Result<Option<i64>, ProcessorError> {
    match field(event, name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| ProcessorError::invalid(name, "expected an integer")),
    }
}

pub fn required_i64(event: &Event, name: &str) -> Result<i64, ProcessorError> {
    optional_i64(event, name)?.ok_or_else(|| ProcessorError::missing(name))
}

pub fn optional_bool(event: &Event, name: &str) -> Result<Option<bool>, ProcessorError> {
    match field(event, name) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| ProcessorError::invalid(name, "expected a boolean")),
    }
}
