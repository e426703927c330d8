use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::DnodeError;
use crate::partial::Partial;
use crate::scrub::CallbackMap;

/// A method selector: a named handler, or the integer id of a previously
/// scrubbed callback on the receiving side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Method {
    Id(u64),
    Name(String),
}

impl Method {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Method::Name(name) => Some(name),
            Method::Id(_) => None,
        }
    }

    pub fn as_id(&self) -> Option<u64> {
        match self {
            Method::Id(id) => Some(*id),
            Method::Name(_) => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Id(id) => write!(f, "{id}"),
            Method::Name(name) => f.write_str(name),
        }
    }
}

impl From<&str> for Method {
    fn from(name: &str) -> Self {
        Method::Name(name.to_string())
    }
}

impl From<u64> for Method {
    fn from(id: u64) -> Self {
        Method::Id(id)
    }
}

/// The dnode envelope.
///
/// `arguments` is captured as raw JSON and decoded lazily through a
/// [`Partial`], because only the dispatcher knows the shape the resolved
/// handler expects. `links` is reserved by the dialect and always an
/// empty array.
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub method: Method,
    #[serde(default)]
    pub arguments: Option<Box<RawValue>>,
    #[serde(default)]
    pub callbacks: CallbackMap,
    #[serde(default)]
    pub links: Vec<serde_json::Value>,
}

impl Message {
    /// Build an outgoing envelope from a scrubbed argument tree.
    pub fn outgoing(
        method: Method,
        arguments: &serde_json::Value,
        callbacks: CallbackMap,
    ) -> Result<Message, DnodeError> {
        let raw = RawValue::from_string(arguments.to_string())
            .map_err(|e| DnodeError::Encode(e.to_string()))?;
        Ok(Message {
            method,
            arguments: Some(raw),
            callbacks,
            links: Vec::new(),
        })
    }

    /// Parse a received frame.
    pub fn decode(frame: &str) -> Result<Message, DnodeError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Render for the wire.
    pub fn encode(&self) -> Result<String, DnodeError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The argument fragment as a lazily-decoded holder. A frame without
    /// arguments decodes as JSON `null`.
    pub fn arguments_partial(&self) -> Partial {
        match &self.arguments {
            Some(raw) => Partial::from_raw(raw.get()),
            None => Partial::from_raw("null"),
        }
    }
}
