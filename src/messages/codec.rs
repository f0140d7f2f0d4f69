use super::types::{Message, KNOWN_TYPES};
use crate::random::MAX_ITERATION;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Default upper bound for a single payload
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Reasons a payload is refused
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Payload too large: {size} bytes exceeds maximum of {max_size} bytes")]
    TooLarge { size: usize, max_size: usize },

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Payload has no string 'type' field")]
    MissingType,

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Malformed {message_type} message: {source}")]
    Malformed {
        message_type: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Generator position {iteration} exceeds maximum of {max}")]
    IterationTooLarge { iteration: u64, max: u64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Validating decoder for peer payloads
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }
}

impl MessageCodec {
    pub fn new(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Decode a payload, accepting only known message shapes
    ///
    /// Checks run in order: size, JSON object, `type` discriminant, fields,
    /// generator position.
    pub fn decode(&self, payload: &str) -> Result<Message, ProtocolError> {
        if payload.len() > self.max_payload_size {
            warn!(
                size = payload.len(),
                max_size = self.max_payload_size,
                "Rejecting oversized payload"
            );
            return Err(ProtocolError::TooLarge {
                size: payload.len(),
                max_size: self.max_payload_size,
            });
        }

        let value: Value = serde_json::from_str(payload).map_err(|_| ProtocolError::NotAnObject)?;
        let Some(object) = value.as_object() else {
            return Err(ProtocolError::NotAnObject);
        };

        let message_type = match object.get("type") {
            Some(Value::String(t)) => t.clone(),
            _ => return Err(ProtocolError::MissingType),
        };
        if !KNOWN_TYPES.contains(&message_type.as_str()) {
            return Err(ProtocolError::UnknownType(message_type));
        }
        trace!(message_type = %message_type, "Decoding payload");

        let message: Message =
            serde_json::from_value(value).map_err(|source| ProtocolError::Malformed {
                message_type,
                source,
            })?;
        if let Some(iteration) = message.iteration().filter(|i| *i > MAX_ITERATION) {
            warn!(iteration, max = MAX_ITERATION, "Rejecting out of range generator position");
            return Err(ProtocolError::IterationTooLarge {
                iteration,
                max: MAX_ITERATION,
            });
        }
        debug!("Decoded {} byte payload", payload.len());
        Ok(message)
    }

    /// Encode a message as a JSON string
    pub fn encode(&self, message: &Message) -> Result<String, ProtocolError> {
        let payload = serde_json::to_string(message)?;
        if payload.len() > self.max_payload_size {
            return Err(ProtocolError::TooLarge {
                size: payload.len(),
                max_size: self.max_payload_size,
            });
        }
        Ok(payload)
    }
}

/// Decode with the default size limit
pub fn decode(payload: &str) -> Result<Message, ProtocolError> {
    MessageCodec::default().decode(payload)
}

/// Encode with the default size limit
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    MessageCodec::default().encode(message)
}
