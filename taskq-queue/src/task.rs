//! Task definition and wire encoding.

use crate::error::{QueueError, QueueResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task payload. The queue never looks inside it.
pub type Payload = serde_json::Value;

/// A unit of work.
///
/// The wire form is a JSON object with the fields `id`, `name`, `payload`
/// and `retry`. A missing `payload` decodes as `null` and a missing `retry`
/// as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Caller-assigned identifier. Uniqueness is up to the producer.
    pub id: String,

    /// Task name, typically used by handlers to pick what to do
    pub name: String,

    /// Opaque payload
    #[serde(default)]
    pub payload: Payload,

    /// Number of times this task has been requeued after a failure
    #[serde(default)]
    pub retry: u32,
}

impl Task {
    /// Create a new task.
    pub fn new(id: impl Into<String>, name: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            payload,
            retry: 0,
        }
    }

    /// Create a task with a random identifier.
    pub fn with_random_id(name: impl Into<String>, payload: Payload) -> Self {
        Self::new(Uuid::new_v4().to_string(), name, payload)
    }

    /// Set the retry counter.
    pub fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    /// Copy of this task with the retry counter incremented.
    pub fn next_attempt(&self) -> Self {
        Self {
            retry: self.retry.saturating_add(1),
            ..self.clone()
        }
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> QueueResult<String> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    /// Decode from the wire form.
    pub fn decode(raw: &str) -> QueueResult<Self> {
        serde_json::from_str(raw).map_err(|e| QueueError::Deserialization(e.to_string()))
    }
}
