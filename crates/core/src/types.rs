use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Queue delivery settings for a job type.
///
/// Not part of the durable job record; the registry restores these from the
/// job's type name on reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Whether the broker should redeliver this job type on worker failure
    #[serde(default)]
    pub retry: bool,

    /// Queue name override; the configured namespace is used when absent
    #[serde(default)]
    pub queue: Option<String>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            retry: false,
            queue: None,
        }
    }
}
