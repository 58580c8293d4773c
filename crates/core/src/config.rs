//! Configuration values threaded into the repository and the event layer.

use serde::{Deserialize, Serialize};

use crate::event::DEFAULT_EVENT_NAMESPACE;

/// ADR enforcement flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdrConfig {
    /// ADRs are required project-wide
    pub required: bool,

    /// The requirement is checked when a task is marked done
    pub enforce_on_task_completion: bool,
}

impl AdrConfig {
    /// Whether task completion needs an ADR on the owning track.
    pub fn enforced_on_completion(&self) -> bool {
        self.required && self.enforce_on_task_completion
    }
}

/// Event publication settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Prefix of every event type and the source label
    pub namespace: String,

    /// Deadline for each publish call
    pub publish_timeout_secs: u64,

    /// Where to POST events, if anywhere
    pub webhook_url: Option<String>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_EVENT_NAMESPACE.to_string(),
            publish_timeout_secs: 5,
            webhook_url: None,
        }
    }
}

impl EventConfig {
    /// The publish deadline as a duration.
    pub fn publish_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.publish_timeout_secs)
    }
}

/// Project settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Code used in generated ids; overrides the stored code
    pub code: Option<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ADR enforcement
    pub adr: AdrConfig,
    /// Event publication
    pub events: EventConfig,
    /// Project settings
    pub project: ProjectSettings,
}
