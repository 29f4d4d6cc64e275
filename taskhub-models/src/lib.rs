use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one execution of an orchestration instance.
///
/// The instance id is stable across re-runs; every re-run gets a new
/// execution id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct OrchestrationInstance {
    pub instance_id: String,
    pub execution_id: String,
}

impl OrchestrationInstance {
    /// New execution of `instance_id` with a freshly generated execution id
    pub fn new_execution(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            execution_id: new_id(),
        }
    }
}

impl fmt::Display for OrchestrationInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.instance_id, self.execution_id)
    }
}

/// Hyphen-less v4 uuid used for generated instance and execution ids
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Runtime status of an orchestration execution
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrchestrationStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl OrchestrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Completed | OrchestrationStatus::Failed | OrchestrationStatus::Terminated
        )
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrchestrationStatus::Pending => "pending",
            OrchestrationStatus::Running => "running",
            OrchestrationStatus::Completed => "completed",
            OrchestrationStatus::Failed => "failed",
            OrchestrationStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Snapshot of one execution as stored by the provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestrationState {
    pub instance: OrchestrationInstance,
    /// Registered orchestration type name
    pub name: String,
    pub status: OrchestrationStatus,
    /// JSON input as submitted
    pub input: String,
    /// JSON output on completion, error text on failure
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Role of this replica as reported by the hosting runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaRole {
    #[default]
    None,
    Primary,
    ActiveSecondary,
    IdleSecondary,
    Unknown,
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplicaRole::None => "none",
            ReplicaRole::Primary => "primary",
            ReplicaRole::ActiveSecondary => "active_secondary",
            ReplicaRole::IdleSecondary => "idle_secondary",
            ReplicaRole::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for ReplicaRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "none" => Ok(ReplicaRole::None),
            "primary" => Ok(ReplicaRole::Primary),
            "active_secondary" | "activesecondary" => Ok(ReplicaRole::ActiveSecondary),
            "idle_secondary" | "idlesecondary" => Ok(ReplicaRole::IdleSecondary),
            "unknown" => Ok(ReplicaRole::Unknown),
            other => Err(format!("unknown replica role '{}'", other)),
        }
    }
}

/// Input of the test orchestration used by external test drivers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestOrchestrationData {
    /// Activities fanned out at once
    pub number_of_parallel_tasks: u32,
    /// Activities run one after another after the fan-out
    pub number_of_serial_tasks: u32,
    /// Lower bound of each activity's simulated work, in milliseconds
    #[serde(default)]
    pub min_delay_ms: u64,
    /// Upper bound of each activity's simulated work, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for TestOrchestrationData {
    fn default() -> Self {
        Self {
            number_of_parallel_tasks: 2,
            number_of_serial_tasks: 2,
            min_delay_ms: 0,
            max_delay_ms: 100,
        }
    }
}

/// Input of the driver orchestration that fans out test orchestrations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DriverOrchestrationData {
    pub number_of_parallel_orchestrations: u32,
    pub sub_orchestration_data: TestOrchestrationData,
}
