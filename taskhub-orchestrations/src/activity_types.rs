//! Input and output types for catalog activities

use serde::{Deserialize, Serialize};

// ============================================================================
// Random Time Waiting Activity
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RandomTimeWaitingInput {
    /// Position of the task inside its orchestration, for tracing
    pub task_id: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RandomTimeWaitingOutput {
    pub task_id: u32,
    /// Time actually slept, in milliseconds
    pub delay_ms: u64,
}
