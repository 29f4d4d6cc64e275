//! Input and output types for catalog orchestrations

use serde::{Deserialize, Serialize};

pub use taskhub_models::{DriverOrchestrationData, TestOrchestrationData};

// ============================================================================
// Simple Orchestration With Timer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerOrchestrationInput {
    /// Timer between getting and greeting the user (default: 1000)
    #[serde(default = "default_timer_delay_ms")]
    pub delay_ms: u64,
}

impl Default for TimerOrchestrationInput {
    fn default() -> Self {
        Self {
            delay_ms: default_timer_delay_ms(),
        }
    }
}

fn default_timer_delay_ms() -> u64 {
    1000
}

// ============================================================================
// Generation Basic Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GenerationInput {
    /// Generations to run
    pub generations: u32,
    /// Counter value to start from
    #[serde(default)]
    pub start: u32,
}

// ============================================================================
// Test Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestOrchestrationOutput {
    /// Activities that completed
    pub tasks_completed: u32,
    /// Sum of the delays the activities waited, in milliseconds
    pub total_delay_ms: u64,
}

// ============================================================================
// Driver Orchestration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverOrchestrationOutput {
    /// Test orchestrations that completed
    pub orchestrations_completed: u32,
    /// Activities completed across all test orchestrations
    pub tasks_completed: u32,
}
