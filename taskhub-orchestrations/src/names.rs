//! Name constants for the orchestration catalog
//!
//! Orchestrations are registered under their plain type names.

/// Orchestration names
pub mod orchestrations {
    /// Get a user, then greet them
    ///
    /// **Input:** none
    /// **Output:** greeting text
    /// **Activities used:**
    /// - [`crate::activity_names::activities::GET_USER`]
    /// - [`crate::activity_names::activities::GREET_USER`]
    pub const SIMPLE_WITH_TASKS: &str = "SimpleOrchestrationWithTasks";

    /// Same as [`SIMPLE_WITH_TASKS`] with a durable timer between the two steps
    ///
    /// **Input:** [`crate::types::TimerOrchestrationInput`]
    /// **Output:** greeting text
    pub const SIMPLE_WITH_TIMER: &str = "SimpleOrchestrationWithTimer";

    /// Count up through a number of generations, one activity per generation
    ///
    /// **Input:** [`crate::types::GenerationInput`]
    /// **Output:** final generation count
    pub const GENERATION_BASIC: &str = "GenerationBasicOrchestration";

    /// Run [`SIMPLE_WITH_TASKS`] as a sub-orchestration and return its output
    pub const SIMPLE_WITH_SUB_ORCHESTRATION: &str = "SimpleOrchestrationWithSubOrchestration";

    /// Fan out test orchestrations and wait for all of them
    ///
    /// **Input:** [`taskhub_models::DriverOrchestrationData`]
    /// **Output:** [`crate::types::DriverOrchestrationOutput`]
    pub const DRIVER: &str = "DriverOrchestration";

    /// Parallel then serial random-delay activities
    ///
    /// **Input:** [`taskhub_models::TestOrchestrationData`]
    /// **Output:** [`crate::types::TestOrchestrationOutput`]
    pub const TEST_ORCHESTRATION: &str = "TestOrchestration";

    /// Every orchestration in the catalog
    pub const ALL: [&str; 6] = [
        SIMPLE_WITH_TASKS,
        SIMPLE_WITH_TIMER,
        GENERATION_BASIC,
        SIMPLE_WITH_SUB_ORCHESTRATION,
        DRIVER,
        TEST_ORCHESTRATION,
    ];
}
