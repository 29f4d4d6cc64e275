//! Name constants for catalog activities

/// Activity names
pub mod activities {
    /// Look up the current user
    ///
    /// **Input:** none
    /// **Output:** user name
    pub const GET_USER: &str = "GetUserTask";

    /// Send a greeting to a user
    ///
    /// **Input:** user name
    /// **Output:** confirmation text
    pub const GREET_USER: &str = "GreetUserTask";

    /// Advance a generation counter by one
    pub const GENERATION_BASIC: &str = "GenerationBasicTask";

    /// Sleep for a random time inside a range
    ///
    /// **Input:** [`crate::activity_types::RandomTimeWaitingInput`]
    /// **Output:** [`crate::activity_types::RandomTimeWaitingOutput`]
    /// **Idempotent:** Yes
    pub const RANDOM_TIME_WAITING: &str = "RandomTimeWaitingTask";

    /// Every activity in the catalog
    pub const ALL: [&str; 4] = [GET_USER, GREET_USER, GENERATION_BASIC, RANDOM_TIME_WAITING];
}
