//! Taskhub Orchestrations - the fixed catalog of test orchestrations and activities
//!
//! Every orchestration here is registered under its type name, which is the
//! name remote callers pass to `RunOrchestrationAsync`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use taskhub_orchestrations::registry::create_type_registry;
//! use taskhub_orchestrations::names::orchestrations;
//!
//! # fn example() -> Result<(), taskhub_core::RegistryError> {
//! let registry = create_type_registry()?;
//! assert!(registry.contains_orchestration(orchestrations::TEST_ORCHESTRATION));
//! # Ok(())
//! # }
//! ```

pub mod names;
pub mod types;
pub mod registry;

pub mod activity_names;
pub mod activity_types;

mod orchestrations;
mod activities;

pub use types::*;
pub use activity_types::*;
