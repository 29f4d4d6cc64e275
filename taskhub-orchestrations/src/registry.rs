//! Registry builder for the orchestration catalog

use taskhub_core::{RegistryError, TypeRegistry};

use crate::activities;
use crate::names::orchestrations;
use crate::orchestrations as orch;

/// Create the immutable type registry with every catalog orchestration and activity
///
/// # Example
///
/// ```rust,no_run
/// use taskhub_orchestrations::registry::create_type_registry;
///
/// let registry = create_type_registry().expect("catalog names are unique");
/// ```
pub fn create_type_registry() -> Result<TypeRegistry, RegistryError> {
    TypeRegistry::builder()
        .register_orchestration_typed(
            orchestrations::SIMPLE_WITH_TASKS,
            orch::simple_with_tasks::simple_with_tasks_orchestration,
        )
        .register_orchestration_typed(
            orchestrations::SIMPLE_WITH_TIMER,
            orch::simple_with_timer::simple_with_timer_orchestration,
        )
        .register_orchestration_typed(
            orchestrations::GENERATION_BASIC,
            orch::generation_basic::generation_basic_orchestration,
        )
        .register_orchestration_typed(
            orchestrations::SIMPLE_WITH_SUB_ORCHESTRATION,
            orch::simple_with_sub_orchestration::simple_with_sub_orchestration_orchestration,
        )
        .register_orchestration_typed(orchestrations::DRIVER, orch::driver::driver_orchestration)
        .register_orchestration_typed(
            orchestrations::TEST_ORCHESTRATION,
            orch::test_orchestration::test_orchestration,
        )
        // Activities
        .register_activity_typed(activities::get_user::NAME, activities::get_user::activity)
        .register_activity_typed(activities::greet_user::NAME, activities::greet_user::activity)
        .register_activity_typed(
            activities::generation_basic::NAME,
            activities::generation_basic::activity,
        )
        .register_activity_typed(
            activities::random_time_waiting::NAME,
            activities::random_time_waiting::activity,
        )
        .build()
}
