//! Run the simple task orchestration as a child

use taskhub_core::OrchestrationContext;

use crate::names::orchestrations;

pub async fn simple_with_sub_orchestration_orchestration(
    ctx: OrchestrationContext,
    _input: (),
) -> Result<String, String> {
    ctx.schedule_sub_orchestration_typed::<(), String>(orchestrations::SIMPLE_WITH_TASKS, &())
        .await
        .map_err(|e| format!("Sub-orchestration failed: {}", e))
}
