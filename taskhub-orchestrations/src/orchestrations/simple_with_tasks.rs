//! Get a user, then greet them

use taskhub_core::OrchestrationContext;

use crate::activity_names::activities;

pub async fn simple_with_tasks_orchestration(ctx: OrchestrationContext, _input: ()) -> Result<String, String> {
    let user = ctx
        .schedule_activity_typed::<(), String>(activities::GET_USER, &())
        .await
        .map_err(|e| format!("Failed to get user: {}", e))?;

    let greeting = ctx
        .schedule_activity_typed::<String, String>(activities::GREET_USER, &user)
        .await
        .map_err(|e| format!("Failed to greet user: {}", e))?;

    ctx.trace_info(greeting.clone());
    Ok(greeting)
}
