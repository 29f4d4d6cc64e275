//! Get a user, wait on a timer, then greet them

use std::time::Duration;
use taskhub_core::OrchestrationContext;

use crate::activity_names::activities;
use crate::types::TimerOrchestrationInput;

pub async fn simple_with_timer_orchestration(
    ctx: OrchestrationContext,
    input: Option<TimerOrchestrationInput>,
) -> Result<String, String> {
    let input = input.unwrap_or_default();

    let user = ctx
        .schedule_activity_typed::<(), String>(activities::GET_USER, &())
        .await?;

    ctx.trace_info(format!("Waiting {}ms before greeting", input.delay_ms));
    ctx.schedule_timer(Duration::from_millis(input.delay_ms)).await;

    ctx.schedule_activity_typed::<String, String>(activities::GREET_USER, &user)
        .await
}
