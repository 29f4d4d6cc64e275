//! Generation counting orchestration
//!
//! Each generation runs one activity that bumps the counter; the output is
//! the counter after the last generation.

use taskhub_core::OrchestrationContext;

use crate::activity_names::activities;
use crate::types::GenerationInput;

pub async fn generation_basic_orchestration(ctx: OrchestrationContext, input: GenerationInput) -> Result<u32, String> {
    let mut count = input.start;
    for generation in 0..input.generations {
        count = ctx
            .schedule_activity_typed::<u32, u32>(activities::GENERATION_BASIC, &count)
            .await
            .map_err(|e| format!("Generation {} failed: {}", generation, e))?;
    }

    ctx.trace_info(format!("Finished {} generations at {}", input.generations, count));
    Ok(count)
}
