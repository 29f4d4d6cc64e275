//! Generation counter activity

use taskhub_core::ActivityContext;

/// Activity name for registration and scheduling
pub const NAME: &str = crate::activity_names::activities::GENERATION_BASIC;

pub async fn activity(ctx: ActivityContext, generation: u32) -> Result<u32, String> {
    let next = generation
        .checked_add(1)
        .ok_or_else(|| "generation counter overflowed".to_string())?;
    ctx.trace_info(format!("Generation {} -> {}", generation, next));
    Ok(next)
}
