//! Get user activity

use taskhub_core::ActivityContext;

/// Activity name for registration and scheduling
pub const NAME: &str = crate::activity_names::activities::GET_USER;

pub async fn activity(ctx: ActivityContext, _input: ()) -> Result<String, String> {
    ctx.trace_info("Getting user");
    Ok("Gabbar".to_string())
}
