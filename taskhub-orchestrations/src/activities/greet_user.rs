//! Greet user activity

use taskhub_core::ActivityContext;

/// Activity name for registration and scheduling
pub const NAME: &str = crate::activity_names::activities::GREET_USER;

pub async fn activity(ctx: ActivityContext, user: String) -> Result<String, String> {
    if user.trim().is_empty() {
        ctx.trace_warn("No user to greet");
        return Err("user name must not be empty".to_string());
    }
    ctx.trace_info(format!("Greeting {}", user));
    Ok(format!("Greeting send to {}", user))
}
