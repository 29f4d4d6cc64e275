//! Random time waiting activity
//!
//! Simulates work of unpredictable length. The delay is drawn uniformly from
//! `[min_delay_ms, max_delay_ms]`; an inverted range collapses to its lower bound.

use rand::Rng;
use std::time::Duration;
use taskhub_core::ActivityContext;

use crate::activity_types::{RandomTimeWaitingInput, RandomTimeWaitingOutput};

/// Activity name for registration and scheduling
pub const NAME: &str = crate::activity_names::activities::RANDOM_TIME_WAITING;

pub async fn activity(
    ctx: ActivityContext,
    input: RandomTimeWaitingInput,
) -> Result<RandomTimeWaitingOutput, String> {
    let delay_ms = pick_delay(input.min_delay_ms, input.max_delay_ms);
    ctx.trace_info(format!("Task {} waiting {}ms", input.task_id, delay_ms));

    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

    Ok(RandomTimeWaitingOutput {
        task_id: input.task_id,
        delay_ms,
    })
}

fn pick_delay(min_delay_ms: u64, max_delay_ms: u64) -> u64 {
    if max_delay_ms <= min_delay_ms {
        return min_delay_ms;
    }
    rand::thread_rng().gen_range(min_delay_ms..=max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhub_core::TaskKey;
    use taskhub_models::OrchestrationInstance;

    #[test]
    fn test_delay_stays_in_range() {
        for _ in 0..100 {
            let delay = pick_delay(5, 10);
            assert!((5..=10).contains(&delay));
        }
    }

    #[test]
    fn test_inverted_range_uses_lower_bound() {
        assert_eq!(pick_delay(10, 3), 10);
        assert_eq!(pick_delay(0, 0), 0);
    }

    #[tokio::test]
    async fn test_reports_waited_delay() {
        let key = TaskKey {
            instance: OrchestrationInstance::new_execution("wait"),
            sequence: 3,
        };
        let out = activity(
            ActivityContext::new(&key, NAME.to_string()),
            RandomTimeWaitingInput {
                task_id: 7,
                min_delay_ms: 1,
                max_delay_ms: 2,
            },
        )
        .await
        .unwrap();
        assert_eq!(out.task_id, 7);
        assert!((1..=2).contains(&out.delay_ms));
    }
}
