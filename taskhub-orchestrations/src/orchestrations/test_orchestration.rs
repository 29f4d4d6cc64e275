//! Test orchestration: fan out random-delay activities, then run more serially

use futures::future::join_all;
use taskhub_core::OrchestrationContext;
use taskhub_models::TestOrchestrationData;

use crate::activity_names::activities;
use crate::activity_types::{RandomTimeWaitingInput, RandomTimeWaitingOutput};
use crate::types::TestOrchestrationOutput;

pub async fn test_orchestration(
    ctx: OrchestrationContext,
    input: TestOrchestrationData,
) -> Result<TestOrchestrationOutput, String> {
    ctx.trace_info(format!(
        "Running {} parallel and {} serial tasks",
        input.number_of_parallel_tasks, input.number_of_serial_tasks
    ));

    let task_input = |task_id: u32| RandomTimeWaitingInput {
        task_id,
        min_delay_ms: input.min_delay_ms,
        max_delay_ms: input.max_delay_ms,
    };

    let parallel = (0..input.number_of_parallel_tasks)
        .map(|task_id| {
            ctx.schedule_activity_typed::<RandomTimeWaitingInput, RandomTimeWaitingOutput>(
                activities::RANDOM_TIME_WAITING,
                &task_input(task_id),
            )
        })
        .collect::<Vec<_>>();

    let mut output = TestOrchestrationOutput {
        tasks_completed: 0,
        total_delay_ms: 0,
    };
    for result in join_all(parallel).await {
        let waited = result?;
        output.tasks_completed += 1;
        output.total_delay_ms += waited.delay_ms;
    }

    for offset in 0..input.number_of_serial_tasks {
        let waited = ctx
            .schedule_activity_typed::<RandomTimeWaitingInput, RandomTimeWaitingOutput>(
                activities::RANDOM_TIME_WAITING,
                &task_input(input.number_of_parallel_tasks + offset),
            )
            .await?;
        output.tasks_completed += 1;
        output.total_delay_ms += waited.delay_ms;
    }

    Ok(output)
}
