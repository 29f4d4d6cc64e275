//! Driver orchestration: runs many test orchestrations as children

use futures::future::join_all;
use taskhub_core::OrchestrationContext;
use taskhub_models::{DriverOrchestrationData, TestOrchestrationData};

use crate::names::orchestrations;
use crate::types::{DriverOrchestrationOutput, TestOrchestrationOutput};

pub async fn driver_orchestration(
    ctx: OrchestrationContext,
    input: DriverOrchestrationData,
) -> Result<DriverOrchestrationOutput, String> {
    ctx.trace_info(format!(
        "Starting {} test orchestrations",
        input.number_of_parallel_orchestrations
    ));

    let children = (0..input.number_of_parallel_orchestrations)
        .map(|_| {
            ctx.schedule_sub_orchestration_typed::<TestOrchestrationData, TestOrchestrationOutput>(
                orchestrations::TEST_ORCHESTRATION,
                &input.sub_orchestration_data,
            )
        })
        .collect::<Vec<_>>();

    let mut output = DriverOrchestrationOutput {
        orchestrations_completed: 0,
        tasks_completed: 0,
    };
    let mut failures = Vec::new();
    for result in join_all(children).await {
        match result {
            Ok(child) => {
                output.orchestrations_completed += 1;
                output.tasks_completed += child.tasks_completed;
            }
            Err(e) => failures.push(e),
        }
    }

    if !failures.is_empty() {
        ctx.trace_error(format!("{} test orchestrations failed", failures.len()));
        return Err(format!(
            "{} of {} test orchestrations failed: {}",
            failures.len(),
            input.number_of_parallel_orchestrations,
            failures.join("; ")
        ));
    }

    Ok(output)
}
