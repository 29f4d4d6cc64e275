use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskhub_core::{
    ActivityContext, Client, ErrorKind, HubError, InMemoryProvider, OrchestrationContext,
    OrchestrationProvider, TypeRegistry, Worker, WorkerOptions,
};
use taskhub_models::{OrchestrationInstance, OrchestrationState, OrchestrationStatus};

fn fast_options() -> WorkerOptions {
    WorkerOptions {
        orchestration_dispatchers: 2,
        activity_dispatchers: 2,
        idle_poll_interval: Duration::from_millis(2),
        graceful_stop_timeout: Duration::from_secs(5),
    }
}

fn sample_registry() -> TypeRegistry {
    TypeRegistry::builder()
        .register_orchestration_typed("SumOfDoubles", |ctx: OrchestrationContext, n: u32| async move {
            let first = ctx.schedule_activity_typed::<u32, u32>("Double", &n);
            let second = ctx.schedule_activity_typed::<u32, u32>("Double", &(n + 1));
            let (a, b) = futures::future::join(first, second).await;
            Ok::<u32, String>(a? + b?)
        })
        .register_orchestration_typed("Sleepy", |ctx: OrchestrationContext, ms: u64| async move {
            ctx.schedule_timer(Duration::from_millis(ms)).await;
            Ok::<String, String>("awake".to_string())
        })
        .register_orchestration("AlwaysFails", |_ctx, _input: String| async move {
            Err::<String, String>("boom".to_string())
        })
        .register_orchestration("CallsMissingActivity", |ctx: OrchestrationContext, _input: String| async move {
            ctx.schedule_activity("Missing", "null").await
        })
        .register_orchestration_typed("Parent", |ctx: OrchestrationContext, n: u32| async move {
            let child: u32 = ctx.schedule_sub_orchestration_typed("SumOfDoubles", &n).await?;
            Ok::<u32, String>(child + 1)
        })
        .register_orchestration_typed("PausedParent", |ctx: OrchestrationContext, n: u32| async move {
            let child = ctx.schedule_sub_orchestration_typed::<u32, u32>("SumOfDoubles", &n);
            let pause = ctx.schedule_timer(Duration::from_millis(300));
            let (child, ()) = futures::future::join(child, pause).await;
            Ok::<u32, String>(child? + 1)
        })
        .register_orchestration_typed("SlowParent", |ctx: OrchestrationContext, n: u32| async move {
            ctx.schedule_activity_typed::<u32, u32>("SlowDouble", &n).await
        })
        .register_orchestration("CallsHang", |ctx: OrchestrationContext, _input: String| async move {
            ctx.schedule_activity("Hang", "null").await
        })
        .register_activity_typed("Double", |_ctx: ActivityContext, n: u32| async move { Ok::<u32, String>(n * 2) })
        .register_activity_typed("SlowDouble", |_ctx: ActivityContext, n: u32| async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<u32, String>(n * 2)
        })
        .register_activity("Hang", |_ctx, _input: String| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("\"late\"".to_string())
        })
        .build()
        .unwrap()
}

struct Hub {
    provider: Arc<InMemoryProvider>,
    worker: Worker,
    client: Client,
}

fn hub(registry: TypeRegistry) -> Hub {
    let provider = Arc::new(InMemoryProvider::new());
    hub_on(provider, registry)
}

fn hub_on(provider: Arc<InMemoryProvider>, registry: TypeRegistry) -> Hub {
    let worker = Worker::new(provider.clone(), registry.clone(), fast_options());
    let client = Client::new(provider.clone(), registry);
    Hub {
        provider,
        worker,
        client,
    }
}

async fn wait_for_status(
    client: &Client,
    instance: &OrchestrationInstance,
    status: OrchestrationStatus,
) -> OrchestrationState {
    for _ in 0..500 {
        if let Some(state) = client.get_state(instance).await.unwrap() {
            if state.status == status {
                return state;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} never reached {}", instance, status);
}

async fn wait_for_locked_activities(provider: &InMemoryProvider, locked: usize) {
    for _ in 0..500 {
        if provider.stats().await.unwrap().locked_activities == locked {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("locked activities never reached {}", locked);
}

#[tokio::test]
async fn test_registered_orchestration_runs_to_completion() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let state = hub
        .client
        .run_and_wait("SumOfDoubles", &3u32, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, OrchestrationStatus::Completed);
    assert_eq!(state.output.as_deref(), Some("14"));
    assert!(state.completed_at.is_some());

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_sub_orchestration_output_flows_to_parent() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let state = hub
        .client
        .run_and_wait("Parent", &1u32, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, OrchestrationStatus::Completed);
    assert_eq!(state.output.as_deref(), Some("7"));

    hub.worker.stop(true).await.unwrap();
}

#[tokio::test]
async fn test_unknown_type_rejected_before_provider() {
    let hub = hub(sample_registry());

    let err = hub.client.create_instance("Bogus", &()).await.unwrap_err();
    assert!(matches!(err, HubError::UnknownOrchestrationType(ref name) if name == "Bogus"));
    assert_eq!(hub.provider.stats().await.unwrap().instances, 0);
}

#[tokio::test]
async fn test_short_wait_times_out_but_instance_keeps_running() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let instance = hub.client.create_instance("Sleepy", &200u64).await.unwrap();
    let err = hub
        .client
        .wait_for_completion(&instance, Duration::from_millis(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let state = hub
        .client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, OrchestrationStatus::Completed);

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_failed_orchestration_reports_error_output() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let state = hub
        .client
        .run_and_wait("AlwaysFails", &(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, OrchestrationStatus::Failed);
    assert_eq!(state.output.as_deref(), Some("boom"));

    let state = hub
        .client
        .run_and_wait("CallsMissingActivity", &(), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, OrchestrationStatus::Failed);
    assert!(state.output.unwrap().contains("Missing"));

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_purge_keeps_non_terminal_instances() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();
    let done = hub
        .client
        .run_and_wait("SumOfDoubles", &1u32, Duration::from_secs(5))
        .await
        .unwrap();
    hub.worker.stop(false).await.unwrap();

    let pending = hub.client.create_instance("Sleepy", &1u64).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let purged = hub.client.purge_completed_history().await.unwrap();
    assert_eq!(purged, 1);
    assert!(hub.client.get_state(&done.instance).await.unwrap().is_none());
    assert!(hub.client.get_state(&pending).await.unwrap().is_some());
}

#[tokio::test]
async fn test_forced_stop_releases_locks_for_next_worker() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let instance = hub.client.create_instance("CallsHang", &()).await.unwrap();
    wait_for_locked_activities(&hub.provider, 1).await;

    hub.worker.stop(true).await.unwrap();
    let stats = hub.provider.stats().await.unwrap();
    assert_eq!(stats.locked_orchestrations, 0);
    assert_eq!(stats.locked_activities, 0);
    assert_eq!(stats.pending_activities, 1);
    let state = hub.client.get_state(&instance).await.unwrap().unwrap();
    assert_eq!(state.status, OrchestrationStatus::Running);

    // a fresh worker picks the abandoned activity up
    let quick = TypeRegistry::builder()
        .register_orchestration("CallsHang", |ctx: OrchestrationContext, _input: String| async move {
            ctx.schedule_activity("Hang", "null").await
        })
        .register_activity("Hang", |_ctx, _input: String| async move { Ok("\"quick\"".to_string()) })
        .build()
        .unwrap();
    let next = hub_on(hub.provider.clone(), quick);
    next.worker.start().await.unwrap();
    let state = next
        .client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.output.as_deref(), Some("\"quick\""));
    next.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_redispatched_execution_reuses_recorded_activity_results() {
    let invocations = Arc::new(AtomicUsize::new(0));
    let hold = Arc::new(AtomicBool::new(true));

    let registry = {
        let invocations = invocations.clone();
        let hold = hold.clone();
        TypeRegistry::builder()
            .register_orchestration("CountThenHold", move |ctx: OrchestrationContext, _input: String| {
                let hold = hold.clone();
                async move {
                    let out = ctx.schedule_activity("Count", "null").await?;
                    while hold.load(Ordering::SeqCst) {
                        ctx.schedule_timer(Duration::from_millis(5)).await;
                    }
                    Ok(out)
                }
            })
            .register_activity("Count", move |_ctx, _input: String| {
                let invocations = invocations.clone();
                async move { Ok(invocations.fetch_add(1, Ordering::SeqCst).to_string()) }
            })
            .build()
            .unwrap()
    };

    let hub = hub(registry.clone());
    hub.worker.start().await.unwrap();
    let instance = hub.client.create_instance("CountThenHold", &()).await.unwrap();

    for _ in 0..500 {
        let recorded = hub.provider.read_history(&instance).await.unwrap().contains_key(&0);
        let stats = hub.provider.stats().await.unwrap();
        if recorded && stats.locked_activities == 0 && stats.pending_activities == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    hub.worker.stop(true).await.unwrap();

    hold.store(false, Ordering::SeqCst);
    let next = hub_on(hub.provider.clone(), registry);
    next.worker.start().await.unwrap();
    let state = next
        .client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(state.status, OrchestrationStatus::Completed);
    assert_eq!(state.output.as_deref(), Some("0"));
    assert_eq!(invocations.load(Ordering::SeqCst), 1);
    next.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_graceful_stop_finishes_in_flight_work() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let instance = hub.client.create_instance("SlowParent", &4u32).await.unwrap();
    wait_for_locked_activities(&hub.provider, 1).await;
    hub.worker.stop(false).await.unwrap();

    // the activity finished and its result is waiting for the next turn
    let stats = hub.provider.stats().await.unwrap();
    assert_eq!(stats.locked_activities, 0);
    assert_eq!(stats.pending_activities, 0);
    assert_eq!(stats.pending_orchestrations, 1);
    let history = hub.provider.read_history(&instance).await.unwrap();
    assert_eq!(history.get(&0), Some(&Ok("8".to_string())));

    hub.worker.start().await.unwrap();
    let state = hub
        .client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.output.as_deref(), Some("8"));
    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_rerun_of_completed_id_starts_new_execution() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let first = hub
        .client
        .create_instance_with_id("SumOfDoubles", "fixed-id", &1u32)
        .await
        .unwrap();
    hub.client
        .wait_for_completion(&first, Duration::from_secs(5))
        .await
        .unwrap();

    let second = hub
        .client
        .create_instance_with_id("SumOfDoubles", "fixed-id", &2u32)
        .await
        .unwrap();
    assert_ne!(first.execution_id, second.execution_id);
    hub.client
        .wait_for_completion(&second, Duration::from_secs(5))
        .await
        .unwrap();

    let latest = hub
        .client
        .get_state_by_instance_id("fixed-id")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.instance, second);
    assert_eq!(latest.output.as_deref(), Some("10"));

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_more_waiting_parents_than_lanes_all_finish() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    // fast_options has two orchestration lanes
    let inputs: Vec<u32> = (0..6u32).collect();
    let runs = inputs.iter().map(|n| hub.client.run_and_wait("Parent", n, Duration::from_secs(5)));
    let states = futures::future::join_all(runs).await;

    for (n, state) in states.into_iter().enumerate() {
        let state = state.unwrap();
        assert_eq!(state.status, OrchestrationStatus::Completed);
        assert_eq!(state.output, Some((4 * n + 3).to_string()));
    }
    let stats = hub.provider.stats().await.unwrap();
    assert_eq!(stats.locked_orchestrations, 0);
    assert_eq!(stats.pending_orchestrations, 0);

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_rerun_parent_starts_fresh_child() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let first = hub.client.create_instance_with_id("Parent", "p", &1u32).await.unwrap();
    let state = hub
        .client
        .wait_for_completion(&first, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.output.as_deref(), Some("7"));

    let second = hub.client.create_instance_with_id("Parent", "p", &2u32).await.unwrap();
    let state = hub
        .client
        .wait_for_completion(&second, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.output.as_deref(), Some("11"));

    // two parent executions, each with its own child
    assert_eq!(hub.provider.stats().await.unwrap().executions, 4);
    let second_child = format!("p:{}:0", second.execution_id);
    let child = hub
        .client
        .get_state_by_instance_id(&second_child)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(child.output.as_deref(), Some("10"));

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_purging_finished_child_does_not_strand_parent() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let parent = hub.client.create_instance("PausedParent", &1u32).await.unwrap();
    let child_id = format!("{}:{}:0", parent.instance_id, parent.execution_id);
    let mut child = None;
    for _ in 0..500 {
        if let Some(state) = hub.client.get_state_by_instance_id(&child_id).await.unwrap() {
            if state.status == OrchestrationStatus::Completed {
                child = Some(state);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let child = child.expect("child never completed");

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(hub.client.purge_completed_history().await.unwrap(), 1);
    assert!(hub.client.get_state(&child.instance).await.unwrap().is_none());
    let live = hub.client.get_state(&parent).await.unwrap().unwrap();
    assert!(!live.status.is_terminal());

    let state = hub
        .client
        .wait_for_completion(&parent, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.status, OrchestrationStatus::Completed);
    assert_eq!(state.output.as_deref(), Some("7"));

    hub.worker.stop(false).await.unwrap();
}

#[tokio::test]
async fn test_store_outage_keeps_unreleased_lock_for_stop() {
    let hub = hub(sample_registry());
    hub.worker.start().await.unwrap();

    let instance = hub.client.create_instance("SlowParent", &5u32).await.unwrap();
    wait_for_locked_activities(&hub.provider, 1).await;

    // the activity finishes while the store is down: neither the result nor
    // the abandon can be written
    hub.provider.set_available(false);
    tokio::time::sleep(Duration::from_millis(300)).await;
    hub.provider.set_available(true);
    assert_eq!(hub.provider.stats().await.unwrap().locked_activities, 1);

    hub.worker.stop(true).await.unwrap();
    let stats = hub.provider.stats().await.unwrap();
    assert_eq!(stats.locked_activities, 0);
    assert_eq!(stats.pending_activities, 1);

    hub.worker.start().await.unwrap();
    let state = hub
        .client
        .wait_for_completion(&instance, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(state.output.as_deref(), Some("10"));
    hub.worker.stop(false).await.unwrap();
}
