//! End-to-end engine tests driving real host subprocesses.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use drover_engine::{Engine, EngineConfig, EngineError};
use drover_model::{TaskKind, TaskSpec, TaskStatus};

fn command_spec(program: &str, args: &[&str]) -> TaskSpec {
    TaskSpec::new(
        "test",
        TaskKind::Command {
            command: program.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: HashMap::new(),
            working_dir: None,
        },
    )
}

fn started_engine(config: EngineConfig) -> Engine {
    let engine = Engine::new(config);
    engine.start().expect("engine starts");
    engine
}

#[tokio::test]
async fn execute_echo_completes_with_output() {
    let engine = started_engine(EngineConfig::default());
    let ctx = CancellationToken::new();

    let spec = command_spec("/bin/echo", &["hi"]).with_timeout(Duration::from_secs(5));
    let result = tokio::time::timeout(Duration::from_secs(2), engine.execute(&ctx, spec))
        .await
        .expect("result within two seconds")
        .expect("execution succeeds");

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.output, "hi\n");

    engine.stop().await;
}

#[tokio::test]
async fn sleep_past_deadline_times_out() {
    let engine = started_engine(EngineConfig::default());
    let ctx = CancellationToken::new();

    let spec = command_spec("/bin/sleep", &["10"]).with_timeout(Duration::from_secs(1));
    let result = tokio::time::timeout(Duration::from_secs(2), engine.execute(&ctx, spec))
        .await
        .expect("result within two seconds")
        .expect("execution returns a synthesized result");

    assert_eq!(result.status, TaskStatus::Timeout);

    engine.stop().await;
}

#[tokio::test]
async fn cancel_running_task() {
    let engine = started_engine(EngineConfig::default());

    let id = engine
        .submit(command_spec("/bin/sleep", &["60"]))
        .await
        .expect("task admitted");

    // Give a worker time to dequeue it.
    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.cancel(&id).expect("cancel succeeds");

    tokio::time::sleep(Duration::from_millis(800)).await;
    let record = engine.get(&id).expect("task still registered");
    assert_eq!(record.status, TaskStatus::Cancelled);

    // Cancelling a terminal task reports the invalid state.
    assert!(matches!(
        engine.cancel(&id),
        Err(EngineError::InvalidState { .. })
    ));

    engine.stop().await;
}

#[tokio::test]
async fn third_submit_fails_queue_full() {
    let engine = started_engine(EngineConfig {
        worker_pool_size: 1,
        queue_size: 1,
        admission_wait: Duration::from_millis(300),
        ..Default::default()
    });

    // First occupies the single worker, second the single queue slot.
    engine
        .submit(command_spec("/bin/sleep", &["30"]))
        .await
        .expect("first task admitted");
    engine
        .submit(command_spec("/bin/sleep", &["30"]))
        .await
        .expect("second task admitted");

    let err = engine
        .submit(command_spec("/bin/sleep", &["30"]))
        .await
        .expect_err("third task rejected");
    assert!(matches!(err, EngineError::QueueFull));

    // The rejected task must leave no registry trace.
    assert_eq!(engine.list().len(), 2);

    engine.stop().await;
}

#[tokio::test]
async fn failed_command_carries_stderr() {
    let engine = started_engine(EngineConfig::default());
    let ctx = CancellationToken::new();

    let spec = TaskSpec::new(
        "fails",
        TaskKind::Script {
            source: "echo boom 1>&2; exit 3".into(),
            interpreter: Default::default(),
            env: HashMap::new(),
            working_dir: None,
        },
    )
    .with_timeout(Duration::from_secs(5));

    let result = engine.execute(&ctx, spec).await.expect("result produced");
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.error, "boom\n");

    engine.stop().await;
}

#[tokio::test]
async fn empty_command_fails_validation() {
    let engine = started_engine(EngineConfig::default());

    let err = engine
        .submit(command_spec("", &[]))
        .await
        .expect_err("validation rejects");
    assert!(matches!(err, EngineError::Validation(_)));

    engine.stop().await;
}

#[tokio::test]
async fn stats_reflect_pool_shape() {
    let engine = started_engine(EngineConfig {
        worker_pool_size: 3,
        ..Default::default()
    });
    let ctx = CancellationToken::new();

    let spec = command_spec("/bin/true", &[]).with_timeout(Duration::from_secs(5));
    engine.execute(&ctx, spec).await.expect("task ran");

    let stats = engine.stats();
    assert_eq!(stats.worker_count, 3);
    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.running, 0);
    assert_eq!(stats.queue_depth, 0);

    engine.stop().await;
}

#[tokio::test]
async fn running_never_exceeds_pool_size() {
    let engine = started_engine(EngineConfig {
        worker_pool_size: 2,
        queue_size: 10,
        ..Default::default()
    });

    for _ in 0..5 {
        engine
            .submit(command_spec("/bin/sleep", &["2"]))
            .await
            .expect("task admitted");
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    let running = engine.list_running();
    assert!(running.len() <= 2, "running={}", running.len());
    for record in &running {
        assert_eq!(record.status, TaskStatus::Running);
    }

    engine.stop().await;
}

#[tokio::test]
async fn stop_terminates_in_flight_subprocesses() {
    let engine = started_engine(EngineConfig::default());

    engine
        .submit(command_spec("/bin/sleep", &["60"]))
        .await
        .expect("task admitted");
    tokio::time::sleep(Duration::from_millis(200)).await;

    tokio::time::timeout(Duration::from_secs(5), engine.stop())
        .await
        .expect("stop returns promptly");

    // Stop is idempotent.
    engine.stop().await;
}
