use std::time::Duration;

use codeplay::{InputOutcome, RunError, ServerEvent, SupervisorState};

use super::Harness;

#[tokio::test]
async fn test_hello_world_succeeds() {
    let mut harness = Harness::new().await;

    let output = harness.run("sh", "echo 'Hello, World!'").await;

    assert_eq!(output.stdout, "Hello, World!\n");
    assert!(output.stderr.is_empty());
    assert_eq!(output.stop, "\n[Execution Successful]");
    assert!(output.success);
}

#[tokio::test]
async fn test_stderr_output_fails_run() {
    let mut harness = Harness::new().await;

    let output = harness.run("sh", "echo ok; echo oops >&2").await;

    assert_eq!(output.stdout, "ok\n");
    assert_eq!(output.stderr, "oops\n");
    assert_eq!(output.stop, "\n[Execution Failed]");
    assert!(!output.success);
}

#[tokio::test]
async fn test_nonzero_exit_fails_run() {
    let mut harness = Harness::new().await;

    let output = harness.run("sh", "exit 7").await;

    assert!(!output.success);
    assert_eq!(output.stop, "\n[Execution Failed]");
}

#[tokio::test]
async fn test_kill_then_rerun() {
    let mut harness = Harness::new().await;

    harness
        .session
        .run_code("sh", "echo started; sleep 30")
        .await
        .expect("Failed to start");
    match harness.next_event().await {
        ServerEvent::TermOutput { data, .. } => assert_eq!(data, "started\n"),
        other => panic!("unexpected event {other:?}"),
    }

    harness.session.kill().await;
    let killed = harness.finish_run().await;
    assert_eq!(killed.stop, "\n[Execution Killed]");
    assert!(!killed.success);
    assert!(harness.events.try_recv().is_err());

    let output = harness.run("sh", "echo again").await;
    assert_eq!(output.stdout, "again\n");
    assert!(output.success);
}

#[tokio::test]
async fn test_input_without_process_is_noop() {
    let mut harness = Harness::new().await;

    assert_eq!(
        harness.session.send_input("anyone there?").await,
        InputOutcome::NoActiveRun
    );

    // still accepts runs afterwards
    let output = harness.run("sh", "echo fine").await;
    assert!(output.success);

    let mut state = harness.session.supervisor().subscribe();
    state
        .wait_for(|s| *s == SupervisorState::Idle)
        .await
        .expect("state channel closed");
    assert_eq!(
        harness.session.send_input("too late").await,
        InputOutcome::NoActiveRun
    );
}

#[tokio::test]
async fn test_interactive_input() {
    let mut harness = Harness::new().await;

    harness
        .session
        .run_code(
            "sh",
            "printf 'Name: '; read name; echo \"Hello, $name!\"; read n; echo $((n * 2))",
        )
        .await
        .expect("Failed to start");

    match harness.next_event().await {
        ServerEvent::TermOutput { data, .. } => assert_eq!(data, "Name: "),
        other => panic!("unexpected event {other:?}"),
    }

    assert_eq!(
        harness.session.send_input("Ada").await,
        InputOutcome::Delivered
    );
    assert_eq!(harness.session.send_input("21").await, InputOutcome::Delivered);

    let output = harness.finish_run().await;
    assert_eq!(output.stdout, "Hello, Ada!\n42\n");
    assert!(output.success);
}

#[tokio::test]
async fn test_rapid_reruns_do_not_interleave() {
    let mut harness = Harness::new().await;

    harness
        .session
        .run_code("sh", "while true; do echo first; sleep 0.01; done")
        .await
        .expect("Failed to start first run");
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness
        .session
        .run_code("sh", "echo second")
        .await
        .expect("Failed to start second run");

    let first = harness.finish_run().await;
    assert_eq!(first.stop, "\n[Execution Killed]");
    assert!(first.stdout.lines().all(|l| l == "first"));

    let second = harness.finish_run().await;
    assert_eq!(second.stdout, "second\n");
    assert_eq!(second.stop, "\n[Execution Successful]");
}

#[tokio::test]
async fn test_unknown_language_has_no_side_effects() {
    let mut harness = Harness::new().await;

    harness
        .session
        .run_code("sh", "echo alive; sleep 30")
        .await
        .expect("Failed to start");
    match harness.next_event().await {
        ServerEvent::TermOutput { data, .. } => assert_eq!(data, "alive\n"),
        other => panic!("unexpected event {other:?}"),
    }

    let err = harness
        .session
        .run_code("brainfudge", "+++")
        .await
        .expect_err("unknown language accepted");
    assert!(matches!(err, RunError::UnsupportedLanguage(ref id) if id == "brainfudge"));

    let report = harness.finish_run().await;
    assert!(report.stderr.contains("brainfudge"));
    assert_eq!(report.stop, "\n[Execution Failed]");

    // the running program was left alone
    assert_eq!(harness.session.supervisor().state(), SupervisorState::Running);
    assert!(harness.session.workspace().file_exists("main.sh").await.unwrap());

    harness.session.close().await;
}

#[tokio::test]
async fn test_close_kills_run_and_removes_workspace() {
    let mut harness = Harness::new().await;
    let path = harness.session.workspace().path().to_path_buf();

    harness
        .session
        .run_code("sh", "sleep 30")
        .await
        .expect("Failed to start");
    harness.session.close().await;

    let output = harness.finish_run().await;
    assert_eq!(output.stop, "\n[Execution Killed]");
    assert!(!path.exists());
}
