//! Hello-world runs through the default recipes
//!
//! Each test needs the named toolchain on PATH.

use std::sync::Arc;

use codeplay::{Config, RunError, ServerEvent, Session, event_channel};

use super::{Harness, fixture_source};

async fn harness_with_defaults() -> Harness {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = Config::default();
    config.workspace_root = root.path().to_path_buf();
    Harness::with_config(root, config).await
}

async fn assert_hello(language: &str, fixture: &str) {
    let mut harness = harness_with_defaults().await;
    let output = harness.run(language, &fixture_source(fixture)).await;

    assert!(
        output.stdout.contains("Hello, World!"),
        "{language}: stdout was {:?}, stderr was {:?}",
        output.stdout,
        output.stderr
    );
    assert_eq!(output.stop, "\n[Execution Successful]");
    assert!(output.success);
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_python_hello() {
    assert_hello("python", "hello.py").await;
}

#[tokio::test]
#[ignore = "requires node"]
async fn test_javascript_hello() {
    assert_hello("javascript", "hello.js").await;
}

#[tokio::test]
#[ignore = "requires lua"]
async fn test_lua_hello() {
    assert_hello("lua", "hello.lua").await;
}

#[tokio::test]
#[ignore = "requires bash"]
async fn test_bash_hello() {
    assert_hello("bash", "hello.sh").await;
}

#[tokio::test]
#[ignore = "requires sqlite3"]
async fn test_sql_hello() {
    assert_hello("sql", "hello.sql").await;
}

#[tokio::test]
#[ignore = "requires go"]
async fn test_go_hello() {
    assert_hello("go", "hello.go").await;
}

#[tokio::test]
#[ignore = "requires g++"]
async fn test_cpp_hello() {
    assert_hello("cpp", "hello.cpp").await;
}

#[tokio::test]
#[ignore = "requires rustc"]
async fn test_rust_hello() {
    assert_hello("rust", "hello.rs").await;
}

#[tokio::test]
#[ignore = "requires a JDK"]
async fn test_java_hello() {
    assert_hello("java", "Main.java").await;
}

#[tokio::test]
#[ignore = "requires g++"]
async fn test_cpp_compile_error_verbatim() {
    let mut harness = harness_with_defaults().await;

    let err = harness
        .session
        .run_code("cpp", &fixture_source("compile_error.cpp"))
        .await
        .expect_err("broken source compiled");
    let RunError::BuildFailure { diagnostic, .. } = &err else {
        panic!("expected build failure, got {err:?}");
    };
    assert!(diagnostic.contains("main.cpp:2"));

    let output = harness.finish_run().await;
    assert_eq!(&output.stderr, diagnostic);
    assert!(!output.success);
}

#[tokio::test]
#[ignore = "requires python3"]
async fn test_python_prompt_and_input() {
    let root = tempfile::tempdir().expect("Failed to create temp dir");
    let mut config = Config::default();
    config.workspace_root = root.path().to_path_buf();
    let (tx, mut events) = event_channel(config.event_buffer);
    let session = Session::open(Arc::new(config), tx)
        .await
        .expect("Failed to open session");

    session
        .run_code("python", &fixture_source("echo.py"))
        .await
        .expect("Failed to start");

    match events.recv().await {
        Some(ServerEvent::TermOutput { data, .. }) => assert_eq!(data, "Name: "),
        other => panic!("unexpected event {other:?}"),
    }
    assert!(session.send_input("Grace").await.is_delivered());

    let mut stdout = String::new();
    loop {
        match events.recv().await {
            Some(ServerEvent::TermOutput { data, .. }) => stdout.push_str(&data),
            Some(ServerEvent::TermStop { success, .. }) => {
                assert!(success);
                break;
            }
            None => panic!("event channel closed"),
        }
    }
    assert_eq!(stdout, "Hello, Grace!\n");
    session.close().await;
}
