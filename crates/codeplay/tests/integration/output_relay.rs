use codeplay::{ServerEvent, StreamKind};

use super::Harness;

#[tokio::test]
async fn test_many_lines_without_trailing_newline() {
    let mut harness = Harness::new().await;

    let output = harness
        .run(
            "sh",
            "i=0; while [ $i -lt 1000 ]; do echo \"line $i\"; i=$((i + 1)); done; printf 'tail'",
        )
        .await;

    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines.len(), 1001);
    assert_eq!(lines[0], "line 0");
    assert_eq!(lines[999], "line 999");
    assert_eq!(lines[1000], "tail");
    assert!(!output.stdout.ends_with('\n'));
    assert!(output.success);
}

#[tokio::test]
async fn test_streams_are_tagged() {
    let mut harness = Harness::new().await;

    harness
        .session
        .run_code("sh", "echo out; echo err >&2")
        .await
        .expect("Failed to start");

    let mut seen = Vec::new();
    loop {
        match harness.next_event().await {
            ServerEvent::TermOutput { data, stream } => seen.push((stream, data)),
            ServerEvent::TermStop { .. } => break,
        }
    }

    assert!(seen.contains(&(StreamKind::Stdout, "out\n".to_string())));
    assert!(seen.contains(&(StreamKind::Stderr, "err\n".to_string())));
}

#[tokio::test]
async fn test_output_precedes_stop_event() {
    let mut harness = Harness::new().await;

    let output = harness
        .run("sh", "i=0; while [ $i -lt 50 ]; do echo $i; i=$((i + 1)); done")
        .await;

    let expected: String = (0..50).map(|i| format!("{i}\n")).collect();
    assert_eq!(output.stdout, expected);
}

#[tokio::test]
async fn test_multibyte_output_is_intact() {
    let mut harness = Harness::new().await;

    let output = harness.run("sh", "printf 'héllo ☃ wörld 😀'").await;

    assert_eq!(output.stdout, "héllo ☃ wörld 😀");
}
