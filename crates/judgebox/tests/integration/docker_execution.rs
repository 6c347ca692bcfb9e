//! End-to-end execution in real containers
//!
//! These pull the configured images on first use, so the first run can be slow.

use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

use judgebox::classify::SEGFAULT_MESSAGE;
use judgebox::config::{LanguageId, load_battery};
use judgebox::judge::Judge;
use judgebox::sandbox::{Container, ContainerLimits, ContainerSpec, DockerRunner};
use judgebox::types::{ErrorKind, ResourceLimits, TestCase, Verdict};

use super::{fixture_path, fixture_source, test_config};

fn judge() -> Judge<DockerRunner> {
    let config = test_config();
    Judge::new(DockerRunner::new(config.clone()), &config)
}

async fn judge_sum(file: &str, language: LanguageId) {
    let cases = load_battery(fixture_path("batteries", "sum.toml")).unwrap();
    let result = judge()
        .judge(&fixture_source(file), language, &cases, None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::Accepted, "{file}: {result:?}");
    assert_eq!(result.test_results.len(), 3);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_sum_c() {
    judge_sum("sum.c", LanguageId::C).await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_sum_cpp() {
    judge_sum("sum.cpp", LanguageId::Cpp).await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_sum_java() {
    judge_sum("sum.java", LanguageId::Java).await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_sum_python() {
    judge_sum("sum.py", LanguageId::Python).await;
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_compile_error_reports_line() {
    let cases = vec![TestCase::new("", "hello"), TestCase::new("", "hello")];
    let result = judge()
        .judge(
            &fixture_source("missing_semicolon.c"),
            LanguageId::C,
            &cases,
            None,
        )
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::CompileError);
    assert_eq!(result.test_results.len(), 1);
    let error = result.test_results[0].error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::CompileError);
    assert_eq!(error.line, Some(4));
    assert!(error.message.starts_with("Line 4: "), "{}", error.message);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_syntax_error() {
    let single = judge()
        .run_one(
            &fixture_source("syntax_error.py"),
            LanguageId::Python,
            &TestCase::new("", ""),
            None,
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::CompileError);
    let error = single.result.error.unwrap();
    assert!(error.message.starts_with("SyntaxError"), "{}", error.message);
    assert_eq!(error.line, Some(1));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_python_runtime_error_line() {
    let single = judge()
        .run_one(
            &fixture_source("divide_by_zero.py"),
            LanguageId::Python,
            &TestCase::new("", ""),
            None,
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::RuntimeError);
    let error = single.result.error.unwrap();
    assert!(error.message.starts_with("ZeroDivisionError"), "{}", error.message);
    assert_eq!(error.line, Some(2));
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_segfault() {
    let single = judge()
        .run_one(
            &fixture_source("segfault.c"),
            LanguageId::C,
            &TestCase::new("", ""),
            None,
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::RuntimeError);
    assert_eq!(single.result.error.unwrap().message, SEGFAULT_MESSAGE);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_time_limit_keeps_partial_output() {
    let limits = ResourceLimits::unset().with_time_limit(1.0);
    let single = judge()
        .run_one(
            &fixture_source("sleep.py"),
            LanguageId::Python,
            &TestCase::new("", "started"),
            Some(&limits),
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::TimeLimitExceeded);
    assert_eq!(single.result.actual_output.as_deref(), Some("started\n"));
    // Deadline plus container teardown, nowhere near the 30s sleep
    assert!(single.result.wall_time_ms < 5_000);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_memory_limit() {
    let limits = ResourceLimits::unset().with_memory_limit(64);
    let single = judge()
        .run_one(
            &fixture_source("memory_hog.c"),
            LanguageId::C,
            &TestCase::new("", ""),
            Some(&limits),
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::MemoryLimitExceeded);
    let error = single.result.error.unwrap();
    assert!(error.message.contains("64MB"), "{}", error.message);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_source_is_never_shell_interpreted() {
    let single = judge()
        .run_one(
            &fixture_source("shell_injection.py"),
            LanguageId::Python,
            &TestCase::new("", "38\nFalse"),
            None,
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::Accepted, "{single:?}");
    assert!(!std::path::Path::new("/tmp/pwned").exists());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_no_network() {
    let single = judge()
        .run_one(
            &fixture_source("network.py"),
            LanguageId::Python,
            &TestCase::new("", "offline"),
            None,
        )
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::Accepted, "{single:?}");
}

fn container_exists(name: &str) -> bool {
    Command::new("docker")
        .args(["container", "inspect", name])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_container_removed_after_use() {
    let spec = ContainerSpec {
        image: "python:3.12-slim".to_string(),
        limits: ContainerLimits {
            memory_mb: 64,
            cpus: 1.0,
            max_processes: 32,
            scratch_dir: "/tmp".to_string(),
            scratch_size_mb: 16,
        },
        ttl: Duration::from_secs(30),
    };

    let container = Container::create("docker", &spec).await.unwrap();
    let name = container.name().to_string();
    assert!(container_exists(&name));

    let path = container.write_file("main.py", b"print(6 * 7)").await.unwrap();
    let output = container
        .exec(
            vec!["python3".to_string(), path],
            &HashMap::new(),
            None,
            Duration::from_secs(10),
            1024,
        )
        .await
        .unwrap();
    assert_eq!(output.stdout_lossy().trim(), "42");

    container.remove().await.unwrap();
    assert!(!container_exists(&name));
}
