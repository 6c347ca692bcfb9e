//! Orchestration against in-process runners

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use judgebox::config::{Config, LanguageId, load_battery};
use judgebox::judge::{BatchPolicy, CancelToken, Judge, JudgeError};
use judgebox::sandbox::{Runner, SandboxError};
use judgebox::types::{
    ExecutionOutcome, ExecutionRequest, KilledReason, Phase, TestCase, Verdict,
};

use super::{fixture_path, fixture_source};

/// Adds the two integers on stdin, like the `sum` fixtures
///
/// Behaviour is steered by markers in the source text so one runner can
/// stand in for several submissions.
#[derive(Default)]
struct SumRunner {
    calls: AtomicUsize,
}

#[async_trait]
impl Runner for SumRunner {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let source = request.source();

        if source.contains("#compile-error") {
            return Ok(ExecutionOutcome {
                stderr: "/tmp/main.c:4:22: error: expected ';' before 'return'".into(),
                exit_code: 1,
                phase: Phase::Compile,
                ..Default::default()
            });
        }
        if source.contains("#slow") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let numbers: Vec<i64> = request
            .stdin()
            .split_whitespace()
            .filter_map(|n| n.parse().ok())
            .collect();
        let mut sum: i64 = numbers.iter().sum();
        if source.contains("#off-by-one") && sum > 100 {
            sum += 1;
        }
        if source.contains("#hog") && sum > 100 {
            return Ok(ExecutionOutcome {
                exit_code: 137,
                killed_reason: KilledReason::Oom,
                ..Default::default()
            });
        }

        Ok(ExecutionOutcome {
            stdout: format!("{sum}\r\n"),
            wall_time_ms: 1,
            ..Default::default()
        })
    }
}

fn battery() -> Vec<TestCase> {
    load_battery(fixture_path("batteries", "sum.toml")).unwrap()
}

fn judge() -> Judge<SumRunner> {
    Judge::new(SumRunner::default(), &Config::default())
}

#[tokio::test]
async fn test_correct_submission_accepted() {
    let judge = judge();
    let result = judge
        .judge(&fixture_source("sum.py"), LanguageId::Python, &battery(), None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::Accepted);
    assert_eq!(result.test_results.len(), 3);
    assert_eq!(result.message, "All 3 test cases passed");
    // Hidden case content is withheld even when it passes
    assert!(result.test_results[2].actual_output.is_none());
    assert!(result.test_results[0].actual_output.is_some());
}

#[tokio::test]
async fn test_pass_fail_pass_stops_after_two() {
    let cases = vec![
        TestCase::new("1 2", "3"),
        TestCase::new("1 2", "4"),
        TestCase::new("2 2", "4"),
    ];
    let judge = judge();
    let result = judge
        .judge("print(sum)", LanguageId::Python, &cases, None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::WrongAnswer);
    let indices: Vec<usize> = result.test_results.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1]);
    assert_eq!(judge.runner().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_hidden_failure_redacted() {
    let judge = judge();
    let result = judge
        .judge("#off-by-one", LanguageId::Cpp, &battery(), None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::WrongAnswer);
    assert_eq!(result.message, "Wrong Answer on test case 3");
    let failing = result.test_results.last().unwrap();
    assert!(failing.hidden);
    assert!(failing.actual_output.is_none());
    assert!(failing.expected_output.is_none());
}

#[tokio::test]
async fn test_hidden_memory_limit_keeps_only_classification() {
    let judge = judge();
    let result = judge
        .judge("#hog", LanguageId::Java, &battery(), None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::MemoryLimitExceeded);
    let error = result.test_results[2].error.as_ref().unwrap();
    assert_eq!(error.message, "Memory Limit Exceeded");
}

#[tokio::test]
async fn test_compile_error_single_result() {
    let judge = judge().with_policy(BatchPolicy::RunAll);
    let result = judge
        .judge("#compile-error", LanguageId::C, &battery(), None)
        .await
        .unwrap();

    assert_eq!(result.verdict, Verdict::CompileError);
    assert_eq!(result.test_results.len(), 1);
    assert_eq!(result.message, "Compile Error on test case 1");
    let error = result.test_results[0].error.as_ref().unwrap();
    assert_eq!(error.message, "Line 4: expected ';' before 'return'");
    assert_eq!(error.column, Some(22));
}

#[tokio::test]
async fn test_run_one_with_edited_input() {
    let judge = judge();
    let case = TestCase::new("40 2", "42");
    let single = judge
        .run_one("code", LanguageId::Python, &case, None)
        .await
        .unwrap();

    assert_eq!(single.verdict, Verdict::Accepted);
    assert_eq!(single.result.actual_output.as_deref(), Some("42\r\n"));
    assert_eq!(judge.runner().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_submissions_do_not_interfere() {
    let judge = Arc::new(judge());
    let cases = battery();

    let correct = {
        let judge = judge.clone();
        let cases = cases.clone();
        tokio::spawn(async move {
            judge
                .judge("#slow", LanguageId::Python, &cases, None)
                .await
        })
    };
    let wrong = {
        let judge = judge.clone();
        let cases = cases.clone();
        tokio::spawn(async move {
            judge
                .judge("#slow #off-by-one", LanguageId::Python, &cases, None)
                .await
        })
    };

    let correct = correct.await.unwrap().unwrap();
    let wrong = wrong.await.unwrap().unwrap();
    assert_eq!(correct.verdict, Verdict::Accepted);
    assert_eq!(wrong.verdict, Verdict::WrongAnswer);
    assert_eq!(judge.runner().calls.load(Ordering::SeqCst), 6);
}

/// Cancels the shared token on its first call
struct CancellingRunner {
    token: CancelToken,
    calls: AtomicUsize,
}

#[async_trait]
impl Runner for CancellingRunner {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, SandboxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        Ok(ExecutionOutcome {
            stdout: request.stdin().to_string(),
            ..Default::default()
        })
    }
}

#[tokio::test]
async fn test_cancel_between_cases() {
    let token = CancelToken::new();
    let runner = CancellingRunner {
        token: token.clone(),
        calls: AtomicUsize::new(0),
    };
    let judge = Judge::new(runner, &Config::default());
    let cases = vec![TestCase::new("a", "a"), TestCase::new("b", "b")];

    let err = judge
        .judge_with_cancel("code", LanguageId::Python, &cases, None, &token)
        .await
        .unwrap_err();

    assert!(matches!(err, JudgeError::Cancelled));
    // The dispatched case ran to completion; the next one never started
    assert_eq!(judge.runner().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shared_runner_through_arc() {
    let runner = Arc::new(SumRunner::default());
    let first = Judge::new(runner.clone(), &Config::default());
    let second = Judge::new(runner.clone(), &Config::default());

    let case = TestCase::new("1 1", "2");
    first.run_one("", LanguageId::C, &case, None).await.unwrap();
    second.run_one("", LanguageId::C, &case, None).await.unwrap();
    assert_eq!(runner.calls.load(Ordering::SeqCst), 2);
}
