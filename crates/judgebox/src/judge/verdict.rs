//! Per-case evaluation and verdict reduction

use tracing::warn;

use crate::classify::classify_outcome;
use crate::normalize::outputs_match;
use crate::sandbox::SandboxError;
use crate::types::{
    ClassifiedError, ErrorKind, ExecutionOutcome, ExecutionRequest, TestCase, TestCaseResult,
    Verdict,
};

/// Turn one runner result into a test case result
///
/// Infrastructure failures become an `InternalError` diagnosis; they are
/// never propagated to the caller.
pub(crate) fn evaluate(
    index: usize,
    case: &TestCase,
    request: &ExecutionRequest,
    executed: Result<ExecutionOutcome, SandboxError>,
) -> TestCaseResult {
    let outcome = match executed {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(index, error = %e, "runner failed");
            let error = ClassifiedError::new(ErrorKind::InternalError, e.to_string());
            return failing(index, case, None, error, 0);
        }
    };

    if let Some(error) = classify_outcome(&outcome, request) {
        let actual = (!outcome.stdout.is_empty()).then_some(outcome.stdout);
        return failing(index, case, actual, error, outcome.wall_time_ms);
    }

    let passed = outputs_match(&outcome.stdout, &case.expected_output);
    TestCaseResult {
        index,
        passed,
        verdict: if passed {
            Verdict::Accepted
        } else {
            Verdict::WrongAnswer
        },
        hidden: case.is_hidden,
        actual_output: Some(outcome.stdout),
        expected_output: Some(case.expected_output.clone()),
        error: None,
        wall_time_ms: outcome.wall_time_ms,
    }
}

fn failing(
    index: usize,
    case: &TestCase,
    actual_output: Option<String>,
    error: ClassifiedError,
    wall_time_ms: u64,
) -> TestCaseResult {
    TestCaseResult {
        index,
        passed: false,
        verdict: Verdict::from(error.kind),
        hidden: case.is_hidden,
        actual_output,
        expected_output: Some(case.expected_output.clone()),
        error: Some(error),
        wall_time_ms,
    }
}

/// Withhold a hidden case's content, keeping only pass/fail and the classification
///
/// Compile errors keep their diagnostics; they do not depend on the case.
pub(crate) fn redact(mut result: TestCaseResult) -> TestCaseResult {
    if !result.hidden {
        return result;
    }
    result.actual_output = None;
    result.expected_output = None;
    if let Some(ref mut error) = result.error
        && error.kind != ErrorKind::CompileError
    {
        error.message = error.kind.title().to_string();
        error.line = None;
        error.column = None;
    }
    result
}

/// Verdict of the first failing case, Accepted if every case passed,
/// `None` if nothing was evaluated
pub(crate) fn reduce(results: &[TestCaseResult]) -> Option<Verdict> {
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .find(|r| !r.passed)
            .map_or(Verdict::Accepted, |r| r.verdict),
    )
}

/// Human-readable summary; case numbers are 1-based
pub(crate) fn summary(verdict: Verdict, results: &[TestCaseResult]) -> String {
    match results.iter().find(|r| !r.passed) {
        None => format!("All {} test cases passed", results.len()),
        Some(first) => format!("{} on test case {}", verdict, first.index + 1),
    }
}
