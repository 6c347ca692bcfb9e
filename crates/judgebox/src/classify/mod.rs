//! Error classification
//!
//! Turns raw diagnostics (compiler output, tracebacks, termination signals)
//! into a [`ClassifiedError`]. Everything here is pure and total: any byte
//! string yields a classification.

use crate::config::{LanguageFamily, LanguageProfile};
use crate::types::{ClassifiedError, ErrorKind, ExecutionOutcome, ExecutionRequest, KilledReason, Phase};

mod jvm;
mod native;
mod python;

pub use native::SEGFAULT_MESSAGE;

const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Classify raw diagnostic text for a language
///
/// Per-language rules are tried first; when none matches, the trimmed text
/// itself becomes the message, kinded by the step that produced it.
pub fn classify(raw: &str, language: &LanguageProfile, was_compile_step: bool) -> ClassifiedError {
    let parsed = match (language.id.family(), was_compile_step) {
        (LanguageFamily::Native, true) => native::parse_compile(raw),
        (LanguageFamily::Native, false) => native::parse_runtime(raw),
        (LanguageFamily::Jvm, true) => jvm::parse_compile(raw),
        (LanguageFamily::Jvm, false) => jvm::parse_runtime(raw),
        (LanguageFamily::Interpreted, _) => python::parse(raw),
    };

    parsed.unwrap_or_else(|| fallback(raw, was_compile_step))
}

fn fallback(raw: &str, was_compile_step: bool) -> ClassifiedError {
    let kind = if was_compile_step {
        ErrorKind::CompileError
    } else {
        ErrorKind::RuntimeError
    };
    let trimmed = raw.trim();
    let message = if trimmed.is_empty() {
        UNKNOWN_ERROR
    } else {
        trimmed
    };
    ClassifiedError::new(kind, message)
}

/// Classify a finished execution, or `None` if it ran cleanly
///
/// Kill reasons take precedence over any text. A clean exit is not an error
/// even with stderr content; comparing the output is the caller's job.
pub fn classify_outcome(
    outcome: &ExecutionOutcome,
    request: &ExecutionRequest,
) -> Option<ClassifiedError> {
    match outcome.killed_reason {
        KilledReason::Oom => return Some(memory_exceeded(request)),
        KilledReason::Timeout => {
            return Some(ClassifiedError::new(
                ErrorKind::TimeLimitExceeded,
                format!(
                    "Time Limit Exceeded: Your code ran longer than {} seconds.",
                    request.time_limit_seconds()
                ),
            ));
        }
        KilledReason::None => {}
    }

    let language = request.language();

    if outcome.phase == Phase::Compile {
        let mut error = classify(&outcome.stderr, language, true);
        // A compile step never produces a runtime diagnosis
        error.kind = ErrorKind::CompileError;
        return Some(error);
    }

    if outcome.exit_code == 0 {
        return None;
    }

    let family = language.id.family();
    let stderr = outcome.stderr.as_str();

    match family {
        LanguageFamily::Native => {
            if native::is_segfault(outcome.exit_code, stderr) {
                return Some(ClassifiedError::new(
                    ErrorKind::RuntimeError,
                    SEGFAULT_MESSAGE,
                ));
            }
            if stderr.trim().is_empty()
                && let Some(message) = native::describe_signal(outcome.exit_code)
            {
                return Some(ClassifiedError::new(ErrorKind::RuntimeError, message));
            }
        }
        LanguageFamily::Jvm if jvm::is_out_of_memory(stderr) => {
            return Some(memory_exceeded(request));
        }
        LanguageFamily::Interpreted if python::is_out_of_memory(stderr) => {
            return Some(memory_exceeded(request));
        }
        _ => {}
    }

    if stderr.trim().is_empty() {
        return Some(ClassifiedError::new(
            ErrorKind::RuntimeError,
            format!("Process exited with code {}", outcome.exit_code),
        ));
    }

    let mut error = classify(stderr, language, false);
    if error.kind == ErrorKind::CompileError
        && family == LanguageFamily::Interpreted
        && !outcome.stdout.trim().is_empty()
    {
        // Raised after the program had already produced output, e.g. from eval()
        error.kind = ErrorKind::RuntimeError;
    }
    Some(error)
}

fn memory_exceeded(request: &ExecutionRequest) -> ClassifiedError {
    ClassifiedError::new(
        ErrorKind::MemoryLimitExceeded,
        format!(
            "Memory Limit Exceeded: Your code used more than {}MB of memory.",
            request.memory_limit_mb()
        ),
    )
}
