//! gcc/g++ diagnostics and signal crashes

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ClassifiedError, ErrorKind, SEGFAULT_EXIT_CODE};

pub const SEGFAULT_MESSAGE: &str =
    "Runtime Error: Segmentation fault (accessing invalid memory)";

/// `file:line:column: severity: message`
static DIAGNOSTIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\n:]+:(\d+):(\d+):\s*(fatal error|error|warning|note):\s*(.+)$")
        .expect("diagnostic pattern is valid")
});

/// First compiler diagnostic with an error severity
///
/// Warnings and notes are skipped, so a warning followed by an error reports
/// the error.
pub(crate) fn parse_compile(raw: &str) -> Option<ClassifiedError> {
    DIAGNOSTIC.captures_iter(raw).find_map(|caps| {
        let severity = caps.get(3)?.as_str();
        if severity != "error" && severity != "fatal error" {
            return None;
        }
        let line: u32 = caps.get(1)?.as_str().parse().ok()?;
        let column = caps.get(2)?.as_str().parse().ok();
        let message = caps.get(4)?.as_str().trim();

        Some(
            ClassifiedError::new(ErrorKind::CompileError, format!("Line {line}: {message}"))
                .at_line(Some(line))
                .at_column(column),
        )
    })
}

/// Runtime crash recognised from the diagnostic text alone
pub(crate) fn parse_runtime(raw: &str) -> Option<ClassifiedError> {
    if is_segfault_text(raw) {
        return Some(ClassifiedError::new(
            ErrorKind::RuntimeError,
            SEGFAULT_MESSAGE,
        ));
    }
    None
}

fn is_segfault_text(raw: &str) -> bool {
    raw.contains("Segmentation fault") || raw.contains("SIGSEGV")
}

/// Fixed explanation for a process terminated by a signal, keyed by exit status
pub(crate) fn describe_signal(exit_code: i32) -> Option<&'static str> {
    match exit_code {
        SEGFAULT_EXIT_CODE => Some(SEGFAULT_MESSAGE),
        134 => Some("Runtime Error: Aborted (SIGABRT)"),
        136 => Some("Runtime Error: Floating point exception (SIGFPE)"),
        _ => None,
    }
}

/// Whether the outcome looks like an invalid memory access
pub(crate) fn is_segfault(exit_code: i32, stderr: &str) -> bool {
    exit_code == SEGFAULT_EXIT_CODE || is_segfault_text(stderr)
}
