//! Python tracebacks

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ClassifiedError, ErrorKind};

/// Errors raised while the source is parsed, before anything runs
const SYNTAX_CLASS: [&str; 3] = ["SyntaxError", "IndentationError", "TabError"];

/// `File "path", line N[, in scope]`
static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*File "[^"]*", line (\d+)"#).expect("frame pattern is valid")
});

/// Final traceback line: `[pkg.]NameError[: message]`
static EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:\w+\.)*\w*(?:Error|Exception|Interrupt|Exit|Iteration))(?::\s?(.*))?$")
        .expect("exception pattern is valid")
});

/// Lines that only point at a span: `^^^^`, `~~~^~~`
fn is_marker(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, '^' | '~'))
}

pub(crate) fn is_syntax_class(name: &str) -> bool {
    SYNTAX_CLASS.contains(&name)
}

/// Parse a traceback into its exception, line and offending source line
///
/// Syntax-class errors become CompileError; the caller demotes them when the
/// program had already produced output.
pub(crate) fn parse(raw: &str) -> Option<ClassifiedError> {
    let lines: Vec<&str> = raw.lines().collect();

    let (exc_idx, caps) = lines
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, line)| EXCEPTION.captures(line.trim_end()).map(|c| (i, c)))?;

    let name = caps.get(1)?.as_str();
    let short_name = name.rsplit('.').next().unwrap_or(name);
    let detail = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

    // Innermost frame preceding the exception line
    let frame = lines[..exc_idx]
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, line)| {
            let n: u32 = FRAME.captures(line)?.get(1)?.as_str().parse().ok()?;
            Some((i, n))
        });
    let line = frame.map(|(_, n)| n);

    let code = frame.and_then(|(i, _)| {
        lines[i + 1..exc_idx]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty() && !is_marker(l))
    });

    let mut message = if detail.is_empty() {
        short_name.to_string()
    } else {
        format!("{short_name}: {detail}")
    };

    if is_syntax_class(short_name) {
        if let (Some(n), Some(code)) = (line, code) {
            message.push_str(&format!("\nLine {n}: {code}"));
        }
        return Some(ClassifiedError::new(ErrorKind::CompileError, message).at_line(line));
    }

    Some(ClassifiedError::new(ErrorKind::RuntimeError, message).at_line(line))
}

/// The interpreter ran out of memory rather than crashing
pub(crate) fn is_out_of_memory(stderr: &str) -> bool {
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .is_some_and(|l| l.trim_start().starts_with("MemoryError"))
}
