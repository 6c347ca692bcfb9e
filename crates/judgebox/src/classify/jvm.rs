//! javac diagnostics and JVM exception traces

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ClassifiedError, ErrorKind};

/// `File.java:line: error: message`
static COMPILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^\n:]+:(\d+):\s*error:\s*(.+)$").expect("javac pattern is valid")
});

/// `[pkg.]NameException: message` or `[pkg.]NameError` on its own
static EXCEPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:[\w$]+\.)*([\w$]+(?:Exception|Error))(?::[ \t]*(.*))?$")
        .expect("exception pattern is valid")
});

/// `at Class.method(File.java:line)`
static FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*at\s+[^(\n]+\([^:()\n]+:(\d+)\)").expect("frame pattern is valid")
});

pub(crate) fn parse_compile(raw: &str) -> Option<ClassifiedError> {
    let caps = COMPILE.captures(raw)?;
    let line: u32 = caps.get(1)?.as_str().parse().ok()?;
    let message = caps.get(2)?.as_str().trim();
    Some(
        ClassifiedError::new(ErrorKind::CompileError, format!("Line {line}: {message}"))
            .at_line(Some(line)),
    )
}

pub(crate) fn parse_runtime(raw: &str) -> Option<ClassifiedError> {
    let caps = EXCEPTION.captures(raw)?;
    let whole = caps.get(0)?;
    let name = caps.get(1)?.as_str();
    let detail = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

    let message = if detail.is_empty() {
        name.to_string()
    } else {
        format!("{name}: {detail}")
    };

    // Innermost frame in user code; JDK frames carry a module path
    let line = FRAME
        .captures_iter(&raw[whole.end()..])
        .filter(|frame| !frame.get(0).is_some_and(|m| m.as_str().contains('/')))
        .find_map(|frame| frame.get(1)?.as_str().parse().ok());

    Some(ClassifiedError::new(ErrorKind::RuntimeError, message).at_line(line))
}

/// The JVM ran out of heap rather than crashing
pub(crate) fn is_out_of_memory(stderr: &str) -> bool {
    stderr.contains("java.lang.OutOfMemoryError")
}
