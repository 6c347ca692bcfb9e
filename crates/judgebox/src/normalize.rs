//! Output normalization for comparison

/// Canonicalize program output
///
/// CRLF and lone CR become LF, then leading and trailing whitespace is
/// trimmed. Nothing else changes: runs of spaces, case and numeric
/// formatting are all significant.
pub fn normalize(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n").trim().to_string()
}

/// Compare actual and expected output after normalizing both
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalize(actual) == normalize(expected)
}
