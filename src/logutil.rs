//! Logging helpers.
//!
//! User-supplied text (chat lines, usernames, handshake payloads) is escaped
//! before it reaches a log record so one record always stays on one line.

/// Log at warn level under the `security` target, which `init_logging`
/// also tees into the security log file.
macro_rules! sec_log {
    ($($arg:tt)*) => { log::warn!(target: "security", $($arg)*); };
}
pub(crate) use sec_log;

/// Longest preview kept in a log record, in characters.
const MAX_PREVIEW: usize = 200;

/// Escape control characters and cap the length of `s` for single-line logging.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        if ch == '\\' || ch.is_control() {
            out.extend(ch.escape_default());
        } else {
            out.push(ch);
        }
    }
    out
}
