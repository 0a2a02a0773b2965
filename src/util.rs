//! Small utility helpers used across modules.

/// Minutes left until a deadline, rounded up, never negative.
/// A timer with 61 seconds on the clock still reads "2 minutes".
pub fn ceil_minutes(seconds: i64) -> i64 {
  if seconds <= 0 {
    0
  } else {
    (seconds + 59) / 60
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max { s.to_string() } else { format!("{}… ({} bytes total)", &s[..max], s.len()) }
}
