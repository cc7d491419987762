/// Number of leading token characters kept when logging a secret
const REDACTED_PREFIX_LEN: usize = 10;

/// Redact a bearer or refresh token for logging, keeping a short prefix
pub fn redact_token(token: &str) -> String {
    if token.is_empty() {
        "<empty>".to_string()
    } else if token.chars().count() <= REDACTED_PREFIX_LEN {
        "***".to_string()
    } else {
        let prefix: String = token.chars().take(REDACTED_PREFIX_LEN).collect();
        format!("{}...", prefix)
    }
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y %H:%M").to_string()
    } else if let Ok(d) = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        d.format("%b %d, %Y").to_string()
    } else {
        date.to_string()
    }
}
