use std::time::Duration;

/// How a non-success GitHub response should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    NotFound,
    /// 409/422: the resource already exists or the mutation is a no-op.
    Conflict,
    /// 429, 5xx, and primary rate-limit 403s. Safe to retry.
    Transient,
    Rejected,
}

pub fn classify_github_status(status: u16, rate_limit_exhausted: bool) -> StatusClass {
    match status {
        404 | 410 => StatusClass::NotFound,
        409 | 422 => StatusClass::Conflict,
        429 => StatusClass::Transient,
        403 if rate_limit_exhausted => StatusClass::Transient,
        status if status >= 500 => StatusClass::Transient,
        _ => StatusClass::Rejected,
    }
}

pub fn is_retryable_github_status(status: u16, rate_limit_exhausted: bool) -> bool {
    classify_github_status(status, rate_limit_exhausted) == StatusClass::Transient
}

/// True when GitHub reports the primary rate-limit budget as spent.
pub fn rate_limit_exhausted(headers: &reqwest::header::HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim() == "0")
        .unwrap_or(false)
}

pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?;
    let seconds = raw.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

pub fn retry_delay(base_delay_ms: u64, attempt: usize, retry_after: Option<Duration>) -> Duration {
    if let Some(delay) = retry_after {
        return delay
            .max(Duration::from_millis(base_delay_ms))
            .min(Duration::from_secs(60));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(30_000))
}

pub fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
