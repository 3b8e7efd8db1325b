//! Retry and formatting helpers for the Discord REST client.

use std::time::Duration;

pub(super) fn is_retryable_discord_status(status: u16) -> bool {
    status == 429 || status >= 500
}

pub(super) fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

/// Reads the rate-limit `retry-after` header. Discord sends fractional
/// seconds.
pub(super) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get("retry-after")?.to_str().ok()?.trim();
    let seconds = raw.parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds.min(60.0)))
}

pub(super) fn retry_delay(
    base_delay_ms: u64,
    attempt: usize,
    retry_after: Option<Duration>,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay.max(Duration::from_millis(base_delay_ms));
    }
    let exponent = attempt.saturating_sub(1).min(10) as u32;
    let scaled = base_delay_ms.saturating_mul(2_u64.saturating_pow(exponent));
    Duration::from_millis(scaled.min(30_000))
}

pub(super) fn truncate_for_error(text: &str) -> String {
    const MAX_CHARS: usize = 256;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    let mut truncated = text.chars().take(MAX_CHARS).collect::<String>();
    truncated.push_str("...");
    truncated
}
