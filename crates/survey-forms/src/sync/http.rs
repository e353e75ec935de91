use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Sends the request built by `build`; on 429 waits for `Retry-After` and
/// sends exactly once more, returning whatever the second attempt yields.
pub(crate) async fn send_with_rate_limit_retry<F>(build: F) -> Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let response = build().send().await?;
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return Ok(response);
    }

    let delay = retry_after(response.headers());
    tracing::warn!(
        url = %response.url(),
        delay_ms = delay.as_millis() as u64,
        "rate limited, retrying once"
    );
    tokio::time::sleep(delay).await;
    build().send().await
}

/// `Retry-After` in whole seconds, capped; HTTP-date values fall back to 1s.
fn retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .map_or(DEFAULT_RETRY_AFTER, |delay| delay.min(MAX_RETRY_AFTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn retry_after_parses_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Duration::from_secs(3));
    }

    #[test]
    fn retry_after_defaults_and_caps() {
        assert_eq!(retry_after(&HeaderMap::new()), DEFAULT_RETRY_AFTER);

        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), DEFAULT_RETRY_AFTER);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("600"));
        assert_eq!(retry_after(&headers), MAX_RETRY_AFTER);
    }
}
