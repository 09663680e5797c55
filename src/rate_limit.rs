use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Shared unkeyed limiter
pub type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Limiter pacing outbound venue status queries.
///
/// Returns `None` when `requests_per_second` is zero, which disables pacing.
pub fn create_venue_limiter(requests_per_second: u32) -> Option<SharedRateLimiter> {
    NonZeroU32::new(requests_per_second)
        .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))))
}

/// Limiter guarding the HTTP API; `None` when `requests_per_minute` is zero
pub fn create_api_limiter(requests_per_minute: u32) -> Option<SharedRateLimiter> {
    NonZeroU32::new(requests_per_minute)
        .map(|rate| Arc::new(RateLimiter::direct(Quota::per_minute(rate))))
}

/// Middleware rejecting requests over the API quota
pub async fn rate_limit_middleware(
    State(limiter): State<SharedRateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!("API rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded. Please try again later.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_disables_limiter() {
        assert!(create_venue_limiter(0).is_none());
        assert!(create_api_limiter(0).is_none());
    }

    #[test]
    fn test_api_limiter_exhausts_quota() {
        let limiter = create_api_limiter(2).unwrap();
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }

    #[tokio::test]
    async fn test_venue_limiter_allows_first_request_immediately() {
        let limiter = create_venue_limiter(5).unwrap();
        limiter.until_ready().await;
        assert!(limiter.check().is_ok());
    }
}
