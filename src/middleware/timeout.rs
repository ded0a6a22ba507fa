use std::time::Duration;

use crate::error::Error;
use crate::handler::{Handler, Outcome};
use crate::request::Request;

/// Wraps `handler` so that it fails with [`Error::Timeout`] if it has not
/// produced an outcome within `limit`.
///
/// The inner future is dropped on expiry; work it spawned elsewhere keeps
/// running.
pub fn timeout(limit: Duration, handler: impl Handler) -> impl Handler {
    let inner = handler.into_boxed_handler();
    move |req: Request| {
        let inner = std::sync::Arc::clone(&inner);
        async move {
            match tokio::time::timeout(limit, inner.call(req)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::Fail(Error::Timeout(limit)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;
    use crate::{Response, Router};

    async fn slow(_req: Request) -> Response {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Response::text("late")
    }

    async fn quick(_req: Request) -> Response {
        Response::text("fast")
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_fails_with_timeout() {
        let router = Router::new().get("/", timeout(Duration::from_millis(50), slow));
        let res = router.dispatch(Request::builder().build()).await;
        assert_eq!(res.status_code(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn inner_panic_before_its_future_is_contained() {
        let explode = |_req: Request| -> std::future::Ready<Outcome> { panic!("setup failed") };
        let router = Router::new().get("/", timeout(Duration::from_secs(1), explode));
        let res = router.dispatch(Request::builder().build()).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn fast_handler_is_untouched() {
        let router = Router::new().get("/", timeout(Duration::from_secs(1), quick));
        let res = router.dispatch(Request::builder().build()).await;
        assert_eq!(res.body(), b"fast");
    }
}
