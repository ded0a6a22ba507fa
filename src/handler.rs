//! Handler traits, outcomes and type erasure.
//!
//! # The advance contract
//!
//! Every chain entry returns an [`Outcome`]:
//!
//! - [`Outcome::Continue`] hands control to the next entry.
//! - [`Outcome::Respond`] ends the chain with a response.
//! - [`Outcome::Fail`] switches the rest of the walk into error-chain mode.
//!
//! Because the outcome is a return value rather than a callback, a handler
//! cannot advance twice or forget to advance.
//!
//! # How async handlers are stored
//!
//! The router keeps handlers of different concrete types in one `Vec`, so each
//! one is erased behind `dyn ErasedHandler`:
//!
//! ```text
//! async fn load(req: Request) -> Outcome { … }   ← user writes this
//!        ↓ router.get("/", load)
//! load.into_boxed_handler()                      ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(load))                      ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at dispatch time            ← one vtable call + one Box
//! ```
//!
//! Error handlers go through the same machinery with a different signature,
//! `async fn(Error, Request) -> impl IntoOutcome`, and a distinct trait, so the
//! two kinds are told apart at registration rather than by inspecting shape.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Outcome ───────────────────────────────────────────────────────────────────

/// What a chain entry decided.
#[derive(Debug)]
pub enum Outcome {
    Continue,
    Respond(Response),
    Fail(Error),
}

/// Conversion into an [`Outcome`].
///
/// Anything that is already a response (`Response`, `StatusCode`, `String`,
/// `&'static str`) responds. An [`Error`] fails. `Result<T, E>` continues with
/// `T`'s outcome or fails with `E`.
pub trait IntoOutcome {
    fn into_outcome(self) -> Outcome;
}

impl IntoOutcome for Outcome {
    fn into_outcome(self) -> Outcome { self }
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Outcome { Outcome::Continue }
}

impl IntoOutcome for Error {
    fn into_outcome(self) -> Outcome { Outcome::Fail(self) }
}

macro_rules! respond_with {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoOutcome for $ty {
                fn into_outcome(self) -> Outcome { Outcome::Respond(self.into_response()) }
            }
        )*
    };
}

respond_with!(Response, StatusCode, String, &'static str);

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<Error>,
{
    fn into_outcome(self) -> Outcome {
        match self {
            Ok(v) => v.into_outcome(),
            Err(e) => Outcome::Fail(e.into()),
        }
    }
}

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future resolving to an [`Outcome`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Outcome> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub trait ErasedErrorHandler {
    fn call(&self, err: Error, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub type BoxedErrorHandler = Arc<dyn ErasedErrorHandler + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// A normal chain entry: middleware, parameter handler or terminal handler.
///
/// Satisfied automatically by any
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// and by closures of the same shape. Sealed.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// An error-chain entry, reachable only after a failure.
///
/// Satisfied by any `async fn(Error, Request) -> impl IntoOutcome`. Returning
/// [`Outcome::Continue`] marks the error resolved; [`Outcome::Fail`] passes
/// it (or a replacement) on to the next error handler.
pub trait ErrorHandler: private::SealedError + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_error_handler(self) -> BoxedErrorHandler;
}

mod private {
    pub trait Sealed {}
    pub trait SealedError {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut, R> private::SealedError for F
where
    F: Fn(Error, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> ErrorHandler for F
where
    F: Fn(Error, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_error_handler(self) -> BoxedErrorHandler {
        Arc::new(FnErrorHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

struct FnErrorHandler<F>(F);

impl<F, Fut, R> ErasedErrorHandler for FnErrorHandler<F>
where
    F: Fn(Error, Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, err: Error, req: Request) -> BoxFuture {
        let fut = (self.0)(err, req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}

// ── Route-local chains ────────────────────────────────────────────────────────

/// An ordered list of handlers registered together on one route: zero or more
/// route-local middleware followed by the terminal handler.
///
/// ```rust
/// use weir::{Chain, Outcome, Request, Response, Router};
///
/// async fn audit(_req: Request) -> Outcome { Outcome::Continue }
/// async fn report(_req: Request) -> Response { Response::text("ok") }
///
/// let app = Router::new().get("/report", Chain::new(audit).then(report));
/// ```
#[derive(Clone)]
pub struct Chain(pub(crate) Vec<BoxedHandler>);

impl Chain {
    pub fn new(first: impl Handler) -> Self {
        Self(vec![first.into_boxed_handler()])
    }

    pub fn then(mut self, next: impl Handler) -> Self {
        self.0.push(next.into_boxed_handler());
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Anything that can be registered as a route's chain: a single [`Handler`]
/// or a [`Chain`].
pub trait IntoChain {
    fn into_chain(self) -> Chain;
}

impl IntoChain for Chain {
    fn into_chain(self) -> Chain { self }
}

impl<H: Handler> IntoChain for H {
    fn into_chain(self) -> Chain { Chain::new(self) }
}
