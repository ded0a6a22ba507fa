//! # weir
//!
//! The dispatch core of an HTTP service: a request comes in, passes through
//! an ordered chain of middleware, is matched to a route, and leaves as one
//! response or one error.
//!
//! ## The contract
//!
//! - **Ordered.** Middleware, routes, nested routers and error handlers run
//!   in the order they were registered. The first matching route wins.
//! - **Explicit.** Every entry returns an [`Outcome`]: `Continue`, `Respond`,
//!   or `Fail`. There is no callback to forget.
//! - **Two modes.** After a `Fail`, only error handlers run until one
//!   responds or resolves the error. Normal middleware is skipped.
//! - **Read-only at runtime.** A [`Router`] is built once at startup and
//!   shared by reference; per-request state lives in the [`Request`].
//!
//! Sockets, body decoding, storage and signing primitives are collaborators,
//! not part of the core. [`Server`] is a thin hyper adapter for running it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use weir::{Error, Outcome, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), weir::Error> {
//!     let app = Router::new()
//!         .layer(request_log)
//!         .get("/users/:id", get_user)
//!         .on_error(render_error);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn request_log(req: Request) -> Outcome {
//!     tracing::info!(path = req.path(), "request");
//!     Outcome::Continue
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, Error> {
//!     let id: u64 = req
//!         .param("id")
//!         .and_then(|id| id.parse().ok())
//!         .ok_or_else(|| Error::invalid("id", "must be a number"))?;
//!     Ok(Response::json(format!(r#"{{"id":{id}}}"#)))
//! }
//!
//! async fn render_error(err: Error, _req: Request) -> Response {
//!     match err.status() {
//!         StatusCode::BAD_REQUEST => err.into_response(),
//!         _ => Response::status(StatusCode::INTERNAL_SERVER_ERROR),
//!     }
//! }
//! ```

mod config;
mod dispatch;
mod error;
mod handler;
mod path;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use config::{AuthConfig, Config, ServerConfig};
pub use error::{Error, ErrorKind, FieldError, Violations};
pub use handler::{Chain, ErrorHandler, Handler, IntoChain, IntoOutcome, Outcome};
pub use path::{Params, Pattern, WILDCARD};
pub use request::{CancelHandle, ParsedBody, Query, Request, RequestBuilder};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder, ResponseSink};
pub use router::Router;
pub use server::Server;
