//! Built-in middleware.
//!
//! Everything here is an ordinary [`Handler`](crate::Handler): it returns an
//! [`Outcome`](crate::Outcome) and is registered like any user middleware.
//!
//! - [`auth`]: bearer-token verification and role checks.
//! - [`timeout`]: a deadline around a single handler.

pub mod auth;
mod timeout;

pub use timeout::timeout;
