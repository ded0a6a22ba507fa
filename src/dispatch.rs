//! Chain resolution and execution.
//!
//! Dispatch happens in two steps.
//!
//! 1. **Resolve.** Walk the router tree in registration order and commit a
//!    linear list of entries for this `(method, path)`: every middleware whose
//!    prefix covers the path, every error handler likewise, the chain of the
//!    first route whose method and pattern match, nested routers expanded in
//!    place, and parameter handlers spliced in front of the entry that first
//!    captured their parameter.
//! 2. **Walk.** Run the entries strictly in order. In normal mode only normal
//!    entries run; after a failure only error handlers run until one resolves
//!    the error or responds.
//!
//! Falling off the end in normal mode is `RouteNotFound`. Falling off the end
//! in error mode renders the error's client-safe response and logs it.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::Method;
use tracing::{Instrument, debug, debug_span, error, trace};

use crate::error::Error;
use crate::handler::{BoxFuture, Outcome};
use crate::path::Params;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Layer, Router, Stage};

/// One committed entry of a resolved chain.
pub(crate) struct Entry {
    stage: Stage,
    params: Params,
    base_path: String,
    route_path: String,
}

#[derive(Default)]
struct Resolution {
    entries: Vec<Entry>,
    route_found: bool,
    /// `(router address, param name)` pairs whose handlers are already queued.
    fired: HashSet<(usize, String)>,
}

/// Resolves and runs the chain for `req` against `router`.
pub(crate) async fn dispatch(router: &Router, req: Request) -> Response {
    let span = debug_span!("dispatch", method = %req.method(), path = req.path());
    async move {
        let chain = resolve(router, req.method(), req.path());
        debug!(entries = chain.len(), "chain resolved");
        walk(chain, &req).await
    }
    .instrument(span)
    .await
}

// ── Resolve ───────────────────────────────────────────────────────────────────

pub(crate) fn resolve(router: &Router, method: &Method, path: &str) -> Vec<Entry> {
    let mut res = Resolution::default();
    resolve_into(router, method, path, "", &Params::new(), &mut res);
    res.entries
}

fn resolve_into(
    router: &Router,
    method: &Method,
    path: &str,
    base_path: &str,
    inherited: &Params,
    res: &mut Resolution,
) {
    for layer in &router.layers {
        match layer {
            Layer::Middleware { prefix, stage } => {
                let Some(m) = prefix.match_prefix(path) else { continue };
                let params = overlay(inherited, &m.params);
                let base = join(base_path, m.consumed);
                if let Stage::Normal(_) = stage {
                    fire_params(router, &m.params, &params, &base, m.rest, res);
                }
                res.entries.push(Entry {
                    stage: stage.clone(),
                    params,
                    base_path: base,
                    route_path: m.rest.to_owned(),
                });
            }
            Layer::Route { method: wanted, pattern, chain } => {
                if res.route_found || !method_matches(wanted.as_ref(), method) {
                    continue;
                }
                let Some(captured) = pattern.matches(path) else { continue };
                let params = overlay(inherited, &captured);
                fire_params(router, &captured, &params, base_path, path, res);
                for handler in chain {
                    res.entries.push(Entry {
                        stage: Stage::Normal(Arc::clone(handler)),
                        params: params.clone(),
                        base_path: base_path.to_owned(),
                        route_path: path.to_owned(),
                    });
                }
                res.route_found = true;
            }
            Layer::Nested { prefix, router: child, merge_params } => {
                let Some(m) = prefix.match_prefix(path) else { continue };
                let base = join(base_path, m.consumed);
                let here = overlay(inherited, &m.params);
                fire_params(router, &m.params, &here, &base, m.rest, res);
                let child_params = if *merge_params { here } else { Params::new() };
                resolve_into(child, method, m.rest, &base, &child_params, res);
            }
        }
    }
}

/// Queues `router`'s parameter handlers for names first captured here.
fn fire_params(
    router: &Router,
    captured: &Params,
    params: &Params,
    base_path: &str,
    route_path: &str,
    res: &mut Resolution,
) {
    let id = router as *const Router as usize;
    for (name, _) in captured.iter() {
        let mut handlers = router.param_handlers_for(name).peekable();
        if handlers.peek().is_none() || !res.fired.insert((id, name.to_owned())) {
            continue;
        }
        for handler in handlers {
            res.entries.push(Entry {
                stage: Stage::Normal(Arc::clone(handler)),
                params: params.clone(),
                base_path: base_path.to_owned(),
                route_path: route_path.to_owned(),
            });
        }
    }
}

/// HEAD falls back to GET routes.
fn method_matches(wanted: Option<&Method>, actual: &Method) -> bool {
    match wanted {
        None => true,
        Some(m) => m == actual || (*actual == Method::HEAD && *m == Method::GET),
    }
}

fn overlay(base: &Params, captured: &Params) -> Params {
    let mut params = base.clone();
    params.merge(captured);
    params
}

fn join(base: &str, consumed: &str) -> String {
    format!("{base}{consumed}")
}

// ── Walk ──────────────────────────────────────────────────────────────────────

async fn walk(chain: Vec<Entry>, req: &Request) -> Response {
    let mut failure: Option<Error> = None;

    for (index, entry) in chain.into_iter().enumerate() {
        let scoped = req.scoped(entry.params, &entry.base_path, &entry.route_path);
        let outcome = match (entry.stage, failure.take()) {
            (Stage::Normal(handler), None) => {
                trace!(index, "running handler");
                invoke(|| handler.call(scoped)).await
            }
            (Stage::Error(handler), Some(err)) => {
                trace!(index, error = %err, "running error handler");
                invoke(|| handler.call(err, scoped)).await
            }
            (Stage::Normal(_), pending @ Some(_)) => {
                failure = pending;
                continue;
            }
            (Stage::Error(_), None) => continue,
        };

        match outcome {
            Outcome::Continue => {}
            Outcome::Respond(response) => {
                debug!(index, status = response.status_code().as_u16(), "chain responded");
                return response;
            }
            Outcome::Fail(err) => {
                debug!(index, error = %err, "entry failed; switching to error chain");
                failure = Some(err);
            }
        }
    }

    match failure {
        None => {
            debug!("chain exhausted without a response");
            Error::RouteNotFound.into_response()
        }
        Some(err) => {
            if err.is_client_error() {
                debug!(error = %err, "unresolved client error");
            } else {
                error!(error = %err, "unresolved failure");
            }
            err.into_response()
        }
    }
}

/// Calls one handler and polls its future. A panic in either step becomes
/// a [`Error::HandlerFault`].
async fn invoke(call: impl FnOnce() -> BoxFuture) -> Outcome {
    let result = match std::panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
        Err(payload) => Err(payload),
    };
    match result {
        Ok(outcome) => outcome,
        Err(payload) => Outcome::Fail(Error::msg(format!("handler panicked: {}", panic_message(&*payload)))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
