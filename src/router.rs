//! Router tree and registration surface.
//!
//! A [`Router`] is an ordered list of layers. Registration order is the
//! priority order: middleware, routes, nested routers and error handlers are
//! all considered in the order they were added. Build it once at startup;
//! after that it is only read, so one `Arc<Router>` serves every request.

use http::Method;
use tracing::warn;

use crate::dispatch;
use crate::handler::{BoxedErrorHandler, BoxedHandler, ErrorHandler, Handler, IntoChain};
use crate::path::Pattern;
use crate::request::Request;
use crate::response::Response;

/// A mountable handler, tagged with its kind at registration.
#[derive(Clone)]
pub(crate) enum Stage {
    Normal(BoxedHandler),
    Error(BoxedErrorHandler),
}

pub(crate) enum Layer {
    Middleware {
        prefix: Pattern,
        stage: Stage,
    },
    Route {
        method: Option<Method>,
        pattern: Pattern,
        chain: Vec<BoxedHandler>,
    },
    Nested {
        prefix: Pattern,
        router: Box<Router>,
        merge_params: bool,
    },
}

/// The application router.
///
/// ```rust
/// use http::Method;
/// use weir::{Outcome, Request, Response, Router};
///
/// async fn log(_req: Request) -> Outcome { Outcome::Continue }
/// async fn show(req: Request) -> Response {
///     Response::text(req.param("id").unwrap_or_default().to_owned())
/// }
///
/// let users = Router::new().get("/:id", show);
/// let app = Router::new()
///     .layer(log)
///     .nest("/users", users);
/// ```
#[derive(Default)]
pub struct Router {
    pub(crate) layers: Vec<Layer>,
    pub(crate) param_handlers: Vec<(String, BoxedHandler)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chain for a method + pattern pair.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` does not compile. Registration happens at startup,
    /// so a bad pattern is a programming error.
    pub fn on(self, method: Method, pattern: &str, chain: impl IntoChain) -> Self {
        self.add_route(Some(method), pattern, chain)
    }

    pub fn get(self, pattern: &str, chain: impl IntoChain) -> Self {
        self.on(Method::GET, pattern, chain)
    }

    pub fn post(self, pattern: &str, chain: impl IntoChain) -> Self {
        self.on(Method::POST, pattern, chain)
    }

    pub fn put(self, pattern: &str, chain: impl IntoChain) -> Self {
        self.on(Method::PUT, pattern, chain)
    }

    pub fn patch(self, pattern: &str, chain: impl IntoChain) -> Self {
        self.on(Method::PATCH, pattern, chain)
    }

    pub fn delete(self, pattern: &str, chain: impl IntoChain) -> Self {
        self.on(Method::DELETE, pattern, chain)
    }

    /// Registers a chain that matches every method.
    pub fn any(self, pattern: &str, chain: impl IntoChain) -> Self {
        self.add_route(None, pattern, chain)
    }

    /// Middleware for every request that reaches this router.
    pub fn layer(self, handler: impl Handler) -> Self {
        self.mount("/", handler)
    }

    /// Middleware for every request whose path starts with `prefix`.
    pub fn mount(mut self, prefix: &str, handler: impl Handler) -> Self {
        self.layers.push(Layer::Middleware {
            prefix: compile(prefix),
            stage: Stage::Normal(handler.into_boxed_handler()),
        });
        self
    }

    /// Mounts `router` at `prefix` with its own, empty params.
    pub fn nest(self, prefix: &str, router: Router) -> Self {
        self.nest_with(prefix, router, false)
    }

    /// Mounts `router` at `prefix`. With `merge_params`, params captured by
    /// this router's patterns stay visible inside `router`.
    pub fn nest_with(mut self, prefix: &str, router: Router, merge_params: bool) -> Self {
        self.layers.push(Layer::Nested {
            prefix: compile(prefix),
            router: Box::new(router),
            merge_params,
        });
        self
    }

    /// Runs `handler` once per request, the first time one of this router's
    /// patterns captures `name`, before the entry that captured it.
    pub fn on_param(mut self, name: &str, handler: impl Handler) -> Self {
        self.param_handlers.push((name.to_owned(), handler.into_boxed_handler()));
        self
    }

    /// Error handler for every failing request that reaches this position.
    pub fn on_error(self, handler: impl ErrorHandler) -> Self {
        self.on_error_at("/", handler)
    }

    /// Error handler scoped to requests under `prefix`.
    pub fn on_error_at(mut self, prefix: &str, handler: impl ErrorHandler) -> Self {
        self.layers.push(Layer::Middleware {
            prefix: compile(prefix),
            stage: Stage::Error(handler.into_boxed_error_handler()),
        });
        self
    }

    /// Drives `req` through this router and returns the response.
    pub async fn dispatch(&self, req: Request) -> Response {
        dispatch::dispatch(self, req).await
    }

    pub(crate) fn param_handlers_for<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a BoxedHandler> + 'a {
        self.param_handlers.iter().filter(move |(n, _)| n == name).map(|(_, h)| h)
    }

    fn add_route(mut self, method: Option<Method>, pattern: &str, chain: impl IntoChain) -> Self {
        let pattern = compile(pattern);
        let shadowed = self.layers.iter().any(|layer| match layer {
            Layer::Route { method: m, pattern: p, .. } => *m == method && p.same_shape(&pattern),
            _ => false,
        });
        if shadowed {
            warn!(
                method = method.as_ref().map_or("*", Method::as_str),
                pattern = pattern.as_str(),
                "route already registered; the earlier registration wins",
            );
        }

        self.layers.push(Layer::Route { method, pattern, chain: chain.into_chain().0 });
        self
    }
}

fn compile(pattern: &str) -> Pattern {
    Pattern::parse(pattern).unwrap_or_else(|e| panic!("{e}"))
}
