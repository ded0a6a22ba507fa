//! weir demo: a user listing, an admin-only area and a JSON error renderer.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example users
//!
//! Try:
//!   curl http://localhost:3000/api/users
//!   curl http://localhost:3000/api/users/1
//!   curl http://localhost:3000/api/users/999
//!   curl http://localhost:3000/api/users/1/posts/2
//!   curl -H 'authorization: Bearer admin-token' http://localhost:3000/admin/stats
//!   curl -H 'authorization: Bearer user-token'  http://localhost:3000/admin/stats

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use weir::middleware::auth::{Claims, StaticVerifier, require_role, verify_token};
use weir::{Chain, Config, Error, Outcome, Request, Response, Router, Server};

#[derive(Clone, Serialize)]
struct User {
    id: u32,
    name: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(std::path::Path::new(&path))?,
        None => Config::default(),
    };

    let users: Arc<Vec<User>> = Arc::new(vec![
        User { id: 1, name: "Ada" },
        User { id: 2, name: "Grace" },
    ]);

    let tokens = StaticVerifier::new()
        .with_token("admin-token", Claims::new("root", "admin"))
        .with_token("user-token", Claims::new("ada", "user"));

    let posts = Router::new().get("/:postId", show_post);

    let api = Router::new()
        .on_param("id", load_user(Arc::clone(&users)))
        .get("/users", list_users(Arc::clone(&users)))
        .get("/users/:id", show_user)
        .nest_with("/users/:id/posts", posts, true);

    let app = Router::new()
        .layer(access_log)
        .nest("/api", api)
        .get(
            "/admin/stats",
            Chain::new(verify_token(tokens)).then(require_role(["admin"])).then(stats),
        )
        .on_error(render_error);

    Server::from_config(&config.server)?.serve(app).await
}

async fn access_log(req: Request) -> Outcome {
    tracing::info!(method = %req.method(), path = req.path(), "request");
    Outcome::Continue
}

fn list_users(users: Arc<Vec<User>>) -> impl weir::Handler {
    move |_req: Request| {
        let users = Arc::clone(&users);
        async move { Response::to_json(&*users) }
    }
}

/// Resolves `:id` once and stashes the user for everything downstream.
fn load_user(users: Arc<Vec<User>>) -> impl weir::Handler {
    move |req: Request| {
        let found = req
            .param("id")
            .and_then(|id| id.parse::<u32>().ok())
            .and_then(|id| users.iter().find(|u| u.id == id).cloned());
        async move {
            match found {
                Some(user) => {
                    req.insert_extension(user);
                    Outcome::Continue
                }
                None => Outcome::Respond(
                    Response::builder()
                        .status(StatusCode::NOT_FOUND)
                        .json(r#"{"error":"User not found"}"#),
                ),
            }
        }
    }
}

async fn show_user(req: Request) -> Result<Response, Error> {
    let user = req.extension::<User>().ok_or_else(|| Error::msg("user not loaded"))?;
    Ok(Response::to_json(&user))
}

async fn show_post(req: Request) -> Response {
    Response::to_json(&serde_json::json!({
        "user": req.param("id"),
        "post": req.param("postId"),
    }))
}

async fn stats(req: Request) -> Response {
    let who = req.extension::<Claims>().map(|c| c.subject).unwrap_or_default();
    Response::to_json(&serde_json::json!({ "requested_by": who, "users": 2 }))
}

async fn render_error(err: Error, req: Request) -> Response {
    tracing::warn!(path = req.path(), kind = ?err.kind(), "request failed");
    err.into_response()
}
