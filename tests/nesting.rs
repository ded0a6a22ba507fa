//! Nested routers, parameter inheritance and parameter handlers.

use http::StatusCode;
use weir::{Error, Outcome, Request, Response, Router};

mod common;
use common::{Spy, body_text, get};

#[tokio::test]
async fn nested_router_sees_stripped_path() {
    let users = Router::new().get("/:id", |req: Request| async move {
        Response::text(format!(
            "{}|{}|{}",
            req.path(),
            req.base_path(),
            req.route_path()
        ))
    });
    let app = Router::new().nest("/api/v1/users", users);

    let res = app.dispatch(get("/api/v1/users/9")).await;
    assert_eq!(body_text(&res), "/api/v1/users/9|/api/v1/users|/9");
}

#[tokio::test]
async fn without_merge_params_outer_captures_are_hidden() {
    let spy = Spy::default();
    let inner = Router::new().get("/:postId", spy.echo_params("inner"));
    let app = Router::new().nest("/users/:userId", inner);

    let res = app.dispatch(get("/users/7/55")).await;
    assert_eq!(body_text(&res), "postId=55");
}

#[tokio::test]
async fn with_merge_params_outer_captures_are_visible() {
    let spy = Spy::default();
    let inner = Router::new().get("/:postId", spy.echo_params("inner"));
    let app = Router::new().nest_with("/users/:userId", inner, true);

    let res = app.dispatch(get("/users/7/55")).await;
    assert_eq!(body_text(&res), "postId=55&userId=7");
}

#[tokio::test]
async fn merged_inner_capture_wins_on_conflict() {
    let spy = Spy::default();
    let inner = Router::new().get("/:id", spy.echo_params("inner"));
    let app = Router::new().nest_with("/outer/:id", inner, true);

    assert_eq!(body_text(&app.dispatch(get("/outer/1/2")).await), "id=2");
}

#[tokio::test]
async fn nested_middleware_runs_in_place() {
    let spy = Spy::default();
    let inner = Router::new()
        .layer(spy.pass("inner-mw"))
        .get("/list", spy.respond("inner-route"));
    let app = Router::new()
        .layer(spy.pass("outer-before"))
        .nest("/api", inner)
        .layer(spy.pass("outer-after"))
        .get("/api/other", spy.respond("outer-route"));

    let res = app.dispatch(get("/api/list")).await;
    assert_eq!(body_text(&res), "inner-route");
    assert_eq!(spy.calls(), ["outer-before", "inner-mw", "inner-route"]);
}

#[tokio::test]
async fn outer_route_after_unmatched_nest_is_reached() {
    let spy = Spy::default();
    let inner = Router::new()
        .layer(spy.pass("inner-mw"))
        .get("/list", spy.respond("inner-route"));
    let app = Router::new()
        .nest("/api", inner)
        .get("/api/other", spy.respond("outer-route"));

    let res = app.dispatch(get("/api/other")).await;
    assert_eq!(body_text(&res), "outer-route");
    assert_eq!(spy.calls(), ["inner-mw", "outer-route"]);
}

#[tokio::test]
async fn prefix_does_not_match_partial_segment() {
    let spy = Spy::default();
    let app = Router::new().nest("/api", Router::new().get("/", spy.respond("root")));

    assert_eq!(app.dispatch(get("/api")).await.status_code(), StatusCode::OK);
    assert_eq!(app.dispatch(get("/api/")).await.status_code(), StatusCode::OK);
    assert_eq!(app.dispatch(get("/apix")).await.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inner_failure_reaches_outer_error_handler() {
    let inner = Router::new().get("/boom", |_req: Request| async {
        Outcome::Fail(Error::forbidden("inner says no"))
    });
    let app = Router::new()
        .nest("/api", inner)
        .on_error(|err: Error, _req: Request| async move {
            Response::builder().status(err.status()).text("outer handled")
        });

    let res = app.dispatch(get("/api/boom")).await;
    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(&res), "outer handled");
}

#[tokio::test]
async fn param_handler_runs_once_before_dependents() {
    let spy = Spy::default();
    let loader = spy.clone();
    let app = Router::new()
        .on_param("id", move |req: Request| {
            loader.record("load-id");
            let id = req.param("id").unwrap_or_default().to_owned();
            async move {
                req.insert_extension(format!("user-{id}"));
                Outcome::Continue
            }
        })
        .mount("/users/:id", spy.pass("mw"))
        .get("/users/:id", |req: Request| async move {
            Response::text(req.extension::<String>().unwrap_or_default())
        });

    let res = app.dispatch(get("/users/3")).await;
    assert_eq!(body_text(&res), "user-3");
    assert_eq!(spy.calls(), ["load-id", "mw"]);
}

#[tokio::test]
async fn param_handlers_run_in_registration_order() {
    let spy = Spy::default();
    let app = Router::new()
        .on_param("slug", spy.pass("first"))
        .on_param("slug", spy.pass("second"))
        .on_param("other", spy.pass("unrelated"))
        .get("/posts/:slug", spy.respond("route"));

    app.dispatch(get("/posts/hello")).await;
    assert_eq!(spy.calls(), ["first", "second", "route"]);
}

#[tokio::test]
async fn param_handler_can_short_circuit() {
    let spy = Spy::default();
    let app = Router::new()
        .on_param("id", |req: Request| async move {
            match req.param("id").and_then(|id| id.parse::<u32>().ok()) {
                Some(_) => Outcome::Continue,
                None => Outcome::Fail(Error::invalid("id", "must be numeric")),
            }
        })
        .get("/items/:id", spy.respond("route"));

    let res = app.dispatch(get("/items/abc")).await;
    assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    assert!(spy.calls().is_empty());
}
