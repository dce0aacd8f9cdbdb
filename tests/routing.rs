//! Route compilation and dispatch against live upstreams.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use pass_proxy::routing::{handler_fn, middleware_fn, Handler, Middleware, SharedHandler};
use pass_proxy::{mount, AxumRegistrar, ConfigurationError, Dispatcher, Manifest, MountOption, Route, RouteInfo, Upstream};

mod common;

fn accounts_manifest(destination: &str) -> Manifest {
    Manifest::builder()
        .prefix_path("/api/v2")
        .upstream(
            Upstream::new("accounts", destination)
                .owner("identity-team")
                .prefix_path("/private")
                .route(Route::new(["GET"], "/accounts"))
                .route(Route::new(["GET", "PUT"], "/accounts/{id}")),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_prefixes_are_stripped_before_forwarding() {
    let backend = common::start_echo_backend().await;
    let dispatcher = Dispatcher::new(accounts_manifest(&backend.url()), std::iter::empty()).unwrap();
    let proxy = common::serve_dispatcher(dispatcher).await;
    let client = common::client();

    let res = client.get(format!("http://{}/api/v2/private/accounts/1", proxy)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/accounts/1");

    let res = client.get(format!("http://{}/api/v2/private/accounts?page=2", proxy)).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "/accounts?page=2");

    let res = client.put(format!("http://{}/api/v2/private/accounts/7", proxy)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(backend.last().method, Method::PUT);
}

#[tokio::test]
async fn test_unmatched_request_is_404() {
    let backend = common::start_echo_backend().await;
    let dispatcher = Dispatcher::new(accounts_manifest(&backend.url()), std::iter::empty()).unwrap();
    let proxy = common::serve_dispatcher(dispatcher).await;

    let res = common::client().get(format!("http://{}/nowhere", proxy)).send().await.unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.text().await.unwrap(), "404 page not found\n");
    assert!(backend.seen().is_empty());
}

#[tokio::test]
async fn test_wrong_method_is_405() {
    let backend = common::start_echo_backend().await;
    let dispatcher = Dispatcher::new(accounts_manifest(&backend.url()), std::iter::empty()).unwrap();
    let proxy = common::serve_dispatcher(dispatcher).await;

    let res = common::client()
        .delete(format!("http://{}/api/v2/private/accounts/1", proxy))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 405);
    let allow = res.headers()["allow"].to_str().unwrap().to_string();
    assert!(allow.contains("GET") && allow.contains("PUT"));
}

#[tokio::test]
async fn test_not_found_handler_takes_over() {
    let backend = common::start_echo_backend().await;
    let dispatcher = Dispatcher::new(
        accounts_manifest(&backend.url()),
        [MountOption::not_found(handler_fn(|_req: Request<Body>| async { common::teapot() }))],
    )
    .unwrap();
    let proxy = common::serve_dispatcher(dispatcher).await;

    let res = common::client().get(format!("http://{}/nowhere", proxy)).send().await.unwrap();
    assert_eq!(res.status(), 418);
    assert_eq!(res.text().await.unwrap(), "teapot");
}

#[tokio::test]
async fn test_external_root() {
    let backend = common::start_echo_backend().await;
    let dispatcher = Dispatcher::new(accounts_manifest(&backend.url()), [MountOption::root("/root")]).unwrap();
    assert_eq!(dispatcher.root(), "/root/api/v2");
    let proxy = common::serve_dispatcher(dispatcher).await;
    let client = common::client();

    let res = client.get(format!("http://{}/root/api/v2/private/accounts/1", proxy)).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "/accounts/1");

    let res = client.get(format!("http://{}/api/v2/private/accounts/1", proxy)).send().await.unwrap();
    assert_eq!(res.status(), 404);
}

#[test]
fn test_empty_root_reports_slash() {
    let manifest = Manifest::builder()
        .upstream(Upstream::new("a", "http://127.0.0.1:1").route(Route::new(["GET"], "/a")))
        .build()
        .unwrap();
    let dispatcher = Dispatcher::new(manifest, std::iter::empty()).unwrap();
    assert_eq!(dispatcher.root(), "/");
}

#[test]
fn test_missing_scheme_is_reported() {
    let manifest = Manifest::builder()
        .upstream(Upstream::new("a", "noscheme.local").route(Route::new(["GET"], "/a")))
        .build()
        .unwrap();
    let err = Dispatcher::new(manifest, std::iter::empty()).err().unwrap();
    assert!(matches!(err, ConfigurationError::MissingScheme { .. }));
    assert!(err.to_string().contains("noscheme.local"));
}

#[tokio::test]
async fn test_observe_called_once_with_route_info() {
    let backend = common::start_echo_backend().await;
    let observed: Arc<Mutex<Vec<(String, RouteInfo)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let dispatcher = Dispatcher::new(
        accounts_manifest(&backend.url()),
        [MountOption::observe(move |req, info| {
            sink.lock().unwrap().push((req.uri().path().to_string(), info));
        })],
    )
    .unwrap();
    let proxy = common::serve_dispatcher(dispatcher).await;
    let client = common::client();

    client.get(format!("http://{}/api/v2/private/accounts/42", proxy)).send().await.unwrap();
    client.get(format!("http://{}/unmatched", proxy)).send().await.unwrap();

    let observed = observed.lock().unwrap().clone();
    assert_eq!(observed.len(), 1);
    let (path, info) = &observed[0];
    assert_eq!(path, "/accounts/42");
    assert_eq!(
        info,
        &RouteInfo {
            route_method: Method::GET,
            route_path: "/accounts/{id}".into(),
            route_prefix: "/api/v2/private".into(),
            upstream_host: backend.url(),
            upstream_identifier: "accounts".into(),
            upstream_owner: "identity-team".into(),
        }
    );
}

fn tag(name: &'static str) -> Middleware {
    middleware_fn(move |next: SharedHandler| {
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                let mut response = next.call(req).await;
                let order = response
                    .headers()
                    .get("x-middleware")
                    .and_then(|v| v.to_str().ok())
                    .map(|prior| format!("{}{}", name, prior))
                    .unwrap_or_else(|| name.to_string());
                response
                    .headers_mut()
                    .insert("x-middleware", HeaderValue::from_str(&order).unwrap());
                response
            }
        })
    })
}

#[tokio::test]
async fn test_middleware_scoped_to_upstream_in_order() {
    let accounts = common::start_echo_backend().await;
    let billing = common::start_echo_backend().await;
    let manifest = Manifest::builder()
        .upstream(Upstream::new("accounts", accounts.url()).route(Route::new(["GET"], "/accounts")))
        .upstream(Upstream::new("billing", billing.url()).route(Route::new(["GET"], "/invoices")))
        .build()
        .unwrap();
    let dispatcher = Dispatcher::new(manifest, [MountOption::upstream_middleware("accounts", [tag("A"), tag("B")])]).unwrap();
    let proxy = common::serve_dispatcher(dispatcher).await;
    let client = common::client();

    let res = client.get(format!("http://{}/accounts", proxy)).send().await.unwrap();
    // Outer middleware writes last, so the response reads in declared order.
    assert_eq!(res.headers()["x-middleware"], "AB");

    let res = client.get(format!("http://{}/invoices", proxy)).send().await.unwrap();
    assert!(res.headers().get("x-middleware").is_none());
}

#[test]
fn test_middleware_for_unknown_upstream_fails() {
    let manifest = accounts_manifest("http://127.0.0.1:1");
    let err = Dispatcher::new(manifest, [MountOption::upstream_middleware("ghost", [tag("A")])])
        .err()
        .unwrap();
    assert!(matches!(err, ConfigurationError::MissingUpstreamForMiddleware { identifier } if identifier == "ghost"));
}

#[tokio::test]
async fn test_trailing_slash_policy() {
    let backend = common::start_echo_backend().await;
    let client = common::client();

    let lenient = common::serve_dispatcher(Dispatcher::new(accounts_manifest(&backend.url()), std::iter::empty()).unwrap()).await;
    let res = client.get(format!("http://{}/api/v2/private/accounts/", lenient)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "/accounts");

    let strict = common::serve_dispatcher(
        Dispatcher::new(accounts_manifest(&backend.url()), [MountOption::keep_trailing_slashes()]).unwrap(),
    )
    .await;
    let res = client.get(format!("http://{}/api/v2/private/accounts/", strict)).send().await.unwrap();
    assert_eq!(res.status(), 404);
    let res = client.get(format!("http://{}/api/v2/private/accounts", strict)).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_regex_constrained_segments() {
    let backend = common::start_echo_backend().await;
    let manifest = Manifest::builder()
        .upstream(
            Upstream::new("bobs", backend.url())
                .route(Route::new(["GET"], "/bobs/{id:[0-9]+}"))
                .route(Route::new(["GET"], "/bobs/latest")),
        )
        .build()
        .unwrap();
    let proxy = common::serve_dispatcher(Dispatcher::new(manifest, std::iter::empty()).unwrap()).await;
    let client = common::client();

    assert_eq!(client.get(format!("http://{}/bobs/12", proxy)).send().await.unwrap().status(), 200);
    assert_eq!(client.get(format!("http://{}/bobs/latest", proxy)).send().await.unwrap().status(), 200);
    assert_eq!(client.get(format!("http://{}/bobs/abc", proxy)).send().await.unwrap().status(), 404);
}

#[tokio::test]
async fn test_mount_alongside_local_routes() {
    let backend = common::start_echo_backend().await;
    let local = axum::Router::new().route("/health", axum::routing::get(|| async { "ok" }));

    let mut registrar = AxumRegistrar::new(local);
    mount(&accounts_manifest(&backend.url()), &mut registrar, std::iter::empty()).unwrap();
    let proxy = common::serve(registrar.into_router()).await;
    let client = common::client();

    let res = client.get(format!("http://{}/health", proxy)).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "ok");

    let res = client.get(format!("http://{}/api/v2/private/accounts/5", proxy)).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "/accounts/5");
    assert_eq!(backend.seen().len(), 1);
}

#[tokio::test]
async fn test_mount_failure_leaves_router_untouched() {
    let manifest = Manifest::builder()
        .upstream(Upstream::new("good", "http://127.0.0.1:1").route(Route::new(["GET"], "/good")))
        .upstream(Upstream::new("bad", "noscheme.local").route(Route::new(["GET"], "/bad")))
        .build()
        .unwrap();
    let mut router = pass_proxy::Router::new();
    let result = mount(&manifest, &mut router, std::iter::empty());
    assert!(matches!(result, Err(ConfigurationError::MissingScheme { .. })));
    assert!(router.is_empty());

    let response = router.dispatch(Request::builder().uri("/good").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
