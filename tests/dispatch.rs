//! End-to-end dispatch scenarios against collection trees on disk.

mod common;

use std::sync::Arc;
use std::time::Duration;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use collection_host::collections::{CompositeResolver, DeclarativeResolver, StaticResolver};
use collection_host::dispatch::{from_fn, HandlerMethods, HandlerOutcome, HttpError};
use collection_host::negotiation::formatter;
use collection_host::{CollectionHost, HostEvent, Payload};
use common::{accepting, get, request, send, Fixture, Reply};
use serde_json::json;
use tokio_util::sync::CancellationToken;

const WIDGETS: &str = r#"
[handles.list]
action = "respond"
json = [{ id = 1 }, { id = 2 }]

[handles.one]
action = "respond"
text = "widget {{id}}"

[handles.create]
action = "respond"
status = 201
json = { created = true }

[handles.delete]
action = "suppress"
status = 204

[handles.update]
action = "not_found"
message = "No widget {{id}}"
"#;

fn ready(fixture: &Fixture, mounts: &[(&str, &str)]) -> CollectionHost {
    let host = CollectionHost::builder(fixture.config(mounts)).build().unwrap();
    host.ready();
    host
}

#[tokio::test]
async fn test_list_is_json_by_default() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), get("/widgets")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-type"), Some("application/json"));
    assert_eq!(reply.json(), json!([{"id": 1}, {"id": 2}]));
    assert_eq!(
        reply.header("content-length"),
        Some(reply.body.len().to_string().as_str())
    );
}

#[tokio::test]
async fn test_route_params_reach_the_handle() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), accepting("/widgets/hello%20world", "text/plain")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "widget hello world");
    assert_eq!(reply.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_status_and_suppress() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let created = send(host.dispatcher(), request(Method::POST, "/widgets")).await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json(), json!({"created": true}));

    let deleted = send(host.dispatcher(), request(Method::DELETE, "/widgets/3")).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(deleted.body.is_empty());
}

#[tokio::test]
async fn test_not_found_outcome() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), request(Method::PUT, "/widgets/9")).await;

    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    let body = reply.json();
    assert_eq!(body["status"], 404);
    assert_eq!(body["message"], "No widget 9");
    assert_eq!(body["name"], "NotFoundError");
}

#[tokio::test]
async fn test_unknown_path_is_not_implemented() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), get("/gadgets")).await;

    assert_eq!(reply.status, StatusCode::NOT_IMPLEMENTED);
    let body = reply.json();
    assert_eq!(body["name"], "NotImplementedError");
    assert_eq!(
        body["message"],
        "Resource or collection '/gadgets' not implemented in API"
    );
}

#[tokio::test]
async fn test_not_implemented_override() {
    let fx = Fixture::new();
    let host = CollectionHost::builder(fx.config(&[]))
        .not_implemented(|_ctx| Box::pin(async { Ok(HandlerOutcome::text("custom fallback")) }))
        .build()
        .unwrap();
    host.ready();

    let reply = send(host.dispatcher(), accepting("/anything", "text/plain")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "custom fallback");
}

#[tokio::test]
async fn test_forward_between_collections() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    fx.collection(
        "legacy",
        r#"{"endpointsDefault": false, "endpoints": {"get /": "list"}}"#,
        r#"
        [handles.list]
        action = "forward"
        collection = "widgets"
        handle = "one"
        params = { id = "from-legacy" }
        "#,
    );
    let host = ready(&fx, &[("widgets", "/widgets"), ("legacy", "/legacy")]);
    let mut events = host.events().subscribe();

    let reply = send(host.dispatcher(), accepting("/legacy", "text/plain")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.text(), "widget from-legacy");

    let mut forwarded = false;
    while let Ok(event) = events.try_recv() {
        if let HostEvent::Forwarding { collection, handle } = event {
            assert_eq!((collection.as_str(), handle.as_str()), ("widgets", "one"));
            forwarded = true;
        }
    }
    assert!(forwarded);
}

#[tokio::test]
async fn test_forward_to_missing_collection() {
    let fx = Fixture::new();
    fx.collection(
        "legacy",
        r#"{"endpointsDefault": false, "endpoints": {"get /": "list"}}"#,
        "[handles.list]\naction = \"forward\"\ncollection = \"ghost\"\nhandle = \"list\"\n",
    );
    let host = ready(&fx, &[("legacy", "/legacy")]);

    let reply = send(host.dispatcher(), get("/legacy")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = reply.json();
    assert_eq!(body["code"], "forwardCollectionNotFound");
    assert_eq!(body["message"], "Collection ghost not found for forward");
}

#[tokio::test]
async fn test_forward_loop_is_bounded() {
    let fx = Fixture::new();
    fx.collection(
        "echo",
        r#"{"endpointsDefault": false, "endpoints": {"get /": "list"}}"#,
        "[handles.list]\naction = \"forward\"\ncollection = \"echo\"\nhandle = \"list\"\n",
    );
    let mut config = fx.config(&[("echo", "/echo")]);
    config.dispatch.max_forward_depth = 3;
    let host = CollectionHost::builder(config).build().unwrap();
    host.ready();

    let reply = send(host.dispatcher(), get("/echo")).await;

    assert_eq!(reply.status, StatusCode::LOOP_DETECTED);
    assert_eq!(reply.json()["code"], "forwardLoop");
}

#[tokio::test]
async fn test_redirect_skips_formatting() {
    let fx = Fixture::new();
    fx.collection(
        "old",
        r#"{"endpointsDefault": false, "endpoints": {"get /:id": "one"}}"#,
        "[handles.one]\naction = \"redirect\"\nlocation = \"/widgets/{{id}}\"\nstatus = 301\n",
    );
    let host = ready(&fx, &[("old", "/old")]);

    let reply = send(host.dispatcher(), get("/old/5")).await;

    assert_eq!(reply.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(reply.header("location"), Some("/widgets/5"));
    assert!(reply.body.is_empty());
    assert!(reply.header("content-type").is_none());
}

#[tokio::test]
async fn test_missing_handle_is_internal_error() {
    let fx = Fixture::new();
    fx.collection(
        "widgets",
        "{}",
        "[handles.list]\naction = \"respond\"\ntext = \"ok\"\n",
    );
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), get("/widgets/1")).await;

    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        reply.json()["message"],
        "Not found handler 'one' in collection's logic file 'widgets'"
    );
}

#[tokio::test]
async fn test_failing_handle_renders_structured_error() {
    let fx = Fixture::new();
    fx.collection(
        "widgets",
        r#"{"endpointsDefault": false, "endpoints": {"get /": "list"}}"#,
        "[handles.list]\naction = \"fail\"\nstatus = 409\nmessage = \"Busy\"\ncode = \"widgetBusy\"\n",
    );
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), get("/widgets")).await;

    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(
        reply.json(),
        json!({"name": "ConflictError", "status": 409, "message": "Busy", "code": "widgetBusy"})
    );
}

#[tokio::test]
async fn test_middleware_short_circuits() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = CollectionHost::builder(fx.config(&[("widgets", "/widgets")]))
        .middleware(Arc::new(from_fn(|ctx| {
            if ctx.headers.contains_key("authorization") {
                Ok(())
            } else {
                Err(HttpError::from_status(StatusCode::UNAUTHORIZED))
            }
        })))
        .build()
        .unwrap();
    host.ready();

    let denied = send(host.dispatcher(), get("/widgets")).await;
    assert_eq!(denied.status, StatusCode::UNAUTHORIZED);

    let allowed = axum::http::Request::builder()
        .uri("/widgets")
        .header("authorization", "Bearer x")
        .body(Bytes::new())
        .unwrap();
    assert_eq!(send(host.dispatcher(), allowed).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancelled_request_is_service_unavailable() {
    let fx = Fixture::new();
    fx.write(
        "collections/slow/collection.json",
        r#"{"logic": "handlers.rs", "endpointsDefault": false, "endpoints": {"get /": "list"}}"#,
    )
    .write("collections/slow/handlers.rs", "");

    let slow = HandlerMethods::new().handle("list", |_ctx| {
        Box::pin(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(HandlerOutcome::empty())
        })
    });
    let resolver = CompositeResolver::new(vec![
        Arc::new(StaticResolver::new().register("slow/handlers.rs", slow)),
        Arc::new(DeclarativeResolver::new()),
    ]);
    let host = CollectionHost::builder(fx.config(&[("slow", "/slow")]))
        .resolver(Arc::new(resolver))
        .build()
        .unwrap();
    host.ready();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let response = host.dispatcher().dispatch(get("/slow"), cancel).await;
    let reply = Reply::from_response(response).await;
    assert_eq!(reply.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unacceptable_type_is_406() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), accepting("/widgets", "image/png")).await;

    assert_eq!(reply.status, StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_accept_quality_picks_formatter() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(
        host.dispatcher(),
        accepting("/widgets/4", "application/json;q=0.5, text/plain;q=0.9"),
    )
    .await;

    assert_eq!(reply.header("content-type"), Some("text/plain"));
    assert_eq!(reply.text(), "widget 4");
}

#[tokio::test]
async fn test_declared_content_type_wins_over_accept() {
    let fx = Fixture::new();
    fx.collection(
        "notes",
        r#"{"endpointsDefault": false, "endpoints": {"get /": "list"}}"#,
        "[handles.list]\naction = \"respond\"\ncontent_type = \"text/plain\"\njson = \"plain note\"\n",
    );
    let host = ready(&fx, &[("notes", "/notes")]);

    let reply = send(host.dispatcher(), accepting("/notes", "application/json")).await;

    assert_eq!(reply.header("content-type"), Some("text/plain"));
    assert_eq!(reply.text(), "plain note");
}

#[tokio::test]
async fn test_user_formatter() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = CollectionHost::builder(fx.config(&[("widgets", "/widgets")]))
        .formatter(
            "text/csv",
            formatter(|ctx, payload| {
                let Payload::Json(serde_json::Value::Array(rows)) = payload else {
                    return Err(HttpError::internal("csv needs rows"));
                };
                let body = rows
                    .iter()
                    .map(|row| row["id"].to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                ctx.response.set_content_length(body.len());
                Ok(Bytes::from(body))
            }),
        )
        .build()
        .unwrap();
    host.ready();

    let reply = send(host.dispatcher(), accepting("/widgets", "text/csv")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.header("content-type"), Some("text/csv"));
    assert_eq!(reply.text(), "1\n2");
}

#[tokio::test]
async fn test_head_uses_get_route_without_body() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), request(Method::HEAD, "/widgets")).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.is_empty());
}

#[tokio::test]
async fn test_undecodable_param_is_bad_request() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", WIDGETS);
    let host = ready(&fx, &[("widgets", "/widgets")]);

    let reply = send(host.dispatcher(), get("/widgets/%E0%A4%A")).await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.json()["message"], "Failed to decode param '%E0%A4%A'");
}
