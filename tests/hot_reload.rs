//! Live reload against real filesystem edits.

mod common;

use std::time::Duration;
use axum::http::StatusCode;
use collection_host::{CollectionHost, Shutdown};
use common::{accepting, send, Fixture};

const DEADLINE: Duration = Duration::from_secs(10);

fn logic(text: &str) -> String {
    format!("[handles.list]\naction = \"respond\"\ntext = \"{text}\"\n")
}

async fn watched(fx: &Fixture, mounts: &[(&str, &str)]) -> (CollectionHost, Shutdown) {
    let mut config = fx.config(mounts);
    config.collections.watch = true;
    config.collections.poll_interval_ms = 100;

    let host = CollectionHost::builder(config).build().unwrap();
    host.ready();
    let shutdown = Shutdown::new();
    host.watch(shutdown.subscribe()).unwrap();
    // Let the notify backends attach before editing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    (host, shutdown)
}

async fn body_of(host: &CollectionHost, uri: &str) -> (StatusCode, String) {
    let reply = send(host.dispatcher(), accepting(uri, "text/plain")).await;
    (reply.status, reply.text())
}

#[tokio::test]
async fn test_logic_edit_is_served_without_restart() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", &logic("v1"));
    let (host, shutdown) = watched(&fx, &[("widgets", "/widgets")]).await;
    let host = &host;
    assert_eq!(body_of(host, "/widgets").await, (StatusCode::OK, "v1".to_string()));

    fx.write("collections/widgets/logic.toml", &logic("v2"));

    let reloaded = common::eventually(DEADLINE, || async move {
        body_of(host, "/widgets").await == (StatusCode::OK, "v2".to_string())
    })
    .await;
    assert!(reloaded);

    shutdown.trigger();
    host.close();
}

#[tokio::test]
async fn test_new_collection_is_mounted() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", &logic("widgets"));
    let (host, shutdown) = watched(&fx, &[("widgets", "/widgets"), ("gadgets", "/gadgets")]).await;
    let host = &host;
    assert_eq!(body_of(host, "/gadgets").await.0, StatusCode::NOT_IMPLEMENTED);

    // Logic first so the manifest event finds a loadable collection.
    fx.write("collections/gadgets/logic.toml", &logic("gadgets"));
    fx.write("collections/gadgets/collection.json", "{}");

    let mounted = common::eventually(DEADLINE, || async move {
        body_of(host, "/gadgets").await == (StatusCode::OK, "gadgets".to_string())
    })
    .await;
    assert!(mounted);

    shutdown.trigger();
    host.close();
}

#[tokio::test]
async fn test_collections_root_created_after_watch_starts() {
    let fx = Fixture::empty();
    let (host, shutdown) = watched(&fx, &[("widgets", "/widgets")]).await;
    let host = &host;
    assert_eq!(body_of(host, "/widgets").await.0, StatusCode::NOT_IMPLEMENTED);

    std::fs::create_dir_all(fx.path("collections/widgets")).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    fx.write("collections/widgets/logic.toml", &logic("widgets"));
    fx.write("collections/widgets/collection.json", "{}");

    let mounted = common::eventually(DEADLINE, || async move {
        body_of(host, "/widgets").await == (StatusCode::OK, "widgets".to_string())
    })
    .await;
    assert!(mounted);

    shutdown.trigger();
    host.close();
}

#[tokio::test]
async fn test_removed_collection_is_unmounted() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", &logic("widgets"));
    let (host, shutdown) = watched(&fx, &[("widgets", "/widgets")]).await;
    let host = &host;
    assert_eq!(body_of(host, "/widgets").await.0, StatusCode::OK);

    std::fs::remove_file(fx.path("collections/widgets/collection.json")).unwrap();

    let unmounted = common::eventually(DEADLINE, || async move {
        body_of(host, "/widgets").await.0 == StatusCode::NOT_IMPLEMENTED
    })
    .await;
    assert!(unmounted);
    assert!(host.loader().get_by_name("widgets").is_none());

    shutdown.trigger();
    host.close();
}

#[tokio::test]
async fn test_broken_logic_unloads_until_fixed() {
    let fx = Fixture::new();
    fx.collection("widgets", "{}", &logic("v1"));
    let (host, shutdown) = watched(&fx, &[("widgets", "/widgets")]).await;
    let host = &host;

    fx.write("collections/widgets/logic.toml", "[handles.list]\naction = \"teleport\"\n");
    let unloaded = common::eventually(DEADLINE, || async move {
        host.loader().get_by_name("widgets").is_none()
    })
    .await;
    assert!(unloaded);

    fx.write("collections/widgets/logic.toml", &logic("v3"));
    let restored = common::eventually(DEADLINE, || async move {
        body_of(host, "/widgets").await == (StatusCode::OK, "v3".to_string())
    })
    .await;
    assert!(restored);

    shutdown.trigger();
    host.close();
}
