//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use bytes::Bytes;
use collection_host::config::{HostConfig, RouteConfig};
use collection_host::RequestDispatcher;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Collection tree in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("collections")).unwrap();
        Self { dir }
    }

    /// Without the `collections/` directory.
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> &Self {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    /// `collections/<dir>/collection.json` plus `collections/<dir>/logic.toml`.
    pub fn collection(&self, dir: &str, manifest: &str, logic: &str) -> &Self {
        self.write(&format!("collections/{dir}/collection.json"), manifest);
        self.write(&format!("collections/{dir}/logic.toml"), logic)
    }

    /// Host config rooted here with the given mounts; watching disabled.
    pub fn config(&self, mounts: &[(&str, &str)]) -> HostConfig {
        let mut config = HostConfig::default();
        config.collections.root = self.root().to_path_buf();
        config.collections.watch = false;
        config.routes = mounts
            .iter()
            .map(|(collection, path)| RouteConfig::new(*collection, *path))
            .collect();
        config
    }
}

pub fn request(method: Method, uri: &str) -> Request<Bytes> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Bytes::new())
        .unwrap()
}

pub fn get(uri: &str) -> Request<Bytes> {
    request(Method::GET, uri)
}

pub fn accepting(uri: &str, accept: &str) -> Request<Bytes> {
    Request::builder()
        .uri(uri)
        .header("accept", accept)
        .body(Bytes::new())
        .unwrap()
}

/// Collected response.
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub async fn from_response(response: Response<Body>) -> Self {
        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(dispatcher: &RequestDispatcher, request: Request<Bytes>) -> Reply {
    let response = dispatcher.dispatch(request, CancellationToken::new()).await;
    Reply::from_response(response).await
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
