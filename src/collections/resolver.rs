//! Handler-factory resolution.
//!
//! # Responsibilities
//! - Turn a collection's logic module path into a [`HandlerFactory`]
//! - Cache resolved modules and drop them on invalidation
//!
//! # Data Flow
//! ```text
//! logic path
//!     → CompositeResolver
//!         → StaticResolver      (compiled-in factories, keyed by path suffix)
//!         → DeclarativeResolver (TOML logic modules, cached per path)
//!     → Arc<dyn HandlerFactory>
//!
//! watcher: invalidate(path) before the loader resolves again
//! ```
//!
//! # Design Decisions
//! - Resolution is pluggable; the loader only sees the trait
//! - A logic file that no longer exists never resolves, even for compiled-in factories
//! - Each cached path carries a generation bumped on invalidation; a read that
//!   raced an invalidation is returned but never cached

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use async_trait::async_trait;
use axum::http::{header, HeaderName, StatusCode};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::dispatch::{
    CollectionHandler, Forward, HandlerFactory, HandlerOutcome, HandlerResult, HttpError,
    Payload, RequestContext,
};

/// Why a logic module could not be turned into a handler factory.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("logic module {0:?} has been moved or deleted")]
    Missing(PathBuf),

    #[error("logic module {path:?} is invalid: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("logic module {0:?} does not export a handler factory")]
    Unsupported(PathBuf),
}

/// Pluggable strategy resolving logic modules.
pub trait ModuleResolver: Send + Sync {
    /// Resolve the module at `logic_path` into a handler factory.
    fn resolve(&self, logic_path: &Path) -> Result<Arc<dyn HandlerFactory>, LoadError>;

    /// Forget anything cached for `path` so the next resolve reads storage.
    fn invalidate(&self, path: &Path);
}

/// Compiled-in handler factories, looked up by logic path suffix.
#[derive(Clone, Default)]
pub struct StaticResolver {
    factories: Vec<(PathBuf, Arc<dyn HandlerFactory>)>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `factory` for every logic path ending with `suffix`
    /// (e.g. `"widgets/handlers.rs"`).
    pub fn register(mut self, suffix: impl Into<PathBuf>, factory: impl HandlerFactory + 'static) -> Self {
        self.factories.push((suffix.into(), Arc::new(factory)));
        self
    }
}

impl ModuleResolver for StaticResolver {
    fn resolve(&self, logic_path: &Path) -> Result<Arc<dyn HandlerFactory>, LoadError> {
        let (_, factory) = self
            .factories
            .iter()
            .find(|(suffix, _)| logic_path.ends_with(suffix))
            .ok_or_else(|| LoadError::Unsupported(logic_path.to_path_buf()))?;

        if !logic_path.is_file() {
            return Err(LoadError::Missing(logic_path.to_path_buf()));
        }
        Ok(factory.clone())
    }

    fn invalidate(&self, _path: &Path) {}
}

/// TOML logic modules declaring each handle's outcome.
///
/// ```toml
/// [handles.list]
/// action = "respond"
/// json = [{ id = 1 }]
///
/// [handles.one]
/// action = "respond"
/// text = "widget {{id}}"
///
/// [handles.legacy]
/// action = "forward"
/// collection = "widgets"
/// handle = "list"
/// ```
#[derive(Default)]
pub struct DeclarativeResolver {
    cache: DashMap<PathBuf, DeclarativeLogic>,
    generations: DashMap<PathBuf, u64>,
}

impl DeclarativeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached modules.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn generation(&self, path: &Path) -> u64 {
        self.generations.get(path).map(|g| *g).unwrap_or(0)
    }

    fn read(path: &Path) -> Result<DeclarativeLogic, LoadError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => LoadError::Missing(path.to_path_buf()),
            _ => LoadError::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        let module: LogicModule = toml::from_str(&content).map_err(|e| LoadError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(DeclarativeLogic {
            handles: Arc::new(module.handles),
        })
    }
}

impl ModuleResolver for DeclarativeResolver {
    fn resolve(&self, logic_path: &Path) -> Result<Arc<dyn HandlerFactory>, LoadError> {
        if logic_path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return Err(LoadError::Unsupported(logic_path.to_path_buf()));
        }

        if let Some(cached) = self.cache.get(logic_path) {
            return Ok(Arc::new(cached.clone()));
        }

        let started = self.generation(logic_path);
        let logic = Self::read(logic_path)?;

        // The generation entry is held while inserting so invalidate() cannot interleave.
        let generation = self.generations.entry(logic_path.to_path_buf()).or_insert(0);
        if *generation == started {
            self.cache.insert(logic_path.to_path_buf(), logic.clone());
        } else {
            tracing::debug!(path = ?logic_path, "Logic module invalidated during read, not caching");
        }
        drop(generation);
        Ok(Arc::new(logic))
    }

    fn invalidate(&self, path: &Path) {
        let mut generation = self.generations.entry(path.to_path_buf()).or_insert(0);
        *generation += 1;
        if self.cache.remove(path).is_some() {
            tracing::debug!(path = ?path, "Invalidated cached logic module");
        }
        drop(generation);
    }
}

/// Tries each resolver in order; `Unsupported` moves on to the next one.
#[derive(Clone)]
pub struct CompositeResolver {
    resolvers: Vec<Arc<dyn ModuleResolver>>,
}

impl CompositeResolver {
    pub fn new(resolvers: Vec<Arc<dyn ModuleResolver>>) -> Self {
        Self { resolvers }
    }
}

impl Default for CompositeResolver {
    fn default() -> Self {
        Self::new(vec![Arc::new(DeclarativeResolver::new())])
    }
}

impl ModuleResolver for CompositeResolver {
    fn resolve(&self, logic_path: &Path) -> Result<Arc<dyn HandlerFactory>, LoadError> {
        for resolver in &self.resolvers {
            match resolver.resolve(logic_path) {
                Err(LoadError::Unsupported(_)) => continue,
                other => return other,
            }
        }
        Err(LoadError::Unsupported(logic_path.to_path_buf()))
    }

    fn invalidate(&self, path: &Path) {
        for resolver in &self.resolvers {
            resolver.invalidate(path);
        }
    }
}

#[derive(Debug, Deserialize)]
struct LogicModule {
    #[serde(default)]
    handles: BTreeMap<String, DeclaredHandle>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum DeclaredHandle {
    Respond {
        status: Option<u16>,
        json: Option<toml::Value>,
        text: Option<String>,
        content_type: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Forward {
        collection: String,
        handle: String,
        #[serde(default)]
        params: HashMap<String, String>,
    },
    NotFound {
        message: Option<String>,
        code: Option<String>,
    },
    Redirect {
        location: String,
        status: Option<u16>,
    },
    Suppress {
        status: Option<u16>,
    },
    Fail {
        status: Option<u16>,
        message: Option<String>,
        code: Option<String>,
    },
}

#[derive(Clone)]
struct DeclarativeLogic {
    handles: Arc<BTreeMap<String, DeclaredHandle>>,
}

impl HandlerFactory for DeclarativeLogic {
    fn instantiate(&self, _ctx: &RequestContext) -> Box<dyn CollectionHandler> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl CollectionHandler for DeclarativeLogic {
    fn has_handle(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    async fn call(&self, name: &str, ctx: &mut RequestContext) -> HandlerResult {
        let handle = self
            .handles
            .get(name)
            .ok_or_else(|| HttpError::internal(format!("Not found handler '{name}'")))?;
        evaluate(handle, ctx)
    }
}

fn evaluate(handle: &DeclaredHandle, ctx: &mut RequestContext) -> HandlerResult {
    match handle {
        DeclaredHandle::Respond {
            status,
            json,
            text,
            content_type,
            headers,
        } => {
            if let Some(status) = status {
                ctx.response.status = status_code(*status)?;
            }
            if let Some(content_type) = content_type {
                ctx.response.set_header(header::CONTENT_TYPE, content_type);
            }
            for (name, value) in headers {
                match HeaderName::from_bytes(name.as_bytes()) {
                    Ok(name) => {
                        let value = render(value, ctx);
                        ctx.response.set_header(name, &value);
                    }
                    Err(_) => return Err(HttpError::internal(format!("Invalid header name '{name}'"))),
                }
            }

            let payload = match (json, text) {
                (Some(json), _) => {
                    let value = serde_json::to_value(json)
                        .map_err(|e| HttpError::internal(e.to_string()))?;
                    Payload::Json(render_value(value, ctx))
                }
                (None, Some(text)) => Payload::Text(render(text, ctx)),
                (None, None) => Payload::Empty,
            };
            Ok(HandlerOutcome::Respond(payload))
        }
        DeclaredHandle::Forward {
            collection,
            handle,
            params,
        } => Ok(HandlerOutcome::Forward(Forward {
            collection: collection.clone(),
            handle: handle.clone(),
            params: params
                .iter()
                .map(|(k, v)| (k.clone(), render(v, ctx)))
                .collect(),
        })),
        DeclaredHandle::NotFound { message, code } => Ok(HandlerOutcome::NotFound {
            message: message.as_ref().map(|m| render(m, ctx)),
            code: code.clone(),
        }),
        DeclaredHandle::Redirect { location, status } => Ok(HandlerOutcome::Redirect {
            location: render(location, ctx),
            status: status_code(status.unwrap_or(302))?,
        }),
        DeclaredHandle::Suppress { status } => {
            if let Some(status) = status {
                ctx.response.status = status_code(*status)?;
            }
            Ok(HandlerOutcome::Suppress)
        }
        DeclaredHandle::Fail {
            status,
            message,
            code,
        } => {
            let status = status_code(status.unwrap_or(500))?;
            let mut error = match message {
                Some(message) => HttpError::with_message(status, render(message, ctx)),
                None => HttpError::from_status(status),
            };
            if let Some(code) = code {
                error = error.code(code.clone());
            }
            Err(error)
        }
    }
}

fn status_code(status: u16) -> Result<StatusCode, HttpError> {
    StatusCode::from_u16(status)
        .map_err(|_| HttpError::internal(format!("Invalid status code {status}")))
}

/// Substitute `{{param}}` placeholders with route parameters.
fn render(template: &str, ctx: &RequestContext) -> String {
    let mut out = template.to_string();
    for (name, value) in &ctx.params {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

fn render_value(value: Value, ctx: &RequestContext) -> Value {
    match value {
        Value::String(s) => Value::String(render(&s, ctx)),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, render_value(v, ctx)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerMethods;
    use axum::http::Request;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    fn context() -> RequestContext {
        let (parts, _) = Request::builder().uri("/widgets/7").body(()).unwrap().into_parts();
        let mut ctx = RequestContext::new(parts, Bytes::new(), CancellationToken::new());
        ctx.params.insert("id".into(), "7".into());
        ctx
    }

    async fn call(factory: &Arc<dyn HandlerFactory>, name: &str, ctx: &mut RequestContext) -> HandlerResult {
        let handler = factory.instantiate(ctx);
        handler.call(name, ctx).await
    }

    #[tokio::test]
    async fn test_declarative_module_renders_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logic.toml");
        fs::write(
            &path,
            r#"
            [handles.one]
            action = "respond"
            status = 201
            json = { id = "{{id}}", tags = ["a"] }

            [handles.legacy]
            action = "forward"
            collection = "widgets"
            handle = "one"
            "#,
        )
        .unwrap();

        let resolver = DeclarativeResolver::new();
        let factory = resolver.resolve(&path).unwrap();
        let mut ctx = context();

        let outcome = call(&factory, "one", &mut ctx).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::json(serde_json::json!({"id": "7", "tags": ["a"]})));
        assert_eq!(ctx.response.status, StatusCode::CREATED);

        let outcome = call(&factory, "legacy", &mut ctx).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::forward("widgets", "one"));
    }

    #[tokio::test]
    async fn test_invalidate_rereads_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logic.toml");
        fs::write(&path, "[handles.list]\naction = \"respond\"\ntext = \"v1\"\n").unwrap();

        let resolver = DeclarativeResolver::new();
        resolver.resolve(&path).unwrap();
        fs::write(&path, "[handles.list]\naction = \"respond\"\ntext = \"v2\"\n").unwrap();

        let cached = resolver.resolve(&path).unwrap();
        let mut ctx = context();
        assert_eq!(call(&cached, "list", &mut ctx).await.unwrap(), HandlerOutcome::text("v1"));

        resolver.invalidate(&path);
        let fresh = resolver.resolve(&path).unwrap();
        assert_eq!(call(&fresh, "list", &mut ctx).await.unwrap(), HandlerOutcome::text("v2"));
        assert_eq!(resolver.cached(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_invalidation_during_read_is_not_lost() {
        use std::process::Command;
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logic.toml");
        // A FIFO blocks the read until a writer shows up.
        let status = Command::new("mkfifo").arg(&path).status().unwrap();
        assert!(status.success());

        let resolver = Arc::new(DeclarativeResolver::new());
        let reader = {
            let resolver = resolver.clone();
            let path = path.clone();
            thread::spawn(move || resolver.resolve(&path).is_ok())
        };

        thread::sleep(Duration::from_millis(100));
        resolver.invalidate(&path);
        fs::write(&path, "[handles.list]\naction = \"respond\"\ntext = \"v1\"\n").unwrap();

        assert!(reader.join().unwrap());
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn test_missing_and_invalid_modules() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = DeclarativeResolver::new();

        let missing = dir.path().join("gone.toml");
        assert!(matches!(resolver.resolve(&missing), Err(LoadError::Missing(_))));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[handles.x]\naction = \"teleport\"\n").unwrap();
        assert!(matches!(resolver.resolve(&broken), Err(LoadError::Invalid { .. })));

        let other = dir.path().join("logic.js");
        assert!(matches!(resolver.resolve(&other), Err(LoadError::Unsupported(_))));
    }

    #[test]
    fn test_static_resolver_requires_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widgets").join("handlers.rs");
        let resolver = StaticResolver::new().register("widgets/handlers.rs", HandlerMethods::new());

        assert!(matches!(resolver.resolve(&path), Err(LoadError::Missing(_))));

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        assert!(resolver.resolve(&path).is_ok());
        assert!(matches!(
            resolver.resolve(&dir.path().join("other.rs")),
            Err(LoadError::Unsupported(_))
        ));
    }

    #[test]
    fn test_composite_falls_through_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("logic.toml");
        fs::write(&toml_path, "").unwrap();

        let composite = CompositeResolver::new(vec![
            Arc::new(StaticResolver::new().register("handlers.rs", HandlerMethods::new())),
            Arc::new(DeclarativeResolver::new()),
        ]);
        assert!(composite.resolve(&toml_path).is_ok());
        assert!(matches!(
            composite.resolve(&dir.path().join("x.py")),
            Err(LoadError::Unsupported(_))
        ));
    }
}
