//! Scoped HTTP routing for modules
//!
//! Each module receives a [`ModuleRouter`] that can only mount routes under
//! its own namespace. The HTTP server looks routes up in the shared
//! [`RouteTable`].

use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Namespace for routes that require an authenticated operator
pub const PLUGIN_API_PREFIX: &str = "/api/plugins";
/// Namespace for routes reachable without authentication
pub const PUBLIC_PLUGIN_API_PREFIX: &str = "/api/public/plugins";

/// Request handed to a module route handler
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub method: Method,
    /// Full request path, including the module namespace
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RouteRequest {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// First value of a query parameter (no percent-decoding)
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == name).then_some(v)
        })
    }
}

/// Response produced by a module route handler
#[derive(Debug, Clone)]
pub struct RouteResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Bytes,
}

impl RouteResponse {
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body: Bytes::from(body),
            },
            Err(e) => Self::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
        }
    }

    pub fn ok<T: Serialize>(value: &T) -> Self {
        Self::json(StatusCode::OK, value)
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self {
            status,
            content_type: "application/json",
            body: Bytes::from(body),
        }
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            body: Bytes::from(body.into()),
        }
    }
}

pub type RouteHandler = Arc<dyn Fn(RouteRequest) -> BoxFuture<'static, RouteResponse> + Send + Sync>;

/// Whether a route sits behind operator authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Authenticated,
    Public,
}

/// Resolved route, returned by [`RouteTable::lookup`]
#[derive(Clone)]
pub struct MatchedRoute {
    pub module_id: String,
    pub access: RouteAccess,
    pub handler: RouteHandler,
}

/// All module routes, keyed by method and full path
pub struct RouteTable {
    routes: RwLock<HashMap<(Method, String), MatchedRoute>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(HashMap::new()),
        }
    }

    fn insert(&self, method: Method, path: String, route: MatchedRoute) {
        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        if routes.contains_key(&(method.clone(), path.clone())) {
            warn!("Route {} {} registered twice, replacing", method, path);
        }
        debug!("Module {} mounted {} {}", route.module_id, method, path);
        routes.insert((method, path), route);
    }

    pub fn lookup(&self, method: &Method, path: &str) -> Option<MatchedRoute> {
        let path = normalize(path);
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        routes.get(&(method.clone(), path)).cloned()
    }

    /// Routes mounted by one module, sorted by path
    pub fn routes_for(&self, module_id: &str) -> Vec<(Method, String)> {
        let routes = self.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<(Method, String)> = routes
            .iter()
            .filter(|(_, r)| r.module_id == module_id)
            .map(|((m, p), _)| (m.clone(), p.clone()))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));
        out
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Route registration handle confined to one module's namespace
#[derive(Clone)]
pub struct ModuleRouter {
    module_id: String,
    access: RouteAccess,
    table: Arc<RouteTable>,
}

impl ModuleRouter {
    pub fn new(module_id: &str, table: Arc<RouteTable>) -> Self {
        Self {
            module_id: module_id.to_string(),
            access: RouteAccess::Authenticated,
            table,
        }
    }

    /// Same namespace, without authentication
    pub fn public(&self) -> ModuleRouter {
        Self {
            module_id: self.module_id.clone(),
            access: RouteAccess::Public,
            table: Arc::clone(&self.table),
        }
    }

    /// Path prefix all routes of this router are mounted under
    pub fn prefix(&self) -> String {
        let base = match self.access {
            RouteAccess::Authenticated => PLUGIN_API_PREFIX,
            RouteAccess::Public => PUBLIC_PLUGIN_API_PREFIX,
        };
        format!("{}/{}", base, self.module_id)
    }

    pub fn route<F, Fut>(&self, method: Method, path: &str, handler: F)
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RouteResponse> + Send + 'static,
    {
        let relative = normalize(path);
        let full = if relative == "/" {
            self.prefix()
        } else {
            format!("{}{}", self.prefix(), relative)
        };
        let handler: RouteHandler = Arc::new(move |req| handler(req).boxed());
        self.table.insert(
            method,
            full,
            MatchedRoute {
                module_id: self.module_id.clone(),
                access: self.access,
                handler,
            },
        );
    }

    pub fn get<F, Fut>(&self, path: &str, handler: F)
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RouteResponse> + Send + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(&self, path: &str, handler: F)
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RouteResponse> + Send + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn delete<F, Fut>(&self, path: &str, handler: F)
    where
        F: Fn(RouteRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RouteResponse> + Send + 'static,
    {
        self.route(Method::DELETE, path, handler)
    }
}
