//! HTTP server for module management and plugin routes
//!
//! Endpoints:
//! - `GET  /api/health`
//! - `GET  /api/modules`
//! - `GET  /api/modules/frontend`
//! - `POST /api/modules/<id>/enable` and `/disable`
//! - any route mounted under `/api/plugins/<id>` or `/api/public/plugins/<id>`

use anyhow::Result;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::request::Parts;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::auth::{ApiAuth, AuthDecision};
use crate::module::api::router::{
    RouteAccess, RouteRequest, RouteResponse, RouteTable, PLUGIN_API_PREFIX,
    PUBLIC_PLUGIN_API_PREFIX,
};
use crate::module::manager::ModuleManager;
use crate::module::traits::ModuleError;

const MODULES_PATH: &str = "/api/modules";

/// Largest request body accepted by a plugin route
pub const MAX_PLUGIN_BODY_BYTES: usize = 1024 * 1024;

/// Request handling, independent of the transport
pub struct PanelApp {
    manager: Arc<ModuleManager>,
    routes: Arc<RouteTable>,
    auth: ApiAuth,
}

impl PanelApp {
    pub fn new(manager: Arc<ModuleManager>, routes: Arc<RouteTable>, auth: ApiAuth) -> Self {
        Self {
            manager,
            routes,
            auth,
        }
    }

    /// Handle one request; never fails, errors become status codes
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let path = parts.uri.path().to_string();

        let response = if path == "/api/health" && parts.method == Method::GET {
            RouteResponse::ok(&serde_json::json!({ "status": "ok" }))
        } else if path.starts_with(PLUGIN_API_PREFIX) || path.starts_with(PUBLIC_PLUGIN_API_PREFIX) {
            self.dispatch_plugin(parts, body).await
        } else if path == MODULES_PATH || path.starts_with("/api/modules/") {
            match self.auth.check(&parts.headers) {
                AuthDecision::Allowed => self.management(&parts.method, &path).await,
                decision => unauthorized(decision),
            }
        } else {
            RouteResponse::error(StatusCode::NOT_FOUND, "Not found")
        };

        into_http(response)
    }

    /// Route and authenticate on the head alone; the body is only read,
    /// up to [`MAX_PLUGIN_BODY_BYTES`], once the request is accepted
    async fn dispatch_plugin<B>(&self, parts: Parts, body: B) -> RouteResponse
    where
        B: Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn StdError + Send + Sync>>,
    {
        let Some(route) = self.routes.lookup(&parts.method, parts.uri.path()) else {
            return RouteResponse::error(StatusCode::NOT_FOUND, "No such plugin route");
        };

        if route.access == RouteAccess::Authenticated {
            let decision = self.auth.check(&parts.headers);
            if decision != AuthDecision::Allowed {
                return unauthorized(decision);
            }
        }

        let body = match Limited::new(body, MAX_PLUGIN_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                return RouteResponse::error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
            }
            Err(e) => {
                return RouteResponse::error(
                    StatusCode::BAD_REQUEST,
                    &format!("Failed to read body: {}", e),
                );
            }
        };

        let request = RouteRequest {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        };
        debug!(
            module = %route.module_id,
            "Dispatching {} {}",
            request.method,
            request.path
        );
        (route.handler)(request).await
    }

    async fn management(&self, method: &Method, path: &str) -> RouteResponse {
        if path == MODULES_PATH {
            return match *method {
                Method::GET => respond(self.manager.list_modules().await),
                _ => method_not_allowed(),
            };
        }

        let rest = path.trim_start_matches("/api/modules/").trim_end_matches('/');
        if rest == "frontend" {
            return match *method {
                Method::GET => respond(self.manager.frontend_manifests().await),
                _ => method_not_allowed(),
            };
        }

        let Some((id, action)) = rest.split_once('/') else {
            return RouteResponse::error(StatusCode::NOT_FOUND, "Not found");
        };
        if *method != Method::POST {
            return method_not_allowed();
        }

        let result = match action {
            "enable" => self.manager.enable(id).await,
            "disable" => self.manager.disable(id).await,
            _ => return RouteResponse::error(StatusCode::NOT_FOUND, "Not found"),
        };
        respond(result.map(|()| {
            serde_json::json!({
                "id": id,
                "enabled": action == "enable",
                "effective": "next_start",
            })
        }))
    }
}

fn respond<T: serde::Serialize>(result: Result<T, ModuleError>) -> RouteResponse {
    match result {
        Ok(value) => RouteResponse::ok(&value),
        Err(e @ ModuleError::ModuleNotFound(_)) => {
            RouteResponse::error(StatusCode::NOT_FOUND, &e.to_string())
        }
        Err(e) => {
            warn!("Management request failed: {}", e);
            RouteResponse::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

fn unauthorized(decision: AuthDecision) -> RouteResponse {
    let message = match decision {
        AuthDecision::Invalid => "Invalid authentication token",
        _ => "Authentication required",
    };
    RouteResponse::error(StatusCode::UNAUTHORIZED, message)
}

fn method_not_allowed() -> RouteResponse {
    RouteResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

fn into_http(response: RouteResponse) -> Response<Full<Bytes>> {
    let mut http_response = Response::new(Full::new(response.body));
    *http_response.status_mut() = response.status;
    http_response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(response.content_type));
    http_response
}

/// HTTP/1 listener bound to the management address
pub struct PanelServer {
    listener: TcpListener,
    app: Arc<PanelApp>,
}

impl PanelServer {
    pub async fn bind(addr: SocketAddr, app: PanelApp) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            app: Arc::new(app),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` is cancelled
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        info!("Management API listening on {}", self.local_addr()?);

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
            };

            let app = Arc::clone(&self.app);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let app = Arc::clone(&app);
                    async move { Ok::<_, Infallible>(app.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!("Connection from {} closed with error: {}", peer, e);
                }
            });
        }

        info!("Management API stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::api::context::{ContextFactory, ModuleContext};
    use crate::module::api::core_api::{CommandReloader, CoreApiImpl};
    use crate::module::api::events::EventBus;
    use crate::module::traits::{Module, ModuleMetadata};
    use crate::storage::Storage;
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    struct Echo;

    #[async_trait]
    impl Module for Echo {
        fn metadata(&self) -> ModuleMetadata {
            ModuleMetadata::new("echo", "Echo", "0.1.0")
        }

        async fn init(&mut self, context: ModuleContext) -> Result<(), ModuleError> {
            context.router().post("/echo", |req| async move {
                RouteResponse::text(StatusCode::OK, String::from_utf8_lossy(&req.body).into_owned())
            });
            context.public_router().get("/hello", |_| async {
                RouteResponse::text(StatusCode::OK, "hello")
            });
            Ok(())
        }

        async fn start(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    async fn app(token: Option<&str>) -> (TempDir, PanelApp) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path().join("db")).unwrap());
        let events = Arc::new(EventBus::new());
        let routes = Arc::new(RouteTable::new());
        let core = Arc::new(CoreApiImpl::new(
            Arc::clone(&storage),
            Arc::clone(&events),
            Arc::new(CommandReloader::new(None)),
        ));
        let contexts = ContextFactory::new(
            dir.path().join("plugins"),
            events,
            Arc::clone(storage.settings()),
            Arc::clone(&routes),
            core,
        );
        let manager = Arc::new(ModuleManager::new(storage, contexts));
        manager.register(Box::new(Echo)).await.unwrap();
        manager.init_all().await.unwrap();

        let app = PanelApp::new(manager, routes, ApiAuth::new(token.map(str::to_string)));
        (dir, app)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        builder.body(Full::new(Bytes::from(body.to_string()))).unwrap()
    }

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_list_modules() {
        let (_dir, app) = app(None).await;
        let response = app.handle(request(Method::GET, "/api/modules", None, "")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let listed: serde_json::Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(listed[0]["metadata"]["id"], "echo");
        assert_eq!(listed[0]["enabled"], true);
        assert_eq!(listed[0]["state"]["state"], "initialized");
    }

    #[tokio::test]
    async fn test_disable_persists_and_unknown_is_404() {
        let (_dir, app) = app(None).await;
        let response = app
            .handle(request(Method::POST, "/api/modules/echo/disable", None, ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.handle(request(Method::GET, "/api/modules", None, "")).await;
        let listed: serde_json::Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(listed[0]["enabled"], false);

        let response = app
            .handle(request(Method::POST, "/api/modules/ghost/enable", None, ""))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .handle(request(Method::GET, "/api/modules/echo/enable", None, ""))
            .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_plugin_route_requires_token() {
        let (_dir, app) = app(Some("s3cret")).await;

        let response = app
            .handle(request(Method::POST, "/api/plugins/echo/echo", None, "hi"))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .handle(request(Method::POST, "/api/plugins/echo/echo", Some("s3cret"), "hi"))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "hi");

        let response = app
            .handle(request(Method::GET, "/api/modules", Some("wrong"), ""))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_plugin_body_checked_after_auth_and_capped() {
        let (_dir, app) = app(Some("s3cret")).await;
        let oversized = "x".repeat(MAX_PLUGIN_BODY_BYTES + 1);

        let response = app
            .handle(request(Method::POST, "/api/plugins/echo/echo", None, &oversized))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .handle(request(Method::POST, "/api/plugins/echo/nowhere", None, &oversized))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .handle(request(Method::POST, "/api/plugins/echo/echo", Some("s3cret"), &oversized))
            .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let at_limit = "y".repeat(MAX_PLUGIN_BODY_BYTES);
        let response = app
            .handle(request(Method::POST, "/api/plugins/echo/echo", Some("s3cret"), &at_limit))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_public_route_skips_auth() {
        let (_dir, app) = app(Some("s3cret")).await;
        let response = app
            .handle(request(Method::GET, "/api/public/plugins/echo/hello", None, ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "hello");

        let response = app
            .handle(request(Method::GET, "/api/plugins/echo/missing", Some("s3cret"), ""))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_over_tcp() {
        let (_dir, app) = app(None).await;
        let server = PanelServer::bind("127.0.0.1:0".parse().unwrap(), app)
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server.serve(shutdown.clone()));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        let raw = String::from_utf8_lossy(&raw);
        assert!(raw.starts_with("HTTP/1.1 200"));
        assert!(raw.contains("\"status\":\"ok\""));

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
