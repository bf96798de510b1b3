//! Audit trail module
//!
//! Records every event on the bus: the most recent ones stay in memory for
//! the UI, all of them are appended as JSON lines to `events.jsonl` in the
//! module's data directory by a background writer.

use async_trait::async_trait;
use http::StatusCode;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::module::api::context::{ModuleContext, ModuleLogger};
use crate::module::api::events::{Event, WILDCARD};
use crate::module::api::router::RouteResponse;
use crate::module::traits::{
    FrontendManifest, FrontendProvider, FrontendRoute, Module, ModuleError, ModuleMetadata,
};

pub const AUDIT_MODULE_ID: &str = "audit-log";

const DEFAULT_MAX_EVENTS: usize = 200;
const LOG_FILE: &str = "events.jsonl";

type Recent = Arc<Mutex<VecDeque<Event>>>;
type Sink = Arc<Mutex<Option<mpsc::UnboundedSender<Event>>>>;

pub struct AuditModule {
    recent: Recent,
    sink: Sink,
    log_path: Option<PathBuf>,
    logger: Option<ModuleLogger>,
    cancel: CancellationToken,
    writer: Option<JoinHandle<()>>,
}

impl AuditModule {
    pub fn new() -> Self {
        Self {
            recent: Arc::new(Mutex::new(VecDeque::new())),
            sink: Arc::new(Mutex::new(None)),
            log_path: None,
            logger: None,
            cancel: CancellationToken::new(),
            writer: None,
        }
    }

    /// Snapshot of the in-memory tail, oldest first
    pub fn recent_events(&self) -> Vec<Event> {
        snapshot(&self.recent, usize::MAX)
    }
}

impl Default for AuditModule {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot(recent: &Recent, limit: usize) -> Vec<Event> {
    let recent = recent.lock().unwrap_or_else(PoisonError::into_inner);
    let skip = recent.len().saturating_sub(limit);
    recent.iter().skip(skip).cloned().collect()
}

#[async_trait]
impl Module for AuditModule {
    fn metadata(&self) -> ModuleMetadata {
        ModuleMetadata::new(AUDIT_MODULE_ID, "Audit Log", "1.0.0")
            .with_description("Records every panel event for later inspection")
            .with_author("Proxy Panel Team")
            .with_priority(-100)
            .with_icon("history")
            .with_category("system")
    }

    async fn init(&mut self, context: ModuleContext) -> Result<(), ModuleError> {
        let max_events = context
            .config()
            .get_or("max_events", DEFAULT_MAX_EVENTS)?
            .max(1);
        self.log_path = Some(context.data_path(LOG_FILE)?);

        let recent = Arc::clone(&self.recent);
        let sink = Arc::clone(&self.sink);
        context.events().subscribe(WILDCARD, move |event| {
            {
                let mut recent = recent.lock().unwrap_or_else(PoisonError::into_inner);
                recent.push_back(event.clone());
                while recent.len() > max_events {
                    recent.pop_front();
                }
            }
            if let Some(tx) = sink.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
                tx.send(event.clone())
                    .map_err(|_| anyhow::anyhow!("audit writer is gone"))?;
            }
            Ok(())
        });

        let recent = Arc::clone(&self.recent);
        context.router().get("/events", move |req| {
            let recent = Arc::clone(&recent);
            async move {
                let limit = req
                    .query_param("limit")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(usize::MAX);
                RouteResponse::ok(&snapshot(&recent, limit))
            }
        });

        let recent = Arc::clone(&self.recent);
        context.public_router().get("/status", move |_| {
            let recent = Arc::clone(&recent);
            async move {
                let buffered = recent.lock().unwrap_or_else(PoisonError::into_inner).len();
                RouteResponse::json(StatusCode::OK, &serde_json::json!({ "buffered": buffered }))
            }
        });

        context
            .logger()
            .info(format!("Keeping the last {} events in memory", max_events));
        self.logger = Some(context.logger().clone());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ModuleError> {
        let path = self
            .log_path
            .clone()
            .ok_or_else(|| ModuleError::OperationError("audit module not initialized".into()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);

        self.cancel = CancellationToken::new();
        let cancel = self.cancel.clone();
        let logger = self
            .logger
            .clone()
            .unwrap_or_else(|| ModuleLogger::new(AUDIT_MODULE_ID));

        self.writer = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(event) => {
                            if let Err(e) = append(&mut file, &event).await {
                                logger.error(format!("Failed to write audit record: {}", e));
                            }
                        }
                        None => break,
                    },
                }
            }
            // Drain whatever was queued before cancellation
            while let Ok(event) = rx.try_recv() {
                if let Err(e) = append(&mut file, &event).await {
                    logger.error(format!("Failed to write audit record: {}", e));
                }
            }
            if let Err(e) = file.flush().await {
                logger.error(format!("Failed to flush audit log: {}", e));
            }
        }));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ModuleError> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.cancel.cancel();
        if let Some(writer) = self.writer.take() {
            writer
                .await
                .map_err(|e| ModuleError::OperationError(format!("audit writer panicked: {e}")))?;
        }
        Ok(())
    }

    fn frontend_provider(&self) -> Option<&dyn FrontendProvider> {
        Some(self)
    }
}

async fn append(file: &mut tokio::fs::File, event: &Event) -> Result<(), ModuleError> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    file.write_all(&line).await?;
    Ok(())
}

impl FrontendProvider for AuditModule {
    fn frontend_manifest(&self) -> FrontendManifest {
        let mut label_i18n = BTreeMap::new();
        label_i18n.insert("zh-CN".to_string(), "审计日志".to_string());

        FrontendManifest {
            id: AUDIT_MODULE_ID.to_string(),
            routes: vec![FrontendRoute {
                path: "/audit".to_string(),
                component: "plugins/audit/EventList".to_string(),
                show_in_menu: true,
                icon: "history".to_string(),
                label: "Audit Log".to_string(),
                label_i18n,
            }],
            menu_group: "system".to_string(),
            menu_order: 90,
        }
    }
}
