pub mod cluster;
pub mod health;
pub mod metrics;
pub mod openapi;
pub mod scenario;

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::health::StreamSettings;
use crate::service::Orchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub stream_settings: StreamSettings,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            stream_settings: StreamSettings::default(),
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    pub fn with_stream_settings(mut self, settings: StreamSettings) -> Self {
        self.stream_settings = settings;
        self
    }
}
