use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::instrument;

use crate::error::DispatchError;
use crate::models::{ExecutionPlan, Node};

/// Route apatelets serve their scenario handler on
pub const START_SCENARIO_PATH: &str = "/api/v1/scenario/start";

/// Pushes an execution plan to a single apatelet
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScenarioDispatcher: Send + Sync {
    async fn start_scenario(&self, node: Node, plan: ExecutionPlan) -> Result<(), DispatchError>;
}

/// [`ScenarioDispatcher`] talking HTTP to the apatelet
#[derive(Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ScenarioDispatcher for HttpDispatcher {
    #[instrument(skip(self, node, plan), fields(node = %node.uuid))]
    async fn start_scenario(&self, node: Node, plan: ExecutionPlan) -> Result<(), DispatchError> {
        let url = node.connection_info.http_url(START_SCENARIO_PATH);
        let failure = |message: String| DispatchError {
            node: node.uuid,
            address: node.connection_info.to_string(),
            message,
        };

        let response = self
            .client
            .post(&url)
            .json(&plan)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failure(format!("apatelet answered {}: {}", status, body)));
        }
        Ok(())
    }
}
