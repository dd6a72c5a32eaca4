use std::time::Duration;

use anyhow::{Context, Result};
use tracing::instrument;

use crate::config::ApateletEnvironment;
use crate::models::{JoinInformation, JoinRequest, LeaveInformation};

pub const JOIN_PATH: &str = "/api/v1/cluster/join";
pub const LEAVE_PATH: &str = "/api/v1/cluster/leave";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cluster operations of the control plane, as seen from an apatelet
#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    env: ApateletEnvironment,
}

impl ControlPlaneClient {
    pub fn new(env: ApateletEnvironment) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build control plane client")?;
        Ok(Self { http, env })
    }

    /// Join the apate cluster, announcing the port the scenario handler listens on
    #[instrument(skip(self))]
    pub async fn join(&self, listen_port: u16) -> Result<JoinInformation> {
        let url = self.env.control_plane_url(JOIN_PATH);
        let info = self
            .http
            .post(&url)
            .json(&JoinRequest {
                listen_port: Some(listen_port),
            })
            .send()
            .await
            .with_context(|| format!("failed to reach control plane at {}", url))?
            .error_for_status()
            .context("control plane rejected join request")?
            .json::<JoinInformation>()
            .await
            .context("invalid join response")?;

        Ok(info)
    }

    #[instrument(skip(self))]
    pub async fn leave(&self, node_uuid: &str) -> Result<()> {
        let url = self.env.control_plane_url(LEAVE_PATH);
        self.http
            .post(&url)
            .json(&LeaveInformation {
                node_uuid: node_uuid.to_string(),
            })
            .send()
            .await
            .with_context(|| format!("failed to reach control plane at {}", url))?
            .error_for_status()
            .context("control plane rejected leave request")?;

        Ok(())
    }
}
