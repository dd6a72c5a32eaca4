use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use super::{write_kube_config, ClusterManager};
use crate::error::ClusterError;

/// [`ClusterManager`] driving the `kind` CLI
#[derive(Clone)]
pub struct KindManager {
    binary: String,
}

impl Default for KindManager {
    fn default() -> Self {
        Self::new("kind")
    }
}

impl KindManager {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn kind(&self, args: &[&str]) -> Result<String, ClusterError> {
        debug!("Executing {} {}", self.binary, args.join(" "));

        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ClusterError::Manager(format!("failed to execute {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(ClusterError::Manager(format!(
                "{} {} failed: {}",
                self.binary,
                args.iter().take(2).copied().collect::<Vec<_>>().join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ClusterManager for KindManager {
    #[instrument(skip(self))]
    async fn create_cluster(
        &self,
        name: String,
        kube_config_location: String,
        manager_config_location: String,
    ) -> Result<(), ClusterError> {
        let mut args = vec![
            "create",
            "cluster",
            "--name",
            name.as_str(),
            "--kubeconfig",
            kube_config_location.as_str(),
        ];
        if Path::new(&manager_config_location).exists() {
            args.push("--config");
            args.push(manager_config_location.as_str());
        }
        self.kind(&args).await?;

        let kube_config = self
            .kind(&["get", "kubeconfig", "--name", name.as_str()])
            .await?;
        write_kube_config(&kube_config_location, kube_config.as_bytes()).await?;

        info!("Cluster is running");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_cluster(&self, name: String) -> Result<(), ClusterError> {
        self.kind(&["delete", "cluster", "--name", &name]).await?;
        Ok(())
    }

    fn cluster_context(&self, name: &str) -> String {
        format!("kind-{}", name)
    }
}
