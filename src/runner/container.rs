use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::error::RunnerError;

/// The subset of a container engine the docker runner needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool, RunnerError>;

    async fn pull_image(&self, image: &str) -> Result<(), RunnerError>;

    /// Remove exited containers whose name starts with `prefix`, returns how many were removed
    async fn remove_exited_containers(&self, prefix: &str) -> Result<usize, RunnerError>;

    /// Create and start a detached container
    async fn run_container(
        &self,
        name: &str,
        image: &str,
        env: Vec<(String, String)>,
    ) -> Result<(), RunnerError>;
}

/// [`ContainerEngine`] backed by the `docker` CLI
#[derive(Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn exec(&self, args: &[&str]) -> Result<std::process::Output, RunnerError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Executing {}", command);

        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RunnerError::Io { command, source })
    }

    async fn exec_checked(&self, args: &[&str]) -> Result<String, RunnerError> {
        let output = self.exec(args).await?;
        if !output.status.success() {
            return Err(RunnerError::Command {
                command: format!("{} {}", self.binary, args.first().copied().unwrap_or_default()),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn image_exists(&self, image: &str) -> Result<bool, RunnerError> {
        let output = self.exec(&["image", "inspect", image]).await?;
        Ok(output.status.success())
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<(), RunnerError> {
        info!("Pulling image {}", image);
        self.exec_checked(&["pull", image]).await?;
        Ok(())
    }

    async fn remove_exited_containers(&self, prefix: &str) -> Result<usize, RunnerError> {
        let name_filter = format!("name=^{}", prefix);
        let ids = self
            .exec_checked(&[
                "ps",
                "-a",
                "--filter",
                "status=exited",
                "--filter",
                &name_filter,
                "--format",
                "{{.ID}}",
            ])
            .await?;

        let ids: Vec<&str> = ids.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut args = vec!["rm"];
        args.extend(ids.iter().copied());
        self.exec_checked(&args).await?;

        info!("Removed {} exited containers with prefix {}", ids.len(), prefix);
        Ok(ids.len())
    }

    #[instrument(skip(self, env))]
    async fn run_container(
        &self,
        name: &str,
        image: &str,
        env: Vec<(String, String)>,
    ) -> Result<(), RunnerError> {
        let env_args: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args = vec!["run", "-d", "--name", name];
        for e in &env_args {
            args.push("-e");
            args.push(e);
        }
        args.push(image);

        self.exec_checked(&args).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let cli = DockerCli::new("/nonexistent/apate-docker");
        let err = cli.pull_image("busybox").await.unwrap_err();
        assert!(matches!(err, RunnerError::Io { .. }));
    }
}
