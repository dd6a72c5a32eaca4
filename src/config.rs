use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::models::{PullPolicy, RunType};

/// Control plane configuration, read from `CP_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Address apatelets use to reach the control plane, `auto` to detect it
    #[serde(default = "default_external_ip")]
    pub external_ip: String,

    #[serde(default)]
    pub docker_policy: PullPolicy,

    #[serde(default)]
    pub apatelet_run_type: RunType,

    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,

    #[serde(default = "default_routine_base_port")]
    pub routine_base_port: u16,

    #[serde(default = "default_routine_fallback_port")]
    pub routine_fallback_port: u16,

    #[serde(default = "default_kube_config_location")]
    pub kube_config_location: String,

    #[serde(default = "default_kube_context")]
    pub kube_context: String,

    #[serde(default)]
    pub manage_cluster: bool,

    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    #[serde(default = "default_manager_config_location")]
    pub manager_config_location: String,

    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    #[serde(default = "default_apatelet_image")]
    pub apatelet_image: String,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8085
}

fn default_external_ip() -> String {
    "auto".to_string()
}

fn default_watchdog_interval_secs() -> u64 {
    30
}

fn default_routine_base_port() -> u16 {
    7000
}

fn default_routine_fallback_port() -> u16 {
    6999
}

fn default_kube_config_location() -> String {
    "/tmp/apate/config".to_string()
}

fn default_kube_context() -> String {
    "kind-apate".to_string()
}

fn default_cluster_name() -> String {
    "apate".to_string()
}

fn default_manager_config_location() -> String {
    "/tmp/apate/manager".to_string()
}

fn default_dispatch_timeout_secs() -> u64 {
    10
}

fn default_apatelet_image() -> String {
    "apatekubernetes/apatelet:latest".to_string()
}

impl ControlPlaneConfig {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("CP"))
            .build()?;

        let settings: ControlPlaneConfig = config.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Invalid control plane configuration, using defaults: {}", e);
            ControlPlaneConfig::default()
        });

        Ok(settings)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    /// Address advertised to apatelets
    pub fn external_address(&self) -> String {
        if !self.external_ip.eq_ignore_ascii_case("auto") {
            return self.external_ip.clone();
        }
        match self.listen_address.parse::<IpAddr>() {
            Ok(ip) if !ip.is_unspecified() => ip.to_string(),
            _ => outbound_ip().to_string(),
        }
    }

    /// Environment handed to every spawned apatelet
    pub fn apatelet_environment(&self) -> ApateletEnvironment {
        ApateletEnvironment {
            control_plane_address: self.external_address(),
            control_plane_port: self.listen_port,
            ..ApateletEnvironment::default()
        }
    }
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            external_ip: default_external_ip(),
            docker_policy: PullPolicy::default(),
            apatelet_run_type: RunType::default(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            routine_base_port: default_routine_base_port(),
            routine_fallback_port: default_routine_fallback_port(),
            kube_config_location: default_kube_config_location(),
            kube_context: default_kube_context(),
            manage_cluster: false,
            cluster_name: default_cluster_name(),
            manager_config_location: default_manager_config_location(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            apatelet_image: default_apatelet_image(),
        }
    }
}

/// Local address used for outbound traffic, loopback if there is no route.
/// Connecting a UDP socket sends no packets.
fn outbound_ip() -> IpAddr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

pub const ENV_CP_ADDRESS: &str = "CP_ADDRESS";
pub const ENV_CP_PORT: &str = "CP_PORT";
pub const ENV_LISTEN_ADDRESS: &str = "APATELET_LISTEN_ADDRESS";
pub const ENV_LISTEN_PORT: &str = "APATELET_LISTEN_PORT";
pub const ENV_KUBE_CONFIG_LOCATION: &str = "APATELET_KUBE_CONFIG_LOCATION";

/// Settings of a single apatelet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApateletEnvironment {
    #[serde(rename = "apatelet_listen_address", default = "default_listen_address")]
    pub listen_address: String,

    #[serde(rename = "apatelet_listen_port", default = "default_apatelet_listen_port")]
    pub listen_port: u16,

    #[serde(rename = "cp_address", default = "default_cp_address")]
    pub control_plane_address: String,

    #[serde(rename = "cp_port", default = "default_listen_port")]
    pub control_plane_port: u16,

    /// Where to write the kubeconfig received on join, if anywhere
    #[serde(rename = "apatelet_kube_config_location", default)]
    pub kube_config_location: Option<String>,
}

fn default_apatelet_listen_port() -> u16 {
    8086
}

fn default_cp_address() -> String {
    "localhost".to_string()
}

impl ApateletEnvironment {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default())
            .build()?;

        let settings: ApateletEnvironment = config.try_deserialize().unwrap_or_else(|e| {
            tracing::warn!("Invalid apatelet environment, using defaults: {}", e);
            ApateletEnvironment::default()
        });

        Ok(settings)
    }

    /// Environment variables that reproduce this environment in another process
    pub fn to_env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            (ENV_CP_ADDRESS.to_string(), self.control_plane_address.clone()),
            (ENV_CP_PORT.to_string(), self.control_plane_port.to_string()),
            (ENV_LISTEN_ADDRESS.to_string(), self.listen_address.clone()),
            (ENV_LISTEN_PORT.to_string(), self.listen_port.to_string()),
        ];
        if let Some(location) = &self.kube_config_location {
            vars.push((ENV_KUBE_CONFIG_LOCATION.to_string(), location.clone()));
        }
        vars
    }

    pub fn control_plane_url(&self, path: &str) -> String {
        crate::models::ConnectionInfo::new(self.control_plane_address.clone(), self.control_plane_port)
            .http_url(path)
    }

    pub fn control_plane_ws_url(&self, path: &str) -> String {
        crate::models::ConnectionInfo::new(self.control_plane_address.clone(), self.control_plane_port)
            .ws_url(path)
    }
}

impl Default for ApateletEnvironment {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_apatelet_listen_port(),
            control_plane_address: default_cp_address(),
            control_plane_port: default_listen_port(),
            kube_config_location: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.listen_port, 8085);
        assert_eq!(config.external_ip, "auto");
        assert_eq!(config.apatelet_run_type, RunType::Routine);
        assert_eq!(config.docker_policy, PullPolicy::PullIfNotLocal);
        assert_eq!(config.watchdog_interval(), Duration::from_secs(30));
        assert_eq!(config.routine_base_port, 7000);
        assert_eq!(config.routine_fallback_port, 6999);
    }

    #[test]
    fn test_explicit_external_ip() {
        let config = ControlPlaneConfig {
            external_ip: "10.1.2.3".to_string(),
            ..ControlPlaneConfig::default()
        };
        let env = config.apatelet_environment();
        assert_eq!(env.control_plane_address, "10.1.2.3");
        assert_eq!(env.control_plane_port, 8085);
    }

    #[test]
    fn test_auto_uses_specific_listen_address() {
        let config = ControlPlaneConfig {
            listen_address: "192.168.5.5".to_string(),
            ..ControlPlaneConfig::default()
        };
        assert_eq!(config.external_address(), "192.168.5.5");
    }

    #[test]
    fn test_env_vars() {
        let env = ApateletEnvironment {
            control_plane_address: "cp".to_string(),
            listen_port: 7001,
            ..ApateletEnvironment::default()
        };
        let vars = env.to_env_vars();
        assert!(vars.contains(&("CP_ADDRESS".to_string(), "cp".to_string())));
        assert!(vars.contains(&("CP_PORT".to_string(), "8085".to_string())));
        assert!(vars.contains(&("APATELET_LISTEN_PORT".to_string(), "7001".to_string())));
        assert_eq!(vars.len(), 4);
        assert_eq!(env.control_plane_url("/x"), "http://cp:8085/x");
    }
}
