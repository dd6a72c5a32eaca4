use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Strategy the control plane uses to materialize new apatelets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunType {
    /// One docker container per apatelet
    Docker,
    /// Apatelets run as tasks inside the control plane process
    Routine,
    /// Any other registered strategy
    Custom(String),
}

impl Default for RunType {
    fn default() -> Self {
        RunType::Routine
    }
}

impl std::fmt::Display for RunType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunType::Docker => write!(f, "DOCKER"),
            RunType::Routine => write!(f, "ROUTINES"),
            RunType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<String> for RunType {
    fn from(s: String) -> Self {
        match s.trim().to_uppercase().as_str() {
            "DOCKER" => RunType::Docker,
            "ROUTINES" | "ROUTINE" => RunType::Routine,
            _ => RunType::Custom(s),
        }
    }
}

impl From<&str> for RunType {
    fn from(s: &str) -> Self {
        RunType::from(s.to_string())
    }
}

impl From<RunType> for String {
    fn from(r: RunType) -> Self {
        r.to_string()
    }
}

/// How the container strategy obtains the apatelet image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
pub enum PullPolicy {
    /// Always pull, even if the image is available locally
    #[serde(rename = "pull-always", alias = "always-pull")]
    #[strum(to_string = "pull-always", serialize = "always-pull")]
    AlwaysPull,
    /// Pull only when the image is not available locally
    #[default]
    #[serde(rename = "pull-if-not-local")]
    #[strum(to_string = "pull-if-not-local")]
    PullIfNotLocal,
    /// Never pull, fail if the image is not available locally
    #[serde(rename = "local-always", alias = "always-local")]
    #[strum(to_string = "local-always", serialize = "always-local")]
    AlwaysLocal,
}
