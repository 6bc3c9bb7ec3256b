use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tsdbg_sourcemap::SiblingMapLocator;

use crate::error::SessionError;

pub const DEFAULT_DEBUG_MODEL: &str = "tsdbg.typescript";

fn default_host() -> String {
    "localhost".to_string()
}

fn default_debug_model() -> String {
    DEFAULT_DEBUG_MODEL.to_string()
}

fn default_map_suffix() -> String {
    ".js.map".to_string()
}

/// Launch configuration of a debug session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Breakpoints of other models are ignored
    #[serde(default = "default_debug_model")]
    pub debug_model: String,
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub out_dir: Option<PathBuf>,
    #[serde(default = "default_map_suffix")]
    pub map_suffix: String,
}

impl SessionConfig {
    pub fn new(port: u16) -> Self {
        Self {
            host: default_host(),
            port,
            debug_model: default_debug_model(),
            root_dir: None,
            out_dir: None,
            map_suffix: default_map_suffix(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn from_launch_args(args: Option<&serde_json::Value>) -> Result<Self, SessionError> {
        let args = args.ok_or(SessionError::MissingLaunchArguments)?;
        serde_json::from_value(args.clone()).map_err(SessionError::LaunchArgumentsError)
    }

    /// Resolves the VM endpoint, taking the first address of the host.
    pub fn endpoint(&self) -> Result<SocketAddr, SessionError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| SessionError::InvalidEndpoint(format!("{}:{}: {}", self.host, self.port, e)))?
            .next()
            .ok_or_else(|| SessionError::InvalidEndpoint(format!("{}:{}", self.host, self.port)))
    }

    pub fn map_locator(&self) -> SiblingMapLocator {
        let mut locator = SiblingMapLocator::new(self.map_suffix.clone());
        if let Some(out_dir) = &self.out_dir {
            locator = locator.with_out_dir(out_dir);
        }
        if let Some(root_dir) = &self.root_dir {
            locator = locator.with_root_dir(root_dir);
        }
        locator
    }
}
