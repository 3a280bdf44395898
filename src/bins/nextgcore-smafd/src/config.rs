//! SMAF Configuration
//!
//! Two YAML documents are read at startup: the function configuration
//! (`smafcfg.yaml`) and the per-subscriber routing table
//! (`uerouting.yaml`). Missing optional values are filled in by
//! [`Config::apply_defaults`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::models::{Snssai, SnssaiSmfInfoItem};

pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_REGISTER_IPV4: &str = "127.0.0.1";
pub const DEFAULT_BINDING_IPV4: &str = "0.0.0.0";
pub const DEFAULT_SBI_PORT: u16 = 29502;
pub const DEFAULT_NRF_URI: &str = "http://127.0.0.1:29510";
pub const DEFAULT_PFCP_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PFCP_RESPONSE_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_NRF_REGISTRATION_RETRY: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Missing configuration section: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn read_file(path: &Path) -> ConfigResult<String> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

// ============================================================================
// Function configuration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub info: Info,
    pub configuration: Configuration,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub smaf_name: String,
    #[serde(default)]
    pub sbi: Option<Sbi>,
    #[serde(default)]
    pub pfcp: Option<Pfcp>,
    #[serde(default)]
    pub nrf_uri: String,
    #[serde(default)]
    pub ue_subnet: String,
    #[serde(default)]
    pub dnn: BTreeMap<String, DnnInfo>,
    #[serde(default)]
    pub snssai_info: Vec<SnssaiSmfInfoItem>,
    #[serde(default)]
    pub service_name_list: Vec<String>,
    #[serde(default)]
    pub ulcl: bool,
    #[serde(rename = "userplane_information", default)]
    pub userplane_information: UserPlaneInformation,
    #[serde(default)]
    pub timers: Timers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sbi {
    #[serde(default)]
    pub scheme: String,
    #[serde(rename = "registerIPv4", default)]
    pub register_ipv4: String,
    #[serde(rename = "bindingIPv4", default)]
    pub binding_ipv4: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pfcp {
    #[serde(default)]
    pub addr: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DnnInfo {
    #[serde(default)]
    pub dns: DnsInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DnsInfo {
    #[serde(default)]
    pub ipv4: String,
    #[serde(default)]
    pub ipv6: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPlaneInformation {
    #[serde(default)]
    pub up_nodes: BTreeMap<String, UpNodeConfig>,
    #[serde(default)]
    pub links: Vec<UpLinkConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpNodeConfig {
    /// `AN` or `UPF`
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub an_ip: String,
    #[serde(default)]
    pub dnn_list: Vec<String>,
    /// DNNs this node is the default anchor for
    #[serde(default)]
    pub default_dnn: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpLinkConfig {
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timers {
    #[serde(default = "default_pfcp_response_timeout_ms")]
    pub pfcp_response_timeout_ms: u64,
    #[serde(default = "default_nrf_registration_retry")]
    pub nrf_registration_retry: u32,
}

fn default_pfcp_response_timeout_ms() -> u64 {
    DEFAULT_PFCP_RESPONSE_TIMEOUT_MS
}

fn default_nrf_registration_retry() -> u32 {
    DEFAULT_NRF_REGISTRATION_RETRY
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            pfcp_response_timeout_ms: DEFAULT_PFCP_RESPONSE_TIMEOUT_MS,
            nrf_registration_retry: DEFAULT_NRF_REGISTRATION_RETRY,
        }
    }
}

/// Resolve a value that may name an environment variable
fn resolve_env(value: &str) -> String {
    match std::env::var(value) {
        Ok(resolved) if !resolved.is_empty() => {
            log::info!("Using {} from environment: {}", value, resolved);
            resolved
        }
        _ => value.to_string(),
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = read_file(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_defaults();
        Ok(config)
    }

    pub fn apply_defaults(&mut self) {
        let cfg = &mut self.configuration;

        if let Some(sbi) = cfg.sbi.as_mut() {
            if sbi.scheme.is_empty() {
                sbi.scheme = DEFAULT_SCHEME.to_string();
            }
            if sbi.register_ipv4.is_empty() {
                sbi.register_ipv4 = DEFAULT_REGISTER_IPV4.to_string();
            }
            sbi.binding_ipv4 = if sbi.binding_ipv4.is_empty() {
                DEFAULT_BINDING_IPV4.to_string()
            } else {
                resolve_env(&sbi.binding_ipv4)
            };
            if sbi.port == 0 {
                sbi.port = DEFAULT_SBI_PORT;
            }
        }

        let pfcp = cfg.pfcp.get_or_insert_with(Pfcp::default);
        pfcp.addr = if pfcp.addr.is_empty() {
            DEFAULT_PFCP_ADDR.to_string()
        } else {
            resolve_env(&pfcp.addr)
        };
        if pfcp.port == 0 {
            pfcp.port = ogs_pfcp::PFCP_UDP_PORT;
        }

        if cfg.nrf_uri.is_empty() {
            cfg.nrf_uri = DEFAULT_NRF_URI.to_string();
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let cfg = &self.configuration;

        if cfg.sbi.is_none() {
            return Err(ConfigError::Missing("sbi"));
        }
        if cfg.ue_subnet.is_empty() {
            return Err(ConfigError::Missing("ueSubnet"));
        }
        ogs_core::UeIpPool::from_cidr(&cfg.ue_subnet)
            .map_err(|e| ConfigError::Invalid(format!("ueSubnet {}: {}", cfg.ue_subnet, e)))?;

        let up = &cfg.userplane_information;
        if up.up_nodes.is_empty() {
            return Err(ConfigError::Missing("userplane_information.up_nodes"));
        }
        for link in &up.links {
            for end in [&link.a, &link.b] {
                if !up.up_nodes.contains_key(end) {
                    return Err(ConfigError::Invalid(format!(
                        "link {} - {} names undeclared node {}",
                        link.a, link.b, end
                    )));
                }
            }
        }
        if cfg.timers.pfcp_response_timeout_ms == 0 {
            return Err(ConfigError::Invalid("pfcpResponseTimeoutMs must be positive".into()));
        }
        Ok(())
    }

    /// SBI section; only valid after [`Config::validate`]
    pub fn sbi(&self) -> Sbi {
        self.configuration.sbi.clone().unwrap_or_default()
    }

    pub fn served_snssais(&self) -> Vec<Snssai> {
        self.configuration
            .snssai_info
            .iter()
            .map(|item| item.s_nssai.clone())
            .collect()
    }
}

// ============================================================================
// UE routing configuration
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UeRoutingConfig {
    #[serde(default)]
    pub info: Info,
    #[serde(rename = "ueRoutingInfo", default)]
    pub ue_routing_info: Vec<UeRoutingInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UeRoutingInfo {
    #[serde(rename = "SUPI")]
    pub supi: String,
    #[serde(rename = "PathList", default)]
    pub path_list: Vec<RoutePathConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutePathConfig {
    #[serde(rename = "DestinationIP", default)]
    pub destination_ip: String,
    #[serde(rename = "DestinationPort", default)]
    pub destination_port: String,
    #[serde(rename = "UPF", default)]
    pub upf: Vec<String>,
}

impl UeRoutingConfig {
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = read_file(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
pub(crate) const TEST_CONFIG: &str = r#"
info:
  version: 1.0.0
  description: SMAF test configuration
configuration:
  smafName: SMAF
  sbi:
    scheme: http
    registerIPv4: 127.0.0.2
    port: 29502
  ueSubnet: 60.60.0.0/24
  dnn:
    internet:
      dns:
        ipv4: 8.8.8.8
  snssaiInfo:
    - sNssai:
        sst: 1
        sd: "010203"
      dnnSmfInfoList:
        - dnn: internet
  serviceNameList:
    - nsmf-pdusession
    - nsmf-event-exposure
  userplane_information:
    up_nodes:
      gNB1:
        type: AN
        an_ip: 192.168.179.100
      AN:
        type: UPF
        node_id: 10.200.200.101
      GW:
        type: UPF
        node_id: 10.200.200.102
        dnn_list: [internet]
        default_dnn: [internet]
    links:
      - A: gNB1
        B: AN
      - A: AN
        B: GW
  timers:
    pfcpResponseTimeoutMs: 500
"#;
