use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path};

use crate::middleware::{Mode, TrustedProxyLayer};
use crate::resolver::TrustPolicy;
use crate::security::parse_trusted_networks;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub trust: TrustConfig,
    #[serde(default)]
    pub forward: ForwardConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TrustConfig {
    CidrWhitelist {
        #[serde(default)]
        trusted_proxies: Vec<String>,
    },
    FixedOffset {
        offset: usize,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub strip_forwarded_ips: bool,
    pub rewrite_request: bool,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            strip_forwarded_ips: false,
            rewrite_request: true,
        }
    }
}

impl TrustConfig {
    pub fn to_policy(&self) -> Result<TrustPolicy> {
        match self {
            Self::CidrWhitelist { trusted_proxies } => {
                let networks = parse_trusted_networks(trusted_proxies)
                    .context("Failed to parse trusted_proxies")?;
                Ok(TrustPolicy::cidr_whitelist(networks))
            }
            Self::FixedOffset { offset } => Ok(TrustPolicy::fixed_offset(*offset)),
        }
    }
}

impl Config {
    pub fn policy(&self) -> Result<TrustPolicy> {
        self.trust.to_policy()
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.forward.rewrite_request {
            Mode::Rewrite
        } else {
            Mode::Context
        }
    }

    /// Builds the middleware layer described by this configuration.
    pub fn layer(&self) -> Result<TrustedProxyLayer> {
        Ok(TrustedProxyLayer::new(self.policy()?).mode(self.mode()))
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config =
        toml::from_str(content).context("Failed to parse configuration as valid TOML")?;
    // trusted_proxies entries are only checked when building the policy
    config.policy()?;
    Ok(config)
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
}

pub fn load_config() -> Result<Config> {
    load_config_from(Path::new("config.toml"))
}
