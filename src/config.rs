//! Hub configuration.
//!
//! Everything the hub needs is carried in one [`Config`] value built once at
//! startup. Defaults reproduce the field installation; an optional JSON file
//! and command-line flags may override them. The library itself never
//! consults the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::{fs, time::Duration};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FINALE_A, DEFAULT_FINALE_B, DEFAULT_PORT, DEFAULT_ROUND_ORDER, READ_BUFFER_LEN,
    ROUND_PASS_DELAYS_MS,
};

/// Configuration for the hub.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Address to listen on.
    pub bind_addr: IpAddr,
    /// TCP port for effects and the button.
    pub port: u16,
    /// Bytes per raw read.
    pub read_buffer_len: usize,
    /// Initial round order. Effects not listed are appended on first contact.
    pub round_order: Vec<String>,
    /// Inter-effect spacing for each pass of a round.
    pub pass_delays_ms: Vec<u64>,
    /// Effect receiving the flash/sustain finale, if any.
    pub finale_a: Option<String>,
    /// Effect receiving the long sustain finale, if any.
    pub finale_b: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            read_buffer_len: READ_BUFFER_LEN,
            round_order: DEFAULT_ROUND_ORDER.iter().map(|s| (*s).to_string()).collect(),
            pass_delays_ms: ROUND_PASS_DELAYS_MS.to_vec(),
            finale_a: Some(DEFAULT_FINALE_A.to_string()),
            finale_b: Some(DEFAULT_FINALE_B.to_string()),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, or defaults when no path is given.
    ///
    /// Missing keys in the file fall back to their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config: {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid config: {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the hub cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_len == 0 {
            bail!("read_buffer_len must be greater than zero");
        }
        if self.pass_delays_ms.contains(&0) {
            bail!("pass_delays_ms entries must be greater than zero");
        }
        Ok(())
    }

    /// Socket address to bind the listener to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Longest partial record carried between reads.
    pub fn max_record_len(&self) -> usize {
        self.read_buffer_len * 2
    }

    /// Pass delays as durations.
    pub fn pass_delays(&self) -> Vec<Duration> {
        self.pass_delays_ms.iter().map(|ms| Duration::from_millis(*ms)).collect()
    }
}
