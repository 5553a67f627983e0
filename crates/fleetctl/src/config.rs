use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fleet_client::{Auth, ServerConfig, TlsConfig};
use fleet_core::WaitConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_CONFIG_PATH: &str = "~/.fleetctl/config.toml";

/// On-disk `fleetctl` settings. Every key is optional.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub auth: AuthSection,
    pub tls: TlsSection,
    pub wait: WaitSection,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSection {
    pub ca_cert: Option<String>,
    pub insecure: Option<bool>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSection {
    pub timeout_secs: Option<u64>,
}

/// Command-line values that win over the file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ca_cert: Option<String>,
    pub insecure: bool,
    pub wait_timeout: Option<u64>,
}

impl FileConfig {
    /// Loads `explicit`, or the default path when it exists.
    pub fn load(explicit: Option<&str>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(&expand(path)),
            None => {
                let path = expand(DEFAULT_CONFIG_PATH);
                if !path.exists() {
                    debug!(path = %path.display(), "no config file, using defaults");
                    return Ok(Self::default());
                }
                Self::load_from(&path)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let cfg: FileConfig =
            toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Merges the file with command-line overrides.
    pub fn resolve(self, cli: &Overrides) -> Result<(ServerConfig, WaitConfig)> {
        let url = cli
            .url
            .clone()
            .or(self.server.url)
            .unwrap_or_else(|| fleet_client::DEFAULT_SERVER_URL.to_string());

        let cli_auth = cli.token.is_some() || cli.username.is_some();
        let auth = if cli_auth {
            auth_from(cli.token.clone(), cli.username.clone(), cli.password.clone())
        } else {
            auth_from(self.auth.token, self.auth.username, self.auth.password)
        };

        let ca_cert = cli
            .ca_cert
            .as_deref()
            .or(self.tls.ca_cert.as_deref())
            .map(expand);
        let tls = TlsConfig {
            ca_cert,
            insecure: cli.insecure || self.tls.insecure.unwrap_or(false),
        };

        let wait = match cli.wait_timeout.or(self.wait.timeout_secs) {
            Some(0) => bail!("wait timeout must be at least one second"),
            Some(secs) => WaitConfig::with_timeout(Duration::from_secs(secs)),
            None => WaitConfig::default(),
        };

        Ok((ServerConfig { url, auth, tls }, wait))
    }
}

fn auth_from(
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Option<Auth> {
    match (token, username) {
        (Some(token), _) => Some(Auth::Bearer { token }),
        (None, Some(username)) => Some(Auth::Basic { username, password }),
        (None, None) => None,
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
