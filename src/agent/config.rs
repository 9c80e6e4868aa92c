use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::cloud_metadata::compute::COMPUTE_API_ENDPOINT;
use crate::cloud_metadata::gce::{METADATA_HOST_ENV, METADATA_SERVICE_HOST};
use crate::sysvars::gce::MAX_NICS;

pub const CONFIG_PATH: &str = "/etc/sysvars/config.yaml";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 5;

#[derive(Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Inner {
    log_level: Option<String>,

    metadata_host: Option<String>,

    metadata_timeout: Option<u64>,

    compute_endpoint: Option<String>,

    max_nics: Option<usize>,

    hostname: Option<String>,

    vars: Option<HashMap<String, String>>,
}

pub struct Config {
    inner: Inner,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner: Inner = match std::fs::File::open(path.as_ref()) {
            Ok(file) => serde_yaml::from_reader(file)
                .map_err(|e| anyhow!("{}: {e}", path.as_ref().display()))?,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    return Err(anyhow!(
                        "Could not open config file at {}, {err}",
                        path.as_ref().display()
                    ));
                }
                Inner::default()
            }
        };

        let me = Self { inner };

        // check that the numeric settings parse
        me.try_metadata_timeout()?;
        me.try_max_nics()?;

        Ok(me)
    }

    pub fn log_level(&self) -> String {
        if let Ok(level) = std::env::var("SYSVARS_LOG_LEVEL") {
            level
        } else {
            self.inner
                .log_level
                .clone()
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
        }
    }

    /// Metadata server host, and whether it was set explicitly rather than
    /// left at the link-local default.
    pub fn metadata_host(&self) -> (String, bool) {
        if let Some(host) = non_empty_env(METADATA_HOST_ENV) {
            return (host, true);
        }

        match self.inner.metadata_host {
            Some(ref host) => (host.clone(), true),
            None => (METADATA_SERVICE_HOST.to_string(), false),
        }
    }

    pub fn metadata_timeout(&self) -> Duration {
        self.try_metadata_timeout().unwrap()
    }

    fn try_metadata_timeout(&self) -> Result<Duration> {
        let secs: u64 = match non_empty_env("SYSVARS_METADATA_TIMEOUT") {
            Some(secs) => secs
                .parse()
                .map_err(|_| anyhow!("$SYSVARS_METADATA_TIMEOUT must be a number of seconds"))?,
            None => self
                .inner
                .metadata_timeout
                .unwrap_or(DEFAULT_METADATA_TIMEOUT_SECS),
        };

        Ok(Duration::from_secs(secs))
    }

    pub fn compute_endpoint(&self) -> String {
        non_empty_env("SYSVARS_COMPUTE_ENDPOINT")
            .or_else(|| self.inner.compute_endpoint.clone())
            .unwrap_or_else(|| COMPUTE_API_ENDPOINT.to_string())
    }

    pub fn max_nics(&self) -> usize {
        self.try_max_nics().unwrap()
    }

    fn try_max_nics(&self) -> Result<usize> {
        match non_empty_env("SYSVARS_MAX_NICS") {
            Some(n) => n
                .parse()
                .map_err(|_| anyhow!("$SYSVARS_MAX_NICS must be a number")),
            None => Ok(self.inner.max_nics.unwrap_or(MAX_NICS)),
        }
    }

    pub fn hostname(&self) -> String {
        non_empty_env("SYSVARS_HOSTNAME")
            .or_else(|| self.inner.hostname.clone())
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
    }

    /// User defined variables from the config file, extended by
    /// $SYSVARS_VARS ("key=value;key=value").
    pub fn vars(&self) -> HashMap<String, String> {
        let mut vars = self.inner.vars.clone().unwrap_or_default();

        if let Ok(vars_str) = std::env::var("SYSVARS_VARS") {
            vars.extend(parse_vars(&vars_str));
        }

        vars
    }
}

fn parse_vars(s: &str) -> impl Iterator<Item = (String, String)> + '_ {
    s.split(';').filter_map(|kv| {
        kv.split_once('=')
            .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
