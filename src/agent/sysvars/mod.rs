//! Process-wide table of system variables.
//!
//! The table is filled once at startup with a few generic variables, any
//! user supplied ones, and whatever the cloud collector finds out about the
//! instance. Probe configs reference the entries by name.

mod error;
pub mod gce;
pub mod vars;

use std::collections::HashMap;
use std::sync::RwLock;

use lazy_static::lazy_static;
use log::*;

use crate::logger::Logger;

pub use error::SysVarsError;
pub use gce::{Detection, GceCollector};

use vars::{VAR_HOSTNAME, VAR_START_TIMESTAMP, VAR_VERSION};

pub type VarTable = HashMap<String, String>;

lazy_static! {
    static ref SYS_VARS: RwLock<VarTable> = RwLock::new(VarTable::new());
}

/// Host facts that are not cloud specific.
pub struct HostInfo {
    pub hostname: String,
    pub start_timestamp: i64,
}

impl HostInfo {
    pub fn current(hostname: String) -> Self {
        Self {
            hostname,
            start_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Builds a fresh variable table. User variables go in first so the system
/// ones take precedence on a name clash.
pub async fn collect(
    user_vars: &VarTable,
    host: &HostInfo,
    gce: &GceCollector,
    l: &Logger,
) -> Result<VarTable, SysVarsError> {
    let mut vars = user_vars.clone();

    vars.insert(VAR_HOSTNAME.to_string(), host.hostname.clone());
    vars.insert(VAR_VERSION.to_string(), env!("CARGO_PKG_VERSION").to_string());
    vars.insert(VAR_START_TIMESTAMP.to_string(), host.start_timestamp.to_string());

    let detection = gce.collect(&mut vars, l).await;
    detection.result?;

    if detection.on_gce {
        info!("Running on GCE, collected {} system variables", vars.len());
    } else {
        info!("Not running on GCE, only generic system variables are set");
    }

    Ok(vars)
}

/// Collects the variables and publishes them process-wide. On error the
/// previously published table is left alone.
pub async fn init(
    user_vars: &VarTable,
    host: &HostInfo,
    gce: &GceCollector,
    l: &Logger,
) -> Result<(), SysVarsError> {
    let vars = collect(user_vars, host, gce, l).await?;
    publish(vars);
    Ok(())
}

fn publish(vars: VarTable) {
    let mut global = SYS_VARS.write().unwrap_or_else(|e| e.into_inner());
    *global = vars;
}

/// Snapshot of the published variables.
pub fn vars() -> VarTable {
    SYS_VARS
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert2::assert;

    use super::gce::testing::FakeCompute;
    use super::vars::*;
    use super::*;
    use crate::cloud_metadata::kube::testing::FakeEnvironment;
    use crate::cloud_metadata::testing::FakeMetadata;

    fn host() -> HostInfo {
        HostInfo {
            hostname: "prober-host".to_string(),
            start_timestamp: 1_700_000_000,
        }
    }

    fn user_vars() -> VarTable {
        [
            ("probe_owner".to_string(), "sre".to_string()),
            (VAR_HOSTNAME.to_string(), "ignored".to_string()),
        ]
        .into()
    }

    fn gce(md: FakeMetadata) -> GceCollector {
        GceCollector::new(
            Arc::new(md),
            Arc::new(FakeCompute::labels(&[])),
            Arc::new(FakeEnvironment::default()),
        )
    }

    #[tokio::test]
    async fn test_collect_off_gce() {
        let l = Logger::new("sysvars");
        let vars = collect(&user_vars(), &host(), &gce(FakeMetadata::default()), &l)
            .await
            .unwrap();

        assert!(vars.len() == 4);
        assert!(vars["probe_owner"] == "sre");
        assert!(vars[VAR_HOSTNAME] == "prober-host");
        assert!(vars[VAR_VERSION] == env!("CARGO_PKG_VERSION"));
        assert!(vars[VAR_START_TIMESTAMP] == "1700000000");
    }

    #[tokio::test]
    async fn test_collect_on_gce() {
        let md = FakeMetadata::gce()
            .with("project/project-id", "sandbox-373114")
            .with("project/numeric-project-id", "818579394026")
            .with("instance/id", "42")
            .with("instance/name", "prober-1")
            .with("instance/zone", "projects/818579394026/zones/europe-west4-b")
            .with("instance/network-interfaces/0/ip", "10.164.0.2")
            .with(
                "instance/network-interfaces/0/access-configs/0/external-ip",
                "34.90.0.1",
            );

        let l = Logger::new("sysvars");
        let vars = collect(&user_vars(), &host(), &gce(md), &l).await.unwrap();

        assert!(vars[VAR_HOSTNAME] == "prober-host");
        assert!(vars[VAR_REGION] == "europe-west4");
        assert!(vars[VAR_MACHINE_TYPE] == "undefined");
    }

    #[tokio::test]
    async fn test_init() {
        let l = Logger::new("sysvars");

        // incomplete identity on GCE is fatal and nothing is published
        let md = FakeMetadata::gce().with("project/project-id", "sandbox-373114");
        let err = init(&user_vars(), &host(), &gce(md), &l).await.unwrap_err();
        assert!(err.field() == Some(VAR_PROJECT_ID));
        assert!(!vars().contains_key("probe_owner"));

        init(&user_vars(), &host(), &gce(FakeMetadata::default()), &l)
            .await
            .unwrap();
        assert!(vars()["probe_owner"] == "sre");
    }
}
