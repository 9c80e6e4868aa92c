use std::collections::HashMap;
use std::sync::Arc;

use crate::cloud_metadata::{ComputeConnector, HostEnvironment, MetadataClient, MetadataError};
use crate::logger::Logger;

use super::error::{mandatory, SysVarsError};
use super::vars::*;
use super::VarTable;

/// Number of NICs a GCE VM can have.
pub const MAX_NICS: usize = 8;

const UNDEFINED: &str = "undefined";
const HOSTNAME_ENV: &str = "HOSTNAME";

pub type LabelSet = HashMap<String, String>;

/// Outcome of a collection pass. `result` is only ever an error when
/// `on_gce` is true.
#[derive(Debug)]
pub struct Detection {
    pub on_gce: bool,
    pub result: Result<(), SysVarsError>,
}

struct Identity {
    project: String,
    numeric_project_id: String,
    instance_id: String,
}

impl Identity {
    fn write_to(&self, vars: &mut VarTable) {
        vars.insert(VAR_PROJECT.to_string(), self.project.clone());
        vars.insert(VAR_PROJECT_ID.to_string(), self.numeric_project_id.clone());
        vars.insert(VAR_INSTANCE_ID.to_string(), self.instance_id.clone());
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zone(String);

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Zone name minus its last hyphen-delimited token,
    /// e.g. us-central1-a -> us-central1.
    pub fn region(&self) -> &str {
        match self.0.rsplit_once('-') {
            Some((region, _)) => region,
            None => "",
        }
    }
}

struct InstanceAttributes {
    zone: Zone,
    internal_ip: String,
    external_ip: String,
    instance_template: String,
    machine_type: String,
}

impl InstanceAttributes {
    fn write_to(&self, vars: &mut VarTable) {
        vars.insert(VAR_ZONE.to_string(), self.zone.name().to_string());
        vars.insert(VAR_INTERNAL_IP.to_string(), self.internal_ip.clone());
        vars.insert(VAR_EXTERNAL_IP.to_string(), self.external_ip.clone());
        vars.insert(
            VAR_INSTANCE_TEMPLATE.to_string(),
            self.instance_template.clone(),
        );
        vars.insert(VAR_MACHINE_TYPE.to_string(), self.machine_type.clone());
        vars.insert(VAR_REGION.to_string(), self.zone.region().to_string());
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NicRecord {
    pub index: usize,
    pub ip: String,
    pub ipv6: Option<String>,
}

impl NicRecord {
    pub fn is_primary(&self) -> bool {
        self.index == 0
    }

    // IPv6 addresses are keyed by their metadata path, which existing
    // configs already reference, rather than by nic_<i>_ipv6.
    pub fn ipv6_var(&self) -> String {
        nic_key(self.index, "ipv6s")
    }

    fn write_to(&self, vars: &mut VarTable) {
        vars.insert(nic_ip_var(self.index), self.ip.clone());

        if let Some(ref ipv6) = self.ipv6 {
            vars.insert(self.ipv6_var(), ipv6.clone());
            if self.is_primary() {
                vars.insert(VAR_INTERNAL_IPV6_IP.to_string(), ipv6.clone());
            }
        }
    }
}

fn nic_key(index: usize, leaf: &str) -> String {
    format!("instance/network-interfaces/{index}/{leaf}")
}

fn last_segment(val: &str) -> &str {
    val.rsplit('/').next().unwrap_or(val)
}

/// Last path segment of an optional resource name, or "undefined".
fn resource_name(var: &str, val: Result<String, MetadataError>, l: &Logger) -> String {
    match val {
        Ok(val) => last_segment(val.trim()).to_string(),
        Err(err) => {
            l.info(format_args!(
                "No {var} found ({err}). Defaulting to {UNDEFINED}."
            ));
            UNDEFINED.to_string()
        }
    }
}

/// Collects system variables for a GCE (or GKE) instance.
pub struct GceCollector {
    metadata: Arc<dyn MetadataClient>,
    compute: Arc<dyn ComputeConnector>,
    env: Arc<dyn HostEnvironment>,
    max_nics: usize,
}

impl GceCollector {
    pub fn new(
        metadata: Arc<dyn MetadataClient>,
        compute: Arc<dyn ComputeConnector>,
        env: Arc<dyn HostEnvironment>,
    ) -> Self {
        Self {
            metadata,
            compute,
            env,
            max_nics: MAX_NICS,
        }
    }

    pub fn with_max_nics(mut self, max_nics: usize) -> Self {
        self.max_nics = max_nics;
        self
    }

    /// Fills `vars` with everything known about this instance. Off GCE this
    /// is a no-op. On a fatal error, whatever was written before the failure
    /// stays in `vars`.
    pub async fn collect(&self, vars: &mut VarTable, l: &Logger) -> Detection {
        if !self.metadata.on_gce().await {
            return Detection {
                on_gce: false,
                result: Ok(()),
            };
        }

        Detection {
            on_gce: true,
            result: self.collect_on_gce(vars, l).await,
        }
    }

    async fn collect_on_gce(&self, vars: &mut VarTable, l: &Logger) -> Result<(), SysVarsError> {
        let identity = self.identity().await?;
        identity.write_to(vars);

        // On Kubernetes the instance attributes may or may not be available,
        // and they say little about the pod anyway.
        if self.env.is_kubernetes() {
            vars.insert(VAR_NAMESPACE.to_string(), self.env.kubernetes_namespace());
            return Ok(());
        }

        let instance = self.instance_name(l).await;
        vars.insert(VAR_INSTANCE.to_string(), instance.clone());

        let attrs = self.instance_attributes(l).await?;
        attrs.write_to(vars);

        for nic in self.nics(l).await {
            nic.write_to(vars);
        }

        let labels = self
            .labels(&identity.project, attrs.zone.name(), &instance, l)
            .await?;
        for (k, v) in labels {
            vars.insert(label_var(&k), v);
        }

        Ok(())
    }

    async fn identity(&self) -> Result<Identity, SysVarsError> {
        Ok(Identity {
            project: self
                .metadata
                .project_id()
                .await
                .map_err(mandatory(VAR_PROJECT))?,
            numeric_project_id: self
                .metadata
                .numeric_project_id()
                .await
                .map_err(mandatory(VAR_PROJECT_ID))?,
            instance_id: self
                .metadata
                .instance_id()
                .await
                .map_err(mandatory(VAR_INSTANCE_ID))?,
        })
    }

    async fn instance_name(&self, l: &Logger) -> String {
        match self.metadata.instance_name().await {
            Ok(name) => name,
            Err(err) => {
                l.warn(format_args!(
                    "Error getting instance name on GCE, using HOSTNAME environment variable: {err}"
                ));
                self.env.var(HOSTNAME_ENV).unwrap_or_default()
            }
        }
    }

    async fn instance_attributes(&self, l: &Logger) -> Result<InstanceAttributes, SysVarsError> {
        let zone = self.metadata.zone().await.map_err(mandatory(VAR_ZONE))?;
        let internal_ip = self
            .metadata
            .internal_ip()
            .await
            .map_err(mandatory(VAR_INTERNAL_IP))?;
        let external_ip = self
            .metadata
            .external_ip()
            .await
            .map_err(mandatory(VAR_EXTERNAL_IP))?;

        // instance-template is only there for VMs created from a template
        let instance_template = resource_name(
            VAR_INSTANCE_TEMPLATE,
            self.metadata
                .instance_attribute_value("instance-template")
                .await,
            l,
        );
        let machine_type = resource_name(
            VAR_MACHINE_TYPE,
            self.metadata.get("instance/machine-type").await,
            l,
        );

        Ok(InstanceAttributes {
            zone: Zone::new(zone),
            internal_ip,
            external_ip,
            instance_template,
            machine_type,
        })
    }

    /// Probes every NIC slot. Slots aren't guaranteed to be allocated
    /// contiguously, so a missing slot doesn't end the scan.
    async fn nics(&self, l: &Logger) -> Vec<NicRecord> {
        let mut nics = Vec::new();

        for index in 0..self.max_nics {
            // no primary IP means no NIC
            let ip = match self.metadata.get(&nic_key(index, "ip")).await {
                Ok(ip) => ip,
                Err(_) => continue,
            };

            let ipv6 = match self.metadata.get(&nic_key(index, "ipv6s")).await {
                Ok(v) => Some(v.trim().to_string()),
                Err(_) => {
                    l.debug(format_args!(
                        "VM does not have ipv6 ip on interface# {index}"
                    ));
                    None
                }
            };

            nics.push(NicRecord { index, ip, ipv6 });
        }

        nics
    }

    async fn labels(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
        l: &Logger,
    ) -> Result<LabelSet, SysVarsError> {
        let compute = self.compute.connect().map_err(SysVarsError::ComputeClient)?;

        // Needs read-only access to the compute API, which the service
        // account may not have. Labels are optional.
        match compute.get_instance(project, zone, instance).await {
            Ok(inst) => {
                l.debug(format_args!(
                    "Got {} labels for instance {}",
                    inst.labels.len(),
                    inst.name.as_deref().unwrap_or(instance)
                ));
                Ok(inst.labels)
            }
            Err(err) => {
                l.warn(format_args!(
                    "sysvars_gce: Error while fetching the instance resource using GCE API: {err}. Continuing without labels info."
                ));
                Ok(LabelSet::new())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use hyper::StatusCode;

    use crate::cloud_metadata::compute::{ComputeError, ComputeService, Instance};

    use super::*;

    #[derive(Clone)]
    pub enum FakeCompute {
        Labels(LabelSet),
        Forbidden,
        Unbuildable,
    }

    impl FakeCompute {
        pub fn labels(labels: &[(&str, &str)]) -> Self {
            Self::Labels(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ComputeConnector for FakeCompute {
        fn connect(&self) -> Result<Box<dyn ComputeService>, ComputeError> {
            match self {
                Self::Unbuildable => Err(ComputeError::RelativeEndpoint("/compute/v1".into())),
                other => Ok(Box::new(other.clone())),
            }
        }
    }

    #[async_trait]
    impl ComputeService for FakeCompute {
        async fn get_instance(
            &self,
            _project: &str,
            _zone: &str,
            instance: &str,
        ) -> Result<Instance, ComputeError> {
            match self {
                Self::Labels(labels) => Ok(Instance {
                    name: Some(instance.to_string()),
                    labels: labels.clone(),
                }),
                _ => Err(ComputeError::Status(StatusCode::FORBIDDEN)),
            }
        }
    }
}
