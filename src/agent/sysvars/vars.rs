// Generic variables, set on every host
pub const VAR_HOSTNAME: &str = "hostname";
pub const VAR_VERSION: &str = "version";
pub const VAR_START_TIMESTAMP: &str = "start_timestamp";

// Identity, available on both GCE and GKE metadata servers
pub const VAR_PROJECT: &str = "project";
pub const VAR_PROJECT_ID: &str = "project_id";
pub const VAR_INSTANCE_ID: &str = "instance_id";

// Kubernetes
pub const VAR_NAMESPACE: &str = "namespace";

// Instance attributes (GCE only)
pub const VAR_INSTANCE: &str = "instance";
pub const VAR_ZONE: &str = "zone";
pub const VAR_REGION: &str = "region";
pub const VAR_INTERNAL_IP: &str = "internal_ip";
pub const VAR_EXTERNAL_IP: &str = "external_ip";
pub const VAR_INSTANCE_TEMPLATE: &str = "instance_template";
pub const VAR_MACHINE_TYPE: &str = "machine_type";

// Network interfaces
//   nic_<i>_ip for the primary address of each interface
//   instance/network-interfaces/<i>/ipv6s for its IPv6 addresses
pub const VAR_INTERNAL_IPV6_IP: &str = "internal_ipv6_ip";

// Instance labels are re-exported as label_<key>
pub const LABEL_PREFIX: &str = "label_";

pub fn nic_ip_var(index: usize) -> String {
    format!("nic_{index}_ip")
}

pub fn label_var(key: &str) -> String {
    format!("{LABEL_PREFIX}{key}")
}
