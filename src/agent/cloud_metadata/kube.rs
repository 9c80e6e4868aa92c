use std::path::PathBuf;

const KUBERNETES_SERVICE_HOST_ENV: &str = "KUBERNETES_SERVICE_HOST";
const NAMESPACE_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// Facts about the process environment that collectors need besides the
/// metadata server.
pub trait HostEnvironment: Send + Sync {
    fn is_kubernetes(&self) -> bool;

    fn kubernetes_namespace(&self) -> String;

    fn var(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnvironment {
    namespace_path: PathBuf,
}

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self {
            namespace_path: NAMESPACE_PATH.into(),
        }
    }

    #[cfg(test)]
    fn with_namespace_path(path: impl Into<PathBuf>) -> Self {
        Self {
            namespace_path: path.into(),
        }
    }
}

impl Default for ProcessEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl HostEnvironment for ProcessEnvironment {
    fn is_kubernetes(&self) -> bool {
        self.var(KUBERNETES_SERVICE_HOST_ENV)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    fn kubernetes_namespace(&self) -> String {
        std::fs::read_to_string(&self.namespace_path)
            .map(|ns| ns.trim().to_string())
            .unwrap_or_default()
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}


#[cfg(test)]
mod tests {
    use assert2::assert;

    use super::*;

    #[test]
    fn test_namespace_file() {
        let f = temp_file::with_contents(b"monitoring\n");
        let env = ProcessEnvironment::with_namespace_path(f.path());
        assert!(env.kubernetes_namespace() == "monitoring");
    }

    #[test]
    fn test_namespace_missing() {
        let env = ProcessEnvironment::with_namespace_path("/nonexistent/namespace");
        assert!(env.kubernetes_namespace() == "");
    }
}
