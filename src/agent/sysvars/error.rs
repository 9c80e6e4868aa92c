use crate::cloud_metadata::{ComputeError, MetadataError};

#[derive(Debug, thiserror::Error)]
pub enum SysVarsError {
    #[error("sysvars_gce: error while getting {field} from metadata: {source}")]
    Metadata {
        field: &'static str,
        #[source]
        source: MetadataError,
    },

    #[error("sysvars_gce: error creating compute service to get instance labels: {0}")]
    ComputeClient(#[source] ComputeError),
}

impl SysVarsError {
    /// Name of the variable whose lookup failed, if the failure was a lookup.
    #[cfg(test)]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Metadata { field, .. } => Some(*field),
            Self::ComputeClient(_) => None,
        }
    }
}

/// Maps a failed lookup of a mandatory variable to a fatal error.
pub(crate) fn mandatory(field: &'static str) -> impl FnOnce(MetadataError) -> SysVarsError {
    move |source| SysVarsError::Metadata { field, source }
}
