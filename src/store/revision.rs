//! Versioned configuration snapshots.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An opaque configuration blob with its version and checksum.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigRevision {
    version: u64,
    checksum: String,
    data: Arc<[u8]>,
}

impl ConfigRevision {
    pub fn new(version: u64, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            version,
            checksum: checksum(&data),
            data,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Lowercase hex SHA-256 of the content.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn summary(&self) -> RevisionSummary {
        RevisionSummary {
            version: self.version,
            checksum: self.checksum.clone(),
            size: self.data.len(),
        }
    }
}

// Content can be large and binary; keep it out of logs.
impl fmt::Debug for ConfigRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigRevision")
            .field("version", &self.version)
            .field("checksum", &self.checksum)
            .field("size", &self.data.len())
            .finish()
    }
}

/// Revision metadata without the content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub version: u64,
    pub checksum: String,
    pub size: usize,
}

pub fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
