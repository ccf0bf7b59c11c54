use serde::{Deserialize, Serialize};

/// Per-kind metadata flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobFlag {
    /// Pending jobs of this kind survive a restart and appear in exported logs
    Exportable,
    /// Jobs of this kind may carry a field map
    Mappable,
    /// Retryable failures are re-executed while the budget lasts
    Retryable,
    /// The job only reads from the portal
    ReadOnly,
}

impl JobFlag {
    pub const ALL: [JobFlag; 4] = [
        JobFlag::Exportable,
        JobFlag::Mappable,
        JobFlag::Retryable,
        JobFlag::ReadOnly,
    ];
}

/// Static metadata attached to a job kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KindFlags {
    pub exportable: bool,
    pub mappable: bool,
    pub retryable: bool,
    pub read_only: bool,
}

impl KindFlags {
    /// All flags unset
    pub const fn none() -> Self {
        Self {
            exportable: false,
            mappable: false,
            retryable: false,
            read_only: false,
        }
    }

    /// Check a single flag
    pub fn has(&self, flag: JobFlag) -> bool {
        match flag {
            JobFlag::Exportable => self.exportable,
            JobFlag::Mappable => self.mappable,
            JobFlag::Retryable => self.retryable,
            JobFlag::ReadOnly => self.read_only,
        }
    }

    /// Flags that are set
    pub fn set_flags(&self) -> Vec<JobFlag> {
        JobFlag::ALL.into_iter().filter(|flag| self.has(*flag)).collect()
    }
}
