use serde::{Deserialize, Serialize};
use std::fmt;

use super::flags::KindFlags;

/// Closed set of job kinds understood by the engine.
///
/// Kinds that arrive as strings (persisted queue files, producer payloads)
/// and match none of the known tags are kept as [`JobKind::Other`] so that a
/// catch-all worker can still route them; their metadata flags are all unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobKind {
    /// Submit a new request on the portal
    CreateRequest,
    /// Look up the state of an existing request
    QueryRequest,
    /// Fetch the captcha image needed for the next submission
    FetchCaptcha,
    /// Does nothing; useful for probing worker health
    Noop,
    /// Wipe the automation work area
    Cleanup,
    /// Deliver a follow-up notification to an external endpoint
    Callback,
    /// Unregistered tag
    Other(String),
}

impl JobKind {
    /// Every registered kind, in declaration order
    pub const ALL: [JobKind; 6] = [
        JobKind::CreateRequest,
        JobKind::QueryRequest,
        JobKind::FetchCaptcha,
        JobKind::Noop,
        JobKind::Cleanup,
        JobKind::Callback,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateRequest => "create-request",
            Self::QueryRequest => "query-request",
            Self::FetchCaptcha => "fetch-captcha",
            Self::Noop => "noop",
            Self::Cleanup => "cleanup",
            Self::Callback => "callback",
            Self::Other(tag) => tag,
        }
    }

    /// Static metadata for this kind
    pub fn flags(&self) -> KindFlags {
        match self {
            Self::CreateRequest => KindFlags {
                exportable: true,
                mappable: true,
                retryable: true,
                read_only: false,
            },
            Self::QueryRequest => KindFlags {
                exportable: true,
                mappable: true,
                retryable: true,
                read_only: true,
            },
            Self::FetchCaptcha => KindFlags {
                exportable: false,
                mappable: false,
                retryable: true,
                read_only: true,
            },
            Self::Noop => KindFlags {
                exportable: false,
                mappable: false,
                retryable: false,
                read_only: true,
            },
            Self::Cleanup => KindFlags::none(),
            Self::Callback => KindFlags {
                exportable: true,
                mappable: false,
                retryable: true,
                read_only: false,
            },
            Self::Other(_) => KindFlags::none(),
        }
    }

    pub fn is_callback(&self) -> bool {
        matches!(self, Self::Callback)
    }
}

impl From<String> for JobKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "create-request" => Self::CreateRequest,
            "query-request" => Self::QueryRequest,
            "fetch-captcha" => Self::FetchCaptcha,
            "noop" => Self::Noop,
            "cleanup" => Self::Cleanup,
            "callback" => Self::Callback,
            _ => Self::Other(tag),
        }
    }
}

impl From<&str> for JobKind {
    fn from(tag: &str) -> Self {
        Self::from(tag.to_string())
    }
}

impl From<JobKind> for String {
    fn from(kind: JobKind) -> Self {
        match kind {
            JobKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
