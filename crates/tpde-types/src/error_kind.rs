use serde::{Deserialize, Serialize};

/// The error-kind taxonomy from §7, shared across crates so that stats
/// counters and `ProcessedEvent::error_kind` can all speak the same tag
/// regardless of which component raised the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKindTag {
    InvalidInput,
    ResourceExhaustion,
    DeadlineExceeded,
    Transient,
    Corruption,
}

impl std::fmt::Display for ErrorKindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKindTag::InvalidInput => "invalid_input",
            ErrorKindTag::ResourceExhaustion => "resource_exhaustion",
            ErrorKindTag::DeadlineExceeded => "deadline_exceeded",
            ErrorKindTag::Transient => "transient",
            ErrorKindTag::Corruption => "corruption",
        };
        f.write_str(s)
    }
}
