use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The repository operation an error belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateEhr,
    GetEhr,
    CreateComposition,
    UpdateComposition,
    DeleteComposition,
    GetComposition,
    QueryCompositions,
    ListTemplates,
    GetWebTemplate,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::CreateEhr => "create EHR",
            Operation::GetEhr => "get EHR",
            Operation::CreateComposition => "create composition",
            Operation::UpdateComposition => "update composition",
            Operation::DeleteComposition => "delete composition",
            Operation::GetComposition => "get composition",
            Operation::QueryCompositions => "query compositions",
            Operation::ListTemplates => "list templates",
            Operation::GetWebTemplate => "get web template",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VitalsError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] clinic_types::IdError),
    #[error("invalid repository URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{operation} failed for {target}: HTTP {status} {reason}")]
    Transport {
        operation: Operation,
        target: String,
        status: u16,
        reason: String,
    },
    #[error("{operation} for {target} could not reach the repository: {source}")]
    Network {
        operation: Operation,
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} for {target} returned a malformed response: {detail}")]
    MalformedResponse {
        operation: Operation,
        target: String,
        detail: String,
    },
    #[error("{operation} for {target} timed out after {after:?}")]
    Timeout {
        operation: Operation,
        target: String,
        after: Duration,
    },
    #[error("{operation} for {target} was cancelled")]
    Cancelled { operation: Operation, target: String },

    #[error("openEHR error: {0}")]
    OpenEhr(#[from] openehr::OpenEhrError),
    #[error("failed to read template file {}: {source}", path.display())]
    TemplateFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse template file {}: {source}", path.display())]
    TemplateFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl VitalsError {
    /// HTTP status of a [`VitalsError::Transport`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            VitalsError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The repository operation that failed, for errors raised at the wire.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            VitalsError::Transport { operation, .. }
            | VitalsError::Network { operation, .. }
            | VitalsError::MalformedResponse { operation, .. }
            | VitalsError::Timeout { operation, .. }
            | VitalsError::Cancelled { operation, .. } => Some(*operation),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type VitalsResult<T> = std::result::Result<T, VitalsError>;
