use thiserror::Error;

/// Main error type for relgraph
#[derive(Error, Debug)]
pub enum GraphError {
    /// Unknown start entity or relationship endpoint
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed query or store invariant violation
    #[error("Validation error: {0}")]
    Validation(String),

    /// The governance gate declined the query
    #[error("Governance rejected query: {0}")]
    GovernanceRejected(String),

    /// Audit database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Seed file parse errors
    #[error("Parse error: {0}")]
    Parse(String),
}

impl GraphError {
    /// Short stable label, used in explanatory insights and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            GraphError::NotFound(_) => "not_found",
            GraphError::Validation(_) => "validation",
            GraphError::GovernanceRejected(_) => "governance_rejected",
            GraphError::Database(_) => "database",
            GraphError::Io(_) => "io",
            GraphError::Config(_) => "config",
            GraphError::Parse(_) => "parse",
        }
    }
}

/// Convenient Result type using GraphError
pub type Result<T> = std::result::Result<T, GraphError>;
