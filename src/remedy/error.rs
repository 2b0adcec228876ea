//! Remedy Error Types

/// Error types for remedy plugins
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemedyError {
    /// The remedy is missing the configuration block its plugin requires
    #[error("Remedy '{0}' is missing its configuration")]
    MissingConfig(String),
}
