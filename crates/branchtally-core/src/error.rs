use std::path::PathBuf;

/// Errors that can occur across branchtally.
///
/// Library crates use this type directly; the binary surfaces it as a
/// `miette` diagnostic at the boundary.
///
/// # Examples
///
/// ```
/// use branchtally_core::TallyError;
///
/// let err = TallyError::Config("missing organization".into());
/// assert!(err.to_string().contains("missing organization"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TallyError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(help("check .branchtally.toml or the matching command-line flag"))]
    Config(String),

    /// Local git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// GitHub API failure (network, auth, not found, malformed payload).
    #[error("GitHub error: {0}")]
    GitHub(String),

    /// A time range whose bounds cannot be parsed or are out of order.
    #[error("invalid time range: {0}")]
    #[diagnostic(help("dates are YYYY-MM-DD, YYYY-MM-DD HH:MM:SS[.fff], or RFC 3339"))]
    InvalidTimeRange(String),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
