use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is detached from the tree: {0}")]
    ElementDetached(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to parse locator table: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Problems with the version/locator table. Always fatal for a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no locator set for version '{0}'")]
    MissingVersion(String),

    #[error("no locator for key '{key}' in version '{version}'")]
    MissingKey { version: String, key: String },

    #[error("duplicate locator for key '{key}' in version '{version}'")]
    DuplicateKey { version: String, key: String },

    #[error("invalid text pattern for key '{key}' in version '{version}': {reason}")]
    InvalidPattern {
        version: String,
        key: String,
        reason: String,
    },

    #[error("locator table is incomplete: {}", format_missing(.0))]
    Incomplete(Vec<(String, String)>),

    #[error("version probe failed: {0}")]
    VersionProbe(String),

    #[error("workflow exceeded {0} transitions")]
    TooManyTransitions(usize),

    #[error("workflow has more than one transition leaving page '{0}'")]
    DuplicatePage(String),
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(version, key)| format!("{version}:{key}"))
        .collect::<Vec<_>>()
        .join(", ")
}

impl AutomationError {
    /// Errors that describe a tree reference which can no longer be trusted.
    pub fn is_structural(&self) -> bool {
        matches!(self, AutomationError::ElementDetached(_))
    }
}
