//! Startup configuration errors.
//!
//! These are the only fatal errors in the process: the monitor refuses to
//! start rather than run in a silently degraded state.

/// Invalid or missing configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    /// A value is present but unusable.
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Setting or variable name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// The tier threshold table violates its ordering rules.
    #[error("invalid tier table: {0}")]
    TierTable(String),

    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::MonitorConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
