//! # Error Types
//!
//! Error taxonomy for the Switchyard control plane using `thiserror`.
//!
//! Every failure carries a machine-readable [`ErrorKind`] plus a human-readable
//! detail string. Callers distinguish `DependentUnReady` ("try again later") and
//! `RecordExisted` ("fix and resubmit") from generic failures.

use std::fmt;

/// Custom result type for Switchyard operations
pub type Result<T> = std::result::Result<T, SwitchyardError>;

/// Main error type for the Switchyard control plane
#[derive(thiserror::Error, Debug)]
pub enum SwitchyardError {
    /// Bad input shape or value
    #[error("Illegal parameter: {message}")]
    ParamIllegal { message: String, field: Option<String> },

    /// Business rule violation
    #[error("Model violation: {message}")]
    ModelViolation { message: String },

    /// Invariant broken in stored data
    #[error("Dirty data: {message}")]
    DirtyData { message: String },

    /// Referenced record does not exist
    #[error("{resource_type} '{id}' does not exist")]
    RecordNotExist { resource_type: String, id: String },

    /// Record with the same identity already exists
    #[error("{resource_type} '{name}' already exists")]
    RecordExisted { resource_type: String, name: String },

    /// Operation blocked by a dependency that is not ready yet
    #[error("Dependent not ready: {message}")]
    DependentUnReady { message: String },

    /// Underlying store failure
    #[error("Storage error: {context}")]
    Storage {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Machine-readable error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ParamIllegal,
    ModelViolation,
    DirtyData,
    RecordNotExist,
    RecordExisted,
    DependentUnReady,
    StorageFailure,
    Config,
    Serialization,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParamIllegal => "param_illegal",
            ErrorKind::ModelViolation => "model_violation",
            ErrorKind::DirtyData => "dirty_data",
            ErrorKind::RecordNotExist => "record_not_exist",
            ErrorKind::RecordExisted => "record_existed",
            ErrorKind::DependentUnReady => "dependent_unready",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::Config => "config",
            ErrorKind::Serialization => "serialization",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SwitchyardError {
    /// Create an illegal parameter error
    pub fn param<S: Into<String>>(message: S) -> Self {
        Self::ParamIllegal { message: message.into(), field: None }
    }

    /// Create an illegal parameter error with field information
    pub fn param_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::ParamIllegal { message: message.into(), field: Some(field.into()) }
    }

    /// Create a business rule violation error
    pub fn model<S: Into<String>>(message: S) -> Self {
        Self::ModelViolation { message: message.into() }
    }

    /// Create a dirty data error
    pub fn dirty<S: Into<String>>(message: S) -> Self {
        Self::DirtyData { message: message.into() }
    }

    /// Create a record-not-exist error
    pub fn not_exist<R: Into<String>, I: fmt::Display>(resource_type: R, id: I) -> Self {
        Self::RecordNotExist { resource_type: resource_type.into(), id: id.to_string() }
    }

    /// Create a record-existed error
    pub fn existed<R: Into<String>, N: Into<String>>(resource_type: R, name: N) -> Self {
        Self::RecordExisted { resource_type: resource_type.into(), name: name.into() }
    }

    /// Create a dependent-not-ready error
    pub fn unready<S: Into<String>>(message: S) -> Self {
        Self::DependentUnReady { message: message.into() }
    }

    /// Wrap a store failure with context
    pub fn storage<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Storage { source, context: context.into() }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwitchyardError::ParamIllegal { .. } => ErrorKind::ParamIllegal,
            SwitchyardError::ModelViolation { .. } => ErrorKind::ModelViolation,
            SwitchyardError::DirtyData { .. } => ErrorKind::DirtyData,
            SwitchyardError::RecordNotExist { .. } => ErrorKind::RecordNotExist,
            SwitchyardError::RecordExisted { .. } => ErrorKind::RecordExisted,
            SwitchyardError::DependentUnReady { .. } => ErrorKind::DependentUnReady,
            SwitchyardError::Storage { .. } => ErrorKind::StorageFailure,
            SwitchyardError::Config { .. } => ErrorKind::Config,
            SwitchyardError::Serialization { .. } => ErrorKind::Serialization,
            SwitchyardError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::ParamIllegal => 400,
            ErrorKind::ModelViolation => 400,
            ErrorKind::Serialization => 400,
            ErrorKind::RecordNotExist => 404,
            ErrorKind::RecordExisted => 409,
            ErrorKind::DependentUnReady => 424,
            ErrorKind::DirtyData => 500,
            ErrorKind::StorageFailure => 500,
            ErrorKind::Config => 500,
            ErrorKind::Internal => 500,
        }
    }

    /// Whether the caller should retry the same request later.
    ///
    /// Storage failures are reported as-is; retrying them is the storage
    /// driver's concern, not the caller's.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwitchyardError::DependentUnReady { .. })
    }
}

impl From<sqlx::Error> for SwitchyardError {
    fn from(error: sqlx::Error) -> Self {
        Self::Storage { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<serde_json::Error> for SwitchyardError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for SwitchyardError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for SwitchyardError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let message = fields
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        let field = fields.first().map(|(field, _)| field.to_string());
        Self::ParamIllegal { message: format!("Validation failed: {}", message), field }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = SwitchyardError::param("bad lb matrix");
        assert!(matches!(error, SwitchyardError::ParamIllegal { .. }));
        assert_eq!(error.to_string(), "Illegal parameter: bad lb matrix");
    }

    #[test]
    fn test_param_field_error() {
        let error = SwitchyardError::param_field("must not be empty", "name");
        if let SwitchyardError::ParamIllegal { field, .. } = error {
            assert_eq!(field, Some("name".to_string()));
        } else {
            panic!("expected ParamIllegal");
        }
    }

    #[test]
    fn test_record_messages() {
        assert_eq!(
            SwitchyardError::not_exist("Cluster", "c1").to_string(),
            "Cluster 'c1' does not exist"
        );
        assert_eq!(
            SwitchyardError::existed("Domain", "a.example.com").to_string(),
            "Domain 'a.example.com' already exists"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(SwitchyardError::model("x").kind(), ErrorKind::ModelViolation);
        assert_eq!(SwitchyardError::dirty("x").kind(), ErrorKind::DirtyData);
        assert_eq!(SwitchyardError::unready("x").kind(), ErrorKind::DependentUnReady);
        assert_eq!(
            SwitchyardError::storage(sqlx::Error::RowNotFound, "x").kind(),
            ErrorKind::StorageFailure
        );
        assert_eq!(ErrorKind::DependentUnReady.to_string(), "dependent_unready");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(SwitchyardError::param("test").status_code(), 400);
        assert_eq!(SwitchyardError::not_exist("Cluster", "test").status_code(), 404);
        assert_eq!(SwitchyardError::existed("Cluster", "test").status_code(), 409);
        assert_eq!(SwitchyardError::unready("test").status_code(), 424);
        assert_eq!(SwitchyardError::internal("test").status_code(), 500);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SwitchyardError::unready("sub cluster not ready").is_retryable());
        assert!(!SwitchyardError::existed("Cluster", "c1").is_retryable());
        assert!(!SwitchyardError::storage(sqlx::Error::PoolTimedOut, "x").is_retryable());
    }

    #[test]
    fn test_error_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: SwitchyardError = json_error.into();
        assert!(matches!(error, SwitchyardError::Serialization { .. }));

        let error: SwitchyardError = sqlx::Error::PoolClosed.into();
        assert!(matches!(error, SwitchyardError::Storage { .. }));
    }
}
