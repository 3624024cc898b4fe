//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DeepquestResult<T> = Result<T, DeepquestError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the deepquest system
///
/// The research-flow variants mirror how the orchestrator recovers from
/// them: classification and decomposition failures degrade a node to the
/// atomic path, retrieval failures degrade to reasoning-only, and only an
/// exhausted reasoning call marks a node as failed.
#[derive(Error, Debug)]
pub enum DeepquestError {
    #[error("Classification error: {message}")]
    Classification {
        message: String,
        context: ErrorContext,
    },

    #[error("Decomposition error: {message}")]
    Decomposition {
        message: String,
        context: ErrorContext,
    },

    #[error("Retrieval error: {message}")]
    Retrieval {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Reasoning call error: {message}")]
    Reasoning {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Report generation error: {message}")]
    Report {
        message: String,
        context: ErrorContext,
    },

    #[error("Budget exceeded: {message}")]
    Budget {
        message: String,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DeepquestError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DeepquestError::Classification { context, .. } => Some(context),
            DeepquestError::Decomposition { context, .. } => Some(context),
            DeepquestError::Retrieval { context, .. } => Some(context),
            DeepquestError::Reasoning { context, .. } => Some(context),
            DeepquestError::Report { context, .. } => Some(context),
            DeepquestError::Budget { context, .. } => Some(context),
            DeepquestError::Timeout { context, .. } => Some(context),
            DeepquestError::Config { context, .. } => Some(context),
            DeepquestError::Validation { context, .. } => Some(context),
            DeepquestError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if error is recoverable by degrading the node rather than
    /// failing the run
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeepquestError::Classification { .. } => true,
            DeepquestError::Decomposition { .. } => true,
            DeepquestError::Retrieval { .. } => true,
            DeepquestError::Timeout { .. } => true,
            DeepquestError::Config { .. } => false,
            DeepquestError::Validation { .. } => false,
            DeepquestError::Budget { .. } => false,
            _ => false,
        }
    }

    /// Get retry delay in milliseconds for errors worth retrying
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DeepquestError::Reasoning { .. } => Some(1000),
            DeepquestError::Retrieval { .. } => Some(1000),
            DeepquestError::Timeout { .. } => Some(2000),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            DeepquestError::Internal { .. }
            | DeepquestError::Config { .. }
            | DeepquestError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
            _ => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Recoverable error occurred"
                );
            }
        }
    }

    /// Create a classification error
    pub fn classification<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Classification {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    /// Create a decomposition error
    pub fn decomposition<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Decomposition {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    /// Create a retrieval error
    pub fn retrieval<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Retrieval {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    /// Create a reasoning-call error
    pub fn reasoning<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Reasoning {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component),
        }
    }

    /// Create a report-generation error
    pub fn report<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Report {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    /// Create a budget-exhaustion error
    pub fn budget<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Budget {
            message: message.into(),
            context: ErrorContext::new(component),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S, component: &str) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
            context: ErrorContext::new(component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'deepquest config-init' to create a default config"),
        }
    }
}
