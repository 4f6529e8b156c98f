//! Unified error types for the carshare core library.
//!
//! This module provides a unified error type [`CarshareError`] that covers all failure
//! modes across the rules core. The configuration module keeps its own specific
//! error type ([`ConfigError`](crate::config::ConfigError)) which converts into it.
//!
//! # Design Principles
//!
//! - **Specific variants**: Each error variant captures exactly one failure mode
//! - **Actionable messages**: Error messages say what the caller sent and what was expected
//! - **Context preservation**: Wrapped errors maintain their original context
//! - **No retries**: The core never retries; callers decide based on the classification helpers
//!
//! # Example
//!
//! ```rust
//! use carshare_core::error::{CarshareError, Result};
//! use rust_decimal::Decimal;
//!
//! fn check_amount(amount: Decimal) -> Result<()> {
//!     if amount.is_sign_negative() {
//!         return Err(CarshareError::Validation("total_amount must not be negative".into()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use crate::booking::{BookingAction, BookingStatus};

/// The unified error type for all carshare core operations.
#[derive(Debug, Error)]
pub enum CarshareError {
    // =========================================================================
    // LOOKUP ERRORS
    // =========================================================================
    /// No booking exists with the given id.
    #[error("Booking not found: '{0}'")]
    BookingNotFound(Uuid),

    // =========================================================================
    // STATE MACHINE ERRORS
    // =========================================================================
    /// The requested action is not allowed from the booking's current status.
    #[error("Cannot {action}: booking is {from}")]
    InvalidTransition {
        /// Status the booking was in when the action was attempted.
        from: BookingStatus,
        /// The rejected action.
        action: BookingAction,
    },

    // =========================================================================
    // INPUT ERRORS
    // =========================================================================
    /// A required field was missing or carried an invalid value.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Input was well-typed but could not be evaluated (e.g. missing coordinates).
    #[error("Computation failed: {0}")]
    Computation(String),

    // =========================================================================
    // REPOSITORY ERRORS
    // =========================================================================
    /// The injected booking repository, or a config write, failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),
}

/// A specialized [`Result`] type for carshare core operations.
pub type Result<T> = std::result::Result<T, CarshareError>;

impl CarshareError {
    /// Returns `true` if the referenced booking does not exist.
    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::BookingNotFound(_))
    }

    /// Returns `true` if a lifecycle precondition was violated.
    #[inline]
    #[must_use]
    pub const fn is_transition_error(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Returns `true` if the caller supplied missing or invalid data.
    #[inline]
    #[must_use]
    pub const fn is_validation_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Computation(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParse(_) | Self::ConfigValidation(_)
        )
    }

    /// Returns `true` if this error represents an expected operational state.
    ///
    /// A rejected transition (e.g. cancelling a trip that already started)
    /// is a normal outcome of racing user actions, not a system failure.
    #[inline]
    #[must_use]
    pub const fn is_expected_state(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Returns a machine-readable error code for collaborators.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BookingNotFound(_) => "NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Computation(_) => "COMPUTATION_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParse(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for CarshareError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::Load(e) => Self::ConfigParse(e.to_string()),
            ConfigError::Serialize(e) => Self::ConfigParse(e.to_string()),
            ConfigError::Write { path, source } => {
                Self::Persistence(format!("Failed to write {}: {source}", path.display()))
            }
            ConfigError::Validation { field, message } => {
                Self::ConfigValidation(format!("{field}: {message}"))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
