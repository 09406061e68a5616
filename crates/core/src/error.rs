//! Error types for privacy budget accounting.

/// Errors that can occur while allocating or calibrating a DP budget.
///
/// All of these are usage or configuration errors: none of them is transient
/// and retrying the same call sequence fails the same way.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DpError {
    /// Invalid parameter provided.
    #[error("invalid parameter: {msg}")]
    InvalidParameters {
        /// Human-readable error description.
        msg: String,
    },

    /// Numerical computation error.
    #[error("numerical error: {msg}")]
    NumericalError {
        /// Human-readable error description.
        msg: String,
    },

    /// Unsupported feature or configuration.
    #[error("unsupported feature: {msg}")]
    UnsupportedFeature {
        /// Human-readable error description.
        msg: String,
    },

    /// The accountant no longer accepts requests or scopes.
    #[error(
        "request_budget() is called after compute_budgets(); \
         compute_budgets() must run after all DP aggregations are declared"
    )]
    Finalized,

    /// `compute_budgets()` was called a second time.
    #[error("compute_budgets() can not be called twice")]
    AlreadyFinalized,

    /// Scopes were opened, nested or closed in a way the accountant forbids.
    #[error("budget scope violation: {msg}")]
    ScopeViolation {
        /// Human-readable error description.
        msg: String,
    },

    /// The number of aggregation scopes opened differs from the declaration.
    #[error("the accountant was declared with {expected} aggregations, but {actual} were opened")]
    AggregationCountMismatch {
        /// Declared number of aggregations.
        expected: usize,
        /// Number of aggregation scopes actually opened.
        actual: usize,
    },

    /// A mechanism budget value was read before the accountant produced it.
    #[error("{field} is not computed yet")]
    UncomputedBudget {
        /// Name of the value that was read.
        field: &'static str,
    },

    /// A scope was asked for an eagerly computed budget it does not have.
    #[error("scope budget unavailable: {msg}")]
    ScopeBudgetUnavailable {
        /// Human-readable error description.
        msg: String,
    },

    /// A mechanism budget was written twice.
    #[error("mechanism budget has already been computed")]
    AlreadyResolved,
}

/// Result type for budget accounting operations.
pub type Result<T> = std::result::Result<T, DpError>;

impl DpError {
    /// Create an invalid parameter error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameters { msg: msg.into() }
    }

    /// Create a numerical error.
    pub fn numerical<S: Into<String>>(msg: S) -> Self {
        Self::NumericalError { msg: msg.into() }
    }

    /// Create an unsupported feature error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedFeature { msg: msg.into() }
    }

    /// Create a scope violation error.
    pub fn scope<S: Into<String>>(msg: S) -> Self {
        Self::ScopeViolation { msg: msg.into() }
    }
}
