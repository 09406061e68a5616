//! Core types for differential privacy budget accounting.
//!
//! This crate provides the error taxonomy shared by the accountants and the
//! mechanism descriptors they hand back to callers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mechanism;

pub use error::{DpError, Result};
pub use mechanism::{BudgetState, BudgetWriter, CalibratedBudget, MechanismSpec, MechanismType};

/// Common imports for downstream users.
pub mod prelude {
    pub use crate::{BudgetState, CalibratedBudget, DpError, MechanismSpec, MechanismType, Result};
}
