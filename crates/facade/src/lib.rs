//! Facade crate re-exporting stable APIs.
//!
//! ```
//! use dp_budget::prelude::*;
//!
//! let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6)?;
//! let count = accountant.request(MechanismType::Laplace)?;
//! let sum = accountant
//!     .request_budget(BudgetRequest::new(MechanismType::Gaussian).with_weight(3.0))?;
//! accountant.compute_budgets()?;
//! assert!((count.eps()? - 0.25).abs() < 1e-12);
//! assert!((sum.eps()? - 0.75).abs() < 1e-12);
//! # Ok::<(), DpError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use dp_budget_accounting as accounting;
pub use dp_budget_core as core;

#[cfg(feature = "pld")]
pub use accounting::{PldBudgetAccountantConfig, PldComposer, PrivacyLossDistribution};
pub use accounting::{
    bracket_noise, calibrate_minimum_noise, AggregationLimit, BudgetAccountant,
    BudgetAccountantConfig, BudgetLedger, BudgetRequest, BudgetScope, DistributionComposer,
    NaiveAccountantConfig, NaiveBudgetAccountant, NoiseBracket, PldBudgetAccountant,
    DEFAULT_PLD_DISCRETIZATION, NOISE_SEARCH_TOLERANCE,
};
pub use core::{
    BudgetState, CalibratedBudget, DpError, MechanismSpec, MechanismType, Result,
};

/// Convenience prelude covering the accountants and mechanism types.
pub mod prelude {
    pub use dp_budget_accounting::prelude::*;
    pub use dp_budget_core::prelude::*;
}
