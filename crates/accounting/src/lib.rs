//! Differential privacy budget accounting.
//!
//! An accountant splits a total (epsilon, delta) budget across mechanisms
//! declared inside a tree of weighted scopes. [`NaiveBudgetAccountant`]
//! splits it proportionally; [`PldBudgetAccountant`] calibrates one noise
//! level against the composed privacy loss distribution of all mechanisms.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod accountant;
pub mod accountants;
pub mod calibrate;
pub mod composer;
pub mod ledger;
pub mod naive;
#[cfg(feature = "pld")]
pub mod pld;
pub mod pld_budget;
pub mod scope;

pub use accountant::{BudgetAccountant, BudgetRequest};
#[cfg(feature = "pld")]
pub use accountants::PldBudgetAccountantConfig;
pub use accountants::{BudgetAccountantConfig, NaiveAccountantConfig};
pub use calibrate::{bracket_noise, calibrate_minimum_noise, NoiseBracket, NOISE_SEARCH_TOLERANCE};
pub use composer::DistributionComposer;
pub use ledger::{AggregationLimit, BudgetLedger};
pub use naive::NaiveBudgetAccountant;
#[cfg(feature = "pld")]
pub use pld::{PldComposer, PrivacyLossDistribution};
pub use pld_budget::{PldBudgetAccountant, DEFAULT_PLD_DISCRETIZATION};
pub use scope::BudgetScope;

/// Common imports for budget accounting.
pub mod prelude {
    #[cfg(feature = "pld")]
    pub use crate::{PldBudgetAccountantConfig, PldComposer, PrivacyLossDistribution};
    pub use crate::{
        AggregationLimit, BudgetAccountant, BudgetAccountantConfig, BudgetLedger, BudgetRequest,
        BudgetScope, DistributionComposer, NaiveAccountantConfig, NaiveBudgetAccountant,
        PldBudgetAccountant,
    };
}
