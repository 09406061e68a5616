//! Accountant configuration types.
//!
//! A config holds the caller-facing construction options and builds a fresh
//! accountant on demand, so one config can drive many independent runs.

use dp_budget_core::Result;

use crate::ledger::AggregationLimit;
use crate::naive::NaiveBudgetAccountant;

/// Configuration for constructing a budget accountant with a fresh state.
pub trait BudgetAccountantConfig {
    /// Accountant type created by this config.
    type Accountant: crate::BudgetAccountant;

    /// Create a new accountant instance, validating the options.
    fn create_accountant(&self) -> Result<Self::Accountant>;
}

/// Configuration for [`NaiveBudgetAccountant`].
#[derive(Clone, Debug, PartialEq)]
pub struct NaiveAccountantConfig {
    /// Total epsilon to split.
    pub total_epsilon: f64,
    /// Total delta to split.
    pub total_delta: f64,
    /// Exact number of aggregation scopes, if declared.
    pub n_aggregations: Option<usize>,
    /// Per-aggregation weights, if declared.
    pub aggregation_weights: Option<Vec<f64>>,
}

impl NaiveAccountantConfig {
    /// Create a config without aggregation constraints.
    pub fn new(total_epsilon: f64, total_delta: f64) -> Self {
        Self {
            total_epsilon,
            total_delta,
            n_aggregations: None,
            aggregation_weights: None,
        }
    }

    /// Declare the number of aggregation scopes.
    pub fn with_n_aggregations(mut self, n_aggregations: usize) -> Self {
        self.n_aggregations = Some(n_aggregations);
        self
    }

    /// Declare the weight of each aggregation scope, in opening order.
    pub fn with_aggregation_weights(mut self, aggregation_weights: Vec<f64>) -> Self {
        self.aggregation_weights = Some(aggregation_weights);
        self
    }

    fn aggregation_limit(&self) -> Result<AggregationLimit> {
        AggregationLimit::from_options(self.n_aggregations, self.aggregation_weights.clone())
    }
}

impl BudgetAccountantConfig for NaiveAccountantConfig {
    type Accountant = NaiveBudgetAccountant;

    fn create_accountant(&self) -> Result<Self::Accountant> {
        NaiveBudgetAccountant::with_aggregations(
            self.total_epsilon,
            self.total_delta,
            self.aggregation_limit()?,
        )
    }
}

#[cfg(feature = "pld")]
pub use self::pld_config::PldBudgetAccountantConfig;

#[cfg(feature = "pld")]
mod pld_config {
    use dp_budget_core::Result;

    use super::{BudgetAccountantConfig, NaiveAccountantConfig};
    use crate::pld::PldComposer;
    use crate::pld_budget::{PldBudgetAccountant, DEFAULT_PLD_DISCRETIZATION};

    /// Configuration for [`PldBudgetAccountant`] backed by the built-in PLD library.
    #[derive(Clone, Debug, PartialEq)]
    pub struct PldBudgetAccountantConfig {
        /// Totals and aggregation constraints.
        pub budget: NaiveAccountantConfig,
        /// Discretization interval for PLD values.
        pub pld_discretization: f64,
        /// Composer knobs.
        pub composer: PldComposer,
    }

    impl PldBudgetAccountantConfig {
        /// Create a config without aggregation constraints.
        pub fn new(total_epsilon: f64, total_delta: f64) -> Self {
            Self {
                budget: NaiveAccountantConfig::new(total_epsilon, total_delta),
                pld_discretization: DEFAULT_PLD_DISCRETIZATION,
                composer: PldComposer::default(),
            }
        }

        /// Declare the number of aggregation scopes.
        pub fn with_n_aggregations(mut self, n_aggregations: usize) -> Self {
            self.budget = self.budget.with_n_aggregations(n_aggregations);
            self
        }

        /// Declare the weight of each aggregation scope, in opening order.
        pub fn with_aggregation_weights(mut self, aggregation_weights: Vec<f64>) -> Self {
            self.budget = self.budget.with_aggregation_weights(aggregation_weights);
            self
        }

        /// Set the discretization interval.
        pub fn with_pld_discretization(mut self, pld_discretization: f64) -> Self {
            self.pld_discretization = pld_discretization;
            self
        }

        /// Set the composer used for PLD algebra.
        pub fn with_composer(mut self, composer: PldComposer) -> Self {
            self.composer = composer;
            self
        }
    }

    impl BudgetAccountantConfig for PldBudgetAccountantConfig {
        type Accountant = PldBudgetAccountant<PldComposer>;

        fn create_accountant(&self) -> Result<Self::Accountant> {
            PldBudgetAccountant::with_aggregations(
                self.budget.total_epsilon,
                self.budget.total_delta,
                self.budget.aggregation_limit()?,
                self.composer,
            )?
            .with_pld_discretization(self.pld_discretization)
        }
    }
}
