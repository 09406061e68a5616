//! The budget accountant interface shared by all calibration strategies.

use dp_budget_core::{MechanismSpec, MechanismType, Result};

use crate::ledger::BudgetLedger;
use crate::scope::BudgetScope;

/// Parameters of one budget request.
#[derive(Clone, Debug, PartialEq)]
pub struct BudgetRequest {
    /// Kind of noise the mechanism uses.
    pub mechanism_type: MechanismType,
    /// Sensitivity of the query the mechanism protects.
    pub sensitivity: f64,
    /// Relative weight versus other mechanisms in the same scope.
    pub weight: f64,
    /// Number of times the mechanism is applied.
    pub count: usize,
    /// Pre-specified noise. No strategy supports this yet.
    pub noise_standard_deviation: Option<f64>,
}

impl BudgetRequest {
    /// A request with sensitivity 1, weight 1 and count 1.
    pub fn new(mechanism_type: MechanismType) -> Self {
        Self {
            mechanism_type,
            sensitivity: 1.0,
            weight: 1.0,
            count: 1,
            noise_standard_deviation: None,
        }
    }

    /// Set the sensitivity.
    pub fn with_sensitivity(mut self, sensitivity: f64) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    /// Set the relative weight.
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the number of applications.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Pre-specify the noise standard deviation.
    pub fn with_noise_standard_deviation(mut self, noise_standard_deviation: f64) -> Self {
        self.noise_standard_deviation = Some(noise_standard_deviation);
        self
    }
}

impl From<MechanismType> for BudgetRequest {
    fn from(mechanism_type: MechanismType) -> Self {
        Self::new(mechanism_type)
    }
}

/// A strategy that splits a total (epsilon, delta) budget across mechanisms.
///
/// Callers open scopes around groups of requests, close them, then call
/// [`compute_budgets`](BudgetAccountant::compute_budgets) exactly once. The
/// returned [`MechanismSpec`] handles are resolved in place at that point.
pub trait BudgetAccountant {
    /// Shared bookkeeping state.
    fn ledger(&self) -> &BudgetLedger;

    /// Mutable access to the shared bookkeeping state.
    fn ledger_mut(&mut self) -> &mut BudgetLedger;

    /// Register a mechanism and return its lazy descriptor.
    fn request_budget(&mut self, request: BudgetRequest) -> Result<MechanismSpec>;

    /// Resolve every registered mechanism. May only succeed once.
    fn compute_budgets(&mut self) -> Result<()>;

    /// Request a mechanism with default sensitivity, weight and count.
    fn request(&mut self, mechanism_type: MechanismType) -> Result<MechanismSpec> {
        self.request_budget(BudgetRequest::new(mechanism_type))
    }

    /// Open a scope that receives `weight` relative to its siblings.
    ///
    /// The scope stays open until the returned guard is dropped.
    fn scope(&mut self, weight: f64) -> Result<BudgetScope<'_, Self>>
    where
        Self: Sized,
    {
        BudgetScope::enter(self, weight, false)
    }

    /// Open a top-level aggregation scope.
    ///
    /// Aggregation scopes can not nest. When the accountant declares its
    /// aggregations up front, the scope also carries its share of the total
    /// budget.
    fn aggregation_scope(&mut self, weight: f64) -> Result<BudgetScope<'_, Self>>
    where
        Self: Sized,
    {
        BudgetScope::enter(self, weight, true)
    }
}
