//! Proportional closed-form budget split.

use dp_budget_core::{CalibratedBudget, MechanismSpec, Result};

use crate::accountant::{BudgetAccountant, BudgetRequest};
use crate::ledger::{AggregationLimit, BudgetLedger};

/// Splits (epsilon, delta) across mechanisms in proportion to their weights.
///
/// Each mechanism receives `total_epsilon * weight / sum(weight * count)`,
/// and delta-consuming mechanisms receive the analogous share of delta. No
/// noise standard deviation is produced.
#[derive(Debug)]
pub struct NaiveBudgetAccountant {
    ledger: BudgetLedger,
}

impl NaiveBudgetAccountant {
    /// Create an accountant without aggregation constraints.
    pub fn new(total_epsilon: f64, total_delta: f64) -> Result<Self> {
        Self::with_aggregations(total_epsilon, total_delta, AggregationLimit::Unconstrained)
    }

    /// Create an accountant with declared aggregations.
    pub fn with_aggregations(
        total_epsilon: f64,
        total_delta: f64,
        aggregations: AggregationLimit,
    ) -> Result<Self> {
        Ok(Self {
            ledger: BudgetLedger::new(total_epsilon, total_delta, aggregations)?,
        })
    }
}

impl BudgetAccountant for NaiveBudgetAccountant {
    fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut BudgetLedger {
        &mut self.ledger
    }

    fn request_budget(&mut self, request: BudgetRequest) -> Result<MechanismSpec> {
        self.ledger.register_request(&request)
    }

    fn compute_budgets(&mut self) -> Result<()> {
        if !self.ledger.finalize()? {
            return Ok(());
        }

        let mechanisms = self.ledger.mechanisms();
        let mut total_weight_eps = 0.0;
        let mut total_weight_delta = 0.0;
        for mechanism in mechanisms {
            let share = mechanism.weight * mechanism.spec.count() as f64;
            total_weight_eps += share;
            if mechanism.spec.use_delta() {
                total_weight_delta += share;
            }
        }

        let total_epsilon = self.ledger.total_epsilon();
        let total_delta = self.ledger.total_delta();
        for mechanism in mechanisms {
            let eps = if total_weight_eps > 0.0 {
                total_epsilon * mechanism.weight / total_weight_eps
            } else {
                0.0
            };
            let delta = if mechanism.spec.use_delta() && total_weight_delta > 0.0 {
                total_delta * mechanism.weight / total_weight_delta
            } else {
                0.0
            };
            mechanism.resolve(CalibratedBudget::from_eps_delta(eps, delta))?;
        }
        tracing::debug!(
            mechanisms = mechanisms.len(),
            total_weight_eps,
            total_weight_delta,
            "split budget proportionally"
        );
        Ok(())
    }
}
