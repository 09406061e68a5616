//! Scoped budget splitting.
//!
//! A [`BudgetScope`] is a guard: it pushes a scope on creation and pops it on
//! drop, rescaling the weights of every mechanism registered inside it so
//! they sum to the scope's weight. Drop also runs while unwinding, and the
//! borrow it holds forces scopes to close in reverse order of opening.

use std::ops::{Deref, DerefMut};

use dp_budget_core::{DpError, Result};

use crate::accountant::BudgetAccountant;
use crate::ledger::ScopeInfo;

/// An open budget scope borrowing its accountant.
///
/// The guard dereferences to the accountant, so requests and nested scopes
/// are made through it:
///
/// ```
/// use dp_budget_accounting::{BudgetAccountant, NaiveBudgetAccountant};
/// use dp_budget_core::MechanismType;
///
/// let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6)?;
/// {
///     let mut outer = accountant.scope(1.0)?;
///     let mut inner = outer.scope(0.5)?;
///     inner.request(MechanismType::Laplace)?;
/// }
/// accountant.compute_budgets()?;
/// # Ok::<(), dp_budget_core::DpError>(())
/// ```
#[derive(Debug)]
pub struct BudgetScope<'a, A: BudgetAccountant> {
    accountant: &'a mut A,
    info: ScopeInfo,
}

impl<'a, A: BudgetAccountant> BudgetScope<'a, A> {
    pub(crate) fn enter(
        accountant: &'a mut A,
        weight: f64,
        aggregation_scope: bool,
    ) -> Result<Self> {
        let info = accountant
            .ledger_mut()
            .open_scope(weight, aggregation_scope)?;
        Ok(Self { accountant, info })
    }

    /// Weight of this scope relative to its siblings.
    pub fn weight(&self) -> f64 {
        self.info.weight
    }

    /// Index among aggregation scopes, for aggregation scopes only.
    pub fn aggregation_index(&self) -> Option<usize> {
        self.info.aggregation_index
    }

    /// Whether this is an aggregation scope.
    pub fn is_aggregation_scope(&self) -> bool {
        self.info.aggregation_index.is_some()
    }

    /// Epsilon reserved for this aggregation.
    pub fn epsilon(&self) -> Result<f64> {
        self.aggregation_budget().map(|(eps, _)| eps)
    }

    /// Delta reserved for this aggregation.
    pub fn delta(&self) -> Result<f64> {
        self.aggregation_budget().map(|(_, delta)| delta)
    }

    /// Close the scope now instead of at the end of the enclosing block.
    pub fn close(self) {}

    fn aggregation_budget(&self) -> Result<(f64, f64)> {
        if self.info.aggregation_index.is_none() {
            return Err(DpError::ScopeBudgetUnavailable {
                msg: "only aggregation scopes have a computed budget".into(),
            });
        }
        self.info.aggregation_budget.ok_or_else(|| DpError::ScopeBudgetUnavailable {
            msg: "the budget per aggregation can not be computed; \
                  declare 'n_aggregations' or 'aggregation_weights' on the accountant"
                .into(),
        })
    }
}

impl<A: BudgetAccountant> Deref for BudgetScope<'_, A> {
    type Target = A;

    fn deref(&self) -> &A {
        self.accountant
    }
}

impl<A: BudgetAccountant> DerefMut for BudgetScope<'_, A> {
    fn deref_mut(&mut self) -> &mut A {
        self.accountant
    }
}

impl<A: BudgetAccountant> Drop for BudgetScope<'_, A> {
    fn drop(&mut self) {
        self.accountant.ledger_mut().close_scope();
    }
}
