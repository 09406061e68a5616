//! Mechanism descriptors handed back to callers that request a budget.
//!
//! A [`MechanismSpec`] is created while the accountant is still collecting
//! requests and is resolved in place when the accountant finalizes. Clones
//! share the same budget cell, so a handle kept by the caller observes the
//! values written by the accountant.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{DpError, Result};

/// Kind of noise distribution a mechanism uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MechanismType {
    /// Laplace noise. Pure epsilon-DP, does not consume delta.
    Laplace,
    /// Gaussian noise. Requires delta > 0.
    Gaussian,
    /// Any mechanism described only by its (epsilon, delta) guarantee.
    Generic,
}

impl MechanismType {
    /// Whether the mechanism consumes part of the delta budget.
    pub fn uses_delta(self) -> bool {
        !matches!(self, MechanismType::Laplace)
    }
}

impl fmt::Display for MechanismType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MechanismType::Laplace => "laplace",
            MechanismType::Gaussian => "gaussian",
            MechanismType::Generic => "generic",
        };
        f.pad(name)
    }
}

/// Budget values written for one mechanism when its accountant finalizes.
///
/// Strategies fill in different subsets: the proportional split writes
/// `eps`/`delta` only, the PLD split writes the noise and, for generic
/// mechanisms, `eps`/`delta` as well.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CalibratedBudget {
    /// Calibrated noise standard deviation.
    pub noise_standard_deviation: Option<f64>,
    /// Epsilon of the (epsilon, delta)-DP guarantee.
    pub eps: Option<f64>,
    /// Delta of the (epsilon, delta)-DP guarantee.
    pub delta: Option<f64>,
}

impl CalibratedBudget {
    /// A budget carrying only an (epsilon, delta) pair.
    pub fn from_eps_delta(eps: f64, delta: f64) -> Self {
        Self {
            noise_standard_deviation: None,
            eps: Some(eps),
            delta: Some(delta),
        }
    }

    /// A budget carrying only a noise standard deviation.
    pub fn from_noise(noise_standard_deviation: f64) -> Self {
        Self {
            noise_standard_deviation: Some(noise_standard_deviation),
            eps: None,
            delta: None,
        }
    }

    /// Attach an (epsilon, delta) pair.
    pub fn with_eps_delta(mut self, eps: f64, delta: f64) -> Self {
        self.eps = Some(eps);
        self.delta = Some(delta);
        self
    }
}

/// Resolution state of a [`MechanismSpec`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BudgetState<'a> {
    /// The accountant has not finalized yet.
    Pending,
    /// The accountant has written the budget.
    Resolved(&'a CalibratedBudget),
}

/// Caller-visible handle for one requested mechanism.
///
/// Handles are read-only. The budget is written through the
/// [`BudgetWriter`] returned alongside the handle, which the accountant
/// keeps to itself:
///
/// ```compile_fail
/// use dp_budget_core::{CalibratedBudget, MechanismSpec, MechanismType};
///
/// let (spec, _writer) = MechanismSpec::pending(MechanismType::Laplace, 1);
/// spec.resolve(CalibratedBudget::from_eps_delta(1.0, 0.0));
/// ```
#[derive(Clone, Debug)]
pub struct MechanismSpec {
    mechanism_type: MechanismType,
    count: usize,
    budget: Arc<OnceLock<CalibratedBudget>>,
}

impl MechanismSpec {
    /// Create a pending descriptor applied `count` times, and its writer.
    pub fn pending(mechanism_type: MechanismType, count: usize) -> (Self, BudgetWriter) {
        let budget = Arc::new(OnceLock::new());
        let writer = BudgetWriter {
            budget: Arc::clone(&budget),
        };
        let spec = Self {
            mechanism_type,
            count,
            budget,
        };
        (spec, writer)
    }

    /// Kind of noise the mechanism uses.
    pub fn mechanism_type(&self) -> MechanismType {
        self.mechanism_type
    }

    /// Number of times the mechanism is applied.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the mechanism consumes part of the delta budget.
    pub fn use_delta(&self) -> bool {
        self.mechanism_type.uses_delta()
    }

    /// Current resolution state.
    pub fn state(&self) -> BudgetState<'_> {
        match self.budget.get() {
            Some(budget) => BudgetState::Resolved(budget),
            None => BudgetState::Pending,
        }
    }

    /// Whether the accountant has written this mechanism's budget.
    pub fn is_resolved(&self) -> bool {
        self.budget.get().is_some()
    }

    /// Calibrated noise standard deviation.
    pub fn noise_standard_deviation(&self) -> Result<f64> {
        self.field("noise standard deviation", |b| b.noise_standard_deviation)
    }

    /// Epsilon of the mechanism's (epsilon, delta)-DP guarantee.
    pub fn eps(&self) -> Result<f64> {
        self.field("eps", |b| b.eps)
    }

    /// Delta of the mechanism's (epsilon, delta)-DP guarantee.
    pub fn delta(&self) -> Result<f64> {
        self.field("delta", |b| b.delta)
    }

    fn field(
        &self,
        field: &'static str,
        get: impl Fn(&CalibratedBudget) -> Option<f64>,
    ) -> Result<f64> {
        self.budget
            .get()
            .and_then(get)
            .ok_or(DpError::UncomputedBudget { field })
    }
}

/// Sole write access to one [`MechanismSpec`]'s budget.
///
/// Not `Clone`: exactly one owner, normally the accountant that created the
/// mechanism.
#[derive(Debug)]
pub struct BudgetWriter {
    budget: Arc<OnceLock<CalibratedBudget>>,
}

impl BudgetWriter {
    /// Write the budget. Succeeds at most once per mechanism.
    pub fn resolve(&self, budget: CalibratedBudget) -> Result<()> {
        self.budget.set(budget).map_err(|_| DpError::AlreadyResolved)
    }

    /// Whether this writer belongs to `spec`.
    pub fn writes_to(&self, spec: &MechanismSpec) -> bool {
        Arc::ptr_eq(&self.budget, &spec.budget)
    }
}
