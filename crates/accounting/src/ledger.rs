//! Shared bookkeeping behind every budget accountant.
//!
//! The ledger owns the mechanism registry as an arena. Open scopes refer to
//! mechanisms by index, so the weight rescaling done when a scope closes has
//! a single owner.

use dp_budget_core::{BudgetWriter, CalibratedBudget, DpError, MechanismSpec, MechanismType, Result};

use crate::accountant::BudgetRequest;

/// Declared constraint on the aggregation scopes an accountant will see.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AggregationLimit {
    /// Any number of aggregation scopes, with no eager per-scope budget.
    #[default]
    Unconstrained,
    /// Exactly this many aggregation scopes, all with weight 1.
    Count(usize),
    /// One aggregation scope per entry, each with exactly that weight.
    Weights(Vec<f64>),
}

impl AggregationLimit {
    /// Build from the two optional, mutually exclusive caller inputs.
    pub fn from_options(
        n_aggregations: Option<usize>,
        aggregation_weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        match (n_aggregations, aggregation_weights) {
            (Some(_), Some(_)) => Err(DpError::invalid(
                "'n_aggregations' and 'aggregation_weights' can not be set simultaneously",
            )),
            (Some(0), None) => Err(DpError::invalid(
                "'n_aggregations'=0, but it has to be positive",
            )),
            (Some(n), None) => Ok(Self::Count(n)),
            (None, Some(weights)) => {
                if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                    return Err(DpError::invalid(
                        "'aggregation_weights' must be finite and positive",
                    ));
                }
                Ok(Self::Weights(weights))
            }
            (None, None) => Ok(Self::Unconstrained),
        }
    }

    /// Number of aggregation scopes the accountant must see, if declared.
    pub fn declared(&self) -> Option<usize> {
        match self {
            Self::Unconstrained => None,
            Self::Count(n) => Some(*n),
            Self::Weights(weights) => Some(weights.len()),
        }
    }

    /// Share of the total budget owned by the aggregation at `index`.
    fn budget_ratio(&self, index: usize) -> Option<f64> {
        match self {
            Self::Unconstrained => None,
            Self::Count(n) => Some(1.0 / *n as f64),
            Self::Weights(weights) => {
                let sum: f64 = weights.iter().sum();
                weights.get(index).map(|w| w / sum)
            }
        }
    }

    fn check_next(&self, index: usize, weight: f64) -> Result<()> {
        match self {
            Self::Unconstrained => Ok(()),
            Self::Count(n) => {
                if index >= *n {
                    return Err(DpError::scope(
                        "exceeded the number of allowed aggregations; \
                         increase 'n_aggregations' if more are needed",
                    ));
                }
                if weight != 1.0 {
                    return Err(DpError::scope(format!(
                        "when 'n_aggregations' is set all aggregation weights have to be 1, \
                         but weight={weight}"
                    )));
                }
                Ok(())
            }
            Self::Weights(weights) => {
                let expected = weights.get(index).copied().ok_or_else(|| {
                    DpError::scope(
                        "exceeded the number of allowed aggregations; \
                         extend 'aggregation_weights' if more are needed",
                    )
                })?;
                if weight != expected {
                    return Err(DpError::scope(format!(
                        "the weight of aggregation {index} is {weight}, \
                         but 'aggregation_weights' declares {expected}"
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Accounting record for one mechanism. Never exposed to callers.
#[derive(Debug)]
pub(crate) struct MechanismSpecInternal {
    pub(crate) sensitivity: f64,
    pub(crate) weight: f64,
    pub(crate) spec: MechanismSpec,
    writer: BudgetWriter,
}

impl MechanismSpecInternal {
    pub(crate) fn mechanism_type(&self) -> MechanismType {
        self.spec.mechanism_type()
    }

    pub(crate) fn resolve(&self, budget: CalibratedBudget) -> Result<()> {
        self.writer.resolve(budget)
    }
}

/// Immutable description of an open scope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ScopeInfo {
    pub(crate) weight: f64,
    pub(crate) aggregation_index: Option<usize>,
    pub(crate) aggregation_budget: Option<(f64, f64)>,
}

#[derive(Clone, Debug)]
struct ScopeFrame {
    info: ScopeInfo,
    mechanisms: Vec<usize>,
}

/// Registry, scope stack and lifecycle state shared by all accountants.
#[derive(Debug)]
pub struct BudgetLedger {
    total_epsilon: f64,
    total_delta: f64,
    aggregations: AggregationLimit,
    mechanisms: Vec<MechanismSpecInternal>,
    scopes_stack: Vec<ScopeFrame>,
    next_aggregation_index: usize,
    inside_aggregation_scope: bool,
    finalized: bool,
}

impl BudgetLedger {
    /// Create a ledger for a total (epsilon, delta) budget.
    pub fn new(
        total_epsilon: f64,
        total_delta: f64,
        aggregations: AggregationLimit,
    ) -> Result<Self> {
        validate_epsilon_delta(total_epsilon, total_delta)?;
        Ok(Self {
            total_epsilon,
            total_delta,
            aggregations,
            mechanisms: Vec::new(),
            scopes_stack: Vec::new(),
            next_aggregation_index: 0,
            inside_aggregation_scope: false,
            finalized: false,
        })
    }

    /// Epsilon for the whole pipeline.
    pub fn total_epsilon(&self) -> f64 {
        self.total_epsilon
    }

    /// Delta for the whole pipeline.
    pub fn total_delta(&self) -> f64 {
        self.total_delta
    }

    /// Declared aggregation constraint.
    pub fn aggregations(&self) -> &AggregationLimit {
        &self.aggregations
    }

    /// Whether `compute_budgets()` has completed.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Number of scopes currently open.
    pub fn open_scopes(&self) -> usize {
        self.scopes_stack.len()
    }

    /// Number of aggregation scopes opened so far.
    pub fn aggregation_count(&self) -> usize {
        self.next_aggregation_index
    }

    /// Number of mechanisms registered so far.
    pub fn mechanism_count(&self) -> usize {
        self.mechanisms.len()
    }

    /// Current mechanism weights in registration order.
    ///
    /// Once every scope has closed these are the absolute budget shares.
    pub fn mechanism_weights(&self) -> Vec<f64> {
        self.mechanisms.iter().map(|m| m.weight).collect()
    }

    pub(crate) fn mechanisms(&self) -> &[MechanismSpecInternal] {
        &self.mechanisms
    }

    /// Validate a request and register the resulting mechanism.
    pub(crate) fn register_request(&mut self, request: &BudgetRequest) -> Result<MechanismSpec> {
        if self.finalized {
            return Err(DpError::Finalized);
        }
        if request.noise_standard_deviation.is_some() {
            return Err(DpError::unsupported(
                "pre-specified noise standard deviation is not supported",
            ));
        }
        if request.mechanism_type == MechanismType::Gaussian && self.total_delta == 0.0 {
            return Err(DpError::invalid(
                "the Gaussian mechanism requires that the pipeline delta is greater than 0",
            ));
        }
        if request.count == 0 {
            return Err(DpError::invalid("mechanism count must be at least 1"));
        }
        if !request.sensitivity.is_finite() || request.sensitivity < 0.0 {
            return Err(DpError::invalid(format!(
                "sensitivity must be finite and non-negative, got {}",
                request.sensitivity
            )));
        }
        if !request.weight.is_finite() || request.weight < 0.0 {
            return Err(DpError::invalid(format!(
                "mechanism weight must be finite and non-negative, got {}",
                request.weight
            )));
        }

        let (spec, writer) = MechanismSpec::pending(request.mechanism_type, request.count);
        let index = self.mechanisms.len();
        self.mechanisms.push(MechanismSpecInternal {
            sensitivity: request.sensitivity,
            weight: request.weight,
            spec: spec.clone(),
            writer,
        });
        // A mechanism belongs to every scope that is open right now.
        for scope in &mut self.scopes_stack {
            scope.mechanisms.push(index);
        }
        Ok(spec)
    }

    /// Validate and push a new scope.
    pub(crate) fn open_scope(&mut self, weight: f64, aggregation_scope: bool) -> Result<ScopeInfo> {
        if self.finalized {
            return Err(DpError::Finalized);
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(DpError::invalid(format!(
                "scope weight must be finite and non-negative, got {weight}"
            )));
        }

        let mut info = ScopeInfo {
            weight,
            aggregation_index: None,
            aggregation_budget: None,
        };
        if aggregation_scope {
            if self.inside_aggregation_scope {
                return Err(DpError::scope("aggregation scopes can not be nested"));
            }
            let index = self.next_aggregation_index;
            self.aggregations.check_next(index, weight)?;
            info.aggregation_index = Some(index);
            info.aggregation_budget = self
                .aggregations
                .budget_ratio(index)
                .map(|ratio| (self.total_epsilon * ratio, self.total_delta * ratio));
            self.next_aggregation_index += 1;
            self.inside_aggregation_scope = true;
        }

        self.scopes_stack.push(ScopeFrame {
            info,
            mechanisms: Vec::new(),
        });
        Ok(info)
    }

    /// Pop the innermost scope and normalize the weights registered under it.
    pub(crate) fn close_scope(&mut self) {
        let Some(frame) = self.scopes_stack.pop() else {
            return;
        };
        if frame.info.aggregation_index.is_some() {
            self.inside_aggregation_scope = false;
        }

        let total: f64 = frame
            .mechanisms
            .iter()
            .map(|&i| self.mechanisms[i].weight)
            .sum();
        if total == 0.0 {
            return;
        }
        let factor = frame.info.weight / total;
        for &i in &frame.mechanisms {
            self.mechanisms[i].weight *= factor;
        }
        tracing::debug!(
            scope_weight = frame.info.weight,
            mechanisms = frame.mechanisms.len(),
            factor,
            "normalized mechanism weights on scope exit"
        );
    }

    /// Check the finalize preconditions without changing any state.
    pub(crate) fn check_finalize(&self) -> Result<()> {
        if self.finalized {
            return Err(DpError::AlreadyFinalized);
        }
        if !self.scopes_stack.is_empty() {
            return Err(DpError::scope(
                "cannot call compute_budgets() from within a budget scope",
            ));
        }
        if let Some(expected) = self.aggregations.declared() {
            if expected != self.next_aggregation_index {
                return Err(DpError::AggregationCountMismatch {
                    expected,
                    actual: self.next_aggregation_index,
                });
            }
        }
        Ok(())
    }

    /// Check the finalize preconditions and mark the ledger finalized.
    ///
    /// Returns `false` when there is nothing to calibrate.
    pub(crate) fn finalize(&mut self) -> Result<bool> {
        self.check_finalize()?;
        self.finalized = true;

        if self.mechanisms.is_empty() {
            tracing::warn!("no budgets were requested");
            return Ok(false);
        }
        Ok(true)
    }
}

fn validate_epsilon_delta(epsilon: f64, delta: f64) -> Result<()> {
    if !epsilon.is_finite() || epsilon <= 0.0 {
        return Err(DpError::invalid(format!(
            "epsilon must be positive and finite, not {epsilon}"
        )));
    }
    if !delta.is_finite() || delta < 0.0 {
        return Err(DpError::invalid(format!(
            "delta must be non-negative and finite, not {delta}"
        )));
    }
    Ok(())
}
