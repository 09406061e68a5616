//! Composition-calibrated budget split.
//!
//! All mechanisms share one scalar, the minimum noise standard deviation.
//! Each mechanism's noise is that scalar times `sensitivity / weight`, and
//! the scalar is the smallest value for which the composition of every
//! mechanism's privacy loss distribution stays within the total budget.

use std::f64::consts::SQRT_2;

use dp_budget_core::{CalibratedBudget, DpError, MechanismSpec, MechanismType, Result};

use crate::accountant::{BudgetAccountant, BudgetRequest};
use crate::calibrate::{calibrate_minimum_noise, NOISE_SEARCH_TOLERANCE};
use crate::composer::DistributionComposer;
use crate::ledger::{AggregationLimit, BudgetLedger, MechanismSpecInternal};

/// Default `pld_discretization`.
pub const DEFAULT_PLD_DISCRETIZATION: f64 = 1e-4;

/// Calibrates noise so the composed privacy loss meets the total budget.
///
/// Requests must have `count == 1`.
///
/// Generic mechanisms have no noise distribution of their own. They are
/// calibrated as if they were Laplace mechanisms: at noise `sigma` a generic
/// mechanism is charged `epsilon_0 = sqrt(2) / sigma` and
/// `delta_0 = epsilon_0 / total_epsilon * total_delta`. This is an
/// approximation of the mechanism's real privacy curve.
#[derive(Debug)]
pub struct PldBudgetAccountant<C> {
    ledger: BudgetLedger,
    composer: C,
    pld_discretization: f64,
    minimum_noise_std: Option<f64>,
}

impl<C: DistributionComposer> PldBudgetAccountant<C> {
    /// Create an accountant without aggregation constraints.
    pub fn with_composer(total_epsilon: f64, total_delta: f64, composer: C) -> Result<Self> {
        Self::with_aggregations(
            total_epsilon,
            total_delta,
            AggregationLimit::Unconstrained,
            composer,
        )
    }

    /// Create an accountant with declared aggregations.
    pub fn with_aggregations(
        total_epsilon: f64,
        total_delta: f64,
        aggregations: AggregationLimit,
        composer: C,
    ) -> Result<Self> {
        Ok(Self {
            ledger: BudgetLedger::new(total_epsilon, total_delta, aggregations)?,
            composer,
            pld_discretization: DEFAULT_PLD_DISCRETIZATION,
            minimum_noise_std: None,
        })
    }

    /// Set the discretization interval passed to every PLD construction.
    ///
    /// Smaller intervals are more accurate and slower.
    pub fn with_pld_discretization(mut self, pld_discretization: f64) -> Result<Self> {
        if !pld_discretization.is_finite() || pld_discretization <= 0.0 {
            return Err(DpError::invalid(format!(
                "pld_discretization must be positive, got {pld_discretization}"
            )));
        }
        self.pld_discretization = pld_discretization;
        Ok(self)
    }

    /// Discretization interval passed to every PLD construction.
    pub fn pld_discretization(&self) -> f64 {
        self.pld_discretization
    }

    /// The calibrated minimum noise, once `compute_budgets()` has run.
    pub fn minimum_noise_std(&self) -> Option<f64> {
        self.minimum_noise_std
    }

    /// Composed epsilon at the total delta if every mechanism used `noise_std`.
    pub fn epsilon_for_noise(&self, noise_std: f64) -> Result<f64> {
        match self.compose_distributions(noise_std)? {
            Some(pld) => Ok(self
                .composer
                .epsilon_for_delta(&pld, self.ledger.total_delta())),
            None => Ok(0.0),
        }
    }

    fn compose_distributions(&self, noise_std: f64) -> Result<Option<C::Distribution>> {
        let mut composed: Option<C::Distribution> = None;
        for mechanism in self.ledger.mechanisms() {
            let Some(pld) = self.mechanism_distribution(mechanism, noise_std)? else {
                continue;
            };
            composed = Some(match composed {
                Some(acc) => self.composer.compose(&acc, &pld)?,
                None => pld,
            });
        }
        Ok(composed)
    }

    /// `None` when the mechanism leaks nothing: zero sensitivity or infinite noise.
    fn mechanism_distribution(
        &self,
        mechanism: &MechanismSpecInternal,
        noise_std: f64,
    ) -> Result<Option<C::Distribution>> {
        let interval = self.pld_discretization;
        let scaled = mechanism_noise(mechanism, noise_std);
        let leaks = scaled > 0.0 && scaled.is_finite();
        match mechanism.mechanism_type() {
            MechanismType::Laplace if leaks => {
                self.composer.laplace(scaled / SQRT_2, interval).map(Some)
            }
            MechanismType::Gaussian if leaks => self.composer.gaussian(scaled, interval).map(Some),
            MechanismType::Laplace | MechanismType::Gaussian => Ok(None),
            MechanismType::Generic => {
                let (epsilon_0, delta_0) = self.generic_parameters(noise_std);
                self.composer
                    .privacy_parameters(epsilon_0, delta_0, interval)
                    .map(Some)
            }
        }
    }

    fn generic_parameters(&self, noise_std: f64) -> (f64, f64) {
        if noise_std == 0.0 {
            // Only reachable for zero sensitivity, which releases nothing.
            return (0.0, 0.0);
        }
        let epsilon_0 = SQRT_2 / noise_std;
        let delta_0 = epsilon_0 / self.ledger.total_epsilon() * self.ledger.total_delta();
        (epsilon_0, delta_0)
    }

    fn find_minimum_noise_std(&self) -> Result<f64> {
        let total_epsilon = self.ledger.total_epsilon();
        if self.ledger.total_delta() == 0.0 {
            // Pure epsilon composes additively.
            let sum_weights: f64 = self.ledger.mechanisms().iter().map(|m| m.weight).sum();
            return Ok(sum_weights / total_epsilon * SQRT_2);
        }
        let bracket = calibrate_minimum_noise(
            |noise_std| self.epsilon_for_noise(noise_std),
            total_epsilon,
            NOISE_SEARCH_TOLERANCE,
        )?;
        Ok(bracket.high)
    }
}

#[cfg(feature = "pld")]
impl PldBudgetAccountant<crate::pld::PldComposer> {
    /// Create an accountant backed by the built-in PLD library.
    pub fn new(total_epsilon: f64, total_delta: f64) -> Result<Self> {
        Self::with_composer(total_epsilon, total_delta, crate::pld::PldComposer::new())
    }
}

impl<C: DistributionComposer> BudgetAccountant for PldBudgetAccountant<C> {
    fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut BudgetLedger {
        &mut self.ledger
    }

    fn request_budget(&mut self, request: BudgetRequest) -> Result<MechanismSpec> {
        if self.ledger.is_finalized() {
            return Err(DpError::Finalized);
        }
        if request.count != 1 {
            return Err(DpError::unsupported(format!(
                "count={} is not supported by the PLD accountant; only count=1 is",
                request.count
            )));
        }
        self.ledger.register_request(&request)
    }

    fn compute_budgets(&mut self) -> Result<()> {
        self.ledger.check_finalize()?;
        let mechanisms = self.ledger.mechanisms();
        if !mechanisms.is_empty() && mechanisms.iter().all(|m| m.weight == 0.0) {
            return Err(DpError::invalid(
                "all mechanism weights are zero; the noise can not be calibrated",
            ));
        }
        if !self.ledger.finalize()? {
            return Ok(());
        }

        let minimum_noise_std = self.find_minimum_noise_std()?;
        self.minimum_noise_std = Some(minimum_noise_std);
        tracing::debug!(
            minimum_noise_std,
            mechanisms = self.ledger.mechanism_count(),
            "calibrated minimum noise"
        );

        for mechanism in self.ledger.mechanisms() {
            let noise_std = mechanism_noise(mechanism, minimum_noise_std);
            let mut budget = CalibratedBudget::from_noise(noise_std);
            if mechanism.mechanism_type() == MechanismType::Generic {
                let (epsilon_0, delta_0) = self.generic_parameters(noise_std);
                budget = budget.with_eps_delta(epsilon_0, delta_0);
            }
            mechanism.resolve(budget)?;
        }
        Ok(())
    }
}

/// `sensitivity * noise_std / weight`, with the 0/0 case taken as noiseless.
fn mechanism_noise(mechanism: &MechanismSpecInternal, noise_std: f64) -> f64 {
    if mechanism.sensitivity == 0.0 {
        0.0
    } else if mechanism.weight == 0.0 {
        f64::INFINITY
    } else {
        mechanism.sensitivity * noise_std / mechanism.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Composer whose epsilon is the sum of per-mechanism pure epsilons.
    ///
    /// A Laplace mechanism with scale `b` costs `1 / b`, a Gaussian with
    /// standard deviation `s` costs `2 / s`, and (epsilon, delta) pairs
    /// cost their epsilon.
    #[derive(Clone, Copy, Debug, Default)]
    struct AdditiveComposer;

    impl DistributionComposer for AdditiveComposer {
        type Distribution = f64;

        fn laplace(&self, parameter: f64, _: f64) -> Result<f64> {
            Ok(1.0 / parameter)
        }

        fn gaussian(&self, standard_deviation: f64, _: f64) -> Result<f64> {
            Ok(2.0 / standard_deviation)
        }

        fn privacy_parameters(&self, epsilon: f64, _: f64, _: f64) -> Result<f64> {
            Ok(epsilon)
        }

        fn compose(&self, first: &f64, second: &f64) -> Result<f64> {
            Ok(first + second)
        }

        fn epsilon_for_delta(&self, distribution: &f64, _: f64) -> f64 {
            *distribution
        }
    }

    fn accountant(total_epsilon: f64, total_delta: f64) -> PldBudgetAccountant<AdditiveComposer> {
        PldBudgetAccountant::with_composer(total_epsilon, total_delta, AdditiveComposer).unwrap()
    }

    #[test]
    fn pure_epsilon_closed_form() {
        let mut acc = accountant(2.0, 0.0);
        let spec = acc.request(MechanismType::Laplace).unwrap();
        acc.compute_budgets().unwrap();

        let expected = SQRT_2 / 2.0;
        assert!((acc.minimum_noise_std().unwrap() - expected).abs() < 1e-12);
        assert!((spec.noise_standard_deviation().unwrap() - expected).abs() < 1e-12);
        // Only generic mechanisms receive an (epsilon, delta) pair.
        assert!(spec.eps().is_err());
    }

    #[test]
    fn pure_epsilon_closed_form_for_generic() {
        let mut acc = accountant(1.0, 0.0);
        let spec = acc.request(MechanismType::Generic).unwrap();
        acc.compute_budgets().unwrap();

        let noise = spec.noise_standard_deviation().unwrap();
        assert!((noise - SQRT_2).abs() < 1e-12);
        assert!((spec.eps().unwrap() - SQRT_2 / noise).abs() < 1e-12);
        assert!((spec.eps().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(spec.delta().unwrap(), 0.0);
    }

    #[test]
    fn search_meets_target_within_tolerance() {
        let mut acc = accountant(1.0, 1e-6);
        acc.request(MechanismType::Laplace).unwrap();
        acc.request(MechanismType::Gaussian).unwrap();
        acc.compute_budgets().unwrap();

        // eps(sigma) = sqrt(2) / sigma + 2 / sigma.
        let root = SQRT_2 + 2.0;
        let sigma = acc.minimum_noise_std().unwrap();
        assert!(sigma >= root && sigma - root <= NOISE_SEARCH_TOLERANCE);
        assert!(acc.epsilon_for_noise(sigma).unwrap() <= 1.0);
    }

    #[test]
    fn per_mechanism_noise_scales_with_sensitivity_over_weight() {
        let mut acc = accountant(1.0, 1e-6);
        let heavy = acc
            .request_budget(BudgetRequest::new(MechanismType::Gaussian).with_weight(3.0))
            .unwrap();
        let sensitive = acc
            .request_budget(BudgetRequest::new(MechanismType::Gaussian).with_sensitivity(2.0))
            .unwrap();
        acc.compute_budgets().unwrap();

        let sigma = acc.minimum_noise_std().unwrap();
        assert!((heavy.noise_standard_deviation().unwrap() - sigma / 3.0).abs() < 1e-12);
        assert!((sensitive.noise_standard_deviation().unwrap() - 2.0 * sigma).abs() < 1e-12);
    }

    #[test]
    fn generic_mechanisms_get_laplace_equivalent_budget() {
        let mut acc = accountant(1.0, 1e-6);
        let spec = acc.request(MechanismType::Generic).unwrap();
        acc.compute_budgets().unwrap();

        let noise = spec.noise_standard_deviation().unwrap();
        let eps = spec.eps().unwrap();
        assert!((eps - SQRT_2 / noise).abs() < 1e-12);
        assert!((spec.delta().unwrap() - eps * 1e-6).abs() < 1e-18);
        assert!(eps <= 1.0);
    }

    #[test]
    fn zero_weight_mechanisms_are_skipped_in_composition() {
        let mut acc = accountant(1.0, 1e-6);
        let silent = acc
            .request_budget(BudgetRequest::new(MechanismType::Laplace).with_weight(0.0))
            .unwrap();
        acc.request(MechanismType::Laplace).unwrap();
        acc.compute_budgets().unwrap();
        assert_eq!(silent.noise_standard_deviation().unwrap(), f64::INFINITY);
    }

    #[test]
    fn zero_sensitivity_mechanisms_are_free() {
        let mut acc = accountant(1.0, 1e-6);
        let free = acc
            .request_budget(BudgetRequest::new(MechanismType::Gaussian).with_sensitivity(0.0))
            .unwrap();
        acc.request(MechanismType::Laplace).unwrap();
        // Only the Laplace mechanism contributes: eps(sigma) = sqrt(2) / sigma.
        assert!((acc.epsilon_for_noise(4.0).unwrap() - SQRT_2 / 4.0).abs() < 1e-12);
        acc.compute_budgets().unwrap();
        assert_eq!(free.noise_standard_deviation().unwrap(), 0.0);
    }

    #[test]
    fn zero_sensitivity_and_zero_weight_is_noiseless() {
        let mut acc = accountant(1.0, 1e-6);
        let silent = acc
            .request_budget(
                BudgetRequest::new(MechanismType::Laplace)
                    .with_weight(0.0)
                    .with_sensitivity(0.0),
            )
            .unwrap();
        let generic = acc
            .request_budget(
                BudgetRequest::new(MechanismType::Generic)
                    .with_weight(0.0)
                    .with_sensitivity(0.0),
            )
            .unwrap();
        acc.request(MechanismType::Laplace).unwrap();
        acc.compute_budgets().unwrap();

        assert_eq!(silent.noise_standard_deviation().unwrap(), 0.0);
        assert_eq!(generic.noise_standard_deviation().unwrap(), 0.0);
        assert_eq!(generic.eps().unwrap(), 0.0);
        assert_eq!(generic.delta().unwrap(), 0.0);
    }

    #[test]
    fn all_zero_weights_fail_without_finalizing() {
        let mut acc = accountant(1.0, 1e-6);
        let spec = acc
            .request_budget(BudgetRequest::new(MechanismType::Laplace).with_weight(0.0))
            .unwrap();
        for _ in 0..2 {
            assert!(matches!(
                acc.compute_budgets(),
                Err(DpError::InvalidParameters { .. })
            ));
        }
        assert!(!acc.ledger().is_finalized());
        assert!(!spec.is_resolved());

        // The accountant is still usable once a weighted mechanism exists.
        acc.request(MechanismType::Laplace).unwrap();
        acc.compute_budgets().unwrap();
        assert_eq!(spec.noise_standard_deviation().unwrap(), f64::INFINITY);
    }

    #[test]
    fn count_must_be_one() {
        let mut acc = accountant(1.0, 1e-6);
        let err = acc
            .request_budget(BudgetRequest::new(MechanismType::Laplace).with_count(2))
            .unwrap_err();
        assert!(matches!(err, DpError::UnsupportedFeature { .. }));
    }

    #[test]
    fn requests_after_finalize_fail() {
        let mut acc = accountant(1.0, 1e-6);
        acc.request(MechanismType::Laplace).unwrap();
        acc.compute_budgets().unwrap();
        let err = acc
            .request_budget(BudgetRequest::new(MechanismType::Laplace).with_count(2))
            .unwrap_err();
        assert_eq!(err, DpError::Finalized);
        assert_eq!(acc.compute_budgets(), Err(DpError::AlreadyFinalized));
    }

    #[test]
    fn discretization_is_validated() {
        assert!(accountant(1.0, 0.0).with_pld_discretization(0.0).is_err());
        let acc = accountant(1.0, 0.0).with_pld_discretization(1e-3).unwrap();
        assert_eq!(acc.pld_discretization(), 1e-3);
    }
}
