//! Discretized privacy loss distributions (PLDs).
//!
//! Distributions are pessimistic: every privacy loss is rounded up to the
//! next multiple of the discretization interval, and truncated mass is moved
//! to the infinite-loss bucket. Supported constructions are the Laplace and
//! Gaussian mechanisms with sensitivity 1 and generic (epsilon, delta)-DP
//! mechanisms. All of them are symmetric under add/remove adjacency, so a
//! single PMF describes each distribution.

use std::collections::HashMap;

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use statrs::distribution::{ContinuousCDF, Laplace, Normal};

use dp_budget_core::{DpError, Result};

use crate::composer::DistributionComposer;

const DEFAULT_LOG_MASS_TRUNCATION_BOUND: f64 = -50.0;
const DEFAULT_TAIL_MASS_TRUNCATION: f64 = 1e-15;

const SENSITIVITY: f64 = 1.0;

#[derive(Clone, Debug)]
struct TailPrivacyLossDistribution {
    lower_x_truncation: f64,
    upper_x_truncation: f64,
    tail_mass: Vec<(f64, f64)>,
}

/// Privacy loss of a mechanism as a decreasing function of its output `x`.
trait MonotonePrivacyLoss {
    fn privacy_loss(&self, x: f64) -> f64;
    fn inverse_privacy_loss(&self, loss: f64) -> f64;
    fn mu_upper_cdf(&self, x: f64) -> f64;
    fn privacy_loss_tail(&self) -> TailPrivacyLossDistribution;
}

/// Laplace noise; the upper distribution is centered at `-sensitivity`.
#[derive(Clone, Debug)]
struct LaplacePrivacyLoss {
    parameter: f64,
    sensitivity: f64,
    upper: Laplace,
}

impl LaplacePrivacyLoss {
    fn new(parameter: f64, sensitivity: f64) -> Result<Self> {
        let upper = Laplace::new(-sensitivity, parameter)
            .map_err(|e| DpError::numerical(format!("laplace parameter {parameter}: {e}")))?;
        Ok(Self {
            parameter,
            sensitivity,
            upper,
        })
    }
}

impl MonotonePrivacyLoss for LaplacePrivacyLoss {
    fn privacy_loss(&self, x: f64) -> f64 {
        (x.abs() - (x + self.sensitivity).abs()) / self.parameter
    }

    fn inverse_privacy_loss(&self, loss: f64) -> f64 {
        -0.5 * (loss * self.parameter + self.sensitivity)
    }

    fn mu_upper_cdf(&self, x: f64) -> f64 {
        self.upper.cdf(x)
    }

    fn privacy_loss_tail(&self) -> TailPrivacyLossDistribution {
        // The loss is constant outside [-sensitivity, 0].
        let lower_x_truncation = -self.sensitivity;
        let upper_x_truncation = 0.0;
        let max_loss = self.sensitivity / self.parameter;
        TailPrivacyLossDistribution {
            lower_x_truncation,
            upper_x_truncation,
            tail_mass: vec![
                (max_loss, self.mu_upper_cdf(lower_x_truncation)),
                (-max_loss, 1.0 - self.mu_upper_cdf(upper_x_truncation)),
            ],
        }
    }
}

/// Gaussian noise; the upper distribution is centered at `-sensitivity`.
#[derive(Clone, Debug)]
struct GaussianPrivacyLoss {
    sensitivity: f64,
    variance: f64,
    log_mass_truncation_bound: f64,
    normal: Normal,
}

impl GaussianPrivacyLoss {
    fn new(
        standard_deviation: f64,
        sensitivity: f64,
        log_mass_truncation_bound: f64,
    ) -> Result<Self> {
        let normal = Normal::new(0.0, standard_deviation).map_err(|e| {
            DpError::numerical(format!("gaussian standard deviation {standard_deviation}: {e}"))
        })?;
        Ok(Self {
            sensitivity,
            variance: standard_deviation * standard_deviation,
            log_mass_truncation_bound,
            normal,
        })
    }
}

impl MonotonePrivacyLoss for GaussianPrivacyLoss {
    fn privacy_loss(&self, x: f64) -> f64 {
        let s = self.sensitivity;
        s * (-0.5 * s - x) / self.variance
    }

    fn inverse_privacy_loss(&self, loss: f64) -> f64 {
        let s = self.sensitivity;
        -0.5 * s - loss * self.variance / s
    }

    fn mu_upper_cdf(&self, x: f64) -> f64 {
        self.normal.cdf(x + self.sensitivity)
    }

    fn privacy_loss_tail(&self) -> TailPrivacyLossDistribution {
        let tail_mass = 0.5 * self.log_mass_truncation_bound.exp();
        let z = self.normal.inverse_cdf(tail_mass);
        let lower_x_truncation = z - self.sensitivity;
        let upper_x_truncation = -z;
        TailPrivacyLossDistribution {
            lower_x_truncation,
            upper_x_truncation,
            tail_mass: vec![
                (f64::INFINITY, self.mu_upper_cdf(lower_x_truncation)),
                (
                    self.privacy_loss(upper_x_truncation),
                    1.0 - self.mu_upper_cdf(upper_x_truncation),
                ),
            ],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct PldPmf {
    discretization: f64,
    lower_loss: i64,
    probs: Vec<f64>,
    infinity_mass: f64,
}

impl PldPmf {
    fn from_map(loss_probs: &HashMap<i64, f64>, discretization: f64, infinity_mass: f64) -> Self {
        let min = loss_probs.keys().min().copied().unwrap_or(0);
        let max = loss_probs.keys().max().copied().unwrap_or(0);
        let size = (max - min + 1) as usize;
        let mut probs = vec![0.0_f64; size];
        for (k, v) in loss_probs {
            probs[(k - min) as usize] += *v;
        }
        Self {
            discretization,
            lower_loss: min,
            probs,
            infinity_mass,
        }
    }

    fn size(&self) -> usize {
        self.probs.len()
    }

    fn loss_at(&self, idx: usize) -> f64 {
        (self.lower_loss + idx as i64) as f64 * self.discretization
    }

    fn validate_composable(&self, other: &Self) -> Result<()> {
        if (self.discretization - other.discretization).abs() >= 1e-12 {
            return Err(DpError::invalid(format!(
                "discretization intervals must match ({} vs {})",
                self.discretization, other.discretization
            )));
        }
        Ok(())
    }

    /// Drop `tail_mass_truncation / 2` from each end.
    ///
    /// Left mass folds into the first kept bucket, right mass is returned
    /// so the caller can treat it as infinite loss.
    fn truncate_tails(probs: Vec<f64>, tail_mass_truncation: f64) -> (usize, Vec<f64>, f64) {
        if tail_mass_truncation == 0.0 {
            return (0, probs, 0.0);
        }
        let half = tail_mass_truncation / 2.0;

        let mut left_idx = 0usize;
        let mut left_mass = 0.0;
        while left_idx < probs.len() {
            if left_mass + probs[left_idx] > half {
                break;
            }
            left_mass += probs[left_idx];
            left_idx += 1;
        }

        let mut right_idx = probs.len();
        let mut right_mass = 0.0;
        while right_idx > left_idx + 1 {
            if right_mass + probs[right_idx - 1] > half {
                break;
            }
            right_mass += probs[right_idx - 1];
            right_idx -= 1;
        }

        if left_idx >= probs.len() {
            left_idx = probs.len().saturating_sub(1);
            left_mass = probs[..left_idx].iter().sum();
        }
        let right_idx = right_idx.max(left_idx + 1).min(probs.len());

        let mut truncated = probs[left_idx..right_idx].to_vec();
        if let Some(first) = truncated.first_mut() {
            *first += left_mass;
        }
        (left_idx, truncated, right_mass)
    }

    fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
        let n = a.len() + b.len() - 1;
        let size = n.next_power_of_two();

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(size);
        let ifft = planner.plan_fft_inverse(size);

        let mut fa = vec![Complex::new(0.0, 0.0); size];
        let mut fb = vec![Complex::new(0.0, 0.0); size];
        for (slot, &val) in fa.iter_mut().zip(a) {
            slot.re = val;
        }
        for (slot, &val) in fb.iter_mut().zip(b) {
            slot.re = val;
        }
        fft.process(&mut fa);
        fft.process(&mut fb);
        for (a_i, b_i) in fa.iter_mut().zip(fb.iter()) {
            *a_i *= *b_i;
        }
        ifft.process(&mut fa);

        let scale = 1.0 / size as f64;
        // Round-off can leave tiny negative masses behind.
        fa[..n].iter().map(|c| (c.re * scale).max(0.0)).collect()
    }

    fn compose(&self, other: &Self, tail_mass_truncation: f64) -> Result<Self> {
        self.validate_composable(other)?;
        let probs = Self::convolve(&self.probs, &other.probs);
        let infinity_mass =
            self.infinity_mass + other.infinity_mass - self.infinity_mass * other.infinity_mass;
        let (offset, truncated, right_tail) = Self::truncate_tails(probs, tail_mass_truncation);
        Ok(Self {
            discretization: self.discretization,
            lower_loss: self.lower_loss + other.lower_loss + offset as i64,
            probs: truncated,
            infinity_mass: infinity_mass + right_tail,
        })
    }

    fn get_delta_for_epsilon(&self, epsilon: f64) -> f64 {
        let mut delta = self.infinity_mass;
        for (i, prob) in self.probs.iter().enumerate() {
            let loss = self.loss_at(i);
            if loss > epsilon {
                delta += -(epsilon - loss).exp_m1() * prob;
            }
        }
        delta.clamp(0.0, 1.0)
    }

    fn get_epsilon_for_delta(&self, delta: f64) -> f64 {
        if self.infinity_mass > delta {
            return f64::INFINITY;
        }
        let mut mass_upper = self.infinity_mass;
        let mut mass_lower = 0.0;

        for idx in (0..self.size()).rev() {
            let loss = self.loss_at(idx);
            let prob = self.probs[idx];
            if mass_upper > delta && mass_lower > 0.0 {
                let eps = ((mass_upper - delta) / mass_lower).ln();
                if eps >= loss {
                    break;
                }
            }
            mass_upper += prob;
            mass_lower += prob * (-loss).exp();
            if mass_upper >= delta && mass_lower == 0.0 {
                return loss.max(0.0);
            }
        }

        if mass_upper <= mass_lower + delta {
            return 0.0;
        }
        ((mass_upper - delta) / mass_lower).ln()
    }
}

/// A discretized privacy loss distribution.
#[derive(Clone, Debug, PartialEq)]
pub struct PrivacyLossDistribution {
    pmf: PldPmf,
}

impl PrivacyLossDistribution {
    /// Distribution of a Laplace mechanism with scale `parameter` and sensitivity 1.
    pub fn from_laplace_mechanism(
        parameter: f64,
        value_discretization_interval: f64,
    ) -> Result<Self> {
        validate_interval(value_discretization_interval)?;
        if !parameter.is_finite() || parameter <= 0.0 {
            return Err(DpError::invalid(format!(
                "laplace parameter must be positive and finite, got {parameter}"
            )));
        }
        let mpl = LaplacePrivacyLoss::new(parameter, SENSITIVITY)?;
        Ok(Self {
            pmf: create_pld_pmf_from_monotone_privacy_loss(&mpl, value_discretization_interval),
        })
    }

    /// Distribution of a Gaussian mechanism with sensitivity 1.
    pub fn from_gaussian_mechanism(
        standard_deviation: f64,
        value_discretization_interval: f64,
        log_mass_truncation_bound: f64,
    ) -> Result<Self> {
        validate_interval(value_discretization_interval)?;
        if !standard_deviation.is_finite() || standard_deviation <= 0.0 {
            return Err(DpError::invalid(format!(
                "gaussian standard deviation must be positive and finite, got {standard_deviation}"
            )));
        }
        let mpl = GaussianPrivacyLoss::new(
            standard_deviation,
            SENSITIVITY,
            log_mass_truncation_bound,
        )?;
        Ok(Self {
            pmf: create_pld_pmf_from_monotone_privacy_loss(&mpl, value_discretization_interval),
        })
    }

    /// Tightest distribution of a mechanism known only to be (epsilon, delta)-DP.
    pub fn from_privacy_parameters(
        epsilon: f64,
        delta: f64,
        value_discretization_interval: f64,
    ) -> Result<Self> {
        validate_interval(value_discretization_interval)?;
        if !epsilon.is_finite() || epsilon < 0.0 {
            return Err(DpError::invalid(format!(
                "epsilon must be finite and non-negative, got {epsilon}"
            )));
        }
        if !(0.0..=1.0).contains(&delta) {
            return Err(DpError::invalid(format!("delta must be in [0, 1], got {delta}")));
        }

        let mut loss_probs = HashMap::new();
        let upper = round_loss(epsilon, value_discretization_interval);
        let lower = round_loss(-epsilon, value_discretization_interval);
        *loss_probs.entry(upper).or_insert(0.0) += (1.0 - delta) / (1.0 + (-epsilon).exp());
        *loss_probs.entry(lower).or_insert(0.0) += (1.0 - delta) / (1.0 + epsilon.exp());
        Ok(Self {
            pmf: PldPmf::from_map(&loss_probs, value_discretization_interval, delta),
        })
    }

    /// Distribution of running both mechanisms.
    pub fn compose(&self, other: &Self, tail_mass_truncation: f64) -> Result<Self> {
        Ok(Self {
            pmf: self.pmf.compose(&other.pmf, tail_mass_truncation)?,
        })
    }

    /// Smallest epsilon for which the distribution is (epsilon, delta)-DP.
    pub fn epsilon_for_delta(&self, delta: f64) -> f64 {
        self.pmf.get_epsilon_for_delta(delta)
    }

    /// Smallest delta for which the distribution is (epsilon, delta)-DP.
    pub fn delta_for_epsilon(&self, epsilon: f64) -> f64 {
        self.pmf.get_delta_for_epsilon(epsilon)
    }

    /// Probability mass assigned to infinite privacy loss.
    pub fn infinity_mass(&self) -> f64 {
        self.pmf.infinity_mass
    }
}

fn create_pld_pmf_from_monotone_privacy_loss<T: MonotonePrivacyLoss>(
    mpl: &T,
    value_discretization_interval: f64,
) -> PldPmf {
    let tail = mpl.privacy_loss_tail();
    let mut infinity_mass = 0.0;
    let mut loss_probs: HashMap<i64, f64> = HashMap::new();

    for (loss, mass) in tail.tail_mass.iter().copied() {
        if mass <= 0.0 {
            continue;
        }
        if loss.is_infinite() {
            infinity_mass += mass;
            continue;
        }
        let idx = round_loss(loss, value_discretization_interval);
        *loss_probs.entry(idx).or_insert(0.0) += mass;
    }

    let lower_pl = mpl.privacy_loss(tail.upper_x_truncation);
    let upper_pl = mpl.privacy_loss(tail.lower_x_truncation);
    let k_min = round_loss(lower_pl, value_discretization_interval);
    let k_max = round_loss(upper_pl, value_discretization_interval);

    for k in k_min..=k_max {
        // Losses in ((k - 1) * interval, k * interval] round up to bucket k.
        let lower_loss = (k as f64 - 1.0) * value_discretization_interval;
        let upper_loss = k as f64 * value_discretization_interval;

        let x_low = mpl
            .inverse_privacy_loss(upper_loss)
            .clamp(tail.lower_x_truncation, tail.upper_x_truncation);
        let x_high = mpl
            .inverse_privacy_loss(lower_loss)
            .clamp(tail.lower_x_truncation, tail.upper_x_truncation);
        if x_high > x_low {
            let mass = mpl.mu_upper_cdf(x_high) - mpl.mu_upper_cdf(x_low);
            if mass > 0.0 {
                *loss_probs.entry(k).or_insert(0.0) += mass;
            }
        }
    }

    PldPmf::from_map(&loss_probs, value_discretization_interval, infinity_mass)
}

fn round_loss(loss: f64, discretization: f64) -> i64 {
    (loss / discretization).ceil() as i64
}

fn validate_interval(value_discretization_interval: f64) -> Result<()> {
    if !value_discretization_interval.is_finite() || value_discretization_interval <= 0.0 {
        return Err(DpError::invalid(format!(
            "value discretization interval must be positive, got {value_discretization_interval}"
        )));
    }
    Ok(())
}

/// Built-in [`DistributionComposer`] over [`PrivacyLossDistribution`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PldComposer {
    tail_mass_truncation: f64,
    log_mass_truncation_bound: f64,
}

impl Default for PldComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PldComposer {
    /// Create a composer with default truncation settings.
    pub fn new() -> Self {
        Self {
            tail_mass_truncation: DEFAULT_TAIL_MASS_TRUNCATION,
            log_mass_truncation_bound: DEFAULT_LOG_MASS_TRUNCATION_BOUND,
        }
    }

    /// Mass dropped from the tails after each composition.
    pub fn with_tail_mass_truncation(mut self, tail_mass_truncation: f64) -> Self {
        self.tail_mass_truncation = tail_mass_truncation;
        self
    }

    /// Natural log of the Gaussian tail mass cut off before discretization.
    pub fn with_log_mass_truncation_bound(mut self, log_mass_truncation_bound: f64) -> Self {
        self.log_mass_truncation_bound = log_mass_truncation_bound;
        self
    }
}

impl DistributionComposer for PldComposer {
    type Distribution = PrivacyLossDistribution;

    fn laplace(
        &self,
        parameter: f64,
        value_discretization_interval: f64,
    ) -> Result<Self::Distribution> {
        PrivacyLossDistribution::from_laplace_mechanism(parameter, value_discretization_interval)
    }

    fn gaussian(
        &self,
        standard_deviation: f64,
        value_discretization_interval: f64,
    ) -> Result<Self::Distribution> {
        PrivacyLossDistribution::from_gaussian_mechanism(
            standard_deviation,
            value_discretization_interval,
            self.log_mass_truncation_bound,
        )
    }

    fn privacy_parameters(
        &self,
        epsilon: f64,
        delta: f64,
        value_discretization_interval: f64,
    ) -> Result<Self::Distribution> {
        PrivacyLossDistribution::from_privacy_parameters(
            epsilon,
            delta,
            value_discretization_interval,
        )
    }

    fn compose(
        &self,
        first: &Self::Distribution,
        second: &Self::Distribution,
    ) -> Result<Self::Distribution> {
        first.compose(second, self.tail_mass_truncation)
    }

    fn epsilon_for_delta(&self, distribution: &Self::Distribution, delta: f64) -> f64 {
        distribution.epsilon_for_delta(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: f64 = 1e-3;

    fn total_mass(pld: &PrivacyLossDistribution) -> f64 {
        pld.pmf.probs.iter().sum::<f64>() + pld.pmf.infinity_mass
    }

    #[test]
    fn laplace_pure_epsilon_is_inverse_parameter() {
        let pld = PrivacyLossDistribution::from_laplace_mechanism(0.5, INTERVAL).unwrap();
        assert!((total_mass(&pld) - 1.0).abs() < 1e-9);
        let eps = pld.epsilon_for_delta(0.0);
        assert!((2.0 - 1e-9..=2.0 + 2.0 * INTERVAL).contains(&eps), "eps={eps}");
        assert!(pld.epsilon_for_delta(1e-3) < eps);
    }

    #[test]
    fn gaussian_epsilon_decreases_with_noise() {
        let low = PrivacyLossDistribution::from_gaussian_mechanism(1.0, INTERVAL, -50.0).unwrap();
        let high = PrivacyLossDistribution::from_gaussian_mechanism(3.0, INTERVAL, -50.0).unwrap();
        assert!((total_mass(&low) - 1.0).abs() < 1e-9);
        let eps_low = low.epsilon_for_delta(1e-6);
        let eps_high = high.epsilon_for_delta(1e-6);
        assert!(eps_high < eps_low);
        assert!(eps_high.is_finite() && eps_high > 0.0);
    }

    #[test]
    fn gaussian_matches_known_calibration() {
        // sigma ~= 3.73 gives (1, 1e-5)-DP for the sensitivity-1 Gaussian mechanism.
        let pld = PrivacyLossDistribution::from_gaussian_mechanism(3.8, 1e-4, -50.0).unwrap();
        let eps = pld.epsilon_for_delta(1e-5);
        assert!(eps > 0.9 && eps < 1.0, "eps={eps}");
    }

    #[test]
    fn privacy_parameters_round_trip() {
        let pld = PrivacyLossDistribution::from_privacy_parameters(1.0, 1e-6, INTERVAL).unwrap();
        assert_eq!(pld.infinity_mass(), 1e-6);
        assert!((total_mass(&pld) - 1.0).abs() < 1e-12);
        let eps = pld.epsilon_for_delta(1e-6);
        assert!((eps - 1.0).abs() <= 2.0 * INTERVAL, "eps={eps}");
        assert_eq!(pld.epsilon_for_delta(1e-7), f64::INFINITY);
        assert!((pld.delta_for_epsilon(eps) - 1e-6).abs() < 1e-9);
    }

    #[test]
    fn composition_adds_pure_epsilon() {
        let composer = PldComposer::new();
        let a = composer.laplace(1.0, INTERVAL).unwrap();
        let b = composer.laplace(2.0, INTERVAL).unwrap();
        let composed = composer.compose(&a, &b).unwrap();
        assert!((total_mass(&composed) - 1.0).abs() < 1e-9);
        let eps = composer.epsilon_for_delta(&composed, 0.0);
        assert!((eps - 1.5).abs() <= 3.0 * INTERVAL, "eps={eps}");
    }

    #[test]
    fn composition_is_commutative() {
        let composer = PldComposer::new();
        let a = composer.gaussian(2.0, INTERVAL).unwrap();
        let b = composer.laplace(1.5, INTERVAL).unwrap();
        let ab = composer.compose(&a, &b).unwrap();
        let ba = composer.compose(&b, &a).unwrap();
        let eps_ab = composer.epsilon_for_delta(&ab, 1e-6);
        let eps_ba = composer.epsilon_for_delta(&ba, 1e-6);
        assert!((eps_ab - eps_ba).abs() < 1e-9);
    }

    #[test]
    fn mismatched_intervals_do_not_compose() {
        let a = PrivacyLossDistribution::from_laplace_mechanism(1.0, 1e-3).unwrap();
        let b = PrivacyLossDistribution::from_laplace_mechanism(1.0, 1e-4).unwrap();
        assert!(a.compose(&b, 0.0).is_err());
    }

    #[test]
    fn rejects_degenerate_parameters() {
        assert!(PrivacyLossDistribution::from_laplace_mechanism(0.0, INTERVAL).is_err());
        assert!(PrivacyLossDistribution::from_laplace_mechanism(f64::INFINITY, INTERVAL).is_err());
        assert!(PrivacyLossDistribution::from_gaussian_mechanism(-1.0, INTERVAL, -50.0).is_err());
        assert!(PrivacyLossDistribution::from_privacy_parameters(1.0, 2.0, INTERVAL).is_err());
        assert!(PrivacyLossDistribution::from_privacy_parameters(1.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn truncation_moves_right_tail_to_infinity() {
        let probs = vec![1e-17, 0.5, 0.5 - 2e-17, 1e-17];
        let (offset, kept, right) = PldPmf::truncate_tails(probs, 1e-15);
        assert_eq!(offset, 1);
        assert_eq!(kept.len(), 2);
        assert!((kept[0] - (0.5 + 1e-17)).abs() < 1e-18);
        assert_eq!(right, 1e-17);
    }
}
