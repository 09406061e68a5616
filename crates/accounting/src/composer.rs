//! Privacy loss distribution algebra consumed by [`PldBudgetAccountant`].
//!
//! [`PldBudgetAccountant`]: crate::PldBudgetAccountant

use dp_budget_core::Result;

/// Builds, composes and queries privacy loss distributions.
///
/// Every construction describes a sensitivity-1 mechanism. The accountant
/// folds sensitivity and weight into the noise parameter it passes in.
pub trait DistributionComposer {
    /// Distribution type produced by this composer.
    type Distribution;

    /// Distribution of a Laplace mechanism with scale `parameter`.
    fn laplace(
        &self,
        parameter: f64,
        value_discretization_interval: f64,
    ) -> Result<Self::Distribution>;

    /// Distribution of a Gaussian mechanism with standard deviation `standard_deviation`.
    fn gaussian(
        &self,
        standard_deviation: f64,
        value_discretization_interval: f64,
    ) -> Result<Self::Distribution>;

    /// Distribution of an arbitrary (epsilon, delta)-DP mechanism.
    fn privacy_parameters(
        &self,
        epsilon: f64,
        delta: f64,
        value_discretization_interval: f64,
    ) -> Result<Self::Distribution>;

    /// Distribution of running both mechanisms on the same data.
    fn compose(
        &self,
        first: &Self::Distribution,
        second: &Self::Distribution,
    ) -> Result<Self::Distribution>;

    /// Smallest epsilon the distribution satisfies at `delta`.
    fn epsilon_for_delta(&self, distribution: &Self::Distribution, delta: f64) -> f64;
}
