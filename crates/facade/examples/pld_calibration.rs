use dp_budget::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut accountant = PldBudgetAccountantConfig::new(1.0, 1e-6)
        .with_pld_discretization(1e-3)
        .create_accountant()?;

    let specs = {
        let mut scope = accountant.scope(1.0)?;
        vec![
            scope.request(MechanismType::Laplace)?,
            scope.request_budget(
                BudgetRequest::new(MechanismType::Gaussian)
                    .with_sensitivity(2.0)
                    .with_weight(2.0),
            )?,
            scope.request(MechanismType::Generic)?,
        ]
    };
    accountant.compute_budgets()?;

    if let Some(sigma) = accountant.minimum_noise_std() {
        println!(
            "minimum noise std {sigma:.4} (composed eps {:.4})",
            accountant.epsilon_for_noise(sigma)?
        );
    }
    for spec in &specs {
        println!(
            "{:>8}: noise std {:.4}",
            spec.mechanism_type(),
            spec.noise_standard_deviation()?
        );
    }
    Ok(())
}
