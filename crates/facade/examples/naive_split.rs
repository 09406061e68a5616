use dp_budget::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut accountant = NaiveAccountantConfig::new(1.0, 1e-6)
        .with_aggregation_weights(vec![2.0, 1.0])
        .create_accountant()?;

    let (count, sum) = {
        let mut aggregation = accountant.aggregation_scope(2.0)?;
        println!("aggregation 0 reserves eps={:.3}", aggregation.epsilon()?);
        let count = aggregation.request(MechanismType::Laplace)?;
        let sum = aggregation
            .request_budget(BudgetRequest::new(MechanismType::Gaussian).with_weight(3.0))?;
        (count, sum)
    };
    let mean = {
        let mut aggregation = accountant.aggregation_scope(1.0)?;
        aggregation.request(MechanismType::Generic)?
    };
    accountant.compute_budgets()?;

    for (name, spec) in [("count", &count), ("sum", &sum), ("mean", &mean)] {
        println!(
            "{name:>5}: {} eps={:.4} delta={:.2e}",
            spec.mechanism_type(),
            spec.eps()?,
            spec.delta()?
        );
    }
    Ok(())
}
