use dp_budget::prelude::*;
use proptest::prelude::*;

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * a.abs().max(b.abs()).max(1.0)
}

#[test]
fn scope_rescales_members_to_its_weight() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 0.0).unwrap();
    {
        let mut scope = accountant.scope(0.8).unwrap();
        scope
            .request_budget(BudgetRequest::new(MechanismType::Laplace).with_weight(1.0))
            .unwrap();
        scope
            .request_budget(BudgetRequest::new(MechanismType::Laplace).with_weight(3.0))
            .unwrap();
    }
    let weights = accountant.ledger().mechanism_weights();
    assert!(close(weights[0], 0.2));
    assert!(close(weights[1], 0.6));
}

#[test]
fn nested_scopes_split_evenly() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
    let mut specs = Vec::new();
    {
        let mut outer = accountant.scope(1.0).unwrap();
        for _ in 0..2 {
            let mut child = outer.scope(0.5).unwrap();
            specs.push(child.request(MechanismType::Gaussian).unwrap());
        }
    }
    assert_eq!(accountant.ledger().mechanism_weights(), vec![0.5, 0.5]);

    accountant.compute_budgets().unwrap();
    for spec in &specs {
        assert!(close(spec.eps().unwrap(), 0.5));
        assert!(close(spec.delta().unwrap(), 0.5e-6));
    }
}

#[test]
fn reads_before_finalize_report_uncomputed() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
    let spec = accountant.request(MechanismType::Generic).unwrap();

    assert!(matches!(spec.state(), BudgetState::Pending));
    assert_eq!(spec.eps(), Err(DpError::UncomputedBudget { field: "eps" }));
    assert_eq!(
        spec.delta(),
        Err(DpError::UncomputedBudget { field: "delta" })
    );
    assert!(matches!(
        spec.noise_standard_deviation(),
        Err(DpError::UncomputedBudget { .. })
    ));

    accountant.compute_budgets().unwrap();
    assert!(spec.is_resolved());
    assert_eq!(spec.eps().unwrap(), 1.0);
    assert_eq!(
        accountant.request(MechanismType::Laplace).unwrap_err(),
        DpError::Finalized
    );
    assert_eq!(spec.eps().unwrap(), 1.0);
}

#[test]
fn declared_aggregation_count_is_enforced() {
    let limit = AggregationLimit::from_options(Some(2), None).unwrap();
    let mut accountant = NaiveBudgetAccountant::with_aggregations(1.0, 1e-6, limit).unwrap();
    for _ in 0..2 {
        let mut aggregation = accountant.aggregation_scope(1.0).unwrap();
        aggregation.request(MechanismType::Laplace).unwrap();
    }
    let err = accountant.aggregation_scope(1.0).unwrap_err();
    assert!(matches!(err, DpError::ScopeViolation { .. }));
}

#[test]
fn finalize_requires_every_declared_aggregation() {
    let limit = AggregationLimit::from_options(Some(2), None).unwrap();
    let mut accountant = NaiveBudgetAccountant::with_aggregations(1.0, 1e-6, limit).unwrap();
    {
        let mut aggregation = accountant.aggregation_scope(1.0).unwrap();
        aggregation.request(MechanismType::Laplace).unwrap();
    }
    assert_eq!(
        accountant.compute_budgets(),
        Err(DpError::AggregationCountMismatch {
            expected: 2,
            actual: 1
        })
    );
}

#[test]
fn aggregation_scopes_can_not_nest() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
    let mut aggregation = accountant.aggregation_scope(1.0).unwrap();
    let err = aggregation.aggregation_scope(1.0).unwrap_err();
    assert!(matches!(err, DpError::ScopeViolation { .. }));
    // Plain scopes still nest inside an aggregation.
    assert!(aggregation.scope(0.5).is_ok());
}

#[test]
fn declared_weights_give_eager_budgets() {
    let limit = AggregationLimit::from_options(None, Some(vec![3.0, 1.0])).unwrap();
    let mut accountant = NaiveBudgetAccountant::with_aggregations(2.0, 1e-6, limit).unwrap();
    {
        let first = accountant.aggregation_scope(3.0).unwrap();
        assert_eq!(first.aggregation_index(), Some(0));
        assert!(close(first.epsilon().unwrap(), 1.5));
        assert!(close(first.delta().unwrap(), 0.75e-6));
    }
    let err = accountant.aggregation_scope(2.0).unwrap_err();
    assert!(matches!(err, DpError::ScopeViolation { .. }));
    let second = accountant.aggregation_scope(1.0).unwrap();
    assert_eq!(second.aggregation_index(), Some(1));
    assert!(close(second.epsilon().unwrap(), 0.5));
}

#[test]
fn plain_scopes_have_no_eager_budget() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
    let scope = accountant.scope(1.0).unwrap();
    assert!(matches!(
        scope.epsilon(),
        Err(DpError::ScopeBudgetUnavailable { .. })
    ));
}

#[test]
fn finalize_inside_a_scope_fails() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
    let mut scope = accountant.scope(1.0).unwrap();
    scope.request(MechanismType::Laplace).unwrap();
    assert!(matches!(
        scope.compute_budgets(),
        Err(DpError::ScopeViolation { .. })
    ));
    scope.close();
    assert!(accountant.compute_budgets().is_ok());
}

#[test]
fn scope_closes_when_caller_bails_out() {
    fn build(accountant: &mut NaiveBudgetAccountant) -> Result<()> {
        let mut scope = accountant.scope(1.0)?;
        scope.request(MechanismType::Laplace)?;
        scope.request_budget(BudgetRequest::new(MechanismType::Laplace).with_count(0))?;
        Ok(())
    }

    let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
    assert!(build(&mut accountant).is_err());
    assert_eq!(accountant.ledger().open_scopes(), 0);
    assert!(accountant.compute_budgets().is_ok());
}

#[test]
fn request_time_errors() {
    let mut accountant = NaiveBudgetAccountant::new(1.0, 0.0).unwrap();
    assert!(matches!(
        accountant.request(MechanismType::Gaussian),
        Err(DpError::InvalidParameters { .. })
    ));
    assert!(matches!(
        accountant.request_budget(
            BudgetRequest::new(MechanismType::Laplace).with_noise_standard_deviation(1.0)
        ),
        Err(DpError::UnsupportedFeature { .. })
    ));
}

#[test]
fn construction_time_errors() {
    assert!(NaiveBudgetAccountant::new(0.0, 0.0).is_err());
    assert!(NaiveBudgetAccountant::new(1.0, -1e-6).is_err());
    assert!(AggregationLimit::from_options(Some(0), None).is_err());
    assert!(AggregationLimit::from_options(Some(1), Some(vec![1.0])).is_err());
}

#[test]
fn config_builds_equivalent_accountants() {
    let cfg = NaiveAccountantConfig::new(1.0, 1e-6).with_n_aggregations(1);
    let mut accountant = cfg.create_accountant().unwrap();
    let spec = {
        let mut aggregation = accountant.aggregation_scope(1.0).unwrap();
        aggregation.request(MechanismType::Gaussian).unwrap()
    };
    accountant.compute_budgets().unwrap();
    assert_eq!(spec.eps().unwrap(), 1.0);
    assert_eq!(spec.delta().unwrap(), 1e-6);
}

proptest! {
    #[test]
    fn scope_normalization_preserves_ratios(
        scope_weight in 0.01f64..10.0,
        a in 0.01f64..10.0,
        b in 0.01f64..10.0,
    ) {
        let mut accountant = NaiveBudgetAccountant::new(1.0, 1e-6).unwrap();
        {
            let mut scope = accountant.scope(scope_weight).unwrap();
            scope
                .request_budget(BudgetRequest::new(MechanismType::Laplace).with_weight(a))
                .unwrap();
            scope
                .request_budget(BudgetRequest::new(MechanismType::Laplace).with_weight(b))
                .unwrap();
        }
        let weights = accountant.ledger().mechanism_weights();
        prop_assert!(close(weights[0], scope_weight * a / (a + b)));
        prop_assert!(close(weights[1], scope_weight * b / (a + b)));
    }
}
