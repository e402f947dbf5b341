//! Solving on an aggregated operational grid

use cep_core::config::{Analysis, SolverSettings, System};
use cep_core::input::{CarrierData, InputData};
use cep_opt::{solve, OptimizationContext};

#[test]
fn test_aggregated_grid_preserves_costs() {
    // four base hours with two distinct demand states cluster into two
    // representative steps of duration two each
    let hours = 4;
    let mut system = System::default();
    system.nodes = vec!["n1".into()];
    system.carriers = vec!["heat".into()];
    system.unaggregated_time_steps_per_year = hours;
    system.total_hours_per_year = hours;
    system.aggregated_time_steps_per_year = 2;
    system.optimized_years = 1;
    system.conduct_time_series_aggregation = true;

    let mut heat = CarrierData::new("heat");
    heat.demand.set("n1", vec![10.0, 10.0, 20.0, 20.0]);
    heat.availability_import.set("n1", vec![f64::INFINITY; hours]);
    heat.import_price.set("n1", vec![1.0; hours]);

    let mut ctx = OptimizationContext::new(
        Analysis::default(),
        system,
        SolverSettings::default(),
        InputData {
            carriers: vec![heat],
            technologies: Vec::new(),
            excluded_from_tsa: Vec::new(),
        },
    )
    .expect("context should build");

    // the grid shrank to two steps of duration two
    let grid = ctx.time_steps.grid("heat").unwrap();
    assert_eq!(grid.steps.len(), 2);
    assert_eq!(grid.duration, vec![2.0, 2.0]);

    let model = ctx.assemble().expect("model should assemble");
    let outcome = solve(&ctx, model).expect("solver adapter should run");
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    // duration-weighted import cost equals the unaggregated yearly cost:
    // 2h * 10 + 2h * 20 at price 1
    let cost = outcome.value("cost_carrier_total", &["0"]);
    assert!((cost - 60.0).abs() < 1e-2, "carrier cost: {}", cost);
}
