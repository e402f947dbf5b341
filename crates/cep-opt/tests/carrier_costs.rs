//! Carrier cost, shed-demand and availability behavior

use cep_core::config::{Analysis, SolverSettings, System};
use cep_core::input::{CarrierData, InputData};
use cep_opt::{solve, OptimizationContext, SolveOutcome, SolveStatus};

fn carrier_only_system(hours: usize) -> System {
    let mut system = System::default();
    system.nodes = vec!["n1".into()];
    system.carriers = vec!["heat".into()];
    system.unaggregated_time_steps_per_year = hours;
    system.total_hours_per_year = hours;
    system.aggregated_time_steps_per_year = hours;
    system.optimized_years = 1;
    system
}

fn run(system: System, input: InputData) -> SolveOutcome {
    let mut ctx = OptimizationContext::new(
        Analysis::default(),
        system,
        SolverSettings::default(),
        input,
    )
    .expect("context should build");
    let model = ctx.assemble().expect("model should assemble");
    solve(&ctx, model).expect("solver adapter should run")
}

#[test]
fn test_shed_demand_beats_expensive_import() {
    // shedding at price 1 undercuts importing at price 10
    let system = carrier_only_system(1);
    let mut heat = CarrierData::new("heat");
    heat.demand.set("n1", vec![5.0]);
    heat.availability_import.set("n1", vec![f64::INFINITY]);
    heat.import_price.set("n1", vec![10.0]);
    heat.shed_demand_price = 1.0;

    let outcome = run(
        system,
        InputData {
            carriers: vec![heat],
            technologies: Vec::new(),
            excluded_from_tsa: Vec::new(),
        },
    );
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    let shed = outcome.value("shed_demand", &["heat", "n1", "0"]);
    let imported = outcome.value("import_flow", &["heat", "n1", "0"]);
    assert!((shed - 5.0).abs() < 1e-3, "shed: {}", shed);
    assert!(imported.abs() < 1e-3, "import: {}", imported);

    let shed_cost = outcome.value("cost_shed_demand", &["heat", "n1", "0"]);
    assert!((shed_cost - 5.0).abs() < 1e-3, "shed cost: {}", shed_cost);
    let objective = outcome.objective.unwrap();
    assert!((objective - 5.0).abs() < 1e-3, "objective: {}", objective);
}

#[test]
fn test_forbidden_shedding_forces_import() {
    // an infinite shed price removes the slack entirely
    let system = carrier_only_system(1);
    let mut heat = CarrierData::new("heat");
    heat.demand.set("n1", vec![5.0]);
    heat.availability_import.set("n1", vec![f64::INFINITY]);
    heat.import_price.set("n1", vec![10.0]);

    let outcome = run(
        system,
        InputData {
            carriers: vec![heat],
            technologies: Vec::new(),
            excluded_from_tsa: Vec::new(),
        },
    );
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    let imported = outcome.value("import_flow", &["heat", "n1", "0"]);
    assert!((imported - 5.0).abs() < 1e-3, "import: {}", imported);
    let shed = outcome.value("shed_demand", &["heat", "n1", "0"]);
    assert!(shed.abs() < 1e-6, "shed must stay zero: {}", shed);
}

#[test]
fn test_yearly_availability_cap_infeasible() {
    // per-step availability is open but the yearly cap cannot cover demand;
    // the outcome is reported, not raised
    let hours = 2;
    let system = carrier_only_system(hours);
    let mut heat = CarrierData::new("heat");
    heat.demand.set("n1", vec![10.0; hours]);
    heat.availability_import.set("n1", vec![f64::INFINITY; hours]);
    heat.import_price.set("n1", vec![1.0; hours]);
    heat.availability_import_yearly.insert(("n1".to_string(), 0), 15.0);

    let outcome = run(
        system,
        InputData {
            carriers: vec![heat],
            technologies: Vec::new(),
            excluded_from_tsa: Vec::new(),
        },
    );
    assert_eq!(outcome.status, SolveStatus::Infeasible);
    assert!(outcome.objective.is_none());
}

#[test]
fn test_no_availability_no_demand_is_idle() {
    // a carrier with no availability and no demand keeps all flows at zero
    let system = carrier_only_system(1);
    let heat = CarrierData::new("heat");

    let outcome = run(
        system,
        InputData {
            carriers: vec![heat],
            technologies: Vec::new(),
            excluded_from_tsa: Vec::new(),
        },
    );
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);
    for name in ["import_flow", "export_flow", "shed_demand"] {
        let value = outcome.value(name, &["heat", "n1", "0"]);
        assert!(value.abs() < 1e-6, "{} should be zero: {}", name, value);
    }
    let objective = outcome.objective.unwrap();
    assert!(objective.abs() < 1e-6, "objective: {}", objective);
}
