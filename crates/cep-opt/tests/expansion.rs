//! Capacity-expansion scenarios solved end to end

use std::collections::HashMap;

use cep_core::config::{Analysis, SolverSettings, System};
use cep_core::input::{
    CarrierData, ConversionData, ExistingCapacity, InputData, TechnologyData, TechnologyKindData,
    TransportData,
};
use cep_core::EdgeSpec;
use cep_opt::{solve, OptimizationContext, SolveOutcome};

fn base_system(nodes: &[&str], hours: usize, years: usize) -> System {
    let mut system = System::default();
    system.nodes = nodes.iter().map(|n| n.to_string()).collect();
    system.unaggregated_time_steps_per_year = hours;
    system.total_hours_per_year = hours;
    system.aggregated_time_steps_per_year = hours;
    system.optimized_years = years;
    system.knowledge_depreciation_rate = 0.0;
    system
}

/// Gas-fired boiler: imports gas, produces heat one to one
fn boiler(lifetime: f64) -> TechnologyData {
    let mut conversion = ConversionData::default();
    conversion.input_carriers = vec!["gas".to_string()];
    conversion.output_carriers = vec!["heat".to_string()];
    conversion.conversion_factor.insert("gas".to_string(), 1.0);
    TechnologyData::new("boiler", "heat", TechnologyKindData::Conversion(conversion), lifetime)
}

fn heat_carrier(node: &str, demand: Vec<f64>) -> CarrierData {
    let mut heat = CarrierData::new("heat");
    heat.demand.set(node, demand);
    heat
}

fn gas_carrier(node: &str, hours: usize, price: f64) -> CarrierData {
    let mut gas = CarrierData::new("gas");
    gas.availability_import.set(node, vec![f64::INFINITY; hours]);
    gas.import_price.set(node, vec![price; hours]);
    gas
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
fn test_minimal_balance() {
    // one node, demand 10 per step, unit-efficiency boiler, free gas import
    let hours = 2;
    let mut system = base_system(&["n1"], hours, 1);
    system.carriers = vec!["heat".into(), "gas".into()];
    system.conversion_technologies = vec!["boiler".into()];

    let input = InputData {
        carriers: vec![
            heat_carrier("n1", vec![10.0; hours]),
            gas_carrier("n1", hours, 1.0),
        ],
        technologies: vec![boiler(1.0)],
        excluded_from_tsa: Vec::new(),
    };

    let outcome = run(system, input);
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    for t in ["0", "1"] {
        let imported = outcome.value("import_flow", &["gas", "n1", t]);
        assert!((imported - 10.0).abs() < 1e-3, "gas import at {}: {}", t, imported);
        let produced = outcome.value("output_flow", &["boiler", "heat", "n1", t]);
        assert!((produced - 10.0).abs() < 1e-3, "heat output at {}: {}", t, produced);
    }

    // cost of importing 10 units at price 1 over both unit-duration steps
    let cost = outcome.value("cost_carrier_total", &["0"]);
    assert!((cost - 20.0).abs() < 1e-2, "carrier cost: {}", cost);
    let objective = outcome.objective.unwrap();
    assert!((objective - 20.0).abs() < 1e-2, "objective: {}", objective);

    // installed capacity covers the peak reference flow
    let capacity = outcome.value("capacity", &["boiler", "power", "n1", "0"]);
    assert!(capacity >= 10.0 - 1e-3, "capacity: {}", capacity);

    // the balance residual is zero: demand equals production
    let shed = outcome.value("shed_demand", &["heat", "n1", "0"]);
    assert!(shed.abs() < 1e-6, "no shedding expected: {}", shed);
}

#[test]
fn test_bidirectional_transport() {
    // two nodes, both edge directions declared bidirectional, demand at b
    let mut system = base_system(&["a", "b"], 1, 1);
    system.carriers = vec!["elec".into()];
    system.transport_technologies = vec!["line".into()];
    system.edges = vec![EdgeSpec::new("a_b", "a", "b"), EdgeSpec::new("b_a", "b", "a")];
    system.bidirectional_transport_technologies = vec!["line".into()];

    let mut elec = CarrierData::new("elec");
    elec.demand.set("b", vec![5.0]);
    elec.availability_import.set("a", vec![f64::INFINITY]);
    elec.import_price.set("a", vec![1.0]);

    let mut transport = TransportData::default();
    transport.distance.insert("a_b".to_string(), 1.0);
    transport.distance.insert("b_a".to_string(), 1.0);
    let mut line = TechnologyData::new("line", "elec", TechnologyKindData::Transport(transport), 1.0);
    line.capex_specific.insert(("a_b".to_string(), 0), 1.0);
    line.capex_specific.insert(("b_a".to_string(), 0), 1.0);

    let input = InputData {
        carriers: vec![elec],
        technologies: vec![line],
        excluded_from_tsa: Vec::new(),
    };

    let outcome = run(system, input);
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    let forward = outcome.value("capacity_addition", &["line", "power", "a_b", "0"]);
    let backward = outcome.value("capacity_addition", &["line", "power", "b_a", "0"]);
    assert!(
        (forward - backward).abs() < 1e-4,
        "bidirectional additions differ: {} vs {}",
        forward,
        backward
    );
    assert!((forward - 5.0).abs() < 1e-2, "forward addition: {}", forward);

    let unused = outcome.value("transport_flow", &["line", "b_a", "0"]);
    assert!(unused.abs() < 1e-3, "return flow should be idle: {}", unused);
    let imported = outcome.value("import_flow", &["elec", "a", "0"]);
    assert!((imported - 5.0).abs() < 1e-2, "import at a: {}", imported);
}

#[test]
fn test_construction_lag() {
    // two-year lead time: an investment in year 0 becomes capacity in year 2
    let mut system = base_system(&["n1"], 1, 3);
    system.carriers = vec!["heat".into(), "gas".into()];
    system.conversion_technologies = vec!["boiler".into()];

    let mut heat = heat_carrier("n1", vec![10.0]);
    heat.yearly_variation
        .insert("demand".to_string(), vec![0.0, 0.0, 1.0]);

    let mut tech = boiler(3.0);
    tech.construction_time = 2.0;
    for year in 0..3 {
        tech.capex_specific.insert(("n1".to_string(), year), 1.0);
    }

    let input = InputData {
        carriers: vec![heat, gas_carrier("n1", 1, 1.0)],
        technologies: vec![tech],
        excluded_from_tsa: Vec::new(),
    };

    let outcome = run(system, input);
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    let addition_0 = outcome.value("capacity_addition", &["boiler", "power", "n1", "0"]);
    assert!(addition_0.abs() < 1e-4, "nothing can be built in year 0: {}", addition_0);

    let addition_2 = outcome.value("capacity_addition", &["boiler", "power", "n1", "2"]);
    let invested_0 = outcome.value("capacity_investment", &["boiler", "power", "n1", "0"]);
    assert!((addition_2 - 10.0).abs() < 1e-2, "year-2 addition: {}", addition_2);
    assert!(
        (addition_2 - invested_0).abs() < 1e-4,
        "year-2 addition {} must equal year-0 investment {}",
        addition_2,
        invested_0
    );
}

#[test]
fn test_lifetime_rollover() {
    // two-year lifetime: the year-0 addition retires before year 2
    let mut system = base_system(&["n1"], 1, 4);
    system.carriers = vec!["heat".into(), "gas".into()];
    system.conversion_technologies = vec!["boiler".into()];

    let mut heat = heat_carrier("n1", vec![10.0]);
    heat.yearly_variation
        .insert("demand".to_string(), vec![1.0, 2.0, 0.0, 0.0]);

    let mut tech = boiler(2.0);
    for year in 0..4 {
        tech.capex_specific.insert(("n1".to_string(), year), 1.0);
    }

    let input = InputData {
        carriers: vec![heat, gas_carrier("n1", 1, 1.0)],
        technologies: vec![tech],
        excluded_from_tsa: Vec::new(),
    };

    let outcome = run(system, input);
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    let addition_1 = outcome.value("capacity_addition", &["boiler", "power", "n1", "1"]);
    let capacity_2 = outcome.value("capacity", &["boiler", "power", "n1", "2"]);
    let capacity_3 = outcome.value("capacity", &["boiler", "power", "n1", "3"]);
    assert!(
        (capacity_2 - addition_1).abs() < 1e-3,
        "year-2 capacity {} should be the surviving year-1 addition {}",
        capacity_2,
        addition_1
    );
    assert!(capacity_3.abs() < 1e-3, "year-3 capacity should be retired: {}", capacity_3);
}

#[test]
fn test_diffusion_bound() {
    // knowledge stock of 100 with a 10% diffusion rate over a 5-year step
    let mut system = base_system(&["n1"], 1, 2);
    system.carriers = vec!["heat".into(), "gas".into()];
    system.conversion_technologies = vec!["boiler".into()];
    system.interval_between_years = 5;

    let mut heat = heat_carrier("n1", vec![1000.0]);
    heat.yearly_variation
        .insert("demand".to_string(), vec![0.0, 1.0]);
    heat.shed_demand_price = 1000.0;

    let mut tech = boiler(50.0);
    tech.max_diffusion_rate = HashMap::from([(0, 0.1), (1, 0.1)]);
    tech.existing_capacities = vec![ExistingCapacity::new("n1", 100.0, 50.0)];
    for year in 0..2 {
        tech.capex_specific.insert(("n1".to_string(), year), 1.0);
    }

    let input = InputData {
        carriers: vec![heat, gas_carrier("n1", 1, 1.0)],
        technologies: vec![tech],
        excluded_from_tsa: Vec::new(),
    };

    let outcome = run(system, input);
    assert!(outcome.status.is_optimal(), "status: {:?}", outcome.status);

    // (1.1^5 - 1) * 100 = 61.051
    let bound = (1.1f64.powi(5) - 1.0) * 100.0;
    let addition_1 = outcome.value("capacity_addition", &["boiler", "power", "n1", "1"]);
    assert!(
        (addition_1 - bound).abs() < 0.2,
        "year-1 addition {} should hit the diffusion bound {}",
        addition_1,
        bound
    );

    // the remaining demand is shed
    let shed = outcome.value("shed_demand", &["heat", "n1", "1"]);
    assert!(shed > 800.0, "unmet demand should be shed: {}", shed);
}
