//! Rolling-horizon stepping with existing-capacity carryover

use cep_core::config::{Analysis, SolverSettings, System};
use cep_core::input::{CarrierData, ConversionData, InputData, TechnologyData, TechnologyKindData};
use cep_opt::RollingHorizon;

#[test]
fn test_capacity_built_in_step_one_carries_over() {
    let mut system = System::default();
    system.nodes = vec!["n1".into()];
    system.carriers = vec!["heat".into(), "gas".into()];
    system.conversion_technologies = vec!["boiler".into()];
    system.unaggregated_time_steps_per_year = 1;
    system.total_hours_per_year = 1;
    system.aggregated_time_steps_per_year = 1;
    system.optimized_years = 2;

    let mut heat = CarrierData::new("heat");
    heat.demand.set("n1", vec![10.0]);
    let mut gas = CarrierData::new("gas");
    gas.availability_import.set("n1", vec![f64::INFINITY]);
    gas.import_price.set("n1", vec![1.0]);

    let mut conversion = ConversionData::default();
    conversion.input_carriers = vec!["gas".to_string()];
    conversion.output_carriers = vec!["heat".to_string()];
    conversion.conversion_factor.insert("gas".to_string(), 1.0);
    let mut boiler =
        TechnologyData::new("boiler", "heat", TechnologyKindData::Conversion(conversion), 10.0);
    boiler.capex_specific.insert(("n1".to_string(), 0), 1.0);
    boiler.capex_specific.insert(("n1".to_string(), 1), 1.0);

    let input = InputData {
        carriers: vec![heat, gas],
        technologies: vec![boiler],
        excluded_from_tsa: Vec::new(),
    };

    let steps = RollingHorizon::new(1)
        .run(&Analysis::default(), &system, &SolverSettings::default(), &input)
        .expect("rolling horizon should run");
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.outcome.status.is_optimal()));

    // the first step builds the boiler
    let built = steps[0]
        .outcome
        .value("capacity_addition", &["boiler", "power", "n1", "0"]);
    assert!((built - 10.0).abs() < 1e-2, "first-step addition: {}", built);

    // the second step reuses the now-existing capacity instead of building
    let built_again = steps[1]
        .outcome
        .value("capacity_addition", &["boiler", "power", "n1", "0"]);
    assert!(built_again.abs() < 1e-2, "second-step addition: {}", built_again);
    let capacity = steps[1]
        .outcome
        .value("capacity", &["boiler", "power", "n1", "0"]);
    assert!(capacity >= 10.0 - 1e-2, "second-step capacity: {}", capacity);
}
