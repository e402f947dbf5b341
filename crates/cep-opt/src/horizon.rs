//! Rolling-horizon driver: assemble, solve, extract, roll the existing-
//! capacity state forward, reassemble.
//!
//! Each iteration builds a fresh context and model for a window of yearly
//! steps. After a solve, the first year's decisions are locked in: built
//! capacity becomes a new existing generation (with full lifetime and its
//! capex), prior generations age by one investment step, and the first
//! year's investment is carried as a pre-horizon investment for the
//! construction-time rule. Year-indexed input data shifts along with the
//! horizon start. Iteration stops at the first non-optimal solve; the
//! partial result is returned and the caller decides.

use std::collections::HashMap;

use cep_core::config::{Analysis, SolverSettings, System};
use cep_core::error::CepResult;
use cep_core::input::{ExistingCapacity, InputData, TechnologyKindData};

use crate::context::OptimizationContext;
use crate::solver::{solve, SolveOutcome};

/// Result of one horizon iteration
pub struct HorizonStep {
    /// Offset of the window start in yearly steps from the original horizon
    pub start_year: usize,
    pub outcome: SolveOutcome,
}

/// Rolling-horizon runner
pub struct RollingHorizon {
    window_years: usize,
}

impl RollingHorizon {
    /// `window_years` is the number of yearly steps optimized per
    /// iteration (the foresight window).
    pub fn new(window_years: usize) -> Self {
        Self {
            window_years: window_years.max(1),
        }
    }

    /// Step through the horizon one yearly step at a time.
    pub fn run(
        &self,
        analysis: &Analysis,
        system: &System,
        solver: &SolverSettings,
        input: &InputData,
    ) -> CepResult<Vec<HorizonStep>> {
        let total = system.optimized_years;
        let mut state = input.clone();
        let mut steps = Vec::new();

        for start in 0..total {
            let mut window_system = system.clone();
            window_system.optimized_years = self.window_years.min(total - start);

            let mut ctx = OptimizationContext::new(
                analysis.clone(),
                window_system,
                solver.clone(),
                state.clone(),
            )?;
            let model = ctx.assemble()?;
            let outcome = solve(&ctx, model)?;
            let optimal = outcome.status.is_optimal();
            steps.push(HorizonStep {
                start_year: start,
                outcome,
            });
            if !optimal {
                break;
            }
            if start + 1 < total {
                let outcome = &steps.last().expect("just pushed").outcome;
                update_existing_state(&mut state, &ctx, outcome);
            }
        }
        Ok(steps)
    }
}

/// Lock in the first year's decisions and roll the input state forward by
/// one yearly step.
fn update_existing_state(state: &mut InputData, ctx: &OptimizationContext, outcome: &SolveOutcome) {
    let interval = ctx.system.interval_between_years as f64;
    let power = ctx.system.power_type().to_string();
    let energy = ctx.system.energy_type().to_string();

    for tech in &mut state.technologies {
        for generation in &mut tech.existing_capacities {
            generation.remaining_lifetime -= interval;
        }
        tech.existing_capacities
            .retain(|g| g.remaining_lifetime > 0.0);

        let locations = ctx.locations_of(&*tech);
        for location in &locations {
            let added = outcome.value("capacity_addition", &[&tech.name, &power, location, "0"]);
            let added_energy =
                outcome.value("capacity_addition", &[&tech.name, &energy, location, "0"]);
            if added > 0.0 || added_energy > 0.0 {
                let capex = outcome.value("cost_capex", &[&tech.name, &power, location, "0"]);
                let capex_energy =
                    outcome.value("cost_capex", &[&tech.name, &energy, location, "0"]);
                tech.existing_capacities.push(ExistingCapacity {
                    location: location.clone(),
                    capacity: added,
                    capacity_energy: added_energy,
                    remaining_lifetime: tech.lifetime,
                    capex,
                    capex_energy,
                });
            }
        }

        // the first year's investment becomes a pre-horizon investment
        let mut shifted: HashMap<(String, i64), f64> = HashMap::new();
        for ((location, year), value) in tech.existing_invested.drain() {
            shifted.insert((location, year - 1), value);
        }
        tech.existing_invested = shifted;
        for location in &locations {
            let invested =
                outcome.value("capacity_investment", &[&tech.name, &power, location, "0"]);
            if invested > 0.0 {
                tech.existing_invested.insert((location.clone(), -1), invested);
            }
        }

        shift_year_keys(&mut tech.max_diffusion_rate);
        shift_location_year_keys(&mut tech.opex_specific_fixed);
        shift_location_year_keys(&mut tech.opex_specific_fixed_energy);
        shift_location_year_keys(&mut tech.capex_specific);
        shift_location_year_keys(&mut tech.capex_specific_energy);
        if let TechnologyKindData::Transport(transport) = &mut tech.kind_data {
            shift_location_year_keys(&mut transport.capex_per_distance);
        }
        shift_variation(&mut tech.yearly_variation);
    }

    for carrier in &mut state.carriers {
        shift_location_year_keys(&mut carrier.availability_import_yearly);
        shift_location_year_keys(&mut carrier.availability_export_yearly);
        shift_location_year_keys(&mut carrier.carbon_intensity);
        shift_variation(&mut carrier.yearly_variation);
    }
}

fn shift_year_keys(map: &mut HashMap<usize, f64>) {
    let shifted: HashMap<usize, f64> = map
        .drain()
        .filter(|(year, _)| *year >= 1)
        .map(|(year, value)| (year - 1, value))
        .collect();
    *map = shifted;
}

fn shift_location_year_keys(map: &mut HashMap<(String, usize), f64>) {
    let shifted: HashMap<(String, usize), f64> = map
        .drain()
        .filter(|((_, year), _)| *year >= 1)
        .map(|((location, year), value)| ((location, year - 1), value))
        .collect();
    *map = shifted;
}

fn shift_variation(map: &mut HashMap<String, Vec<f64>>) {
    for values in map.values_mut() {
        if values.len() > 1 {
            values.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_year_keys() {
        let mut map = HashMap::new();
        map.insert(0, 1.0);
        map.insert(2, 3.0);
        shift_year_keys(&mut map);
        assert_eq!(map.get(&1), Some(&3.0));
        assert!(!map.contains_key(&0) || map[&0] != 1.0);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_shift_location_year_keys() {
        let mut map = HashMap::new();
        map.insert(("a".to_string(), 0), 1.0);
        map.insert(("a".to_string(), 1), 2.0);
        shift_location_year_keys(&mut map);
        assert_eq!(map.get(&("a".to_string(), 0)), Some(&2.0));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_shift_variation_keeps_last() {
        let mut map = HashMap::new();
        map.insert("demand".to_string(), vec![1.0, 1.5, 2.0]);
        map.insert("price".to_string(), vec![1.0]);
        shift_variation(&mut map);
        assert_eq!(map["demand"], vec![1.5, 2.0]);
        assert_eq!(map["price"], vec![1.0]);
    }
}
