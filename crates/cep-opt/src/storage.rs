//! Storage technologies: charge/discharge flows and the cyclic storage
//! level balance with self-discharge and charge/discharge efficiencies.
//!
//! The level is tracked on the operational grid in sequence order within
//! each year, cyclically: the first step of a year follows from its last,
//! so the stored energy carried through a year is conserved. The level is
//! capped by the energy capacity installed in the step's year.

use good_lp::constraint;

use cep_core::error::CepResult;
use cep_core::sets::{SET_LOCATION, SET_STORAGE_TECHNOLOGIES, SET_TIME_STEPS_OPERATION};

use crate::component::{ModelComponents, VarDomain};
use crate::context::OptimizationContext;

pub fn declare_vars(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let index = ctx.sets.create_custom_set(&[
        SET_STORAGE_TECHNOLOGIES,
        SET_LOCATION,
        SET_TIME_STEPS_OPERATION,
    ])?;
    m.add_variable("storage_charge", index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("storage_discharge", index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("storage_level", index, VarDomain::NonNegative, &mut ctx.diagnostics);
    Ok(())
}

pub fn declare_constraints(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    if ctx.system.storage_technologies.is_empty() {
        return Ok(());
    }
    let charge = m.var("storage_charge")?.clone();
    let discharge = m.var("storage_discharge")?.clone();
    let level = m.var("storage_level")?.clone();
    let capacity = m.var("capacity")?.clone();
    let efficiency_charge = ctx.params.get("efficiency_charge")?.clone();
    let efficiency_discharge = ctx.params.get("efficiency_discharge")?.clone();
    let self_discharge = ctx.params.get("self_discharge")?.clone();
    let duration = ctx.params.get("duration")?.clone();

    let (tuples, dims) = ctx.sets.create_custom_set(&[
        SET_STORAGE_TECHNOLOGIES,
        SET_LOCATION,
        SET_TIME_STEPS_OPERATION,
    ])?;

    let energy = ctx.system.energy_type().to_string();
    let mut balance_entries = Vec::new();
    let mut capacity_entries = Vec::new();
    for tuple in &tuples {
        let step: usize = tuple[2].parse().expect("step id");
        let year = ctx.step_year(&tuple[2])?;
        let year_steps = ctx.time_steps.year_to_operation(crate::context::SYSTEM_GRID, year)?;
        let first = *year_steps.first().expect("non-empty year");
        let last = *year_steps.last().expect("non-empty year");
        let previous = if step == first { last } else { step - 1 };

        let tau = duration.get(&[&tuple[2]]);
        let keep = (1.0 - self_discharge.get(&[&tuple[0]])).powf(tau);
        let eta_charge = efficiency_charge.get(&[&tuple[0]]);
        let eta_discharge = efficiency_discharge.get(&[&tuple[0]]);

        let level_var = level.try_get_tuple(tuple).expect("active tuple");
        let previous_level = level
            .try_get(&[&tuple[0], &tuple[1], &previous.to_string()])
            .expect("active tuple");
        let charge_var = charge.try_get_tuple(tuple).expect("active tuple");
        let discharge_var = discharge.try_get_tuple(tuple).expect("active tuple");
        balance_entries.push((
            tuple.clone(),
            constraint!(
                level_var - keep * previous_level - tau * eta_charge * charge_var
                    + tau * (1.0 / eta_discharge) * discharge_var
                    == 0.0
            ),
        ));

        let energy_capacity = capacity
            .try_get(&[&tuple[0], &energy, &tuple[1], &year.to_string()])
            .expect("active tuple");
        capacity_entries.push((
            tuple.clone(),
            constraint!(level_var - energy_capacity <= 0.0),
        ));
    }
    m.add_constraint_block("storage_level_balance", dims.clone(), balance_entries, &mut ctx.diagnostics);
    m.add_constraint_block("storage_level_capacity", dims, capacity_entries, &mut ctx.diagnostics);
    Ok(())
}
