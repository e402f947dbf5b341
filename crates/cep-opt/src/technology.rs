//! Technology subsystem: capacity expansion, lifetime bookkeeping,
//! diffusion limits, capex/opex/carbon accrual, and the on/off disjunction.
//!
//! Shared behavior of all technology kinds lives here; kind-specific flows
//! and couplings are declared by the [`crate::conversion`],
//! [`crate::transport`] and [`crate::storage`] hooks dispatched over the
//! kind tags.
//!
//! Binary installation decisions are emitted only where they materially
//! affect the model: a non-zero minimum addition, or (for transport with
//! the double-capex flag) a non-zero per-distance capex term. Everything
//! else stays a pure LP. On/off min-load semantics use a big-M
//! reformulation with M taken from the provable capacity upper bound,
//! never an arbitrary constant.

use std::collections::HashMap;

use good_lp::{constraint, Expression};

use cep_core::error::{CepError, CepResult};
use cep_core::input::{TechnologyData, TechnologyKind};
use cep_core::sets::{
    SET_LOCATION, SET_ON_OFF, SET_TECHNOLOGIES, SET_TIME_STEPS_OPERATION, SET_TIME_STEPS_YEARLY,
};

use crate::component::{ModelComponents, VarDomain, VariableBlock};
use crate::context::{OptimizationContext, SET_TECH_CAPACITY_TYPES};
use crate::{conversion, storage, transport};

/// Decayed knowledge weight `(1 - delta)^age`, clamped to non-negative ages.
pub fn knowledge_decay(depreciation_rate: f64, age_years: f64) -> f64 {
    (1.0 - depreciation_rate).powf(age_years.max(0.0))
}

pub fn declare_vars(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let capacity_index = ctx.sets.create_custom_set(&[
        SET_TECHNOLOGIES,
        SET_TECH_CAPACITY_TYPES,
        SET_LOCATION,
        SET_TIME_STEPS_YEARLY,
    ])?;
    let operation_index = ctx
        .sets
        .create_custom_set(&[SET_TECHNOLOGIES, SET_LOCATION, SET_TIME_STEPS_OPERATION])?;
    let location_yearly_index = ctx
        .sets
        .create_custom_set(&[SET_TECHNOLOGIES, SET_LOCATION, SET_TIME_STEPS_YEARLY])?;
    let yearly_index = (
        ctx.years().into_iter().map(|y| vec![y]).collect::<Vec<_>>(),
        vec![SET_TIME_STEPS_YEARLY.to_string()],
    );

    // capacity bounds are finite only where the big-M reformulation needs
    // them (on/off technologies)
    let mut capacity_bounds: HashMap<Vec<String>, f64> = HashMap::new();
    for tuple in &capacity_index.0 {
        let tech = ctx.technology(&tuple[0])?;
        if tech.is_on_off() {
            let bound = ctx.capacity_upper_bound(tech, &tuple[1], &tuple[2]);
            capacity_bounds.insert(tuple.clone(), bound);
        }
    }
    m.add_variable_bounded(
        "capacity",
        capacity_index.clone(),
        |tuple| {
            let upper = capacity_bounds.get(tuple).copied().unwrap_or(f64::INFINITY);
            (0.0, upper)
        },
        &mut ctx.diagnostics,
    );
    m.add_variable("capacity_previous", capacity_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("capacity_addition", capacity_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("capacity_investment", capacity_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("cost_capex", capacity_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("capex_yearly", capacity_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);

    // installation binary, only where it has a non-zero coefficient
    let installation_tuples: Vec<Vec<String>> = capacity_index
        .0
        .iter()
        .filter(|tuple| {
            installation_needed(ctx, tuple).unwrap_or(false)
        })
        .cloned()
        .collect();
    m.add_variable(
        "technology_installation",
        (installation_tuples, capacity_index.1.clone()),
        VarDomain::RelaxedBinary,
        &mut ctx.diagnostics,
    );

    m.add_variable("cost_opex", operation_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable(
        "carbon_emissions_technology",
        operation_index,
        VarDomain::Continuous,
        &mut ctx.diagnostics,
    );
    m.add_variable("opex_yearly", location_yearly_index, VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("cost_capex_total", yearly_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("cost_opex_total", yearly_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable(
        "carbon_emissions_technology_total",
        yearly_index.clone(),
        VarDomain::Continuous,
        &mut ctx.diagnostics,
    );
    m.add_variable(
        "carbon_emissions_total",
        yearly_index,
        VarDomain::Continuous,
        &mut ctx.diagnostics,
    );

    let on_off_index = ctx
        .sets
        .create_custom_set(&[SET_ON_OFF, SET_LOCATION, SET_TIME_STEPS_OPERATION])?;
    m.add_variable("technology_on", on_off_index.clone(), VarDomain::RelaxedBinary, &mut ctx.diagnostics);
    m.add_variable("technology_off", on_off_index, VarDomain::RelaxedBinary, &mut ctx.diagnostics);

    conversion::declare_vars(ctx, m)?;
    transport::declare_vars(ctx, m)?;
    storage::declare_vars(ctx, m)?;
    Ok(())
}

/// A binary matters when the technology has a non-zero minimum addition or
/// a fixed (per-distance) capex term under the double-capex flag.
fn installation_needed(ctx: &OptimizationContext, tuple: &[String]) -> CepResult<bool> {
    let tech = ctx.technology(&tuple[0])?;
    let min_built = ctx
        .params
        .get("min_built_capacity")?
        .get(&[&tuple[0], &tuple[1]]);
    if min_built != 0.0 {
        return Ok(true);
    }
    if ctx.system.double_capex_transport && tech.kind() == TechnologyKind::Transport {
        let per_distance = ctx
            .params
            .get("capex_per_distance")?
            .get(&[&tuple[0], &tuple[2], &tuple[3]]);
        return Ok(per_distance != 0.0);
    }
    Ok(false)
}

/// Reference flow of a technology at one location and step.
pub fn reference_flow(
    ctx: &OptimizationContext,
    m: &ModelComponents,
    tech: &TechnologyData,
    location: &str,
    step: &str,
) -> CepResult<Expression> {
    let mut expr = Expression::from(0.0);
    match tech.kind() {
        TechnologyKind::Conversion => {
            let conversion = tech.conversion().expect("conversion data");
            let block = if conversion.input_carriers.contains(&tech.reference_carrier) {
                m.var("input_flow")?
            } else {
                m.var("output_flow")?
            };
            expr += block.get(&[&tech.name, &tech.reference_carrier, location, step])?;
        }
        TechnologyKind::Transport => {
            expr += m.var("transport_flow")?.get(&[&tech.name, location, step])?;
        }
        TechnologyKind::Storage => {
            expr += m.var("storage_charge")?.get(&[&tech.name, location, step])?;
            expr += m.var("storage_discharge")?.get(&[&tech.name, location, step])?;
        }
    }
    Ok(expr)
}

pub fn declare_constraints(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let (capacity_tuples, capacity_dims) = ctx.sets.create_custom_set(&[
        SET_TECHNOLOGIES,
        SET_TECH_CAPACITY_TYPES,
        SET_LOCATION,
        SET_TIME_STEPS_YEARLY,
    ])?;
    let (operation_tuples, operation_dims) = ctx
        .sets
        .create_custom_set(&[SET_TECHNOLOGIES, SET_LOCATION, SET_TIME_STEPS_OPERATION])?;

    let capacity = m.var("capacity")?.clone();
    let capacity_previous = m.var("capacity_previous")?.clone();
    let capacity_addition = m.var("capacity_addition")?.clone();
    let capacity_investment = m.var("capacity_investment")?.clone();
    let cost_capex = m.var("cost_capex")?.clone();
    let capex_yearly = m.var("capex_yearly")?.clone();
    let installation = m.var("technology_installation")?.clone();
    let cost_opex = m.var("cost_opex")?.clone();
    let opex_yearly = m.var("opex_yearly")?.clone();
    let carbon_tech = m.var("carbon_emissions_technology")?.clone();

    let capacity_limit = ctx.params.get("capacity_limit")?.clone();
    let min_built = ctx.params.get("min_built_capacity")?.clone();
    let max_built = ctx.params.get("max_built_capacity")?.clone();
    let diffusion_rate = ctx.params.get("max_diffusion_rate")?.clone();
    let invested_existing = ctx.params.get("capacity_investment_existing")?.clone();
    let opex_variable = ctx.params.get("opex_specific_variable")?.clone();
    let opex_fixed = ctx.params.get("opex_specific_fixed")?.clone();
    let carbon_intensity = ctx.params.get("carbon_intensity_technology")?.clone();
    let max_load = ctx.params.get("max_load")?.clone();
    let min_load = ctx.params.get("min_load")?.clone();
    let duration = ctx.params.get("duration")?.clone();

    // 1. capacity limit: cap at the limit while existing stock is below it,
    //    freeze additions once existing stock already exceeds it
    {
        let mut entries = Vec::new();
        for tuple in &capacity_tuples {
            let limit = capacity_limit.get(&[&tuple[0], &tuple[1], &tuple[2]]);
            if limit.is_infinite() {
                continue;
            }
            let tech = ctx.technology(&tuple[0])?;
            let year: usize = tuple[3].parse().expect("year id");
            let existing = ctx.existing_surviving(tech, &tuple[1], &tuple[2], year);
            let entry = if existing < limit {
                let var = capacity.try_get_tuple(tuple).expect("active tuple");
                constraint!(var <= limit)
            } else {
                let var = capacity_addition.try_get_tuple(tuple).expect("active tuple");
                constraint!(Expression::from(var) == 0.0)
            };
            entries.push((tuple.clone(), entry));
        }
        m.add_constraint_block("capacity_limit", capacity_dims.clone(), entries, &mut ctx.diagnostics);
    }

    // 2./3. minimum and maximum addition, coupled to the installation
    //       binary where it exists
    {
        let mut min_entries = Vec::new();
        let mut max_entries = Vec::new();
        for tuple in &capacity_tuples {
            let addition = capacity_addition.try_get_tuple(tuple).expect("active tuple");
            let binary = installation.try_get_tuple(tuple);
            let minimum = min_built.get(&[&tuple[0], &tuple[1]]);
            if minimum != 0.0 {
                let binary = binary.expect("installation binary exists for non-zero minimum");
                min_entries.push((
                    tuple.clone(),
                    constraint!(minimum * binary - addition <= 0.0),
                ));
            }
            let maximum = max_built.get(&[&tuple[0], &tuple[1]]);
            if maximum.is_finite() && maximum != 0.0 {
                let entry = match binary {
                    Some(binary) => constraint!(addition - maximum * binary <= 0.0),
                    None => constraint!(addition <= maximum),
                };
                max_entries.push((tuple.clone(), entry));
            }
        }
        m.add_constraint_block("min_capacity_addition", capacity_dims.clone(), min_entries, &mut ctx.diagnostics);
        m.add_constraint_block("max_capacity_addition", capacity_dims.clone(), max_entries, &mut ctx.diagnostics);
    }

    // 4. construction time: additions materialize after the lead time, from
    //    in-horizon investments or known pre-horizon investments
    {
        let mut entries = Vec::new();
        for tuple in &capacity_tuples {
            let tech = ctx.technology(&tuple[0])?;
            let lag = ctx.construction_lag(tech);
            let year: i64 = tuple[3].parse::<i64>().expect("year id");
            let source_year = year - lag;
            let addition = capacity_addition.try_get_tuple(tuple).expect("active tuple");
            let entry = if source_year >= 0 {
                let invested = capacity_investment
                    .try_get(&[&tuple[0], &tuple[1], &tuple[2], &source_year.to_string()])
                    .expect("active tuple");
                constraint!(addition - invested == 0.0)
            } else {
                let known = invested_existing.get(&[
                    &tuple[0],
                    &tuple[1],
                    &tuple[2],
                    &source_year.to_string(),
                ]);
                if known < 0.0 {
                    return Err(CepError::Infeasible(format!(
                        "technology {}: negative pre-horizon investment at year {}",
                        tuple[0], source_year
                    )));
                }
                constraint!(Expression::from(addition) == known)
            };
            entries.push((tuple.clone(), entry));
        }
        m.add_constraint_block("construction_time", capacity_dims.clone(), entries, &mut ctx.diagnostics);
    }

    // 5. lifetime accounting: capacity equals in-window additions plus
    //    surviving existing stock; capacity_previous excludes the
    //    current year's addition
    {
        let mut entries = Vec::new();
        let mut previous_entries = Vec::new();
        for tuple in &capacity_tuples {
            let tech = ctx.technology(&tuple[0])?;
            let year: usize = tuple[3].parse().expect("year id");
            let existing = ctx.existing_surviving(tech, &tuple[1], &tuple[2], year);
            let window = ctx.lifetime_window(tech, year);

            let var = capacity.try_get_tuple(tuple).expect("active tuple");
            let mut expr = Expression::from(var);
            let mut previous_expr = Expression::from(
                capacity_previous.try_get_tuple(tuple).expect("active tuple"),
            );
            for y in &window {
                let addition = capacity_addition
                    .try_get(&[&tuple[0], &tuple[1], &tuple[2], &y.to_string()])
                    .expect("active tuple");
                expr -= addition;
                if *y != year {
                    previous_expr -= addition;
                }
            }
            entries.push((tuple.clone(), constraint!(expr == existing)));
            previous_entries.push((tuple.clone(), constraint!(previous_expr == existing)));
        }
        m.add_constraint_block("capacity_lifetime", capacity_dims.clone(), entries, &mut ctx.diagnostics);
        m.add_constraint_block(
            "capacity_previous",
            capacity_dims.clone(),
            previous_entries,
            &mut ctx.diagnostics,
        );
    }

    // 6. diffusion limit: additions bounded by the decayed knowledge stock
    //    plus the unbounded market share of same-kind siblings, per
    //    location and for the total fleet
    declare_diffusion_limit(ctx, m, &capacity_tuples, &capacity_dims, &capacity_addition, &diffusion_rate)?;

    // 7. capex: addition cost and its annualized accrual over the lifetime
    //    window, including still-depreciating existing stock
    {
        let capex_specific = ctx.params.get("capex_specific")?.clone();
        let mut cost_entries = Vec::new();
        let mut yearly_entries = Vec::new();
        for tuple in &capacity_tuples {
            let tech = ctx.technology(&tuple[0])?;
            let year: usize = tuple[3].parse().expect("year id");
            let cost = cost_capex.try_get_tuple(tuple).expect("active tuple");
            let addition = capacity_addition.try_get_tuple(tuple).expect("active tuple");

            if tech.kind() == TechnologyKind::Transport {
                transport::capex_entry(
                    ctx,
                    tech,
                    tuple,
                    cost,
                    addition,
                    &installation,
                    &capex_specific,
                    &mut cost_entries,
                )?;
            } else {
                let specific = capex_specific.get_tuple(tuple);
                cost_entries.push((tuple.clone(), constraint!(cost - specific * addition == 0.0)));
            }

            let annuity = ctx.annuity(tech);
            let existing_capex = ctx.existing_capex_surviving(tech, &tuple[1], &tuple[2], year);
            let yearly = capex_yearly.try_get_tuple(tuple).expect("active tuple");
            let mut expr = Expression::from(yearly);
            for y in ctx.lifetime_window(tech, year) {
                let in_window = cost_capex
                    .try_get(&[&tuple[0], &tuple[1], &tuple[2], &y.to_string()])
                    .expect("active tuple");
                expr -= annuity * in_window;
            }
            yearly_entries.push((tuple.clone(), constraint!(expr == annuity * existing_capex)));
        }
        m.add_constraint_block("capex_addition", capacity_dims.clone(), cost_entries, &mut ctx.diagnostics);
        m.add_constraint_block("capex_yearly", capacity_dims.clone(), yearly_entries, &mut ctx.diagnostics);
    }

    // 8./10. per-step opex and carbon from the reference flow
    {
        let mut opex_entries = Vec::new();
        let mut carbon_entries = Vec::new();
        for tuple in &operation_tuples {
            let tech = ctx.technology(&tuple[0])?;
            let flow = reference_flow(ctx, m, tech, &tuple[1], &tuple[2])?;
            let opex = cost_opex.try_get_tuple(tuple).expect("active tuple");
            let rate = opex_variable.get_tuple(tuple);
            opex_entries.push((tuple.clone(), constraint!(opex - rate * flow.clone() == 0.0)));

            let carbon = carbon_tech.try_get_tuple(tuple).expect("active tuple");
            let intensity = carbon_intensity.get(&[&tuple[0], &tuple[1]]);
            carbon_entries.push((tuple.clone(), constraint!(carbon - intensity * flow == 0.0)));
        }
        m.add_constraint_block("opex_step", operation_dims.clone(), opex_entries, &mut ctx.diagnostics);
        m.add_constraint_block(
            "carbon_emissions_step",
            operation_dims.clone(),
            carbon_entries,
            &mut ctx.diagnostics,
        );
    }

    // 9. yearly opex: duration-weighted variable opex plus fixed opex on
    //    installed capacity
    {
        let (tuples, dims) = ctx
            .sets
            .create_custom_set(&[SET_TECHNOLOGIES, SET_LOCATION, SET_TIME_STEPS_YEARLY])?;
        let mut entries = Vec::new();
        for tuple in &tuples {
            let tech = ctx.technology(&tuple[0])?;
            let year: usize = tuple[2].parse().expect("year id");
            let yearly = opex_yearly.try_get_tuple(tuple).expect("active tuple");
            let mut expr = Expression::from(yearly);
            for t in ctx.year_steps(year)? {
                let tau = duration.get(&[&t]);
                let opex = cost_opex
                    .try_get(&[&tuple[0], &tuple[1], &t])
                    .expect("active tuple");
                expr -= tau * opex;
            }
            for capacity_type in ctx.capacity_types_of(tech) {
                let fixed = opex_fixed.get(&[&tuple[0], &capacity_type, &tuple[1], &tuple[2]]);
                if fixed != 0.0 {
                    let var = capacity
                        .try_get(&[&tuple[0], &capacity_type, &tuple[1], &tuple[2]])
                        .expect("active tuple");
                    expr -= fixed * var;
                }
            }
            entries.push((tuple.clone(), constraint!(expr == 0.0)));
        }
        m.add_constraint_block("opex_yearly", dims, entries, &mut ctx.diagnostics);
    }

    // 11. yearly totals
    declare_totals(ctx, m, &capacity_tuples, &operation_tuples)?;

    // 12. on/off disjunction via big-M
    declare_on_off(ctx, m, &min_load, &max_load)?;

    // capacity factor: reference flow limited by installed capacity and
    // max load
    {
        let mut entries = Vec::new();
        let power = ctx.system.power_type().to_string();
        for tuple in &operation_tuples {
            let tech = ctx.technology(&tuple[0])?;
            let load = max_load.get_tuple(tuple);
            let year = ctx.step_year(&tuple[2])?;
            let cap = capacity
                .try_get(&[&tuple[0], &power, &tuple[1], &year.to_string()])
                .expect("active tuple");
            let flow = reference_flow(ctx, m, tech, &tuple[1], &tuple[2])?;
            entries.push((tuple.clone(), constraint!(load * cap - flow >= 0.0)));
        }
        m.add_constraint_block("capacity_factor", operation_dims, entries, &mut ctx.diagnostics);
    }

    // 13. bidirectional transport and other kind hooks
    conversion::declare_constraints(ctx, m)?;
    transport::declare_constraints(ctx, m)?;
    storage::declare_constraints(ctx, m)?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn declare_diffusion_limit(
    ctx: &mut OptimizationContext,
    m: &mut ModelComponents,
    capacity_tuples: &[Vec<String>],
    capacity_dims: &[String],
    capacity_addition: &VariableBlock,
    diffusion_rate: &cep_core::params::Parameter,
) -> CepResult<()> {
    let interval = ctx.system.interval_between_years as f64;
    let depreciation = ctx.system.knowledge_depreciation_rate;
    let market_share = ctx.system.unbounded_market_share;

    let mut entries = Vec::new();
    let mut fleet_entries = Vec::new();
    let mut fleet_done: Vec<Vec<String>> = Vec::new();

    for tuple in capacity_tuples {
        let rate = diffusion_rate.get(&[&tuple[0], &tuple[3]]);
        if rate.is_infinite() {
            continue;
        }
        let tech = ctx.technology(&tuple[0])?.clone();
        let year: i64 = tuple[3].parse::<i64>().expect("year id");
        let growth = (1.0 + rate).powf(interval) - 1.0;
        // the knowledge stock is built from strictly earlier years
        let end_year = year - 1;
        let locations = ctx.locations_of(&tech);
        let spillover = match tech.kind() {
            TechnologyKind::Transport => 0.0,
            _ => ctx.system.knowledge_spillover_rate,
        };

        let addition = capacity_addition.try_get_tuple(tuple).expect("active tuple");
        let mut lhs = Expression::from(addition);
        let mut rhs = tech.unbounded_addition * interval;

        // knowledge stock from in-horizon additions, with spillover
        if end_year >= 0 {
            for y in 0..=end_year as usize {
                let decay = knowledge_decay(depreciation, interval * (end_year as f64 - y as f64));
                for location in &locations {
                    let weight = if location == &tuple[2] {
                        1.0
                    } else {
                        spillover
                    };
                    if weight == 0.0 {
                        continue;
                    }
                    let var = capacity_addition
                        .try_get(&[&tuple[0], &tuple[1], location, &y.to_string()])
                        .expect("active tuple");
                    lhs -= growth * decay * weight * var;
                }
            }
        }
        // knowledge stock from existing generations
        for generation in &tech.existing_capacities {
            let weight = if generation.location == tuple[2] {
                1.0
            } else {
                spillover
            };
            if weight == 0.0 {
                continue;
            }
            let cap = if tuple[1] == ctx.system.energy_type() {
                generation.capacity_energy
            } else {
                generation.capacity
            };
            let age = interval * end_year.max(0) as f64 + tech.lifetime - generation.remaining_lifetime;
            rhs += growth * weight * cap * knowledge_decay(depreciation, age);
        }

        // unbounded market share of same-kind siblings
        let siblings = ctx.reference_carrier_siblings(&tech);
        if market_share > 0.0 && end_year >= 0 {
            for sibling_name in &siblings {
                let sibling = ctx.technology(sibling_name)?.clone();
                rhs += market_share
                    * ctx.existing_surviving(&sibling, &tuple[1], &tuple[2], year as usize);
                for y in ctx.lifetime_window(&sibling, end_year as usize) {
                    if let Some(var) = capacity_addition.try_get(&[
                        sibling_name,
                        &tuple[1],
                        &tuple[2],
                        &y.to_string(),
                    ]) {
                        lhs -= market_share * var;
                    }
                }
            }
        }

        entries.push((tuple.clone(), constraint!(lhs <= rhs)));

        // total-fleet variant, spillover disabled, one per (tech, type, year)
        let fleet_key = vec![tuple[0].clone(), tuple[1].clone(), tuple[3].clone()];
        if !fleet_done.contains(&fleet_key) {
            fleet_done.push(fleet_key.clone());
            let mut lhs = Expression::from(0.0);
            let mut rhs = tech.unbounded_addition * interval;
            for location in &locations {
                let var = capacity_addition
                    .try_get(&[&tuple[0], &tuple[1], location, &tuple[3]])
                    .expect("active tuple");
                lhs += var;
                if end_year >= 0 {
                    for y in 0..=end_year as usize {
                        let decay =
                            knowledge_decay(depreciation, interval * (end_year as f64 - y as f64));
                        let addition = capacity_addition
                            .try_get(&[&tuple[0], &tuple[1], location, &y.to_string()])
                            .expect("active tuple");
                        lhs -= growth * decay * addition;
                    }
                }
                if market_share > 0.0 && end_year >= 0 {
                    for sibling_name in &siblings {
                        let sibling = ctx.technology(sibling_name)?.clone();
                        rhs += market_share
                            * ctx.existing_surviving(&sibling, &tuple[1], location, year as usize);
                        for y in ctx.lifetime_window(&sibling, end_year as usize) {
                            if let Some(var) = capacity_addition.try_get(&[
                                sibling_name,
                                &tuple[1],
                                location,
                                &y.to_string(),
                            ]) {
                                lhs -= market_share * var;
                            }
                        }
                    }
                }
            }
            for generation in &tech.existing_capacities {
                let cap = if tuple[1] == ctx.system.energy_type() {
                    generation.capacity_energy
                } else {
                    generation.capacity
                };
                let age =
                    interval * end_year.max(0) as f64 + tech.lifetime - generation.remaining_lifetime;
                rhs += growth * cap * knowledge_decay(depreciation, age);
            }
            fleet_entries.push((fleet_key, constraint!(lhs <= rhs)));
        }
    }

    m.add_constraint_block("diffusion_limit", capacity_dims.to_vec(), entries, &mut ctx.diagnostics);
    m.add_constraint_block(
        "diffusion_limit_total",
        vec![
            SET_TECHNOLOGIES.to_string(),
            SET_TECH_CAPACITY_TYPES.to_string(),
            SET_TIME_STEPS_YEARLY.to_string(),
        ],
        fleet_entries,
        &mut ctx.diagnostics,
    );
    Ok(())
}

fn declare_totals(
    ctx: &mut OptimizationContext,
    m: &mut ModelComponents,
    capacity_tuples: &[Vec<String>],
    operation_tuples: &[Vec<String>],
) -> CepResult<()> {
    let capex_yearly = m.var("capex_yearly")?.clone();
    let opex_yearly = m.var("opex_yearly")?.clone();
    let carbon_tech = m.var("carbon_emissions_technology")?.clone();
    let capex_total = m.var("cost_capex_total")?.clone();
    let opex_total = m.var("cost_opex_total")?.clone();
    let carbon_tech_total = m.var("carbon_emissions_technology_total")?.clone();
    let carbon_total = m.var("carbon_emissions_total")?.clone();
    let carbon_carrier_total = m.var("carbon_emissions_carrier_total")?.clone();
    let duration = ctx.params.get("duration")?.clone();

    let (location_yearly_tuples, _) = ctx
        .sets
        .create_custom_set(&[SET_TECHNOLOGIES, SET_LOCATION, SET_TIME_STEPS_YEARLY])?;

    let mut capex_entries = Vec::new();
    let mut opex_entries = Vec::new();
    let mut carbon_entries = Vec::new();
    let mut total_entries = Vec::new();
    for year in ctx.years() {
        let y: usize = year.parse().expect("year id");

        let mut capex_expr = Expression::from(0.0);
        for tuple in capacity_tuples.iter().filter(|t| t[3] == year) {
            capex_expr += capex_yearly.try_get_tuple(tuple).expect("active tuple");
        }
        let total = capex_total.try_get(&[&year]).expect("active tuple");
        capex_entries.push((vec![year.clone()], constraint!(total - capex_expr == 0.0)));

        let mut opex_expr = Expression::from(0.0);
        for tuple in location_yearly_tuples.iter().filter(|t| t[2] == year) {
            opex_expr += opex_yearly.try_get_tuple(tuple).expect("active tuple");
        }
        let total = opex_total.try_get(&[&year]).expect("active tuple");
        opex_entries.push((vec![year.clone()], constraint!(total - opex_expr == 0.0)));

        let steps = ctx.year_steps(y)?;
        let mut carbon_expr = Expression::from(0.0);
        for tuple in operation_tuples.iter().filter(|t| steps.contains(&t[2])) {
            let tau = duration.get(&[&tuple[2]]);
            carbon_expr += tau * carbon_tech.try_get_tuple(tuple).expect("active tuple");
        }
        let total = carbon_tech_total.try_get(&[&year]).expect("active tuple");
        carbon_entries.push((vec![year.clone()], constraint!(total - carbon_expr == 0.0)));

        let total = carbon_total.try_get(&[&year]).expect("active tuple");
        let tech_part = carbon_tech_total.try_get(&[&year]).expect("active tuple");
        let carrier_part = carbon_carrier_total.try_get(&[&year]).expect("active tuple");
        total_entries.push((
            vec![year.clone()],
            constraint!(total - tech_part - carrier_part == 0.0),
        ));
    }
    let yearly_dims = vec![SET_TIME_STEPS_YEARLY.to_string()];
    m.add_constraint_block("cost_capex_total", yearly_dims.clone(), capex_entries, &mut ctx.diagnostics);
    m.add_constraint_block("cost_opex_total", yearly_dims.clone(), opex_entries, &mut ctx.diagnostics);
    m.add_constraint_block(
        "carbon_emissions_technology_total",
        yearly_dims.clone(),
        carbon_entries,
        &mut ctx.diagnostics,
    );
    m.add_constraint_block("carbon_emissions_total", yearly_dims, total_entries, &mut ctx.diagnostics);
    Ok(())
}

/// On/off disjunction: the two relaxed binaries sum to one; the "on"
/// disjunct enforces the minimum load, the "off" disjunct forces the
/// reference flow to zero. Big-M comes from the provable capacity bound.
fn declare_on_off(
    ctx: &mut OptimizationContext,
    m: &mut ModelComponents,
    min_load: &cep_core::params::Parameter,
    max_load: &cep_core::params::Parameter,
) -> CepResult<()> {
    let (tuples, dims) = ctx
        .sets
        .create_custom_set(&[SET_ON_OFF, SET_LOCATION, SET_TIME_STEPS_OPERATION])?;
    if tuples.is_empty() {
        return Ok(());
    }

    let on = m.var("technology_on")?.clone();
    let off = m.var("technology_off")?.clone();
    let capacity = m.var("capacity")?.clone();
    let power = ctx.system.power_type().to_string();

    let mut exclusive = Vec::new();
    let mut on_entries = Vec::new();
    let mut off_entries = Vec::new();
    for tuple in &tuples {
        let tech = ctx.technology(&tuple[0])?;
        let big_m = ctx.capacity_upper_bound(tech, &power, &tuple[1])
            * max_load.get_tuple(tuple).max(1.0);
        if !big_m.is_finite() {
            return Err(CepError::Data(format!(
                "technology {}: min-load semantics need a finite max addition or capacity limit",
                tuple[0]
            )));
        }

        let on_var = on.try_get_tuple(tuple).expect("active tuple");
        let off_var = off.try_get_tuple(tuple).expect("active tuple");
        exclusive.push((tuple.clone(), constraint!(on_var + off_var == 1.0)));

        let year = ctx.step_year(&tuple[2])?;
        let cap = capacity
            .try_get(&[&tuple[0], &power, &tuple[1], &year.to_string()])
            .expect("active tuple");
        let flow = reference_flow(ctx, m, tech, &tuple[1], &tuple[2])?;
        let load = min_load.get_tuple(tuple);

        on_entries.push((
            tuple.clone(),
            constraint!(load * cap - flow.clone() - big_m * off_var <= 0.0),
        ));
        off_entries.push((tuple.clone(), constraint!(flow - big_m * on_var <= 0.0)));
    }
    m.add_constraint_block("on_off_exclusive", dims.clone(), exclusive, &mut ctx.diagnostics);
    m.add_constraint_block("min_load_on", dims.clone(), on_entries, &mut ctx.diagnostics);
    m.add_constraint_block("flow_off", dims, off_entries, &mut ctx.diagnostics);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_knowledge_decay() {
        assert_eq!(knowledge_decay(0.0, 10.0), 1.0);
        assert!((knowledge_decay(0.1, 1.0) - 0.9).abs() < 1e-12);
        assert!((knowledge_decay(0.1, 2.0) - 0.81).abs() < 1e-12);
        // negative ages clamp to no decay
        assert_eq!(knowledge_decay(0.5, -3.0), 1.0);
    }
}
