//! Carrier subsystem: import/export, prices, carbon, shed demand, and the
//! nodal energy balance.
//!
//! Per `(carrier, node, operational step)` the carrier owns import and
//! export flows, their cost, carbon emissions and the shed-demand slack;
//! per year the cost and carbon totals. The nodal energy balance closes the
//! system: conversion in/out, transport in/out with losses, storage
//! charge/discharge, import, export and shed demand against demand, as an
//! exact equality.

use good_lp::{constraint, Expression};

use cep_core::error::CepResult;
use cep_core::input::TechnologyKind;
use cep_core::sets::{
    SET_CARRIERS, SET_NODES, SET_TIME_STEPS_OPERATION, SET_TIME_STEPS_YEARLY,
};

use crate::component::{ModelComponents, VarDomain};
use crate::context::OptimizationContext;

pub fn declare_vars(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let step_index = ctx
        .sets
        .create_custom_set(&[SET_CARRIERS, SET_NODES, SET_TIME_STEPS_OPERATION])?;
    let yearly_index = (
        ctx.years().into_iter().map(|y| vec![y]).collect::<Vec<_>>(),
        vec![SET_TIME_STEPS_YEARLY.to_string()],
    );

    m.add_variable("import_flow", step_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("export_flow", step_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("cost_carrier", step_index.clone(), VarDomain::Continuous, &mut ctx.diagnostics);
    m.add_variable(
        "carbon_emissions_carrier",
        step_index.clone(),
        VarDomain::Continuous,
        &mut ctx.diagnostics,
    );
    m.add_variable("shed_demand", step_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("cost_shed_demand", step_index, VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable(
        "cost_carrier_total",
        yearly_index.clone(),
        VarDomain::Continuous,
        &mut ctx.diagnostics,
    );
    m.add_variable(
        "carbon_emissions_carrier_total",
        yearly_index,
        VarDomain::Continuous,
        &mut ctx.diagnostics,
    );
    Ok(())
}

pub fn declare_constraints(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let (step_tuples, step_dims) = ctx
        .sets
        .create_custom_set(&[SET_CARRIERS, SET_NODES, SET_TIME_STEPS_OPERATION])?;
    let (yearly_tuples, yearly_dims) = ctx
        .sets
        .create_custom_set(&[SET_CARRIERS, SET_NODES, SET_TIME_STEPS_YEARLY])?;

    let import_flow = m.var("import_flow")?.clone();
    let export_flow = m.var("export_flow")?.clone();
    let cost_carrier = m.var("cost_carrier")?.clone();
    let carbon_carrier = m.var("carbon_emissions_carrier")?.clone();
    let shed_demand = m.var("shed_demand")?.clone();
    let cost_shed = m.var("cost_shed_demand")?.clone();
    let cost_total = m.var("cost_carrier_total")?.clone();
    let carbon_total = m.var("carbon_emissions_carrier_total")?.clone();

    let availability_import = ctx.params.get("availability_import")?.clone();
    let availability_export = ctx.params.get("availability_export")?.clone();
    let import_price = ctx.params.get("import_price")?.clone();
    let export_price = ctx.params.get("export_price")?.clone();
    let import_yearly = ctx.params.get("availability_import_yearly")?.clone();
    let export_yearly = ctx.params.get("availability_export_yearly")?.clone();
    let shed_price = ctx.params.get("shed_demand_price")?.clone();
    let carbon_intensity = ctx.params.get("carbon_intensity_carrier")?.clone();
    let demand = ctx.params.get("demand")?.clone();
    let duration = ctx.params.get("duration")?.clone();

    // per-step availability bounds; +inf suppresses the constraint
    m.add_constraint_rule(
        "availability_import",
        &step_tuples,
        step_dims.clone(),
        |tuple| {
            let bound = availability_import.get_tuple(tuple);
            if bound.is_infinite() {
                return Ok(None);
            }
            let flow = import_flow.try_get_tuple(tuple).expect("active tuple");
            Ok(Some(constraint!(flow <= bound)))
        },
        &mut ctx.diagnostics,
    )?;
    m.add_constraint_rule(
        "availability_export",
        &step_tuples,
        step_dims.clone(),
        |tuple| {
            let bound = availability_export.get_tuple(tuple);
            if bound.is_infinite() {
                return Ok(None);
            }
            let flow = export_flow.try_get_tuple(tuple).expect("active tuple");
            Ok(Some(constraint!(flow <= bound)))
        },
        &mut ctx.diagnostics,
    )?;

    // yearly availability over duration-weighted flows
    {
        let year_steps: Vec<Vec<String>> = (0..ctx.time_steps.years())
            .map(|y| ctx.year_steps(y))
            .collect::<CepResult<_>>()?;
        let weighted_sum = |flow: &crate::component::VariableBlock,
                           carrier: &str,
                           node: &str,
                           year: usize|
         -> Expression {
            let mut expr = Expression::from(0.0);
            for t in &year_steps[year] {
                let tau = duration.get(&[t]);
                let var = flow.try_get(&[carrier, node, t]).expect("active tuple");
                expr += tau * var;
            }
            expr
        };
        m.add_constraint_rule(
            "availability_import_yearly",
            &yearly_tuples,
            yearly_dims.clone(),
            |tuple| {
                let bound = import_yearly.get_tuple(tuple);
                if bound.is_infinite() {
                    return Ok(None);
                }
                let year: usize = tuple[2].parse().expect("year id");
                let expr = weighted_sum(&import_flow, &tuple[0], &tuple[1], year);
                Ok(Some(constraint!(expr <= bound)))
            },
            &mut ctx.diagnostics,
        )?;
        m.add_constraint_rule(
            "availability_export_yearly",
            &yearly_tuples,
            yearly_dims,
            |tuple| {
                let bound = export_yearly.get_tuple(tuple);
                if bound.is_infinite() {
                    return Ok(None);
                }
                let year: usize = tuple[2].parse().expect("year id");
                let expr = weighted_sum(&export_flow, &tuple[0], &tuple[1], year);
                Ok(Some(constraint!(expr <= bound)))
            },
            &mut ctx.diagnostics,
        )?;
    }

    // carrier cost, masked to tuples with any exchange availability
    m.add_constraint_rule(
        "cost_carrier",
        &step_tuples,
        step_dims.clone(),
        |tuple| {
            let cost = cost_carrier.try_get_tuple(tuple).expect("active tuple");
            let exchange_possible = availability_import.get_tuple(tuple) != 0.0
                || availability_export.get_tuple(tuple) != 0.0;
            if !exchange_possible {
                return Ok(Some(constraint!(Expression::from(cost) == 0.0)));
            }
            let imp = import_flow.try_get_tuple(tuple).expect("active tuple");
            let exp = export_flow.try_get_tuple(tuple).expect("active tuple");
            let buy = import_price.get_tuple(tuple);
            let sell = export_price.get_tuple(tuple);
            Ok(Some(constraint!(cost - buy * imp + sell * exp == 0.0)))
        },
        &mut ctx.diagnostics,
    )?;

    // shed-demand cost; an infinite price forbids shedding
    m.add_constraint_rule(
        "cost_shed_demand",
        &step_tuples,
        step_dims.clone(),
        |tuple| {
            let shed = shed_demand.try_get_tuple(tuple).expect("active tuple");
            let price = shed_price.get(&[tuple[0].as_str()]);
            if price.is_infinite() {
                return Ok(Some(constraint!(Expression::from(shed) == 0.0)));
            }
            let cost = cost_shed.try_get_tuple(tuple).expect("active tuple");
            Ok(Some(constraint!(cost - price * shed == 0.0)))
        },
        &mut ctx.diagnostics,
    )?;
    m.add_constraint_rule(
        "shed_demand_limit",
        &step_tuples,
        step_dims.clone(),
        |tuple| {
            let shed = shed_demand.try_get_tuple(tuple).expect("active tuple");
            Ok(Some(constraint!(shed <= demand.get_tuple(tuple))))
        },
        &mut ctx.diagnostics,
    )?;

    // per-step carbon emissions of net imports
    {
        let step_years: std::collections::HashMap<String, String> = ctx
            .op_steps()
            .into_iter()
            .map(|t| {
                let year = ctx.step_year(&t)?.to_string();
                Ok((t, year))
            })
            .collect::<CepResult<_>>()?;
        m.add_constraint_rule(
            "carbon_emissions_carrier",
            &step_tuples,
            step_dims.clone(),
            |tuple| {
                let carbon = carbon_carrier.try_get_tuple(tuple).expect("active tuple");
                let exchange_possible = availability_import.get_tuple(tuple) != 0.0
                    || availability_export.get_tuple(tuple) != 0.0;
                let factor = if exchange_possible {
                    let year = &step_years[&tuple[2]];
                    carbon_intensity.get(&[tuple[0].as_str(), tuple[1].as_str(), year])
                } else {
                    0.0
                };
                let imp = import_flow.try_get_tuple(tuple).expect("active tuple");
                let exp = export_flow.try_get_tuple(tuple).expect("active tuple");
                Ok(Some(constraint!(carbon - factor * imp + factor * exp == 0.0)))
            },
            &mut ctx.diagnostics,
        )?;
    }

    // yearly totals
    {
        let years = ctx.years();
        let carriers = ctx.system.carriers.clone();
        let nodes = ctx.system.nodes.clone();
        let mut cost_entries = Vec::new();
        let mut carbon_entries = Vec::new();
        for year in &years {
            let y: usize = year.parse().expect("year id");
            let steps = ctx.year_steps(y)?;
            let mut cost_expr = Expression::from(0.0);
            let mut carbon_expr = Expression::from(0.0);
            for carrier in &carriers {
                for node in &nodes {
                    for t in &steps {
                        let tau = duration.get(&[t]);
                        let key = [carrier.as_str(), node.as_str(), t.as_str()];
                        cost_expr += tau * cost_carrier.try_get(&key).expect("active tuple");
                        cost_expr += tau * cost_shed.try_get(&key).expect("active tuple");
                        carbon_expr += tau * carbon_carrier.try_get(&key).expect("active tuple");
                    }
                }
            }
            let total = cost_total.try_get(&[year]).expect("active tuple");
            cost_entries.push((vec![year.clone()], constraint!(total - cost_expr == 0.0)));
            let total = carbon_total.try_get(&[year]).expect("active tuple");
            carbon_entries.push((vec![year.clone()], constraint!(total - carbon_expr == 0.0)));
        }
        m.add_constraint_block(
            "cost_carrier_total",
            vec![SET_TIME_STEPS_YEARLY.to_string()],
            cost_entries,
            &mut ctx.diagnostics,
        );
        m.add_constraint_block(
            "carbon_emissions_carrier_total",
            vec![SET_TIME_STEPS_YEARLY.to_string()],
            carbon_entries,
            &mut ctx.diagnostics,
        );
    }

    declare_energy_balance(ctx, m)?;
    Ok(())
}

/// The nodal energy balance, one equality per `(carrier, node, step)`.
fn declare_energy_balance(
    ctx: &mut OptimizationContext,
    m: &mut ModelComponents,
) -> CepResult<()> {
    let (step_tuples, step_dims) = ctx
        .sets
        .create_custom_set(&[SET_CARRIERS, SET_NODES, SET_TIME_STEPS_OPERATION])?;

    let import_flow = m.var("import_flow")?.clone();
    let export_flow = m.var("export_flow")?.clone();
    let shed_demand = m.var("shed_demand")?.clone();
    let demand = ctx.params.get("demand")?.clone();

    let input_flow = if m.has_var("input_flow") {
        Some(m.var("input_flow")?.clone())
    } else {
        None
    };
    let output_flow = if m.has_var("output_flow") {
        Some(m.var("output_flow")?.clone())
    } else {
        None
    };
    let transport_flow = if m.has_var("transport_flow") {
        Some(m.var("transport_flow")?.clone())
    } else {
        None
    };
    let transport_loss = if m.has_var("transport_loss") {
        Some(m.var("transport_loss")?.clone())
    } else {
        None
    };
    let storage_charge = if m.has_var("storage_charge") {
        Some(m.var("storage_charge")?.clone())
    } else {
        None
    };
    let storage_discharge = if m.has_var("storage_discharge") {
        Some(m.var("storage_discharge")?.clone())
    } else {
        None
    };

    let mut entries = Vec::with_capacity(step_tuples.len());
    for tuple in &step_tuples {
        let (carrier, node, t) = (tuple[0].as_str(), tuple[1].as_str(), tuple[2].as_str());
        let mut expr = Expression::from(0.0);

        for tech in &ctx.input.technologies {
            match tech.kind() {
                TechnologyKind::Conversion => {
                    let conversion = tech.conversion().expect("conversion data");
                    if conversion.output_carriers.iter().any(|c| c == carrier) {
                        let flow = output_flow
                            .as_ref()
                            .and_then(|b| b.try_get(&[&tech.name, carrier, node, t]))
                            .expect("active tuple");
                        expr += flow;
                    }
                    if conversion.input_carriers.iter().any(|c| c == carrier) {
                        let flow = input_flow
                            .as_ref()
                            .and_then(|b| b.try_get(&[&tech.name, carrier, node, t]))
                            .expect("active tuple");
                        expr -= flow;
                    }
                }
                TechnologyKind::Transport => {
                    if tech.reference_carrier != carrier {
                        continue;
                    }
                    let flows = transport_flow.as_ref().expect("transport flows declared");
                    let losses = transport_loss.as_ref().expect("transport losses declared");
                    for edge in ctx.topology.edges_into(node)? {
                        let flow = flows.try_get(&[&tech.name, &edge, t]).expect("active tuple");
                        let loss = losses.try_get(&[&tech.name, &edge, t]).expect("active tuple");
                        expr += flow;
                        expr -= loss;
                    }
                    for edge in ctx.topology.edges_out_of(node)? {
                        let flow = flows.try_get(&[&tech.name, &edge, t]).expect("active tuple");
                        expr -= flow;
                    }
                }
                TechnologyKind::Storage => {
                    if tech.reference_carrier != carrier {
                        continue;
                    }
                    let charge = storage_charge
                        .as_ref()
                        .and_then(|b| b.try_get(&[&tech.name, node, t]))
                        .expect("active tuple");
                    let discharge = storage_discharge
                        .as_ref()
                        .and_then(|b| b.try_get(&[&tech.name, node, t]))
                        .expect("active tuple");
                    expr += discharge;
                    expr -= charge;
                }
            }
        }

        expr += import_flow.try_get_tuple(tuple).expect("active tuple");
        expr -= export_flow.try_get_tuple(tuple).expect("active tuple");
        expr += shed_demand.try_get_tuple(tuple).expect("active tuple");

        let rhs = demand.get_tuple(tuple);
        entries.push((tuple.clone(), constraint!(expr == rhs)));
    }

    m.add_constraint_block("nodal_energy_balance", step_dims, entries, &mut ctx.diagnostics);
    Ok(())
}
