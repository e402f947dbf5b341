//! Transport technologies: carrier flow along edges with distance-based
//! losses, the capex split between per-capacity and per-distance terms,
//! and the bidirectional capacity coupling.

use good_lp::{constraint, Constraint, Expression, Variable};

use cep_core::error::{CepError, CepResult};
use cep_core::input::TechnologyData;
use cep_core::params::Parameter;
use cep_core::sets::{
    SET_EDGES, SET_LOCATION, SET_TIME_STEPS_OPERATION, SET_TIME_STEPS_YEARLY,
    SET_TRANSPORT_TECHNOLOGIES,
};

use crate::component::{ModelComponents, VarDomain, VariableBlock};
use crate::context::OptimizationContext;

pub fn declare_vars(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let flow_index = ctx.sets.create_custom_set(&[
        SET_TRANSPORT_TECHNOLOGIES,
        SET_LOCATION,
        SET_TIME_STEPS_OPERATION,
    ])?;
    m.add_variable("transport_flow", flow_index.clone(), VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("transport_loss", flow_index, VarDomain::NonNegative, &mut ctx.diagnostics);
    Ok(())
}

pub fn declare_constraints(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    if ctx.system.transport_technologies.is_empty() {
        return Ok(());
    }
    let flow = m.var("transport_flow")?.clone();
    let loss = m.var("transport_loss")?.clone();
    let addition = m.var("capacity_addition")?.clone();
    let distance = ctx.params.get("distance")?.clone();
    let loss_flow = ctx.params.get("loss_flow")?.clone();

    // flow losses proportional to distance
    let (flow_tuples, flow_dims) = ctx.sets.create_custom_set(&[
        SET_TRANSPORT_TECHNOLOGIES,
        SET_LOCATION,
        SET_TIME_STEPS_OPERATION,
    ])?;
    let mut entries = Vec::new();
    for tuple in &flow_tuples {
        let loss_var = loss.try_get_tuple(tuple).expect("active tuple");
        let flow_var = flow.try_get_tuple(tuple).expect("active tuple");
        let rate = distance.get(&[&tuple[0], &tuple[1]]) * loss_flow.get(&[&tuple[0]]);
        entries.push((tuple.clone(), constraint!(loss_var - rate * flow_var == 0.0)));
    }
    m.add_constraint_block("transport_loss", flow_dims, entries, &mut ctx.diagnostics);

    // bidirectional technologies expand identically in both directions
    let mut entries = Vec::new();
    let power = ctx.system.power_type().to_string();
    for name in ctx.system.bidirectional_transport_technologies.clone() {
        for edge in ctx.topology.edge_names() {
            let reverse = match ctx.topology.reversed_edge(&edge) {
                Some(reverse) => reverse.to_string(),
                None => {
                    return Err(CepError::Config(format!(
                        "bidirectional technology {} needs a reversed edge for {}",
                        name, edge
                    )))
                }
            };
            // one constraint per edge pair
            if edge >= reverse {
                continue;
            }
            for year in ctx.years() {
                let forward = addition
                    .try_get(&[&name, &power, &edge, &year])
                    .expect("active tuple");
                let backward = addition
                    .try_get(&[&name, &power, &reverse, &year])
                    .expect("active tuple");
                entries.push((
                    vec![name.clone(), edge.clone(), year.clone()],
                    constraint!(forward - backward == 0.0),
                ));
            }
        }
    }
    m.add_constraint_block(
        "bidirectional_capacity",
        vec![
            SET_TRANSPORT_TECHNOLOGIES.to_string(),
            SET_EDGES.to_string(),
            SET_TIME_STEPS_YEARLY.to_string(),
        ],
        entries,
        &mut ctx.diagnostics,
    );
    Ok(())
}

/// Capex of one transport addition.
///
/// With `double_capex_transport` both the per-capacity and the annualized
/// per-distance term are present (the latter triggered by the installation
/// binary); without the flag exactly one term is present and the other is
/// zero: the specific capex if given, otherwise per-distance scaled by the
/// edge length, both proportional to the addition.
#[allow(clippy::too_many_arguments)]
pub fn capex_entry(
    ctx: &OptimizationContext,
    tech: &TechnologyData,
    tuple: &[String],
    cost: Variable,
    addition: Variable,
    installation: &VariableBlock,
    capex_specific: &Parameter,
    entries: &mut Vec<(Vec<String>, Constraint)>,
) -> CepResult<()> {
    let specific = capex_specific.get_tuple(tuple);
    let edge_length = ctx.params.get("distance")?.get(&[&tuple[0], &tuple[2]]);
    let per_distance = ctx
        .params
        .get("capex_per_distance")?
        .get(&[&tuple[0], &tuple[2], &tuple[3]]);

    let entry = if ctx.system.double_capex_transport {
        let mut expr = Expression::from(cost);
        expr -= specific * addition;
        let fixed = per_distance * edge_length;
        if fixed != 0.0 {
            let binary = installation.try_get_tuple(tuple).ok_or_else(|| {
                CepError::Config(format!(
                    "technology {}: per-distance capex on {} needs an installation decision",
                    tech.name, tuple[2]
                ))
            })?;
            expr -= fixed * binary;
        }
        constraint!(expr == 0.0)
    } else {
        let effective = if specific != 0.0 {
            specific
        } else {
            per_distance * edge_length
        };
        constraint!(cost - effective * addition == 0.0)
    };
    entries.push((tuple.to_vec(), entry));
    Ok(())
}
