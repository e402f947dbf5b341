//! Conversion technologies: carrier flows at a node coupled through the
//! reference flow.
//!
//! Every declared input/output carrier flow is proportional to the
//! reference carrier's flow via the technology's conversion factor; the
//! reference carrier itself has factor one, so its flow *is* the reference
//! flow and needs no coupling constraint.

use good_lp::constraint;

use cep_core::error::CepResult;
use cep_core::sets::{
    SET_CONVERSION_TECHNOLOGIES, SET_INPUT_CARRIERS, SET_NODES, SET_OUTPUT_CARRIERS,
    SET_TIME_STEPS_OPERATION,
};

use crate::component::{ModelComponents, VarDomain};
use crate::context::OptimizationContext;

pub fn declare_vars(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    let input_index = ctx.sets.create_custom_set(&[
        SET_CONVERSION_TECHNOLOGIES,
        SET_INPUT_CARRIERS,
        SET_NODES,
        SET_TIME_STEPS_OPERATION,
    ])?;
    let output_index = ctx.sets.create_custom_set(&[
        SET_CONVERSION_TECHNOLOGIES,
        SET_OUTPUT_CARRIERS,
        SET_NODES,
        SET_TIME_STEPS_OPERATION,
    ])?;
    m.add_variable("input_flow", input_index, VarDomain::NonNegative, &mut ctx.diagnostics);
    m.add_variable("output_flow", output_index, VarDomain::NonNegative, &mut ctx.diagnostics);
    Ok(())
}

pub fn declare_constraints(ctx: &mut OptimizationContext, m: &mut ModelComponents) -> CepResult<()> {
    if ctx.system.conversion_technologies.is_empty() {
        return Ok(());
    }
    let input_flow = m.var("input_flow")?.clone();
    let output_flow = m.var("output_flow")?.clone();
    let factor = ctx.params.get("conversion_factor")?.clone();

    let (input_tuples, dims) = ctx.sets.create_custom_set(&[
        SET_CONVERSION_TECHNOLOGIES,
        SET_INPUT_CARRIERS,
        SET_NODES,
        SET_TIME_STEPS_OPERATION,
    ])?;
    let (output_tuples, _) = ctx.sets.create_custom_set(&[
        SET_CONVERSION_TECHNOLOGIES,
        SET_OUTPUT_CARRIERS,
        SET_NODES,
        SET_TIME_STEPS_OPERATION,
    ])?;

    let mut entries = Vec::new();
    for (tuples, block) in [(&input_tuples, &input_flow), (&output_tuples, &output_flow)] {
        for tuple in tuples.iter() {
            let tech = ctx.technology(&tuple[0])?;
            if tuple[1] == tech.reference_carrier {
                continue;
            }
            let conversion = tech.conversion().expect("conversion data");
            let reference_block = if conversion.input_carriers.contains(&tech.reference_carrier) {
                &input_flow
            } else {
                &output_flow
            };
            let reference = reference_block
                .try_get(&[&tuple[0], &tech.reference_carrier, &tuple[2], &tuple[3]])
                .expect("active tuple");
            let flow = block.try_get_tuple(tuple).expect("active tuple");
            let rate = factor.get(&[&tuple[0], &tuple[1]]);
            entries.push((tuple.clone(), constraint!(flow - rate * reference == 0.0)));
        }
    }
    m.add_constraint_block("conversion_balance", dims, entries, &mut ctx.diagnostics);
    Ok(())
}
