//! Objective assembler.
//!
//! The default objective minimizes total system cost: annualized capex,
//! opex, carrier cost and priced carbon over all years. The emissions
//! objective is declared for symmetry but not yet supported; selecting it
//! fails loudly instead of optimizing the wrong thing.

use good_lp::Expression;

use cep_core::config::Objective;
use cep_core::error::{CepError, CepResult};

use crate::component::ModelComponents;
use crate::context::OptimizationContext;

pub fn build(ctx: &OptimizationContext, m: &ModelComponents) -> CepResult<Expression> {
    match ctx.analysis.objective {
        Objective::TotalCost => {}
        Objective::TotalEmissions => {
            return Err(CepError::Config(
                "the emissions objective is not supported yet; use total_cost".into(),
            ))
        }
    }

    let capex_total = m.var("cost_capex_total")?;
    let opex_total = m.var("cost_opex_total")?;
    let carrier_total = m.var("cost_carrier_total")?;
    let carbon_total = m.var("carbon_emissions_total")?;
    let carbon_price = ctx.analysis.carbon_price;

    let mut expr = Expression::from(0.0);
    for year in ctx.years() {
        expr += capex_total.get(&[&year])?;
        expr += opex_total.get(&[&year])?;
        expr += carrier_total.get(&[&year])?;
        if carbon_price != 0.0 {
            expr += carbon_price * carbon_total.get(&[&year])?;
        }
    }
    Ok(expr)
}
