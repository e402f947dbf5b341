//! # cep-opt: Capacity Expansion Optimization
//!
//! Assembles a multi-period, multi-location capacity-expansion LP from the
//! declarative data model in `cep-core`, solves it with Clarabel through
//! good_lp, and indexes the primal results back into the component layout.
//!
//! ## Pipeline
//!
//! ```text
//! Analysis + System + InputData
//!         │
//!         ▼
//! OptimizationContext::new      validate, topology, time-series
//!         │                     aggregation, sets, parameters
//!         ▼
//! OptimizationContext::assemble carrier + technology subsystems declare
//!         │                     variables and constraints; objective
//!         ▼
//! solver::solve                 Clarabel LP solve, primal extraction,
//!         │                     status mapping
//!         ▼
//! SolveOutcome                  values per variable tuple + yearly totals
//! ```
//!
//! ## Model shape
//!
//! - One nodal energy balance equality per `(carrier, node, step)`.
//! - Capacity at a year equals the additions within the lifetime window
//!   plus the surviving existing stock.
//! - Additions are bounded by a decayed knowledge stock (technology
//!   diffusion) and appear after the construction lead time.
//! - Binary decisions (minimum addition size, per-distance transport
//!   capex, min-load on/off) are emitted only where they materially affect
//!   the model and are relaxed to `[0,1]` under Clarabel; without them the
//!   model is an exact LP.
//!
//! Rolling-horizon studies use [`RollingHorizon`], which re-opens the model
//! with updated existing-capacity state after each solve.

pub mod carrier;
pub mod component;
pub mod context;
pub mod conversion;
pub mod horizon;
pub mod objective;
pub mod solver;
pub mod storage;
pub mod technology;
pub mod transport;

pub use component::{ConstraintBlock, ModelComponents, VarDomain, VariableBlock};
pub use context::{AssembledModel, OptimizationContext};
pub use horizon::{HorizonStep, RollingHorizon};
pub use solver::{solve, SolveOutcome, SolveStatus, VariableValues};
