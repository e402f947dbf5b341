//! # cep-core: Capacity Expansion Planning Core
//!
//! Shared data model for the CEP toolchain: the declarative building blocks
//! an optimization run is assembled from, with no solver dependency.
//!
//! ## Modules
//!
//! - [`config`] - Analysis / system / solver configuration structs
//! - [`sets`] - Index registry (flat, subset and indexed sets, custom
//!   index products)
//! - [`params`] - Parameter store with broadcast defaults and min/max
//!   tracking
//! - [`timesteps`] - Three-layer time model (base, operational, yearly)
//! - [`network`] - Node/edge topology with reversed-edge lookup
//! - [`input`] - Struct-shaped per-element input data
//! - [`diagnostics`] - Warning/error collection during assembly
//! - [`error`] - Unified error type
//!
//! ## Design
//!
//! The optimization context (in `cep-opt`) exclusively owns one instance of
//! each of these pieces; elements reference the context and register their
//! sets, parameters and variables through it. The time model is a value
//! object: elements store only identifiers, never references to each other,
//! so there are no cyclic links between time grids and elements.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod input;
pub mod network;
pub mod params;
pub mod sets;
pub mod timesteps;

pub use config::{
    Analysis, ClusterMethod, EdgeSpec, ExtremePeriodMethod, Objective, Sense, SolverSettings,
    System, TsaSettings,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{CepError, CepResult};
pub use input::{
    CarrierData, ConversionData, ExistingCapacity, InputData, RawSeries, StorageData,
    TechnologyData, TechnologyKind, TechnologyKindData, TransportData,
};
pub use network::Topology;
pub use params::{Parameter, ParameterStore};
pub use sets::IndexSets;
pub use timesteps::{ElementTimeGrid, TimeSteps};
