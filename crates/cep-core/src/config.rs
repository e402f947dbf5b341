//! Configuration structs for an optimization run.
//!
//! Three layers mirror the input contract: [`Analysis`] describes what is
//! optimized (objective, discounting, time-series aggregation settings),
//! [`System`] describes the modeled energy system (element name lists,
//! horizon shape, global technology-diffusion parameters), and
//! [`SolverSettings`] is passed through to the solver adapter. All structs
//! deserialize with serde; file handling is up to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Objective function selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Minimize total system cost (capex + opex + carrier + carbon cost)
    #[default]
    TotalCost,
    /// Minimize total carbon emissions (stubbed, not yet supported)
    TotalEmissions,
}

/// Optimization sense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

/// Clustering method for time-series aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMethod {
    /// Centroid representation; excluded series aggregated by mean
    #[default]
    KMeans,
    /// Medoid representation; excluded series aggregated by median
    KMedoids,
}

/// How extreme periods are treated during clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremePeriodMethod {
    /// Extreme periods are clustered like any other period
    #[default]
    None,
    /// The period containing the global peak of each series becomes its own
    /// cluster with a single occurrence
    Append,
}

/// Time-series aggregation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsaSettings {
    /// Hours per candidate period handed to the clustering
    pub hours_per_period: usize,
    /// Input resolution in hours per sample
    pub resolution: f64,
    /// Clustering method
    pub cluster_method: ClusterMethod,
    /// Treatment of extreme periods
    pub extreme_period_method: ExtremePeriodMethod,
    /// Rescale aggregated series so duration-weighted yearly sums match the
    /// raw series
    pub rescale_cluster_periods: bool,
    /// Random seed for reproducible cluster initialization
    pub seed: u64,
}

impl Default for TsaSettings {
    fn default() -> Self {
        Self {
            hours_per_period: 1,
            resolution: 1.0,
            cluster_method: ClusterMethod::KMeans,
            extreme_period_method: ExtremePeriodMethod::None,
            rescale_cluster_periods: false,
            seed: 42,
        }
    }
}

/// Analysis frame: objective, discounting and aggregation controls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub objective: Objective,
    pub sense: Sense,
    /// Yearly discount rate used for capex annualization
    pub discount_rate: f64,
    /// Price applied to total yearly carbon emissions in the cost objective
    pub carbon_price: f64,
    /// Decimal points kept when extracting primal values
    pub rounding_decimal_points: u32,
    /// Aggregated series values below `10^-n` are snapped to zero
    pub rounding_decimal_points_ts: u32,
    pub time_series_aggregation: TsaSettings,
}

impl Default for Analysis {
    fn default() -> Self {
        Self {
            objective: Objective::TotalCost,
            sense: Sense::Minimize,
            discount_rate: 0.0,
            carbon_price: 0.0,
            rounding_decimal_points: 6,
            rounding_decimal_points_ts: 6,
            time_series_aggregation: TsaSettings::default(),
        }
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub name: String,
    pub from: String,
    pub to: String,
}

impl EdgeSpec {
    pub fn new(name: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

/// System frame: element lists, horizon shape and diffusion globals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct System {
    pub carriers: Vec<String>,
    pub nodes: Vec<String>,
    pub edges: Vec<EdgeSpec>,
    pub conversion_technologies: Vec<String>,
    pub transport_technologies: Vec<String>,
    pub storage_technologies: Vec<String>,
    /// Calendar years spanned by one yearly (investment) step
    pub interval_between_years: u32,
    /// Hours per year before aggregation (H)
    pub unaggregated_time_steps_per_year: usize,
    /// Calendar hours in one year
    pub total_hours_per_year: usize,
    /// Target number of representative operational steps per year (T)
    pub aggregated_time_steps_per_year: usize,
    /// Number of yearly (investment) steps in the horizon (Y)
    pub optimized_years: usize,
    /// Capacity types; power first, energy second
    pub set_capacity_types: Vec<String>,
    pub conduct_time_series_aggregation: bool,
    /// Honor the exclusion list carried in the input data
    pub exclude_parameters_from_tsa: bool,
    /// When set, transport capex carries both the per-capacity and the
    /// per-distance term; when unset, exactly one of them
    pub double_capex_transport: bool,
    /// Yearly decay rate of the technology knowledge stock
    pub knowledge_depreciation_rate: f64,
    /// Fraction of other locations' additions that spills into the local
    /// knowledge stock (zero for transport technologies and edges)
    pub knowledge_spillover_rate: f64,
    /// Market share of same-kind, same-reference-carrier siblings up to
    /// which additions are not diffusion-bounded
    pub unbounded_market_share: f64,
    pub bidirectional_transport_technologies: Vec<String>,
}

impl Default for System {
    fn default() -> Self {
        Self {
            carriers: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            conversion_technologies: Vec::new(),
            transport_technologies: Vec::new(),
            storage_technologies: Vec::new(),
            interval_between_years: 1,
            unaggregated_time_steps_per_year: 8760,
            total_hours_per_year: 8760,
            aggregated_time_steps_per_year: 8760,
            optimized_years: 1,
            set_capacity_types: vec!["power".to_string(), "energy".to_string()],
            conduct_time_series_aggregation: false,
            exclude_parameters_from_tsa: true,
            double_capex_transport: false,
            knowledge_depreciation_rate: 0.1,
            knowledge_spillover_rate: 0.0,
            unbounded_market_share: 0.0,
            bidirectional_transport_technologies: Vec::new(),
        }
    }
}

impl System {
    /// All technology names in declaration order
    pub fn all_technologies(&self) -> Vec<String> {
        let mut techs = self.conversion_technologies.clone();
        techs.extend(self.transport_technologies.iter().cloned());
        techs.extend(self.storage_technologies.iter().cloned());
        techs
    }

    /// The power capacity type name (first entry)
    pub fn power_type(&self) -> &str {
        &self.set_capacity_types[0]
    }

    /// The energy capacity type name (second entry)
    pub fn energy_type(&self) -> &str {
        &self.set_capacity_types[1]
    }
}

/// Solver adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Backend name (informational; Clarabel is the built-in backend)
    pub name: String,
    /// Wall-clock limit in seconds, passed through to the backend
    pub time_limit: Option<f64>,
    /// Relative MIP gap tolerance, passed through to MIP-capable backends
    pub mip_gap: f64,
    /// Thread count hint, passed through to the backend
    pub threads: Option<usize>,
    /// Request dual values for constraints where the backend provides them
    pub compute_duals: bool,
    /// Opaque backend options
    pub options: BTreeMap<String, serde_json::Value>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            name: "clarabel".to_string(),
            time_limit: None,
            mip_gap: 0.01,
            threads: None,
            compute_duals: false,
            options: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let system = System::default();
        assert_eq!(system.interval_between_years, 1);
        assert_eq!(system.power_type(), "power");
        assert_eq!(system.energy_type(), "energy");
        assert!(!system.conduct_time_series_aggregation);

        let analysis = Analysis::default();
        assert_eq!(analysis.objective, Objective::TotalCost);
        assert_eq!(analysis.sense, Sense::Minimize);
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut system = System::default();
        system.carriers = vec!["electricity".into()];
        system.edges = vec![EdgeSpec::new("a_b", "a", "b")];

        let json = serde_json::to_string(&system).unwrap();
        let back: System = serde_json::from_str(&json).unwrap();
        assert_eq!(back.carriers, system.carriers);
        assert_eq!(back.edges[0].from, "a");
    }

    #[test]
    fn test_cluster_method_snake_case() {
        let json = serde_json::to_string(&ClusterMethod::KMedoids).unwrap();
        assert_eq!(json, "\"k_medoids\"");
    }

    #[test]
    fn test_all_technologies_order() {
        let mut system = System::default();
        system.conversion_technologies = vec!["boiler".into()];
        system.transport_technologies = vec!["pipeline".into()];
        system.storage_technologies = vec!["battery".into()];
        assert_eq!(system.all_technologies(), vec!["boiler", "pipeline", "battery"]);
    }
}
