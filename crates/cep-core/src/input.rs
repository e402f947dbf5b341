//! Struct-shaped input data for carriers and technologies.
//!
//! Data ingestion (CSV, spreadsheets) is out of scope; callers populate
//! these structs programmatically or from their own readers. Every lookup
//! falls back to a documented element-level default, so sparse data is
//! fine: additive quantities default to `0`, unconstraining upper bounds to
//! `+inf` (which later suppresses the corresponding constraint).

use std::collections::HashMap;

/// One hourly series per location plus a broadcast default.
///
/// A location without an explicit series takes the constant default for
/// every hour.
#[derive(Debug, Clone)]
pub struct RawSeries {
    pub default: f64,
    values: HashMap<String, Vec<f64>>,
}

impl RawSeries {
    pub fn new(default: f64) -> Self {
        Self {
            default,
            values: HashMap::new(),
        }
    }

    /// A series that is the constant default everywhere.
    pub fn constant(value: f64) -> Self {
        Self::new(value)
    }

    pub fn set(&mut self, location: impl Into<String>, series: Vec<f64>) -> &mut Self {
        self.values.insert(location.into(), series);
        self
    }

    pub fn get(&self, location: &str) -> Option<&[f64]> {
        self.values.get(location).map(|v| v.as_slice())
    }

    /// Hourly value, falling back to the default.
    pub fn value(&self, location: &str, hour: usize) -> f64 {
        self.values
            .get(location)
            .and_then(|v| v.get(hour).copied())
            .unwrap_or(self.default)
    }

    pub fn locations(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Input data of one carrier
#[derive(Debug, Clone)]
pub struct CarrierData {
    pub name: String,
    /// Demand per node and hour (default 0)
    pub demand: RawSeries,
    /// Import cap per node and hour (default 0; `+inf` = unconstrained)
    pub availability_import: RawSeries,
    /// Export cap per node and hour (default 0; `+inf` = unconstrained)
    pub availability_export: RawSeries,
    pub import_price: RawSeries,
    pub export_price: RawSeries,
    /// Yearly import cap per `(node, year)`; default `+inf` skips the
    /// constraint
    pub availability_import_yearly: HashMap<(String, usize), f64>,
    /// Yearly export cap per `(node, year)`; default `+inf`
    pub availability_export_yearly: HashMap<(String, usize), f64>,
    /// Price for shedding demand; `+inf` forbids shedding entirely
    pub shed_demand_price: f64,
    /// Carbon intensity of net imports per `(node, year)` (default 0)
    pub carbon_intensity: HashMap<(String, usize), f64>,
    /// Per-attribute yearly multipliers applied after aggregation
    pub yearly_variation: HashMap<String, Vec<f64>>,
}

impl CarrierData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            demand: RawSeries::new(0.0),
            availability_import: RawSeries::new(0.0),
            availability_export: RawSeries::new(0.0),
            import_price: RawSeries::new(0.0),
            export_price: RawSeries::new(0.0),
            availability_import_yearly: HashMap::new(),
            availability_export_yearly: HashMap::new(),
            shed_demand_price: f64::INFINITY,
            carbon_intensity: HashMap::new(),
            yearly_variation: HashMap::new(),
        }
    }

    /// Attribute names carrying hourly series, in declaration order.
    pub fn series_attributes(&self) -> [(&'static str, &RawSeries); 5] {
        [
            ("demand", &self.demand),
            ("availability_import", &self.availability_import),
            ("availability_export", &self.availability_export),
            ("import_price", &self.import_price),
            ("export_price", &self.export_price),
        ]
    }
}

/// Technology kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TechnologyKind {
    Conversion,
    Transport,
    Storage,
}

/// Conversion-specific data
#[derive(Debug, Clone, Default)]
pub struct ConversionData {
    pub input_carriers: Vec<String>,
    pub output_carriers: Vec<String>,
    /// Carrier flow per unit of reference-carrier flow; the reference
    /// carrier itself has factor 1
    pub conversion_factor: HashMap<String, f64>,
}

/// Transport-specific data
#[derive(Debug, Clone, Default)]
pub struct TransportData {
    /// Length of each edge the technology can be built on
    pub distance: HashMap<String, f64>,
    /// Relative carrier loss per unit distance and unit flow
    pub loss_flow: f64,
    /// Capex per unit capacity and unit distance, per `(edge, year)`
    pub capex_per_distance: HashMap<(String, usize), f64>,
}

/// Storage-specific data
#[derive(Debug, Clone)]
pub struct StorageData {
    pub efficiency_charge: f64,
    pub efficiency_discharge: f64,
    /// Relative loss of stored energy per hour
    pub self_discharge: f64,
}

impl Default for StorageData {
    fn default() -> Self {
        Self {
            efficiency_charge: 1.0,
            efficiency_discharge: 1.0,
            self_discharge: 0.0,
        }
    }
}

/// Kind-specific technology data, tagged by kind
#[derive(Debug, Clone)]
pub enum TechnologyKindData {
    Conversion(ConversionData),
    Transport(TransportData),
    Storage(StorageData),
}

impl TechnologyKindData {
    pub fn kind(&self) -> TechnologyKind {
        match self {
            TechnologyKindData::Conversion(_) => TechnologyKind::Conversion,
            TechnologyKindData::Transport(_) => TechnologyKind::Transport,
            TechnologyKindData::Storage(_) => TechnologyKind::Storage,
        }
    }
}

/// One pre-horizon capacity generation with its own remaining lifetime
#[derive(Debug, Clone)]
pub struct ExistingCapacity {
    pub location: String,
    /// Power capacity of this generation
    pub capacity: f64,
    /// Energy capacity (storage only, else 0)
    pub capacity_energy: f64,
    /// Remaining lifetime in calendar years at the horizon start
    pub remaining_lifetime: f64,
    /// Original lump-sum capex still being depreciated
    pub capex: f64,
    /// Original lump-sum capex of the energy capacity (storage only)
    pub capex_energy: f64,
}

impl ExistingCapacity {
    pub fn new(location: impl Into<String>, capacity: f64, remaining_lifetime: f64) -> Self {
        Self {
            location: location.into(),
            capacity,
            capacity_energy: 0.0,
            remaining_lifetime,
            capex: 0.0,
            capex_energy: 0.0,
        }
    }

    pub fn with_capex(mut self, capex: f64) -> Self {
        self.capex = capex;
        self
    }
}

/// Input data of one technology
#[derive(Debug, Clone)]
pub struct TechnologyData {
    pub name: String,
    pub reference_carrier: String,
    pub kind_data: TechnologyKindData,
    /// Lifetime of newly built capacity in calendar years
    pub lifetime: f64,
    /// Lead time between investment and availability in calendar years
    pub construction_time: f64,
    /// Minimum size of one addition (power); 0 disables the installation
    /// binary
    pub min_built_capacity: f64,
    /// Maximum size of one addition (power); `+inf` = unconstrained
    pub max_built_capacity: f64,
    pub min_built_capacity_energy: f64,
    pub max_built_capacity_energy: f64,
    /// Capacity limit per `(capacity type, location)`; default `+inf`
    pub capacity_limit: HashMap<(String, String), f64>,
    /// Maximum diffusion rate per year; `+inf` skips the diffusion bound
    pub max_diffusion_rate: HashMap<usize, f64>,
    /// Addition allowed regardless of the knowledge stock, per calendar year
    pub unbounded_addition: f64,
    /// Minimum load relative to capacity (default 0; any positive value
    /// turns on min-load semantics for the technology)
    pub min_load: RawSeries,
    /// Maximum load relative to capacity (default 1)
    pub max_load: RawSeries,
    /// Variable opex per unit of reference flow (default 0)
    pub opex_specific_variable: RawSeries,
    /// Fixed opex per unit capacity per `(location, year)` (default 0)
    pub opex_specific_fixed: HashMap<(String, usize), f64>,
    pub opex_specific_fixed_energy: HashMap<(String, usize), f64>,
    /// Capex per unit power capacity per `(location, year)` (default 0)
    pub capex_specific: HashMap<(String, usize), f64>,
    pub capex_specific_energy: HashMap<(String, usize), f64>,
    /// Carbon emissions per unit of reference flow (default 0)
    pub carbon_intensity: HashMap<String, f64>,
    pub existing_capacities: Vec<ExistingCapacity>,
    /// Investments decided before the horizon, per `(location, year)` with
    /// negative years counting back from the horizon start
    pub existing_invested: HashMap<(String, i64), f64>,
    /// Per-attribute yearly multipliers applied after aggregation
    pub yearly_variation: HashMap<String, Vec<f64>>,
}

impl TechnologyData {
    pub fn new(
        name: impl Into<String>,
        reference_carrier: impl Into<String>,
        kind_data: TechnologyKindData,
        lifetime: f64,
    ) -> Self {
        Self {
            name: name.into(),
            reference_carrier: reference_carrier.into(),
            kind_data,
            lifetime,
            construction_time: 0.0,
            min_built_capacity: 0.0,
            max_built_capacity: f64::INFINITY,
            min_built_capacity_energy: 0.0,
            max_built_capacity_energy: f64::INFINITY,
            capacity_limit: HashMap::new(),
            max_diffusion_rate: HashMap::new(),
            unbounded_addition: 0.0,
            min_load: RawSeries::new(0.0),
            max_load: RawSeries::new(1.0),
            opex_specific_variable: RawSeries::new(0.0),
            opex_specific_fixed: HashMap::new(),
            opex_specific_fixed_energy: HashMap::new(),
            capex_specific: HashMap::new(),
            capex_specific_energy: HashMap::new(),
            carbon_intensity: HashMap::new(),
            existing_capacities: Vec::new(),
            existing_invested: HashMap::new(),
            yearly_variation: HashMap::new(),
        }
    }

    pub fn kind(&self) -> TechnologyKind {
        self.kind_data.kind()
    }

    /// True when the technology carries min-load (on/off) semantics.
    pub fn is_on_off(&self) -> bool {
        self.min_load.default > 0.0
            || self
                .min_load
                .locations()
                .any(|loc| {
                    self.min_load
                        .get(loc)
                        .map(|series| series.iter().any(|&v| v > 0.0))
                        .unwrap_or(false)
                })
    }

    /// Attribute names carrying hourly series, in declaration order.
    pub fn series_attributes(&self) -> [(&'static str, &RawSeries); 3] {
        [
            ("min_load", &self.min_load),
            ("max_load", &self.max_load),
            ("opex_specific_variable", &self.opex_specific_variable),
        ]
    }

    pub fn conversion(&self) -> Option<&ConversionData> {
        match &self.kind_data {
            TechnologyKindData::Conversion(data) => Some(data),
            _ => None,
        }
    }

    pub fn transport(&self) -> Option<&TransportData> {
        match &self.kind_data {
            TechnologyKindData::Transport(data) => Some(data),
            _ => None,
        }
    }

    pub fn storage(&self) -> Option<&StorageData> {
        match &self.kind_data {
            TechnologyKindData::Storage(data) => Some(data),
            _ => None,
        }
    }
}

/// Everything the optimization context consumes besides the configuration
#[derive(Debug, Clone, Default)]
pub struct InputData {
    pub carriers: Vec<CarrierData>,
    pub technologies: Vec<TechnologyData>,
    /// `(element, parameter)` pairs excluded from clustering; `None`
    /// excludes every series of the element
    pub excluded_from_tsa: Vec<(String, Option<String>)>,
}

impl InputData {
    pub fn carrier(&self, name: &str) -> Option<&CarrierData> {
        self.carriers.iter().find(|c| c.name == name)
    }

    pub fn technology(&self, name: &str) -> Option<&TechnologyData> {
        self.technologies.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_series_defaults() {
        let mut series = RawSeries::new(0.5);
        series.set("a", vec![1.0, 2.0]);
        assert_eq!(series.value("a", 1), 2.0);
        assert_eq!(series.value("a", 7), 0.5); // past the end
        assert_eq!(series.value("b", 0), 0.5); // unknown location
    }

    #[test]
    fn test_carrier_defaults() {
        let carrier = CarrierData::new("electricity");
        assert_eq!(carrier.demand.value("a", 0), 0.0);
        assert!(carrier.shed_demand_price.is_infinite());
        assert_eq!(carrier.availability_import.value("a", 0), 0.0);
    }

    #[test]
    fn test_on_off_detection() {
        let mut tech = TechnologyData::new(
            "boiler",
            "heat",
            TechnologyKindData::Conversion(ConversionData::default()),
            20.0,
        );
        assert!(!tech.is_on_off());
        tech.min_load.set("a", vec![0.0, 0.3]);
        assert!(tech.is_on_off());
    }

    #[test]
    fn test_kind_accessors() {
        let tech = TechnologyData::new(
            "battery",
            "electricity",
            TechnologyKindData::Storage(StorageData::default()),
            10.0,
        );
        assert_eq!(tech.kind(), TechnologyKind::Storage);
        assert!(tech.storage().is_some());
        assert!(tech.conversion().is_none());
    }
}
