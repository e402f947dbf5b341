//! The optimization context: exclusive owner of the index registry, the
//! parameter store, the time model and the topology.
//!
//! [`OptimizationContext::new`] runs the full input pipeline: validate the
//! configuration against the element data, build the topology, aggregate
//! the hourly series onto the operational grid, and populate sets and
//! parameters. [`OptimizationContext::assemble`] then declares variables
//! and constraints for all elements and the objective; the result is handed
//! to [`crate::solver::solve`].
//!
//! Elements never own model components; they register everything through
//! the context, dispatched over the technology kind tags.

use std::collections::HashMap;

use good_lp::Expression;

use cep_core::config::{Analysis, SolverSettings, System};
use cep_core::diagnostics::Diagnostics;
use cep_core::error::{CepError, CepResult};
use cep_core::input::{CarrierData, InputData, RawSeries, TechnologyData, TechnologyKind};
use cep_core::network::Topology;
use cep_core::params::ParameterStore;
use cep_core::sets::{self, IndexSets};
use cep_core::timesteps::TimeSteps;
use cep_ts::AggregationResult;

use crate::carrier;
use crate::component::ModelComponents;
use crate::objective;
use crate::technology;

/// Capacity types available per technology (energy only for storage)
pub const SET_TECH_CAPACITY_TYPES: &str = "set_technology_capacity_types";

/// Name the shared operational grid is registered under
pub const SYSTEM_GRID: &str = "system";

/// A fully assembled model, ready to solve
pub struct AssembledModel {
    pub components: ModelComponents,
    pub objective: Expression,
}

/// Owner of all declarative model state
pub struct OptimizationContext {
    pub analysis: Analysis,
    pub system: System,
    pub solver: SolverSettings,
    pub input: InputData,
    pub sets: IndexSets,
    pub params: ParameterStore,
    pub time_steps: TimeSteps,
    pub topology: Topology,
    pub diagnostics: Diagnostics,
    pub aggregation: AggregationResult,
}

impl OptimizationContext {
    /// Build the context from configuration and input data.
    ///
    /// Fatal configuration and data problems abort here; non-fatal findings
    /// land in [`OptimizationContext::diagnostics`].
    pub fn new(
        analysis: Analysis,
        system: System,
        solver: SolverSettings,
        input: InputData,
    ) -> CepResult<Self> {
        let mut diagnostics = Diagnostics::new();
        validate_input(&system, &input)?;

        let topology = Topology::new(&system.nodes, &system.edges)?;
        validate_bidirectional(&system, &input, &topology)?;

        let aggregation = cep_ts::aggregate(&system, &analysis, &input, &mut diagnostics)?;

        let mut time_steps = TimeSteps::new(
            system.unaggregated_time_steps_per_year,
            system.optimized_years,
            system.interval_between_years,
        );
        time_steps.set_element_grid(SYSTEM_GRID, aggregation.duration.clone(), &aggregation.sequence)?;
        for carrier in &input.carriers {
            time_steps.set_element_grid(
                &carrier.name,
                aggregation.duration.clone(),
                &aggregation.sequence,
            )?;
        }
        for tech in &input.technologies {
            time_steps.set_element_grid(
                &tech.name,
                aggregation.duration.clone(),
                &aggregation.sequence,
            )?;
        }

        let mut context = Self {
            analysis,
            system,
            solver,
            input,
            sets: IndexSets::new(),
            params: ParameterStore::new(),
            time_steps,
            topology,
            diagnostics,
            aggregation,
        };
        context.build_sets()?;
        context.build_params()?;
        Ok(context)
    }

    /// Declare all variables, constraints and the objective.
    pub fn assemble(&mut self) -> CepResult<AssembledModel> {
        let mut components = ModelComponents::new();
        carrier::declare_vars(self, &mut components)?;
        technology::declare_vars(self, &mut components)?;
        carrier::declare_constraints(self, &mut components)?;
        technology::declare_constraints(self, &mut components)?;
        let objective = objective::build(self, &components)?;
        Ok(AssembledModel {
            components,
            objective,
        })
    }

    // ------------------------------------------------------------------
    // lookups

    pub fn carrier(&self, name: &str) -> CepResult<&CarrierData> {
        self.input
            .carrier(name)
            .ok_or_else(|| CepError::Config(format!("unknown carrier '{}'", name)))
    }

    pub fn technology(&self, name: &str) -> CepResult<&TechnologyData> {
        self.input
            .technology(name)
            .ok_or_else(|| CepError::Config(format!("unknown technology '{}'", name)))
    }

    /// Locations a technology lives on: nodes, or edges for transport.
    pub fn locations_of(&self, tech: &TechnologyData) -> Vec<String> {
        match tech.kind() {
            TechnologyKind::Transport => self.topology.edge_names(),
            _ => self.system.nodes.clone(),
        }
    }

    /// Capacity types of a technology: power, plus energy for storage.
    pub fn capacity_types_of(&self, tech: &TechnologyData) -> Vec<String> {
        match tech.kind() {
            TechnologyKind::Storage => self.system.set_capacity_types.clone(),
            _ => vec![self.system.power_type().to_string()],
        }
    }

    /// Operational step ids of the shared grid, as set elements.
    pub fn op_steps(&self) -> Vec<String> {
        let grid = self.time_steps.grid(SYSTEM_GRID).expect("system grid");
        grid.steps.iter().map(|t| t.to_string()).collect()
    }

    /// Yearly step ids, as set elements.
    pub fn years(&self) -> Vec<String> {
        self.time_steps
            .yearly_steps()
            .iter()
            .map(|y| y.to_string())
            .collect()
    }

    /// Year an operational step belongs to.
    pub fn step_year(&self, step: &str) -> CepResult<usize> {
        let t: usize = step
            .parse()
            .map_err(|_| CepError::Data(format!("invalid operational step id '{}'", step)))?;
        self.time_steps.operation_to_year(SYSTEM_GRID, t)
    }

    /// Duration of an operational step in hours.
    pub fn step_duration(&self, step: &str) -> CepResult<f64> {
        let t: usize = step
            .parse()
            .map_err(|_| CepError::Data(format!("invalid operational step id '{}'", step)))?;
        self.time_steps.duration(SYSTEM_GRID, t)
    }

    /// Operational steps of one year, as set elements.
    pub fn year_steps(&self, year: usize) -> CepResult<Vec<String>> {
        Ok(self
            .time_steps
            .year_to_operation(SYSTEM_GRID, year)?
            .iter()
            .map(|t| t.to_string())
            .collect())
    }

    /// Yearly investment steps within the lifetime window ending at `year`.
    pub fn lifetime_window(&self, tech: &TechnologyData, year: usize) -> Vec<usize> {
        let interval = self.system.interval_between_years as f64;
        let span = (tech.lifetime / interval).ceil() as usize;
        let start = (year + 1).saturating_sub(span.max(1));
        (start..=year).collect()
    }

    /// Construction lag in yearly steps.
    pub fn construction_lag(&self, tech: &TechnologyData) -> i64 {
        let interval = self.system.interval_between_years as f64;
        (tech.construction_time / interval).ceil() as i64
    }

    /// Existing capacity of a technology still alive at `year`.
    pub fn existing_surviving(
        &self,
        tech: &TechnologyData,
        capacity_type: &str,
        location: &str,
        year: usize,
    ) -> f64 {
        let elapsed = self.system.interval_between_years as f64 * year as f64;
        tech.existing_capacities
            .iter()
            .filter(|g| g.location == location && g.remaining_lifetime - elapsed > 0.0)
            .map(|g| {
                if capacity_type == self.system.energy_type() {
                    g.capacity_energy
                } else {
                    g.capacity
                }
            })
            .sum()
    }

    /// Lump-sum capex of existing capacity still being depreciated at `year`.
    pub fn existing_capex_surviving(
        &self,
        tech: &TechnologyData,
        capacity_type: &str,
        location: &str,
        year: usize,
    ) -> f64 {
        let elapsed = self.system.interval_between_years as f64 * year as f64;
        tech.existing_capacities
            .iter()
            .filter(|g| g.location == location && g.remaining_lifetime - elapsed > 0.0)
            .map(|g| {
                if capacity_type == self.system.energy_type() {
                    g.capex_energy
                } else {
                    g.capex
                }
            })
            .sum()
    }

    /// Annuity factor that amortizes a lump-sum capex over the lifetime at
    /// the discount rate: `(1+r)^l * r / ((1+r)^l - 1)`, or `1/l` without
    /// discounting.
    pub fn annuity(&self, tech: &TechnologyData) -> f64 {
        let rate = self.analysis.discount_rate;
        let lifetime = tech.lifetime;
        if rate.abs() < 1e-12 {
            1.0 / lifetime
        } else {
            (1.0 + rate).powf(lifetime) * rate / ((1.0 + rate).powf(lifetime) - 1.0)
        }
    }

    /// Provable upper bound of the installed capacity, for big-M terms.
    ///
    /// `+inf` when neither the addition limit nor the capacity limit is
    /// finite; big-M users must reject that case.
    pub fn capacity_upper_bound(
        &self,
        tech: &TechnologyData,
        capacity_type: &str,
        location: &str,
    ) -> f64 {
        let existing_total: f64 = tech
            .existing_capacities
            .iter()
            .filter(|g| g.location == location)
            .map(|g| {
                if capacity_type == self.system.energy_type() {
                    g.capacity_energy
                } else {
                    g.capacity
                }
            })
            .sum();
        let max_built = if capacity_type == self.system.energy_type() {
            tech.max_built_capacity_energy
        } else {
            tech.max_built_capacity
        };
        let from_additions = max_built * self.system.optimized_years as f64 + existing_total;
        let limit = tech
            .capacity_limit
            .get(&(capacity_type.to_string(), location.to_string()))
            .copied()
            .unwrap_or(f64::INFINITY);
        from_additions.min(limit + existing_total)
    }

    /// Technologies of the same kind sharing the reference carrier
    /// (including the technology itself).
    pub fn reference_carrier_siblings(&self, tech: &TechnologyData) -> Vec<String> {
        self.input
            .technologies
            .iter()
            .filter(|other| {
                other.kind() == tech.kind() && other.reference_carrier == tech.reference_carrier
            })
            .map(|other| other.name.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // set and parameter construction

    fn build_sets(&mut self) -> CepResult<()> {
        let system = self.system.clone();
        let diag = &mut self.diagnostics;
        let s = &mut self.sets;

        s.add_set(sets::SET_CARRIERS, system.carriers.clone(), "carriers", diag);
        s.add_set(sets::SET_NODES, system.nodes.clone(), "nodes", diag);
        s.add_set(
            sets::SET_EDGES,
            system.edges.iter().map(|e| e.name.clone()).collect(),
            "directed edges",
            diag,
        );
        s.add_set(
            sets::SET_TECHNOLOGIES,
            system.all_technologies(),
            "all technologies",
            diag,
        );
        s.add_subset(
            sets::SET_CONVERSION_TECHNOLOGIES,
            system.conversion_technologies.clone(),
            "conversion technologies",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_subset(
            sets::SET_TRANSPORT_TECHNOLOGIES,
            system.transport_technologies.clone(),
            "transport technologies",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_subset(
            sets::SET_STORAGE_TECHNOLOGIES,
            system.storage_technologies.clone(),
            "storage technologies",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_set(
            sets::SET_CAPACITY_TYPES,
            system.set_capacity_types.clone(),
            "capacity types",
            diag,
        );
        s.add_set(sets::SET_TIME_STEPS_OPERATION, self_op_steps(&self.time_steps), "operational steps", diag);
        s.add_set(
            sets::SET_TIME_STEPS_YEARLY,
            self.time_steps
                .yearly_steps()
                .iter()
                .map(|y| y.to_string())
                .collect(),
            "yearly investment steps",
            diag,
        );

        let mut location = HashMap::new();
        let mut capacity_types = HashMap::new();
        let mut reference = HashMap::new();
        let mut inputs = HashMap::new();
        let mut outputs = HashMap::new();
        let mut existing = HashMap::new();
        let mut on_off = Vec::new();
        for tech in &self.input.technologies {
            let locations = match tech.kind() {
                TechnologyKind::Transport => self.topology.edge_names(),
                _ => system.nodes.clone(),
            };
            location.insert(tech.name.clone(), locations);
            let types = match tech.kind() {
                TechnologyKind::Storage => system.set_capacity_types.clone(),
                _ => vec![system.power_type().to_string()],
            };
            capacity_types.insert(tech.name.clone(), types);
            reference.insert(tech.name.clone(), vec![tech.reference_carrier.clone()]);
            if let Some(conversion) = tech.conversion() {
                inputs.insert(tech.name.clone(), conversion.input_carriers.clone());
                outputs.insert(tech.name.clone(), conversion.output_carriers.clone());
            }
            existing.insert(
                tech.name.clone(),
                (0..tech.existing_capacities.len())
                    .map(|i| i.to_string())
                    .collect(),
            );
            if tech.is_on_off() {
                on_off.push(tech.name.clone());
            }
        }
        s.add_indexed_set(sets::SET_LOCATION, location, "locations per technology", sets::SET_TECHNOLOGIES, diag);
        s.add_indexed_set(
            SET_TECH_CAPACITY_TYPES,
            capacity_types,
            "capacity types per technology",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_indexed_set(
            sets::SET_REFERENCE_CARRIERS,
            reference,
            "reference carrier per technology",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_indexed_set(
            sets::SET_INPUT_CARRIERS,
            inputs,
            "input carriers per conversion technology",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_indexed_set(
            sets::SET_OUTPUT_CARRIERS,
            outputs,
            "output carriers per conversion technology",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_indexed_set(
            sets::SET_EXISTING,
            existing,
            "existing capacity generations per technology",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        s.add_subset(
            sets::SET_ON_OFF,
            on_off,
            "technologies with min-load semantics",
            sets::SET_TECHNOLOGIES,
            diag,
        );
        Ok(())
    }

    /// Aggregated series value on the horizon grid: the one-year aggregated
    /// value of the step, times the attribute's yearly variation.
    fn series_value(
        &self,
        element: &str,
        attribute: &str,
        raw: &RawSeries,
        variation: &HashMap<String, Vec<f64>>,
        location: &str,
        step: usize,
    ) -> f64 {
        let steps_per_year = self.aggregation.steps_per_year();
        let year = step / steps_per_year;
        let step_in_year = step % steps_per_year;
        let base = self
            .aggregation
            .value(element, attribute, location, step_in_year)
            .unwrap_or(raw.default);
        let factor = variation
            .get(attribute)
            .and_then(|v| v.get(year).copied())
            .unwrap_or(1.0);
        base * factor
    }

    fn build_params(&mut self) -> CepResult<()> {
        let steps = self.op_steps();
        let years: Vec<usize> = self.time_steps.yearly_steps();
        let mut diag = std::mem::take(&mut self.diagnostics);
        let mut params = std::mem::take(&mut self.params);

        // step durations
        let duration_entries: Vec<(Vec<String>, f64)> = steps
            .iter()
            .map(|t| Ok((vec![t.clone()], self.step_duration(t)?)))
            .collect::<CepResult<_>>()?;
        params.add_parameter(
            "duration",
            &[sets::SET_TIME_STEPS_OPERATION],
            duration_entries,
            1.0,
            &mut diag,
        )?;

        declare_default_params(&mut params, &mut diag)?;

        // carrier parameters
        for carrier in &self.input.carriers {
            let mut series_entries: HashMap<&str, Vec<(Vec<String>, f64)>> = HashMap::new();
            for (attribute, raw) in carrier.series_attributes() {
                let mut entries = Vec::new();
                for node in &self.system.nodes {
                    for t in &steps {
                        let step: usize = t.parse().expect("step id");
                        let value = self.series_value(
                            &carrier.name,
                            attribute,
                            raw,
                            &carrier.yearly_variation,
                            node,
                            step,
                        );
                        entries.push((vec![carrier.name.clone(), node.clone(), t.clone()], value));
                    }
                }
                series_entries.insert(attribute, entries);
            }
            for (attribute, entries) in series_entries {
                merge_parameter(
                    &mut params,
                    attribute,
                    &[sets::SET_CARRIERS, sets::SET_NODES, sets::SET_TIME_STEPS_OPERATION],
                    entries,
                    0.0,
                    &mut diag,
                )?;
            }

            let mut import_yearly = Vec::new();
            let mut export_yearly = Vec::new();
            let mut carbon = Vec::new();
            for node in &self.system.nodes {
                for &year in &years {
                    let key = (node.clone(), year);
                    let tuple = vec![carrier.name.clone(), node.clone(), year.to_string()];
                    import_yearly.push((
                        tuple.clone(),
                        carrier
                            .availability_import_yearly
                            .get(&key)
                            .copied()
                            .unwrap_or(f64::INFINITY),
                    ));
                    export_yearly.push((
                        tuple.clone(),
                        carrier
                            .availability_export_yearly
                            .get(&key)
                            .copied()
                            .unwrap_or(f64::INFINITY),
                    ));
                    carbon.push((
                        tuple,
                        carrier.carbon_intensity.get(&key).copied().unwrap_or(0.0),
                    ));
                }
            }
            let yearly_dims = [sets::SET_CARRIERS, sets::SET_NODES, sets::SET_TIME_STEPS_YEARLY];
            merge_parameter(
                &mut params,
                "availability_import_yearly",
                &yearly_dims,
                import_yearly,
                f64::INFINITY,
                &mut diag,
            )?;
            merge_parameter(
                &mut params,
                "availability_export_yearly",
                &yearly_dims,
                export_yearly,
                f64::INFINITY,
                &mut diag,
            )?;
            merge_parameter(
                &mut params,
                "carbon_intensity_carrier",
                &yearly_dims,
                carbon,
                0.0,
                &mut diag,
            )?;
            merge_parameter(
                &mut params,
                "shed_demand_price",
                &[sets::SET_CARRIERS],
                vec![(vec![carrier.name.clone()], carrier.shed_demand_price)],
                f64::INFINITY,
                &mut diag,
            )?;
        }

        // technology parameters
        for tech in &self.input.technologies {
            let name = &tech.name;
            let locations = self.locations_of(tech);
            let capacity_types = self.capacity_types_of(tech);
            let power = self.system.power_type().to_string();
            let energy = self.system.energy_type().to_string();

            merge_parameter(
                &mut params,
                "lifetime",
                &[sets::SET_TECHNOLOGIES],
                vec![(vec![name.clone()], tech.lifetime)],
                0.0,
                &mut diag,
            )?;
            merge_parameter(
                &mut params,
                "construction_time",
                &[sets::SET_TECHNOLOGIES],
                vec![(vec![name.clone()], tech.construction_time)],
                0.0,
                &mut diag,
            )?;
            merge_parameter(
                &mut params,
                "unbounded_addition",
                &[sets::SET_TECHNOLOGIES],
                vec![(vec![name.clone()], tech.unbounded_addition)],
                0.0,
                &mut diag,
            )?;

            let mut min_built = Vec::new();
            let mut max_built = Vec::new();
            for capacity_type in &capacity_types {
                let (min_value, max_value) = if *capacity_type == energy {
                    (tech.min_built_capacity_energy, tech.max_built_capacity_energy)
                } else {
                    (tech.min_built_capacity, tech.max_built_capacity)
                };
                min_built.push((vec![name.clone(), capacity_type.clone()], min_value));
                max_built.push((vec![name.clone(), capacity_type.clone()], max_value));
            }
            merge_parameter(
                &mut params,
                "min_built_capacity",
                &[sets::SET_TECHNOLOGIES, sets::SET_CAPACITY_TYPES],
                min_built,
                0.0,
                &mut diag,
            )?;
            merge_parameter(
                &mut params,
                "max_built_capacity",
                &[sets::SET_TECHNOLOGIES, sets::SET_CAPACITY_TYPES],
                max_built,
                f64::INFINITY,
                &mut diag,
            )?;

            let mut limit_entries = Vec::new();
            for capacity_type in &capacity_types {
                for location in &locations {
                    let value = tech
                        .capacity_limit
                        .get(&(capacity_type.clone(), location.clone()))
                        .copied()
                        .unwrap_or(f64::INFINITY);
                    limit_entries.push((
                        vec![name.clone(), capacity_type.clone(), location.clone()],
                        value,
                    ));
                }
            }
            merge_parameter(
                &mut params,
                "capacity_limit",
                &[sets::SET_TECHNOLOGIES, sets::SET_CAPACITY_TYPES, sets::SET_LOCATION],
                limit_entries,
                f64::INFINITY,
                &mut diag,
            )?;

            let diffusion_entries = years
                .iter()
                .map(|&y| {
                    (
                        vec![name.clone(), y.to_string()],
                        tech.max_diffusion_rate.get(&y).copied().unwrap_or(f64::INFINITY),
                    )
                })
                .collect();
            merge_parameter(
                &mut params,
                "max_diffusion_rate",
                &[sets::SET_TECHNOLOGIES, sets::SET_TIME_STEPS_YEARLY],
                diffusion_entries,
                f64::INFINITY,
                &mut diag,
            )?;

            for (attribute, raw) in tech.series_attributes() {
                let mut entries = Vec::new();
                for location in &locations {
                    for t in &steps {
                        let step: usize = t.parse().expect("step id");
                        let value = self.series_value(
                            name,
                            attribute,
                            raw,
                            &tech.yearly_variation,
                            location,
                            step,
                        );
                        entries.push((vec![name.clone(), location.clone(), t.clone()], value));
                    }
                }
                merge_parameter(
                    &mut params,
                    attribute,
                    &[sets::SET_TECHNOLOGIES, sets::SET_LOCATION, sets::SET_TIME_STEPS_OPERATION],
                    entries,
                    raw.default,
                    &mut diag,
                )?;
            }

            let mut fixed_opex = Vec::new();
            let mut capex = Vec::new();
            for capacity_type in &capacity_types {
                for location in &locations {
                    for &year in &years {
                        let key = (location.clone(), year);
                        let (fixed_map, capex_map) = if *capacity_type == energy {
                            (&tech.opex_specific_fixed_energy, &tech.capex_specific_energy)
                        } else {
                            (&tech.opex_specific_fixed, &tech.capex_specific)
                        };
                        let tuple = vec![
                            name.clone(),
                            capacity_type.clone(),
                            location.clone(),
                            year.to_string(),
                        ];
                        fixed_opex.push((tuple.clone(), fixed_map.get(&key).copied().unwrap_or(0.0)));
                        capex.push((tuple, capex_map.get(&key).copied().unwrap_or(0.0)));
                    }
                }
            }
            let capex_dims = [
                sets::SET_TECHNOLOGIES,
                sets::SET_CAPACITY_TYPES,
                sets::SET_LOCATION,
                sets::SET_TIME_STEPS_YEARLY,
            ];
            merge_parameter(&mut params, "opex_specific_fixed", &capex_dims, fixed_opex, 0.0, &mut diag)?;
            merge_parameter(&mut params, "capex_specific", &capex_dims, capex, 0.0, &mut diag)?;

            let carbon_entries = locations
                .iter()
                .map(|location| {
                    (
                        vec![name.clone(), location.clone()],
                        tech.carbon_intensity.get(location).copied().unwrap_or(0.0),
                    )
                })
                .collect();
            merge_parameter(
                &mut params,
                "carbon_intensity_technology",
                &[sets::SET_TECHNOLOGIES, sets::SET_LOCATION],
                carbon_entries,
                0.0,
                &mut diag,
            )?;

            // existing generations
            let mut existing_capacity = Vec::new();
            let mut existing_lifetime = Vec::new();
            let mut existing_capex = Vec::new();
            for (id, generation) in tech.existing_capacities.iter().enumerate() {
                let id = id.to_string();
                existing_lifetime.push((
                    vec![name.clone(), generation.location.clone(), id.clone()],
                    generation.remaining_lifetime,
                ));
                for capacity_type in &capacity_types {
                    let (capacity, capex_value) = if *capacity_type == energy {
                        (generation.capacity_energy, generation.capex_energy)
                    } else {
                        (generation.capacity, generation.capex)
                    };
                    let tuple = vec![
                        name.clone(),
                        capacity_type.clone(),
                        generation.location.clone(),
                        id.clone(),
                    ];
                    existing_capacity.push((tuple.clone(), capacity));
                    existing_capex.push((tuple, capex_value));
                }
            }
            let existing_dims = [
                sets::SET_TECHNOLOGIES,
                sets::SET_CAPACITY_TYPES,
                sets::SET_LOCATION,
                sets::SET_EXISTING,
            ];
            merge_parameter(&mut params, "existing_capacity", &existing_dims, existing_capacity, 0.0, &mut diag)?;
            merge_parameter(
                &mut params,
                "lifetime_existing",
                &[sets::SET_TECHNOLOGIES, sets::SET_LOCATION, sets::SET_EXISTING],
                existing_lifetime,
                0.0,
                &mut diag,
            )?;
            merge_parameter(&mut params, "capex_existing", &existing_dims, existing_capex, 0.0, &mut diag)?;

            let invested_entries = tech
                .existing_invested
                .iter()
                .map(|((location, year), value)| {
                    (
                        vec![
                            name.clone(),
                            power.clone(),
                            location.clone(),
                            year.to_string(),
                        ],
                        *value,
                    )
                })
                .collect();
            merge_parameter(
                &mut params,
                "capacity_investment_existing",
                &capex_dims,
                invested_entries,
                0.0,
                &mut diag,
            )?;

            match tech.kind() {
                TechnologyKind::Transport => {
                    let transport = tech.transport().expect("transport data");
                    let distance_entries = locations
                        .iter()
                        .map(|edge| {
                            (
                                vec![name.clone(), edge.clone()],
                                transport.distance.get(edge).copied().unwrap_or(0.0),
                            )
                        })
                        .collect();
                    merge_parameter(
                        &mut params,
                        "distance",
                        &[sets::SET_TECHNOLOGIES, sets::SET_EDGES],
                        distance_entries,
                        0.0,
                        &mut diag,
                    )?;
                    merge_parameter(
                        &mut params,
                        "loss_flow",
                        &[sets::SET_TECHNOLOGIES],
                        vec![(vec![name.clone()], transport.loss_flow)],
                        0.0,
                        &mut diag,
                    )?;
                    let per_distance_entries = locations
                        .iter()
                        .flat_map(|edge| {
                            years.iter().map(move |&year| {
                                (
                                    vec![name.clone(), edge.clone(), year.to_string()],
                                    transport
                                        .capex_per_distance
                                        .get(&(edge.clone(), year))
                                        .copied()
                                        .unwrap_or(0.0),
                                )
                            })
                        })
                        .collect();
                    merge_parameter(
                        &mut params,
                        "capex_per_distance",
                        &[sets::SET_TECHNOLOGIES, sets::SET_EDGES, sets::SET_TIME_STEPS_YEARLY],
                        per_distance_entries,
                        0.0,
                        &mut diag,
                    )?;
                }
                TechnologyKind::Storage => {
                    let storage = tech.storage().expect("storage data");
                    merge_parameter(
                        &mut params,
                        "efficiency_charge",
                        &[sets::SET_TECHNOLOGIES],
                        vec![(vec![name.clone()], storage.efficiency_charge)],
                        1.0,
                        &mut diag,
                    )?;
                    merge_parameter(
                        &mut params,
                        "efficiency_discharge",
                        &[sets::SET_TECHNOLOGIES],
                        vec![(vec![name.clone()], storage.efficiency_discharge)],
                        1.0,
                        &mut diag,
                    )?;
                    merge_parameter(
                        &mut params,
                        "self_discharge",
                        &[sets::SET_TECHNOLOGIES],
                        vec![(vec![name.clone()], storage.self_discharge)],
                        0.0,
                        &mut diag,
                    )?;
                }
                TechnologyKind::Conversion => {
                    let conversion = tech.conversion().expect("conversion data");
                    let mut factor_entries = Vec::new();
                    for carrier in conversion
                        .input_carriers
                        .iter()
                        .chain(conversion.output_carriers.iter())
                    {
                        let factor = if *carrier == tech.reference_carrier {
                            1.0
                        } else {
                            match conversion.conversion_factor.get(carrier) {
                                Some(&f) => f,
                                None => {
                                    return Err(CepError::Config(format!(
                                        "technology {} declares carrier {} without a conversion factor",
                                        name, carrier
                                    )))
                                }
                            }
                        };
                        factor_entries.push((vec![name.clone(), carrier.clone()], factor));
                    }
                    merge_parameter(
                        &mut params,
                        "conversion_factor",
                        &[sets::SET_TECHNOLOGIES, sets::SET_CARRIERS],
                        factor_entries,
                        0.0,
                        &mut diag,
                    )?;
                }
            }
        }

        self.params = params;
        self.diagnostics = diag;
        Ok(())
    }
}

/// Declare every parameter with its dimensions and broadcast default, so
/// lookups are well-defined even for element classes the system does not
/// use. Per-element construction appends the explicit entries.
fn declare_default_params(params: &mut ParameterStore, diag: &mut Diagnostics) -> CepResult<()> {
    let step_dims = [sets::SET_CARRIERS, sets::SET_NODES, sets::SET_TIME_STEPS_OPERATION];
    let yearly_dims = [sets::SET_CARRIERS, sets::SET_NODES, sets::SET_TIME_STEPS_YEARLY];
    let tech_step_dims = [sets::SET_TECHNOLOGIES, sets::SET_LOCATION, sets::SET_TIME_STEPS_OPERATION];
    let tech_yearly_dims = [
        sets::SET_TECHNOLOGIES,
        sets::SET_CAPACITY_TYPES,
        sets::SET_LOCATION,
        sets::SET_TIME_STEPS_YEARLY,
    ];
    let existing_dims = [
        sets::SET_TECHNOLOGIES,
        sets::SET_CAPACITY_TYPES,
        sets::SET_LOCATION,
        sets::SET_EXISTING,
    ];

    let defaults: [(&str, &[&str], f64); 25] = [
        ("demand", &step_dims, 0.0),
        ("availability_import", &step_dims, 0.0),
        ("availability_export", &step_dims, 0.0),
        ("import_price", &step_dims, 0.0),
        ("export_price", &step_dims, 0.0),
        ("availability_import_yearly", &yearly_dims, f64::INFINITY),
        ("availability_export_yearly", &yearly_dims, f64::INFINITY),
        ("carbon_intensity_carrier", &yearly_dims, 0.0),
        ("shed_demand_price", &[sets::SET_CARRIERS], f64::INFINITY),
        ("lifetime", &[sets::SET_TECHNOLOGIES], 1.0),
        ("construction_time", &[sets::SET_TECHNOLOGIES], 0.0),
        ("unbounded_addition", &[sets::SET_TECHNOLOGIES], 0.0),
        (
            "min_built_capacity",
            &[sets::SET_TECHNOLOGIES, sets::SET_CAPACITY_TYPES],
            0.0,
        ),
        (
            "max_built_capacity",
            &[sets::SET_TECHNOLOGIES, sets::SET_CAPACITY_TYPES],
            f64::INFINITY,
        ),
        (
            "capacity_limit",
            &[sets::SET_TECHNOLOGIES, sets::SET_CAPACITY_TYPES, sets::SET_LOCATION],
            f64::INFINITY,
        ),
        (
            "max_diffusion_rate",
            &[sets::SET_TECHNOLOGIES, sets::SET_TIME_STEPS_YEARLY],
            f64::INFINITY,
        ),
        ("min_load", &tech_step_dims, 0.0),
        ("max_load", &tech_step_dims, 1.0),
        ("opex_specific_variable", &tech_step_dims, 0.0),
        ("opex_specific_fixed", &tech_yearly_dims, 0.0),
        ("capex_specific", &tech_yearly_dims, 0.0),
        (
            "carbon_intensity_technology",
            &[sets::SET_TECHNOLOGIES, sets::SET_LOCATION],
            0.0,
        ),
        ("existing_capacity", &existing_dims, 0.0),
        ("capex_existing", &existing_dims, 0.0),
        ("capacity_investment_existing", &tech_yearly_dims, 0.0),
    ];
    for (name, dims, default) in defaults {
        params.add_parameter(name, dims, Vec::new(), default, diag)?;
    }
    params.add_parameter(
        "lifetime_existing",
        &[sets::SET_TECHNOLOGIES, sets::SET_LOCATION, sets::SET_EXISTING],
        Vec::new(),
        0.0,
        diag,
    )?;
    Ok(())
}

fn self_op_steps(time_steps: &TimeSteps) -> Vec<String> {
    time_steps
        .grid(SYSTEM_GRID)
        .expect("system grid")
        .steps
        .iter()
        .map(|t| t.to_string())
        .collect()
}

/// Add entries to a parameter, creating it on first use. Parameters span
/// all elements, so per-element construction appends instead of warning.
fn merge_parameter(
    params: &mut ParameterStore,
    name: &str,
    dims: &[&str],
    entries: Vec<(Vec<String>, f64)>,
    default: f64,
    diag: &mut Diagnostics,
) -> CepResult<()> {
    if params.contains(name) {
        for (key, value) in &entries {
            if value.is_nan() {
                return Err(CepError::Data(format!(
                    "parameter {} has NaN value at {:?}",
                    name, key
                )));
            }
        }
        let param = params.get_mut(name)?;
        for (key, value) in entries {
            param.set(key, value);
        }
        Ok(())
    } else {
        params.add_parameter(name, dims, entries, default, diag)
    }
}

fn validate_input(system: &System, input: &InputData) -> CepResult<()> {
    for carrier in &system.carriers {
        if input.carrier(carrier).is_none() {
            return Err(CepError::Config(format!(
                "carrier {} is declared but has no input data",
                carrier
            )));
        }
    }
    let kinds = [
        (&system.conversion_technologies, TechnologyKind::Conversion),
        (&system.transport_technologies, TechnologyKind::Transport),
        (&system.storage_technologies, TechnologyKind::Storage),
    ];
    for (names, kind) in kinds {
        for name in names {
            let tech = input.technology(name).ok_or_else(|| {
                CepError::Config(format!("technology {} is declared but has no input data", name))
            })?;
            if tech.kind() != kind {
                return Err(CepError::Config(format!(
                    "technology {} is declared as {:?} but its data is {:?}",
                    name,
                    kind,
                    tech.kind()
                )));
            }
            if !system.carriers.contains(&tech.reference_carrier) {
                return Err(CepError::Config(format!(
                    "technology {} references unknown carrier {}",
                    name, tech.reference_carrier
                )));
            }
            if let Some(conversion) = tech.conversion() {
                for carrier in conversion
                    .input_carriers
                    .iter()
                    .chain(conversion.output_carriers.iter())
                {
                    if !system.carriers.contains(carrier) {
                        return Err(CepError::Config(format!(
                            "technology {} references unknown carrier {}",
                            name, carrier
                        )));
                    }
                }
                let is_input = conversion.input_carriers.contains(&tech.reference_carrier);
                let is_output = conversion.output_carriers.contains(&tech.reference_carrier);
                if !is_input && !is_output {
                    return Err(CepError::Config(format!(
                        "technology {}: reference carrier {} is neither input nor output",
                        name, tech.reference_carrier
                    )));
                }
            }
        }
    }
    if system.optimized_years == 0 {
        return Err(CepError::Config("optimized_years must be at least 1".into()));
    }
    Ok(())
}

fn validate_bidirectional(
    system: &System,
    input: &InputData,
    topology: &Topology,
) -> CepResult<()> {
    for name in &system.bidirectional_transport_technologies {
        let tech = input
            .technology(name)
            .ok_or_else(|| CepError::Config(format!("unknown bidirectional technology {}", name)))?;
        if tech.kind() != TechnologyKind::Transport {
            return Err(CepError::Config(format!(
                "bidirectional technology {} is not a transport technology",
                name
            )));
        }
        for edge in topology.edge_names() {
            let reverse = topology.reversed_edge(&edge).ok_or_else(|| {
                CepError::Config(format!(
                    "bidirectional technology {} needs a reversed edge for {}",
                    name, edge
                ))
            })?;
            let forward: f64 = tech
                .existing_capacities
                .iter()
                .filter(|g| g.location == edge)
                .map(|g| g.capacity)
                .sum();
            let backward: f64 = tech
                .existing_capacities
                .iter()
                .filter(|g| g.location == reverse)
                .map(|g| g.capacity)
                .sum();
            if (forward - backward).abs() > 1e-9 {
                return Err(CepError::Data(format!(
                    "bidirectional technology {}: existing capacities differ on {} ({}) and {} ({})",
                    name, edge, forward, reverse, backward
                )));
            }
        }
    }
    Ok(())
}
