//! Time-series aggregation: reduce per-element hourly series to
//! representative operational steps.
//!
//! One year of `H` base hours is partitioned into periods of
//! `hours_per_period` hours; the periods are clustered (k-means or
//! k-medoids) into `T / hours_per_period` groups. Each cluster contributes
//! `hours_per_period` operational steps whose duration is the cluster's
//! occurrence count, so durations always sum to `H`. The cyclic
//! `base -> operational` sequence reconstructs the original year.
//!
//! Special cases:
//! - aggregation disabled or `T >= H`: the identity grid, every step of
//!   duration 1, series pass through unchanged;
//! - only constant series: a single step of duration `H`;
//! - constant series never enter the clustering and are propagated as-is;
//! - series on the exclusion list are aggregated manually along the final
//!   sequence (mean under k-means, median under k-medoids).

use std::collections::HashMap;

use anyhow::{ensure, Result};

use cep_core::config::{Analysis, ClusterMethod, ExtremePeriodMethod, System};
use cep_core::diagnostics::Diagnostics;
use cep_core::input::InputData;

pub mod cluster;

use cluster::{k_means, k_medoids, ClusterResult};

const MAX_CLUSTER_ITERATIONS: usize = 100;

/// One materialized hourly series of one element attribute at one location
#[derive(Debug, Clone)]
struct SeriesRef {
    element: String,
    attribute: String,
    location: String,
    values: Vec<f64>,
    excluded: bool,
    constant: bool,
    finite: bool,
}

impl SeriesRef {
    /// Series the clustering may consume: explicitly included, varying,
    /// and free of non-finite sentinels.
    fn clusterable(&self) -> bool {
        !self.excluded && !self.constant && self.finite
    }
}

/// Outcome of the aggregation for one year
#[derive(Debug, Clone)]
pub struct AggregationResult {
    /// Duration per operational step, summing to `H`
    pub duration: Vec<f64>,
    /// `base hour -> operational step` for one year
    pub sequence: Vec<usize>,
    /// Aggregated values per `(element, attribute)` and location, indexed
    /// by operational step
    pub aggregated: HashMap<(String, String), HashMap<String, Vec<f64>>>,
    /// Whether a clustering actually ran
    pub conducted: bool,
}

impl AggregationResult {
    pub fn steps_per_year(&self) -> usize {
        self.duration.len()
    }

    /// Aggregated value of a series at an operational step, if the series
    /// was part of the aggregation.
    pub fn value(&self, element: &str, attribute: &str, location: &str, step: usize) -> Option<f64> {
        self.aggregated
            .get(&(element.to_string(), attribute.to_string()))
            .and_then(|locs| locs.get(location))
            .and_then(|v| v.get(step))
            .copied()
    }
}

/// Aggregate all element series of one year onto a representative grid.
pub fn aggregate(
    system: &System,
    analysis: &Analysis,
    input: &InputData,
    diag: &mut Diagnostics,
) -> Result<AggregationResult> {
    let hours = system.unaggregated_time_steps_per_year;
    ensure!(hours > 0, "unaggregated_time_steps_per_year must be positive");
    let target = system.aggregated_time_steps_per_year.min(hours);

    let series = collect_series(system, input, hours, diag);

    if !system.conduct_time_series_aggregation || target >= hours {
        return Ok(identity_result(&series, hours));
    }

    let settings = &analysis.time_series_aggregation;
    let mut hours_per_period = settings.hours_per_period.max(1);
    if hours % hours_per_period != 0 {
        diag.add_warning(
            "aggregation",
            &format!(
                "{} hours per year is not divisible into {}-hour periods, using 1-hour periods",
                hours, hours_per_period
            ),
        );
        hours_per_period = 1;
    }
    if target % hours_per_period != 0 {
        diag.add_warning(
            "aggregation",
            &format!(
                "{} representative steps is not a multiple of the {}-hour period, flooring",
                target, hours_per_period
            ),
        );
    }
    let periods = hours / hours_per_period;
    let clusters = (target / hours_per_period).clamp(1, periods);

    let candidates: Vec<usize> = series
        .iter()
        .enumerate()
        .filter(|(_, s)| s.clusterable())
        .map(|(i, _)| i)
        .collect();

    if candidates.is_empty() {
        if series.iter().any(|s| s.excluded) {
            diag.add_warning(
                "aggregation",
                "exclusion list used while no series is left to cluster",
            );
        }
        return Ok(single_step_result(&series, hours, settings.cluster_method, analysis));
    }

    // period vectors over min/max-normalized candidate series
    let normalized: Vec<Vec<f64>> = candidates
        .iter()
        .map(|&i| normalize(&series[i].values))
        .collect();
    let mut period_vectors = Vec::with_capacity(periods);
    for p in 0..periods {
        let mut vector = Vec::with_capacity(candidates.len() * hours_per_period);
        for values in &normalized {
            vector.extend_from_slice(&values[p * hours_per_period..(p + 1) * hours_per_period]);
        }
        period_vectors.push(vector);
    }

    let mut result = match settings.cluster_method {
        ClusterMethod::KMeans => k_means(&period_vectors, clusters, settings.seed, MAX_CLUSTER_ITERATIONS),
        ClusterMethod::KMedoids => {
            k_medoids(&period_vectors, clusters, settings.seed, MAX_CLUSTER_ITERATIONS)
        }
    };

    if settings.extreme_period_method == ExtremePeriodMethod::Append {
        append_extreme_periods(&series, &candidates, hours_per_period, &mut result);
    }

    let cluster_count = result.occurrences.len();
    let mut duration = Vec::with_capacity(cluster_count * hours_per_period);
    for c in 0..cluster_count {
        for _ in 0..hours_per_period {
            duration.push(result.occurrences[c] as f64);
        }
    }
    let sequence: Vec<usize> = (0..hours)
        .map(|b| result.assignment[b / hours_per_period] * hours_per_period + b % hours_per_period)
        .collect();

    let steps = duration.len();
    let mut aggregated = HashMap::new();
    for &i in &candidates {
        let s = &series[i];
        let mut values =
            representative_values(&s.values, &result, hours_per_period, settings.cluster_method);
        if settings.rescale_cluster_periods {
            rescale(&mut values, &duration, &s.values);
        }
        insert_series(&mut aggregated, s, values);
    }
    for s in series.iter().filter(|s| s.constant && !s.excluded && s.finite) {
        insert_series(&mut aggregated, s, vec![s.values[0]; steps]);
    }
    for s in series.iter().filter(|s| s.excluded || !s.finite) {
        let values = manual_aggregation(&s.values, &sequence, steps, settings.cluster_method);
        insert_series(&mut aggregated, s, values);
    }

    snap_to_zero(&mut aggregated, analysis.rounding_decimal_points_ts);

    Ok(AggregationResult {
        duration,
        sequence,
        aggregated,
        conducted: true,
    })
}

fn collect_series(
    system: &System,
    input: &InputData,
    hours: usize,
    diag: &mut Diagnostics,
) -> Vec<SeriesRef> {
    let excluded = resolve_exclusions(system, input, diag);
    let mut series = Vec::new();

    let mut push = |element: &str, attribute: &str, location: &str, values: Vec<f64>| {
        let constant = values.windows(2).all(|w| w[0] == w[1]);
        let finite = values.iter().all(|v| v.is_finite());
        let is_excluded = excluded.contains(&(element.to_string(), attribute.to_string()));
        series.push(SeriesRef {
            element: element.to_string(),
            attribute: attribute.to_string(),
            location: location.to_string(),
            values,
            excluded: is_excluded,
            constant,
            finite,
        });
    };

    for carrier in &input.carriers {
        for (attribute, raw) in carrier.series_attributes() {
            let mut locations: Vec<&String> = raw.locations().collect();
            locations.sort();
            for location in locations {
                let values = (0..hours).map(|h| raw.value(location, h)).collect();
                push(&carrier.name, attribute, location, values);
            }
        }
    }
    for tech in &input.technologies {
        for (attribute, raw) in tech.series_attributes() {
            let mut locations: Vec<&String> = raw.locations().collect();
            locations.sort();
            for location in locations {
                let values = (0..hours).map(|h| raw.value(location, h)).collect();
                push(&tech.name, attribute, location, values);
            }
        }
    }
    series
}

fn resolve_exclusions(
    system: &System,
    input: &InputData,
    diag: &mut Diagnostics,
) -> Vec<(String, String)> {
    let mut excluded = Vec::new();
    if !system.exclude_parameters_from_tsa {
        return excluded;
    }
    for (element, attribute) in &input.excluded_from_tsa {
        let carrier = input.carrier(element);
        let technology = input.technology(element);
        if carrier.is_none() && technology.is_none() {
            diag.add_warning_with_entity(
                "aggregation",
                "exclusion list references unknown element",
                element,
            );
            continue;
        }
        let attributes: Vec<String> = match (carrier, technology) {
            (Some(c), _) => c.series_attributes().iter().map(|(a, _)| a.to_string()).collect(),
            (_, Some(t)) => t.series_attributes().iter().map(|(a, _)| a.to_string()).collect(),
            _ => unreachable!(),
        };
        match attribute {
            None => {
                diag.add_warning_with_entity(
                    "aggregation",
                    "excluding all series of element from aggregation",
                    element,
                );
                for a in attributes {
                    excluded.push((element.clone(), a));
                }
            }
            Some(a) if attributes.contains(a) => excluded.push((element.clone(), a.clone())),
            Some(a) => diag.add_warning_with_entity(
                "aggregation",
                &format!("exclusion list references unknown series '{}'", a),
                element,
            ),
        }
    }
    excluded.sort();
    excluded.dedup();
    excluded
}

fn identity_result(series: &[SeriesRef], hours: usize) -> AggregationResult {
    let mut aggregated = HashMap::new();
    for s in series {
        insert_series(&mut aggregated, s, s.values.clone());
    }
    AggregationResult {
        duration: vec![1.0; hours],
        sequence: (0..hours).collect(),
        aggregated,
        conducted: false,
    }
}

fn single_step_result(
    series: &[SeriesRef],
    hours: usize,
    method: ClusterMethod,
    analysis: &Analysis,
) -> AggregationResult {
    let sequence = vec![0usize; hours];
    let mut aggregated = HashMap::new();
    for s in series {
        let values = if s.excluded {
            manual_aggregation(&s.values, &sequence, 1, method)
        } else {
            vec![s.values[0]]
        };
        insert_series(&mut aggregated, s, values);
    }
    snap_to_zero(&mut aggregated, analysis.rounding_decimal_points_ts);
    AggregationResult {
        duration: vec![hours as f64],
        sequence,
        aggregated,
        conducted: true,
    }
}

fn insert_series(
    aggregated: &mut HashMap<(String, String), HashMap<String, Vec<f64>>>,
    series: &SeriesRef,
    values: Vec<f64>,
) {
    aggregated
        .entry((series.element.clone(), series.attribute.clone()))
        .or_default()
        .insert(series.location.clone(), values);
}

fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if span <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / span).collect()
}

/// Force each period containing a series-wide peak into its own cluster.
fn append_extreme_periods(
    series: &[SeriesRef],
    candidates: &[usize],
    hours_per_period: usize,
    result: &mut ClusterResult,
) {
    for &i in candidates {
        let values = &series[i].values;
        let peak_hour = values
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
            .map(|(h, _)| h)
            .unwrap_or(0);
        let peak_period = peak_hour / hours_per_period;
        let current = result.assignment[peak_period];
        if result.occurrences[current] > 1 {
            let new_cluster = result.occurrences.len();
            result.assignment[peak_period] = new_cluster;
            result.occurrences[current] -= 1;
            result.occurrences.push(1);
            if let Some(medoids) = result.medoids.as_mut() {
                medoids.push(peak_period);
            }
        }
    }
}

/// Representative hourly values of one series on the aggregated grid.
fn representative_values(
    raw: &[f64],
    result: &ClusterResult,
    hours_per_period: usize,
    method: ClusterMethod,
) -> Vec<f64> {
    let clusters = result.occurrences.len();
    let mut values = vec![0.0; clusters * hours_per_period];
    match method {
        ClusterMethod::KMeans => {
            for c in 0..clusters {
                let members: Vec<usize> = result
                    .assignment
                    .iter()
                    .enumerate()
                    .filter(|(_, &a)| a == c)
                    .map(|(p, _)| p)
                    .collect();
                for h in 0..hours_per_period {
                    let sum: f64 = members.iter().map(|&p| raw[p * hours_per_period + h]).sum();
                    values[c * hours_per_period + h] = if members.is_empty() {
                        0.0
                    } else {
                        sum / members.len() as f64
                    };
                }
            }
        }
        ClusterMethod::KMedoids => {
            let medoids = result
                .medoids
                .as_ref()
                .expect("k-medoids result carries medoids");
            for (c, &m) in medoids.iter().enumerate() {
                for h in 0..hours_per_period {
                    values[c * hours_per_period + h] = raw[m * hours_per_period + h];
                }
            }
        }
    }
    values
}

/// Scale aggregated values so the duration-weighted yearly sum matches the
/// raw series.
fn rescale(values: &mut [f64], duration: &[f64], raw: &[f64]) {
    let raw_sum: f64 = raw.iter().sum();
    let weighted: f64 = values.iter().zip(duration.iter()).map(|(v, d)| v * d).sum();
    if weighted.abs() > 1e-12 {
        let factor = raw_sum / weighted;
        for v in values.iter_mut() {
            *v *= factor;
        }
    }
}

/// Aggregate an excluded series along the final sequence: mean of the hours
/// assigned to each step under k-means, median under k-medoids.
fn manual_aggregation(
    raw: &[f64],
    sequence: &[usize],
    steps: usize,
    method: ClusterMethod,
) -> Vec<f64> {
    let mut values = vec![0.0; steps];
    for step in 0..steps {
        let members: Vec<f64> = sequence
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == step)
            .map(|(b, _)| raw[b])
            .collect();
        values[step] = match method {
            ClusterMethod::KMeans => {
                if members.is_empty() {
                    0.0
                } else {
                    members.iter().sum::<f64>() / members.len() as f64
                }
            }
            ClusterMethod::KMedoids => median(&members),
        };
    }
    values
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn snap_to_zero(
    aggregated: &mut HashMap<(String, String), HashMap<String, Vec<f64>>>,
    decimal_points: u32,
) {
    let threshold = 10f64.powi(-(decimal_points as i32));
    for locations in aggregated.values_mut() {
        for values in locations.values_mut() {
            for v in values.iter_mut() {
                if v.abs() < threshold {
                    *v = 0.0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_core::config::TsaSettings;
    use cep_core::input::{CarrierData, InputData};

    fn small_system(hours: usize, target: usize, conduct: bool) -> System {
        let mut system = System::default();
        system.carriers = vec!["heat".into()];
        system.nodes = vec!["a".into()];
        system.unaggregated_time_steps_per_year = hours;
        system.total_hours_per_year = hours;
        system.aggregated_time_steps_per_year = target;
        system.conduct_time_series_aggregation = conduct;
        system
    }

    fn demand_input(values: Vec<f64>) -> InputData {
        let mut carrier = CarrierData::new("heat");
        carrier.demand.set("a", values);
        InputData {
            carriers: vec![carrier],
            technologies: Vec::new(),
            excluded_from_tsa: Vec::new(),
        }
    }

    #[test]
    fn test_identity_when_disabled() {
        let system = small_system(4, 4, false);
        let analysis = Analysis::default();
        let input = demand_input(vec![1.0, 2.0, 3.0, 4.0]);
        let mut diag = Diagnostics::new();

        let result = aggregate(&system, &analysis, &input, &mut diag).unwrap();
        assert!(!result.conducted);
        assert_eq!(result.duration, vec![1.0; 4]);
        assert_eq!(result.sequence, vec![0, 1, 2, 3]);
        // aggregated equals raw
        for h in 0..4 {
            assert_eq!(result.value("heat", "demand", "a", h).unwrap(), (h + 1) as f64);
        }
    }

    #[test]
    fn test_two_state_series_clusters_to_two_steps() {
        let system = small_system(6, 2, true);
        let analysis = Analysis::default();
        let input = demand_input(vec![0.0, 0.0, 10.0, 10.0, 0.0, 10.0]);
        let mut diag = Diagnostics::new();

        let result = aggregate(&system, &analysis, &input, &mut diag).unwrap();
        assert!(result.conducted);
        assert_eq!(result.duration.len(), 2);
        assert_eq!(result.duration.iter().sum::<f64>(), 6.0);
        // base hours with equal raw values share their operational step
        assert_eq!(result.sequence[0], result.sequence[1]);
        assert_eq!(result.sequence[2], result.sequence[3]);
        assert_ne!(result.sequence[0], result.sequence[2]);
        let low = result.value("heat", "demand", "a", result.sequence[0]).unwrap();
        let high = result.value("heat", "demand", "a", result.sequence[2]).unwrap();
        assert!((low - 0.0).abs() < 1e-9);
        assert!((high - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_single_step() {
        let system = small_system(8, 2, true);
        let analysis = Analysis::default();
        let input = demand_input(vec![5.0; 8]);
        let mut diag = Diagnostics::new();

        let result = aggregate(&system, &analysis, &input, &mut diag).unwrap();
        assert!(result.conducted);
        assert_eq!(result.duration, vec![8.0]);
        assert_eq!(result.sequence, vec![0; 8]);
        assert_eq!(result.value("heat", "demand", "a", 0).unwrap(), 5.0);
    }

    #[test]
    fn test_excluded_series_manual_mean() {
        let system = {
            let mut s = small_system(4, 2, true);
            s.carriers.push("power".into());
            s
        };
        let analysis = Analysis::default();
        let mut input = demand_input(vec![0.0, 0.0, 8.0, 8.0]);
        let mut excluded_carrier = CarrierData::new("power");
        excluded_carrier.demand.set("a", vec![1.0, 3.0, 5.0, 7.0]);
        input.carriers.push(excluded_carrier);
        input
            .excluded_from_tsa
            .push(("power".to_string(), Some("demand".to_string())));
        let mut diag = Diagnostics::new();

        let result = aggregate(&system, &analysis, &input, &mut diag).unwrap();
        // hours 0,1 -> one step, hours 2,3 -> the other; excluded series is
        // averaged over the member hours
        let step_low = result.sequence[0];
        let step_high = result.sequence[2];
        assert_eq!(result.value("power", "demand", "a", step_low).unwrap(), 2.0);
        assert_eq!(result.value("power", "demand", "a", step_high).unwrap(), 6.0);
    }

    #[test]
    fn test_unknown_exclusion_warns() {
        let system = small_system(4, 2, true);
        let analysis = Analysis::default();
        let mut input = demand_input(vec![0.0, 1.0, 2.0, 3.0]);
        input.excluded_from_tsa.push(("nope".to_string(), None));
        let mut diag = Diagnostics::new();

        aggregate(&system, &analysis, &input, &mut diag).unwrap();
        assert!(diag.warnings().any(|w| w.entity.as_deref() == Some("nope")));
    }

    #[test]
    fn test_rescale_preserves_yearly_sum() {
        let mut system = small_system(6, 2, true);
        system.carriers = vec!["heat".into()];
        let mut analysis = Analysis::default();
        analysis.time_series_aggregation = TsaSettings {
            rescale_cluster_periods: true,
            ..TsaSettings::default()
        };
        let raw = vec![1.0, 2.0, 9.0, 11.0, 2.0, 10.0];
        let input = demand_input(raw.clone());
        let mut diag = Diagnostics::new();

        let result = aggregate(&system, &analysis, &input, &mut diag).unwrap();
        let weighted: f64 = (0..result.steps_per_year())
            .map(|t| result.value("heat", "demand", "a", t).unwrap() * result.duration[t])
            .sum();
        let raw_sum: f64 = raw.iter().sum();
        assert!((weighted - raw_sum).abs() < 1e-9);
    }

    #[test]
    fn test_median_helper() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[]), 0.0);
    }
}
