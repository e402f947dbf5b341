//! Three-layer time model for one optimization horizon.
//!
//! - *base* steps: unaggregated hours, `H` per year, `H * Y` in the horizon;
//! - *operational* steps: representative steps with durations and a cyclic
//!   `base -> operational` sequence;
//! - *yearly* steps: investment periods, `interval_between_years` calendar
//!   years apart.
//!
//! Operational grids are stored per element. For a single-year horizon the
//! grid is the aggregation result as-is; for multi-year horizons each year
//! gets its own copy of the one-year grid (step ids `y*T + t`) so that every
//! operational step belongs to exactly one year and per-year variations of
//! operational series stay representable. This keeps the mapping laws exact:
//! `base -> operational -> yearly` equals `base -> yearly`.

use std::collections::HashMap;

use crate::error::{CepError, CepResult};

/// Operational grid of one element
#[derive(Debug, Clone)]
pub struct ElementTimeGrid {
    /// Contiguous operational step ids starting at 0
    pub steps: Vec<usize>,
    /// Duration of each step in hours
    pub duration: Vec<f64>,
    /// `base -> operational` lookup over the whole horizon (length `H * Y`)
    pub sequence: Vec<usize>,
    op_to_year: Vec<usize>,
    year_to_ops: Vec<Vec<usize>>,
}

impl ElementTimeGrid {
    /// Operational steps per year (T)
    pub fn steps_per_year(&self) -> usize {
        self.year_to_ops.first().map(|v| v.len()).unwrap_or(0)
    }
}

/// Time model shared by all elements of one optimization context
#[derive(Debug, Clone)]
pub struct TimeSteps {
    hours_per_year: usize,
    years: usize,
    interval_between_years: u32,
    grids: HashMap<String, ElementTimeGrid>,
}

impl TimeSteps {
    pub fn new(hours_per_year: usize, years: usize, interval_between_years: u32) -> Self {
        Self {
            hours_per_year,
            years,
            interval_between_years,
            grids: HashMap::new(),
        }
    }

    pub fn hours_per_year(&self) -> usize {
        self.hours_per_year
    }

    pub fn years(&self) -> usize {
        self.years
    }

    pub fn interval_between_years(&self) -> u32 {
        self.interval_between_years
    }

    /// Yearly (investment) step ids
    pub fn yearly_steps(&self) -> Vec<usize> {
        (0..self.years).collect()
    }

    /// Total number of base steps in the horizon
    pub fn base_step_count(&self) -> usize {
        self.hours_per_year * self.years
    }

    /// Install an element grid from a one-year aggregation result.
    ///
    /// `duration` has `T` entries summing to `H`; `year_sequence` maps each
    /// of the `H` base hours of one year onto `0..T`. For multi-year
    /// horizons the grid is replicated per year with step ids `y*T + t`.
    pub fn set_element_grid(
        &mut self,
        element: &str,
        duration: Vec<f64>,
        year_sequence: &[usize],
    ) -> CepResult<()> {
        let steps_per_year = duration.len();
        if year_sequence.len() != self.hours_per_year {
            return Err(CepError::Data(format!(
                "element {}: sequence length {} does not match hours per year {}",
                element,
                year_sequence.len(),
                self.hours_per_year
            )));
        }
        if let Some(&bad) = year_sequence.iter().find(|&&t| t >= steps_per_year) {
            return Err(CepError::Data(format!(
                "element {}: sequence references step {} outside 0..{}",
                element, bad, steps_per_year
            )));
        }
        let total: f64 = duration.iter().sum();
        if (total - self.hours_per_year as f64).abs() > 1e-6 {
            return Err(CepError::Data(format!(
                "element {}: step durations sum to {} instead of {}",
                element, total, self.hours_per_year
            )));
        }

        let n_steps = steps_per_year * self.years;
        let mut full_duration = Vec::with_capacity(n_steps);
        let mut sequence = Vec::with_capacity(self.base_step_count());
        let mut year_to_ops = Vec::with_capacity(self.years);
        for year in 0..self.years {
            full_duration.extend(duration.iter().copied());
            for &t in year_sequence {
                sequence.push(year * steps_per_year + t);
            }
            year_to_ops.push((year * steps_per_year..(year + 1) * steps_per_year).collect());
        }
        let op_to_year = (0..n_steps).map(|t| t / steps_per_year).collect();

        self.grids.insert(
            element.to_string(),
            ElementTimeGrid {
                steps: (0..n_steps).collect(),
                duration: full_duration,
                sequence,
                op_to_year,
                year_to_ops,
            },
        );
        Ok(())
    }

    /// Grid of one element; unknown elements are fatal.
    pub fn grid(&self, element: &str) -> CepResult<&ElementTimeGrid> {
        self.grids
            .get(element)
            .ok_or_else(|| CepError::Config(format!("no time grid for element '{}'", element)))
    }

    pub fn has_grid(&self, element: &str) -> bool {
        self.grids.contains_key(element)
    }

    /// base -> operational
    pub fn base_to_operation(&self, element: &str, base: usize) -> CepResult<usize> {
        let grid = self.grid(element)?;
        grid.sequence.get(base).copied().ok_or_else(|| {
            CepError::Data(format!(
                "base step {} outside horizon of {} steps",
                base,
                grid.sequence.len()
            ))
        })
    }

    /// operational -> yearly (year of the first base hour mapped to the step)
    pub fn operation_to_year(&self, element: &str, step: usize) -> CepResult<usize> {
        let grid = self.grid(element)?;
        grid.op_to_year.get(step).copied().ok_or_else(|| {
            CepError::Data(format!("operational step {} unknown for {}", step, element))
        })
    }

    /// yearly -> set of operational steps in that year
    pub fn year_to_operation(&self, element: &str, year: usize) -> CepResult<&[usize]> {
        let grid = self.grid(element)?;
        grid.year_to_ops
            .get(year)
            .map(|v| v.as_slice())
            .ok_or_else(|| CepError::Data(format!("year {} outside horizon", year)))
    }

    /// base -> yearly
    pub fn base_to_year(&self, base: usize) -> usize {
        base / self.hours_per_year
    }

    /// Duration of an operational step in hours
    pub fn duration(&self, element: &str, step: usize) -> CepResult<f64> {
        let grid = self.grid(element)?;
        grid.duration.get(step).copied().ok_or_else(|| {
            CepError::Data(format!("operational step {} unknown for {}", step, element))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4 base hours per year, 2 years, identity aggregation
    fn identity_two_years() -> TimeSteps {
        let mut ts = TimeSteps::new(4, 2, 5);
        ts.set_element_grid("demo", vec![1.0; 4], &[0, 1, 2, 3]).unwrap();
        ts
    }

    #[test]
    fn test_identity_grid_shape() {
        let ts = identity_two_years();
        let grid = ts.grid("demo").unwrap();
        assert_eq!(grid.steps.len(), 8);
        assert_eq!(grid.steps_per_year(), 4);
        assert_eq!(grid.sequence, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_aggregated_grid() {
        let mut ts = TimeSteps::new(6, 1, 1);
        // two representative steps, durations 4 + 2
        ts.set_element_grid("demo", vec![4.0, 2.0], &[0, 0, 1, 0, 1, 0])
            .unwrap();
        assert_eq!(ts.base_to_operation("demo", 2).unwrap(), 1);
        assert_eq!(ts.duration("demo", 0).unwrap(), 4.0);
        assert_eq!(ts.year_to_operation("demo", 0).unwrap(), &[0, 1]);
    }

    #[test]
    fn test_base_op_year_roundtrip() {
        let ts = identity_two_years();
        for base in 0..ts.base_step_count() {
            let op = ts.base_to_operation("demo", base).unwrap();
            let year = ts.operation_to_year("demo", op).unwrap();
            assert_eq!(year, ts.base_to_year(base));
        }
    }

    #[test]
    fn test_year_to_operation_roundtrip() {
        let ts = identity_two_years();
        for year in 0..2 {
            for &op in ts.year_to_operation("demo", year).unwrap() {
                assert_eq!(ts.operation_to_year("demo", op).unwrap(), year);
            }
        }
    }

    #[test]
    fn test_duration_sum_mismatch_rejected() {
        let mut ts = TimeSteps::new(4, 1, 1);
        let err = ts
            .set_element_grid("demo", vec![1.0, 1.0], &[0, 0, 1, 1])
            .unwrap_err();
        assert!(matches!(err, CepError::Data(_)));
    }

    #[test]
    fn test_sequence_out_of_range_rejected() {
        let mut ts = TimeSteps::new(4, 1, 1);
        let err = ts
            .set_element_grid("demo", vec![2.0, 2.0], &[0, 1, 2, 0])
            .unwrap_err();
        assert!(matches!(err, CepError::Data(_)));
    }

    #[test]
    fn test_unknown_element_fatal() {
        let ts = TimeSteps::new(4, 1, 1);
        assert!(ts.grid("nope").is_err());
    }
}
