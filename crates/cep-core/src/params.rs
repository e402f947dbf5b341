//! Parameter store: named N-dimensional arrays over named index tuples.
//!
//! Parameters are kept as flat maps from index tuple to value plus a default
//! used for every tuple not explicitly set (broadcast fill). The defaults
//! follow the platform convention: `0` for additive quantities, `+inf` for
//! unconstraining upper bounds. A `+inf` value read from a bound parameter
//! means "no bound, skip the constraint". `NaN` is never a valid value.
//!
//! The store tracks the smallest and largest absolute non-zero finite value
//! across all parameters, which is useful to judge the numerical range of
//! the assembled model.

use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::error::{CepError, CepResult};

/// One named parameter
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub dims: Vec<String>,
    pub default: f64,
    values: HashMap<Vec<String>, f64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, dims: Vec<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            dims,
            default,
            values: HashMap::new(),
        }
    }

    /// Value for an index tuple, falling back to the default.
    pub fn get(&self, key: &[&str]) -> f64 {
        let owned: Vec<String> = key.iter().map(|s| s.to_string()).collect();
        self.get_tuple(&owned)
    }

    /// Value for an owned index tuple, falling back to the default.
    pub fn get_tuple(&self, key: &[String]) -> f64 {
        self.values.get(key).copied().unwrap_or(self.default)
    }

    pub fn set(&mut self, key: Vec<String>, value: f64) {
        self.values.insert(key, value);
    }

    /// Number of explicitly set (non-default) entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Vec<String>, &f64)> {
        self.values.iter()
    }
}

/// A named extreme value, for numerical-range diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct ExtremeValue {
    pub name: String,
    pub value: f64,
}

/// Store of all model parameters
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    params: HashMap<String, Parameter>,
    pub min_abs: Option<ExtremeValue>,
    pub max_abs: Option<ExtremeValue>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter from explicit entries plus a broadcast default.
    ///
    /// Entries must match the declared dimension count; `NaN` anywhere is a
    /// data error. A duplicate name records a warning and keeps the
    /// original.
    pub fn add_parameter(
        &mut self,
        name: &str,
        dims: &[&str],
        entries: Vec<(Vec<String>, f64)>,
        default: f64,
        diag: &mut Diagnostics,
    ) -> CepResult<()> {
        if self.params.contains_key(name) {
            diag.add_warning(
                "parameters",
                &format!("parameter {} already added, kept original", name),
            );
            return Ok(());
        }
        if default.is_nan() {
            return Err(CepError::Data(format!(
                "parameter {} has NaN default",
                name
            )));
        }
        let mut param = Parameter::new(name, dims.iter().map(|d| d.to_string()).collect(), default);
        for (key, value) in entries {
            if key.len() != dims.len() {
                return Err(CepError::Data(format!(
                    "parameter {}: index tuple {:?} does not match dims {:?}",
                    name, key, dims
                )));
            }
            if value.is_nan() {
                return Err(CepError::Data(format!(
                    "parameter {} has NaN value at {:?}",
                    name, key
                )));
            }
            self.track_extremes(name, &key, value);
            param.set(key, value);
        }
        self.params.insert(name.to_string(), param);
        Ok(())
    }

    /// Look up a parameter by name; unknown names are fatal.
    pub fn get(&self, name: &str) -> CepResult<&Parameter> {
        self.params
            .get(name)
            .ok_or_else(|| CepError::Config(format!("unknown parameter '{}'", name)))
    }

    /// Mutable lookup, for appending entries of further elements.
    pub fn get_mut(&mut self, name: &str) -> CepResult<&mut Parameter> {
        self.params
            .get_mut(name)
            .ok_or_else(|| CepError::Config(format!("unknown parameter '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    fn track_extremes(&mut self, name: &str, key: &[String], value: f64) {
        let abs = value.abs();
        if abs == 0.0 || !abs.is_finite() {
            return;
        }
        let label = if key.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", name, key.join("_"))
        };
        match &self.max_abs {
            Some(current) if current.value >= abs => {}
            _ => {
                self.max_abs = Some(ExtremeValue {
                    name: label.clone(),
                    value: abs,
                })
            }
        }
        match &self.min_abs {
            Some(current) if current.value <= abs => {}
            _ => self.min_abs = Some(ExtremeValue { name: label, value: abs }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fill() {
        let mut store = ParameterStore::new();
        let mut diag = Diagnostics::new();
        store
            .add_parameter(
                "demand",
                &["set_carriers", "set_nodes"],
                vec![(vec!["heat".into(), "a".into()], 10.0)],
                0.0,
                &mut diag,
            )
            .unwrap();
        let param = store.get("demand").unwrap();
        assert_eq!(param.get(&["heat", "a"]), 10.0);
        assert_eq!(param.get(&["heat", "b"]), 0.0);
    }

    #[test]
    fn test_nan_is_data_error() {
        let mut store = ParameterStore::new();
        let mut diag = Diagnostics::new();
        let err = store
            .add_parameter(
                "demand",
                &["set_nodes"],
                vec![(vec!["a".into()], f64::NAN)],
                0.0,
                &mut diag,
            )
            .unwrap_err();
        assert!(matches!(err, CepError::Data(_)));
    }

    #[test]
    fn test_shape_mismatch_is_data_error() {
        let mut store = ParameterStore::new();
        let mut diag = Diagnostics::new();
        let err = store
            .add_parameter(
                "demand",
                &["set_carriers", "set_nodes"],
                vec![(vec!["a".into()], 1.0)],
                0.0,
                &mut diag,
            )
            .unwrap_err();
        assert!(matches!(err, CepError::Data(_)));
    }

    #[test]
    fn test_duplicate_keeps_original() {
        let mut store = ParameterStore::new();
        let mut diag = Diagnostics::new();
        store
            .add_parameter("x", &[], vec![(vec![], 1.0)], 0.0, &mut diag)
            .unwrap();
        store
            .add_parameter("x", &[], vec![(vec![], 2.0)], 0.0, &mut diag)
            .unwrap();
        assert_eq!(store.get("x").unwrap().get(&[]), 1.0);
        assert_eq!(diag.warning_count(), 1);
    }

    #[test]
    fn test_extreme_tracking_skips_zero_and_inf() {
        let mut store = ParameterStore::new();
        let mut diag = Diagnostics::new();
        store
            .add_parameter(
                "limit",
                &["set_nodes"],
                vec![
                    (vec!["a".into()], 0.0),
                    (vec!["b".into()], f64::INFINITY),
                    (vec!["c".into()], -5.0),
                    (vec!["d".into()], 2.0),
                ],
                f64::INFINITY,
                &mut diag,
            )
            .unwrap();
        assert_eq!(store.max_abs.as_ref().unwrap().value, 5.0);
        assert_eq!(store.min_abs.as_ref().unwrap().value, 2.0);
        assert_eq!(store.min_abs.as_ref().unwrap().name, "limit_d");
    }
}
