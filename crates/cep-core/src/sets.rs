//! Index registry: named sets of identifiers and filtered index products.
//!
//! Sets come in three shapes:
//! - flat sets (`set_nodes`, `set_carriers`),
//! - flat subsets that remember their parent (`set_conversion_technologies`
//!   is a subset of `set_technologies`),
//! - indexed sets, queried per parent key (`set_input_carriers[tech]`,
//!   `set_location[tech]`).
//!
//! [`IndexSets::create_custom_set`] enumerates the filtered Cartesian
//! product over a list of set names. An indexed set whose parent (or an
//! ancestor of whose parent) appears earlier in the list is expanded per
//! outer key; otherwise its value union is used as a plain dimension.

use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::error::{CepError, CepResult};

pub const SET_CARRIERS: &str = "set_carriers";
pub const SET_NODES: &str = "set_nodes";
pub const SET_EDGES: &str = "set_edges";
pub const SET_TECHNOLOGIES: &str = "set_technologies";
pub const SET_CONVERSION_TECHNOLOGIES: &str = "set_conversion_technologies";
pub const SET_TRANSPORT_TECHNOLOGIES: &str = "set_transport_technologies";
pub const SET_STORAGE_TECHNOLOGIES: &str = "set_storage_technologies";
pub const SET_CAPACITY_TYPES: &str = "set_capacity_types";
pub const SET_LOCATION: &str = "set_location";
pub const SET_ON_OFF: &str = "set_on_off";
pub const SET_EXISTING: &str = "set_existing_capacities";
pub const SET_REFERENCE_CARRIERS: &str = "set_reference_carriers";
pub const SET_INPUT_CARRIERS: &str = "set_input_carriers";
pub const SET_OUTPUT_CARRIERS: &str = "set_output_carriers";
pub const SET_TIME_STEPS_OPERATION: &str = "set_time_steps_operation";
pub const SET_TIME_STEPS_YEARLY: &str = "set_time_steps_yearly";

#[derive(Debug, Clone)]
struct FlatSet {
    values: Vec<String>,
    subset_of: Option<String>,
}

#[derive(Debug, Clone)]
struct IndexedSet {
    parent: String,
    values: HashMap<String, Vec<String>>,
}

/// Registry of named index sets
#[derive(Debug, Clone, Default)]
pub struct IndexSets {
    flat: HashMap<String, FlatSet>,
    indexed: HashMap<String, IndexedSet>,
    docs: HashMap<String, String>,
}

impl IndexSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flat set. Re-adding overwrites and records a warning.
    pub fn add_set(&mut self, name: &str, data: Vec<String>, doc: &str, diag: &mut Diagnostics) {
        if self.contains(name) {
            diag.add_warning("sets", &format!("{} already added, overwritten", name));
        }
        self.flat.insert(
            name.to_string(),
            FlatSet {
                values: data,
                subset_of: None,
            },
        );
        self.docs.insert(name.to_string(), doc.to_string());
    }

    /// Add a flat set that is a subset of `parent`.
    pub fn add_subset(
        &mut self,
        name: &str,
        data: Vec<String>,
        doc: &str,
        parent: &str,
        diag: &mut Diagnostics,
    ) {
        if self.contains(name) {
            diag.add_warning("sets", &format!("{} already added, overwritten", name));
        }
        self.flat.insert(
            name.to_string(),
            FlatSet {
                values: data,
                subset_of: Some(parent.to_string()),
            },
        );
        self.docs.insert(name.to_string(), doc.to_string());
    }

    /// Add a set indexed by the elements of `parent`.
    pub fn add_indexed_set(
        &mut self,
        name: &str,
        data: HashMap<String, Vec<String>>,
        doc: &str,
        parent: &str,
        diag: &mut Diagnostics,
    ) {
        if self.contains(name) {
            diag.add_warning("sets", &format!("{} already added, overwritten", name));
        }
        self.indexed.insert(
            name.to_string(),
            IndexedSet {
                parent: parent.to_string(),
                values: data,
            },
        );
        self.docs.insert(name.to_string(), doc.to_string());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.flat.contains_key(name) || self.indexed.contains_key(name)
    }

    pub fn is_indexed(&self, name: &str) -> bool {
        self.indexed.contains_key(name)
    }

    pub fn doc(&self, name: &str) -> Option<&str> {
        self.docs.get(name).map(|s| s.as_str())
    }

    /// Values of a flat set; unknown names are fatal.
    pub fn get(&self, name: &str) -> CepResult<&[String]> {
        self.flat
            .get(name)
            .map(|s| s.values.as_slice())
            .ok_or_else(|| CepError::Config(format!("unknown set '{}'", name)))
    }

    /// Values of an indexed set for one parent key; a known set with a
    /// missing key yields the empty slice.
    pub fn get_indexed(&self, name: &str, key: &str) -> CepResult<&[String]> {
        let set = self
            .indexed
            .get(name)
            .ok_or_else(|| CepError::Config(format!("unknown indexed set '{}'", name)))?;
        Ok(set.values.get(key).map(|v| v.as_slice()).unwrap_or(&[]))
    }

    /// Parent set name of an indexed set.
    pub fn index_parent(&self, name: &str) -> CepResult<&str> {
        self.indexed
            .get(name)
            .map(|s| s.parent.as_str())
            .ok_or_else(|| CepError::Config(format!("set '{}' is not an indexed set", name)))
    }

    /// True if `name` equals `ancestor` or is a (transitive) subset of it.
    fn descends_from(&self, name: &str, ancestor: &str) -> bool {
        if name == ancestor {
            return true;
        }
        let mut current = name;
        while let Some(set) = self.flat.get(current) {
            match &set.subset_of {
                Some(parent) if parent == ancestor => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }

    /// Union of an indexed set's values across all keys, deduplicated in
    /// first-seen order.
    fn indexed_union(&self, set: &IndexedSet) -> Vec<String> {
        let mut seen = Vec::new();
        let mut keys: Vec<&String> = set.values.keys().collect();
        keys.sort();
        for key in keys {
            for value in &set.values[key] {
                if !seen.contains(value) {
                    seen.push(value.clone());
                }
            }
        }
        seen
    }

    /// Enumerate the filtered Cartesian product over `names`.
    ///
    /// Returns the tuple list and the dimension names. Indexed sets are
    /// expanded per outer key when their parent appears earlier in `names`
    /// (directly or through a subset); tuples whose key has no entries are
    /// dropped.
    pub fn create_custom_set(&self, names: &[&str]) -> CepResult<(Vec<Vec<String>>, Vec<String>)> {
        let mut tuples: Vec<Vec<String>> = vec![Vec::new()];

        for (pos, name) in names.iter().enumerate() {
            if let Some(flat) = self.flat.get(*name) {
                let values = &flat.values;
                let mut next = Vec::with_capacity(tuples.len() * values.len());
                for tuple in &tuples {
                    for value in values {
                        let mut extended = tuple.clone();
                        extended.push(value.clone());
                        next.push(extended);
                    }
                }
                tuples = next;
            } else if let Some(indexed) = self.indexed.get(*name) {
                // position of the dimension the indexed set keys on
                let key_pos = names[..pos]
                    .iter()
                    .position(|outer| self.descends_from(outer, &indexed.parent));
                match key_pos {
                    Some(key_pos) => {
                        let mut next = Vec::new();
                        for tuple in &tuples {
                            let key = &tuple[key_pos];
                            if let Some(values) = indexed.values.get(key) {
                                for value in values {
                                    let mut extended = tuple.clone();
                                    extended.push(value.clone());
                                    next.push(extended);
                                }
                            }
                        }
                        tuples = next;
                    }
                    None => {
                        let union = self.indexed_union(indexed);
                        let mut next = Vec::with_capacity(tuples.len() * union.len());
                        for tuple in &tuples {
                            for value in &union {
                                let mut extended = tuple.clone();
                                extended.push(value.clone());
                                next.push(extended);
                            }
                        }
                        tuples = next;
                    }
                }
            } else {
                return Err(CepError::Config(format!("unknown set '{}'", name)));
            }
        }

        Ok((tuples, names.iter().map(|n| n.to_string()).collect()))
    }
}

/// Transpose a tuple list into per-dimension value vectors.
pub fn tuple_columns(tuples: &[Vec<String>]) -> Vec<Vec<String>> {
    if tuples.is_empty() {
        return Vec::new();
    }
    let dims = tuples[0].len();
    let mut columns = vec![Vec::with_capacity(tuples.len()); dims];
    for tuple in tuples {
        for (dim, value) in tuple.iter().enumerate() {
            columns[dim].push(value.clone());
        }
    }
    columns
}

/// Boolean mask over a tuple list from a predicate.
pub fn mask_tuples<F>(tuples: &[Vec<String>], mut predicate: F) -> Vec<bool>
where
    F: FnMut(&[String]) -> bool,
{
    tuples.iter().map(|t| predicate(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (IndexSets, Diagnostics) {
        let mut diag = Diagnostics::new();
        let mut sets = IndexSets::new();
        sets.add_set(SET_NODES, vec!["a".into(), "b".into()], "nodes", &mut diag);
        sets.add_set(
            SET_TECHNOLOGIES,
            vec!["boiler".into(), "pipeline".into()],
            "technologies",
            &mut diag,
        );
        sets.add_subset(
            SET_CONVERSION_TECHNOLOGIES,
            vec!["boiler".into()],
            "conversion technologies",
            SET_TECHNOLOGIES,
            &mut diag,
        );
        let mut location = HashMap::new();
        location.insert("boiler".to_string(), vec!["a".to_string(), "b".to_string()]);
        location.insert("pipeline".to_string(), vec!["a_b".to_string()]);
        sets.add_indexed_set(SET_LOCATION, location, "locations", SET_TECHNOLOGIES, &mut diag);
        (sets, diag)
    }

    #[test]
    fn test_flat_product() {
        let (sets, _) = registry();
        let (tuples, names) = sets
            .create_custom_set(&[SET_TECHNOLOGIES, SET_NODES])
            .unwrap();
        assert_eq!(names, vec![SET_TECHNOLOGIES, SET_NODES]);
        assert_eq!(tuples.len(), 4);
    }

    #[test]
    fn test_indexed_expansion_per_key() {
        let (sets, _) = registry();
        let (tuples, _) = sets
            .create_custom_set(&[SET_TECHNOLOGIES, SET_LOCATION])
            .unwrap();
        // boiler: a, b; pipeline: a_b
        assert_eq!(tuples.len(), 3);
        assert!(tuples.contains(&vec!["pipeline".to_string(), "a_b".to_string()]));
    }

    #[test]
    fn test_indexed_expansion_through_subset() {
        let (sets, _) = registry();
        let (tuples, _) = sets
            .create_custom_set(&[SET_CONVERSION_TECHNOLOGIES, SET_LOCATION])
            .unwrap();
        assert_eq!(tuples.len(), 2);
        assert!(tuples.iter().all(|t| t[0] == "boiler"));
    }

    #[test]
    fn test_indexed_union_without_parent() {
        let (sets, _) = registry();
        let (tuples, _) = sets.create_custom_set(&[SET_LOCATION]).unwrap();
        // union over both technologies
        assert_eq!(tuples.len(), 3);
    }

    #[test]
    fn test_unknown_set_is_fatal() {
        let (sets, _) = registry();
        let err = sets.create_custom_set(&["set_unknown"]).unwrap_err();
        assert!(matches!(err, CepError::Config(_)));
    }

    #[test]
    fn test_readd_warns_and_overwrites() {
        let (mut sets, mut diag) = registry();
        let before = diag.warning_count();
        sets.add_set(SET_NODES, vec!["c".into()], "nodes", &mut diag);
        assert_eq!(diag.warning_count(), before + 1);
        assert_eq!(sets.get(SET_NODES).unwrap(), &["c".to_string()]);
    }

    #[test]
    fn test_tuple_columns() {
        let tuples = vec![
            vec!["x".to_string(), "1".to_string()],
            vec!["y".to_string(), "2".to_string()],
        ];
        let columns = tuple_columns(&tuples);
        assert_eq!(columns[0], vec!["x", "y"]);
        assert_eq!(columns[1], vec!["1", "2"]);
    }

    #[test]
    fn test_mask_tuples() {
        let tuples = vec![vec!["x".to_string()], vec!["y".to_string()]];
        let mask = mask_tuples(&tuples, |t| t[0] == "x");
        assert_eq!(mask, vec![true, false]);
    }
}
