//! Variable and constraint builder on top of good_lp.
//!
//! Decision variables are declared in blocks: a name, the index tuples with
//! their dimension names, a domain and bounds. Only *active* tuples get a
//! solver variable; inactive tuples have none and cannot appear in any
//! constraint. Binary decisions are relaxed to `[0,1]` under the Clarabel
//! backend (the model without binaries stays an exact LP; callers suppress
//! binaries that would not materially affect the model).
//!
//! Constraints are collected in named blocks, either from a precomputed
//! entry list (*block* form, one expression per tuple of a full index) or
//! from a per-tuple closure (*rule* form) that may return `None` to skip a
//! tuple. A skipped tuple is omitted entirely, not emitted as a trivial
//! inequality. Per-block tuple order is recorded so results can be indexed
//! back into the component layout after the solve.

use std::collections::{HashMap, HashSet};

use good_lp::{variable, Constraint, ProblemVariables, Variable};

use cep_core::diagnostics::Diagnostics;
use cep_core::error::{CepError, CepResult};

/// Domain of a variable block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarDomain {
    /// Free continuous variable
    Continuous,
    /// Continuous variable bounded below by zero
    NonNegative,
    /// Per-tuple finite bounds
    Bounded,
    /// Binary decision relaxed to the unit interval
    RelaxedBinary,
}

/// A named block of variables over index tuples
#[derive(Debug, Clone)]
pub struct VariableBlock {
    pub name: String,
    pub dims: Vec<String>,
    pub tuples: Vec<Vec<String>>,
    pub vars: Vec<Variable>,
    pub domain: VarDomain,
    index: HashMap<Vec<String>, usize>,
}

impl VariableBlock {
    /// Variable for an active tuple; inactive tuples are a configuration
    /// error since they must not appear in constraints.
    pub fn get(&self, key: &[&str]) -> CepResult<Variable> {
        self.try_get(key).ok_or_else(|| {
            CepError::Config(format!(
                "variable {} has no active tuple {:?}",
                self.name, key
            ))
        })
    }

    pub fn try_get(&self, key: &[&str]) -> Option<Variable> {
        let owned: Vec<String> = key.iter().map(|s| s.to_string()).collect();
        self.try_get_tuple(&owned)
    }

    pub fn try_get_tuple(&self, key: &[String]) -> Option<Variable> {
        self.index.get(key).map(|&i| self.vars[i])
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// A named block of constraints with the tuple each entry belongs to
pub struct ConstraintBlock {
    pub name: String,
    pub dims: Vec<String>,
    pub entries: Vec<(Vec<String>, Constraint)>,
}

/// All variables and constraints of one assembled model
pub struct ModelComponents {
    pub problem: ProblemVariables,
    blocks: HashMap<String, VariableBlock>,
    order: Vec<String>,
    pub constraints: Vec<ConstraintBlock>,
    constraint_names: HashSet<String>,
}

impl Default for ModelComponents {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelComponents {
    pub fn new() -> Self {
        Self {
            problem: ProblemVariables::new(),
            blocks: HashMap::new(),
            order: Vec::new(),
            constraints: Vec::new(),
            constraint_names: HashSet::new(),
        }
    }

    /// Declare a variable block with uniform bounds from the domain.
    pub fn add_variable(
        &mut self,
        name: &str,
        index: (Vec<Vec<String>>, Vec<String>),
        domain: VarDomain,
        diag: &mut Diagnostics,
    ) {
        self.add_variable_with_bounds(name, index, domain, |_| default_bounds(domain), diag);
    }

    /// Declare a variable block with per-tuple bounds.
    pub fn add_variable_bounded(
        &mut self,
        name: &str,
        index: (Vec<Vec<String>>, Vec<String>),
        mut bounds: impl FnMut(&[String]) -> (f64, f64),
        diag: &mut Diagnostics,
    ) {
        self.add_variable_with_bounds(name, index, VarDomain::Bounded, |t| bounds(t), diag);
    }

    fn add_variable_with_bounds(
        &mut self,
        name: &str,
        index: (Vec<Vec<String>>, Vec<String>),
        domain: VarDomain,
        mut bounds: impl FnMut(&[String]) -> (f64, f64),
        diag: &mut Diagnostics,
    ) {
        if self.blocks.contains_key(name) {
            diag.add_warning(
                "variables",
                &format!("variable {} already added, kept original", name),
            );
            return;
        }
        let (tuples, dims) = index;
        let mut vars = Vec::with_capacity(tuples.len());
        let mut lookup = HashMap::with_capacity(tuples.len());
        for (i, tuple) in tuples.iter().enumerate() {
            let (lower, upper) = bounds(tuple);
            let mut definition = variable();
            if lower.is_finite() {
                definition = definition.min(lower);
            }
            if upper.is_finite() {
                definition = definition.max(upper);
            }
            vars.push(self.problem.add(definition));
            lookup.insert(tuple.clone(), i);
        }
        self.blocks.insert(
            name.to_string(),
            VariableBlock {
                name: name.to_string(),
                dims,
                tuples,
                vars,
                domain,
                index: lookup,
            },
        );
        self.order.push(name.to_string());
    }

    /// Look up a variable block; unknown names are fatal.
    pub fn var(&self, name: &str) -> CepResult<&VariableBlock> {
        self.blocks
            .get(name)
            .ok_or_else(|| CepError::Config(format!("unknown variable '{}'", name)))
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    /// Variable blocks in declaration order
    pub fn variable_blocks(&self) -> impl Iterator<Item = &VariableBlock> {
        self.order.iter().map(|n| &self.blocks[n])
    }

    /// Add a block of precomputed constraint entries.
    pub fn add_constraint_block(
        &mut self,
        name: &str,
        dims: Vec<String>,
        entries: Vec<(Vec<String>, Constraint)>,
        diag: &mut Diagnostics,
    ) {
        if !self.constraint_names.insert(name.to_string()) {
            diag.add_warning(
                "constraints",
                &format!("constraint {} already added, kept original", name),
            );
            return;
        }
        if entries.is_empty() {
            return;
        }
        self.constraints.push(ConstraintBlock {
            name: name.to_string(),
            dims,
            entries,
        });
    }

    /// Add one constraint per tuple from a rule; `Ok(None)` skips the tuple.
    pub fn add_constraint_rule(
        &mut self,
        name: &str,
        tuples: &[Vec<String>],
        dims: Vec<String>,
        mut rule: impl FnMut(&[String]) -> CepResult<Option<Constraint>>,
        diag: &mut Diagnostics,
    ) -> CepResult<()> {
        let mut entries = Vec::new();
        for tuple in tuples {
            if let Some(constraint) = rule(tuple)? {
                entries.push((tuple.clone(), constraint));
            }
        }
        self.add_constraint_block(name, dims, entries, diag);
        Ok(())
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.iter().map(|b| b.entries.len()).sum()
    }

    /// Break the components apart for solving: the variable pool, the
    /// variable blocks in declaration order, and the constraint blocks.
    pub fn into_parts(mut self) -> (ProblemVariables, Vec<VariableBlock>, Vec<ConstraintBlock>) {
        let blocks = self
            .order
            .iter()
            .map(|name| self.blocks.remove(name).expect("ordered block"))
            .collect();
        (self.problem, blocks, self.constraints)
    }
}

fn default_bounds(domain: VarDomain) -> (f64, f64) {
    match domain {
        VarDomain::Continuous => (f64::NEG_INFINITY, f64::INFINITY),
        VarDomain::NonNegative => (0.0, f64::INFINITY),
        VarDomain::Bounded => (f64::NEG_INFINITY, f64::INFINITY),
        VarDomain::RelaxedBinary => (0.0, 1.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use good_lp::constraint;

    fn tuples_1d(values: &[&str]) -> (Vec<Vec<String>>, Vec<String>) {
        (
            values.iter().map(|v| vec![v.to_string()]).collect(),
            vec!["dim".to_string()],
        )
    }

    #[test]
    fn test_variable_lookup() {
        let mut m = ModelComponents::new();
        let mut diag = Diagnostics::new();
        m.add_variable("flow", tuples_1d(&["a", "b"]), VarDomain::NonNegative, &mut diag);

        let block = m.var("flow").unwrap();
        assert_eq!(block.len(), 2);
        assert!(block.get(&["a"]).is_ok());
        assert!(block.get(&["c"]).is_err());
    }

    #[test]
    fn test_duplicate_variable_kept_original() {
        let mut m = ModelComponents::new();
        let mut diag = Diagnostics::new();
        m.add_variable("flow", tuples_1d(&["a"]), VarDomain::NonNegative, &mut diag);
        m.add_variable("flow", tuples_1d(&["a", "b"]), VarDomain::NonNegative, &mut diag);

        assert_eq!(m.var("flow").unwrap().len(), 1);
        assert_eq!(diag.warning_count(), 1);
    }

    #[test]
    fn test_rule_skip_semantics() {
        let mut m = ModelComponents::new();
        let mut diag = Diagnostics::new();
        m.add_variable("x", tuples_1d(&["a", "b", "c"]), VarDomain::NonNegative, &mut diag);

        let tuples: Vec<Vec<String>> = vec![
            vec!["a".to_string()],
            vec!["b".to_string()],
            vec!["c".to_string()],
        ];
        let block = m.var("x").unwrap();
        let vars: Vec<Variable> = tuples
            .iter()
            .map(|t| block.try_get_tuple(t).unwrap())
            .collect();
        m.add_constraint_rule(
            "cap",
            &tuples,
            vec!["dim".to_string()],
            |tuple| {
                // skip "b" entirely, as if its bound were +inf
                if tuple[0] == "b" {
                    return Ok(None);
                }
                let i = tuples.iter().position(|t| t == tuple).unwrap();
                Ok(Some(constraint!(vars[i] <= 5.0)))
            },
            &mut diag,
        )
        .unwrap();

        assert_eq!(m.constraint_count(), 2);
    }

    #[test]
    fn test_duplicate_constraint_kept_original() {
        let mut m = ModelComponents::new();
        let mut diag = Diagnostics::new();
        m.add_variable("x", tuples_1d(&["a"]), VarDomain::NonNegative, &mut diag);
        let x = m.var("x").unwrap().get(&["a"]).unwrap();

        m.add_constraint_block(
            "cap",
            vec!["dim".to_string()],
            vec![(vec!["a".to_string()], constraint!(x <= 1.0))],
            &mut diag,
        );
        m.add_constraint_block(
            "cap",
            vec!["dim".to_string()],
            vec![(vec!["a".to_string()], constraint!(x <= 2.0))],
            &mut diag,
        );

        assert_eq!(m.constraint_count(), 1);
        assert_eq!(diag.warning_count(), 1);
    }

    #[test]
    fn test_relaxed_binary_bounds() {
        let mut m = ModelComponents::new();
        let mut diag = Diagnostics::new();
        m.add_variable("b", tuples_1d(&["a"]), VarDomain::RelaxedBinary, &mut diag);
        assert_eq!(m.var("b").unwrap().domain, VarDomain::RelaxedBinary);
    }
}
