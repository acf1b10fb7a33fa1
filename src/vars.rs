//! Variable table consulted by `$name` / `${...}` substitution.

use std::collections::BTreeMap;
use std::collections::btree_map;

/// Value stored in the [`Variables`] table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variable {
    Str(String),
    Int(i64),
}

impl Variable {
    /// Text substituted for the variable; integers render in decimal.
    pub fn to_text(&self) -> String {
        match self {
            Variable::Str(s) => s.clone(),
            Variable::Int(i) => i.to_string(),
        }
    }
}

/// Named variables. Outlives single loads: a [`crate::Loader`] keeps one table for all
/// documents it loads.
#[derive(Clone, Debug, Default)]
pub struct Variables {
    table: BTreeMap<String, Variable>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.table.insert(name.into(), Variable::Str(value.into()));
    }

    pub fn set_integer(&mut self, name: impl Into<String>, value: i64) {
        self.table.insert(name.into(), Variable::Int(value));
    }

    /// Store `NAME=VALUE` as given on a command line: an integer when `VALUE` is an integer
    /// literal, a string otherwise.
    ///
    /// Returns `false` when `assignment` has no `=` or an empty name.
    pub fn set_assignment(&mut self, assignment: &str) -> bool {
        let Some((name, value)) = assignment.split_once('=') else {
            return false;
        };
        if name.is_empty() {
            return false;
        }
        match crate::parse_scalars::parse_int(value, false) {
            Ok(i) if !value.is_empty() => self.set_integer(name, i),
            _ => self.set_string(name, value),
        }
        true
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.table.get(name)
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.table.get(name).map(Variable::to_text)
    }

    pub fn remove(&mut self, name: &str) -> Option<Variable> {
        self.table.remove(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Variable> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
