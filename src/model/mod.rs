//! Analysed model
//!
//! A [`Model`] is built from an item sequence in one streaming pass by
//! [`ModelBuilder`], then closed over its dependencies, classified and
//! scheduled. After [`ModelBuilder::finish`] it is immutable input to code
//! generation and reporting.
//!
//! ```ignore
//! use bcmd::{ast::parse_items, config::CompilerConfig, diagnostics::Diagnostics, model::Model};
//!
//! let items = parse_items(source)?;
//! let mut diags = Diagnostics::new();
//! let model = Model::build(&items, &CompilerConfig::default(), &mut diags)?;
//! assert_eq!(model.symbols[0].id, "t");
//! ```

mod builder;
mod closure;
mod reactions;
mod schedule;

pub use builder::ModelBuilder;
pub use schedule::{choose_assignments, dependency_sort, Assignment, Schedule};

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::ast::{BoundKind, Comparison, Expr, Item, ReactionKind};
use crate::config::CompilerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::BcmdError;

/// C maths library functions the generated code may call without declaration
pub const STD_FUNCS: &[&str] = &[
    "acos", "asin", "atan", "atan2", "cos", "cosh", "sin", "sinh", "tan", "tanh", "exp", "frexp",
    "ldexp", "log", "log10", "modf", "pow", "sqrt", "ceil", "fabs", "floor", "fmod",
];

// ═══════════════════════════════════════════════════════════════════════════════
// Symbols and their definitions
// ═══════════════════════════════════════════════════════════════════════════════

/// An expression together with the names it depends on directly
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub expr: Expr,
    pub depends: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignExpr {
    pub expr: Expr,
    pub depends: BTreeSet<String>,
    /// Initializer-only (`:=`) rather than ongoing (`=`)
    pub init: bool,
}

/// A bound, stored with its violation test
///
/// `x > 0` is stored as `test: Le`, so the generated clamp reads
/// `if ( x <= 0 ) x = 0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    pub kind: BoundKind,
    pub test: Comparison,
    pub bound: Expr,
    pub depends: BTreeSet<String>,
}

impl Constraint {
    /// Hard lower bound of zero, attached to every chemical species
    pub fn non_negative() -> Self {
        Self {
            kind: BoundKind::Hard,
            test: Comparison::Lt,
            bound: Expr::Literal(0.0),
            depends: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub id: String,
    /// Position in the symbol table, and slot in `RPAR`
    pub index: usize,
    /// Direct dependencies, closed transitively by the closure pass
    pub depends: BTreeSet<String>,
    /// Direct dependencies only
    pub direct: BTreeSet<String>,
    pub assigns: Vec<AssignExpr>,
    pub diffs: Vec<Definition>,
    pub algs: Vec<Definition>,
    pub constraints: Vec<Constraint>,
    pub circular: bool,
    /// Number of times this symbol was redefined as a root
    pub conflicts: usize,
    pub docs: Vec<String>,
    pub tags: Vec<String>,
    pub units: Option<String>,
    pub latex: Option<String>,
}

impl Symbol {
    fn new(id: &str, index: usize) -> Self {
        Self {
            id: id.to_string(),
            index,
            depends: BTreeSet::new(),
            direct: BTreeSet::new(),
            assigns: Vec::new(),
            diffs: Vec::new(),
            algs: Vec::new(),
            constraints: Vec::new(),
            circular: false,
            conflicts: 0,
            docs: Vec::new(),
            tags: Vec::new(),
            units: None,
            latex: None,
        }
    }

    /// Add direct dependencies
    fn depend_on(&mut self, deps: &BTreeSet<String>) {
        self.depends.extend(deps.iter().cloned());
        self.direct.extend(deps.iter().cloned());
    }

    /// True if any doc line is prose rather than an annotation
    pub fn is_documented(&self) -> bool {
        self.docs.iter().any(|line| !line.starts_with('+'))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reactions
// ═══════════════════════════════════════════════════════════════════════════════

/// One chemical on one side of a reaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Term {
    pub chem: String,
    /// Signed stoichiometry: negated for reactants
    pub stoich: Expr,
    /// Stoichiometry as declared
    pub declared: Expr,
    pub depends: BTreeSet<String>,
}

/// Net contribution of a reaction to one chemical
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub stoich: Expr,
    pub depends: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reaction {
    pub label: String,
    pub kind: ReactionKind,
    pub lhs: Vec<Term>,
    pub rhs: Vec<Term>,
    pub rate: Definition,
    pub chems: BTreeMap<String, Contribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chemical {
    pub name: String,
    pub compartment: Option<String>,
}

/// Mass-matrix coupling of one differential to another
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Auxiliary {
    pub coefficient: f64,
    pub target: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Model
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize)]
pub struct Model {
    /// Symbol table in declaration order, so `symbols[i].index == i`
    pub symbols: Vec<Symbol>,
    #[serde(skip)]
    lookup: HashMap<String, usize>,

    pub independent: String,
    pub roots: Vec<String>,
    pub diffs: Vec<String>,
    pub algs: Vec<String>,
    pub chemicals: Vec<Chemical>,
    pub reactions: Vec<Reaction>,
    pub auxiliaries: BTreeMap<String, Vec<Auxiliary>>,
    pub diagonal: bool,

    pub params: Vec<String>,
    pub intermeds: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub externs: Vec<String>,
    pub assigned: BTreeSet<String>,
    pub required: BTreeSet<String>,
    pub unused: BTreeSet<String>,

    pub functions: BTreeSet<String>,
    pub known: BTreeSet<String>,
    pub unknown: BTreeSet<String>,

    pub schedule: Schedule,

    pub embeds: Vec<String>,
    pub version: Option<String>,
    pub docs: Vec<String>,
    pub model_docs: Vec<String>,
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Model {
    /// Analyse an item sequence into a model ready for code generation
    pub fn build(
        items: &[Item],
        config: &CompilerConfig,
        diags: &mut Diagnostics,
    ) -> Result<Model, BcmdError> {
        let independent = find_independent(items, &config.independent, diags);
        let mut builder = ModelBuilder::new(&independent, diags);
        for item in items {
            builder.process(item);
        }
        builder.finish(config.strict_assignments)
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.lookup.get(name).map(|&idx| &self.symbols[idx])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    pub fn is_root(&self, name: &str) -> bool {
        self.roots.iter().any(|r| r == name)
    }

    pub fn is_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p == name)
    }

    pub fn is_intermed(&self, name: &str) -> bool {
        self.intermeds.iter().any(|i| i == name)
    }

    /// Root names in solver order: differentials then algebraics
    pub fn solver_vars(&self) -> impl Iterator<Item = &String> {
        self.diffs.iter().chain(self.algs.iter())
    }

    /// Position of a root in the solver's `y`/`f` arrays
    pub fn solver_position(&self, name: &str) -> Option<usize> {
        self.solver_vars().position(|r| r == name)
    }

    pub fn intermed_position(&self, name: &str) -> Option<usize> {
        self.intermeds.iter().position(|i| i == name)
    }

    /// Number of differential and algebraic variables
    pub fn var_count(&self) -> usize {
        self.diffs.len() + self.algs.len()
    }

    pub(crate) fn symbol_mut(&mut self, idx: usize) -> &mut Symbol {
        &mut self.symbols[idx]
    }

    /// Return the index of `name`, creating the symbol on first reference
    pub(crate) fn declare(&mut self, name: &str) -> (usize, bool) {
        if let Some(&idx) = self.lookup.get(name) {
            return (idx, false);
        }
        let idx = self.symbols.len();
        self.symbols.push(Symbol::new(name, idx));
        self.lookup.insert(name.to_string(), idx);
        (idx, true)
    }
}

/// Name of the independent variable: the first `independent` directive, else `default`
pub fn find_independent(items: &[Item], default: &str, diags: &mut Diagnostics) -> String {
    let mut found: Option<&str> = None;
    for item in items {
        if let Item::Independent { name } = item {
            match found {
                None => found = Some(name),
                Some(_) => diags.warn(format!("Ignoring additional independent directive: {}", name)),
            }
        }
    }
    found.unwrap_or(default).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_is_idempotent() {
        let mut model = Model::default();
        let (a, created) = model.declare("a");
        assert!(created);
        let (b, _) = model.declare("b");
        let (again, created) = model.declare("a");
        assert!(!created);
        assert_eq!((a, b, again), (0, 1, 0));
        assert_eq!(model.symbol("b").map(|s| s.index), Some(1));
    }

    #[test]
    fn test_first_independent_wins() {
        let items = vec![
            Item::Independent {
                name: "time".to_string(),
            },
            Item::Independent {
                name: "x".to_string(),
            },
        ];
        let mut diags = Diagnostics::new();
        assert_eq!(find_independent(&items, "t", &mut diags), "time");
        assert_eq!(diags.len(), 1);
        assert_eq!(find_independent(&[], "t", &mut diags), "t");
    }
}
