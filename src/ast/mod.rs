//! AST feed consumed by the compiler
//!
//! A model source arrives as an ordered sequence of tagged [`Item`]s, each one
//! a statement or directive produced by an external parser. Items are JSON
//! objects discriminated by an `"item"` field:
//!
//! ```ignore
//! use bcmd::ast::parse_items;
//!
//! let items = parse_items(r#"[
//!     { "item": "diffeqn", "target": "x",
//!       "expr": { "binop": { "op": "*", "lhs": { "literal": -1 },
//!                 "rhs": { "binop": { "op": "*", "lhs": { "symbol": "k" }, "rhs": { "symbol": "x" } } } } } },
//!     { "item": "assign", "target": "k", "expr": { "literal": 1 }, "init": true },
//!     { "item": "input", "names": ["k"] }
//! ]"#)?;
//! ```

mod expr;

pub use expr::{BinOp, Expr};

use serde::{Deserialize, Serialize};

use crate::error::BcmdError;

// ═══════════════════════════════════════════════════════════════════════════════
// Items
// ═══════════════════════════════════════════════════════════════════════════════

/// A single statement or directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum Item {
    /// `target' = expr`, optionally coupled to other differentials
    #[serde(rename = "diffeqn")]
    DiffEqn {
        target: String,
        expr: Expr,
        #[serde(default)]
        aux: Vec<AuxTerm>,
    },

    /// `target : lhs = rhs`, meaning `rhs - lhs == 0`
    #[serde(rename = "algeqn")]
    AlgEqn {
        target: String,
        #[serde(default)]
        lhs: Option<Expr>,
        rhs: Expr,
    },

    /// `target = expr` (runtime) or `target := expr` (initializer only)
    Assign {
        target: String,
        expr: Expr,
        #[serde(default)]
        init: bool,
    },

    Constraint(ConstraintDecl),

    Reaction(ReactionDecl),

    Version {
        version: String,
    },

    /// Names the independent variable
    Independent {
        name: String,
    },

    Import {
        files: Vec<String>,
    },

    Output {
        names: Vec<String>,
    },

    Input {
        names: Vec<String>,
    },

    Extern {
        names: Vec<String>,
    },

    /// Verbatim C code copied into the generated source
    Embedded {
        code: String,
    },

    /// One documentation comment line
    Doc {
        text: String,
    },
}

/// A mass-matrix coupling term on a differential equation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxTerm {
    #[serde(default = "unit_coefficient")]
    pub coefficient: f64,
    pub target: String,
}

fn unit_coefficient() -> f64 {
    1.0
}

// ═══════════════════════════════════════════════════════════════════════════════
// Constraints
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundKind {
    /// Enforced by clamping
    #[default]
    Hard,
    /// Recorded only
    Soft,
}

impl std::fmt::Display for BoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hard => write!(f, "hard"),
            Self::Soft => write!(f, "soft"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparison {
    /// The test that is true exactly when this one is false
    pub fn inverted(self) -> Self {
        match self {
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// `target <test> bound`, as declared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintDecl {
    #[serde(default)]
    pub kind: BoundKind,
    pub target: String,
    pub test: Comparison,
    pub bound: Expr,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reactions
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    /// `-> rhs`
    Influx,
    /// `lhs ->`
    Outflux,
    /// `lhs -> rhs`
    Oneway,
    /// `lhs <-> rhs`
    Twoway,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Influx => write!(f, "influx"),
            Self::Outflux => write!(f, "outflux"),
            Self::Oneway => write!(f, "oneway"),
            Self::Twoway => write!(f, "twoway"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Rate law named in braces after a reaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateLaw {
    #[default]
    #[serde(rename = "explicit")]
    Explicit,
    #[serde(rename = "MA")]
    MassAction,
    #[serde(rename = "MM")]
    MichaelisMenten,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTerm {
    #[serde(default)]
    pub law: RateLaw,
    pub args: Vec<Expr>,
}

/// `stoich [chemical, compartment]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChemTerm {
    #[serde(default = "unit_stoich")]
    pub stoich: Expr,
    pub chemical: String,
    #[serde(default)]
    pub compartment: Option<String>,
}

fn unit_stoich() -> Expr {
    Expr::Literal(1.0)
}

impl ChemTerm {
    /// Symbol name of the chemical, qualified by compartment when present
    pub fn name(&self) -> String {
        match &self.compartment {
            Some(compartment) => format!("{}_{}", self.chemical, compartment),
            None => self.chemical.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDecl {
    pub kind: ReactionKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub lhs: Vec<ChemTerm>,
    #[serde(default)]
    pub rhs: Vec<ChemTerm>,
    pub rate: RateTerm,
    /// Second rate of a twoway reaction
    #[serde(default)]
    pub reverse_rate: Option<RateTerm>,
}

/// Decode an item sequence from JSON
pub fn parse_items(json: &str) -> Result<Vec<Item>, BcmdError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statement_items() {
        let items = parse_items(
            r#"[
                { "item": "diffeqn", "target": "x", "expr": { "symbol": "k" },
                  "aux": [{ "coefficient": -2, "target": "y" }] },
                { "item": "algeqn", "target": "z", "rhs": { "symbol": "x" } },
                { "item": "assign", "target": "k", "expr": { "literal": 1 }, "init": true },
                { "item": "constraint", "target": "x", "test": ">", "bound": { "literal": 0 } }
            ]"#,
        )
        .expect("Should parse items");

        assert_eq!(items.len(), 4);
        match &items[0] {
            Item::DiffEqn { aux, .. } => assert_eq!(aux[0].coefficient, -2.0),
            other => panic!("unexpected item {:?}", other),
        }
        assert!(matches!(&items[1], Item::AlgEqn { lhs: None, .. }));
        assert!(matches!(&items[2], Item::Assign { init: true, .. }));
        match &items[3] {
            Item::Constraint(c) => {
                assert_eq!(c.kind, BoundKind::Hard);
                assert_eq!(c.test, Comparison::Gt);
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_parse_reaction_defaults() {
        let items = parse_items(
            r#"[{ "item": "reaction", "kind": "oneway",
                  "lhs": [{ "chemical": "A" }, { "chemical": "B", "compartment": "V" }],
                  "rhs": [{ "chemical": "C", "stoich": { "literal": 2 } }],
                  "rate": { "law": "MA", "args": [{ "symbol": "k" }] } }]"#,
        )
        .expect("Should parse reaction");

        let Item::Reaction(r) = &items[0] else {
            panic!("expected a reaction");
        };
        assert_eq!(r.kind, ReactionKind::Oneway);
        assert_eq!(r.label, "");
        assert!(r.lhs[0].stoich.is_literal(1.0));
        assert_eq!(r.lhs[1].name(), "B_V");
        assert_eq!(r.rate.law, RateLaw::MassAction);
        assert!(r.reverse_rate.is_none());
    }

    #[test]
    fn test_unknown_kinds_are_tolerated() {
        let items = parse_items(
            r#"[{ "item": "reaction", "kind": "sideways",
                  "rate": { "law": "Hill", "args": [] } }]"#,
        )
        .expect("Should parse unknown kinds");
        let Item::Reaction(r) = &items[0] else {
            panic!("expected a reaction");
        };
        assert_eq!(r.kind, ReactionKind::Unknown);
        assert_eq!(r.rate.law, RateLaw::Unknown);
    }

    #[test]
    fn test_inverted_comparisons() {
        assert_eq!(Comparison::Gt.inverted(), Comparison::Le);
        assert_eq!(Comparison::Ge.inverted(), Comparison::Lt);
        assert_eq!(Comparison::Lt.inverted(), Comparison::Ge);
        assert_eq!(Comparison::Le.inverted(), Comparison::Gt);
    }

    #[test]
    fn test_malformed_item_is_an_error() {
        let result = parse_items(r#"[{ "item": "diffeqn" }]"#);
        assert!(matches!(result, Err(BcmdError::Parse(_))));
    }
}
