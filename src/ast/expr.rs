//! Typed expression tree shared by the AST feed and the analysed model

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Binary operators, arithmetic and logical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
    #[serde(rename = "^")]
    Pow,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "&&")]
    And,
    #[serde(rename = "||")]
    Or,
}

impl BinOp {
    /// Operator as written in model source
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    /// Fold two literal operands, for the arithmetic operators only
    fn fold(&self, a: f64, b: f64) -> Option<f64> {
        match self {
            Self::Add => Some(a + b),
            Self::Sub => Some(a - b),
            Self::Mul => Some(a * b),
            Self::Div if b != 0.0 => Some(a / b),
            _ => None,
        }
    }
}

/// An expression in the model language
///
/// `Failure` is a sentinel substituted for malformed statements. It renders as
/// an identifier the downstream C compiler will reject, so one bad statement
/// surfaces there instead of aborting the whole model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(f64),
    Symbol(String),
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
    #[serde(rename = "binop")]
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Failure(String),
}

impl Expr {
    pub fn literal(value: f64) -> Self {
        Self::Literal(value)
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    /// Build a binary operation, folding literal operands
    pub fn binop(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        if let (Self::Literal(a), Self::Literal(b)) = (&lhs, &rhs) {
            if let Some(value) = op.fold(*a, *b) {
                return Self::Literal(value);
            }
        }
        Self::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Mul, lhs, rhs)
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Div, lhs, rhs)
    }

    pub fn pow(lhs: Expr, rhs: Expr) -> Self {
        Self::binop(BinOp::Pow, lhs, rhs)
    }

    pub fn conditional(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::Conditional {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    /// Left-fold a non-empty list with `op`
    pub fn fold_with(op: BinOp, mut items: impl Iterator<Item = Expr>) -> Option<Expr> {
        let first = items.next()?;
        Some(items.fold(first, |acc, item| Self::binop(op, acc, item)))
    }

    /// True if this is the literal `value`
    pub fn is_literal(&self, value: f64) -> bool {
        matches!(self, Self::Literal(v) if *v == value)
    }

    pub fn is_failure(&self) -> bool {
        match self {
            Self::Failure(_) => true,
            Self::Literal(_) | Self::Symbol(_) => false,
            Self::Call { args, .. } => args.iter().any(Expr::is_failure),
            Self::BinOp { lhs, rhs, .. } => lhs.is_failure() || rhs.is_failure(),
            Self::Conditional {
                test,
                then,
                otherwise,
            } => test.is_failure() || then.is_failure() || otherwise.is_failure(),
        }
    }

    /// Visit every symbol reference, in left-to-right order
    pub fn walk_symbols<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Literal(_) | Self::Failure(_) => {}
            Self::Symbol(name) => f(name),
            Self::Call { args, .. } => args.iter().for_each(|a| a.walk_symbols(f)),
            Self::BinOp { lhs, rhs, .. } => {
                lhs.walk_symbols(f);
                rhs.walk_symbols(f);
            }
            Self::Conditional {
                test,
                then,
                otherwise,
            } => {
                test.walk_symbols(f);
                then.walk_symbols(f);
                otherwise.walk_symbols(f);
            }
        }
    }

    /// Visit every function call name
    pub fn walk_calls<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Literal(_) | Self::Symbol(_) | Self::Failure(_) => {}
            Self::Call { name, args } => {
                f(name);
                args.iter().for_each(|a| a.walk_calls(f));
            }
            Self::BinOp { lhs, rhs, .. } => {
                lhs.walk_calls(f);
                rhs.walk_calls(f);
            }
            Self::Conditional {
                test,
                then,
                otherwise,
            } => {
                test.walk_calls(f);
                then.walk_calls(f);
                otherwise.walk_calls(f);
            }
        }
    }

    /// Names this expression depends on directly
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        self.walk_symbols(&mut |name| {
            deps.insert(name.to_string());
        });
        deps
    }
}

/// Format a number the way model source writes it
pub(crate) fn fmt_number(value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        write!(f, "{}", value as i64)
    } else {
        write!(f, "{}", value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(v) => fmt_number(*v, f),
            Self::Symbol(name) => write!(f, "{}", name),
            Self::Call { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Self::BinOp { op, lhs, rhs } => write!(f, "({}{}{})", lhs, op.symbol(), rhs),
            Self::Conditional {
                test,
                then,
                otherwise,
            } => write!(f, "({} ? {} : {})", test, then, otherwise),
            Self::Failure(_) => write!(f, "FAILED"),
        }
    }
}
