//! Rendering expressions as C in a storage context

use std::collections::{HashMap, HashSet};

use crate::ast::{BinOp, Expr};
use crate::diagnostics::Diagnostics;
use crate::model::Model;

/// Token emitted for a symbol with no storage slot, so the C compiler rejects it
pub const UNRESOLVED: &str = "ERROR_IN_EXPR";

/// Token emitted for a failed expression
pub const FAILED: &str = "FAILED";

/// Where generated code runs, which decides how symbols are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Model initialisation: everything lives in `RPAR`
    Init,
    /// Between solver steps: roots are read from `Y`
    Step,
    /// Inside the solver's right-hand side: roots in `y`, intermediates in `INTERMEDIATES`
    Solve,
}

/// Maps symbols to storage slots for one model
pub struct CPrinter<'a> {
    model: &'a Model,
    solver: HashMap<&'a str, usize>,
    intermeds: HashMap<&'a str, usize>,
    params: HashSet<&'a str>,
}

impl<'a> CPrinter<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self {
            model,
            solver: model
                .solver_vars()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect(),
            intermeds: model
                .intermeds
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), i))
                .collect(),
            params: model.params.iter().map(String::as_str).collect(),
        }
    }

    fn rpar(&self, name: &str) -> Option<String> {
        self.model.index_of(name).map(|idx| format!("RPAR[{}]", idx))
    }

    /// Storage slot of `name` in `ctx`, if it has one
    pub fn slot(&self, name: &str, ctx: Context) -> Option<String> {
        if name == self.model.independent {
            return Some("RPAR[0]".to_string());
        }
        if self.params.contains(name) {
            return self.rpar(name);
        }
        if let Some(&pos) = self.solver.get(name) {
            return match ctx {
                Context::Solve => Some(format!("y[{}]", pos)),
                Context::Step => Some(format!("Y[{}]", pos)),
                Context::Init => self.rpar(name),
            };
        }
        if let Some(&pos) = self.intermeds.get(name) {
            return match ctx {
                Context::Solve => Some(format!("INTERMEDIATES[{}]", pos)),
                Context::Step | Context::Init => self.rpar(name),
            };
        }
        None
    }

    /// Render `expr` as C
    pub fn expr(&self, expr: &Expr, ctx: Context, diags: &mut Diagnostics) -> String {
        let mut out = String::new();
        self.render(expr, ctx, diags, &mut out);
        out
    }

    fn render(&self, expr: &Expr, ctx: Context, diags: &mut Diagnostics, out: &mut String) {
        match expr {
            Expr::Literal(v) => out.push_str(&c_number(*v)),
            Expr::Symbol(name) => match self.slot(name, ctx) {
                Some(slot) => out.push_str(&slot),
                None => {
                    diags.error(format!("Unknown symbol '{}' in expression", name));
                    out.push_str(UNRESOLVED);
                }
            },
            Expr::Call { name, args } => {
                out.push_str(name);
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render(arg, ctx, diags, out);
                }
                out.push(')');
            }
            Expr::BinOp {
                op: BinOp::Pow,
                lhs,
                rhs,
            } => {
                out.push_str("pow(");
                self.render(lhs, ctx, diags, out);
                out.push_str(", ");
                self.render(rhs, ctx, diags, out);
                out.push(')');
            }
            Expr::BinOp { op, lhs, rhs } => {
                out.push('(');
                self.render(lhs, ctx, diags, out);
                out.push_str(op.symbol());
                self.render(rhs, ctx, diags, out);
                out.push(')');
            }
            Expr::Conditional {
                test,
                then,
                otherwise,
            } => {
                out.push('(');
                self.render(test, ctx, diags, out);
                out.push_str(" ? ");
                self.render(then, ctx, diags, out);
                out.push_str(" : ");
                self.render(otherwise, ctx, diags, out);
                out.push(')');
            }
            Expr::Failure(_) => out.push_str(FAILED),
        }
    }
}

/// A double literal as C source
///
/// Negative values are parenthesised so they survive next to a binary minus.
pub fn c_number(value: f64) -> String {
    if value.is_nan() {
        "NAN".to_string()
    } else if value.is_infinite() {
        let token = if value > 0.0 { "INFINITY" } else { "(-INFINITY)" };
        token.to_string()
    } else if value < 0.0 {
        format!("({:?})", value)
    } else {
        format!("{:?}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_number() {
        assert_eq!(c_number(0.0), "0.0");
        assert_eq!(c_number(1.5), "1.5");
        assert_eq!(c_number(-1.0), "(-1.0)");
        assert_eq!(c_number(1e-7), "1e-7");
        assert_eq!(c_number(f64::INFINITY), "INFINITY");
        assert_eq!(c_number(f64::NAN), "NAN");
    }
}
