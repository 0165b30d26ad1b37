//! Assignment scheduling
//!
//! Every assigned symbol contributes an initializer and, optionally, a runtime
//! expression. These land in four buckets, each evaluated at a different point
//! of a simulation:
//!
//! | bucket        | evaluated                                  |
//! |---------------|--------------------------------------------|
//! | `independent` | once at init, no dependencies              |
//! | `dependent`   | once at init, after `independent`          |
//! | `step`        | whenever parameters change between steps   |
//! | `runtime`     | on every right-hand-side evaluation        |

use std::collections::{BTreeSet, HashMap, VecDeque};

use serde::Serialize;

use crate::ast::Expr;
use crate::diagnostics::Diagnostics;

use super::builder::ModelBuilder;
use super::{AssignExpr, Symbol};

/// A scheduled assignment of `expr` to `target`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub target: String,
    pub expr: Expr,
    pub depends: BTreeSet<String>,
}

impl Assignment {
    fn from_assign(target: &str, assign: &AssignExpr) -> Self {
        Self {
            target: target.to_string(),
            expr: assign.expr.clone(),
            depends: assign.depends.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Schedule {
    pub independent: Vec<Assignment>,
    pub dependent: Vec<Assignment>,
    pub step: Vec<Assignment>,
    pub runtime: Vec<Assignment>,
}

/// Initializer and runtime picks for one symbol
#[derive(Debug, Clone, Copy)]
pub struct Chosen<'s> {
    pub init: &'s AssignExpr,
    pub run: Option<&'s AssignExpr>,
    /// The pairing was a guess
    pub ambiguous: bool,
}

/// Pick the initializer and runtime expressions among a symbol's assignments
///
/// With a single assignment, it initializes; it also runs unless it is
/// initializer-only or has no dependencies. With several, an explicit
/// initializer wins the init slot and the last ongoing one runs. Otherwise the
/// one with fewest dependencies initializes (ties go to the later) and the one
/// with most runs (ties go to the earlier).
pub fn choose_assignments<'s>(symbol: &'s Symbol, diags: &mut Diagnostics) -> Option<Chosen<'s>> {
    let assigns = &symbol.assigns;
    match assigns.len() {
        0 => return None,
        1 => {
            let only = &assigns[0];
            let run = (!only.init && !only.depends.is_empty()).then_some(only);
            return Some(Chosen {
                init: only,
                run,
                ambiguous: false,
            });
        }
        _ => {}
    }

    let mut ambiguous = false;
    if assigns.len() > 2 {
        diags.warn(format!(
            "Too many assignments ({}) for symbol {}",
            assigns.len(),
            symbol.id
        ));
        ambiguous = true;
    }

    let mut init = None;
    let mut noinit = None;
    let mut lo = (usize::MAX, &assigns[0]);
    let mut hi: (Option<usize>, &AssignExpr) = (None, &assigns[0]);
    for assign in assigns {
        if assign.init {
            init = Some(assign);
        } else {
            noinit = Some(assign);
        }

        let ndeps = assign.depends.len();
        if ndeps <= lo.0 {
            lo = (ndeps, assign);
        }
        if hi.0.map_or(true, |h| ndeps > h) {
            hi = (Some(ndeps), assign);
        }
    }

    if let Some(init) = init {
        return Some(Chosen {
            init,
            run: noinit,
            ambiguous,
        });
    }

    if hi.0 == Some(lo.0) {
        diags.warn(format!(
            "Ambiguous dependencies in assignment for {}",
            symbol.id
        ));
        ambiguous = true;
    }

    Some(Chosen {
        init: lo.1,
        run: Some(hi.1),
        ambiguous,
    })
}

/// Order assignments so that each follows every queued assignment it depends on
///
/// An entry whose dependencies are still queued goes back to the tail. If an
/// entry comes round again without the queue having shrunk, the rest is a
/// cycle: it is reported and flushed in queue order.
pub fn dependency_sort(entries: Vec<Assignment>, diags: &mut Diagnostics) -> Vec<Assignment> {
    let mut queue: VecDeque<Assignment> = entries.into();
    let mut ordered = Vec::with_capacity(queue.len());
    let mut stopper: HashMap<String, usize> = HashMap::new();

    while let Some(entry) = queue.pop_front() {
        if let Some(&last) = stopper.get(&entry.target) {
            if queue.len() >= last {
                diags.error(format!(
                    "Unresolved circular dependency in assignments (at symbol {}), model may be non-viable",
                    entry.target
                ));
                ordered.push(entry);
                ordered.extend(queue);
                return ordered;
            }
        }
        stopper.insert(entry.target.clone(), queue.len());

        let blocked = queue.iter().any(|q| entry.depends.contains(&q.target));
        if blocked {
            queue.push_back(entry);
        } else {
            ordered.push(entry);
        }
    }

    ordered
}

impl ModelBuilder<'_> {
    /// Fill the four buckets, returning the symbols whose pairing was a guess
    pub(super) fn sort_assignments(&mut self) -> Vec<String> {
        let mut independent = Vec::new();
        let mut dependent = Vec::new();
        let mut step = Vec::new();
        let mut runtime = Vec::new();
        let mut demoted = Vec::new();
        let mut ambiguous = Vec::new();

        for symbol in &self.model.symbols {
            if !self.model.assigned.contains(&symbol.id) {
                continue;
            }
            let Some(chosen) = choose_assignments(symbol, self.diags) else {
                continue;
            };
            if chosen.ambiguous {
                ambiguous.push(symbol.id.clone());
            }

            let init = Assignment::from_assign(&symbol.id, chosen.init);
            if init.depends.is_empty() {
                independent.push(init);
            } else {
                dependent.push(init);
            }

            let is_intermed = self.model.is_intermed(&symbol.id);
            match chosen.run {
                Some(run) if is_intermed => runtime.push(Assignment::from_assign(&symbol.id, run)),
                Some(run) => step.push(Assignment::from_assign(&symbol.id, run)),
                // classified before runtime expressions were known
                None if is_intermed => demoted.push(symbol.id.clone()),
                None => {}
            }
        }

        for name in demoted {
            self.diags.detail(format!(
                "Intermediate {} has no runtime expression, treating as parameter",
                name
            ));
            self.model.intermeds.retain(|i| *i != name);
            if !self.model.is_param(&name) {
                self.model.params.push(name);
            }
        }

        self.model.schedule = Schedule {
            independent,
            dependent: dependency_sort(dependent, self.diags),
            step: dependency_sort(step, self.diags),
            runtime: dependency_sort(runtime, self.diags),
        };
        ambiguous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assign(deps: &[&str], init: bool) -> AssignExpr {
        AssignExpr {
            expr: Expr::literal(deps.len() as f64),
            depends: deps.iter().map(|d| d.to_string()).collect(),
            init,
        }
    }

    fn symbol(assigns: Vec<AssignExpr>) -> Symbol {
        let mut s = Symbol::new("s", 1);
        s.assigns = assigns;
        s
    }

    fn entry(target: &str, deps: &[&str]) -> Assignment {
        Assignment {
            target: target.to_string(),
            expr: Expr::literal(0.0),
            depends: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_single_assignment() {
        let mut diags = Diagnostics::new();

        let s = symbol(vec![assign(&[], false)]);
        let chosen = choose_assignments(&s, &mut diags).expect("Should choose");
        assert!(chosen.run.is_none());

        let s = symbol(vec![assign(&["x"], false)]);
        let chosen = choose_assignments(&s, &mut diags).expect("Should choose");
        assert!(chosen.run.is_some());

        let s = symbol(vec![assign(&["x"], true)]);
        let chosen = choose_assignments(&s, &mut diags).expect("Should choose");
        assert!(chosen.run.is_none());
        assert!(diags.is_empty());
    }

    #[test]
    fn test_explicit_initializer_wins() {
        let mut diags = Diagnostics::new();
        let s = symbol(vec![assign(&["a", "b"], true), assign(&["x"], false)]);
        let chosen = choose_assignments(&s, &mut diags).expect("Should choose");
        assert!(chosen.init.init);
        assert_eq!(chosen.run.map(|r| r.depends.len()), Some(1));
        assert!(!chosen.ambiguous);
    }

    #[test]
    fn test_fewest_dependencies_initializes() {
        let mut diags = Diagnostics::new();
        let s = symbol(vec![assign(&["a", "b"], false), assign(&[], false)]);
        let chosen = choose_assignments(&s, &mut diags).expect("Should choose");
        assert!(chosen.init.depends.is_empty());
        assert_eq!(chosen.run.map(|r| r.depends.len()), Some(2));
        assert!(!chosen.ambiguous);
    }

    #[test]
    fn test_tie_is_ambiguous() {
        let mut diags = Diagnostics::new();
        let first = assign(&["a"], false);
        let mut second = assign(&["b"], false);
        second.expr = Expr::literal(99.0);
        let s = symbol(vec![first, second]);
        let chosen = choose_assignments(&s, &mut diags).expect("Should choose");
        assert!(chosen.ambiguous);
        // later takes init, earlier takes runtime
        assert!(chosen.init.expr.is_literal(99.0));
        assert!(chosen.run.is_some_and(|r| r.expr.is_literal(1.0)));
        assert!(diags.contains(crate::diagnostics::Level::Warning, "Ambiguous"));
    }

    #[test]
    fn test_dependency_sort_orders_chain() {
        let mut diags = Diagnostics::new();
        let sorted = dependency_sort(
            vec![entry("c", &["b"]), entry("b", &["a"]), entry("a", &[])],
            &mut diags,
        );
        let names: Vec<_> = sorted.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_dependency_sort_ignores_unqueued_dependencies() {
        let mut diags = Diagnostics::new();
        let sorted = dependency_sort(vec![entry("b", &["x"]), entry("a", &["y"])], &mut diags);
        let names: Vec<_> = sorted.iter().map(|e| e.target.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_dependency_sort_flushes_cycle() {
        let mut diags = Diagnostics::new();
        let sorted = dependency_sort(
            vec![entry("a", &["b"]), entry("b", &["a"]), entry("c", &[])],
            &mut diags,
        );
        assert_eq!(sorted.len(), 3);
        assert_eq!(sorted[0].target, "c");
        assert!(diags.has_errors());
    }
}
