//! Statement processing
//!
//! [`ModelBuilder`] owns the model while it is under construction. Each item is
//! dispatched to a handler that declares the symbols it mentions and records
//! its definitions; whole-model passes run in [`ModelBuilder::finish`].

use std::collections::BTreeSet;

use crate::ast::{AuxTerm, ConstraintDecl, Expr, Item};
use crate::diagnostics::Diagnostics;
use crate::error::BcmdError;

use super::{AssignExpr, Auxiliary, Constraint, Definition, Model};

pub struct ModelBuilder<'d> {
    pub(super) model: Model,
    pub(super) diags: &'d mut Diagnostics,
    /// Doc lines waiting for the next equation target
    docstack: Vec<String>,
    /// Counter for generated reaction labels
    unlabelled: usize,
}

impl<'d> ModelBuilder<'d> {
    /// Start a model whose independent variable occupies index 0
    pub fn new(independent: &str, diags: &'d mut Diagnostics) -> Self {
        let mut builder = Self {
            model: Model {
                independent: independent.to_string(),
                diagonal: true,
                ..Model::default()
            },
            diags,
            docstack: Vec::new(),
            unlabelled: 0,
        };
        builder.declare(independent);
        builder
    }

    /// Process one item
    pub fn process(&mut self, item: &Item) {
        match item {
            Item::DiffEqn { target, expr, aux } => self.process_diffeqn(target, expr, aux),
            Item::AlgEqn { target, lhs, rhs } => self.process_algeqn(target, lhs.as_ref(), rhs),
            Item::Assign { target, expr, init } => self.process_assign(target, expr, *init),
            Item::Constraint(decl) => self.process_constraint(decl),
            Item::Reaction(decl) => self.process_reaction(decl),
            Item::Version { version } => self.process_version(version),
            Item::Output { names } => {
                self.diags
                    .detail(format!("Appending default output fields: {}", names.join(", ")));
                push_unique(&mut self.model.outputs, names);
            }
            Item::Input { names } => {
                self.diags
                    .detail(format!("Appending input fields: {}", names.join(", ")));
                push_unique(&mut self.model.inputs, names);
            }
            Item::Extern { names } => {
                self.diags
                    .detail(format!("Appending extern fields: {}", names.join(", ")));
                push_unique(&mut self.model.externs, names);
            }
            Item::Embedded { code } => {
                self.diags.detail("Processing embedded code fragment");
                self.model.embeds.push(code.clone());
            }
            Item::Doc { text } => self.process_doc(text),
            // handled by the loader and `find_independent`
            Item::Import { .. } | Item::Independent { .. } => {}
        }
    }

    /// Run the whole-model passes and hand over the finished model
    pub fn finish(mut self, strict_assignments: bool) -> Result<Model, BcmdError> {
        if !self.docstack.is_empty() {
            self.diags.detail(format!(
                "Discarding {} trailing doc line(s) with no target",
                self.docstack.len()
            ));
        }

        self.transform_reactions();
        self.close_dependencies();
        self.classify();

        let ambiguous = self.sort_assignments();
        if strict_assignments && !ambiguous.is_empty() {
            return Err(BcmdError::AmbiguousAssignment(ambiguous));
        }

        self.finalise_outputs();
        self.finalise_externs();
        self.find_required();
        self.classify_functions();
        self.postprocess_docs();

        Ok(self.model)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Symbols and expressions
    // ───────────────────────────────────────────────────────────────────────────

    pub(super) fn declare(&mut self, name: &str) -> usize {
        let (idx, created) = self.model.declare(name);
        if created {
            self.diags
                .detail(format!("Created symbol '{}' at index {}", name, idx));
        }
        idx
    }

    /// Declare every symbol in `expr`, note its function calls, and return its dependencies
    pub(super) fn analyse(&mut self, expr: &Expr) -> BTreeSet<String> {
        let mut names = Vec::new();
        expr.walk_symbols(&mut |name| names.push(name.to_string()));
        for name in &names {
            self.declare(name);
        }

        let functions = &mut self.model.functions;
        expr.walk_calls(&mut |name| {
            functions.insert(name.to_string());
        });

        names.into_iter().collect()
    }

    pub(super) fn definition(&mut self, expr: Expr) -> Definition {
        let depends = self.analyse(&expr);
        Definition { expr, depends }
    }

    /// Next generated label with the given prefix
    pub(super) fn default_label(&mut self, prefix: &str) -> String {
        self.unlabelled += 1;
        format!("{}__{}", prefix, self.unlabelled)
    }

    fn attach_docs(&mut self, idx: usize) {
        if !self.docstack.is_empty() {
            let docs = std::mem::take(&mut self.docstack);
            self.model.symbol_mut(idx).docs.extend(docs);
        }
    }

    /// Make `target` a root, counting a conflict if it already is one
    pub(super) fn claim_root(&mut self, idx: usize, target: &str) {
        if self.model.is_root(target) {
            self.model.symbol_mut(idx).conflicts += 1;
            self.diags
                .warn(format!("Symbol '{}' is defined as a root more than once", target));
        } else {
            self.model.roots.push(target.to_string());
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Statement handlers
    // ───────────────────────────────────────────────────────────────────────────

    fn process_diffeqn(&mut self, target: &str, expr: &Expr, aux: &[AuxTerm]) {
        self.diags.message(format!(
            "Processing differential equation for variable: {}",
            target
        ));
        let idx = self.declare(target);
        self.attach_docs(idx);
        self.claim_root(idx, target);
        push_unique(&mut self.model.diffs, std::slice::from_ref(&target.to_string()));

        let def = self.definition(expr.clone());
        let symbol = self.model.symbol_mut(idx);
        symbol.depend_on(&def.depends);
        symbol.diffs.push(def);

        let auxes: Vec<Auxiliary> = aux
            .iter()
            .map(|a| Auxiliary {
                coefficient: a.coefficient,
                target: a.target.clone(),
            })
            .collect();
        if !auxes.is_empty() {
            self.model.diagonal = false;
        }
        self.model.auxiliaries.insert(target.to_string(), auxes);
    }

    fn process_algeqn(&mut self, target: &str, lhs: Option<&Expr>, rhs: &Expr) {
        self.diags.message(format!(
            "Processing algebraic relation for variable: {}",
            target
        ));
        let idx = self.declare(target);
        self.attach_docs(idx);
        self.claim_root(idx, target);
        push_unique(&mut self.model.algs, std::slice::from_ref(&target.to_string()));

        // solved as `residual == 0`
        let residual = match lhs {
            Some(lhs) if !lhs.is_literal(0.0) => Expr::sub(rhs.clone(), lhs.clone()),
            _ => rhs.clone(),
        };
        let def = self.definition(residual);
        let symbol = self.model.symbol_mut(idx);
        symbol.depend_on(&def.depends);
        symbol.algs.push(def);
    }

    fn process_assign(&mut self, target: &str, expr: &Expr, init: bool) {
        self.diags
            .detail(format!("Processing assignment to variable: {}", target));
        let idx = self.declare(target);
        self.attach_docs(idx);
        self.model.assigned.insert(target.to_string());

        let def = self.definition(expr.clone());
        let symbol = self.model.symbol_mut(idx);
        symbol.depend_on(&def.depends);
        symbol.assigns.push(AssignExpr {
            expr: def.expr,
            depends: def.depends,
            init,
        });
    }

    fn process_constraint(&mut self, decl: &ConstraintDecl) {
        self.diags.detail(format!(
            "Processing {} bound on variable: {}",
            decl.kind, decl.target
        ));
        let idx = self.declare(&decl.target);
        self.attach_docs(idx);

        let def = self.definition(decl.bound.clone());
        let symbol = self.model.symbol_mut(idx);
        symbol.depend_on(&def.depends);
        symbol.constraints.push(Constraint {
            kind: decl.kind,
            test: decl.test.inverted(),
            bound: def.expr,
            depends: def.depends,
        });
    }

    fn process_version(&mut self, version: &str) {
        if self.model.version.is_some() {
            self.diags
                .warn(format!("Ignoring additional version directive: {}", version));
        } else {
            self.diags.message(format!("Model version is: {}", version));
            self.model.version = Some(version.to_string());
        }
    }

    /// Doc lines stack up until an equation claims them; an `@` line hands
    /// them to the listed symbols, or to the model when none are listed
    fn process_doc(&mut self, text: &str) {
        self.model.docs.push(text.to_string());

        let Some(targets) = text.strip_prefix('@') else {
            self.docstack.push(text.to_string());
            return;
        };

        let docs = std::mem::take(&mut self.docstack);
        let targets: Vec<&str> = targets.split_whitespace().collect();
        if targets.is_empty() {
            self.model.model_docs.extend(docs);
        } else {
            for target in targets {
                let idx = self.declare(target);
                self.model.symbol_mut(idx).docs.extend(docs.iter().cloned());
            }
        }
    }
}

/// Append names not already present
fn push_unique(list: &mut Vec<String>, names: &[String]) {
    for name in names {
        if !list.contains(name) {
            list.push(name.clone());
        }
    }
}
