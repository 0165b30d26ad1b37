//! Dependency closure and classification

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::diagnostics::Diagnostics;

use super::builder::ModelBuilder;
use super::{Symbol, STD_FUNCS};

/// Close `symbols[idx].depends` over the dependency graph
///
/// A symbol met again on its own ancestor chain is flagged circular and that
/// branch stops there, so its set stays partial. Only expansions that never
/// reached a circular symbol are recorded in `done`; anything else is expanded
/// again on a later visit and picks up the completed sets.
pub(crate) fn recurse_dependencies(
    symbols: &mut [Symbol],
    lookup: &HashMap<String, usize>,
    idx: usize,
    ancestors: &mut Vec<usize>,
    done: &mut HashSet<usize>,
    diags: &mut Diagnostics,
) -> BTreeSet<String> {
    expand(symbols, lookup, idx, ancestors, done, diags);
    symbols[idx].depends.clone()
}

/// Returns whether the set of `idx` is complete
fn expand(
    symbols: &mut [Symbol],
    lookup: &HashMap<String, usize>,
    idx: usize,
    ancestors: &mut Vec<usize>,
    done: &mut HashSet<usize>,
    diags: &mut Diagnostics,
) -> bool {
    if done.contains(&idx) {
        return true;
    }
    if ancestors.contains(&idx) {
        if !symbols[idx].circular {
            diags.detail(format!("Circular dependency found for {}", symbols[idx].id));
            symbols[idx].circular = true;
        }
        return false;
    }
    if symbols[idx].circular {
        diags.detail(format!("Previous circularity noted for {}", symbols[idx].id));
        return false;
    }

    let direct: Vec<usize> = symbols[idx]
        .depends
        .iter()
        .filter_map(|dep| lookup.get(dep).copied())
        .collect();

    let mut complete = true;
    ancestors.push(idx);
    for dep in direct {
        complete &= expand(symbols, lookup, dep, ancestors, done, diags);
        let closed = symbols[dep].depends.clone();
        symbols[idx].depends.extend(closed);
    }
    ancestors.pop();

    if complete {
        done.insert(idx);
    }
    complete
}

impl ModelBuilder<'_> {
    pub(super) fn close_dependencies(&mut self) {
        let lookup: HashMap<String, usize> = self
            .model
            .symbols
            .iter()
            .map(|s| (s.id.clone(), s.index))
            .collect();
        let mut done = HashSet::new();
        for idx in 0..self.model.symbols.len() {
            let mut ancestors = Vec::new();
            recurse_dependencies(
                &mut self.model.symbols,
                &lookup,
                idx,
                &mut ancestors,
                &mut done,
                self.diags,
            );
        }
    }

    /// Split non-root symbols into intermediates, which depend on a solver
    /// variable, and parameters, which do not
    pub(super) fn classify(&mut self) {
        let roots: BTreeSet<&str> = self.model.roots.iter().map(String::as_str).collect();
        let mut params = Vec::new();
        let mut intermeds = Vec::new();
        for symbol in &self.model.symbols {
            if roots.contains(symbol.id.as_str()) || symbol.id == self.model.independent {
                continue;
            }
            if symbol.depends.iter().any(|d| roots.contains(d.as_str())) {
                intermeds.push(symbol.id.clone());
            } else {
                params.push(symbol.id.clone());
            }
        }
        self.model.params = params;
        self.model.intermeds = intermeds;
    }

    /// Keep declared outputs that exist, defaulting to every root
    pub(super) fn finalise_outputs(&mut self) {
        let model = &mut self.model;
        let present: Vec<String> = model
            .outputs
            .iter()
            .filter(|name| model.lookup.contains_key(*name))
            .cloned()
            .collect();
        if present.len() < model.outputs.len() {
            self.diags.detail(format!(
                "Ignoring {} output field(s) that are never defined",
                model.outputs.len() - present.len()
            ));
        }
        model.outputs = if present.is_empty() {
            model.roots.clone()
        } else {
            present
        };
    }

    /// Externs are the declared names that exist and are never assigned
    pub(super) fn finalise_externs(&mut self) {
        let model = &mut self.model;
        let externs: Vec<String> = model
            .externs
            .iter()
            .filter(|name| model.lookup.contains_key(*name) && !model.assigned.contains(*name))
            .cloned()
            .collect();
        model.externs = externs;
    }

    pub(super) fn find_required(&mut self) {
        let model = &mut self.model;
        let mut required = BTreeSet::new();
        for name in model.roots.iter().chain(model.outputs.iter()) {
            required.insert(name.clone());
            if let Some(symbol) = model.symbol(name) {
                required.extend(symbol.depends.iter().cloned());
            }
        }

        model.unused = model
            .symbols
            .iter()
            .map(|s| &s.id)
            .filter(|id| {
                !required.contains(*id) && !model.is_root(id) && **id != model.independent
            })
            .cloned()
            .collect();
        model.required = required;
    }

    pub(super) fn classify_functions(&mut self) {
        let model = &mut self.model;
        let (known, unknown): (BTreeSet<String>, BTreeSet<String>) = model
            .functions
            .iter()
            .cloned()
            .partition(|f| STD_FUNCS.contains(&f.as_str()));
        model.known = known;
        model.unknown = unknown;
    }

    /// Apply doc annotations: `+` adds tags, `$` sets LaTeX, `~` sets units
    pub(super) fn postprocess_docs(&mut self) {
        let model = &mut self.model;
        for symbol in &mut model.symbols {
            for line in &symbol.docs {
                if let Some(tags) = line.strip_prefix('+') {
                    symbol.tags.extend(
                        tags.trim_start_matches('+')
                            .split_whitespace()
                            .map(str::to_string),
                    );
                } else if let Some(latex) = line.strip_prefix('$') {
                    symbol.latex = Some(latex.trim_matches('$').trim().to_string());
                } else if let Some(units) = line.strip_prefix('~') {
                    symbol.units = Some(units.trim_start_matches('~').trim().to_string());
                }
            }
            for tag in &symbol.tags {
                model
                    .tags
                    .entry(tag.clone())
                    .or_default()
                    .push(symbol.id.clone());
            }
        }
    }
}
