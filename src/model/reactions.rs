//! Reaction-to-ODE transformation
//!
//! Reactions are recorded as they are processed; once every item has been
//! seen, [`ModelBuilder::transform_reactions`] turns each chemical species into
//! a differential variable whose derivative is the sum of
//! `stoichiometry * rate` over the reactions it takes part in.

use std::collections::{BTreeMap, BTreeSet};

use crate::ast::{BinOp, ChemTerm, Expr, RateLaw, RateTerm, ReactionDecl, ReactionKind};

use super::builder::ModelBuilder;
use super::{Chemical, Constraint, Contribution, Definition, Reaction, Term};

impl ModelBuilder<'_> {
    pub(super) fn process_reaction(&mut self, decl: &ReactionDecl) {
        self.diags.message(format!(
            "Processing reaction '{}' of type: {}",
            decl.label, decl.kind
        ));
        match decl.kind {
            ReactionKind::Influx | ReactionKind::Outflux => self.process_flux(decl),
            ReactionKind::Oneway => {
                let label = self.unique_label(&decl.label, "oneway");
                self.process_oneway(label, &decl.lhs, &decl.rhs, &decl.rate);
            }
            ReactionKind::Twoway => self.process_twoway(decl),
            ReactionKind::Unknown => self
                .diags
                .message("Ignoring reaction of unknown type".to_string()),
        }
    }

    /// `label` if free, else a generated replacement
    fn unique_label(&mut self, label: &str, prefix: &str) -> String {
        let mut label = if label.is_empty() {
            self.default_label(prefix)
        } else {
            label.to_string()
        };
        while self.model.reactions.iter().any(|r| r.label == label) {
            let replacement = self.default_label(prefix);
            self.diags.warn(format!(
                "Duplicate reaction label '{}', substituting '{}'",
                label, replacement
            ));
            label = replacement;
        }
        label
    }

    /// One-sided reactions. Only outflux has reactants, so only outflux can
    /// derive a concentration factor from its rate law.
    fn process_flux(&mut self, decl: &ReactionDecl) {
        let tag = decl.kind.to_string();
        let label = self.unique_label(&decl.label, &tag);

        let (lhs, rhs, rate) = if decl.kind == ReactionKind::Outflux {
            let lhs = self.chem_terms(&decl.lhs, true);
            let rate = self.rate(&decl.rate, Some(&lhs));
            (lhs, Vec::new(), rate)
        } else {
            let rhs = self.chem_terms(&decl.rhs, false);
            let rate = self.rate(&decl.rate, None);
            (Vec::new(), rhs, rate)
        };

        self.record_reaction(label, decl.kind, lhs, rhs, rate);
    }

    fn process_oneway(&mut self, label: String, lhs: &[ChemTerm], rhs: &[ChemTerm], rate: &RateTerm) {
        self.diags
            .detail(format!("Processing oneway reaction '{}'", label));
        let lhs = self.chem_terms(lhs, true);
        let rhs = self.chem_terms(rhs, false);
        let rate = self.rate(rate, Some(&lhs));
        self.record_reaction(label, ReactionKind::Oneway, lhs, rhs, rate);
    }

    /// Split into a forward and a reverse oneway reaction
    fn process_twoway(&mut self, decl: &ReactionDecl) {
        let label = if decl.label.is_empty() {
            self.default_label("twoway")
        } else {
            decl.label.clone()
        };
        self.diags
            .detail(format!("Processing twoway reaction '{}'", label));

        let forward = self.unique_label(&format!("{}_forward", label), "oneway");
        self.process_oneway(forward, &decl.lhs, &decl.rhs, &decl.rate);

        let reverse = self.unique_label(&format!("{}_reverse", label), "oneway");
        match &decl.reverse_rate {
            Some(rate) => self.process_oneway(reverse, &decl.rhs, &decl.lhs, rate),
            None => {
                self.diags.warn(format!(
                    "Twoway reaction '{}' has no reverse rate, skipping reverse reaction",
                    label
                ));
            }
        }
    }

    fn record_reaction(
        &mut self,
        label: String,
        kind: ReactionKind,
        lhs: Vec<Term>,
        rhs: Vec<Term>,
        rate: Definition,
    ) {
        let chems = consolidate(&lhs, &rhs);
        self.model.reactions.push(Reaction {
            label,
            kind,
            lhs,
            rhs,
            rate,
            chems,
        });
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Terms
    // ───────────────────────────────────────────────────────────────────────────

    fn chem_terms(&mut self, terms: &[ChemTerm], reactant: bool) -> Vec<Term> {
        terms
            .iter()
            .map(|term| {
                let mut depends = self.analyse(&term.stoich);
                let stoich = if reactant {
                    Expr::mul(Expr::literal(-1.0), term.stoich.clone())
                } else {
                    term.stoich.clone()
                };
                let chem = self.process_chemical(term);
                if let Some(symbol) = self.model.symbol(&chem) {
                    depends.extend(symbol.depends.iter().cloned());
                }
                Term {
                    chem,
                    stoich,
                    declared: term.stoich.clone(),
                    depends,
                }
            })
            .collect()
    }

    /// Register a chemical species, returning its symbol name
    fn process_chemical(&mut self, term: &ChemTerm) -> String {
        let name = term.name();
        if !self.model.chemicals.iter().any(|c| c.name == name) {
            self.model.chemicals.push(Chemical {
                name: name.clone(),
                compartment: term.compartment.clone(),
            });
        }

        if let Some(compartment) = &term.compartment {
            self.declare(compartment);
        }
        let idx = self.declare(&name);
        let symbol = self.model.symbol_mut(idx);
        if let Some(compartment) = &term.compartment {
            symbol.depend_on(&BTreeSet::from([compartment.clone()]));
        }

        let non_negative = Constraint::non_negative();
        if !symbol.constraints.contains(&non_negative) {
            symbol.constraints.push(non_negative);
        }
        name
    }

    fn compartment_of(&self, chem: &str) -> Option<String> {
        self.model
            .chemicals
            .iter()
            .find(|c| c.name == chem)
            .and_then(|c| c.compartment.clone())
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Rate laws
    // ───────────────────────────────────────────────────────────────────────────

    fn rate(&mut self, rate: &RateTerm, lhs: Option<&[Term]>) -> Definition {
        match rate.law {
            RateLaw::Explicit => self.explicit_rate(rate),
            RateLaw::MassAction => self.mass_action_rate(rate, lhs),
            RateLaw::MichaelisMenten => self.michaelis_menten_rate(rate, lhs),
            RateLaw::Unknown => {
                self.diags
                    .warn("Unknown rate type, treating as explicit".to_string());
                self.explicit_rate(rate)
            }
        }
    }

    fn failed_rate(&mut self, reason: &str) -> Definition {
        self.diags.warn(reason.to_string());
        Definition {
            expr: Expr::failure(reason),
            depends: BTreeSet::new(),
        }
    }

    fn explicit_rate(&mut self, rate: &RateTerm) -> Definition {
        self.diags.detail("Processing explicit rate term");
        let Some(first) = rate.args.first() else {
            return self.failed_rate("Rate term has no arguments, skipping!");
        };
        if rate.args.len() > 1 {
            self.diags
                .warn("More than 1 rate term supplied, ignoring excess".to_string());
        }
        self.definition(first.clone())
    }

    /// `k * prod(chem^exp) / prod(compartment)`, exponents taken from the
    /// extra arguments in reactant order
    fn mass_action_rate(&mut self, rate: &RateTerm, lhs: Option<&[Term]>) -> Definition {
        self.diags.detail("Processing mass action rate term");
        let Some(constant) = rate.args.first() else {
            return self.failed_rate("Mass action rate term has no rate constant, skipping!");
        };
        if rate.args.len() > 1 {
            self.diags.detail(
                "More than 1 rate term supplied, extras will be taken as concentration exponents",
            );
        }
        let mut def = self.definition(constant.clone());

        let Some(lhs) = lhs else {
            self.diags
                .detail("Reaction has no LHS, omitting concentration dependence");
            return def;
        };

        let mut numerator = Vec::new();
        let mut denominator = Vec::new();
        for (i, term) in lhs.iter().enumerate() {
            let conc = Expr::symbol(term.chem.clone());
            match rate.args.get(i + 1) {
                Some(exponent) => {
                    def.depends.extend(self.analyse(exponent));
                    numerator.push(Expr::pow(conc, exponent.clone()));
                }
                None => numerator.push(conc),
            }
            if let Some(compartment) = self.compartment_of(&term.chem) {
                denominator.push(Expr::symbol(compartment));
            }

            def.depends.insert(term.chem.clone());
            if let Some(symbol) = self.model.symbol(&term.chem) {
                def.depends.extend(symbol.depends.iter().cloned());
            }
        }

        let Some(mut factor) = Expr::fold_with(BinOp::Mul, numerator.into_iter()) else {
            return def;
        };
        if let Some(volume) = Expr::fold_with(BinOp::Mul, denominator.into_iter()) {
            factor = Expr::div(factor, volume);
        }
        def.expr = Expr::mul(def.expr, factor);
        def
    }

    /// `Vmax * prod(chem^s) / prod(Km^s + chem^s)`, with one Km per reactant
    fn michaelis_menten_rate(&mut self, rate: &RateTerm, lhs: Option<&[Term]>) -> Definition {
        self.diags.detail("Processing Michaelis-Menten rate term");
        let lhs = match lhs {
            Some(lhs) if !lhs.is_empty() => lhs,
            _ => {
                return self.failed_rate(
                    "Michaelis-Menten rate term requires reactants, skipping!",
                )
            }
        };
        if rate.args.len() != lhs.len() + 1 {
            return self.failed_rate("Incorrect parameters for Michaelis-Menten rate term, skipping!");
        }

        let vmax = self.definition(rate.args[0].clone());
        let mut depends = vmax.depends;
        let mut numerator = vec![vmax.expr];
        let mut denominator = Vec::new();

        for (term, km) in lhs.iter().zip(&rate.args[1..]) {
            depends.extend(self.analyse(km));
            depends.extend(term.depends.iter().cloned());
            depends.insert(term.chem.clone());

            let conc = Expr::symbol(term.chem.clone());
            let (conc_pwr, km_pwr) = if term.declared.is_literal(1.0) {
                (conc, km.clone())
            } else {
                (
                    Expr::pow(conc, term.declared.clone()),
                    Expr::pow(km.clone(), term.declared.clone()),
                )
            };
            numerator.push(conc_pwr.clone());
            denominator.push(Expr::add(km_pwr, conc_pwr));
        }

        let expr = match (
            Expr::fold_with(BinOp::Mul, numerator.into_iter()),
            Expr::fold_with(BinOp::Mul, denominator.into_iter()),
        ) {
            (Some(num), Some(den)) => Expr::div(num, den),
            _ => Expr::failure("empty Michaelis-Menten rate"),
        };
        Definition { expr, depends }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Transformation
    // ───────────────────────────────────────────────────────────────────────────

    /// Give every chemical a differential equation built from its reactions
    pub(super) fn transform_reactions(&mut self) {
        if self.model.reactions.is_empty() {
            return;
        }
        self.diags.message("Transforming reactions to ODEs");

        let chems: Vec<String> = self.model.chemicals.iter().map(|c| c.name.clone()).collect();
        for chem in chems {
            let idx = self.declare(&chem);
            self.claim_root(idx, &chem);
            if !self.model.diffs.contains(&chem) {
                self.model.diffs.push(chem.clone());
            }
            self.model.auxiliaries.entry(chem.clone()).or_default();

            let mut depends = BTreeSet::new();
            let mut terms = Vec::new();
            for reaction in &self.model.reactions {
                if let Some(contribution) = reaction.chems.get(&chem) {
                    depends.extend(reaction.rate.depends.iter().cloned());
                    depends.extend(contribution.depends.iter().cloned());
                    terms.push(Expr::mul(
                        contribution.stoich.clone(),
                        reaction.rate.expr.clone(),
                    ));
                }
            }

            let expr = Expr::fold_with(BinOp::Add, terms.into_iter())
                .unwrap_or(Expr::Literal(0.0));
            let symbol = self.model.symbol_mut(idx);
            symbol.depend_on(&depends);
            symbol.diffs.push(Definition { expr, depends });
        }
    }
}

/// Net stoichiometry per chemical; a species on both sides sums its terms
fn consolidate(lhs: &[Term], rhs: &[Term]) -> BTreeMap<String, Contribution> {
    let mut chems: BTreeMap<String, Contribution> = BTreeMap::new();
    for term in lhs.iter().chain(rhs) {
        match chems.get_mut(&term.chem) {
            Some(existing) => {
                existing.stoich = Expr::add(existing.stoich.clone(), term.stoich.clone());
                existing.depends.extend(term.depends.iter().cloned());
            }
            None => {
                chems.insert(
                    term.chem.clone(),
                    Contribution {
                        stoich: term.stoich.clone(),
                        depends: term.depends.clone(),
                    },
                );
            }
        }
    }
    chems
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Item;
    use crate::diagnostics::{Diagnostics, Level};
    use crate::model::Model;

    fn chem(name: &str) -> ChemTerm {
        ChemTerm {
            stoich: Expr::literal(1.0),
            chemical: name.to_string(),
            compartment: None,
        }
    }

    fn reaction(kind: ReactionKind, lhs: Vec<ChemTerm>, rhs: Vec<ChemTerm>, rate: RateTerm) -> Item {
        Item::Reaction(ReactionDecl {
            kind,
            label: String::new(),
            lhs,
            rhs,
            rate,
            reverse_rate: None,
        })
    }

    fn build(items: Vec<Item>) -> (Model, Diagnostics) {
        let mut diags = Diagnostics::new();
        let model = {
            let mut builder = ModelBuilder::new("t", &mut diags);
            for item in &items {
                builder.process(item);
            }
            builder.finish(false).expect("Should build model")
        };
        (model, diags)
    }

    #[test]
    fn test_twoway_splits_into_forward_and_reverse() {
        let (model, _) = build(vec![Item::Reaction(ReactionDecl {
            kind: ReactionKind::Twoway,
            label: "bind".to_string(),
            lhs: vec![chem("A")],
            rhs: vec![chem("B")],
            rate: RateTerm {
                law: RateLaw::MassAction,
                args: vec![Expr::symbol("kf")],
            },
            reverse_rate: Some(RateTerm {
                law: RateLaw::MassAction,
                args: vec![Expr::symbol("kr")],
            }),
        })]);

        let labels: Vec<_> = model.reactions.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["bind_forward", "bind_reverse"]);
        assert_eq!(model.reactions[1].rate.expr.to_string(), "(kr*B)");
        assert_eq!(model.diffs, vec!["A", "B"]);
    }

    #[test]
    fn test_default_and_duplicate_labels() {
        let flux = || {
            Item::Reaction(ReactionDecl {
                kind: ReactionKind::Influx,
                label: "in".to_string(),
                lhs: vec![],
                rhs: vec![chem("A")],
                rate: RateTerm {
                    law: RateLaw::Explicit,
                    args: vec![Expr::symbol("v")],
                },
                reverse_rate: None,
            })
        };
        let (model, diags) = build(vec![
            flux(),
            flux(),
            reaction(
                ReactionKind::Outflux,
                vec![chem("A")],
                vec![],
                RateTerm {
                    law: RateLaw::MassAction,
                    args: vec![Expr::symbol("k")],
                },
            ),
        ]);
        let labels: Vec<_> = model.reactions.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["in", "influx__1", "outflux__2"]);
        assert!(diags.contains(Level::Warning, "Duplicate reaction label 'in'"));
    }

    #[test]
    fn test_compartment_divides_mass_action() {
        let (model, _) = build(vec![reaction(
            ReactionKind::Outflux,
            vec![ChemTerm {
                stoich: Expr::literal(1.0),
                chemical: "A".to_string(),
                compartment: Some("V".to_string()),
            }],
            vec![],
            RateTerm {
                law: RateLaw::MassAction,
                args: vec![Expr::symbol("k")],
            },
        )]);

        assert_eq!(model.reactions[0].rate.expr.to_string(), "(k*(A_V/V))");
        let a = model.symbol("A_V").expect("A_V should exist");
        assert!(a.direct.contains("V"));
        assert_eq!(a.constraints, vec![Constraint::non_negative()]);
    }

    #[test]
    fn test_mass_action_exponents() {
        let (model, _) = build(vec![reaction(
            ReactionKind::Oneway,
            vec![chem("A"), chem("B")],
            vec![chem("C")],
            RateTerm {
                law: RateLaw::MassAction,
                args: vec![Expr::symbol("k"), Expr::literal(2.0)],
            },
        )]);
        assert_eq!(model.reactions[0].rate.expr.to_string(), "(k*((A^2)*B))");
    }

    #[test]
    fn test_michaelis_menten() {
        let (model, _) = build(vec![reaction(
            ReactionKind::Oneway,
            vec![chem("S")],
            vec![chem("P")],
            RateTerm {
                law: RateLaw::MichaelisMenten,
                args: vec![Expr::symbol("Vmax"), Expr::symbol("Km")],
            },
        )]);
        let rate = &model.reactions[0].rate;
        assert_eq!(rate.expr.to_string(), "((Vmax*S)/(Km+S))");
        assert!(rate.depends.contains("S"));
        assert!(rate.depends.contains("Km"));
    }

    #[test]
    fn test_michaelis_menten_wrong_arity_fails() {
        let (model, diags) = build(vec![reaction(
            ReactionKind::Oneway,
            vec![chem("S")],
            vec![chem("P")],
            RateTerm {
                law: RateLaw::MichaelisMenten,
                args: vec![Expr::symbol("Vmax")],
            },
        )]);
        assert!(model.reactions[0].rate.expr.is_failure());
        assert!(diags.contains(Level::Warning, "Michaelis-Menten"));
        // the failure still reaches the species equations
        let p = model.symbol("P").expect("P should exist");
        assert!(p.diffs[0].expr.is_failure());
    }

    #[test]
    fn test_unknown_reaction_kind_is_skipped() {
        let (model, diags) = build(vec![reaction(
            ReactionKind::Unknown,
            vec![chem("A")],
            vec![],
            RateTerm {
                law: RateLaw::Explicit,
                args: vec![Expr::symbol("k")],
            },
        )]);
        assert!(model.reactions.is_empty());
        assert!(model.roots.is_empty());
        assert!(diags.contains(Level::Message, "unknown type"));
    }

    #[test]
    fn test_species_on_both_sides_nets_out() {
        let (model, _) = build(vec![reaction(
            ReactionKind::Oneway,
            vec![chem("E"), chem("S")],
            vec![chem("E"), chem("P")],
            RateTerm {
                law: RateLaw::Explicit,
                args: vec![Expr::symbol("v")],
            },
        )]);
        let e = &model.reactions[0].chems["E"];
        assert!(e.stoich.is_literal(0.0));
    }
}
