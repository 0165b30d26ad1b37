//! Human-readable model reports
//!
//! [`summary`] is the plain-text digest printed after a compilation, and
//! [`graphviz`] renders the direct dependency structure as a `dot` digraph.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use crate::ast::Expr;
use crate::config::CompilerConfig;
use crate::error::BcmdError;
use crate::model::Model;

fn sorted_lower<'a, I>(names: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut names: Vec<&str> = names.into_iter().map(String::as_str).collect();
    names.sort_by_key(|name| name.to_lowercase());
    names
}

fn write_section<'a, I>(out: &mut String, heading: &str, names: I) -> Result<(), BcmdError>
where
    I: IntoIterator<Item = &'a String>,
{
    let names = sorted_lower(names);
    if names.is_empty() {
        return Ok(());
    }
    writeln!(out, "\n{}", heading)?;
    for name in names {
        writeln!(out, "{}", name)?;
    }
    Ok(())
}

/// Plain-text summary of the analysed model
pub fn summary(model: &Model, config: &CompilerConfig) -> Result<String, BcmdError> {
    let mut out = String::new();
    let unused_in = |names: &[String]| names.iter().filter(|n| model.unused.contains(*n)).count();

    writeln!(out, "** summary for model {} **", config.name)?;
    writeln!(
        out,
        "{} model variables ({} differential, {} algebraic)",
        model.roots.len(),
        model.diffs.len(),
        model.algs.len()
    )?;
    writeln!(
        out,
        "{} intermediate variables ({} unused)",
        model.intermeds.len(),
        unused_in(model.intermeds.as_slice())
    )?;
    writeln!(
        out,
        "{} parameters ({} unused)",
        model.params.len(),
        unused_in(model.params.as_slice())
    )?;
    writeln!(out, "{} unsatisfied external dependencies", model.externs.len())?;

    writeln!(out, "\n** equations **")?;
    for name in &model.diffs {
        let Some(sym) = model.symbol(name) else {
            continue;
        };
        let tag = if sym.conflicts > 0 { "[CONFLICT-?] " } else { "" };
        let mut lhs = format!("{}'", name);
        for aux in model.auxiliaries.get(name).into_iter().flatten() {
            let op = if aux.coefficient < 0.0 { '-' } else { '+' };
            write!(
                lhs,
                " {} {} {}'",
                op,
                Expr::Literal(aux.coefficient.abs()),
                aux.target
            )?;
        }
        for def in &sym.diffs {
            writeln!(out, "{}{} = {}", tag, lhs, def.expr)?;
        }
    }
    for name in &model.algs {
        let Some(sym) = model.symbol(name) else {
            continue;
        };
        let tag = if sym.conflicts > 0 { "[CONFLICT-?] " } else { "" };
        for def in &sym.algs {
            writeln!(out, "{}f({}) : 0 = {}", tag, name, def.expr)?;
        }
    }

    writeln!(out, "\n** dependency analysis **")?;
    writeln!(out, "The following solver variables are used in the model:")?;
    for name in sorted_lower(&model.diffs)
        .into_iter()
        .chain(sorted_lower(&model.algs))
    {
        writeln!(out, "{}", name)?;
    }

    write_section(
        &mut out,
        "The following symbols are declared as inputs:",
        &model.inputs,
    )?;
    write_section(
        &mut out,
        "The following symbols are parameters, independent of the solver variables:",
        &model.params,
    )?;
    write_section(
        &mut out,
        "The following symbols are intermediates, with solver variable dependencies:",
        &model.intermeds,
    )?;
    write_section(
        &mut out,
        "The following intermediate variables or parameters are declared but unused:",
        &model.unused,
    )?;
    if !model.unused.is_empty() {
        let note = if config.omit_unused {
            "(NB: unused variables will NOT be calculated)"
        } else {
            "(NB: unused variables will still be calculated)"
        };
        writeln!(out, "{}", note)?;
    }

    write_section(
        &mut out,
        "The following symbols are not documented:",
        model
            .symbols
            .iter()
            .filter(|s| !s.is_documented())
            .map(|s| &s.id),
    )?;
    write_section(
        &mut out,
        "The following symbols are never explicitly assigned (will default to 0):",
        model
            .symbols
            .iter()
            .filter(|s| s.id != model.independent && !model.assigned.contains(&s.id))
            .map(|s| &s.id),
    )?;
    write_section(
        &mut out,
        "The following external dependencies are declared but unsatisfied:",
        &model.externs,
    )?;
    write_section(
        &mut out,
        "The model makes use of the following non-standard functions:",
        &model.unknown,
    )?;

    let circular: Vec<_> = model.symbols.iter().filter(|s| s.circular).collect();
    if !circular.is_empty() {
        writeln!(out, "\nCircular dependencies:")?;
        for sym in circular {
            if model.is_root(&sym.id) {
                writeln!(out, "{} (is a solver var)", sym.id)?;
            } else if model.unused.contains(&sym.id) {
                writeln!(out, "{} (unused)", sym.id)?;
            } else {
                let roots: Vec<&str> = sym
                    .depends
                    .iter()
                    .filter(|d| model.is_root(d))
                    .map(String::as_str)
                    .collect();
                if roots.is_empty() {
                    writeln!(out, "{} (no LHS dependencies)", sym.id)?;
                } else {
                    writeln!(out, "{} {{{}}}", sym.id, roots.join(", "))?;
                }
            }
        }
    }

    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dependency graph
// ═══════════════════════════════════════════════════════════════════════════════

/// Which elements [`graphviz`] leaves out
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphOptions {
    /// Drop unused symbols and their edges instead of dashing them
    pub exclude_unused: bool,
    /// Drop initialiser-only parameters and edges
    pub exclude_init: bool,
    /// Do not group symbols into clusters by their first tag
    pub exclude_clusters: bool,
    /// Draw `x -> x` edges for direct self-dependencies
    pub include_self: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeClass {
    Diff,
    Alg,
    Intermed,
    Param,
    Input,
    Output,
    Extern,
    Unknown,
}

impl NodeClass {
    /// `dot` attributes for the node, by initialiser-only and unused flags
    fn style(self, init: bool, unused: bool) -> &'static str {
        match (self, init, unused) {
            (Self::Diff, ..) => r#"[shape=doublecircle, fillcolor=orange, style="filled,solid", color=black]"#,
            (Self::Alg, ..) => r#"[shape=doublecircle, fillcolor=olivedrab1, style="filled,solid", color=black]"#,
            (Self::Intermed, false, false) => r#"[shape=circle, fillcolor=lightskyblue, style="filled,solid", color=black]"#,
            (Self::Intermed, true, false) => r#"[shape=circle, fillcolor=lightskyblue, style="filled,solid", color=chocolate]"#,
            (Self::Intermed, _, true) => r#"[shape=circle, fillcolor=lightskyblue, style="filled,dashed", color=black]"#,
            (Self::Param, false, false) => r#"[shape=box, fillcolor=lemonchiffon, style="filled,solid", color=salmon, fontsize=12]"#,
            (Self::Param, true, false) => r#"[shape=box, fillcolor=white, style="filled,solid", color=lightsalmon, fontsize=12]"#,
            (Self::Param, false, true) => r#"[shape=box, fillcolor=lemonchiffon, style="filled,dashed", color=salmon, fontsize=12]"#,
            (Self::Param, true, true) => r#"[shape=box, fillcolor=white, style="filled,dashed", color=lightsalmon, fontsize=12]"#,
            (Self::Input, ..) => r#"[shape=box, fillcolor=lightsalmon, style="filled,solid", color=black]"#,
            (Self::Output, ..) => r#"[shape=box, fillcolor=lemonchiffon, style="filled,solid", color=black]"#,
            (Self::Extern, ..) => r##"[shape=box, fillcolor="#dcffdc", style="filled,solid", color=black]"##,
            (Self::Unknown, ..) => UNKNOWN_STYLE,
        }
    }
}

const UNKNOWN_STYLE: &str = "[shape=box, style=dotted, color=red, fontsize=12]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeClass {
    Diff,
    Alg,
    Assign,
}

impl EdgeClass {
    fn style(self, init: bool, unused: bool) -> &'static str {
        match (self, init, unused) {
            (Self::Diff, _, false) => "[style=solid, arrowhead=empty, color=royalblue4]",
            (Self::Diff, _, true) => "[style=dashed, arrowhead=empty, color=royalblue4]",
            (Self::Alg, _, false) => "[style=solid, arrowhead=empty, color=darkorchid4]",
            (Self::Alg, _, true) => "[style=dashed, arrowhead=empty, color=darkorchid4]",
            (Self::Assign, false, false) => "[style=solid, arrowhead=empty, color=deeppink4]",
            (Self::Assign, false, true) => "[style=dashed, arrowhead=empty, color=deeppink4]",
            (Self::Assign, true, false) => "[style=solid, arrowhead=empty, color=salmon]",
            (Self::Assign, true, true) => "[style=dashed, arrowhead=empty, color=salmon]",
        }
    }
}

#[derive(Debug)]
struct Node {
    class: NodeClass,
    unused: bool,
    init: bool,
    init_unused: bool,
    out: Vec<usize>,
}

#[derive(Debug)]
struct Edge {
    from: String,
    to: String,
    class: EdgeClass,
    unused: bool,
    init: bool,
    init_unused: bool,
}

/// Attributed nodes, edges and tag clusters of a model
struct Graph {
    nodes: HashMap<String, Node>,
    edges: Vec<Edge>,
    clusters: BTreeMap<String, Vec<String>>,
}

impl Graph {
    fn classify(model: &Model) -> Self {
        let mut nodes: HashMap<String, Node> = HashMap::new();
        let add = |nodes: &mut HashMap<String, Node>, name: &str, class, unused| {
            nodes.entry(name.to_string()).or_insert(Node {
                class,
                unused,
                init: false,
                init_unused: false,
                out: Vec::new(),
            });
        };

        for name in &model.inputs {
            add(&mut nodes, name, NodeClass::Input, false);
        }
        for name in &model.diffs {
            nodes.remove(name);
            add(&mut nodes, name, NodeClass::Diff, false);
        }
        for name in &model.algs {
            nodes.remove(name);
            add(&mut nodes, name, NodeClass::Alg, false);
        }
        for name in &model.intermeds {
            add(&mut nodes, name, NodeClass::Intermed, model.unused.contains(name));
        }
        for name in &model.externs {
            add(&mut nodes, name, NodeClass::Extern, model.unused.contains(name));
        }
        for name in &model.params {
            // parameters driven by an input behave like intermediates
            let driven = model
                .symbol(name)
                .is_some_and(|s| s.depends.iter().any(|d| model.inputs.contains(d)));
            if driven {
                add(&mut nodes, name, NodeClass::Intermed, false);
            } else {
                add(&mut nodes, name, NodeClass::Param, model.unused.contains(name));
            }
        }
        for name in &model.outputs {
            add(&mut nodes, name, NodeClass::Output, false);
        }

        let mut edges: Vec<Edge> = Vec::new();
        let mut keys: HashMap<(String, String), usize> = HashMap::new();
        let mut clusters: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for sym in &model.symbols {
            add(&mut nodes, &sym.id, NodeClass::Unknown, model.unused.contains(&sym.id));
            if let Some(tag) = sym.tags.first() {
                clusters
                    .entry(format!("cluster_{}", tag))
                    .or_default()
                    .push(sym.id.clone());
            }

            let defs = sym
                .diffs
                .iter()
                .map(|d| (EdgeClass::Diff, &d.depends))
                .chain(sym.algs.iter().map(|d| (EdgeClass::Alg, &d.depends)));
            for (class, depends) in defs {
                for dep in depends {
                    let key = (dep.clone(), sym.id.clone());
                    let edge = Edge {
                        from: dep.clone(),
                        to: sym.id.clone(),
                        class,
                        unused: false,
                        init: false,
                        init_unused: false,
                    };
                    match keys.get(&key) {
                        Some(&i) => edges[i] = edge,
                        None => {
                            keys.insert(key, edges.len());
                            edges.push(edge);
                        }
                    }
                }
            }

            let is_param = nodes
                .get(&sym.id)
                .is_some_and(|n| n.class == NodeClass::Param);
            for assign in &sym.assigns {
                for dep in &assign.depends {
                    let key = (dep.clone(), sym.id.clone());
                    match keys.get(&key) {
                        Some(&i) => edges[i].init = edges[i].init && assign.init,
                        None => {
                            keys.insert(key, edges.len());
                            edges.push(Edge {
                                from: dep.clone(),
                                to: sym.id.clone(),
                                class: EdgeClass::Assign,
                                unused: model.unused.contains(&sym.id)
                                    || model.unused.contains(dep),
                                init: assign.init && is_param,
                                init_unused: false,
                            });
                        }
                    }
                }
            }
        }

        for (i, edge) in edges.iter().enumerate() {
            if let Some(node) = nodes.get_mut(&edge.from) {
                node.out.push(i);
            }
        }
        for (name, node) in nodes.iter_mut() {
            let all_init = node.out.iter().all(|&i| edges[i].init);
            let all_spare = node.out.iter().all(|&i| edges[i].init || edges[i].unused);
            let free = !model.inputs.contains(name);
            node.init =
                free && node.class == NodeClass::Param && !node.out.is_empty() && all_init;
            node.init_unused =
                free && !model.is_root(name) && !model.required.contains(name) && all_spare;
        }
        for edge in edges.iter_mut() {
            let flagged = |name: &String| nodes.get(name).is_some_and(|n| n.init_unused);
            edge.init_unused = flagged(&edge.from) || flagged(&edge.to);
        }

        Self {
            nodes,
            edges,
            clusters,
        }
    }
}

/// Replace runs of non-alphanumeric characters with `_`
fn sanitise(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut gap = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            gap = false;
        } else if !gap {
            out.push('_');
            gap = true;
        }
    }
    out
}

/// GraphViz `dot` source for the model's direct dependency structure
pub fn graphviz(
    model: &Model,
    config: &CompilerConfig,
    options: &GraphOptions,
) -> Result<String, BcmdError> {
    let graph = Graph::classify(model);
    let mut out = String::new();

    writeln!(
        out,
        "/* GraphViz depiction of the model dependency structure for {} */\n",
        config.name
    )?;
    writeln!(out, "digraph {}_Dependencies {{", sanitise(&config.name))?;

    // inputs first, then params, intermediates and roots
    let reclassified = model.symbols.iter().map(|s| &s.id).filter(|name| {
        graph
            .nodes
            .get(*name)
            .is_some_and(|n| n.class == NodeClass::Intermed)
    });
    let mut order: Vec<&String> = model.inputs.iter().collect();
    for name in model
        .params
        .iter()
        .chain(&model.intermeds)
        .chain(&model.externs)
        .chain(reclassified)
        .chain(&model.algs)
        .chain(&model.diffs)
        .chain(&model.outputs)
    {
        if !order.contains(&name) {
            order.push(name);
        }
    }

    let mut drawn: Vec<&str> = Vec::new();
    for name in order {
        let Some(node) = graph.nodes.get(name) else {
            continue;
        };
        let excluded = (node.init && options.exclude_init)
            || (node.unused && options.exclude_unused)
            || (node.init_unused && options.exclude_init && options.exclude_unused);
        if !excluded {
            writeln!(out, "{} {};", name, node.class.style(node.init, node.unused))?;
            drawn.push(name);
        }
    }

    writeln!(out, "node {};", UNKNOWN_STYLE)?;

    if !options.exclude_clusters {
        for (cluster, members) in &graph.clusters {
            writeln!(out, "subgraph {} {{", sanitise(cluster))?;
            writeln!(out, "style=\"rounded,bold,filled\";")?;
            writeln!(out, "fillcolor=honeydew;")?;
            writeln!(out, "color=darkseagreen;")?;
            for name in members.iter().filter(|m| drawn.contains(&m.as_str())) {
                writeln!(out, "{};", name)?;
            }
            writeln!(out, "}}")?;
        }
    }

    for edge in &graph.edges {
        let excluded = !drawn.contains(&edge.from.as_str())
            || !drawn.contains(&edge.to.as_str())
            || (edge.init && options.exclude_init)
            || (edge.unused && options.exclude_unused)
            || (!options.include_self && edge.from == edge.to)
            || (edge.init_unused && options.exclude_init && options.exclude_unused);
        if !excluded {
            writeln!(
                out,
                "{} -> {} {};",
                edge.from,
                edge.to,
                edge.class.style(edge.init, edge.unused)
            )?;
        }
    }

    writeln!(out, "\noverlap=false")?;
    writeln!(out, "label=\"Dependency Graph for model {}\"", config.name)?;
    writeln!(out, "}}")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Item};
    use crate::diagnostics::Diagnostics;

    fn build(items: Vec<Item>) -> Model {
        let mut diags = Diagnostics::new();
        Model::build(&items, &CompilerConfig::default(), &mut diags).expect("Should build model")
    }

    fn decay() -> Vec<Item> {
        vec![
            Item::DiffEqn {
                target: "x".to_string(),
                expr: Expr::mul(Expr::literal(-1.0), Expr::mul(Expr::symbol("k"), Expr::symbol("x"))),
                aux: vec![],
            },
            Item::Assign {
                target: "k".to_string(),
                expr: Expr::literal(0.5),
                init: false,
            },
            Item::Assign {
                target: "spare".to_string(),
                expr: Expr::symbol("k"),
                init: false,
            },
        ]
    }

    #[test]
    fn test_summary_counts_and_sections() {
        let model = build(decay());
        let config = CompilerConfig::new("decay");
        let text = summary(&model, &config).expect("Should summarise");

        assert!(text.starts_with("** summary for model decay **\n"));
        assert!(text.contains("1 model variables (1 differential, 0 algebraic)"));
        assert!(text.contains("2 parameters (1 unused)"));
        assert!(text.contains("declared but unused:\nspare\n"));
        assert!(text.contains("will still be calculated"));
        assert!(!text.contains("non-standard functions"));
    }

    #[test]
    fn test_graph_styles_unused_and_drops_self_edges() {
        let mut items = decay();
        items.push(Item::Assign {
            target: "x".to_string(),
            expr: Expr::symbol("x"),
            init: true,
        });
        let model = build(items);
        let config = CompilerConfig::new("my-model");

        let dot = graphviz(&model, &config, &GraphOptions::default()).expect("Should render");
        assert!(dot.contains("digraph my_model_Dependencies {"));
        assert!(dot.contains("x [shape=doublecircle"));
        assert!(dot.contains("k -> x [style=solid"));
        assert!(dot.contains("k -> spare [style=dashed"));
        assert!(!dot.contains("x -> x"));

        let options = GraphOptions {
            exclude_unused: true,
            include_self: true,
            ..GraphOptions::default()
        };
        let dot = graphviz(&model, &config, &options).expect("Should render");
        assert!(!dot.contains("spare ["));
        assert!(dot.contains("x -> x"));
    }

    #[test]
    fn test_sanitise() {
        assert_eq!(sanitise("a-b  c"), "a_b_c");
        assert_eq!(sanitise("plain"), "plain");
    }
}
