use bcmd::ast::{ChemTerm, RateLaw, RateTerm, ReactionDecl, ReactionKind};
use bcmd::{compile, CompilerConfig, Diagnostics, Expr, Item, Model};
use criterion::black_box;
use criterion::{criterion_group, criterion_main, Criterion};

/// Linear reaction chain `S0 -> S1 -> ... -> Sn` with one rate constant per step
fn chain(n: usize) -> Vec<Item> {
    let species = |i: usize| ChemTerm {
        stoich: Expr::literal(1.0),
        chemical: format!("S{}", i),
        compartment: Some("cell".to_string()),
    };

    let mut items = vec![Item::Assign {
        target: "cell".to_string(),
        expr: Expr::literal(1.0),
        init: false,
    }];
    for i in 0..n {
        items.push(Item::Reaction(ReactionDecl {
            kind: ReactionKind::Oneway,
            label: format!("step{}", i),
            lhs: vec![species(i)],
            rhs: vec![species(i + 1)],
            rate: RateTerm {
                law: RateLaw::MassAction,
                args: vec![Expr::symbol(format!("k{}", i))],
            },
            reverse_rate: None,
        }));
        items.push(Item::Assign {
            target: format!("k{}", i),
            expr: Expr::mul(Expr::literal(0.1), Expr::symbol("temp")),
            init: false,
        });
        items.push(Item::Assign {
            target: format!("flux{}", i),
            expr: Expr::mul(
                Expr::symbol(format!("k{}", i)),
                Expr::symbol(format!("S{}_cell", i)),
            ),
            init: false,
        });
    }
    items.push(Item::Assign {
        target: "temp".to_string(),
        expr: Expr::literal(310.0),
        init: true,
    });
    items
}

fn analyse(items: &[Item]) {
    let mut diags = Diagnostics::new();
    let model = Model::build(items, &CompilerConfig::default(), &mut diags);
    black_box(model.map(|m| m.symbols.len()).ok());
}

fn generate(items: &[Item]) {
    let mut diags = Diagnostics::new();
    let code = compile(items, &CompilerConfig::new("chain"), &mut diags);
    black_box(code.map(|c| c.source.len()).ok());
}

fn criterion_benchmark(c: &mut Criterion) {
    let small = chain(10);
    let large = chain(200);

    c.bench_function("analyse chain 10", |b| b.iter(|| analyse(black_box(&small))));
    c.bench_function("analyse chain 200", |b| b.iter(|| analyse(black_box(&large))));
    c.bench_function("compile chain 10", |b| b.iter(|| generate(black_box(&small))));
    c.bench_function("compile chain 200", |b| b.iter(|| generate(black_box(&large))));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
