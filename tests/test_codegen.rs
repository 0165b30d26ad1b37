//! Integration tests for C code generation

use approx::assert_relative_eq;
use bcmd::codegen::{c_number, CPrinter, Context};
use bcmd::{parse_items, CodeGenerator, CompilerConfig, Diagnostics, Level, Model};

fn build(json: &str) -> Model {
    let items = parse_items(json).expect("Should parse");
    Model::build(&items, &CompilerConfig::default(), &mut Diagnostics::new())
        .expect("Should build model")
}

fn generate(model: &Model, config: &CompilerConfig) -> (String, Diagnostics) {
    let mut diags = Diagnostics::new();
    let code = CodeGenerator::new(model, config)
        .generate(&mut diags)
        .expect("Should generate");
    (code.source, diags)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Mass matrix
// ═══════════════════════════════════════════════════════════════════════════════

mod mass_matrix {
    use super::*;

    const COUPLED: &str = r#"[
        { "item": "diffeqn", "target": "x", "expr": { "symbol": "y" },
          "aux": [{ "coefficient": -2.5, "target": "y" }] },
        { "item": "diffeqn", "target": "y", "expr": { "symbol": "x" } }
    ]"#;

    #[test]
    fn test_aux_terms_make_model_non_diagonal() {
        let model = build(COUPLED);
        assert!(!model.diagonal);

        let aux = &model.auxiliaries["x"];
        assert_eq!(aux.len(), 1);
        assert_eq!(aux[0].target, "y");
        assert_relative_eq!(aux[0].coefficient, -2.5);
        assert!(model.auxiliaries["y"].is_empty());
    }

    #[test]
    fn test_mass_entries_are_column_major() {
        let model = build(COUPLED);
        let (src, diags) = generate(&model, &CompilerConfig::default());

        assert!(src.contains("const int DIAGONAL = 0;"));
        assert!(src.contains("const int REQUIRE_MASS = 1;"));
        assert!(src.contains("double* mass = radau5_getMassMatrix();"));
        assert!(src.contains("mass[VAR_COUNT * 1 + 0] = (-2.5);"));
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_aux_on_non_differential_is_reported() {
        let model = build(
            r#"[
            { "item": "diffeqn", "target": "x", "expr": { "literal": 1 },
              "aux": [{ "target": "k" }] },
            { "item": "assign", "target": "k", "expr": { "literal": 1 } }
        ]"#,
        );
        let (src, diags) = generate(&model, &CompilerConfig::default());

        assert!(diags.contains(Level::Error, "not a differential variable"));
        assert!(!src.contains("mass[VAR_COUNT"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Algebraic equations and constraints
// ═══════════════════════════════════════════════════════════════════════════════

mod equations {
    use super::*;

    #[test]
    fn test_algebraic_residual_follows_differentials() {
        let model = build(
            r#"[
            { "item": "algeqn", "target": "z", "lhs": { "symbol": "z" }, "rhs": { "symbol": "x" } },
            { "item": "diffeqn", "target": "x", "expr": { "symbol": "z" } }
        ]"#,
        );
        let (src, _) = generate(&model, &CompilerConfig::default());

        assert!(src.contains("const unsigned int VAR_COUNT = 2;"));
        assert!(src.contains("static char* ROOTS[2] = \n{\n    \"x\", \"z\"\n};"));
        assert!(src.contains("f[0] = y[1];"));
        assert!(src.contains("/* z = (x-z) */"));
        assert!(src.contains("f[1] = (y[0]-y[1]);"));
    }

    #[test]
    fn test_hard_and_soft_bounds() {
        let model = build(
            r#"[
            { "item": "diffeqn", "target": "x", "expr": { "symbol": "k" } },
            { "item": "assign", "target": "k", "expr": { "literal": 1 } },
            { "item": "constraint", "target": "k", "test": ">=", "bound": { "literal": 0.5 } },
            { "item": "constraint", "kind": "soft", "target": "x", "test": "<", "bound": { "literal": 10 } }
        ]"#,
        );
        let (src, _) = generate(&model, &CompilerConfig::default());

        assert!(src.contains("    if ( RPAR[2] < 0.5 )\n    {\n        /* hard bound on k */\n        RPAR[2] = 0.5;"));
        assert!(src.contains("    if ( y[0] >= 10.0 )\n    {\n        /* soft bound on x is not enforced */\n    }"));
    }

    #[test]
    fn test_embedded_code_is_copied() {
        let model = build(
            r#"[
            { "item": "embedded", "code": "static double helper(double v) { return v; }" },
            { "item": "diffeqn", "target": "x",
              "expr": { "call": { "name": "helper", "args": [{ "symbol": "x" }] } } }
        ]"#,
        );
        let (src, _) = generate(&model, &CompilerConfig::default());

        let embed = src
            .find("static double helper")
            .expect("Embedded code should be present");
        let init = src.find("void model_init()\n").expect("model_init should be present");
        assert!(embed < init);
        assert!(src.contains("f[0] = helper(y[0]);"));
        assert!(model.unknown.contains("helper"));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Expression printing
// ═══════════════════════════════════════════════════════════════════════════════

mod printing {
    use super::*;

    #[test]
    fn test_conditionals_and_comparisons() {
        let model = build(
            r#"[
            { "item": "diffeqn", "target": "x",
              "expr": { "conditional": {
                  "test": { "binop": { "op": ">", "lhs": { "symbol": "x" }, "rhs": { "literal": 1 } } },
                  "then": { "literal": 0 },
                  "otherwise": { "symbol": "k" } } } }
        ]"#,
        );
        let printer = CPrinter::new(&model);
        let mut diags = Diagnostics::new();
        let def = &model.symbol("x").expect("x should exist").diffs[0];

        assert_eq!(
            printer.expr(&def.expr, Context::Solve, &mut diags),
            "((y[0]>1.0) ? 0.0 : RPAR[2])"
        );
        assert!(diags.is_empty());
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(c_number(2.0), "2.0");
        assert_eq!(c_number(-0.25), "(-0.25)");
        assert_eq!(c_number(f64::NEG_INFINITY), "(-INFINITY)");
        assert_relative_eq!(
            c_number(6.02e23).parse::<f64>().expect("Should be a valid literal"),
            6.02e23
        );
    }
}
