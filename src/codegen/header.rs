//! Fixed preamble, model constants, prototypes and embedded fragments

use std::fmt::{self, Display, Write as _};

use crate::error::BcmdError;

use super::CodeGenerator;

const PREAMBLE: &str = r#"#include <stdio.h>
#include <stdlib.h>
#include <math.h>
#include "radau5_interface.h"

/* Field selection for model output */
typedef struct
{
    int count;
    int* fields;
} OutputSpec;

/* Working storage, bound to the solver arrays by the harness */
static double* RPAR = 0;
static double* Y = 0;
static int SAVE_INTERMEDIATES = 0;

"#;

const PROTOTYPES: &str = r#"/* Model-specific functions */
void model_init();
void param_update();
void save_y(double* y);
void save_intermediates();
void carry_forward();
void rhs(int* n, double* x, double* y, double* f, double* rpar, int* ipar);
void constrain_params();
void constrain_intermediates();
void constrain_y(double* y);

"#;

impl CodeGenerator<'_> {
    pub(super) fn write_preamble(&self, out: &mut String) -> Result<(), BcmdError> {
        writeln!(
            out,
            "/* Model {}: generated by bcmd, do not edit */\n",
            self.config.name
        )?;
        out.push_str(PREAMBLE);
        Ok(())
    }

    pub(super) fn write_constants(&self, out: &mut String) -> Result<(), BcmdError> {
        let model = self.model;
        let diff_count = model.diffs.len();
        let alg_count = model.algs.len();
        let symbol_count = model.symbols.len();

        writeln!(out, "/* Model-specific constants and statics */")?;
        writeln!(out, "const char* MODEL_NAME = \"{}\";", self.config.name)?;
        writeln!(
            out,
            "const char* MODEL_VERSION = \"{}\";",
            model.version.as_deref().unwrap_or("(version not specified)")
        )?;

        let diagonal = if model.diagonal { 1 } else { 0 };
        writeln!(out, "const int DIAGONAL = {};", diagonal)?;
        writeln!(out, "const int REQUIRE_MASS = {};", 1 - diagonal)?;

        writeln!(out, "const unsigned int DIFF_EQ_COUNT = {};", diff_count)?;
        writeln!(out, "const unsigned int ALGEBRAIC_COUNT = {};", alg_count)?;
        writeln!(out, "const unsigned int VAR_COUNT = {};", diff_count + alg_count)?;
        writeln!(out, "const unsigned int SYMBOL_COUNT = {};\n", symbol_count)?;

        let names: Vec<&str> = model.symbols.iter().map(|s| s.id.as_str()).collect();
        writeln!(out, "static char* SYMBOLS[{}] = \n{{", symbol_count)?;
        out.push_str(&format_array(&names, 5, "\"")?);
        writeln!(out, "}};\n")?;

        let roots: Vec<&String> = model.solver_vars().collect();
        writeln!(out, "static char* ROOTS[{}] = \n{{", roots.len())?;
        out.push_str(&format_array(&roots, 5, "\"")?);
        writeln!(out, "}};\n")?;

        if !model.intermeds.is_empty() {
            writeln!(
                out,
                "static double INTERMEDIATES[{}] = {{0}};\n",
                model.intermeds.len()
            )?;
        }

        // slot 0 is the independent variable
        let fields: Vec<usize> = std::iter::once(0)
            .chain(model.outputs.iter().filter_map(|name| model.index_of(name)))
            .collect();
        writeln!(out, "static int DEFAULT_FIELDS[{}] = \n{{", fields.len())?;
        out.push_str(&format_array(&fields, 10, "")?);
        writeln!(out, "}};")?;
        writeln!(
            out,
            "static OutputSpec DEFAULT_OUTSPEC = {{ {}, DEFAULT_FIELDS }};\n",
            fields.len()
        )?;
        Ok(())
    }

    pub(super) fn write_prototypes(&self, out: &mut String) -> Result<(), BcmdError> {
        out.push_str(PROTOTYPES);
        Ok(())
    }

    pub(super) fn write_embeds(&self, out: &mut String) -> Result<(), BcmdError> {
        writeln!(out, "/* Embedded C code from the model, if any */\n")?;
        writeln!(out, "{}\n", self.model.embeds.join("\n"))?;
        Ok(())
    }
}

/// Array initializer body, `width` items per line
fn format_array<T: Display>(items: &[T], width: usize, quote: &str) -> Result<String, fmt::Error> {
    let mut src = String::new();
    for (row, chunk) in items.chunks(width).enumerate() {
        if row > 0 {
            src.push_str(",\n");
        }
        src.push_str("    ");
        for (i, item) in chunk.iter().enumerate() {
            if i > 0 {
                src.push_str(", ");
            }
            write!(src, "{}{}{}", quote, item, quote)?;
        }
    }
    if !items.is_empty() {
        src.push('\n');
    }
    Ok(src)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_array_wraps() {
        let items: Vec<usize> = (0..12).collect();
        let text = format_array(&items, 5, "").expect("Should format");
        assert_eq!(
            text,
            "    0, 1, 2, 3, 4,\n    5, 6, 7, 8, 9,\n    10, 11\n"
        );
    }

    #[test]
    fn test_format_array_quotes() {
        let text = format_array(&["t", "x"], 5, "\"").expect("Should format");
        assert_eq!(text, "    \"t\", \"x\"\n");
        assert_eq!(format_array::<&str>(&[], 5, "\"").expect("Should format"), "");
    }
}
