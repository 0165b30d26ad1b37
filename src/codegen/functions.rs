//! The generated procedures

use std::fmt::Write as _;

use crate::ast::BoundKind;
use crate::diagnostics::Diagnostics;
use crate::error::BcmdError;
use crate::model::{Assignment, Constraint};

use super::{CodeGenerator, Context};

impl CodeGenerator<'_> {
    pub(super) fn write_functions(
        &self,
        out: &mut String,
        diags: &mut Diagnostics,
    ) -> Result<(), BcmdError> {
        self.write_model_init(out, diags)?;
        self.write_param_update(out, diags)?;
        self.write_save_y(out)?;
        self.write_save_intermediates(out)?;
        self.write_carry_forward(out)?;
        self.write_rhs(out, diags)?;
        self.write_constrain_params(out, diags)?;
        self.write_constrain_intermediates(out, diags)?;
        self.write_constrain_y(out, diags)?;
        Ok(())
    }

    /// `RPAR[i] = expr;` for each targeted entry of an init or step bucket
    fn write_rpar_assignments(
        &self,
        out: &mut String,
        bucket: &[Assignment],
        ctx: Context,
        diags: &mut Diagnostics,
    ) -> Result<(), BcmdError> {
        for entry in bucket.iter().filter(|e| self.is_target(&e.target)) {
            let Some(idx) = self.model.index_of(&entry.target) else {
                continue;
            };
            let expr = self.printer.expr(&entry.expr, ctx, diags);
            writeln!(
                out,
                "    RPAR[{}] = {};\t\t/* {}={} */",
                idx, expr, entry.target, entry.expr
            )?;
            if self.config.debug {
                writeln!(
                    out,
                    "    fprintf(stderr, \"{} = %.17g\\n\", RPAR[{}]);",
                    entry.target, idx
                )?;
            }
        }
        Ok(())
    }

    fn write_model_init(&self, out: &mut String, diags: &mut Diagnostics) -> Result<(), BcmdError> {
        let model = self.model;
        writeln!(out, "\n/* Initialise parameters with any values known at compile time.")?;
        writeln!(out, "   (NB: these may be overwritten by runtime values) */")?;
        writeln!(out, "void model_init()\n{{")?;
        if !model.diagonal {
            writeln!(out, "    double* mass = radau5_getMassMatrix();\n")?;
        }
        if self.config.debug {
            writeln!(out, "    fprintf(stderr, \"# Initialising parameters\\n\");\n")?;
        }

        self.write_rpar_assignments(out, &model.schedule.independent, Context::Init, diags)?;
        self.write_rpar_assignments(out, &model.schedule.dependent, Context::Init, diags)?;

        writeln!(out, "\n    constrain_params();")?;
        writeln!(out, "\n    carry_forward();")?;

        if !model.diagonal {
            // column-major: row is the equation, column the coupled variable
            for (row, name) in model.diffs.iter().enumerate() {
                let Some(auxes) = model.auxiliaries.get(name) else {
                    continue;
                };
                for aux in auxes {
                    let Some(col) = model.diffs.iter().position(|d| *d == aux.target) else {
                        diags.error(format!(
                            "Auxiliary term on {} refers to {}, which is not a differential variable",
                            name, aux.target
                        ));
                        continue;
                    };
                    writeln!(
                        out,
                        "\n    /* auxiliary diff eqn term: {}' : {} {}' */",
                        name, aux.coefficient, aux.target
                    )?;
                    writeln!(
                        out,
                        "    mass[VAR_COUNT * {} + {}] = {};",
                        col,
                        row,
                        super::c_number(aux.coefficient)
                    )?;
                }
            }
        }

        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_param_update(&self, out: &mut String, diags: &mut Diagnostics) -> Result<(), BcmdError> {
        writeln!(out, "\n/* Propagate parameter changes to any dependent parameters */")?;
        writeln!(out, "void param_update()\n{{")?;
        let step = &self.model.schedule.step;
        if step.is_empty() {
            writeln!(out, "    /* no parameters to update for this model */")?;
        } else {
            if self.config.debug {
                writeln!(out, "    fprintf(stderr, \"# Updating dependent parameters:\\n\");\n")?;
            }
            self.write_rpar_assignments(out, step, Context::Step, diags)?;
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_save_y(&self, out: &mut String) -> Result<(), BcmdError> {
        writeln!(out, "\n/* Copy Y values into corresponding spaces in the RPAR array */")?;
        writeln!(out, "void save_y(double* y)\n{{")?;
        if self.config.debug {
            writeln!(out, "    fprintf(stderr, \"# Saving Y estimates\\n\");")?;
        }
        for (pos, name) in self.model.solver_vars().enumerate() {
            let Some(idx) = self.model.index_of(name) else {
                continue;
            };
            writeln!(out, "    /* {} */", name)?;
            writeln!(out, "    RPAR[{}] = y[{}];", idx, pos)?;
            if self.config.debug {
                writeln!(out, "    fprintf(stderr, \"{} = %.17g\\n\", y[{}]);", name, pos)?;
            }
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_save_intermediates(&self, out: &mut String) -> Result<(), BcmdError> {
        writeln!(
            out,
            "\n/* Copy intermediate variables into corresponding spaces in the RPAR array */"
        )?;
        writeln!(out, "void save_intermediates()\n{{")?;
        if self.config.debug {
            writeln!(out, "    fprintf(stderr, \"# Saving intermediates\\n\");")?;
        }
        for (pos, name) in self.model.intermeds.iter().enumerate() {
            let Some(idx) = self.model.index_of(name) else {
                continue;
            };
            writeln!(out, "    /* {} */", name)?;
            writeln!(out, "    RPAR[{}] = INTERMEDIATES[{}];", idx, pos)?;
            if self.config.debug {
                writeln!(
                    out,
                    "    fprintf(stderr, \"{} = %.17g\\n\", INTERMEDIATES[{}]);",
                    name, pos
                )?;
            }
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_carry_forward(&self, out: &mut String) -> Result<(), BcmdError> {
        writeln!(out, "\n/* Update Y array with corresponding values from the RPAR array */")?;
        writeln!(out, "void carry_forward()\n{{")?;
        if self.config.debug {
            writeln!(out, "    fprintf(stderr, \"# Setting Y variables\\n\");")?;
        }
        for (pos, name) in self.model.solver_vars().enumerate() {
            let Some(idx) = self.model.index_of(name) else {
                continue;
            };
            writeln!(out, "    /* {} */", name)?;
            writeln!(out, "    Y[{}] = RPAR[{}];", pos, idx)?;
            if self.config.debug {
                writeln!(out, "    fprintf(stderr, \"{} = %.17g\\n\", Y[{}]);", name, pos)?;
            }
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_rhs(&self, out: &mut String, diags: &mut Diagnostics) -> Result<(), BcmdError> {
        let model = self.model;
        writeln!(out, "\n/* right hand side of main equation system */")?;
        writeln!(
            out,
            "void rhs(int* n, double* x, double* y, double* f, double* rpar, int* ipar)\n{{"
        )?;
        writeln!(out, "    /* independent variable is always stored in RPAR[0] */")?;
        writeln!(out, "    RPAR[0] = *x;\n")?;
        writeln!(out, "    constrain_y(y);")?;
        writeln!(out, "    constrain_params();")?;
        if self.config.debug {
            writeln!(
                out,
                "    fprintf(stderr, \"*** RHS step at %s = %.17g\\n\", SYMBOLS[0], *x);"
            )?;
        }

        let runtime = &model.schedule.runtime;
        if runtime.is_empty() {
            writeln!(
                out,
                "\n    /* no dependent parameters or intermediates required for this model */"
            )?;
        } else {
            writeln!(out, "\n    /* calculate dependent parameters and intermediate variables */")?;
            if self.config.debug {
                writeln!(out, "    fprintf(stderr, \"# Calculating intermediates:\\n\");\n")?;
            }
            for entry in runtime.iter().filter(|e| self.is_target(&e.target)) {
                let Some(pos) = model.intermed_position(&entry.target) else {
                    continue;
                };
                let expr = self.printer.expr(&entry.expr, Context::Solve, diags);
                writeln!(
                    out,
                    "    INTERMEDIATES[{}] = {};\t\t/* {}={} */",
                    pos, expr, entry.target, entry.expr
                )?;
                if self.config.debug {
                    writeln!(
                        out,
                        "    fprintf(stderr, \"{} = %.17g\\n\", INTERMEDIATES[{}]);",
                        entry.target, pos
                    )?;
                }
            }
            writeln!(out, "\n    constrain_intermediates();")?;
            writeln!(out, "    if ( SAVE_INTERMEDIATES )")?;
            writeln!(out, "        save_intermediates();\n")?;
            writeln!(out, "    constrain_params();")?;
        }

        writeln!(out, "\n    if ( f )\n    {{")?;
        writeln!(out, "        /* calculate output variables */")?;
        if self.config.debug {
            writeln!(out, "        fprintf(stderr, \"# Calculating outputs:\\n\");\n")?;
        }

        for (pos, name) in model.diffs.iter().enumerate() {
            // the first definition is authoritative
            let Some(def) = model.symbol(name).and_then(|s| s.diffs.first()) else {
                continue;
            };
            writeln!(out, "        /* {}' = {} */", name, def.expr)?;
            let expr = self.printer.expr(&def.expr, Context::Solve, diags);
            writeln!(out, "        f[{}] = {};", pos, expr)?;
            if self.config.debug {
                writeln!(out, "        fprintf(stderr, \"{}' = %.17g\\n\", f[{}]);", name, pos)?;
            }
        }
        for (offset, name) in model.algs.iter().enumerate() {
            let pos = model.diffs.len() + offset;
            let Some(def) = model.symbol(name).and_then(|s| s.algs.first()) else {
                continue;
            };
            writeln!(out, "        /* {} = {} */", name, def.expr)?;
            let expr = self.printer.expr(&def.expr, Context::Solve, diags);
            writeln!(out, "        f[{}] = {};", pos, expr)?;
            if self.config.debug {
                writeln!(out, "        fprintf(stderr, \"{} = %.17g\\n\", f[{}]);", name, pos)?;
            }
        }

        writeln!(out, "    }}")?;
        writeln!(out, "}}")?;
        Ok(())
    }

    /// `if ( slot test bound ) { slot = bound; }` for a hard bound; soft
    /// bounds are recorded as a comment only
    fn write_constraint(
        &self,
        out: &mut String,
        name: &str,
        slot: &str,
        constraint: &Constraint,
        ctx: Context,
        diags: &mut Diagnostics,
    ) -> Result<(), BcmdError> {
        let bound = self.printer.expr(&constraint.bound, ctx, diags);
        writeln!(
            out,
            "    if ( {} {} {} )\n    {{",
            slot,
            constraint.test.symbol(),
            bound
        )?;
        match constraint.kind {
            BoundKind::Hard => {
                writeln!(out, "        /* hard bound on {} */", name)?;
                writeln!(out, "        {} = {};", slot, bound)?;
            }
            BoundKind::Soft => {
                writeln!(out, "        /* soft bound on {} is not enforced */", name)?;
            }
        }
        writeln!(out, "    }}")?;
        Ok(())
    }

    fn write_constrain_params(&self, out: &mut String, diags: &mut Diagnostics) -> Result<(), BcmdError> {
        writeln!(out, "\n/* Enforce constraints on parameters/intermediates (if any). */")?;
        writeln!(out, "void constrain_params()\n{{")?;
        for symbol in self.model.symbols.iter().filter(|s| self.is_target(&s.id)) {
            let slot = format!("RPAR[{}]", symbol.index);
            for constraint in &symbol.constraints {
                self.write_constraint(out, &symbol.id, &slot, constraint, Context::Init, diags)?;
            }
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_constrain_intermediates(
        &self,
        out: &mut String,
        diags: &mut Diagnostics,
    ) -> Result<(), BcmdError> {
        writeln!(out, "\nvoid constrain_intermediates()\n{{")?;
        for (pos, name) in self.model.intermeds.iter().enumerate() {
            if !self.is_target(name) {
                continue;
            }
            let Some(symbol) = self.model.symbol(name) else {
                continue;
            };
            let slot = format!("INTERMEDIATES[{}]", pos);
            for constraint in &symbol.constraints {
                self.write_constraint(out, name, &slot, constraint, Context::Solve, diags)?;
            }
        }
        writeln!(out, "}}")?;
        Ok(())
    }

    fn write_constrain_y(&self, out: &mut String, diags: &mut Diagnostics) -> Result<(), BcmdError> {
        writeln!(out, "\nvoid constrain_y(double* y)\n{{")?;
        for (pos, name) in self.model.solver_vars().enumerate() {
            let Some(symbol) = self.model.symbol(name) else {
                continue;
            };
            let slot = format!("y[{}]", pos);
            for constraint in &symbol.constraints {
                self.write_constraint(out, name, &slot, constraint, Context::Solve, diags)?;
            }
        }
        writeln!(out, "}}")?;
        Ok(())
    }
}
