//! C code generation from an analysed model
//!
//! The generated file is self-contained apart from the RADAU5 wrapper
//! interface. It holds the model constants, any embedded C fragments, and the
//! procedures the harness calls:
//!
//! - `model_init`, `param_update`: evaluate the scheduled assignments
//! - `save_y`, `save_intermediates`, `carry_forward`: move values between
//!   `RPAR`, `Y`, `INTERMEDIATES` and the solver's `y`
//! - `rhs`: the system evaluated by the solver
//! - `constrain_params`, `constrain_intermediates`, `constrain_y`: hard bounds

mod functions;
mod header;
mod printer;

pub use printer::{c_number, CPrinter, Context, FAILED, UNRESOLVED};

use crate::config::CompilerConfig;
use crate::diagnostics::Diagnostics;
use crate::error::BcmdError;
use crate::model::Model;

/// Generated C source ready to be compiled against the solver harness
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    /// The complete C source
    pub source: String,

    /// Symbol names in `RPAR` order
    pub symbols: Vec<String>,

    /// Solver variable names in `y` order
    pub roots: Vec<String>,
}

/// Code generator for an analysed model
pub struct CodeGenerator<'a> {
    model: &'a Model,
    config: &'a CompilerConfig,
    printer: CPrinter<'a>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(model: &'a Model, config: &'a CompilerConfig) -> Self {
        Self {
            model,
            config,
            printer: CPrinter::new(model),
        }
    }

    /// Generate the complete C source
    pub fn generate(&self, diags: &mut Diagnostics) -> Result<GeneratedCode, BcmdError> {
        let mut out = String::new();
        self.write_preamble(&mut out)?;
        self.write_constants(&mut out)?;
        self.write_prototypes(&mut out)?;
        self.write_embeds(&mut out)?;
        self.write_functions(&mut out, diags)?;

        Ok(GeneratedCode {
            source: out,
            symbols: self.model.symbols.iter().map(|s| s.id.clone()).collect(),
            roots: self.model.solver_vars().cloned().collect(),
        })
    }

    /// Whether assignments and constraints on `name` are emitted
    fn is_target(&self, name: &str) -> bool {
        !self.config.omit_unused || !self.model.unused.contains(name)
    }
}
