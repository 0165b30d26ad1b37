//! Compiler for BCMD biochemical and physiological model descriptions
//!
//! A model arrives as a sequence of AST [`Item`]s. The compiler:
//!
//! 1. builds a symbol table, expanding chemical reactions into differential
//!    equations ([`model`])
//! 2. closes the dependency graph and classifies every symbol as a root,
//!    parameter or intermediate
//! 3. schedules assignments into initialisation, step and runtime order
//! 4. emits a C source file for an implicit DAE solver ([`codegen`])
//!
//! Non-fatal findings are collected in [`Diagnostics`] and forwarded to
//! `tracing`; only unrecoverable failures return a [`BcmdError`].
//!
//! ```ignore
//! use bcmd::{compile_files, CompilerConfig, Diagnostics};
//!
//! let config = CompilerConfig::new("decay");
//! let mut diags = Diagnostics::new();
//! let code = compile_files(&["decay".to_string()], &config, &mut diags)?;
//! std::fs::write("decay.c", code.source)?;
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod info;
pub mod loader;
pub mod model;

pub use crate::ast::{parse_items, Expr, Item};
pub use crate::codegen::{CodeGenerator, GeneratedCode};
pub use crate::config::CompilerConfig;
pub use crate::diagnostics::{Diagnostic, Diagnostics, Level};
pub use crate::model::Model;
pub use error::BcmdError;

/// Analyse `items` and generate the C source
pub fn compile(
    items: &[Item],
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Result<GeneratedCode, BcmdError> {
    let model = Model::build(items, config, diags)?;
    CodeGenerator::new(&model, config).generate(diags)
}

/// Load the named sources from the configured model path and compile them
pub fn compile_files(
    names: &[String],
    config: &CompilerConfig,
    diags: &mut Diagnostics,
) -> Result<GeneratedCode, BcmdError> {
    let loaded = loader::load_sources(names, &config.model_path, diags);
    if loaded.parsed.is_empty() {
        return Err(BcmdError::SourceNotFound(names.join(", ")));
    }
    let items = loaded.into_items()?;
    compile(&items, config, diags)
}
