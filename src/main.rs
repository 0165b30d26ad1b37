//! bcmd - compile BCMD model sources to C
//!
//! Loads one or more AST item files (following their imports), analyses the
//! combined model and writes `<name>.c` for the RADAU5 solver harness.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bcmd::info::{self, GraphOptions};
use bcmd::loader::load_sources;
use bcmd::{CodeGenerator, CompilerConfig, Diagnostics, Level, Model};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "bcmd", version)]
#[command(about = "Compile BCMD model descriptions to C source for the DAE solver")]
struct Cli {
    /// One or more model sources to be compiled
    #[arg(required = true)]
    files: Vec<String>,

    /// Append to the default model search path
    #[arg(short = 'i', value_name = "PATH")]
    append_path: Vec<PathBuf>,

    /// Replace the default model search path
    #[arg(short = 'I', value_name = "PATH")]
    replace_path: Vec<PathBuf>,

    /// Model name (default: stem of the first file)
    #[arg(short, long)]
    name: Option<String>,

    /// Output file name (default: <name>.c)
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output directory
    #[arg(short = 'd', value_name = "DIR", default_value = ".")]
    outdir: PathBuf,

    /// Omit apparently unused intermediates and parameters
    #[arg(short = 'u', long = "unused")]
    omit_unused: bool,

    /// Include debug traces in the generated code
    #[arg(short = 'g', long)]
    debug: bool,

    /// Fail instead of guessing when assignments are ambiguous
    #[arg(long)]
    strict: bool,

    /// Write the merged item list as JSON (default: <name>.tree)
    #[arg(short = 't', long, value_name = "FILE", num_args = 0..=1)]
    tree: Option<Option<PathBuf>>,

    /// Write the analysed model as JSON (default: <name>.bcmpl)
    #[arg(short = 'p', long, value_name = "FILE", num_args = 0..=1)]
    processed: Option<Option<PathBuf>>,

    /// Write the dependency structure in GraphViz format (default: <name>.gv)
    #[arg(short = 'G', long, value_name = "FILE", num_args = 0..=1)]
    graph: Option<Option<PathBuf>>,

    /// Exclude apparently unused elements from graph output
    #[arg(short = 'U', long = "graphxunused")]
    graph_exclude_unused: bool,

    /// Exclude initialisation dependencies from graph output
    #[arg(short = 'N', long = "graphxinit")]
    graph_exclude_init: bool,

    /// Exclude clustering from graph output
    #[arg(short = 'C', long = "graphxclust")]
    graph_exclude_clusters: bool,

    /// Include direct circular dependencies in graph output
    #[arg(short = 'S', long = "graphself")]
    graph_self: bool,

    /// Print the model summary to stdout
    #[arg(short = 's', long)]
    summary: bool,

    /// Increase logging detail (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn model_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.files
            .first()
            .map(|file| {
                Path::new(file)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.clone())
            })
            .unwrap_or_else(|| "model".to_string())
    }

    fn search_path(&self) -> Vec<PathBuf> {
        let mut path = if self.replace_path.is_empty() {
            CompilerConfig::default().model_path
        } else {
            self.replace_path.clone()
        };
        path.extend(self.append_path.iter().cloned());
        path
    }

    /// Where an optional dump goes: the given file, or `<name>.<ext>` in the output dir
    fn dump_path(&self, requested: &Option<PathBuf>, name: &str, ext: &str) -> PathBuf {
        match requested {
            Some(file) => self.outdir.join(file),
            None => self.outdir.join(format!("{}.{}", name, ext)),
        }
    }

    fn filter(&self) -> &'static str {
        match self.verbose {
            0 => "bcmd=warn",
            1 => "bcmd=info",
            2 => "bcmd=debug",
            _ => "bcmd=trace",
        }
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let name = cli.model_name();
    let config = CompilerConfig::new(&name)
        .omit_unused(cli.omit_unused)
        .debug(cli.debug)
        .strict_assignments(cli.strict)
        .model_path(cli.search_path());

    fs::create_dir_all(&cli.outdir)
        .with_context(|| format!("Failed to create {}", cli.outdir.display()))?;

    let mut diags = Diagnostics::new();
    let loaded = load_sources(&cli.files, &config.model_path, &mut diags);

    if let Some(requested) = &cli.tree {
        let tree = serde_json::to_string_pretty(&loaded.merged)?;
        write_file(&cli.dump_path(requested, &name, "tree"), &tree)?;
    }

    if loaded.parsed.is_empty() {
        bail!("No sources could be loaded from {}", cli.files.join(", "));
    }
    let items = loaded.into_items()?;

    let model = Model::build(&items, &config, &mut diags)?;

    if let Some(requested) = &cli.processed {
        let processed = serde_json::to_string_pretty(&model)?;
        write_file(&cli.dump_path(requested, &name, "bcmpl"), &processed)?;
    }

    if let Some(requested) = &cli.graph {
        let options = GraphOptions {
            exclude_unused: cli.graph_exclude_unused,
            exclude_init: cli.graph_exclude_init,
            exclude_clusters: cli.graph_exclude_clusters,
            include_self: cli.graph_self,
        };
        let dot = info::graphviz(&model, &config, &options)?;
        write_file(&cli.dump_path(requested, &name, "gv"), &dot)?;
    }

    let report = info::summary(&model, &config)?;
    if cli.summary {
        print!("{}", report);
    } else {
        tracing::debug!("\n{}", report);
    }

    let code = CodeGenerator::new(&model, &config).generate(&mut diags)?;
    let target = match &cli.output {
        Some(file) => cli.outdir.join(file),
        None => cli.outdir.join(format!("{}.c", name)),
    };
    write_file(&target, &code.source)?;

    let errors = diags.count_at_least(Level::Error);
    let warnings = diags.at(Level::Warning).count();
    if errors > 0 {
        tracing::error!(
            "Compilation of {} completed with {} error(s) and {} warning(s)",
            name,
            errors,
            warnings
        );
    } else {
        info!(
            "Compilation of {} completed with {} warning(s)",
            name, warnings
        );
    }
    Ok(())
}
