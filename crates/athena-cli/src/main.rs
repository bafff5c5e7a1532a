//! Athena command line caller.
//!
//! ## Commands
//!
//! - `run`: run a blueprint in batch mode against a directory tree
//! - `show`: list the processors of a blueprint and how they resolve
//! - `statuses`: list the status lattice

mod rules;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use athena_core::{
    render_summary, run_batch, BatchOptions, CancelFlag, ExecutionMode, LogFormat, Register,
    StatusFamily, StatusRegistry,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::Level;

#[derive(Parser)]
#[command(name = "athena")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Athena pipeline sanity checks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory tree the filesystem processes inspect
    #[arg(long, global = true, env = "ATHENA_ROOT", default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a blueprint unattended and report the result
    Run {
        /// Blueprint file (.toml or .json)
        blueprint: PathBuf,

        /// Fix processors whose check failed
        #[arg(long)]
        fix: bool,

        /// Stop at the first blocking failure
        #[arg(long)]
        fail_fast: bool,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// Show processors, capabilities and links of a blueprint
    Show {
        /// Blueprint file (.toml or .json)
        blueprint: PathBuf,

        /// Execution mode links are resolved for (batch or interactive)
        #[arg(short, long, default_value = "batch")]
        mode: ExecutionMode,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },

    /// List the registered statuses
    Statuses,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    athena_core::init_tracing(format, level);

    match cli.command {
        Commands::Run {
            blueprint,
            fix,
            fail_fast,
            output,
        } => cmd_run(&cli.root, &blueprint, BatchOptions { fix, fail_fast }, output),
        Commands::Show {
            blueprint,
            mode,
            output,
        } => cmd_show(&cli.root, &blueprint, mode, output),
        Commands::Statuses => cmd_statuses(),
    }
}

fn load_register(root: &Path, mode: ExecutionMode) -> Result<Register> {
    let processes = rules::registry(root).context("Failed to register filesystem processes")?;
    Ok(Register::new(Arc::new(processes), mode))
}

/// Run a blueprint in batch mode; fails when the report did not pass.
fn cmd_run(root: &Path, path: &Path, options: BatchOptions, output: OutputFormat) -> Result<()> {
    let mut register = load_register(root, ExecutionMode::Batch)?;
    let blueprint = register
        .load(path)
        .with_context(|| format!("Failed to load blueprint {}", path.display()))?;

    let report = run_batch(blueprint, &options, &CancelFlag::new())?;
    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print!("{}", render_summary(&report)),
    }

    if !report.passed() {
        anyhow::bail!("blueprint {} did not pass", report.blueprint);
    }
    Ok(())
}

#[derive(Serialize)]
struct ProcessorRow {
    index: usize,
    id: String,
    name: String,
    process: String,
    category: String,
    tags: String,
    capabilities: athena_core::Capabilities,
    available: bool,
    links: usize,
    resolved_links: usize,
}

fn cmd_show(root: &Path, path: &Path, mode: ExecutionMode, output: OutputFormat) -> Result<()> {
    let mut register = load_register(root, mode)?;
    let blueprint = register
        .load(path)
        .with_context(|| format!("Failed to load blueprint {}", path.display()))?;

    let rows: Vec<ProcessorRow> = blueprint
        .processors()
        .iter()
        .map(|p| ProcessorRow {
            index: p.index(),
            id: p.id().to_string(),
            name: p.name(),
            process: p.process_path().to_string(),
            category: p.category().to_string(),
            tags: p.tags().to_string(),
            capabilities: p.capabilities(),
            available: p.is_available(mode),
            links: p.links().len(),
            resolved_links: p.resolved_link_count(),
        })
        .collect();

    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let digest = blueprint.digest();
    println!(
        "Blueprint {} ({} mode, digest {})",
        blueprint.name(),
        mode,
        digest.get(..12).unwrap_or(digest)
    );
    for row in &rows {
        let caps = &row.capabilities;
        let ops: Vec<&str> = [("check", caps.check), ("fix", caps.fix), ("tool", caps.tool)]
            .iter()
            .filter(|(_, on)| *on)
            .map(|(name, _)| *name)
            .collect();
        println!(
            "  {:>2}. {:<24} {:<16} ops: {:<14} tags: {:<20} links: {}/{}{}",
            row.index,
            row.name,
            row.category,
            ops.join(","),
            row.tags,
            row.resolved_links,
            row.links,
            if row.available { "" } else { "  (unavailable)" },
        );
    }
    Ok(())
}

fn cmd_statuses() -> Result<()> {
    let statuses = StatusRegistry::new();
    for family in [StatusFamily::BuiltIn, StatusFamily::Success, StatusFamily::Fail] {
        println!("{family}:");
        for status in statuses.family(family) {
            let color = status.color();
            println!(
                "  {:<10} priority {:>6.2}  rgb({}, {}, {})",
                status.name(),
                status.priority(),
                color.r,
                color.g,
                color.b
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::BlueprintDeclaration;

    const HYGIENE: &str = include_str!("../blueprints/hygiene.toml");

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "athena", "--root", "/tmp/show", "run", "hygiene.toml", "--fix", "--output", "json",
        ])
        .unwrap();
        assert_eq!(cli.root, PathBuf::from("/tmp/show"));
        match cli.command {
            Commands::Run { fix, fail_fast, output, .. } => {
                assert!(fix);
                assert!(!fail_fast);
                assert!(output == OutputFormat::Json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_parses_show_mode() {
        let cli = Cli::try_parse_from(["athena", "show", "hygiene.toml", "--mode", "interactive"])
            .unwrap();
        match cli.command {
            Commands::Show { mode, .. } => assert_eq!(mode, ExecutionMode::Interactive),
            _ => panic!("expected show"),
        }
        assert!(Cli::try_parse_from(["athena", "show", "x.toml", "--mode", "nightly"]).is_err());
    }

    #[test]
    fn test_bundled_blueprint_builds_in_both_modes() {
        let dir = tempfile::tempdir().unwrap();
        let mut register = load_register(dir.path(), ExecutionMode::Batch).unwrap();
        let declaration = BlueprintDeclaration::from_toml_str(HYGIENE).unwrap();
        register.load(declaration).unwrap();
        register.set_mode(ExecutionMode::Interactive).unwrap();
        assert_eq!(register.names(), vec!["hygiene"]);
    }

    #[test]
    fn test_run_fails_on_blocking_problems_and_fix_repairs() {
        let dir = tempfile::tempdir().unwrap();
        let blueprint = dir.path().join("hygiene.toml");
        std::fs::write(&blueprint, HYGIENE).unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir(&tree).unwrap();
        std::fs::write(tree.join("notes.md"), "todo").unwrap();

        let options = BatchOptions::default();
        assert!(cmd_run(&tree, &blueprint, options, OutputFormat::Json).is_err());

        let options = BatchOptions {
            fix: true,
            fail_fast: false,
        };
        cmd_run(&tree, &blueprint, options, OutputFormat::Text).unwrap();
        assert_eq!(std::fs::read_to_string(tree.join("notes.md")).unwrap(), "todo\n");
    }
}
