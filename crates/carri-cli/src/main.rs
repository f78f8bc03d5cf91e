//! Command-line interface for CARRI domains.

use carri_engine::{FirstLegal, SimulationConfig, Simulator};
use carri_model::{Schema, State};
use carri_syntax::{
    parse_domain, parse_problem, pretty_print_cost, pretty_print_expr, pretty_print_updates,
    Domain, LoadError, Problem,
};
use clap::{Parser, Subcommand};
use miette::{Diagnostic, NamedSource, SourceSpan};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// CLI error with source context for pretty printing.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("failed to read {path}: {message}")]
    IoError { path: String, message: String },

    #[error("{section}: {message}")]
    #[diagnostic(code(carri::load_error))]
    LoadError {
        section: String,
        message: String,
        #[source_code]
        src: NamedSource<Arc<String>>,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("problem does not fit domain: {message}")]
    #[diagnostic(code(carri::schema_error))]
    SchemaError { message: String },

    #[error("simulation error: {message}")]
    SimulationError { message: String },

    #[error("{message}")]
    Other { message: String },
}

impl CliError {
    fn from_load_error(e: LoadError, source: Arc<String>, filename: &str) -> Self {
        let span = e.source.span();
        let start = line_offset(&source, span.line, span.column);
        let len = span.len().max(1);
        let len = len.min(source.len().saturating_sub(start));
        CliError::LoadError {
            section: e.section,
            message: e.source.to_string(),
            src: NamedSource::new(filename, source),
            span: (start, len).into(),
        }
    }
}

type CliResult<T> = Result<T, CliError>;

/// Byte offset of a 1-indexed line and character column.
fn line_offset(source: &str, line: u32, column: u32) -> usize {
    let mut offset = 0;
    for (index, text) in source.split_inclusive('\n').enumerate() {
        if index + 1 == line as usize {
            let skip = column.saturating_sub(1) as usize;
            return offset
                + text
                    .char_indices()
                    .nth(skip)
                    .map_or(text.trim_end().len(), |(i, _)| i);
        }
        offset += text.len();
    }
    source.len()
}

#[derive(Parser)]
#[command(name = "carri", version)]
#[command(about = "CARRI logistics domain loader and simulator", long_about = None)]
struct Cli {
    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a domain (and optionally a problem) and show its declarations
    Parse {
        /// Domain file
        #[arg(value_name = "DOMAIN")]
        domain: PathBuf,

        /// Problem file, checked against the domain
        #[arg(value_name = "PROBLEM")]
        problem: Option<PathBuf>,

        /// Dump the full syntax tree
        #[arg(long)]
        ast: bool,
    },

    /// List the grounded actions of every actor in the initial state
    Ground {
        /// Domain file
        #[arg(value_name = "DOMAIN")]
        domain: PathBuf,

        /// Problem file
        #[arg(value_name = "PROBLEM")]
        problem: PathBuf,

        /// Only ground for this entity type
        #[arg(short, long)]
        entity: Option<String>,

        /// Only ground for this instance id
        #[arg(short, long)]
        id: Option<i64>,
    },

    /// Run the simulator with the first-legal-action policy
    Simulate {
        /// Domain file
        #[arg(value_name = "DOMAIN")]
        domain: PathBuf,

        /// Problem file
        #[arg(value_name = "PROBLEM")]
        problem: PathBuf,

        /// Maximum steps to run (0 = unlimited)
        #[arg(long, default_value = "100")]
        max_steps: usize,

        /// Load the next iteration batch every N steps (0 = when idle)
        #[arg(long, default_value = "0")]
        steps_per_iteration: usize,

        /// Keep stepping after every actor goes idle
        #[arg(long)]
        no_stop_when_idle: bool,
    },
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    let result = match cli.command {
        Commands::Parse {
            domain,
            problem,
            ast,
        } => cmd_parse(&domain, problem.as_deref(), ast),
        Commands::Ground {
            domain,
            problem,
            entity,
            id,
        } => cmd_ground(&domain, &problem, entity.as_deref(), id),
        Commands::Simulate {
            domain,
            problem,
            max_steps,
            steps_per_iteration,
            no_stop_when_idle,
        } => cmd_simulate(
            &domain,
            &problem,
            SimulationConfig {
                max_steps,
                steps_per_iteration,
                stop_when_idle: !no_stop_when_idle,
            },
        ),
    };

    if let Err(e) = result {
        eprintln!("{:?}", miette::Report::new(e));
        std::process::exit(1);
    }
}

fn read_source(path: &Path) -> CliResult<Arc<String>> {
    fs::read_to_string(path)
        .map(Arc::new)
        .map_err(|e| CliError::IoError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

fn load_domain(path: &Path) -> CliResult<Domain> {
    let filename = path.display().to_string();
    let source = read_source(path)?;
    parse_domain(&source).map_err(|e| CliError::from_load_error(e, source.clone(), &filename))
}

fn load_problem(path: &Path) -> CliResult<Problem> {
    let filename = path.display().to_string();
    let source = read_source(path)?;
    parse_problem(&source).map_err(|e| CliError::from_load_error(e, source.clone(), &filename))
}

fn load(domain: &Path, problem: &Path) -> CliResult<(Domain, Arc<Schema>)> {
    info!("loading domain...");
    let domain = load_domain(domain)?;
    info!("loading problem...");
    let problem = load_problem(problem)?;
    let schema = Schema::build(&domain, &problem).map_err(|e| CliError::SchemaError {
        message: e.to_string(),
    })?;
    Ok((domain, Arc::new(schema)))
}

fn cmd_parse(domain_path: &Path, problem_path: Option<&Path>, ast: bool) -> CliResult<()> {
    let domain = load_domain(domain_path)?;

    if ast {
        println!("{:#?}", domain);
    } else {
        print_domain(&domain);
    }

    if let Some(path) = problem_path {
        let problem = load_problem(path)?;
        let schema = Schema::build(&domain, &problem).map_err(|e| CliError::SchemaError {
            message: e.to_string(),
        })?;
        println!("problem {}", path.display());
        let state = schema.initial_state();
        for (index, entity) in schema.entities().iter().enumerate() {
            let count = state.entity_ids(&schema, index).count();
            println!("  {} x{}", entity.name, count);
        }
        println!("  {} iteration batches", schema.iteration_count());
    }

    println!("parse: ok");
    Ok(())
}

fn entity_index(schema: &Schema, name: &str) -> CliResult<usize> {
    schema.entity_index(name).ok_or_else(|| CliError::Other {
        message: format!("unknown entity type '{}'", name),
    })
}

fn print_domain(domain: &Domain) {
    let symbols = &domain.symbols;
    println!("entities");
    for entity in domain.entities() {
        match &entity.base_role {
            Some(role) => println!("  {} ({})", entity.name, role),
            None => println!("  {}", entity.name),
        }
    }

    println!("variables");
    for var in &domain.variables {
        let owner = var
            .owner
            .map(|o| format!(" - {}", symbols.entity_name(o)))
            .unwrap_or_default();
        let binding = if var.constant { "const" } else { "var" };
        println!("  {} {} {:?}{}", binding, var.name, var.kind, owner);
    }

    for items in &domain.items {
        let fields: Vec<String> = items
            .fields
            .iter()
            .map(|f| format!("{} {:?}", f.name, f.kind))
            .collect();
        println!(
            "items {}: {}",
            symbols.entity_name(items.entity),
            fields.join(", ")
        );
    }

    for action in &domain.actions {
        let params: Vec<String> = action
            .params
            .iter()
            .map(|p| format!("{} - {}", p.name, symbols.entity_name(p.entity)))
            .collect();
        println!("action {}: {}", action.name, params.join(", "));
        for precondition in &action.preconditions {
            println!("  pre  {}", pretty_print_expr(precondition));
        }
        for conflict in &action.conflicts {
            println!("  conf {}", pretty_print_expr(conflict));
        }
        print_indented(&pretty_print_updates(&action.effects, symbols), "  eff  ");
        print_indented(&pretty_print_cost(&action.cost, symbols), "  cost ");
    }

    for (label, steps) in [("env", &domain.env_steps), ("iter", &domain.iter_steps)] {
        for step in steps {
            println!("{} step {}", label, step.name);
            print_indented(&pretty_print_updates(&step.effects, symbols), "  eff  ");
        }
    }
}

fn print_indented(text: &str, prefix: &str) {
    for line in text.lines() {
        println!("{}{}", prefix, line);
    }
}

fn cmd_ground(
    domain_path: &Path,
    problem_path: &Path,
    entity: Option<&str>,
    id: Option<i64>,
) -> CliResult<()> {
    let (domain, schema) = load(domain_path, problem_path)?;
    let entity = entity.map(|name| entity_index(&schema, name)).transpose()?;
    let sim = Simulator::new(Arc::clone(&schema), &domain);
    let state = sim.state();

    let mut total = 0;
    for actor in sim.actor_instances(state) {
        if entity.is_some_and(|e| e != actor.entity) || id.is_some_and(|i| i != actor.id) {
            continue;
        }
        let name = schema
            .entity(actor.entity)
            .map_or("?", |layout| layout.name.as_str());
        let legal = sim.legal_actions(state, actor);
        println!("{} {}: {} actions", name, actor.id, legal.len());
        for action in &legal {
            match action.cost(&schema, state) {
                Ok(cost) => println!("  {} cost {}", action, cost),
                Err(e) => println!("  {} cost error: {}", action, e),
            }
        }
        total += legal.len();
    }

    println!();
    println!("Grounded: {} actions", total);
    Ok(())
}

fn cmd_simulate(domain_path: &Path, problem_path: &Path, config: SimulationConfig) -> CliResult<()> {
    let (domain, schema) = load(domain_path, problem_path)?;
    let mut sim = Simulator::with_config(Arc::clone(&schema), &domain, config);

    info!("simulating...");
    let start = Instant::now();
    let summary = sim
        .run(&mut FirstLegal)
        .map_err(|e| CliError::SimulationError {
            message: e.to_string(),
        })?;
    let elapsed = start.elapsed();

    println!();
    println!("Result: {} steps", summary.steps);
    println!("  Actions applied: {}", summary.actions);
    println!("  Actions rejected: {}", summary.rejected);
    println!("  Iterations loaded: {}", summary.iterations);
    println!("  Total cost: {}", summary.cost);
    println!("  Time: {:.2}s", elapsed.as_secs_f64());
    println!();
    print_state(&schema, sim.state());
    Ok(())
}

fn print_state(schema: &Schema, state: &State) {
    println!("Final state:");
    for (slot, layout) in schema.var_layouts().iter().enumerate() {
        let values: Vec<String> = state
            .var(slot)
            .unwrap_or_default()
            .iter()
            .map(|v| v.to_string())
            .collect();
        println!("  {} = [{}]", layout.name, values.join(", "));
    }
    for (index, collection) in schema.collections().iter().enumerate() {
        let live = state.collection(index).map_or(0, |c| c.len());
        println!("  {} items: {}", collection.name, live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_offset() {
        let source = "Entities\nVehicle: 2\n";
        assert_eq!(line_offset(source, 1, 1), 0);
        assert_eq!(line_offset(source, 2, 1), 9);
        assert_eq!(line_offset(source, 2, 10), 18);
        assert_eq!(line_offset(source, 9, 1), source.len());
    }

    #[test]
    fn test_load_error_points_at_line() {
        let source = Arc::new("Start Domain:\nVariables:\nEntities:\nEnd Domain\n".to_string());
        let err = parse_domain(&source).unwrap_err();
        let line = err.line;
        assert_eq!(line, 3);
        match CliError::from_load_error(err, source.clone(), "domain.carri") {
            CliError::LoadError { span, .. } => {
                let start = line_offset(&source, line, 1);
                assert!(span.offset() >= start);
                assert!(span.offset() <= source.len());
            }
            other => panic!("expected a load error, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_simulate_flags() {
        let cli = Cli::parse_from([
            "carri",
            "simulate",
            "domain.carri",
            "problem.carri",
            "--max-steps",
            "7",
            "--no-stop-when-idle",
        ]);
        match cli.command {
            Commands::Simulate {
                max_steps,
                steps_per_iteration,
                no_stop_when_idle,
                ..
            } => {
                assert_eq!(max_steps, 7);
                assert_eq!(steps_per_iteration, 0);
                assert!(no_stop_when_idle);
            }
            _ => panic!("expected simulate"),
        }
    }
}
