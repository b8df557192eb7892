//! Converge CLI entrypoint.
//!
//! This is the main entrypoint for the converge command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use converge::cli::{Cli, Commands, OutputFormatter};
use converge::error::Result;
use converge::schema::{find_definition_file, DefinitionParser, ModuleDefinition, Normalizer, TargetKind};
use converge::target::{HttpTarget, MemoryTarget, TargetSystem};
use converge::Pipeline;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force).map(|()| ExitCode::SUCCESS),
        Commands::Validate { warnings } => {
            cmd_validate(cli.file.as_ref(), warnings).map(|()| ExitCode::SUCCESS)
        }
        Commands::Plan { detailed } => {
            cmd_plan(cli.file.as_ref(), detailed, &formatter).await.map(|()| ExitCode::SUCCESS)
        }
        Commands::Apply { yes, check } => {
            cmd_apply(cli.file.as_ref(), yes, check, &formatter).await
        }
        Commands::Show => {
            cmd_show(cli.file.as_ref(), &formatter).await.map(|()| ExitCode::SUCCESS)
        }
    }
}

/// Initialize a new module definition.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Converge module in: {}", path.display());

    let definition_path = path.join("converge.module.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && definition_path.exists() {
        eprintln!("Definition file already exists: {}", definition_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write definition template
    let definition_template = include_str!("../templates/converge.module.yaml");
    std::fs::write(&definition_path, definition_template)?;
    eprintln!("Created: {}", definition_path.display());

    // Write .env.example
    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    // Write/update .gitignore
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n.env")?;
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, ".env\n")?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nModule initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your API token");
    eprintln!("  2. Edit converge.module.yaml with your schema and values");
    eprintln!("  3. Run 'converge validate' to check the definition");
    eprintln!("  4. Run 'converge plan' to see what would change");
    eprintln!("  5. Run 'converge apply' to converge the target");

    Ok(())
}

/// Validate the module definition and its values.
fn cmd_validate(file: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let definition = load_definition(file)?;

    // Definition structure was checked during parsing; now run the
    // caller's values through full normalization.
    let normalizer = Normalizer::new(&definition.schema);
    let normalized = normalizer.normalize(&definition.values)?;

    eprintln!("Definition is valid!");
    if show_warnings && !normalized.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &normalized.warnings {
            eprintln!("  - {warning}");
        }
    }

    // Show summary
    eprintln!("\nModule summary:");
    eprintln!("  Module: {}", definition.module);
    eprintln!("  Target: {:?}", definition.target.kind);
    eprintln!("  Parameters: {}", definition.schema.params.len());
    eprintln!("  Desired presence: {}", normalized.desired.presence());

    Ok(())
}

/// Show the decided action without touching the target.
async fn cmd_plan(
    file: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let definition = load_definition(file)?;
    let target = build_target(&definition)?;

    let pipeline = Pipeline::new(&definition, &target, true);
    let (action, outcome) = pipeline.plan(&definition.values).await?;

    let output = formatter.format_plan(&definition.module, &action, &outcome, detailed);
    eprintln!("{output}");

    Ok(())
}

/// Reconcile the target onto the desired state.
async fn cmd_apply(
    file: Option<&PathBuf>,
    auto_approve: bool,
    check: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let definition = load_definition(file)?;
    let target = build_target(&definition)?;

    let pipeline = Pipeline::new(&definition, &target, check);

    // Confirm before mutating
    if !auto_approve && !check {
        let (action, outcome) = pipeline.plan(&definition.values).await?;
        let preview = formatter.format_plan(&definition.module, &action, &outcome, true);
        eprintln!("{preview}");

        if !action.is_mutation() {
            return Ok(ExitCode::SUCCESS);
        }

        eprint!("Do you want to apply this change? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let report = pipeline.invoke(&definition.values).await;
    println!("{}", formatter.format_report(&report));

    if report.is_failure() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Show the resource's current state on the target.
async fn cmd_show(file: Option<&PathBuf>, formatter: &OutputFormatter) -> Result<()> {
    let definition = load_definition(file)?;
    let target = build_target(&definition)?;

    let pipeline = Pipeline::new(&definition, &target, true);
    let outcome = pipeline.observe(&definition.values).await?;

    let output = formatter.format_observation(&definition.module, &outcome);
    eprintln!("{output}");

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the definition file path.
fn resolve_definition_path(file: Option<&PathBuf>) -> Result<PathBuf> {
    file.map_or_else(|| find_definition_file("."), |path| Ok(path.clone()))
}

/// Loads and validates the module definition.
fn load_definition(file: Option<&PathBuf>) -> Result<ModuleDefinition> {
    let definition_file = resolve_definition_path(file)?;
    debug!("Loading definition from: {}", definition_file.display());

    let parser = DefinitionParser::new().with_base_path(
        definition_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    parser.load_with_env(&definition_file)
}

/// Creates the target backend named by the definition.
fn build_target(definition: &ModuleDefinition) -> Result<Box<dyn TargetSystem>> {
    match definition.target.kind {
        TargetKind::Http => Ok(Box::new(HttpTarget::new(&definition.target)?)),
        TargetKind::Memory => Ok(Box::new(MemoryTarget::new())),
    }
}
