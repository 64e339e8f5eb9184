use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use labtools::app::{
    App, CollectionSelector, DefinitionsResult, DownloadRequest, DownloadResult, SchemasResult,
};
use labtools::builder::{BuildSummary, ItemWindow};
use labtools::config::{ConfigLoader, ResolvedConfig};
use labtools::definitions::Definitions;
use labtools::download::DownloadStatus;
use labtools::error::LabError;
use labtools::extract::GeoJsonExtractor;
use labtools::output::JsonOutput;
use labtools::psup::{HarvestOutcome, PsupHttpClient};
use labtools::registry;
use labtools::schemas;

#[derive(Parser)]
#[command(name = "labtools")]
#[command(about = "Harvest PSUP product metadata and build STAC catalogs")]
#[command(version, author)]
struct Cli {
    /// Path to the config file (default: ./labtools.json)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show the resolved configuration")]
    Config,
    #[command(about = "List registered metadata schemas")]
    Schemas,
    #[command(about = "List collection definitions")]
    Definitions,
    #[command(about = "Harvest collections and download their data files")]
    Download(DownloadArgs),
    #[command(about = "Build the STAC catalog from harvested collections")]
    Build(BuildArgs),
}

#[derive(Args)]
struct DownloadArgs {
    /// `all` or comma-separated collection ids
    ids: String,

    #[arg(long)]
    overwrite: bool,

    /// Data files fetched per collection
    #[arg(long)]
    n_max_items: Option<usize>,
}

#[derive(Args)]
struct BuildArgs {
    /// `all` or comma-separated collection ids
    ids: String,

    #[arg(long, default_value_t = 0)]
    item_start: usize,

    /// Items written per collection
    #[arg(long)]
    n_max_items: Option<usize>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(lab) = report.downcast_ref::<LabError>() {
            return ExitCode::from(map_exit_code(lab));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &LabError) -> u8 {
    match error {
        LabError::MissingConfig
        | LabError::DefinitionNotFound(_)
        | LabError::UnknownSchema(_)
        | LabError::InvalidSourceCollection(_) => 2,
        LabError::MalformedResponse(_)
        | LabError::ServiceHttp(_)
        | LabError::ServiceStatus { .. }
        | LabError::Download(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    schemas::register_all(&mut registry::global_mut(), Arc::new(GeoJsonExtractor))?;
    let registry = registry::global();

    if let Commands::Config = cli.command {
        return print_config(&config, cli.json);
    }

    let definitions = Definitions::load(&config.definitions)?;
    let client = PsupHttpClient::with_timeout(Duration::from_secs(config.timeout_secs))?;
    let app = App::new(config, definitions, &registry, client.clone(), client);

    match cli.command {
        Commands::Config => Ok(()),
        Commands::Schemas => print_schemas(&app.schemas(), cli.json),
        Commands::Definitions => print_definitions(&app.definitions()?, cli.json),
        Commands::Download(args) => {
            let selector: CollectionSelector = args.ids.parse()?;
            let request = DownloadRequest {
                overwrite: args.overwrite,
                max_items: args.n_max_items,
                ..DownloadRequest::default()
            };
            let result = app.download(&selector, &request)?;
            print_download(&result, cli.json)
        }
        Commands::Build(args) => {
            let selector: CollectionSelector = args.ids.parse()?;
            let window = ItemWindow {
                start: args.item_start,
                max_items: args.n_max_items,
            };
            let summary = app.build(&selector, window)?;
            print_build(&summary, cli.json)
        }
    }
}

fn print_config(config: &ResolvedConfig, json: bool) -> miette::Result<()> {
    if json {
        return JsonOutput::print_config(config).into_diagnostic();
    }
    println!("source_dir:     {}", config.source_dir);
    println!("stac_dir:       {}", config.stac_dir);
    println!("definitions:    {}", config.definitions);
    println!("max_products:   {}", config.max_products);
    match config.download_limit {
        Some(limit) => println!("download_limit: {limit}"),
        None => println!("download_limit: none"),
    }
    println!("concurrency:    {}", config.concurrency);
    println!("timeout_secs:   {}", config.timeout_secs);
    Ok(())
}

fn print_schemas(result: &SchemasResult, json: bool) -> miette::Result<()> {
    if json {
        return JsonOutput::print_schemas(result).into_diagnostic();
    }
    for schema in &result.schemas {
        println!("{schema}");
    }
    Ok(())
}

fn print_definitions(result: &DefinitionsResult, json: bool) -> miette::Result<()> {
    if json {
        return JsonOutput::print_definitions(result).into_diagnostic();
    }
    for entry in &result.collections {
        let schema = entry.schema.as_deref().unwrap_or("-");
        println!("{} [{schema}] {}", entry.id, entry.title);
        println!("   catalogs: {}", entry.parents.join(" > "));
    }
    Ok(())
}

fn print_download(result: &DownloadResult, json: bool) -> miette::Result<()> {
    if json {
        return JsonOutput::print_download(result).into_diagnostic();
    }
    for collection in &result.collections {
        println!("{} ({})", collection.id, collection.action);
        match &collection.harvest {
            Some(HarvestOutcome::Skipped(path)) => println!("   source: {path} (exists)"),
            Some(HarvestOutcome::Written(path)) => println!("   source: {path}"),
            None => {}
        }
        let Some(report) = &collection.data else {
            continue;
        };
        for product in &report.products {
            let status = match &product.status {
                DownloadStatus::Downloaded => "DONE".to_string(),
                DownloadStatus::Exists => "EXISTS".to_string(),
                DownloadStatus::Cancelled => "CANCELLED".to_string(),
                DownloadStatus::Failed(message) => format!("ERROR: {message}"),
            };
            println!("   {} {status}", product.url);
        }
        if !report.skipped_records.is_empty() {
            println!("   skipped records: {}", report.skipped_records.len());
        }
    }
    Ok(())
}

fn print_build(summary: &BuildSummary, json: bool) -> miette::Result<()> {
    if json {
        return JsonOutput::print_build(summary).into_diagnostic();
    }
    println!("saved to {} ({} catalogs)", summary.stac_dir, summary.catalogs);
    for collection in &summary.collections {
        println!(
            "   {} items: {} skipped records: {}",
            collection.id, collection.items, collection.skipped_records
        );
    }
    Ok(())
}
