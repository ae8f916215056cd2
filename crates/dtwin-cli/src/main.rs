//! dtwin command line
//!
//! Validates model definitions locally and runs reference-safe deletions
//! against a twin-graph service.

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use dtwin_core::{
    CascadeReport, DeletionOrchestrator, DtwinConfig, FailedItem, LogFormat, ModelDeletionReport,
    TwinDeletionReport,
};
use dtwin_model::{ModelId, ModelRepository, RepositoryError};
use dtwin_service::{RestTwinGraph, TwinFilter, TwinGraphService};
use futures::TryStreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let model_arg = || {
        Arg::new("model")
            .required(true)
            .help("Model identifier (dtmi:...;N)")
    };
    let twin_arg = || Arg::new("twin").required(true).help("Twin identifier");

    Command::new("dtwin")
        .version(dtwin_core::VERSION)
        .about("Reference-safe model and twin management for a twin-graph service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (.toml, .yaml or .yml)"),
        )
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .global(true)
                .help("Service base URL (overrides config and environment)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["pretty", "json"])
                .help("Log output format"),
        )
        .subcommand(
            Command::new("validate")
                .about("Parse the definitions under a directory without contacting the service")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory searched recursively for definition files"),
                ),
        )
        .subcommand(
            Command::new("upload-models")
                .about("Validate the definitions under a directory and upload them")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory searched recursively for definition files"),
                ),
        )
        .subcommand(
            Command::new("list-models")
                .about("List models on the service")
                .arg(
                    Arg::new("definitions")
                        .long("definitions")
                        .action(ArgAction::SetTrue)
                        .help("Print full definitions as JSON"),
                ),
        )
        .subcommand(Command::new("get-model").about("Show one model").arg(model_arg()))
        .subcommand(
            Command::new("decommission-model")
                .about("Stop new twins from using a model")
                .arg(model_arg()),
        )
        .subcommand(
            Command::new("delete-model")
                .about("Delete one model (fails while others reference it)")
                .arg(model_arg()),
        )
        .subcommand(
            Command::new("delete-all-models")
                .about("Delete every model on the service in dependency order"),
        )
        .subcommand(Command::new("get-twin").about("Show one twin").arg(twin_arg()))
        .subcommand(
            Command::new("delete-twin")
                .about("Delete a twin after removing its relationships")
                .arg(twin_arg()),
        )
        .subcommand(
            Command::new("delete-all-twins")
                .about("Delete every twin, or every twin of a model")
                .arg(
                    Arg::new("model")
                        .long("model")
                        .help("Only twins of this model or a model extending it"),
                ),
        )
        .subcommand(
            Command::new("list-relationships")
                .about("List relationships of a twin")
                .arg(twin_arg())
                .arg(
                    Arg::new("incoming")
                        .long("incoming")
                        .action(ArgAction::SetTrue)
                        .help("List relationships targeting the twin instead"),
                ),
        )
}

/// Config file, then environment, then flags
fn load_config(matches: &ArgMatches) -> Result<DtwinConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => DtwinConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => DtwinConfig::new(),
    }
    .with_env();

    if let Some(endpoint) = matches.get_one::<String>("endpoint") {
        config = config.with_endpoint(endpoint.clone());
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config = config.with_log_format(format.parse()?);
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &DtwinConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.with_target(false).init(),
    }
}

fn model_id(args: &ArgMatches, name: &str) -> Result<ModelId> {
    let raw = args
        .get_one::<String>(name)
        .with_context(|| format!("missing <{name}>"))?;
    raw.parse()
        .with_context(|| format!("`{raw}` is not a model identifier"))
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a String> {
    args.get_one::<String>(name)
        .with_context(|| format!("missing <{name}>"))
}

fn service(config: &DtwinConfig) -> Result<Arc<dyn TwinGraphService>> {
    let rest = RestTwinGraph::new(config.rest_config()?)?;
    Ok(Arc::new(rest))
}

/// Orchestrator whose runs stop at the next await point on Ctrl-C
fn orchestrator(config: &DtwinConfig) -> Result<DeletionOrchestrator> {
    let orchestrator = DeletionOrchestrator::from_config(service(config)?, config);
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling");
            token.cancel();
        }
    });
    Ok(orchestrator)
}

fn print_failures(failed: &[FailedItem]) {
    for item in failed {
        println!(
            "  FAILED {} ({}): {} {} {}",
            item.id, item.operation, item.error.status, item.error.error_code, item.error.message
        );
    }
}

fn print_model_report(report: &ModelDeletionReport) {
    println!("Model deletion run {}", report.run_id);
    for pass in &report.passes {
        println!(
            "Pass {}: {} deleted, {} failed",
            pass.pass,
            pass.deleted.len(),
            pass.failed.len()
        );
        for id in &pass.deleted {
            println!("  deleted {id}");
        }
        print_failures(&pass.failed);
    }
    if !report.stalled.is_empty() {
        println!("No progress; {} model(s) still referenced:", report.stalled.len());
        for id in &report.stalled {
            println!("  {id}");
        }
    }
    println!("Deleted: {}", report.deleted_count());
}

fn print_cascade(cascade: &CascadeReport) {
    println!(
        "Twin {}: {} outgoing, {} incoming relationship(s) deleted",
        cascade.twin_id, cascade.outgoing, cascade.incoming
    );
    print_failures(&cascade.failures);
}

fn print_twin_report(report: &TwinDeletionReport) {
    println!("Twin deletion run {}", report.run_id);
    println!("Relationships deleted: {}", report.relationships_deleted());
    for cascade in report.cascades.iter().filter(|c| !c.is_success()) {
        print_cascade(cascade);
    }
    println!("Twins deleted: {}", report.deleted.len());
    print_failures(&report.failed);
}

fn print_validation_issues(err: &RepositoryError) {
    if let Some(issues) = err.issues() {
        for issue in issues {
            println!("  {issue}");
        }
    }
}

/// Run one subcommand; `Ok(false)` means it finished with failures
async fn run(matches: &ArgMatches, config: &DtwinConfig) -> Result<bool> {
    match matches.subcommand() {
        Some(("validate", args)) => {
            let dir = args
                .get_one::<PathBuf>("dir")
                .context("missing <dir>")?;
            let mut repository = ModelRepository::new(Arc::new(config.parser()))
                .with_load_mode(config.load_mode());
            match repository.validate_models(dir).await {
                Ok(count) => {
                    println!("Valid: {count} interface(s) in {}", dir.display());
                    Ok(true)
                }
                Err(err) => {
                    println!("Invalid: {err}");
                    print_validation_issues(&err);
                    Ok(false)
                }
            }
        }
        Some(("upload-models", args)) => {
            let dir = args
                .get_one::<PathBuf>("dir")
                .context("missing <dir>")?;
            let created = orchestrator(config)?.upload_models(dir).await?;
            println!("Uploaded {} model(s)", created.len());
            for model in created {
                println!("  {}", model.id);
            }
            Ok(true)
        }
        Some(("list-models", args)) => {
            let with_definitions = args.get_flag("definitions");
            let models: Vec<_> = service(config)?
                .list_models(with_definitions)
                .try_collect()
                .await?;
            if with_definitions {
                println!("{}", serde_json::to_string_pretty(&models)?);
            } else {
                for model in &models {
                    let state = if model.decommissioned { " (decommissioned)" } else { "" };
                    println!("{}{state}", model.id);
                }
            }
            Ok(true)
        }
        Some(("get-model", args)) => {
            let model = service(config)?.get_model(&model_id(args, "model")?).await?;
            println!("{}", serde_json::to_string_pretty(&model)?);
            Ok(true)
        }
        Some(("decommission-model", args)) => {
            let id = model_id(args, "model")?;
            service(config)?.decommission_model(&id).await?;
            println!("Decommissioned {id}");
            Ok(true)
        }
        Some(("delete-model", args)) => {
            let id = model_id(args, "model")?;
            orchestrator(config)?.delete_model(&id).await?;
            println!("Deleted {id}");
            Ok(true)
        }
        Some(("delete-all-models", _)) => {
            let report = orchestrator(config)?.delete_all_models().await?;
            print_model_report(&report);
            Ok(report.is_success())
        }
        Some(("get-twin", args)) => {
            let twin = service(config)?.get_twin(required(args, "twin")?).await?;
            println!("{}", serde_json::to_string_pretty(&twin)?);
            Ok(true)
        }
        Some(("delete-twin", args)) => {
            let cascade = orchestrator(config)?
                .delete_twin(required(args, "twin")?)
                .await?;
            print_cascade(&cascade);
            println!("Deleted twin {}", cascade.twin_id);
            Ok(cascade.is_success())
        }
        Some(("delete-all-twins", args)) => {
            let filter = match args.get_one::<String>("model") {
                Some(_) => TwinFilter::OfModel(model_id(args, "model")?),
                None => TwinFilter::All,
            };
            let report = orchestrator(config)?.delete_all_twins(&filter).await?;
            print_twin_report(&report);
            Ok(report.is_success())
        }
        Some(("list-relationships", args)) => {
            let twin = required(args, "twin")?;
            let service = service(config)?;
            if args.get_flag("incoming") {
                let incoming: Vec<_> = service.get_incoming_relationships(twin).try_collect().await?;
                for rel in incoming {
                    println!("{} --{}--> {twin} ({})", rel.source_id, rel.relationship_name, rel.relationship_id);
                }
            } else {
                let outgoing: Vec<_> = service.get_relationships(twin).try_collect().await?;
                for rel in outgoing {
                    println!("{twin} --{}--> {} ({})", rel.name, rel.target_id, rel.id);
                }
            }
            Ok(true)
        }
        Some((other, _)) => anyhow::bail!("unknown command `{other}`"),
        None => anyhow::bail!("no command given"),
    }
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    match run(&matches, &config).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}
