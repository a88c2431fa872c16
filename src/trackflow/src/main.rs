//! TrackFlow — multi-touch attribution for CRM conversion journeys.
//!
//! Reads a conversion journey and attribution model definitions from JSON,
//! runs the attribution engine and prints the result as JSON on stdout.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use trackflow_attribution::{calculate_attribution, summarize_journey, ConversionJourney, ModelRegistry};
use trackflow_core::config::AppConfig;
use trackflow_core::model::{AttributionModel, ModelType};

#[derive(Parser, Debug)]
#[command(name = "trackflow")]
#[command(about = "Multi-touch attribution for CRM conversion journeys")]
#[command(version)]
struct Cli {
    /// TOML config file, layered under `TRACKFLOW__*` environment variables
    #[arg(long, env = "TRACKFLOW_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attribute one conversion journey
    Attribute(AttributeArgs),
    /// List attribution models and the resolved default
    Models {
        /// JSON array of attribution model definitions
        #[arg(long)]
        models: PathBuf,
    },
}

#[derive(Args, Debug)]
struct AttributeArgs {
    /// Journey JSON: conversion value, optional conversion time, touchpoints
    #[arg(long)]
    journey: PathBuf,

    /// JSON array of attribution model definitions
    #[arg(long)]
    models: Option<PathBuf>,

    /// Registered model to use (defaults to the default model)
    #[arg(long)]
    model: Option<String>,

    /// Run an ad-hoc model of this type instead of a registered one
    #[arg(long)]
    model_type: Option<String>,

    /// Lookback window in days (overrides the model)
    #[arg(long)]
    lookback_days: Option<u32>,

    /// Time-decay rate in (0, 1] (overrides the model)
    #[arg(long)]
    decay_rate: Option<f64>,

    /// Minimum touchpoints required (overrides the model)
    #[arg(long)]
    minimum_touchpoints: Option<u32>,

    /// Print source and campaign rollups alongside the channel breakdown
    #[arg(long, default_value_t = false)]
    summary: bool,
}

#[derive(Serialize)]
struct ModelListing {
    default: String,
    models: Vec<AttributionModel>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackflow=info,trackflow_attribution=warn".into()),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    let registry = ModelRegistry::new(&config.attribution);

    match cli.command {
        Command::Attribute(args) => {
            if let Some(path) = &args.models {
                load_models(&registry, path)?;
            }
            attribute(&config, &registry, &args)
        }
        Command::Models { models } => {
            load_models(&registry, &models)?;
            let listing = ModelListing {
                default: registry.default_model().name,
                models: registry.list(),
            };
            println!("{}", serde_json::to_string_pretty(&listing)?);
            Ok(())
        }
    }
}

fn load_models(registry: &ModelRegistry, path: &Path) -> anyhow::Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading models from {}", path.display()))?;
    let count = registry
        .load_json(&raw)
        .with_context(|| format!("loading models from {}", path.display()))?;
    info!(count, path = %path.display(), "Attribution models loaded");
    Ok(())
}

fn select_model(registry: &ModelRegistry, args: &AttributeArgs) -> AttributionModel {
    let mut model = match &args.model_type {
        Some(name) => AttributionModel::new(ModelType::from_name(name)).with_name("cli"),
        None => registry.resolve(args.model.as_deref()),
    };
    if let Some(days) = args.lookback_days {
        model.lookback_days = Some(days);
    }
    if let Some(rate) = args.decay_rate {
        model.decay_rate = Some(rate);
    }
    if let Some(minimum) = args.minimum_touchpoints {
        model.minimum_touchpoints = minimum;
    }
    model
}

fn attribute(config: &AppConfig, registry: &ModelRegistry, args: &AttributeArgs) -> anyhow::Result<()> {
    let raw = fs::read_to_string(&args.journey)
        .with_context(|| format!("reading journey from {}", args.journey.display()))?;
    let journey: ConversionJourney = serde_json::from_str(&raw)
        .with_context(|| format!("parsing journey {}", args.journey.display()))?;
    let touchpoints = journey.collect_touchpoints(&config.attribution)?;

    let model = select_model(registry, args);
    info!(
        model = %model.name,
        model_type = %model.effective_type(),
        touchpoints = touchpoints.len(),
        conversion_value = journey.conversion_value,
        "Calculating attribution"
    );

    let output = if args.summary {
        serde_json::to_string_pretty(&summarize_journey(
            &touchpoints,
            journey.conversion_value,
            &model,
        )?)?
    } else {
        serde_json::to_string_pretty(&calculate_attribution(
            &touchpoints,
            journey.conversion_value,
            &model,
        )?)?
    };
    println!("{output}");
    Ok(())
}
