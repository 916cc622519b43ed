use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;

use stream_co2e::{
    compute, AssumptionSet, EmissionBreakdown, EquivalenceConverter, EquivalenceResult,
    SelectionParameters,
};

#[derive(Parser, Debug)]
#[command(name = "stream_co2e", about = "Estimate the CO2e of watching online video")]
struct Args {
    /// Path to the assumptions YAML file
    #[arg(long, default_value = "assumptions.yaml")]
    assumptions: PathBuf,

    #[arg(long, default_value = "laptop")]
    device: String,

    #[arg(long, default_value = "fixed")]
    network: String,

    #[arg(long, default_value = "1080p")]
    resolution: String,

    #[arg(long, default_value = "fr")]
    region: String,

    /// Viewing time in minutes
    #[arg(long, default_value_t = 60.0)]
    minutes: f64,

    /// Treat the duration as a weekly habit and report per year
    #[arg(long)]
    weekly: bool,

    /// Add amortized device manufacturing to the total
    #[arg(long)]
    include_production: bool,

    /// Override a coefficient for this run, e.g. region.fr.gco2_per_kwh=60
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    selection: &'a SelectionParameters,
    breakdown: &'a EmissionBreakdown,
    equivalences: &'a EquivalenceResult,
}

fn parse_override(raw: &str) -> Result<(&str, f64)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("override '{raw}' must look like KEY=VALUE"))?;
    let value: f64 = value
        .trim()
        .parse()
        .with_context(|| format!("override '{raw}' has a non-numeric value"))?;
    Ok((key.trim(), value))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut assumptions = AssumptionSet::load(&args.assumptions)?;
    info!(
        path = %args.assumptions.display(),
        coefficients = assumptions.len(),
        "assumptions loaded"
    );
    for raw in &args.overrides {
        let (key, value) = parse_override(raw)?;
        assumptions.set_override(key, value)?;
    }

    let mut selection = SelectionParameters::new(
        args.device,
        args.resolution,
        args.network,
        args.region,
        args.minutes,
    );
    if args.weekly {
        selection = selection.weekly();
    }
    if args.include_production {
        selection = selection.with_production();
    }

    let breakdown = compute(&assumptions, &selection)?;
    let converter = EquivalenceConverter::from_assumptions(&assumptions);
    let equivalences = converter.convert(breakdown.total_g(), &assumptions);

    if args.json {
        let report = Report {
            selection: &selection,
            breakdown: &breakdown,
            equivalences: &equivalences,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    // term,category,grams
    for t in breakdown.terms() {
        println!("{},{:?},{:.4}", t.id, t.category, t.grams);
    }
    println!("total,,{:.4}", breakdown.total_g());
    println!("total_kg,,{:.6}", breakdown.total_kg());
    println!("usage_total,,{:.4}", breakdown.usage_total_g());
    for (unit, quantity) in &equivalences.quantities {
        println!("{unit},,{quantity}");
    }
    for unit in &equivalences.failed {
        println!("{unit},,n/a");
    }

    Ok(())
}
