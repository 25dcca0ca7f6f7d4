use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use keymerge::record::records_from_value;
use keymerge::{BuiltinOperation, MergeConfig, MergeReport, Merger, Record};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Merge(args) => cmd_merge(args, cli.format),
        Command::Operations => cmd_operations(cli.format),
        Command::Check(args) => cmd_check(args, cli.format),
    }
}

fn cmd_merge(args: MergeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = build_config(&args)?;
    let merger = Merger::from_config(&config).context("invalid merge configuration")?;

    let targets = read_records(&args.targets, "targets")?;
    let sources = read_records(&args.sources, "sources")?;
    info!(
        targets = targets.len(),
        sources = sources.len(),
        keys = ?merger.keys().fields(),
        operations = ?merger.operations(),
        "merging record files"
    );

    let (merged, report) = merger.merge_with_report(targets, sources)?;
    let rendered = render(&merged, args.report.then_some(&report), format)?;

    match &args.output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("cannot write {}", path.display()))?;
            eprintln!(
                "{} Wrote {} records to {}",
                "✓".green().bold(),
                merged.len(),
                path.display().to_string().bold()
            );
        }
        None => println!("{rendered}"),
    }

    if args.report && format == OutputFormat::Text {
        print_report(&report);
    }
    Ok(())
}

fn cmd_operations(format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let listing: Vec<Value> = BuiltinOperation::ALL
                .iter()
                .map(|op| {
                    json!({
                        "name": op.as_str(),
                        "stateful": op.is_stateful(),
                        "description": op.description(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        OutputFormat::Text => {
            for op in BuiltinOperation::ALL {
                let marker = if op.is_stateful() { "stateful".yellow() } else { "pure".dimmed() };
                println!("  {:<18} {:<9} {}", op.as_str().cyan().bold(), marker, op.description());
            }
        }
    }
    Ok(())
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = MergeConfig::from_path(&args.config)?;
    config
        .validate()
        .with_context(|| format!("{} is not a valid merge configuration", args.config.display()))?;
    println!("{}", check_summary(&args.config, &config, format)?);
    Ok(())
}

fn check_summary(path: &Path, config: &MergeConfig, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&json!({
            "config": path.display().to_string(),
            "keys": config.keys,
            "operations": config.operations.len(),
        }))?),
        OutputFormat::Text => Ok(format!(
            "{} {} keys=[{}], {} operation(s)",
            "✓".green().bold(),
            path.display().to_string().bold(),
            config.keys.join(", "),
            config.operations.len()
        )),
    }
}

/// Combine the optional config file with command-line keys and operations.
/// Command-line keys replace the file's keys; `--op` entries override
/// same-named file entries.
fn build_config(args: &MergeArgs) -> anyhow::Result<MergeConfig> {
    let mut config = match &args.config {
        Some(path) => MergeConfig::from_path(path)?,
        None => MergeConfig::default(),
    };
    if !args.keys.is_empty() {
        config.keys = args.keys.clone();
    }
    for (field, op) in &args.ops {
        config.operations.insert(field.clone(), op.clone());
    }
    if config.keys.is_empty() {
        anyhow::bail!("no key fields given: pass --key or set `keys` in the config file");
    }
    debug!(?config, "effective merge configuration");
    Ok(config)
}

fn read_records(path: &Path, label: &str) -> anyhow::Result<Vec<Record>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read {label} file {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(records_from_value(value, label)?)
}

fn render(
    records: &[Record],
    report: Option<&MergeReport>,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let value = match report {
                Some(report) => json!({ "records": records, "report": report }),
                None => json!(records),
            };
            Ok(serde_json::to_string_pretty(&value)?)
        }
        OutputFormat::Text => {
            let lines = records
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(lines.join("\n"))
        }
    }
}

fn print_report(report: &MergeReport) {
    eprintln!(
        "{} {} targets, {} sources in {} keys: {} matched, {} folds, {} dropped",
        "✓".green().bold(),
        report.targets,
        report.sources,
        report.buckets,
        report.matched_targets.to_string().green(),
        report.folds,
        report.dropped_sources.to_string().yellow()
    );
}
