use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keymerge",
    about = "keymerge: merge JSON records by composite key",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge a sources file into a targets file
    Merge(MergeArgs),
    /// List the built-in operations
    Operations,
    /// Validate a merge configuration file
    Check(CheckArgs),
}

#[derive(Args)]
pub struct MergeArgs {
    /// JSON file holding an array of target records
    #[arg(long)]
    pub targets: PathBuf,
    /// JSON file holding an array of source records
    #[arg(long)]
    pub sources: PathBuf,
    /// Key field; repeat for composite keys (replaces the config's keys)
    #[arg(short = 'k', long = "key")]
    pub keys: Vec<String>,
    /// Per-field operation as FIELD=OPERATION, e.g. score=sum
    #[arg(long = "op", value_parser = parse_field_op)]
    pub ops: Vec<(String, String)>,
    /// TOML merge configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Write merged records here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Print merge counters
    #[arg(long)]
    pub report: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    pub config: PathBuf,
}

fn parse_field_op(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((field, op)) if !field.is_empty() && !op.is_empty() => {
            Ok((field.to_string(), op.to_string()))
        }
        _ => Err(format!("expected FIELD=OPERATION, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_merge() {
        let cli = Cli::try_parse_from([
            "keymerge", "merge", "--targets", "t.json", "--sources", "s.json", "-k", "key",
        ])
        .unwrap();
        if let Command::Merge(args) = cli.command {
            assert_eq!(args.targets, PathBuf::from("t.json"));
            assert_eq!(args.sources, PathBuf::from("s.json"));
            assert_eq!(args.keys, vec!["key"]);
            assert!(args.ops.is_empty());
            assert!(!args.report);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_merge_with_composite_key_and_ops() {
        let cli = Cli::try_parse_from([
            "keymerge", "merge", "--targets", "t.json", "--sources", "s.json",
            "--key", "region", "--key", "id", "--op", "score=sum", "--op", "seen=countNotNull",
        ])
        .unwrap();
        if let Command::Merge(args) = cli.command {
            assert_eq!(args.keys, vec!["region", "id"]);
            assert_eq!(
                args.ops,
                vec![
                    ("score".to_string(), "sum".to_string()),
                    ("seen".to_string(), "countNotNull".to_string()),
                ]
            );
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_merge_rejects_malformed_op() {
        let result = Cli::try_parse_from([
            "keymerge", "merge", "--targets", "t.json", "--sources", "s.json", "--op", "score",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_merge_requires_inputs() {
        assert!(Cli::try_parse_from(["keymerge", "merge", "--targets", "t.json"]).is_err());
    }

    #[test]
    fn parse_merge_with_config_and_output() {
        let cli = Cli::try_parse_from([
            "keymerge", "merge", "--targets", "t.json", "--sources", "s.json",
            "-c", "merge.toml", "-o", "out.json", "--report",
        ])
        .unwrap();
        if let Command::Merge(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("merge.toml")));
            assert_eq!(args.output, Some(PathBuf::from("out.json")));
            assert!(args.report);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_operations() {
        let cli = Cli::try_parse_from(["keymerge", "operations"]).unwrap();
        assert!(matches!(cli.command, Command::Operations));
    }

    #[test]
    fn parse_check() {
        let cli = Cli::try_parse_from(["keymerge", "check", "merge.toml"]).unwrap();
        if let Command::Check(args) = cli.command {
            assert_eq!(args.config, PathBuf::from("merge.toml"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["keymerge", "--verbose", "operations"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["keymerge", "--format", "json", "operations"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }
}
