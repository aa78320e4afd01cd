use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Automated reproducibility probing for archived research artifacts
#[derive(Parser, Debug)]
#[command(
    name = "reprodock",
    about = "Automated reproducibility probing for archived research artifacts",
    version,
    long_about = "reprodock rebuilds each artifact's Dockerfile across a matrix of base-OS \
                  versions, repairs build failures through an external LLM repair service, \
                  runs the resulting image, and records pass/fail outcomes to an append-only \
                  CSV table for downstream analysis."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Probe all artifacts in a directory across the version matrix",
        long_about = "Discovers artifact subdirectories, rebuilds each Dockerfile per target \
                      version with automated repair on failure, runs successful images and \
                      appends one outcome record per (artifact, version) pair.\n\n\
                      Examples:\n  \
                      reprodock run ./artifacts\n  \
                      reprodock run ./artifacts --artifact RosuS12\n  \
                      reprodock run ./artifacts --versions 20.04,22.04 --max-retries 1"
    )]
    Run(RunArgs),

    #[command(
        about = "Check Docker daemon and repair service configuration",
        long_about = "Verifies that the Docker daemon is reachable and that a repair service \
                      token is configured. Exits nonzero when either check fails."
    )]
    Health,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "DIRECTORY", help = "Directory containing artifact subdirectories")]
    pub directory: PathBuf,

    #[arg(
        short = 'a',
        long,
        value_name = "ID",
        help = "Probe a single artifact instead of all discovered ones"
    )]
    pub artifact: Option<String>,

    #[arg(long, value_name = "FILE", help = "Outcome table path (default: results.csv)")]
    pub results: Option<PathBuf>,

    #[arg(
        long,
        value_name = "N",
        help = "Maximum repair attempts per failed build (default: 3)"
    )]
    pub max_retries: Option<u32>,

    #[arg(
        long,
        value_name = "NAME",
        help = "Base image whose version token is substituted (default: ubuntu)"
    )]
    pub base_image: Option<String>,

    #[arg(
        long,
        value_name = "VERSIONS",
        value_delimiter = ',',
        help = "Comma-separated target version matrix override"
    )]
    pub versions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_run_args() {
        let args = CliArgs::parse_from(["reprodock", "run", "/tmp/artifacts"]);
        match args.command {
            Commands::Run(run_args) => {
                assert_eq!(run_args.directory, PathBuf::from("/tmp/artifacts"));
                assert!(run_args.artifact.is_none());
                assert!(run_args.results.is_none());
                assert!(run_args.max_retries.is_none());
                assert!(run_args.versions.is_empty());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_options() {
        let args = CliArgs::parse_from([
            "reprodock",
            "run",
            ".",
            "--artifact",
            "RosuS12",
            "--versions",
            "20.04,22.04",
            "--max-retries",
            "1",
            "--results",
            "out.csv",
        ]);

        match args.command {
            Commands::Run(run_args) => {
                assert_eq!(run_args.artifact.as_deref(), Some("RosuS12"));
                assert_eq!(run_args.versions, vec!["20.04", "22.04"]);
                assert_eq!(run_args.max_retries, Some(1));
                assert_eq!(run_args.results, Some(PathBuf::from("out.csv")));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_health_command() {
        let args = CliArgs::parse_from(["reprodock", "health"]);
        assert!(matches!(args.command, Commands::Health));
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["reprodock", "-v", "health"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["reprodock", "--log-level", "debug", "health"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}
