//! DDI range CLI (rangectl)

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

use ddi_range_core::{CidrBlock, Ipv4Address, RangeChange};
use ddi_shared_types::BackendType;
use rangectl::commands::{
    AllocateArgs, AllocateCommand, ReleaseCommand, ResizeArgs, ResizeCommand, ValidateCommand,
};
use rangectl::context::CliContext;
use rangectl::output::OutputFormat;

#[derive(Parser)]
#[command(name = "rangectl")]
#[command(about = "Contiguous IPv4 range allocation on a DDI appliance")]
#[command(version)]
#[command(long_about = "
Contiguous IPv4 range allocation on a DDI appliance

Allocates sequential or explicit address ranges inside a network, grows,
shrinks and shifts existing ranges after checking the newly covered
addresses, and releases range records. Connection settings come from an
optional configuration file and INFOBLOX_* environment variables.

Examples:
  rangectl allocate --cidr 172.19.4.0/24 --count 10
  rangectl allocate --cidr 172.19.4.0/24 --start 172.19.4.200 --end 172.19.4.209
  rangectl resize --reference range/ZG5z... --cidr 172.19.4.0/24 \\
                  --start 172.19.4.1 --end 172.19.4.10 --count 12
  rangectl validate --cidr 172.19.4.0/24 --start 172.19.4.50 --end 172.19.4.40
  rangectl release --reference range/ZG5z...
  rangectl --backend memory --format json allocate --cidr 10.0.0.0/28 --count 4
")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Backend to use instead of the configured one (infoblox, memory)
    #[arg(long, global = true)]
    backend: Option<BackendType>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate a new range
    #[command(group(ArgGroup::new("size").required(true).args(["count", "start"])))]
    Allocate {
        /// Network to allocate in
        #[arg(long)]
        cidr: CidrBlock,

        /// Number of sequential addresses
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// First address of an explicit range
        #[arg(long, requires = "end")]
        start: Option<Ipv4Address>,

        /// Last address of an explicit range
        #[arg(long, requires = "start")]
        end: Option<Ipv4Address>,

        /// Range name
        #[arg(long)]
        name: Option<String>,

        /// Range comment
        #[arg(long)]
        comment: Option<String>,

        /// Compute the range without creating it
        #[arg(long)]
        dry_run: bool,
    },

    /// Grow, shrink or shift an existing range
    #[command(group(
        ArgGroup::new("change")
            .required(true)
            .multiple(true)
            .args(["count", "new_start", "new_end"])
    ))]
    Resize {
        /// Range record reference
        #[arg(short, long)]
        reference: Option<String>,

        /// Network of the range
        #[arg(long)]
        cidr: CidrBlock,

        /// Current first address
        #[arg(long)]
        start: Ipv4Address,

        /// Current last address
        #[arg(long)]
        end: Ipv4Address,

        /// New number of addresses
        #[arg(short = 'n', long)]
        count: Option<u64>,

        /// New first address
        #[arg(long)]
        new_start: Option<Ipv4Address>,

        /// New last address
        #[arg(long)]
        new_end: Option<Ipv4Address>,

        /// Check the change without updating the record
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate range bounds locally
    Validate {
        #[arg(long)]
        cidr: CidrBlock,

        #[arg(long)]
        start: Ipv4Address,

        #[arg(long)]
        end: Ipv4Address,
    },

    /// Delete a range record
    Release {
        /// Range record reference
        #[arg(short, long)]
        reference: String,
    },
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { cidr, start, end } => {
            ValidateCommand::new(cli.format).execute(cidr, start, end)?;
        }

        Commands::Allocate {
            cidr,
            count,
            start,
            end,
            name,
            comment,
            dry_run,
        } => {
            let context =
                CliContext::bootstrap(cli.config.as_deref(), cli.backend, cli.format).await?;
            let args = AllocateArgs {
                cidr: Some(cidr),
                count,
                start,
                end,
                name,
                comment,
                dry_run,
            };
            AllocateCommand::new(context).execute(&args).await?;
        }

        Commands::Resize {
            reference,
            cidr,
            start,
            end,
            count,
            new_start,
            new_end,
            dry_run,
        } => {
            let context =
                CliContext::bootstrap(cli.config.as_deref(), cli.backend, cli.format).await?;
            let args = ResizeArgs {
                reference,
                cidr,
                start,
                end,
                change: RangeChange {
                    count,
                    start: new_start,
                    end: new_end,
                },
                dry_run,
            };
            ResizeCommand::new(context).execute(&args).await?;
        }

        Commands::Release { reference } => {
            let context =
                CliContext::bootstrap(cli.config.as_deref(), cli.backend, cli.format).await?;
            ReleaseCommand::new(context).execute(&reference).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let quiet = cli.quiet;
    let show_chain = cli.verbose || cli.debug;

    match run(cli).await {
        Ok(()) => {
            if !quiet {
                log::info!("Command completed successfully");
            }
            std::process::exit(0);
        }
        Err(e) => {
            if !quiet {
                eprintln!("Error: {}", e);

                // Print error chain if in verbose mode
                if show_chain {
                    for cause in e.chain().skip(1) {
                        eprintln!("  Caused by: {}", cause);
                    }
                }
            }
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rangectl").chain(args.iter().copied()))
    }

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags() {
        let cli = parse(&[
            "--backend",
            "memory",
            "--format",
            "json",
            "-v",
            "validate",
            "--cidr",
            "172.19.4.0/24",
            "--start",
            "172.19.4.1",
            "--end",
            "172.19.4.10",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.backend, Some(BackendType::Memory));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Validate { .. }));

        let err = parse(&["--version"]).err().unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_allocate_requires_count_or_bounds() {
        let cli = parse(&["allocate", "--cidr", "172.19.4.0/24", "--count", "10"]).unwrap();
        match cli.command {
            Commands::Allocate { count, start, .. } => {
                assert_eq!(count, Some(10));
                assert!(start.is_none());
            }
            _ => panic!("expected allocate"),
        }

        let cli = parse(&[
            "allocate",
            "--cidr",
            "172.19.4.0/24",
            "--start",
            "172.19.4.200",
            "--end",
            "172.19.4.209",
            "--dry-run",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Allocate { dry_run: true, count: None, .. }
        ));

        assert!(parse(&["allocate", "--cidr", "172.19.4.0/24"]).is_err());
        assert!(parse(&[
            "allocate",
            "--cidr",
            "172.19.4.0/24",
            "--start",
            "172.19.4.200",
        ])
        .is_err());
        assert!(parse(&[
            "allocate",
            "--cidr",
            "172.19.4.0/24",
            "-n",
            "4",
            "--start",
            "172.19.4.200",
            "--end",
            "172.19.4.209",
        ])
        .is_err());
    }

    #[test]
    fn test_resize_requires_a_change() {
        let base = [
            "resize",
            "-r",
            "range/abc",
            "--cidr",
            "172.19.4.0/24",
            "--start",
            "172.19.4.10",
            "--end",
            "172.19.4.20",
        ];
        assert!(parse(&base).is_err());

        let mut args = base.to_vec();
        args.extend(["--count", "12"]);
        assert!(matches!(
            parse(&args).unwrap().command,
            Commands::Resize { count: Some(12), .. }
        ));

        let mut args = base.to_vec();
        args.extend(["--new-start", "172.19.4.25", "--new-end", "172.19.4.30"]);
        match parse(&args).unwrap().command {
            Commands::Resize {
                reference,
                new_start,
                new_end,
                count,
                ..
            } => {
                assert_eq!(reference.as_deref(), Some("range/abc"));
                assert_eq!(new_start, Some("172.19.4.25".parse().unwrap()));
                assert_eq!(new_end, Some("172.19.4.30".parse().unwrap()));
                assert!(count.is_none());
            }
            _ => panic!("expected resize"),
        }
    }

    #[test]
    fn test_release_and_validate_arguments() {
        let cli = parse(&["release", "--reference", "range/abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Release { ref reference } if reference == "range/abc"
        ));
        assert!(parse(&["release"]).is_err());

        assert!(parse(&["validate", "--cidr", "172.19.4.0/24", "--start", "172.19.4.1"]).is_err());
        assert!(parse(&[
            "validate",
            "--cidr",
            "not-a-cidr",
            "--start",
            "172.19.4.1",
            "--end",
            "172.19.4.2",
        ])
        .is_err());
    }
}
