mod commands;
mod config;
mod shutdown;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kfi_core::Arch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{FileConfig, parse_duration};

#[derive(Parser)]
#[command(name = "kfi")]
#[command(about = "Flip single bits in the registers of running processes")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "KFI_CONFIG")]
    config: Option<PathBuf>,

    /// How long to wait for the target to stop (microseconds)
    #[arg(long, global = true)]
    stop_timeout_us: Option<u64>,

    /// Sleep between stopped-state probes (microseconds)
    #[arg(long, global = true)]
    poll_interval_us: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Flip one register bit in a running process
    Inject {
        /// Target process id
        pid: String,
        /// Register index or name; random when omitted or out of range
        register: Option<String>,
        /// Bit index; random when omitted or out of range
        bit: Option<String>,
    },
    /// List the register table
    Registers {
        /// Architecture to show (defaults to this machine's)
        #[arg(long)]
        arch: Option<Arch>,
    },
    /// Run a command and inject random faults into it until it exits
    Campaign {
        /// Mean time between faults, e.g. 500ms, 30s, 2m
        #[arg(short, long, value_parser = parse_rate)]
        rate: Option<Duration>,
        /// Stop injecting after this many faults
        #[arg(long)]
        max_faults: Option<u32>,
        /// Command to run, with its arguments
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

fn parse_rate(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("kfi={level}").parse()?)
                .add_directive(format!("kfi_core={level}").parse()?),
        )
        .init();

    let mut file_config = match &args.config {
        Some(path) => match FileConfig::load(path) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                c
            }
            Err(e) => {
                warn!("Failed to load config: {:#}, using defaults", e);
                FileConfig::default()
            }
        },
        None => FileConfig::default(),
    };
    if let Some(us) = args.stop_timeout_us {
        file_config.injector.stop_timeout_us = us;
    }
    if let Some(us) = args.poll_interval_us {
        file_config.injector.poll_interval_us = us;
    }
    debug!("Injector settings: {:?}", file_config.injector);

    match args.command {
        Command::Inject { pid, register, bit } => commands::inject::run(
            &file_config.injector,
            &pid,
            register.as_deref(),
            bit.as_deref(),
        ),
        Command::Registers { arch } => commands::registers::run(arch),
        Command::Campaign {
            rate,
            max_faults,
            command,
        } => {
            let mut campaign = file_config.campaign;
            if let Some(rate) = rate {
                campaign.mean_interval_secs = rate.as_secs_f64();
            }
            if max_faults.is_some() {
                campaign.max_faults = max_faults;
            }
            commands::campaign::run(&file_config.injector, &campaign, &command)
        }
    }
}
