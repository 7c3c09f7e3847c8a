//! CLI argument definitions using clap derive

use crate::render::OutputFormat;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// bcachectl - simplified administration of bcache devices
///
/// Lists, registers, tunes, flushes and formats bcache backing and cache
/// devices through sysfs and bcache-tools.
#[derive(Parser, Debug)]
#[command(name = "bcachectl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BCACHECTL_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List all bcache devices
    List(ListArgs),

    /// Show detailed information about a bcache device
    Show(ShowArgs),

    /// Register formatted bcache device(s)
    Register(DevicesArgs),

    /// Unregister bcache device(s); they stay formatted
    Unregister(DevicesArgs),

    /// Stop bcache on a device and wait for it to leave sysfs
    Stop(DeviceArg),

    /// Attach a registered cache device to a backing device
    Attach(PairArgs),

    /// Detach a cache device from a backing device
    Detach(PairArgs),

    /// Change a tunable, or apply a tuning profile
    Tune(TuneArgs),

    /// Print current tunables as a tuning profile
    PrintTunables(PrintTunablesArgs),

    /// Flush dirty data of writeback devices
    Flush(FlushArgs),

    /// Format backing and/or cache device(s)
    #[command(visible_aliases = ["add", "create"])]
    Format(FormatArgs),

    /// Print the bcache superblock of a device
    Super(DeviceArg),
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Extra parameters to print as columns (comma-separated)
    #[arg(short, long = "extra-vals", value_delimiter = ',')]
    pub extra: Vec<String>,
}

/// Arguments for the show command
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Backing device (bcacheN, /dev/bcacheN or its raw device)
    pub device: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// One or more devices
#[derive(Parser, Debug)]
pub struct DevicesArgs {
    #[arg(required = true)]
    pub devices: Vec<String>,
}

/// A single device
#[derive(Parser, Debug)]
pub struct DeviceArg {
    pub device: String,
}

/// A cache device and a backing device
#[derive(Parser, Debug)]
pub struct PairArgs {
    /// Cache device path or cache set UUID
    pub cache: String,

    /// Backing device (bcacheN, /dev/bcacheN or its raw device)
    pub backing: String,
}

/// Arguments for the tune command
#[derive(Parser, Debug)]
#[command(after_help = "Allowed tunables: sequential_cutoff, cache_mode, writeback_percent, \
writeback_delay, writeback_rate, cache/congested_write_threshold_us, \
cache/congested_read_threshold_us\n\nExamples:\n  bcachectl tune bcache0 sequential_cutoff:4m\n  \
bcachectl tune all writeback_percent:20\n  bcachectl tune from-file /etc/bcachectl/tunables.toml")]
pub struct TuneArgs {
    /// bcacheN, all, or from-file
    pub target: String,

    /// name:value, or the profile path after from-file
    pub value: String,
}

/// Arguments for the print-tunables command
#[derive(Parser, Debug)]
pub struct PrintTunablesArgs {
    /// Write the profile to this file instead of stdout
    #[arg(short, long)]
    pub outfile: Option<PathBuf>,

    /// Output format (table prints TOML)
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Arguments for the flush command
#[derive(Parser, Debug)]
pub struct FlushArgs {
    /// bcacheN, or all
    pub device: String,
}

/// Arguments for the format command
#[derive(Parser, Debug)]
pub struct FormatArgs {
    /// Backing device to format
    #[arg(short = 'B', long = "backing-device")]
    pub backing: Option<PathBuf>,

    /// Cache device to format
    #[arg(short = 'C', long = "cache-device")]
    pub cache: Option<PathBuf>,

    /// Stop the devices and erase ANY existing superblock and filesystem first
    #[arg(long = "wipe-super")]
    pub wipe: bool,

    /// Use writeback caching when formatting both devices
    #[arg(long)]
    pub writeback: bool,
}
