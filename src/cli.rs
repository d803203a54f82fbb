use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::filter::SortKey;

#[derive(Parser, Debug)]
#[command(version, about = "Terminal dashboard for the systems monitoring backend", long_about = None)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct FleetArgs {
    /// Free-text filter; `#<id>` selects a single system.
    #[arg(long, short)]
    pub(crate) keyword: Option<String>,
    /// Ignore the local cache and fetch from the backend.
    #[arg(long)]
    pub(crate) reload: bool,
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Log in and store the session locally.
    Login {
        #[arg(long)]
        account: String,
        #[arg(long, env = "SYSMON_PASSWD", hide_env_values = true)]
        passwd: String,
    },
    Logout,
    /// Online, offline, black mode and outdated systems.
    Overview {
        #[command(flatten)]
        fleet: FleetArgs,
        #[arg(long, value_enum, default_value_t = SortKey::Id)]
        sort: SortKey,
        #[arg(long)]
        desc: bool,
    },
    /// Fleet-wide counters.
    Stats {
        #[command(flatten)]
        fleet: FleetArgs,
    },
    /// Up/down history of one system.
    Details {
        system: u32,
        #[arg(long)]
        since: Option<NaiveDate>,
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Run a live check on one or more systems.
    Check {
        #[arg(required = true)]
        systems: Vec<u32>,
    },
    Beep {
        system: u32,
    },
    Reboot {
        system: u32,
    },
    Sync {
        system: u32,
    },
    /// Enable (or with `--disable`, disable) the digital signage application.
    Application {
        system: u32,
        #[arg(long)]
        disable: bool,
    },
    /// Customers available for `deploy --customer`.
    Customers,
    /// Terminal types available for `deploy --type`.
    Types,
    /// Mark a system as installed at a customer's address.
    Deploy {
        system: u32,
        #[arg(long)]
        customer: u32,
        #[arg(long)]
        street: String,
        #[arg(long)]
        house_number: String,
        #[arg(long)]
        zip_code: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        connection: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long)]
        weather: Option<String>,
        #[arg(long)]
        annotation: Option<String>,
    },
}
