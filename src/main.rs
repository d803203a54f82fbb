mod admin;
mod api;
mod classify;
mod cli;
mod config;
mod dashboard;
mod filter;
mod models;
mod render;
mod stats;
mod storage;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::{AdminAction, ApiClient, DeployRequest};
use crate::cli::{Cli, Command};
use crate::config::{Settings, load_settings};
use crate::models::Address;
use crate::storage::load_session;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let settings = load_settings()?;
    debug!(base_url = %settings.base_url, "settings loaded");

    let session = load_session(settings.session_path.clone()).await?;
    let mut api = ApiClient::new(&settings, session)?;

    let outcome = run(&settings, &mut api, cli.command).await;

    if let Err(e) = &outcome {
        admin::forget_expired_session(&settings, e).await;
    }

    outcome
}

async fn run(settings: &Settings, api: &mut ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Login { account, passwd } => {
            admin::run_login(settings, api, &account, &passwd).await
        }
        Command::Logout => admin::run_logout(settings, api).await,
        Command::Overview { fleet, sort, desc } => {
            dashboard::run_overview(settings, api, &fleet, sort, desc).await
        }
        Command::Stats { fleet } => dashboard::run_stats(settings, api, &fleet).await,
        Command::Details {
            system,
            since,
            until,
        } => dashboard::run_details(settings, api, system, since, until).await,
        Command::Check { systems } => dashboard::run_checks(settings, api, &systems).await,
        Command::Beep { system } => admin::run_action(api, AdminAction::Beep(system)).await,
        Command::Reboot { system } => admin::run_action(api, AdminAction::Reboot(system)).await,
        Command::Sync { system } => admin::run_action(api, AdminAction::Sync(system)).await,
        Command::Application { system, disable } => {
            admin::run_action(api, AdminAction::Application { system, disable }).await
        }
        Command::Customers => admin::run_customers(api).await,
        Command::Types => admin::run_types(api).await,
        Command::Deploy {
            system,
            customer,
            street,
            house_number,
            zip_code,
            city,
            connection,
            kind,
            weather,
            annotation,
        } => {
            let request = DeployRequest {
                system,
                customer,
                address: Address {
                    street,
                    house_number,
                    zip_code,
                    city,
                },
                connection,
                kind,
                weather,
                annotation,
            };
            admin::run_action(api, AdminAction::Deploy(request)).await
        }
    }
}
