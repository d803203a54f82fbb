use chrono::{DateTime, Local, Utc};
use colored::*;

use crate::classify::Categories;
use crate::models::{CheckResult, CheckedSystem, Customer};
use crate::stats::{GlobalStats, UptimeSummary};

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

fn local(timestamp: DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Whole minutes, e.g. `3days 4h 12m`.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - since).num_minutes().max(0) as u64;
    humantime::format_duration(std::time::Duration::from_secs(minutes * 60)).to_string()
}

/// `company (id)`
pub(crate) fn format_customer(customer: &Customer) -> String {
    format!("{} ({})", customer.company.name, customer.id)
}

pub(crate) fn format_system_row(system: &CheckedSystem, now: DateTime<Utc>) -> String {
    let (address, customer) = match &system.deployment {
        Some(deployment) => (
            deployment.address.one_line(),
            format_customer(&deployment.customer),
        ),
        None => ("No address".to_string(), "No customer".to_string()),
    };
    let last_sync = match (system.last_sync, system.synced(now)) {
        (Some(last_sync), Some(true)) => format!("{} ✓", local(last_sync)),
        (Some(last_sync), _) => local(last_sync),
        (None, _) => "N/A".to_string(),
    };

    let mut row = format!(
        "#{:<6} {:<40} {:<36} {}",
        system.id, address, customer, last_sync
    );
    if let Some(since) = system.last_check().and_then(|check| check.offline_since) {
        row.push_str(&format!("  offline for {}", elapsed(since, now)));
    }
    row
}

fn print_section(title: &str, systems: &[&CheckedSystem], now: DateTime<Utc>) {
    println!("{} ({})", title.bold(), systems.len());
    println!("-----------------");
    for system in systems {
        let row = format_system_row(system, now);
        if system.online() == Some(false) {
            println!("{}", row.red());
        } else {
            println!("{}", row);
        }
    }
    println!();
}

pub(crate) fn render_overview(categories: &Categories<'_>, now: DateTime<Utc>) {
    print_section("Online", &categories.online, now);
    print_section("Offline", &categories.offline, now);
    print_section("Black mode", &categories.blackmode, now);
    print_section("Outdated", &categories.outdated, now);
}

pub(crate) fn stats_lines(stats: &GlobalStats) -> Vec<(&'static str, usize)> {
    vec![
        ("SMART errors", stats.smart_errors),
        ("Not deployed", stats.not_deployed),
        ("Testing systems", stats.testing_systems),
        ("Black mode", stats.black_mode),
        ("Outdated application", stats.outdated_application),
        ("Offline > 3 months", stats.more_than_three_months_offline),
    ]
}

pub(crate) fn render_stats(stats: &GlobalStats) {
    println!("📊 Fleet statistics");
    println!("-----------------");
    for (label, count) in stats_lines(stats) {
        let value = count.to_string();
        let value = match (label, count) {
            (_, 0) => value.green(),
            ("SMART errors", _) => value.red(),
            _ => value.yellow(),
        };
        println!("  {:<22} {}", label, value);
    }
}

pub(crate) fn format_sample(result: &CheckResult) -> String {
    let marker = if result.online() {
        "▲ online "
    } else {
        "▼ offline"
    };
    let version = result.application_version.as_deref().unwrap_or("N/A");
    let http = match result.http_request.and_then(|outcome| outcome.successful()) {
        Some(true) => "ok",
        Some(false) => "failed",
        None => "N/A",
    };
    format!(
        "{}  {}  http: {}  app: {:?} ({})",
        local(result.timestamp),
        marker,
        http,
        result.application_state,
        version
    )
}

pub(crate) fn render_details(system: u32, results: &[CheckResult], summary: Option<&UptimeSummary>) {
    println!("System #{}", system.to_string().bold());
    println!("-----------------");
    let Some(summary) = summary else {
        println!("No check results in the selected period.");
        return;
    };

    println!(
        "Period: {} ～ {}",
        local(summary.first),
        local(summary.last)
    );
    let ratio = format!("{:.1}%", summary.online_ratio * 100.0);
    let ratio = if summary.online_samples == summary.samples {
        ratio.green()
    } else if summary.online_samples == 0 {
        ratio.red()
    } else {
        ratio.yellow()
    };
    println!(
        "Online: {} ({} / {} checks)",
        ratio, summary.online_samples, summary.samples
    );
    println!("-----------------");

    let mut ordered: Vec<&CheckResult> = results.iter().collect();
    ordered.sort_by_key(|result| result.timestamp);
    for result in ordered {
        let line = format_sample(result);
        if result.online() {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
        }
    }
}

pub(crate) fn render_check(system: u32, result: &CheckResult) {
    let state = if result.online() {
        "online".green()
    } else {
        "offline".red()
    };
    println!("System #{} is currently {}.", system, state);
}

pub(crate) fn render_customers(customers: &[Customer]) {
    println!("{} ({})", "Customers".bold(), customers.len());
    println!("-----------------");
    for customer in customers {
        println!("  {}", format_customer(customer));
    }
}

pub(crate) fn render_types(types: &[String]) {
    println!("{} ({})", "Types".bold(), types.len());
    println!("-----------------");
    for kind in types {
        println!("  {}", kind);
    }
}
