use anyhow::{Context, Result};
use chrono::{Local, Utc};
use futures::stream::StreamExt;
use tracing::{error, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::classify::Categories;
use crate::cli::FleetArgs;
use crate::config::Settings;
use crate::filter::{SortKey, SortOrder, filter_systems, sort_systems};
use crate::models::{CheckResult, CheckedSystem};
use crate::render::{render_check, render_details, render_overview, render_stats};
use crate::stats::{GlobalStats, UptimeSummary};
use crate::storage::{load_systems_cache, save_systems_cache};

/// Cached systems unless a reload is forced or nothing is cached yet.
pub(crate) async fn load_fleet(
    settings: &Settings,
    api: &ApiClient,
    reload: bool,
) -> Result<Vec<CheckedSystem>> {
    if !reload {
        match load_systems_cache(settings.cache_path.clone()).await {
            Ok(Some(systems)) if !systems.is_empty() => {
                info!(systems = systems.len(), "using cached systems");
                return Ok(systems);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not read systems cache"),
        }
    }

    let (systems, raw) = api
        .get_stats()
        .await
        .context("could not fetch the list of systems")?;
    info!(systems = systems.len(), "fetched systems from backend");

    if let Err(e) = save_systems_cache(settings.cache_path.clone(), raw).await {
        warn!(error = %e, "could not write systems cache");
    }

    Ok(systems)
}

pub(crate) async fn run_overview(
    settings: &Settings,
    api: &ApiClient,
    fleet: &FleetArgs,
    sort: SortKey,
    descending: bool,
) -> Result<()> {
    let systems = load_fleet(settings, api, fleet.reload).await?;
    let now = Utc::now();

    let mut view: Vec<&CheckedSystem> =
        filter_systems(&systems, fleet.keyword.as_deref()).collect();
    let order = if descending {
        SortOrder::Descending
    } else {
        SortOrder::Ascending
    };
    sort_systems(&mut view, sort, order);

    let categories = Categories::classify(
        view.iter().copied(),
        now,
        settings.thresholds.outdated_sync(),
    );

    if fleet.json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else {
        render_overview(&categories, now);
    }
    Ok(())
}

pub(crate) async fn run_stats(settings: &Settings, api: &ApiClient, fleet: &FleetArgs) -> Result<()> {
    let systems = load_fleet(settings, api, fleet.reload).await?;
    let now = Utc::now();
    let stats = GlobalStats::from_checked_systems(
        filter_systems(&systems, fleet.keyword.as_deref()),
        &settings.thresholds,
        now,
    );

    if fleet.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        render_stats(&stats);
    }
    Ok(())
}

pub(crate) async fn run_details(
    settings: &Settings,
    api: &ApiClient,
    system: u32,
    since: Option<chrono::NaiveDate>,
    until: Option<chrono::NaiveDate>,
) -> Result<()> {
    let until = until.unwrap_or_else(|| Local::now().date_naive());
    let since = match since {
        Some(since) => since,
        None => until
            .checked_sub_signed(settings.thresholds.details_span())
            .context("details span setting is too large")?,
    };

    if since > until {
        anyhow::bail!(
            "--since ({}) must be earlier than or equal to --until ({})",
            since,
            until
        );
    }

    let results = api
        .get_system_details(system, since, until)
        .await
        .with_context(|| format!("could not fetch details of system #{}", system))?;
    let summary = UptimeSummary::from_check_results(&results);
    render_details(system, &results, summary.as_ref());
    Ok(())
}

pub(crate) async fn run_checks(settings: &Settings, api: &ApiClient, systems: &[u32]) -> Result<()> {
    let tasks = systems.iter().copied().map(|system| async move {
        let outcome = api.check_system(system).await;
        (system, outcome)
    });
    let mut outcomes: Vec<(u32, Result<CheckResult, ApiError>)> = futures::stream::iter(tasks)
        .buffer_unordered(settings.max_concurrent_checks)
        .collect()
        .await;
    outcomes.sort_by_key(|(system, _)| *system);

    let mut failures = 0;
    for (system, outcome) in outcomes {
        match outcome {
            Ok(result) => render_check(system, &result),
            Err(ApiError::SessionExpired) => return Err(ApiError::SessionExpired.into()),
            Err(e) => {
                error!(system, error = %e, "check failed");
                failures += 1;
            }
        }
    }

    if failures == systems.len() {
        anyhow::bail!("no system could be checked");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const CHECK: &str =
        r#"{"timestamp": "2024-06-01T10:00:00", "icmpRequest": true, "sshLogin": "success"}"#;

    fn settings_for(server: &mockito::ServerGuard, dir: &tempfile::TempDir) -> Settings {
        Settings {
            base_url: format!("{}/sysmon", server.url()),
            session_url: format!("{}/session", server.url()),
            cache_path: dir.path().join("systems.json").to_string_lossy().into_owned(),
            max_concurrent_checks: 2,
            ..Settings::default()
        }
    }

    fn client(settings: &Settings) -> ApiClient {
        ApiClient::new(settings, None)
            .unwrap()
            .with_retry_delay(Duration::ZERO)
    }

    fn ids(systems: &[CheckedSystem]) -> Vec<u32> {
        systems.iter().map(|s| s.id).collect()
    }

    #[tokio::test]
    async fn cached_fleet_is_used_without_fetching() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&server, &dir);
        save_systems_cache(settings.cache_path.clone(), r#"[{"id": 5}]"#.to_string())
            .await
            .unwrap();
        let mock = server
            .mock("GET", "/sysmon/stats")
            .expect(0)
            .create_async()
            .await;

        let systems = load_fleet(&settings, &client(&settings), false).await.unwrap();
        assert_eq!(ids(&systems), vec![5]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reload_fetches_and_rewrites_cache() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&server, &dir);
        save_systems_cache(settings.cache_path.clone(), r#"[{"id": 5}]"#.to_string())
            .await
            .unwrap();
        let mock = server
            .mock("GET", "/sysmon/stats")
            .with_status(200)
            .with_body(r#"[{"id": 6}, {"id": 7}]"#)
            .expect(1)
            .create_async()
            .await;

        let systems = load_fleet(&settings, &client(&settings), true).await.unwrap();
        assert_eq!(ids(&systems), vec![6, 7]);
        mock.assert_async().await;

        let cached = load_systems_cache(settings.cache_path.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids(&cached), vec![6, 7]);
    }

    #[tokio::test]
    async fn empty_or_missing_cache_falls_back_to_backend() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&server, &dir);
        let mock = server
            .mock("GET", "/sysmon/stats")
            .with_status(200)
            .with_body(r#"[{"id": 8}]"#)
            .expect(2)
            .create_async()
            .await;
        let api = client(&settings);

        // Nothing cached yet.
        assert_eq!(ids(&load_fleet(&settings, &api, false).await.unwrap()), vec![8]);

        save_systems_cache(settings.cache_path.clone(), "[]".to_string())
            .await
            .unwrap();
        assert_eq!(ids(&load_fleet(&settings, &api, false).await.unwrap()), vec![8]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn checks_succeed_while_any_system_answers() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&server, &dir);
        let _ok = server
            .mock("GET", "/sysmon/check/1")
            .with_status(200)
            .with_body(CHECK)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/sysmon/check/2")
            .with_status(404)
            .create_async()
            .await;

        run_checks(&settings, &client(&settings), &[1, 2]).await.unwrap();
    }

    #[tokio::test]
    async fn checks_fail_when_every_system_fails() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&server, &dir);
        let _missing = server
            .mock("GET", mockito::Matcher::Regex(r"^/sysmon/check/\d+$".to_string()))
            .with_status(404)
            .create_async()
            .await;

        assert!(run_checks(&settings, &client(&settings), &[1, 2]).await.is_err());
    }

    #[tokio::test]
    async fn expired_session_aborts_checks() {
        let mut server = mockito::Server::new_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_for(&server, &dir);
        let _ok = server
            .mock("GET", "/sysmon/check/1")
            .with_status(200)
            .with_body(CHECK)
            .create_async()
            .await;
        let _expired = server
            .mock("GET", "/sysmon/check/2")
            .with_status(401)
            .create_async()
            .await;

        let error = run_checks(&settings, &client(&settings), &[1, 2])
            .await
            .unwrap_err();
        assert!(matches!(
            error.downcast_ref::<ApiError>(),
            Some(ApiError::SessionExpired)
        ));
    }
}
