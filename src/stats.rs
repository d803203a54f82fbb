use chrono::{DateTime, Utc};
use serde::Serialize;
use statistical::mean;

use crate::config::Thresholds;
use crate::models::{ApplicationState, CheckResult, CheckedSystem, SuccessFailed};

/// Fleet-wide counters over the latest check of every system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GlobalStats {
    pub(crate) smart_errors: usize,
    pub(crate) not_deployed: usize,
    pub(crate) testing_systems: usize,
    pub(crate) black_mode: usize,
    pub(crate) outdated_application: usize,
    pub(crate) more_than_three_months_offline: usize,
}

impl GlobalStats {
    /// Systems without any check result do not count towards anything,
    /// not even `not_deployed`.
    ///
    /// `black_mode` counts every `not running` state, including unreachable
    /// hosts that the black mode view leaves out.
    pub(crate) fn from_checked_systems<'a, I>(
        systems: I,
        thresholds: &Thresholds,
        now: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = &'a CheckedSystem>,
    {
        let offline_alert = thresholds.offline_alert();
        let mut stats = Self::default();

        for system in systems {
            let Some(last_check) = system.last_check() else {
                continue;
            };

            if last_check.smart_check == SuccessFailed::Failed {
                stats.smart_errors += 1;
            }
            if system.deployment.is_none() {
                stats.not_deployed += 1;
            }
            if system.testing {
                stats.testing_systems += 1;
            }
            if last_check.application_state == ApplicationState::NotRunning {
                stats.black_mode += 1;
            }
            if last_check.out_of_date(&thresholds.current_application_version) == Some(true) {
                stats.outdated_application += 1;
            }
            if last_check.more_than_three_months_offline(now, offline_alert) {
                stats.more_than_three_months_offline += 1;
            }
        }

        stats
    }
}

/// Up/down summary of one system's check history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UptimeSummary {
    pub(crate) samples: usize,
    pub(crate) online_samples: usize,
    pub(crate) online_ratio: f64,
    pub(crate) first: DateTime<Utc>,
    pub(crate) last: DateTime<Utc>,
}

impl UptimeSummary {
    pub(crate) fn from_check_results(results: &[CheckResult]) -> Option<Self> {
        let first = results.iter().map(|r| r.timestamp).min()?;
        let last = results.iter().map(|r| r.timestamp).max()?;
        let flags: Vec<f64> = results
            .iter()
            .map(|r| if r.online() { 1.0 } else { 0.0 })
            .collect();

        Some(Self {
            samples: results.len(),
            online_samples: results.iter().filter(|r| r.online()).count(),
            online_ratio: mean(&flags),
            first,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{check, deployment, system};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn empty_fleet_is_all_zero() {
        let systems: Vec<CheckedSystem> = Vec::new();
        let stats = GlobalStats::from_checked_systems(&systems, &Thresholds::default(), now());
        assert_eq!(stats, GlobalStats::default());
    }

    #[test]
    fn history_less_systems_are_skipped() {
        let mut idle = system(1, vec![]);
        idle.testing = true;
        let stats = GlobalStats::from_checked_systems(&[idle], &Thresholds::default(), now());
        assert_eq!(stats, GlobalStats::default());
    }

    #[test]
    fn counters_are_independent() {
        let mut sample = check(now());
        sample.smart_check = SuccessFailed::Failed;
        sample.application_state = ApplicationState::NotRunning;
        sample.application_version = Some("2.40.0-1".to_string());
        sample.offline_since = Some(now() - ChronoDuration::days(120));
        let mut worst = system(1, vec![sample]);
        worst.testing = true;

        let mut healthy = system(2, vec![check(now())]);
        healthy.deployment = Some(deployment(1, "Musterbau GmbH", "Burgstraße", "Hannover"));

        let mut unknown_version = check(now());
        unknown_version.application_version = None;
        let mut unversioned = system(3, vec![unknown_version]);
        unversioned.deployment = Some(deployment(2, "Kunde", "Weg", "Celle"));

        let stats = GlobalStats::from_checked_systems(
            &[worst, healthy, unversioned],
            &Thresholds::default(),
            now(),
        );
        assert_eq!(
            stats,
            GlobalStats {
                smart_errors: 1,
                not_deployed: 1,
                testing_systems: 1,
                black_mode: 1,
                outdated_application: 1,
                more_than_three_months_offline: 1,
            }
        );
    }

    #[test]
    fn black_mode_counts_unreachable_hosts_unlike_the_view() {
        let mut confirmed = check(now());
        confirmed.application_state = ApplicationState::NotRunning;
        confirmed.application_enabled = Some(true);
        confirmed.application_running = Some(false);

        let mut unreachable = confirmed.clone();
        unreachable.application_enabled = None;
        unreachable.application_running = None;

        let systems = vec![system(1, vec![confirmed]), system(2, vec![unreachable])];

        let view: Vec<u32> = crate::classify::blackmode(&systems).map(|s| s.id).collect();
        assert_eq!(view, vec![1]);

        let stats = GlobalStats::from_checked_systems(&systems, &Thresholds::default(), now());
        assert_eq!(stats.black_mode, 2);
    }

    #[test]
    fn uptime_summary_over_history() {
        assert!(UptimeSummary::from_check_results(&[]).is_none());

        let mut down = check(now() - ChronoDuration::hours(2));
        down.icmp_request = false;
        let history = vec![
            check(now()),
            check(now() - ChronoDuration::hours(1)),
            down,
            check(now() - ChronoDuration::hours(3)),
        ];
        let summary = UptimeSummary::from_check_results(&history).unwrap();
        assert_eq!(summary.samples, 4);
        assert_eq!(summary.online_samples, 3);
        assert!((summary.online_ratio - 0.75).abs() < f64::EPSILON);
        assert_eq!(summary.first, now() - ChronoDuration::hours(3));
        assert_eq!(summary.last, now());
    }
}
