//! Category views over a fleet snapshot.
//!
//! Each view is a lazy iterator over borrowed systems. Clone it, or call the
//! function again on the same collection, to start over. Categories overlap:
//! an offline system can also be outdated. Systems without any check result
//! are left out of the online/offline/black mode views entirely.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::models::CheckedSystem;

pub(crate) fn online<'a, I>(systems: I) -> impl Iterator<Item = &'a CheckedSystem> + Clone
where
    I: IntoIterator<Item = &'a CheckedSystem>,
    I::IntoIter: Clone,
{
    systems
        .into_iter()
        .filter(|system| system.online() == Some(true))
}

pub(crate) fn offline<'a, I>(systems: I) -> impl Iterator<Item = &'a CheckedSystem> + Clone
where
    I: IntoIterator<Item = &'a CheckedSystem>,
    I::IntoIter: Clone,
{
    systems
        .into_iter()
        .filter(|system| system.online() == Some(false))
}

/// Application confirmed down on a reachable host.
///
/// An unreachable host reports null for both `applicationEnabled` and
/// `applicationRunning`; such systems are not black mode.
pub(crate) fn blackmode<'a, I>(systems: I) -> impl Iterator<Item = &'a CheckedSystem> + Clone
where
    I: IntoIterator<Item = &'a CheckedSystem>,
    I::IntoIter: Clone,
{
    systems.into_iter().filter(|system| {
        system.last_check().is_some_and(|check| {
            !check.application_ok()
                && check.application_enabled.is_some()
                && check.application_running.is_some()
        })
    })
}

/// Systems whose last sync is at least `threshold` old. Never-synced systems are skipped.
pub(crate) fn outdated<'a, I>(
    systems: I,
    now: DateTime<Utc>,
    threshold: ChronoDuration,
) -> impl Iterator<Item = &'a CheckedSystem> + Clone
where
    I: IntoIterator<Item = &'a CheckedSystem>,
    I::IntoIter: Clone,
{
    systems.into_iter().filter(move |system| {
        system
            .last_sync
            .is_some_and(|last_sync| now - last_sync >= threshold)
    })
}

/// All four categories materialized against a single `now`.
#[derive(Debug, Serialize)]
pub(crate) struct Categories<'a> {
    pub(crate) online: Vec<&'a CheckedSystem>,
    pub(crate) offline: Vec<&'a CheckedSystem>,
    pub(crate) blackmode: Vec<&'a CheckedSystem>,
    pub(crate) outdated: Vec<&'a CheckedSystem>,
}

impl<'a> Categories<'a> {
    pub(crate) fn classify<I>(systems: I, now: DateTime<Utc>, outdated_after: ChronoDuration) -> Self
    where
        I: IntoIterator<Item = &'a CheckedSystem>,
        I::IntoIter: Clone,
    {
        let systems = systems.into_iter();
        Self {
            online: online(systems.clone()).collect(),
            offline: offline(systems.clone()).collect(),
            blackmode: blackmode(systems.clone()).collect(),
            outdated: outdated(systems, now, outdated_after).collect(),
        }
    }
}
