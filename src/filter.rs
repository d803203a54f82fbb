use std::cmp::Ordering;

use clap::ValueEnum;

use crate::models::CheckedSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub(crate) enum SortKey {
    #[default]
    Id,
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    !haystack.is_empty() && haystack.to_lowercase().contains(needle)
}

fn matches_keyword(system: &CheckedSystem, keyword: &str) -> bool {
    if let Some(raw_id) = keyword.strip_prefix('#') {
        return raw_id
            .trim()
            .parse::<u32>()
            .is_ok_and(|id| system.id == id);
    }

    let Some(deployment) = &system.deployment else {
        return false;
    };

    let needle = keyword.to_lowercase();
    contains_ignore_case(&deployment.customer.id.to_string(), &needle)
        || contains_ignore_case(&deployment.customer.company.name, &needle)
        || contains_ignore_case(&deployment.address.one_line(), &needle)
}

/// Narrows `systems` by a free-text keyword, keeping input order.
///
/// `#<id>` selects one system by exact id. Any other keyword is matched
/// case-insensitively against customer id, company name and address.
pub(crate) fn filter_systems<'a>(
    systems: &'a [CheckedSystem],
    keyword: Option<&'a str>,
) -> impl Iterator<Item = &'a CheckedSystem> + Clone {
    let keyword = keyword.filter(|k| !k.is_empty());
    systems.iter().filter(move |system| match keyword {
        None => true,
        Some(keyword) => matches_keyword(system, keyword),
    })
}

pub(crate) fn sort_systems(systems: &mut [&CheckedSystem], key: SortKey, order: SortOrder) {
    let directed = |ordering: Ordering| match order {
        SortOrder::Ascending => ordering,
        SortOrder::Descending => ordering.reverse(),
    };

    match key {
        SortKey::Id => systems.sort_by(|a, b| directed(a.id.cmp(&b.id))),
        SortKey::Address => {
            let address = |system: &CheckedSystem| {
                system
                    .deployment
                    .as_ref()
                    .map(|deployment| deployment.address.one_line().to_lowercase())
            };
            // Undeployed systems go last in either direction.
            systems.sort_by(|a, b| match (address(*a), address(*b)) {
                (Some(a), Some(b)) => directed(a.cmp(&b)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
    }
}
