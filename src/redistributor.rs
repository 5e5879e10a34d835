use crate::models::{career_slug, CareerTable, Dataset, Edition};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedistributionStats {
    pub copied: usize,
    pub already_present: usize,
    pub tables_created: usize,
}

/// Route every applicant who listed a second-choice career into that career's
/// table for the same edition.
///
/// The input is left untouched and a new dataset is returned, so running the
/// batch again over the raw tables always gives the same result. Source rows
/// stay in their primary table; each destination table holds an `id` at most
/// once.
pub fn redistribute(raw: &Dataset) -> (Dataset, RedistributionStats) {
    let mut routed = raw.clone();
    let mut stats = RedistributionStats::default();
    let mut seen: HashMap<(Edition, String), HashSet<String>> = routed
        .iter()
        .map(|(key, table)| {
            let ids = table.records.iter().map(|r| r.id.clone()).collect();
            (key.clone(), ids)
        })
        .collect();

    for ((edition, source_slug), table) in raw {
        for record in &table.records {
            let Some(second_choice) = record.second_choice_career.as_deref() else {
                continue;
            };
            let target_slug = career_slug(second_choice);
            if target_slug.is_empty() || &target_slug == source_slug {
                continue;
            }

            let key = (*edition, target_slug);
            let ids = seen.entry(key.clone()).or_default();
            if !ids.insert(record.id.clone()) {
                stats.already_present += 1;
                continue;
            }

            let destination = routed.entry(key).or_insert_with(|| {
                stats.tables_created += 1;
                CareerTable::new(*edition, second_choice)
            });
            destination.records.push(record.clone());
            stats.copied += 1;
            debug!(
                edition = %edition,
                id = %record.id,
                from = %source_slug,
                to = %destination.slug(),
                "copied second-choice applicant"
            );
        }
    }

    info!(
        copied = stats.copied,
        already_present = stats.already_present,
        tables_created = stats.tables_created,
        "second-choice redistribution finished"
    );
    (routed, stats)
}
