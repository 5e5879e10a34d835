use crate::metrics::{Kpis, OutcomeDistribution, ScoreHistograms, TopScore};
use crate::models::{career_slug, ClassifiedTable, Edition, YearlySummary};
use crate::trend::TrendPoint;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Which derived result a cache entry holds, with the parameters it was
/// computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    Kpis,
    OutcomeDistribution,
    ScoreHistograms {
        all_buckets: usize,
        admitted_buckets: usize,
    },
    TopScores {
        n: usize,
    },
    Summary,
    Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisKey {
    /// `None` for analyses spanning every edition.
    pub edition: Option<Edition>,
    pub career: String,
    pub kind: AnalysisKind,
}

impl AnalysisKey {
    pub fn new(edition: Option<Edition>, career: &str, kind: AnalysisKind) -> Self {
        Self {
            edition,
            career: career_slug(career),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutput {
    Kpis(Kpis),
    OutcomeDistribution(OutcomeDistribution),
    ScoreHistograms(ScoreHistograms),
    TopScores(Vec<TopScore>),
    Summary(Option<YearlySummary>),
    Trend(Vec<TrendPoint>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

/// Memoizes classified tables per (edition, career) and derived results per
/// [`AnalysisKey`]. Entries live until [`AnalysisCache::invalidate`].
#[derive(Debug, Default)]
pub struct AnalysisCache {
    tables: HashMap<(Edition, String), Rc<ClassifiedTable>>,
    results: HashMap<AnalysisKey, AnalysisOutput>,
    stats: CacheStats,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&mut self, edition: Edition, career: &str) -> Option<Rc<ClassifiedTable>> {
        let found = self.tables.get(&(edition, career_slug(career))).cloned();
        self.record(found.is_some());
        found
    }

    pub fn insert_table(&mut self, table: ClassifiedTable) -> Rc<ClassifiedTable> {
        let table = Rc::new(table);
        self.tables
            .insert((table.edition, career_slug(&table.career)), Rc::clone(&table));
        table
    }

    pub fn get(&mut self, key: &AnalysisKey) -> Option<&AnalysisOutput> {
        let hit = self.results.contains_key(key);
        self.record(hit);
        if hit {
            debug!(?key, "analysis cache hit");
        }
        self.results.get(key)
    }

    pub fn insert(&mut self, key: AnalysisKey, output: AnalysisOutput) {
        self.results.insert(key, output);
    }

    /// Forget everything; call after the stored tables are regenerated.
    #[cfg(test)]
    pub fn invalidate(&mut self) {
        self.tables.clear();
        self.results.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn record(&mut self, hit: bool) {
        if hit {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_normalize_career_names() {
        let edition = Some(Edition::new(2025, 1));
        let a = AnalysisKey::new(edition, "Ingeniería Civil", AnalysisKind::Kpis);
        let b = AnalysisKey::new(edition, "ingenieria-civil", AnalysisKind::Kpis);
        assert_eq!(a, b);
        let c = AnalysisKey::new(None, "ingenieria-civil", AnalysisKind::TopScores { n: 5 });
        let d = AnalysisKey::new(None, "ingenieria-civil", AnalysisKind::TopScores { n: 10 });
        assert_ne!(c, d);
    }

    #[test]
    fn invalidate_clears_entries() {
        let mut cache = AnalysisCache::new();
        let key = AnalysisKey::new(None, "X", AnalysisKind::Trend);
        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), AnalysisOutput::Trend(Vec::new()));
        assert!(cache.get(&key).is_some());
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });

        cache.invalidate();
        assert!(cache.get(&key).is_none());
        assert!(cache.table(Edition::new(2025, 1), "X").is_none());
    }
}
