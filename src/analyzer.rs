use crate::cache::{AnalysisCache, AnalysisKey, AnalysisKind, AnalysisOutput, CacheStats};
use crate::classifier::classify_table;
use crate::error::PipelineError;
use crate::metrics::{self, Kpis, OutcomeDistribution, ScoreHistograms, TopScore};
use crate::models::{CareerTable, ClassifiedTable, Edition, YearlySummary};
use crate::trend::{self, TrendPoint};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info};

/// Where the analyzer gets its (edition, career) tables from.
pub trait TableSource {
    fn load(&self, edition: Edition, career: &str) -> Result<CareerTable, PipelineError>;
    fn editions(&self) -> Result<Vec<Edition>, PipelineError>;
}

/// Query side of the pipeline: classifies stored tables on demand and
/// derives dashboard statistics from them, memoizing both.
pub struct AdmissionAnalyzer<S> {
    source: S,
    cache: AnalysisCache,
}

impl<S: TableSource> AdmissionAnalyzer<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: AnalysisCache::new(),
        }
    }

    #[cfg(test)]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Drop all memoized tables and results. Needed after the store is rebuilt.
    #[cfg(test)]
    pub fn invalidate(&mut self) {
        info!("analysis cache invalidated");
        self.cache.invalidate();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn table(
        &mut self,
        edition: Edition,
        career: &str,
    ) -> Result<Rc<ClassifiedTable>, PipelineError> {
        if let Some(table) = self.cache.table(edition, career) {
            return Ok(table);
        }
        let raw = self.source.load(edition, career)?;
        let classified = classify_table(&raw);
        debug!(
            edition = %edition,
            career = %classified.career,
            rows = classified.records.len(),
            malformed = classified.malformed_rows,
            "classified table"
        );
        Ok(self.cache.insert_table(classified))
    }

    /// Whether the career ran its own admission in this edition, as opposed to
    /// having no table or one holding only second-choice arrivals.
    pub fn career_offered(
        &mut self,
        edition: Edition,
        career: &str,
    ) -> Result<bool, PipelineError> {
        match self.table(edition, career) {
            Ok(table) => Ok(table.career_offered()),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn kpis(&mut self, edition: Edition, career: &str) -> Result<Kpis, PipelineError> {
        let key = AnalysisKey::new(Some(edition), career, AnalysisKind::Kpis);
        if let Some(AnalysisOutput::Kpis(kpis)) = self.cache.get(&key) {
            return Ok(*kpis);
        }
        let table = self.table(edition, career)?;
        let kpis = metrics::kpis(&table, career);
        self.cache.insert(key, AnalysisOutput::Kpis(kpis));
        Ok(kpis)
    }

    pub fn outcome_distribution(
        &mut self,
        edition: Edition,
        career: &str,
    ) -> Result<OutcomeDistribution, PipelineError> {
        let key = AnalysisKey::new(Some(edition), career, AnalysisKind::OutcomeDistribution);
        if let Some(AnalysisOutput::OutcomeDistribution(distribution)) = self.cache.get(&key) {
            return Ok(*distribution);
        }
        let table = self.table(edition, career)?;
        let distribution = metrics::outcome_distribution(&table);
        self.cache
            .insert(key, AnalysisOutput::OutcomeDistribution(distribution));
        Ok(distribution)
    }

    pub fn score_histograms(
        &mut self,
        edition: Edition,
        career: &str,
        all_buckets: usize,
        admitted_buckets: usize,
    ) -> Result<ScoreHistograms, PipelineError> {
        let kind = AnalysisKind::ScoreHistograms {
            all_buckets,
            admitted_buckets,
        };
        let key = AnalysisKey::new(Some(edition), career, kind);
        if let Some(AnalysisOutput::ScoreHistograms(histograms)) = self.cache.get(&key) {
            return Ok(histograms.clone());
        }
        let table = self.table(edition, career)?;
        let histograms = metrics::score_histogram_buckets(&table, all_buckets, admitted_buckets);
        self.cache
            .insert(key, AnalysisOutput::ScoreHistograms(histograms.clone()));
        Ok(histograms)
    }

    pub fn top_scores(
        &mut self,
        edition: Edition,
        career: &str,
        n: usize,
    ) -> Result<Vec<TopScore>, PipelineError> {
        let key = AnalysisKey::new(Some(edition), career, AnalysisKind::TopScores { n });
        if let Some(AnalysisOutput::TopScores(top)) = self.cache.get(&key) {
            return Ok(top.clone());
        }
        let table = self.table(edition, career)?;
        let top = metrics::top_n_scores(&table, n);
        self.cache.insert(key, AnalysisOutput::TopScores(top.clone()));
        Ok(top)
    }

    pub fn summary(
        &mut self,
        edition: Edition,
        career: &str,
    ) -> Result<Option<YearlySummary>, PipelineError> {
        let key = AnalysisKey::new(Some(edition), career, AnalysisKind::Summary);
        if let Some(AnalysisOutput::Summary(summary)) = self.cache.get(&key) {
            return Ok(*summary);
        }
        let table = self.table(edition, career)?;
        let summary = metrics::summary(&table);
        self.cache.insert(key, AnalysisOutput::Summary(summary));
        Ok(summary)
    }

    /// Admitted-score series for `career` over every stored edition. Editions
    /// without a table for the career are skipped.
    pub fn trend(&mut self, career: &str) -> Result<Vec<TrendPoint>, PipelineError> {
        let key = AnalysisKey::new(None, career, AnalysisKind::Trend);
        if let Some(AnalysisOutput::Trend(series)) = self.cache.get(&key) {
            return Ok(series.clone());
        }

        let mut tables = BTreeMap::new();
        for edition in self.source.editions()? {
            match self.table(edition, career) {
                Ok(table) => {
                    tables.insert(edition, table.as_ref().clone());
                }
                Err(err) if err.is_not_found() => {
                    debug!(edition = %edition, career, "career not offered");
                }
                Err(err) => return Err(err),
            }
        }

        let series = trend::trend(&tables);
        self.cache.insert(key, AnalysisOutput::Trend(series.clone()));
        Ok(series)
    }
}
