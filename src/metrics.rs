use crate::models::{same_career, ClassifiedTable, Outcome, YearlySummary};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Kpis {
    pub applicant_count: usize,
    pub max_score: Option<f64>,
    pub mean_admitted_score: Option<f64>,
    /// Lowest direct-admission score, i.e. the cutoff.
    pub min_admitted_score: Option<f64>,
    /// Admitted rows without a score. They are left out of every score
    /// statistic, the top-score ranking included.
    pub unscored_admitted: usize,
}

/// The four-way partition of a classified table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutcomeCounts {
    pub admitted_direct: usize,
    pub admitted_second_choice: usize,
    pub rejected: usize,
    pub absent: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutcomeDistribution {
    pub admitted: usize,
    pub rejected: usize,
    pub absent: usize,
}

impl OutcomeDistribution {
    pub fn total(&self) -> usize {
        self.admitted + self.rejected + self.absent
    }

    /// Share of all rows that secured a vacancy.
    pub fn admission_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.admitted as f64 / total as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoarseOutcome {
    Admitted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AdmissionPath {
    Direct,
    SecondChoice,
}

impl CoarseOutcome {
    pub fn label(self) -> &'static str {
        match self {
            CoarseOutcome::Admitted => "Admitted",
            CoarseOutcome::Rejected => "Rejected",
        }
    }
}

impl AdmissionPath {
    pub fn label(self) -> &'static str {
        match self {
            AdmissionPath::Direct => "Direct",
            AdmissionPath::SecondChoice => "Second choice",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBucket<L> {
    pub lower: f64,
    pub upper: f64,
    pub counts: BTreeMap<L, usize>,
}

impl<L> HistogramBucket<L> {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<L> {
    pub buckets: Vec<HistogramBucket<L>>,
}

impl<L> Histogram<L> {
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total(&self) -> usize {
        self.buckets.iter().map(HistogramBucket::total).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreHistograms {
    pub all_applicants: Histogram<CoarseOutcome>,
    pub admitted: Histogram<AdmissionPath>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopScore {
    pub rank: usize,
    pub id: String,
    pub score: f64,
    pub outcome: Outcome,
}

pub fn kpis(table: &ClassifiedTable, career: &str) -> Kpis {
    let applicant_count = table
        .records
        .iter()
        .filter(|row| same_career(&row.record.career, career))
        .count();
    let max_score = max(table.records.iter().filter_map(|row| row.record.score));
    let mean_admitted_score = rounded_mean(&admitted_scores(table));
    let min_admitted_score = min(
        table
            .records
            .iter()
            .filter(|row| row.outcome == Outcome::AdmittedDirect)
            .filter_map(|row| row.record.score),
    );
    let unscored_admitted = table
        .admitted()
        .filter(|row| row.record.score.is_none())
        .count();

    Kpis {
        applicant_count,
        max_score,
        mean_admitted_score,
        min_admitted_score,
        unscored_admitted,
    }
}

pub fn outcome_counts(table: &ClassifiedTable) -> OutcomeCounts {
    let mut counts = OutcomeCounts::default();
    for row in &table.records {
        match row.outcome {
            Outcome::AdmittedDirect => counts.admitted_direct += 1,
            Outcome::AdmittedSecondChoice => counts.admitted_second_choice += 1,
            Outcome::Rejected => counts.rejected += 1,
            Outcome::Absent => counts.absent += 1,
        }
    }
    counts
}

pub fn outcome_distribution(table: &ClassifiedTable) -> OutcomeDistribution {
    let counts = outcome_counts(table);
    OutcomeDistribution {
        admitted: counts.admitted_direct + counts.admitted_second_choice,
        rejected: counts.rejected,
        absent: counts.absent,
    }
}

/// Bucket scored rows twice: everyone by admitted/rejected, and the admitted
/// by how they got in. Rows without a score are left out of both.
pub fn score_histogram_buckets(
    table: &ClassifiedTable,
    all_buckets: usize,
    admitted_buckets: usize,
) -> ScoreHistograms {
    let everyone: Vec<(f64, CoarseOutcome)> = table
        .records
        .iter()
        .filter_map(|row| {
            let label = if row.outcome.is_admitted() {
                CoarseOutcome::Admitted
            } else {
                CoarseOutcome::Rejected
            };
            row.record.score.map(|score| (score, label))
        })
        .collect();

    let admitted: Vec<(f64, AdmissionPath)> = table
        .admitted()
        .filter_map(|row| {
            let path = match row.outcome {
                Outcome::AdmittedDirect => AdmissionPath::Direct,
                _ => AdmissionPath::SecondChoice,
            };
            row.record.score.map(|score| (score, path))
        })
        .collect();

    ScoreHistograms {
        all_applicants: bucketize(&everyone, all_buckets),
        admitted: bucketize(&admitted, admitted_buckets),
    }
}

pub fn top_n_scores(table: &ClassifiedTable, n: usize) -> Vec<TopScore> {
    let mut scored: Vec<_> = table
        .admitted()
        .filter_map(|row| row.record.score.map(|score| (score, row)))
        .collect();
    // stable: equal scores keep table order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(index, (score, row))| TopScore {
            rank: index + 1,
            id: row.record.id.clone(),
            score,
            outcome: row.outcome,
        })
        .collect()
}

/// Max/min/mean over every admitted row, direct or second choice.
pub fn summary(table: &ClassifiedTable) -> Option<YearlySummary> {
    let scores = admitted_scores(table);
    Some(YearlySummary {
        max_score: max(scores.iter().copied())?,
        min_score: min(scores.iter().copied())?,
        mean_score: rounded_mean(&scores)?,
    })
}

fn admitted_scores(table: &ClassifiedTable) -> Vec<f64> {
    table.admitted().filter_map(|row| row.record.score).collect()
}

fn rounded_mean(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some((scores.iter().sum::<f64>() / scores.len() as f64).round())
}

fn max(scores: impl Iterator<Item = f64>) -> Option<f64> {
    scores.reduce(f64::max)
}

fn min(scores: impl Iterator<Item = f64>) -> Option<f64> {
    scores.reduce(f64::min)
}

fn bucketize<L: Ord + Copy>(points: &[(f64, L)], bucket_count: usize) -> Histogram<L> {
    let Some(low) = min(points.iter().map(|(score, _)| *score)) else {
        return Histogram { buckets: Vec::new() };
    };
    let high = max(points.iter().map(|(score, _)| *score)).unwrap_or(low);
    let bucket_count = if high > low { bucket_count.max(1) } else { 1 };
    let width = (high - low) / bucket_count as f64;

    let mut buckets: Vec<HistogramBucket<L>> = (0..bucket_count)
        .map(|i| HistogramBucket {
            lower: low + width * i as f64,
            upper: if i + 1 == bucket_count {
                high
            } else {
                low + width * (i + 1) as f64
            },
            counts: BTreeMap::new(),
        })
        .collect();

    for (score, label) in points {
        let index = if width > 0.0 {
            (((score - low) / width) as usize).min(bucket_count - 1)
        } else {
            0
        };
        *buckets[index].counts.entry(*label).or_insert(0) += 1;
    }

    Histogram { buckets }
}
