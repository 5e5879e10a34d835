use crate::metrics::summary;
use crate::models::{ClassifiedTable, Edition};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TrendStatistic {
    Max,
    Min,
    Mean,
}

impl fmt::Display for TrendStatistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrendStatistic::Max => "max",
            TrendStatistic::Min => "min",
            TrendStatistic::Mean => "mean",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub edition: Edition,
    pub statistic: TrendStatistic,
    pub value: f64,
}

/// Long-format admitted-score series for one career, ordered by edition and
/// then Max, Min, Mean. Editions with nobody admitted are left out.
pub fn trend(tables: &BTreeMap<Edition, ClassifiedTable>) -> Vec<TrendPoint> {
    let mut series = Vec::with_capacity(tables.len() * 3);
    for (edition, table) in tables {
        let Some(stats) = summary(table) else {
            continue;
        };
        for (statistic, value) in [
            (TrendStatistic::Max, stats.max_score),
            (TrendStatistic::Min, stats.min_score),
            (TrendStatistic::Mean, stats.mean_score),
        ] {
            series.push(TrendPoint {
                edition: *edition,
                statistic,
                value,
            });
        }
    }
    series
}
