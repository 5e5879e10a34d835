use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const REMARK_ADMITTED: &str = "ALCANZO VACANTE";
pub const REMARK_ADMITTED_FIRST_CHOICE: &str = "ALCANZO VACANTE PRIMERA OPCIÓN";
#[cfg(test)]
pub const REMARK_ADMITTED_SECOND_CHOICE: &str = "ALCANZO VACANTE SEGUNDA OPCIÓN";
pub const REMARK_ABSENT: &str = "AUSENTE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Edition index pages, e.g. `https://admision.unmsm.edu.pe/Website20251/A.html`
    pub edition_urls: Vec<String>,
    pub data_directory: Option<String>,
    pub output_directory: Option<String>,
    pub log_level: Option<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_buckets_all")]
    pub histogram_buckets_all: usize,
    #[serde(default = "default_buckets_admitted")]
    pub histogram_buckets_admitted: usize,
}

fn default_top_n() -> usize {
    10
}

fn default_buckets_all() -> usize {
    40
}

fn default_buckets_admitted() -> usize {
    20
}

impl Default for Config {
    fn default() -> Self {
        Self {
            edition_urls: vec![
                "https://admision.unmsm.edu.pe/Website20241/A.html".to_string(),
                "https://admision.unmsm.edu.pe/Website20242/A.html".to_string(),
                "https://admision.unmsm.edu.pe/Website20251/A.html".to_string(),
            ],
            data_directory: Some("data".to_string()),
            output_directory: Some("output".to_string()),
            log_level: Some("info".to_string()),
            top_n: default_top_n(),
            histogram_buckets_all: default_buckets_all(),
            histogram_buckets_admitted: default_buckets_admitted(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }

    pub fn data_dir(&self) -> &str {
        self.data_directory.as_deref().unwrap_or("data")
    }

    pub fn output_dir(&self) -> &str {
        self.output_directory.as_deref().unwrap_or("output")
    }
}

/// One admission cycle: a year plus the exam session within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edition {
    pub year: u16,
    pub session: u8,
}

impl Edition {
    pub fn new(year: u16, session: u8) -> Self {
        Self { year, session }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.year, self.session)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid edition '{0}', expected YYYY-S")]
pub struct ParseEditionError(String);

impl FromStr for Edition {
    type Err = ParseEditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (year, session) = match s.split_once('-') {
            Some((year, session)) => (year, session),
            None => (s, "1"),
        };
        let year = year
            .parse::<u16>()
            .map_err(|_| ParseEditionError(s.to_string()))?;
        let session = session
            .parse::<u8>()
            .map_err(|_| ParseEditionError(s.to_string()))?;
        Ok(Self { year, session })
    }
}

/// URL/file-safe career key: ASCII, lowercase, words joined by `-`.
pub fn career_slug(career: &str) -> String {
    let ascii = deunicode::deunicode(career).to_lowercase();
    let mut slug = String::with_capacity(ascii.len());
    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn same_career(a: &str, b: &str) -> bool {
    career_slug(a) == career_slug(b)
}

/// Parse a scraped score cell. Blank, `-` and other non-numeric text mean "no score".
pub fn parse_score(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
}

/// A row as scraped from a career results page, identifying name included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawApplicantRow {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub career: String,
    #[serde(default)]
    pub score: String,
    #[serde(default)]
    pub slot: String,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub second_choice_career: String,
}

/// A scraped table as found under the raw storage directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub edition: Edition,
    pub slug: String,
    pub rows: Vec<RawApplicantRow>,
}

/// One persisted row of a (edition, career) results table.
///
/// `career` is the applicant's primary career; a row copied into its
/// second-choice career's table keeps it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicantRecord {
    pub id: String,
    pub career: String,
    pub score: Option<f64>,
    pub slot: String,
    pub remark: Option<String>,
    pub second_choice_career: Option<String>,
}

impl ApplicantRecord {
    pub fn has_remark(&self, remark: &str) -> bool {
        self.remark.as_deref().map(str::trim) == Some(remark)
    }

    pub fn is_direct_admission(&self) -> bool {
        self.has_remark(REMARK_ADMITTED) || self.has_remark(REMARK_ADMITTED_FIRST_CHOICE)
    }

    pub fn lists_second_choice(&self, career: &str) -> bool {
        self.second_choice_career
            .as_deref()
            .is_some_and(|second| same_career(second, career))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    AdmittedDirect,
    AdmittedSecondChoice,
    Rejected,
    Absent,
}

impl Outcome {
    pub fn is_admitted(self) -> bool {
        matches!(self, Outcome::AdmittedDirect | Outcome::AdmittedSecondChoice)
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::AdmittedDirect => "Admitted (direct)",
            Outcome::AdmittedSecondChoice => "Admitted (second choice)",
            Outcome::Rejected => "Rejected",
            Outcome::Absent => "Absent",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedRecord {
    pub record: ApplicantRecord,
    pub outcome: Outcome,
}

/// One (edition, career) table as stored after preprocessing.
#[derive(Debug, Clone, PartialEq)]
pub struct CareerTable {
    pub edition: Edition,
    pub career: String,
    pub records: Vec<ApplicantRecord>,
}

impl CareerTable {
    pub fn new(edition: Edition, career: impl Into<String>) -> Self {
        Self {
            edition,
            career: career.into(),
            records: Vec::new(),
        }
    }

    pub fn slug(&self) -> String {
        career_slug(&self.career)
    }
}

/// Every persisted table, keyed by edition and career slug.
pub type Dataset = BTreeMap<(Edition, String), CareerTable>;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedTable {
    pub edition: Edition,
    pub career: String,
    pub records: Vec<ClassifiedRecord>,
    pub malformed_rows: usize,
}

impl ClassifiedTable {
    pub fn admitted(&self) -> impl Iterator<Item = &ClassifiedRecord> {
        self.records.iter().filter(|row| row.outcome.is_admitted())
    }

    /// Whether any row lists this career as its primary career. Tables filled
    /// only by redistribution belong to careers not offered that edition.
    pub fn career_offered(&self) -> bool {
        self.records
            .iter()
            .any(|row| same_career(&row.record.career, &self.career))
    }
}

/// Admitted-score aggregates for one (edition, career).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YearlySummary {
    pub max_score: f64,
    pub min_score: f64,
    pub mean_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edition_parses_and_orders() {
        let first: Edition = "2024-2".parse().unwrap();
        let second: Edition = "2025-1".parse().unwrap();
        assert_eq!(first, Edition::new(2024, 2));
        assert!(first < second);
        assert_eq!(second.to_string(), "2025-1");
        assert_eq!("2023".parse::<Edition>().unwrap(), Edition::new(2023, 1));
        assert!("twenty".parse::<Edition>().is_err());
    }

    #[test]
    fn slug_strips_accents_and_spaces() {
        assert_eq!(career_slug("MEDICINA HUMANA"), "medicina-humana");
        assert_eq!(career_slug("  Ingeniería  de Software "), "ingenieria-de-software");
        assert_eq!(career_slug("E.P. Obstetricia"), "e-p-obstetricia");
        assert!(same_career("Ingeniería Civil", "ingenieria-civil"));
    }

    #[test]
    fn score_parsing_is_lenient() {
        assert_eq!(parse_score(" 650.5 "), Some(650.5));
        assert_eq!(parse_score("650,5"), Some(650.5));
        assert_eq!(parse_score(""), None);
        assert_eq!(parse_score("-"), None);
        assert_eq!(parse_score("NaN"), None);
    }

    #[test]
    fn direct_admission_remarks() {
        let mut record = ApplicantRecord {
            id: "1".to_string(),
            career: "X".to_string(),
            score: Some(600.0),
            slot: String::new(),
            remark: Some(REMARK_ADMITTED_FIRST_CHOICE.to_string()),
            second_choice_career: None,
        };
        assert!(record.is_direct_admission());
        record.remark = Some(REMARK_ADMITTED_SECOND_CHOICE.to_string());
        assert!(!record.is_direct_admission());
    }
}
