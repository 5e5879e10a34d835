use crate::analyzer::TableSource;
use crate::error::PipelineError;
use crate::models::{
    career_slug, same_career, ApplicantRecord, CareerTable, Dataset, Edition, RawApplicantRow,
    RawTable,
};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const RAW_DIR: &str = "raw";
const PROCESSED_DIR: &str = "processed";

/// Flat CSV tables on disk, one per (edition, career):
/// `<root>/<stage>/<edition>/<edition>-<career slug>.csv`.
pub struct TableStore {
    root: PathBuf,
}

impl TableStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_path(&self, edition: Edition, career: &str) -> PathBuf {
        table_path(&self.root.join(RAW_DIR), edition, career)
    }

    pub fn processed_path(&self, edition: Edition, career: &str) -> PathBuf {
        table_path(&self.root.join(PROCESSED_DIR), edition, career)
    }

    pub fn write_raw(
        &self,
        edition: Edition,
        career: &str,
        rows: &[RawApplicantRow],
    ) -> Result<PathBuf, PipelineError> {
        let path = self.raw_path(edition, career);
        write_rows(&path, rows)?;
        Ok(path)
    }

    pub fn read_raw_dataset(&self) -> Result<Vec<RawTable>, PipelineError> {
        let base = self.root.join(RAW_DIR);
        let mut tables = Vec::new();
        for edition in list_editions(&base)? {
            for slug in list_careers(&base, edition)? {
                let path = table_path(&base, edition, &slug);
                let (rows, skipped) = read_rows::<RawApplicantRow>(&path)?;
                if skipped > 0 {
                    warn!(path = %path.display(), skipped, "skipped unreadable raw rows");
                }
                tables.push(RawTable { edition, slug, rows });
            }
        }
        Ok(tables)
    }

    /// Drop every processed table and write `dataset` in its place.
    pub fn replace_processed(&self, dataset: &Dataset) -> Result<usize, PipelineError> {
        let base = self.root.join(PROCESSED_DIR);
        if base.exists() {
            fs::remove_dir_all(&base).map_err(|e| PipelineError::io(&base, e))?;
        }
        for table in dataset.values() {
            write_rows(&self.processed_path(table.edition, &table.career), &table.records)?;
        }
        info!(tables = dataset.len(), dir = %base.display(), "processed tables written");
        Ok(dataset.len())
    }

    pub fn careers(&self, edition: Edition) -> Result<Vec<String>, PipelineError> {
        list_careers(&self.root.join(PROCESSED_DIR), edition)
    }
}

impl TableSource for TableStore {
    fn load(&self, edition: Edition, career: &str) -> Result<CareerTable, PipelineError> {
        let path = self.processed_path(edition, career);
        if !path.is_file() {
            return Err(PipelineError::NotFound {
                edition,
                career: career.to_string(),
            });
        }

        let (records, skipped) = read_rows::<ApplicantRecord>(&path)?;
        if skipped > 0 {
            warn!(path = %path.display(), skipped, "skipped unreadable rows");
        }
        let display = records
            .iter()
            .find(|record| same_career(&record.career, career))
            .map(|record| record.career.clone())
            .unwrap_or_else(|| career.to_string());

        Ok(CareerTable {
            edition,
            career: display,
            records,
        })
    }

    fn editions(&self) -> Result<Vec<Edition>, PipelineError> {
        list_editions(&self.root.join(PROCESSED_DIR))
    }
}

fn table_path(base: &Path, edition: Edition, career: &str) -> PathBuf {
    base.join(edition.to_string())
        .join(format!("{}-{}.csv", edition, career_slug(career)))
}

fn list_editions(base: &Path) -> Result<Vec<Edition>, PipelineError> {
    if !base.is_dir() {
        return Ok(Vec::new());
    }
    let mut editions = Vec::new();
    for entry in fs::read_dir(base).map_err(|e| PipelineError::io(base, e))? {
        let entry = entry.map_err(|e| PipelineError::io(base, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        match entry.file_name().to_string_lossy().parse::<Edition>() {
            Ok(edition) => editions.push(edition),
            Err(err) => warn!(error = %err, "ignoring directory"),
        }
    }
    editions.sort();
    Ok(editions)
}

fn list_careers(base: &Path, edition: Edition) -> Result<Vec<String>, PipelineError> {
    let dir = base.join(edition.to_string());
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = format!("{}-", edition);
    let mut slugs = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| PipelineError::io(&dir, e))? {
        let path = entry.map_err(|e| PipelineError::io(&dir, e))?.path();
        if path.extension().and_then(|s| s.to_str()) != Some("csv") {
            continue;
        }
        let slug = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|stem| stem.strip_prefix(&prefix));
        if let Some(slug) = slug {
            slugs.push(slug.to_string());
        }
    }
    slugs.sort();
    Ok(slugs)
}

/// Deserialize every row it can; the second value counts rows that failed.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<(Vec<T>, usize), PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| PipelineError::csv(path, e))?;

    let mut rows = Vec::new();
    let mut skipped = 0;
    for result in reader.deserialize::<T>() {
        match result {
            Ok(row) => rows.push(row),
            Err(err) => {
                let malformed = PipelineError::MalformedRow {
                    line: err.position().map(|p| p.line()).unwrap_or_default(),
                    reason: err.to_string(),
                };
                warn!(path = %path.display(), error = %malformed, "skipping row");
                skipped += 1;
            }
        }
    }
    Ok((rows, skipped))
}

fn write_rows<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| PipelineError::csv(path, e))?;
    for row in rows {
        writer.serialize(row).map_err(|e| PipelineError::csv(path, e))?;
    }
    writer.flush().map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::REMARK_ADMITTED;

    fn record(id: &str, career: &str, score: Option<f64>) -> ApplicantRecord {
        ApplicantRecord {
            id: id.to_string(),
            career: career.to_string(),
            score,
            slot: "A".to_string(),
            remark: score.map(|_| REMARK_ADMITTED.to_string()),
            second_choice_career: None,
        }
    }

    #[test]
    fn processed_tables_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let edition = Edition::new(2025, 1);
        let mut table = CareerTable::new(edition, "Medicina Humana");
        table.records.push(record("1", "Medicina Humana", Some(700.5)));
        table.records.push(record("2", "Enfermería", None));
        let dataset: Dataset = [((edition, table.slug()), table.clone())].into();

        assert_eq!(store.replace_processed(&dataset).unwrap(), 1);
        assert!(dir
            .path()
            .join("processed/2025-1/2025-1-medicina-humana.csv")
            .is_file());

        let loaded = store.load(edition, "medicina-humana").unwrap();
        assert_eq!(loaded.career, "Medicina Humana");
        assert_eq!(loaded.records, table.records);
        assert_eq!(store.editions().unwrap(), vec![edition]);
        assert_eq!(store.careers(edition).unwrap(), vec!["medicina-humana"]);
    }

    #[test]
    fn missing_table_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let err = store.load(Edition::new(2023, 1), "Física").unwrap_err();
        assert!(err.is_not_found());
        assert!(store.editions().unwrap().is_empty());
    }

    #[test]
    fn replace_processed_removes_stale_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let edition = Edition::new(2024, 2);
        let old = CareerTable::new(edition, "Química");
        store
            .replace_processed(&[((edition, old.slug()), old)].into())
            .unwrap();
        let new = CareerTable::new(edition, "Física");
        store
            .replace_processed(&[((edition, new.slug()), new)].into())
            .unwrap();

        assert_eq!(store.careers(edition).unwrap(), vec!["fisica"]);
    }

    #[test]
    fn raw_rows_survive_and_bad_rows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = TableStore::new(dir.path());
        let edition = Edition::new(2025, 1);
        let rows = vec![RawApplicantRow {
            id: "001".to_string(),
            full_name: Some("PEREZ, ANA".to_string()),
            career: "Física".to_string(),
            score: "612.3".to_string(),
            slot: "1".to_string(),
            remark: REMARK_ADMITTED.to_string(),
            second_choice_career: String::new(),
        }];
        let path = store.write_raw(edition, "Física", &rows).unwrap();

        let mut text = fs::read_to_string(&path).unwrap();
        text.push_str("only,two\n");
        fs::write(&path, text).unwrap();

        let tables = store.read_raw_dataset().unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].slug, "fisica");
        assert_eq!(tables[0].rows, rows);
    }
}
