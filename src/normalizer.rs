use crate::models::{
    parse_score, same_career, ApplicantRecord, CareerTable, RawApplicantRow, RawTable,
};

/// Turn one scraped table into its persisted form. The career's display name
/// comes from the first row that belongs to it, falling back to the file slug.
pub fn normalize_raw_table(raw: RawTable) -> CareerTable {
    let career = raw
        .rows
        .iter()
        .map(|row| row.career.trim())
        .find(|career| same_career(career, &raw.slug))
        .unwrap_or(raw.slug.as_str())
        .to_string();
    let records = normalize_table(raw.rows);
    CareerTable {
        edition: raw.edition,
        career,
        records,
    }
}

/// Drop the identifying name and coerce the scraped cells into the shared
/// record schema. Row order is kept.
pub fn normalize_table(rows: Vec<RawApplicantRow>) -> Vec<ApplicantRecord> {
    rows.into_iter().map(normalize_row).collect()
}

pub fn normalize_row(row: RawApplicantRow) -> ApplicantRecord {
    // full_name never leaves this function.
    let RawApplicantRow {
        id,
        full_name: _,
        career,
        score,
        slot,
        remark,
        second_choice_career,
    } = row;

    ApplicantRecord {
        id: id.trim().to_string(),
        career: career.trim().to_string(),
        score: parse_score(&score),
        slot: slot.trim().to_string(),
        remark: non_blank(remark),
        second_choice_career: non_blank(second_choice_career),
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: &str, name: Option<&str>, score: &str, remark: &str) -> RawApplicantRow {
        RawApplicantRow {
            id: id.to_string(),
            full_name: name.map(str::to_string),
            career: "MEDICINA HUMANA".to_string(),
            score: score.to_string(),
            slot: "1".to_string(),
            remark: remark.to_string(),
            second_choice_career: String::new(),
        }
    }

    #[test]
    fn drops_name_and_keeps_order() {
        let rows = vec![
            raw("003", Some("PEREZ, ANA"), "700.25", "ALCANZO VACANTE"),
            raw("001", Some("QUISPE, LUIS"), "", ""),
        ];
        let records = normalize_table(rows);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "003");
        assert_eq!(records[0].score, Some(700.25));
        assert_eq!(records[0].remark.as_deref(), Some("ALCANZO VACANTE"));
        assert_eq!(records[1].id, "001");
        assert_eq!(records[1].score, None);
        assert_eq!(records[1].remark, None);
        assert_eq!(records[1].second_choice_career, None);
    }

    #[test]
    fn table_takes_display_name_from_its_rows() {
        let raw_table = RawTable {
            edition: crate::models::Edition::new(2025, 1),
            slug: "medicina-humana".to_string(),
            rows: vec![raw("1", Some("ROJAS, EVA"), "610", "")],
        };
        let table = normalize_raw_table(raw_table);
        assert_eq!(table.career, "MEDICINA HUMANA");
        assert!(crate::classifier::classify_table(&table).career_offered());

        let empty = normalize_raw_table(RawTable {
            edition: crate::models::Edition::new(2025, 1),
            slug: "fisica".to_string(),
            rows: Vec::new(),
        });
        assert_eq!(empty.career, "fisica");
        assert!(empty.records.is_empty());
    }

    #[test]
    fn missing_name_is_a_no_op() {
        let record = normalize_row(raw(" 42 ", None, "512", " AUSENTE "));
        assert_eq!(record.id, "42");
        assert_eq!(record.career, "MEDICINA HUMANA");
        assert_eq!(record.remark.as_deref(), Some("AUSENTE"));
    }
}
