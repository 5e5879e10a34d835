use crate::error::PipelineError;
use crate::models::{
    ApplicantRecord, CareerTable, ClassifiedRecord, ClassifiedTable, Outcome, REMARK_ABSENT,
};
use tracing::warn;

/// Label one row of `career`'s table. Rules in precedence order:
/// direct-admission remark, second choice naming this career, absent remark,
/// otherwise rejected.
pub fn classify(record: &ApplicantRecord, career: &str) -> Outcome {
    if record.is_direct_admission() {
        Outcome::AdmittedDirect
    } else if record.lists_second_choice(career) {
        Outcome::AdmittedSecondChoice
    } else if record.has_remark(REMARK_ABSENT) {
        Outcome::Absent
    } else {
        Outcome::Rejected
    }
}

pub fn classify_table(table: &CareerTable) -> ClassifiedTable {
    let mut records = Vec::with_capacity(table.records.len());
    let mut malformed_rows = 0;

    for (index, record) in table.records.iter().enumerate() {
        if let Err(err) = validate(record, index) {
            warn!(
                edition = %table.edition,
                career = %table.career,
                error = %err,
                "skipping row"
            );
            malformed_rows += 1;
            continue;
        }
        records.push(ClassifiedRecord {
            outcome: classify(record, &table.career),
            record: record.clone(),
        });
    }

    ClassifiedTable {
        edition: table.edition,
        career: table.career.clone(),
        records,
        malformed_rows,
    }
}

fn validate(record: &ApplicantRecord, index: usize) -> Result<(), PipelineError> {
    let reason = if record.id.trim().is_empty() {
        "missing id"
    } else if record.career.trim().is_empty() {
        "missing career"
    } else {
        return Ok(());
    };
    Err(PipelineError::MalformedRow {
        // header is line 1
        line: index as u64 + 2,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Edition, REMARK_ADMITTED, REMARK_ADMITTED_FIRST_CHOICE, REMARK_ADMITTED_SECOND_CHOICE,
    };

    fn record(
        id: &str,
        career: &str,
        remark: Option<&str>,
        second: Option<&str>,
    ) -> ApplicantRecord {
        ApplicantRecord {
            id: id.to_string(),
            career: career.to_string(),
            score: None,
            slot: String::new(),
            remark: remark.map(str::to_string),
            second_choice_career: second.map(str::to_string),
        }
    }

    #[test]
    fn direct_admission_wins_over_second_choice() {
        let r = record("1", "B", Some(REMARK_ADMITTED_FIRST_CHOICE), Some("B"));
        assert_eq!(classify(&r, "B"), Outcome::AdmittedDirect);
        let r = record("1", "B", Some(REMARK_ADMITTED), None);
        assert_eq!(classify(&r, "B"), Outcome::AdmittedDirect);
    }

    #[test]
    fn second_choice_only_counts_in_that_career() {
        let r = record("5", "A", Some(REMARK_ADMITTED_SECOND_CHOICE), Some("B"));
        assert_eq!(classify(&r, "B"), Outcome::AdmittedSecondChoice);
        assert_eq!(classify(&r, "b"), Outcome::AdmittedSecondChoice);
        assert_eq!(classify(&r, "A"), Outcome::Rejected);
    }

    #[test]
    fn second_choice_is_checked_before_absence() {
        let r = record("7", "A", Some(REMARK_ABSENT), Some("B"));
        assert_eq!(classify(&r, "B"), Outcome::AdmittedSecondChoice);
        assert_eq!(classify(&r, "A"), Outcome::Absent);
    }

    #[test]
    fn unknown_or_missing_remark_is_rejected() {
        assert_eq!(classify(&record("2", "A", None, None), "A"), Outcome::Rejected);
        assert_eq!(
            classify(&record("3", "A", Some("NO ALCANZO VACANTE"), None), "A"),
            Outcome::Rejected
        );
    }

    #[test]
    fn malformed_rows_are_skipped_and_counted() {
        let mut table = CareerTable::new(Edition::new(2025, 1), "A");
        table.records.push(record("1", "A", Some(REMARK_ADMITTED), None));
        table.records.push(record("", "A", None, None));
        table.records.push(record("3", " ", None, None));
        table.records.push(record("4", "A", Some(REMARK_ABSENT), None));

        let classified = classify_table(&table);
        assert_eq!(classified.malformed_rows, 2);
        let outcomes: Vec<_> = classified.records.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![Outcome::AdmittedDirect, Outcome::Absent]);
    }

    #[test]
    fn outcomes_partition_the_table() {
        let mut table = CareerTable::new(Edition::new(2025, 1), "B");
        table.records.push(record("1", "B", Some(REMARK_ADMITTED), None));
        table.records.push(record(
            "2",
            "A",
            Some(REMARK_ADMITTED_SECOND_CHOICE),
            Some("B"),
        ));
        table.records.push(record("3", "B", Some(REMARK_ABSENT), None));
        table.records.push(record("4", "B", None, None));
        table.records.push(record("5", "B", Some("ANULADO"), None));

        let classified = classify_table(&table);
        let count = |outcome: Outcome| {
            classified
                .records
                .iter()
                .filter(|r| r.outcome == outcome)
                .count()
        };
        let total = count(Outcome::AdmittedDirect)
            + count(Outcome::AdmittedSecondChoice)
            + count(Outcome::Rejected)
            + count(Outcome::Absent);
        assert_eq!(total, table.records.len());
        assert_eq!(count(Outcome::Rejected), 2);
    }
}
