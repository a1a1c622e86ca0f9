//! Record validator tests: header checks, per-row rejections, coercion.

use chrono::NaiveDate;
use policy_sampler_core::{
    error::SamplerError,
    ingest::{RecordValidator, RejectReason},
};
use std::io::Write;

fn validator() -> RecordValidator {
    RecordValidator::new(NaiveDate::from_ymd_opt(2025, 5, 4).unwrap())
}

const HEADER: &str =
    "policy_id,application_receive_date,advisor_id,branch_name,sampling_frame_flag";

#[test]
fn reads_valid_rows_and_ignores_extra_columns() {
    let input = "\
policy_id,xml_blob,application_receive_date,advisor_id,branch_name,sampling_frame_flag
P1,<a/>,2025-04-20,ADV001,Maple Branch,1
P2,<b/>, 2025-04-21 ,ADV002,Oak Office,no
";
    let out = validator().read(input.as_bytes(), b',').unwrap();

    assert!(out.rejections.is_empty(), "{:?}", out.rejections);
    assert_eq!(out.records.len(), 2);
    let p1 = &out.records[0];
    assert_eq!(p1.policy_id, "P1");
    assert_eq!(p1.receive_date, NaiveDate::from_ymd_opt(2025, 4, 20).unwrap());
    assert_eq!(p1.advisor_id, "ADV001");
    assert_eq!(p1.branch_name, "Maple Branch");
    assert!(p1.flagged);
    assert!(!out.records[1].flagged);
}

#[test]
fn missing_column_rejects_whole_input() {
    let input = "policy_id,application_receive_date,advisor_id\nP1,2025-04-20,ADV001\n";
    let err = validator().read(input.as_bytes(), b',').unwrap_err();
    match err {
        SamplerError::Validation(msg) => {
            assert!(msg.contains("branch_name") && msg.contains("sampling_frame_flag"), "{msg}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn bad_rows_are_rejected_individually() {
    let input = format!(
        "{HEADER}
P1,2025-04-20,ADV001,Oak Office,1
,2025-04-20,ADV001,Oak Office,1
P3,someday,ADV001,Oak Office,0
P4,2025-04-20,,Oak Office,0
P5,2025-04-20,ADV001,Oak Office,perhaps
P6,1999-12-31,ADV001,Oak Office,0
P7,2025-05-05,ADV001,Oak Office,0
P1,2025-04-22,ADV009,Pine Plaza,0
P9,2025-04-20,ADV001
"
    );
    let out = validator().read(input.as_bytes(), b',').unwrap();

    assert_eq!(out.records.len(), 1);
    assert_eq!(out.submitted_count(), 9);

    let reasons: Vec<(usize, RejectReason)> =
        out.rejections.into_iter().map(|r| (r.row, r.reason)).collect();
    assert_eq!(
        reasons,
        vec![
            (2, RejectReason::MissingField { column: "policy_id" }),
            (3, RejectReason::UnparseableDate { value: "someday".into() }),
            (4, RejectReason::MissingField { column: "advisor_id" }),
            (5, RejectReason::UnrecognisedFlag { value: "perhaps".into() }),
            (6, RejectReason::DateOutOfRange { date: NaiveDate::from_ymd_opt(1999, 12, 31).unwrap() }),
            (7, RejectReason::DateOutOfRange { date: NaiveDate::from_ymd_opt(2025, 5, 5).unwrap() }),
            (8, RejectReason::DuplicatePolicyId { policy_id: "P1".into() }),
            (9, RejectReason::MissingField { column: "branch_name" }),
        ]
    );
}

#[test]
fn empty_flag_means_unflagged() {
    let input = format!("{HEADER}\nP1,2025-04-20,ADV001,Oak Office,\n");
    let out = validator().read(input.as_bytes(), b',').unwrap();
    assert_eq!(out.records.len(), 1);
    assert!(!out.records[0].flagged);
}

#[test]
fn quoted_fields_keep_embedded_delimiters() {
    let input = format!("{HEADER}\nP1,2025-04-20,ADV001,\"Oak Office, East\",TRUE\n");
    let out = validator().read(input.as_bytes(), b',').unwrap();
    assert_eq!(out.records[0].branch_name, "Oak Office, East");
    assert!(out.records[0].flagged);
}

#[test]
fn tab_file_is_sniffed_from_header() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER.replace(',', "\t")).unwrap();
    writeln!(file, "P1\t2025-04-20\tADV001\tOak Office\tyes").unwrap();
    writeln!(file, "P2\t04/21/2025\tADV002\tPine Plaza\t0").unwrap();

    let out = validator().read_path(file.path(), None).unwrap();
    assert_eq!(out.records.len(), 2);
    assert!(out.records[0].flagged);
    assert_eq!(out.records[1].receive_date, NaiveDate::from_ymd_opt(2025, 4, 21).unwrap());
}

#[test]
fn undecodable_row_is_rejected_alone() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{HEADER}").unwrap();
    writeln!(file, "P1,2025-04-20,ADV001,Oak Office,1").unwrap();
    file.write_all(b"P2,2025-04-20,ADV002,Caf\xe9 Corner,0\n").unwrap();
    writeln!(file, "P3,2025-04-22,ADV003,Pine Plaza,0").unwrap();

    let out = validator().read_path(file.path(), None).unwrap();
    let ids: Vec<&str> = out.records.iter().map(|r| r.policy_id.as_str()).collect();
    assert_eq!(ids, ["P1", "P3"]);
    assert_eq!(out.rejections.len(), 1);
    assert_eq!(out.rejections[0].row, 2);
    assert!(matches!(out.rejections[0].reason, RejectReason::Malformed { .. }));
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = validator().read_path(&dir.path().join("absent.csv"), None);
    assert!(matches!(result, Err(SamplerError::Other(_))));
}
