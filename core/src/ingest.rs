//! Record validation: delimited text in, typed candidates out.
//!
//! A bad row never aborts the read. It becomes a RowRejection and the
//! rest of the file carries on. Only a header missing a required
//! column fails the whole input.

use crate::{
    error::{SamplerError, SamplerResult},
    types::CandidateRecord,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;

pub const REQUIRED_COLUMNS: [&str; 5] = [
    "policy_id",
    "application_receive_date",
    "advisor_id",
    "branch_name",
    "sampling_frame_flag",
];

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// One input row as the reader sees it, before any checks.
/// Empty and absent cells arrive as None.
#[derive(Debug, Clone, Default)]
pub struct RawRow {
    pub policy_id:                Option<String>,
    pub application_receive_date: Option<String>,
    pub advisor_id:               Option<String>,
    pub branch_name:              Option<String>,
    pub sampling_frame_flag:      Option<String>,
}

impl RawRow {
    /// Pick the required cells out of a record. `columns` holds the
    /// header position of each field, in struct order.
    fn from_record(record: &csv::StringRecord, columns: &[Option<usize>; 5]) -> Self {
        let cell = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            policy_id:                cell(columns[0]),
            application_receive_date: cell(columns[1]),
            advisor_id:               cell(columns[2]),
            branch_name:              cell(columns[3]),
            sampling_frame_flag:      cell(columns[4]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    MissingField { column: &'static str },
    UnparseableDate { value: String },
    DateOutOfRange { date: NaiveDate },
    UnrecognisedFlag { value: String },
    DuplicatePolicyId { policy_id: String },
    Malformed { message: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { column } => write!(f, "missing required field '{column}'"),
            Self::UnparseableDate { value } => write!(f, "unparseable receive date '{value}'"),
            Self::DateOutOfRange { date } => write!(f, "receive date {date} out of range"),
            Self::UnrecognisedFlag { value } => write!(f, "unrecognised sampling frame flag '{value}'"),
            Self::DuplicatePolicyId { policy_id } => {
                write!(f, "policy_id '{policy_id}' repeated in this submission")
            }
            Self::Malformed { message } => write!(f, "malformed row: {message}"),
        }
    }
}

/// A rejected row. `row` is 1-based and counts data rows only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub row:    usize,
    pub reason: RejectReason,
}

/// Everything one submission produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ingestion {
    pub records:    Vec<CandidateRecord>,
    pub rejections: Vec<RowRejection>,
}

impl Ingestion {
    /// Wrap records that were validated elsewhere.
    pub fn from_records(records: Vec<CandidateRecord>) -> Self {
        Self { records, rejections: Vec::new() }
    }

    pub fn submitted_count(&self) -> usize {
        self.records.len() + self.rejections.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejections.len()
    }
}

/// Coerce a truthy/falsy cell. Empty means false.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Accepts ISO dates, a few common slash/month-name layouts, and
/// timestamps (the time part is dropped).
pub fn parse_receive_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Pick a delimiter from the header line: tab, then semicolon, else comma.
pub fn sniff_delimiter(header_line: &str) -> u8 {
    if header_line.contains('\t') {
        b'\t'
    } else if header_line.contains(';') && !header_line.contains(',') {
        b';'
    } else {
        b','
    }
}

pub struct RecordValidator {
    earliest: NaiveDate,
    latest:   NaiveDate,
}

impl RecordValidator {
    /// Receive dates must fall between 2000-01-01 and `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            earliest: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN),
            latest:   today,
        }
    }

    /// Validator anchored to the current UTC date.
    pub fn today() -> Self {
        Self::new(chrono::Utc::now().date_naive())
    }

    /// Check a single row.
    pub fn validate_row(&self, raw: &RawRow) -> Result<CandidateRecord, RejectReason> {
        let policy_id = required(&raw.policy_id, "policy_id")?;
        let date_raw = required(&raw.application_receive_date, "application_receive_date")?;
        let advisor_id = required(&raw.advisor_id, "advisor_id")?;
        let branch_name = required(&raw.branch_name, "branch_name")?;

        let receive_date = parse_receive_date(date_raw).ok_or_else(|| RejectReason::UnparseableDate {
            value: date_raw.to_string(),
        })?;
        if receive_date < self.earliest || receive_date > self.latest {
            return Err(RejectReason::DateOutOfRange { date: receive_date });
        }

        let flag_raw = raw.sampling_frame_flag.as_deref().unwrap_or("");
        let flagged = parse_flag(flag_raw).ok_or_else(|| RejectReason::UnrecognisedFlag {
            value: flag_raw.to_string(),
        })?;

        Ok(CandidateRecord {
            policy_id: policy_id.to_string(),
            receive_date,
            advisor_id: advisor_id.to_string(),
            branch_name: branch_name.to_string(),
            flagged,
        })
    }

    /// Validate a sequence of raw rows, rejecting repeats of a policy_id
    /// after its first valid occurrence.
    pub fn validate_rows<I>(&self, rows: I) -> Ingestion
    where
        I: IntoIterator<Item = Result<RawRow, RejectReason>>,
    {
        let mut out = Ingestion::default();
        let mut seen: HashSet<String> = HashSet::new();

        for (i, row) in rows.into_iter().enumerate() {
            let checked = row.and_then(|raw| self.validate_row(&raw)).and_then(|record| {
                if seen.insert(record.policy_id.clone()) {
                    Ok(record)
                } else {
                    Err(RejectReason::DuplicatePolicyId { policy_id: record.policy_id })
                }
            });
            match checked {
                Ok(record) => out.records.push(record),
                Err(reason) => out.rejections.push(RowRejection { row: i + 1, reason }),
            }
        }

        if !out.rejections.is_empty() {
            log::warn!(
                "ingest: rejected {} of {} rows",
                out.rejected_count(),
                out.submitted_count()
            );
            for rejection in &out.rejections {
                log::debug!("ingest: row {} rejected: {}", rejection.row, rejection.reason);
            }
        }
        out
    }

    /// Read delimited text with a header row.
    pub fn read<R: Read>(&self, input: R, delimiter: u8) -> SamplerResult<Ingestion> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        let position = |column: &str| headers.iter().position(|h| h == column);
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| position(*c).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(SamplerError::Validation(format!(
                "input is missing required columns: {}",
                missing.join(", ")
            )));
        }
        let columns = [
            position("policy_id"),
            position("application_receive_date"),
            position("advisor_id"),
            position("branch_name"),
            position("sampling_frame_flag"),
        ];

        let rows = reader.records().map(|r| {
            r.map(|record| RawRow::from_record(&record, &columns))
                .map_err(|e| RejectReason::Malformed { message: e.to_string() })
        });
        let ingestion = self.validate_rows(rows);
        log::info!(
            "ingest: {} valid rows, {} rejected",
            ingestion.records.len(),
            ingestion.rejected_count()
        );
        Ok(ingestion)
    }

    /// Read a file; `delimiter = None` sniffs it from the header line.
    /// The file is streamed, so undecodable bytes only reject their row.
    pub fn read_path(&self, path: &Path, delimiter: Option<u8>) -> SamplerResult<Ingestion> {
        let file = File::open(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
        let mut input = BufReader::new(file);
        let mut header_line = Vec::new();
        input
            .read_until(b'\n', &mut header_line)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;

        let delimiter = delimiter
            .unwrap_or_else(|| sniff_delimiter(&String::from_utf8_lossy(&header_line)));
        self.read(Cursor::new(header_line).chain(input), delimiter)
    }
}

fn required<'a>(value: &'a Option<String>, column: &'static str) -> Result<&'a str, RejectReason> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RejectReason::MissingField { column }),
    }
}
