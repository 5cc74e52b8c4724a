//! CSV ingest and row cleaning.
//!
//! Turns a campaign-day CSV into validated [`DatasetRow`]s plus a
//! [`DataQuality`] report. Missing columns are fatal; bad rows are skipped and
//! counted.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use adpulse_core::{DataQuality, DatasetRow, DateRange, InvalidValue, PipelineError};
use chrono::NaiveDate;
use csv::StringRecord;
use serde_json::json;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MAX_DATE_EXAMPLES: usize = 5;
/// Relative gap above which a supplied `ctr`/`roas` counts as inconsistent.
const DERIVED_TOLERANCE: f64 = 0.01;

/// Cleaned rows, sorted by date, with the quality report of the cleaning pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub rows: Vec<DatasetRow>,
    pub quality: DataQuality,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub required_fields: Vec<String>,
    pub max_missing_percentage: f64,
    pub date_range: Option<DateRange>,
}

impl LoadOptions {
    #[must_use]
    pub fn from_config(config: &adpulse_core::AnalysisConfig) -> Self {
        Self {
            required_fields: config.data_quality.required_fields.clone(),
            max_missing_percentage: config.data_quality.max_missing_percentage,
            date_range: None,
        }
    }

    #[must_use]
    pub fn with_date_range(mut self, date_range: Option<DateRange>) -> Self {
        self.date_range = date_range;
        self
    }
}

/// Open and clean the dataset at `path`.
///
/// # Errors
///
/// - [`PipelineError::Io`] if the file cannot be opened.
/// - [`PipelineError::Validation`] if required columns are absent.
/// - [`PipelineError::DataQuality`] if too many rows are missing values or
///   no valid rows remain.
pub fn load_dataset(path: &Path, options: &LoadOptions) -> Result<Dataset, PipelineError> {
    let file = File::open(path).map_err(|e| PipelineError::io(path.display().to_string(), e))?;
    let dataset = read_dataset(file, options)?;
    tracing::info!(
        path = %path.display(),
        rows_read = dataset.quality.rows_read,
        rows_used = dataset.rows.len(),
        invalid_rows = dataset.quality.invalid_rows,
        "dataset loaded"
    );
    Ok(dataset)
}

/// Clean a CSV stream. See [`load_dataset`] for the error contract.
///
/// # Errors
///
/// Same as [`load_dataset`], minus the file-open failure.
pub fn read_dataset<R: Read>(reader: R, options: &LoadOptions) -> Result<Dataset, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| {
            PipelineError::validation(
                format!("failed to read CSV headers: {e}"),
                serde_json::Value::Null,
            )
        })?
        .clone();
    let columns = Columns::new(&headers);

    let missing_fields: Vec<&str> = options
        .required_fields
        .iter()
        .map(String::as_str)
        .filter(|f| !columns.has(f))
        .collect();
    if !missing_fields.is_empty() {
        return Err(PipelineError::validation(
            "Missing required fields in dataset",
            json!({
                "missing_fields": missing_fields,
                "required_fields": options.required_fields,
            }),
        ));
    }

    let mut quality = DataQuality::default();
    let mut rows = Vec::new();
    let mut rows_missing = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        quality.rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(line, error = %e, "CSV parse error; row skipped");
                quality.invalid_rows += 1;
                continue;
            }
        };

        match parse_row(&record, &columns, options, line, &mut quality) {
            RowOutcome::Row(row) => {
                if !matches!(options.date_range, Some(range) if !range.contains(row.date)) {
                    rows.push(*row);
                }
            }
            RowOutcome::Missing => {
                rows_missing += 1;
                quality.invalid_rows += 1;
            }
            RowOutcome::Rejected => quality.invalid_rows += 1,
        }
    }

    if quality.rows_read > 0 {
        #[allow(clippy::cast_precision_loss)]
        let missing_share = rows_missing as f64 / quality.rows_read as f64;
        if missing_share > options.max_missing_percentage {
            return Err(PipelineError::data_quality(
                format!(
                    "{:.1}% of rows are missing required values (limit {:.1}%)",
                    missing_share * 100.0,
                    options.max_missing_percentage * 100.0
                ),
                json!({
                    "rows_read": quality.rows_read,
                    "rows_missing": rows_missing,
                    "missing_values": quality.missing_values,
                }),
            ));
        }
    }

    if rows.is_empty() {
        return Err(PipelineError::data_quality(
            "No valid rows remain after cleaning",
            json!({ "rows_read": quality.rows_read, "invalid_rows": quality.invalid_rows }),
        ));
    }

    if quality.invalid_rows > 0 {
        tracing::warn!(
            invalid_rows = quality.invalid_rows,
            rows_read = quality.rows_read,
            "removed rows due to data quality issues"
        );
    }

    rows.sort_by_key(|r| r.date);
    Ok(Dataset { rows, quality })
}

/// Header name → column index, tolerant of BOMs and case.
struct Columns(HashMap<String, usize>);

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        Self(
            headers
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let name = name.trim().trim_start_matches('\u{feff}').to_lowercase();
                    (name, idx)
                })
                .collect(),
        )
    }

    fn has(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Trimmed cell value; `None` for an absent column or empty cell.
    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.0
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

enum RowOutcome {
    Row(Box<DatasetRow>),
    Missing,
    Rejected,
}

fn parse_row(
    record: &StringRecord,
    columns: &Columns,
    options: &LoadOptions,
    line: usize,
    quality: &mut DataQuality,
) -> RowOutcome {
    let mut missing = false;
    for field in &options.required_fields {
        if columns.get(record, field).is_none() {
            *quality.missing_values.entry(field.clone()).or_default() += 1;
            missing = true;
        }
    }
    if missing {
        return RowOutcome::Missing;
    }

    let Some(raw_date) = columns.get(record, "date") else {
        return RowOutcome::Missing;
    };
    let Ok(date) = NaiveDate::parse_from_str(raw_date, DATE_FORMAT) else {
        tracing::warn!(line, value = raw_date, "unparseable date; row skipped");
        quality.invalid_dates += 1;
        if quality.invalid_date_examples.len() < MAX_DATE_EXAMPLES {
            quality.invalid_date_examples.push(InvalidValue {
                line,
                value: raw_date.to_string(),
            });
        }
        return RowOutcome::Rejected;
    };

    let mut numeric = |field: &str| -> Result<Option<f64>, ()> {
        match columns.get(record, field) {
            None => Ok(None),
            Some(raw) => match coerce_number(raw) {
                Some(v) => Ok(Some(v)),
                None => {
                    tracing::debug!(line, field, value = raw, "non-numeric value");
                    *quality.non_numeric_values.entry(field.to_string()).or_default() += 1;
                    Err(())
                }
            },
        }
    };

    let (Ok(spend), Ok(revenue), Ok(impressions), Ok(clicks), Ok(purchases)) = (
        numeric("spend"),
        numeric("revenue"),
        numeric("impressions"),
        numeric("clicks"),
        numeric("purchases"),
    ) else {
        return RowOutcome::Rejected;
    };
    // Supplied ratios are only cross-checked; an unreadable one counts as absent.
    let supplied_ctr = numeric("ctr").unwrap_or(None);
    let supplied_roas = numeric("roas").unwrap_or(None);

    let spend = spend.unwrap_or(0.0);
    let revenue = revenue.unwrap_or(0.0);
    let (Some(impressions), Some(clicks), Some(purchases)) = (
        to_count(impressions.unwrap_or(0.0)),
        to_count(clicks.unwrap_or(0.0)),
        to_count(purchases.unwrap_or(0.0)),
    ) else {
        quality.constraint_violations += 1;
        return RowOutcome::Rejected;
    };

    if spend < 0.0 || revenue < 0.0 || clicks > impressions {
        tracing::debug!(line, spend, impressions, clicks, "row violates numeric invariants");
        quality.constraint_violations += 1;
        return RowOutcome::Rejected;
    }

    let text = |field: &str| {
        columns
            .get(record, field)
            .map_or_else(|| "unknown".to_string(), str::to_string)
    };

    let row = DatasetRow {
        campaign_name: text("campaign_name"),
        date,
        spend,
        impressions,
        clicks,
        purchases,
        revenue,
        creative_type: text("creative_type"),
        audience_type: text("audience_type"),
        platform: text("platform"),
        creative_message: columns.get(record, "creative_message").map(str::to_string),
        country: columns.get(record, "country").map(str::to_string),
    };

    if disagrees(supplied_ctr, row.ctr()) || disagrees(supplied_roas, row.roas()) {
        quality.recomputed_derived += 1;
    }

    RowOutcome::Row(Box::new(row))
}

fn disagrees(supplied: Option<f64>, computed: Option<f64>) -> bool {
    match (supplied, computed) {
        (Some(s), Some(c)) => {
            let scale = c.abs().max(f64::EPSILON);
            (s - c).abs() / scale > DERIVED_TOLERANCE
        }
        _ => false,
    }
}

/// Non-negative whole number, or `None`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_count(value: f64) -> Option<u64> {
    if value >= 0.0 && value.fract() == 0.0 && value < 9.0e15 {
        Some(value as u64)
    } else {
        None
    }
}

/// Coerce a raw cell into a number.
///
/// Accepts a leading currency symbol, thousands separators and a trailing
/// `%`. Returns `None` for anything else, including non-finite values.
#[must_use]
pub fn coerce_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['$', '€', '£'])
        .unwrap_or(trimmed)
        .trim_end_matches('%')
        .trim();
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
