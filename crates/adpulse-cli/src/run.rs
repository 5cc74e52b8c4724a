//! `run` command handler.

use std::path::{Path, PathBuf};

use adpulse_core::{AnalysisConfig, DateRange, Metric};
use adpulse_pipeline::{
    JsonFileGenerator, Pipeline, RunReport, RunRequest, SUMMARY_FILE, VALIDATED_FILE,
};
use chrono::NaiveDate;
use clap::Args;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Campaign CSV file
    #[arg(long)]
    pub dataset: PathBuf,
    /// Directory for summary, hypotheses and envelope log
    #[arg(long, default_value = "reports")]
    pub output_dir: PathBuf,
    /// First day to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub start_date: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub end_date: Option<NaiveDate>,
    /// Metric the generated hypotheses should explain
    #[arg(long, default_value = "roas", value_parser = parse_metric)]
    pub focus_metric: Metric,
    /// Read hypotheses from this JSON file instead of generating them
    #[arg(long)]
    pub hypotheses: Option<PathBuf>,
}

impl RunArgs {
    /// Date filter from the two optional bounds; an open bound is unbounded.
    ///
    /// # Errors
    ///
    /// Returns an error when the start date falls after the end date.
    pub fn date_range(&self) -> anyhow::Result<Option<DateRange>> {
        if self.start_date.is_none() && self.end_date.is_none() {
            return Ok(None);
        }
        let range = DateRange {
            start: self.start_date.unwrap_or(NaiveDate::MIN),
            end: self.end_date.unwrap_or(NaiveDate::MAX),
        };
        if range.start > range.end {
            anyhow::bail!(
                "--start-date {} is after --end-date {}",
                range.start,
                range.end
            );
        }
        Ok(Some(range))
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}"))
}

pub(crate) fn parse_metric(raw: &str) -> Result<Metric, String> {
    let wanted = raw.trim().to_lowercase();
    Metric::ALL
        .into_iter()
        .find(|m| m.as_str() == wanted)
        .ok_or_else(|| {
            let names: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
            format!("unknown metric '{raw}'; expected one of {}", names.join(", "))
        })
}

/// Build the pipeline for `args` and run it to completion.
///
/// # Errors
///
/// Returns an error only for invalid arguments or retry settings; stage
/// failures are carried in [`RunReport::failure`].
pub(crate) async fn run_analysis(
    config: AnalysisConfig,
    args: &RunArgs,
) -> anyhow::Result<RunReport> {
    let request = RunRequest {
        dataset_path: args.dataset.clone(),
        output_dir: args.output_dir.clone(),
        date_range: args.date_range()?,
    };

    let pipeline = match &args.hypotheses {
        Some(path) => {
            tracing::info!(path = %path.display(), "using hypotheses from file");
            Pipeline::new(config, Box::new(JsonFileGenerator::new(path)))?
        }
        None => Pipeline::rule_based(config, args.focus_metric)?,
    };
    Ok(pipeline.run(&request).await)
}

pub(crate) fn print_report(report: &RunReport, output_dir: &Path) {
    if let Some(summary) = &report.summary {
        let roas = summary
            .metrics
            .overall_roas
            .map_or_else(|| "n/a".to_string(), |r| format!("{r:.2}"));
        println!(
            "{} rows, {} campaigns, spend {:.2}, revenue {:.2}, ROAS {roas}",
            summary.total_rows, summary.campaigns_count, summary.total_spend, summary.total_revenue,
        );
    }

    if let Some(validated) = &report.validated {
        println!();
        for (rank, v) in validated.iter().enumerate() {
            println!(
                "{:>2}. [{} {:.2}] {}",
                rank + 1,
                v.validation_status,
                v.adjusted_confidence_score,
                v.hypothesis.text
            );
        }
    }

    println!();
    println!("summary:    {}", output_dir.join(SUMMARY_FILE).display());
    println!("hypotheses: {}", output_dir.join(VALIDATED_FILE).display());
}
