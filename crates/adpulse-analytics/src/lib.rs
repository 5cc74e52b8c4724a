//! Deterministic analytics over campaign-day data.
//!
//! Loads and cleans the CSV dataset, computes aggregate metrics, week- and
//! month-over-month trends and per-dimension segmentation, and folds them into
//! one immutable [`adpulse_core::DatasetSummary`].

pub mod ingest;
pub mod metrics;
pub mod segmentation;
pub mod summary;
pub mod trend;

pub use ingest::{coerce_number, load_dataset, read_dataset, Dataset, LoadOptions};
pub use metrics::{compute_metrics, relative_error};
pub use segmentation::{compute_segmentation, segment_by};
pub use summary::build_summary;
pub use trend::{
    classify_change, compute_trend, compute_trends, latest_date, percent_change, window_bounds,
    TrendSettings, WindowComparison, MONTH_DAYS, WEEK_DAYS,
};
