//! Hypothesis generation, validation and confidence scoring.
//!
//! Everything here is a pure function of the run's
//! [`adpulse_core::DatasetSummary`] and the cleaned rows behind it: the
//! weighted confidence model, Welch's t-test, the validator that turns a
//! candidate into a [`adpulse_core::ValidatedHypothesis`], and the final
//! ranking.

pub mod generator;
pub mod ranking;
pub mod scorer;
pub mod stats;
pub mod validator;

pub use generator::{initial_confidence, HypothesisGenerator, RuleBasedGenerator, MIN_HYPOTHESES};
pub use ranking::{compare_ranked, rank_hypotheses};
pub use scorer::{
    combine_confidence, segmentation_evidence, validation_strength, ConfidenceInputs,
};
pub use stats::{welch_t_test, WelchTest};
pub use validator::{
    decide_status, HypothesisValidator, TestOutcome, ValidatorSettings, INCONCLUSIVE_CAP,
    SIGNIFICANCE_LEVEL,
};
