//! Hypothesis validation: evidence, significance, status and adjusted
//! confidence.
//!
//! A [`HypothesisValidator`] borrows the run's [`DatasetSummary`] and the
//! cleaned rows it was built from. Validation is a pure function of those two
//! inputs, the hypothesis and [`ValidatorSettings`].

use std::collections::BTreeMap;

use adpulse_analytics::{latest_date, percent_change, window_bounds, WindowComparison, WEEK_DAYS};
use adpulse_core::{
    AnalysisConfig, ConfidenceWeights, DatasetRow, DatasetSummary, Dimension, Evidence,
    EvidenceMetric, ExpectedDirection, Hypothesis, Metric, SegmentRef, Significance, Totals,
    ValidatedHypothesis, ValidationStatus,
};
use chrono::NaiveDate;

use crate::ranking::rank_hypotheses;
use crate::scorer::{
    combine_confidence, segmentation_evidence, validation_strength, ConfidenceInputs,
};
use crate::stats::welch_t_test;

pub const SIGNIFICANCE_LEVEL: f64 = 0.05;
/// Fewer computable evidence metrics than this forces `inconclusive`.
pub const MIN_EVIDENCE_METRICS: usize = 2;
/// Ceiling for the adjusted confidence of an under-evidenced hypothesis.
pub const INCONCLUSIVE_CAP: f64 = 0.49;
pub const TEST_NAME: &str = "welch_t";

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorSettings {
    pub min_data_points: usize,
    /// Fractional change treated as material, e.g. `0.15`.
    pub roas_change_significant: f64,
    pub high_confidence: f64,
    pub weights: ConfidenceWeights,
}

impl ValidatorSettings {
    #[must_use]
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            min_data_points: config.agents.min_data_points,
            roas_change_significant: config.thresholds.roas_change_significant,
            high_confidence: config.thresholds.high_confidence,
            weights: config.confidence_weights.clone(),
        }
    }
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

/// Outcome of the significance test, reduced to what the status rule needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestOutcome {
    pub p_value: f64,
    /// Whether the observed difference points the way the hypothesis claims.
    pub agrees: bool,
}

/// Map the evidence tally onto a status.
///
/// - too few evidence metrics ⇒ inconclusive
/// - significant and agreeing ⇒ confirmed
/// - significant and opposing, or every directional signal opposing ⇒ rejected
/// - anything else ⇒ inconclusive
#[must_use]
pub fn decide_status(
    evidence_count: usize,
    test: Option<TestOutcome>,
    supporting: usize,
    directional: usize,
) -> ValidationStatus {
    if evidence_count < MIN_EVIDENCE_METRICS {
        return ValidationStatus::Inconclusive;
    }
    let significant = test.filter(|t| t.p_value < SIGNIFICANCE_LEVEL);
    match significant {
        Some(t) if t.agrees => ValidationStatus::Confirmed,
        Some(_) => ValidationStatus::Rejected,
        None if directional > 0 && supporting == 0 => ValidationStatus::Rejected,
        None => ValidationStatus::Inconclusive,
    }
}

/// One computed evidence metric.
struct Signal {
    metric: EvidenceMetric,
    /// Signed quantity compared against the claimed direction.
    effect: f64,
    directional: bool,
}

impl Signal {
    fn supports(&self, claim: ExpectedDirection) -> bool {
        self.directional && agrees(self.effect, claim)
    }
}

fn agrees(effect: f64, claim: ExpectedDirection) -> bool {
    effect * claim.sign() > 0.0
}

pub struct HypothesisValidator<'a> {
    summary: &'a DatasetSummary,
    rows: &'a [DatasetRow],
    settings: ValidatorSettings,
    anchor: Option<NaiveDate>,
}

impl<'a> HypothesisValidator<'a> {
    #[must_use]
    pub fn new(
        summary: &'a DatasetSummary,
        rows: &'a [DatasetRow],
        settings: ValidatorSettings,
    ) -> Self {
        Self {
            summary,
            rows,
            settings,
            anchor: latest_date(rows),
        }
    }

    /// Validate every hypothesis and return them ranked.
    #[must_use]
    pub fn validate_all(&self, hypotheses: &[Hypothesis]) -> Vec<ValidatedHypothesis> {
        let mut validated: Vec<ValidatedHypothesis> =
            hypotheses.iter().map(|h| self.validate(h)).collect();
        rank_hypotheses(&mut validated);

        let confirmed = validated
            .iter()
            .filter(|v| v.validation_status == ValidationStatus::Confirmed)
            .count();
        tracing::info!(
            hypotheses = validated.len(),
            confirmed,
            "hypotheses validated"
        );
        validated
    }

    #[must_use]
    pub fn validate(&self, hypothesis: &Hypothesis) -> ValidatedHypothesis {
        let claim = hypothesis.expected_direction;
        let signals = self.signals(hypothesis);
        let significance = self.significance(hypothesis);

        let evidence_count = signals.len();
        let directional = signals.iter().filter(|s| s.directional).count();
        let supporting: Vec<&Signal> = signals.iter().filter(|s| s.supports(claim)).collect();

        let test = significance.as_ref().map(|(sig, diff)| TestOutcome {
            p_value: sig.p_value,
            agrees: agrees(*diff, claim),
        });
        let status = decide_status(evidence_count, test, supporting.len(), directional);

        let significance_term = test.filter(|t| t.agrees).map_or(0.0, |t| 1.0 - t.p_value);
        let max_change = supporting
            .iter()
            .map(|s| s.effect.abs())
            .fold(0.0_f64, f64::max);
        let magnitude_scale = 2.0 * self.settings.roas_change_significant * 100.0;
        let magnitude = if magnitude_scale > 0.0 {
            (max_change / magnitude_scale).min(1.0)
        } else {
            0.0
        };
        #[allow(clippy::cast_precision_loss)]
        let agreement = if directional == 0 {
            0.0
        } else {
            supporting.len() as f64 / directional as f64
        };
        let strength = validation_strength(significance_term, magnitude, agreement);

        let breakdowns = self.consistent_breakdowns(hypothesis);
        let mut score = combine_confidence(
            ConfidenceInputs {
                insight_confidence: hypothesis.confidence,
                validation_strength: strength,
                segmentation_evidence: segmentation_evidence(breakdowns),
            },
            &self.settings.weights,
        );
        if evidence_count < MIN_EVIDENCE_METRICS {
            score = score.min(INCONCLUSIVE_CAP);
        }

        let reasoning = self.reasoning(
            hypothesis,
            status,
            evidence_count,
            (supporting.len(), directional),
            significance.as_ref().map(|(s, _)| s),
            breakdowns,
            score,
        );

        tracing::debug!(
            hypothesis_id = %hypothesis.id,
            status = %status,
            evidence_count,
            supporting = supporting.len(),
            directional,
            strength,
            score,
            "hypothesis validated"
        );

        ValidatedHypothesis {
            hypothesis: hypothesis.clone(),
            evidence: Evidence {
                metrics: signals.into_iter().map(|s| s.metric).collect(),
                statistical_significance: significance.map(|(s, _)| s),
            },
            validation_status: status,
            adjusted_confidence_score: score,
            validation_reasoning: reasoning,
        }
    }

    fn signals(&self, hypothesis: &Hypothesis) -> Vec<Signal> {
        let metric = hypothesis.focus_metric;
        let name = metric.as_str();
        let overall = self.summary.metrics.get(metric);
        let trend = self.summary.trend(metric);
        let overall_wow = trend.and_then(|t| t.week_over_week_change);
        let overall_mom = trend.and_then(|t| t.month_over_month_change);
        let mut signals = Vec::new();

        if let Some(segment) = &hypothesis.segment {
            let label = format!("{}={}", segment.dimension, segment.value);

            let segment_value = self
                .summary
                .segment(segment.dimension, &segment.value)
                .and_then(|s| s.metric(metric));
            if let (Some(seg), Some(all)) = (segment_value, overall) {
                if let Some(gap) = percent_change(seg, all) {
                    signals.push(Signal {
                        metric: EvidenceMetric {
                            metric_name: format!("segment_{name}_vs_overall"),
                            value: gap,
                            comparison_text: format!(
                                "{label} {name} {seg:.4} vs overall {all:.4} ({gap:+.1}%)"
                            ),
                        },
                        effect: gap,
                        directional: true,
                    });
                }
            }

            if let (Some(seg_wow), Some(all_wow)) = (self.segment_wow(segment, metric), overall_wow) {
                signals.push(Signal {
                    metric: EvidenceMetric {
                        metric_name: format!("segment_{name}_wow_change"),
                        value: seg_wow,
                        comparison_text: format!("{seg_wow:+.1}% vs overall {all_wow:+.1}%"),
                    },
                    effect: seg_wow - all_wow,
                    directional: true,
                });
            }
        }

        // For segment claims the overall trend is context, not a vote.
        let overall_is_directional = hypothesis.segment.is_none();
        if let Some(wow) = overall_wow {
            signals.push(Signal {
                metric: EvidenceMetric {
                    metric_name: format!("{name}_wow_change"),
                    value: wow,
                    comparison_text: format!("last 7 days vs prior 7 days: {wow:+.1}%"),
                },
                effect: wow,
                directional: overall_is_directional,
            });
        }
        if let Some(mom) = overall_mom {
            signals.push(Signal {
                metric: EvidenceMetric {
                    metric_name: format!("{name}_mom_change"),
                    value: mom,
                    comparison_text: format!("last 28 days vs prior 28 days: {mom:+.1}%"),
                },
                effect: mom,
                directional: overall_is_directional,
            });
        }

        signals
    }

    fn segment_wow(&self, segment: &SegmentRef, metric: Metric) -> Option<f64> {
        let anchor = self.anchor?;
        WindowComparison::collect_where(self.rows, anchor, WEEK_DAYS, |r| in_segment(r, segment))
            .change(metric, self.settings.min_data_points)
    }

    /// Welch's test on per-row values of the focus metric, with the signed
    /// mean difference (sample minus reference).
    fn significance(&self, hypothesis: &Hypothesis) -> Option<(Significance, f64)> {
        let metric = hypothesis.focus_metric;
        let (sample, reference): (Vec<f64>, Vec<f64>) = match &hypothesis.segment {
            Some(segment) => {
                let (inside, outside): (Vec<&DatasetRow>, Vec<&DatasetRow>) =
                    self.rows.iter().partition(|r| in_segment(r, segment));
                (row_values(&inside, metric), row_values(&outside, metric))
            }
            None => {
                let anchor = self.anchor?;
                let (recent, prior) = window_bounds(anchor, WEEK_DAYS);
                let pick = |range: adpulse_core::DateRange| {
                    self.rows
                        .iter()
                        .filter(|r| range.contains(r.date))
                        .filter_map(|r| metric.for_row(r))
                        .collect::<Vec<f64>>()
                };
                (pick(recent), pick(prior))
            }
        };

        let needed = self.settings.min_data_points.max(2);
        if sample.len() < needed || reference.len() < needed {
            tracing::debug!(
                hypothesis_id = %hypothesis.id,
                sample = sample.len(),
                reference = reference.len(),
                needed,
                "too few rows for a significance test"
            );
            return None;
        }

        let test = welch_t_test(&sample, &reference)?;
        Some((
            Significance {
                test: TEST_NAME.to_string(),
                p_value: test.p_value,
                confidence_interval: test.confidence_interval,
                sample_size: sample.len(),
                reference_size: reference.len(),
            },
            test.mean_difference,
        ))
    }

    /// Number of dimension breakdowns in which the segment moves the way the
    /// hypothesis claims.
    fn consistent_breakdowns(&self, hypothesis: &Hypothesis) -> usize {
        let Some(segment) = &hypothesis.segment else {
            return 0;
        };
        let metric = hypothesis.focus_metric;
        let claim = hypothesis.expected_direction;
        let mut count = 0;

        let own = self
            .summary
            .segment(segment.dimension, &segment.value)
            .and_then(|s| s.metric(metric))
            .zip(self.summary.metrics.get(metric));
        if let Some((seg, all)) = own {
            if agrees(seg - all, claim) {
                count += 1;
            }
        }

        for dimension in Dimension::ALL {
            if dimension == segment.dimension {
                continue;
            }
            // group -> (inside segment, outside segment)
            let mut strata: BTreeMap<&str, (Totals, Totals)> = BTreeMap::new();
            for row in self.rows {
                let slot = strata.entry(dimension.value_of(row)).or_default();
                if in_segment(row, segment) {
                    slot.0.add(row);
                } else {
                    slot.1.add(row);
                }
            }

            let mut comparisons = 0_usize;
            let mut matches = 0_usize;
            for (inside, outside) in strata.values() {
                if inside.rows == 0 || outside.rows == 0 {
                    continue;
                }
                if let (Some(a), Some(b)) = (metric.from_totals(inside), metric.from_totals(outside)) {
                    comparisons += 1;
                    if agrees(a - b, claim) {
                        matches += 1;
                    }
                }
            }
            if comparisons > 0 && matches * 2 > comparisons {
                count += 1;
            }
        }
        count
    }

    #[allow(clippy::too_many_arguments)]
    fn reasoning(
        &self,
        hypothesis: &Hypothesis,
        status: ValidationStatus,
        evidence_count: usize,
        (supporting, directional): (usize, usize),
        significance: Option<&Significance>,
        breakdowns: usize,
        score: f64,
    ) -> String {
        let direction = match hypothesis.expected_direction {
            ExpectedDirection::Increase => "an increase",
            ExpectedDirection::Decrease => "a decrease",
        };
        let mut parts = vec![format!(
            "{supporting} of {directional} directional signals support {direction} in {}",
            hypothesis.focus_metric
        )];
        match significance {
            Some(s) => parts.push(format!(
                "Welch t-test p = {:.3} (n = {} vs {})",
                s.p_value, s.sample_size, s.reference_size
            )),
            None => parts.push("no significance test (too few rows)".to_string()),
        }
        if hypothesis.segment.is_some() {
            parts.push(format!("{breakdowns} consistent dimension breakdowns"));
        }

        let verdict = match status {
            ValidationStatus::Confirmed => "confirmed: significant effect in the claimed direction",
            ValidationStatus::Rejected => "rejected: evidence contradicts the claim",
            ValidationStatus::Inconclusive if evidence_count < MIN_EVIDENCE_METRICS => {
                "inconclusive: fewer than two evidence metrics could be computed"
            }
            ValidationStatus::Inconclusive => "inconclusive: effect not significant",
        };
        parts.push(verdict.to_string());
        if score >= self.settings.high_confidence {
            parts.push("high confidence".to_string());
        }
        parts.join("; ")
    }
}

fn in_segment(row: &DatasetRow, segment: &SegmentRef) -> bool {
    segment.dimension.value_of(row) == segment.value
}

fn row_values(rows: &[&DatasetRow], metric: Metric) -> Vec<f64> {
    rows.iter().filter_map(|r| metric.for_row(r)).collect()
}

#[cfg(test)]
#[path = "validator_test.rs"]
mod tests;
