//! Weighted confidence model.

use adpulse_core::ConfidenceWeights;

/// The three independent signals combined into a final confidence.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidenceInputs {
    /// Confidence the hypothesis arrived with.
    pub insight_confidence: f64,
    /// Strength of the statistical evidence, see [`validation_strength`].
    pub validation_strength: f64,
    /// Cross-dimension consistency, see [`segmentation_evidence`].
    pub segmentation_evidence: f64,
}

/// Combine the signals with `weights`.
///
/// Each term is clamped to `[0, 1]` before weighting and the result is
/// clamped again, so the output is always a valid confidence. Non-finite
/// inputs count as zero.
#[must_use]
pub fn combine_confidence(inputs: ConfidenceInputs, weights: &ConfidenceWeights) -> f64 {
    let score = weights.insight_confidence * unit(inputs.insight_confidence)
        + weights.validation_strength * unit(inputs.validation_strength)
        + weights.segmentation_evidence * unit(inputs.segmentation_evidence);
    unit(score)
}

/// `0.5·significance + 0.25·magnitude + 0.25·agreement`.
#[must_use]
pub fn validation_strength(significance: f64, magnitude: f64, agreement: f64) -> f64 {
    unit(0.5 * unit(significance) + 0.25 * unit(magnitude) + 0.25 * unit(agreement))
}

/// 1.0 for two or more consistent breakdowns, 0.5 for one, else 0.
#[must_use]
pub fn segmentation_evidence(consistent_breakdowns: usize) -> f64 {
    match consistent_breakdowns {
        0 => 0.0,
        1 => 0.5,
        _ => 1.0,
    }
}

fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn default_weights_combine_linearly() {
        let score = combine_confidence(
            ConfidenceInputs {
                insight_confidence: 0.5,
                validation_strength: 1.0,
                segmentation_evidence: 0.5,
            },
            &ConfidenceWeights::default(),
        );
        assert!(approx(score, 0.4 * 0.5 + 0.4 * 1.0 + 0.2 * 0.5));
    }

    #[test]
    fn out_of_range_terms_are_clamped() {
        let score = combine_confidence(
            ConfidenceInputs {
                insight_confidence: 7.0,
                validation_strength: -3.0,
                segmentation_evidence: f64::NAN,
            },
            &ConfidenceWeights::default(),
        );
        assert!(approx(score, 0.4));
    }

    fn any_signal() -> impl Strategy<Value = f64> {
        prop_oneof![
            -2.0_f64..3.0,
            Just(f64::NAN),
            Just(f64::INFINITY),
            Just(f64::NEG_INFINITY),
        ]
    }

    proptest! {
        #[test]
        fn output_stays_in_unit_interval(
            insight in any_signal(),
            strength in any_signal(),
            segments in any_signal(),
            split in (0.0_f64..=1.0, 0.0_f64..=1.0),
        ) {
            // Any three non-negative weights summing to one.
            let (lo, hi) = if split.0 <= split.1 { split } else { (split.1, split.0) };
            let weights = ConfidenceWeights {
                insight_confidence: lo,
                validation_strength: hi - lo,
                segmentation_evidence: 1.0 - hi,
            };
            let score = combine_confidence(
                ConfidenceInputs {
                    insight_confidence: insight,
                    validation_strength: strength,
                    segmentation_evidence: segments,
                },
                &weights,
            );
            prop_assert!((0.0..=1.0).contains(&score), "score {} out of range", score);

            let significance = validation_strength(insight, strength, segments);
            prop_assert!((0.0..=1.0).contains(&significance));
        }
    }

    #[test]
    fn strength_weights() {
        assert!(approx(validation_strength(1.0, 1.0, 1.0), 1.0));
        assert!(approx(validation_strength(0.959, 0.43, 1.0), 0.5 * 0.959 + 0.25 * 0.43 + 0.25));
        assert!(approx(validation_strength(0.0, 0.0, 0.0), 0.0));
    }

    #[test]
    fn segmentation_evidence_steps() {
        assert_eq!(segmentation_evidence(0), 0.0);
        assert_eq!(segmentation_evidence(1), 0.5);
        assert_eq!(segmentation_evidence(2), 1.0);
        assert_eq!(segmentation_evidence(4), 1.0);
    }
}
