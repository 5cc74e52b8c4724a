use std::cmp::Ordering;

use adpulse_core::ValidatedHypothesis;

/// Total order used for the final ranking: higher adjusted confidence first,
/// then hypotheses backed by a significance test, then id ascending.
#[must_use]
pub fn compare_ranked(a: &ValidatedHypothesis, b: &ValidatedHypothesis) -> Ordering {
    b.adjusted_confidence_score
        .total_cmp(&a.adjusted_confidence_score)
        .then_with(|| b.has_significance().cmp(&a.has_significance()))
        .then_with(|| a.hypothesis.id.cmp(&b.hypothesis.id))
}

/// Sort in place by [`compare_ranked`]. Idempotent.
pub fn rank_hypotheses(hypotheses: &mut [ValidatedHypothesis]) {
    hypotheses.sort_by(compare_ranked);
}

#[cfg(test)]
mod tests {
    use adpulse_core::{
        Category, Evidence, ExpectedDirection, Hypothesis, Metric, Significance, ValidationStatus,
    };

    use proptest::prelude::*;

    use super::*;

    fn validated(id: &str, score: f64, significant: bool) -> ValidatedHypothesis {
        ValidatedHypothesis {
            hypothesis: Hypothesis {
                id: id.to_string(),
                text: format!("hypothesis {id}"),
                category: Category::Budget,
                confidence: 0.5,
                evidence_used: Vec::new(),
                focus_metric: Metric::Roas,
                segment: None,
                expected_direction: ExpectedDirection::Decrease,
                supporting_observations: Vec::new(),
                validation_approach: None,
            },
            evidence: Evidence {
                metrics: Vec::new(),
                statistical_significance: significant.then(|| Significance {
                    test: "welch_t".to_string(),
                    p_value: 0.2,
                    confidence_interval: [-1.0, 1.0],
                    sample_size: 10,
                    reference_size: 10,
                }),
            },
            validation_status: ValidationStatus::Inconclusive,
            adjusted_confidence_score: score,
            validation_reasoning: String::new(),
        }
    }

    fn ids(list: &[ValidatedHypothesis]) -> Vec<&str> {
        list.iter().map(|v| v.hypothesis.id.as_str()).collect()
    }

    #[test]
    fn ranks_by_score_then_significance_then_id() {
        let mut list = vec![
            validated("c", 0.4, false),
            validated("b", 0.6, false),
            validated("a", 0.6, false),
            validated("z", 0.6, true),
            validated("d", 0.9, false),
        ];
        rank_hypotheses(&mut list);
        assert_eq!(ids(&list), ["d", "z", "a", "b", "c"]);
    }

    #[test]
    fn ranking_is_idempotent_and_order_independent() {
        let mut forward = vec![
            validated("a", 0.3, true),
            validated("b", 0.3, false),
            validated("c", 0.7, false),
        ];
        let mut reversed: Vec<_> = forward.iter().rev().cloned().collect();
        rank_hypotheses(&mut forward);
        rank_hypotheses(&mut reversed);
        assert_eq!(forward, reversed);

        let once = forward.clone();
        rank_hypotheses(&mut forward);
        assert_eq!(forward, once);
    }

    fn arbitrary_list() -> impl Strategy<Value = Vec<ValidatedHypothesis>> {
        prop::collection::vec(("[a-e]{1,2}", 0.0_f64..=1.0, any::<bool>()), 0..8).prop_map(
            |entries| {
                entries
                    .into_iter()
                    .map(|(id, score, significant)| validated(&id, score, significant))
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn ranking_is_a_total_order_for_any_input(list in arbitrary_list()) {
            let mut ranked = list.clone();
            rank_hypotheses(&mut ranked);
            for pair in ranked.windows(2) {
                prop_assert_ne!(compare_ranked(&pair[0], &pair[1]), Ordering::Greater);
            }

            let once = ranked.clone();
            rank_hypotheses(&mut ranked);
            prop_assert_eq!(&ranked, &once);

            let mut reversed: Vec<_> = list.into_iter().rev().collect();
            rank_hypotheses(&mut reversed);
            prop_assert_eq!(reversed, once);
        }
    }
}
