//! Candidate hypothesis generation.
//!
//! [`HypothesisGenerator`] is the seam where an external generator (e.g. a
//! language model client) plugs in. [`RuleBasedGenerator`] derives
//! candidates deterministically from trends and segment gaps in the summary.

use adpulse_core::{
    AnalysisConfig, Category, DatasetSummary, Dimension, ExpectedDirection, Hypothesis, Metric,
    PipelineError, SegmentMetrics, SegmentRef, TrendDirection,
};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

pub const MIN_HYPOTHESES: usize = 3;

/// Produces 3–5 candidate hypotheses from a dataset summary.
pub trait HypothesisGenerator: Send + Sync {
    /// # Errors
    ///
    /// Implementations report failures as [`PipelineError`]s so the stage
    /// runner can classify and retry them.
    fn generate(&self, summary: &DatasetSummary) -> Result<Vec<Hypothesis>, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct RuleBasedGenerator {
    pub focus_metric: Metric,
    pub max_hypotheses: usize,
    pub stable_threshold_pct: f64,
    pub low_ctr: f64,
    pub seed: u64,
}

impl RuleBasedGenerator {
    #[must_use]
    pub fn from_config(config: &AnalysisConfig, focus_metric: Metric) -> Self {
        Self {
            focus_metric,
            max_hypotheses: config.agents.max_hypotheses,
            stable_threshold_pct: config.trend_threshold_pct(),
            low_ctr: config.thresholds.low_ctr,
            seed: config.random_seed,
        }
    }

    fn trend_candidates(&self, summary: &DatasetSummary) -> Vec<Candidate> {
        let t = self.stable_threshold_pct;
        let focus = self.focus_metric.as_str().to_uppercase();
        let mut out = Vec::new();

        if let Some(trend) = summary.trend(Metric::Roas) {
            let (wow, mom) = (trend.week_over_week_change, trend.month_over_month_change);
            let below = |c: Option<f64>, bound: f64| c.is_some_and(|v| v < bound);
            let above = |c: Option<f64>, bound: f64| c.is_some_and(|v| v > bound);
            let direction = if below(wow, -t) || below(mom, -t) {
                Some((ExpectedDirection::Decrease, "declined"))
            } else if above(wow, t) || above(mom, t) {
                Some((ExpectedDirection::Increase, "improved"))
            } else {
                None
            };
            if let Some((dir, verb)) = direction {
                out.push(Candidate {
                    text: format!("ROAS {verb} due to trend (WoW: {}, MoM: {})", pct(wow), pct(mom)),
                    category: Category::Seasonality,
                    confidence: initial_confidence(abs_sum(wow, mom), 20.0),
                    evidence_used: trend_evidence("roas_trend"),
                    focus_metric: Metric::Roas,
                    segment: None,
                    expected_direction: dir,
                    supporting_observations: vec![
                        format!("Week-over-week ROAS change: {}", pct(wow)),
                        format!("Month-over-month ROAS change: {}", pct(mom)),
                        format!("Trend direction: {}", direction_label(trend.direction)),
                    ],
                    validation_approach: "Compare ROAS across time periods and validate trend direction",
                });
            }
        }

        if let Some(trend) = summary.trend(Metric::Ctr) {
            let (wow, mom) = (trend.week_over_week_change, trend.month_over_month_change);
            let significant = [wow, mom].into_iter().flatten().any(|c| c.abs() > t);
            if significant {
                let declining = [wow, mom].into_iter().flatten().any(|c| c < 0.0);
                let (dir, text) = if declining {
                    (
                        ExpectedDirection::Decrease,
                        format!(
                            "CTR decline (WoW: {}, MoM: {}) negatively impacted {focus}",
                            pct(wow),
                            pct(mom)
                        ),
                    )
                } else {
                    (
                        ExpectedDirection::Increase,
                        format!(
                            "CTR improvement (WoW: {}, MoM: {}) positively impacted {focus}",
                            pct(wow),
                            pct(mom)
                        ),
                    )
                };
                out.push(Candidate {
                    text,
                    category: Category::Creative,
                    confidence: initial_confidence(abs_sum(wow, mom), 20.0),
                    evidence_used: trend_evidence("ctr_trend"),
                    focus_metric: Metric::Ctr,
                    segment: None,
                    expected_direction: dir,
                    supporting_observations: vec![
                        format!("Week-over-week CTR change: {}", pct(wow)),
                        format!("Month-over-month CTR change: {}", pct(mom)),
                        format!("CTR trend direction: {}", direction_label(trend.direction)),
                    ],
                    validation_approach: "Correlate CTR changes with ROAS changes across segments",
                });
            }
        }
        out
    }

    fn campaign_candidate(&self, summary: &DatasetSummary) -> Option<Candidate> {
        let overall = summary.metrics.overall_roas?;
        let under = segments_below(summary.segments(Dimension::CampaignName), Metric::Roas, overall * 0.8);
        let (worst, roas) = worst_of(&under, Metric::Roas)?;
        let focus = self.focus_metric.as_str().to_uppercase();
        Some(Candidate {
            text: format!(
                "Campaign '{}' underperformance (ROAS: {roas:.2}) is dragging down overall {focus}",
                worst.segment
            ),
            category: Category::Budget,
            confidence: initial_confidence(gap_pct(overall, roas, 0.01), 50.0),
            evidence_used: vec!["campaign_segmentation".into(), "roas_by_campaign".into()],
            focus_metric: Metric::Roas,
            segment: Some(segment_ref(Dimension::CampaignName, worst)),
            expected_direction: ExpectedDirection::Decrease,
            supporting_observations: vec![
                format!("Campaign ROAS: {roas:.2} vs Overall: {overall:.2}"),
                format!("Number of underperforming campaigns: {}", under.len()),
                format!("Campaign spend: ${:.2}", worst.totals.spend),
            ],
            validation_approach:
                "Compare campaign performance metrics and validate impact on overall ROAS",
        })
    }

    fn creative_candidate(&self, summary: &DatasetSummary) -> Option<Candidate> {
        let overall = summary.metrics.overall_ctr?;
        let bound = (overall * 0.8).max(self.low_ctr);
        let low = segments_below(summary.segments(Dimension::CreativeType), Metric::Ctr, bound);
        let (worst, ctr) = worst_of(&low, Metric::Ctr)?;
        let gap = gap_pct(overall, ctr, 0.0001);
        Some(Candidate {
            text: format!(
                "'{}' creative type underperforming with CTR of {ctr:.4} vs overall {overall:.4}",
                worst.segment
            ),
            category: Category::Creative,
            confidence: initial_confidence(gap, 50.0),
            evidence_used: vec!["creative_type_segmentation".into(), "ctr_by_creative_type".into()],
            focus_metric: Metric::Ctr,
            segment: Some(segment_ref(Dimension::CreativeType, worst)),
            expected_direction: ExpectedDirection::Decrease,
            supporting_observations: vec![
                format!("Creative type CTR: {ctr:.4}"),
                format!("Overall CTR: {overall:.4}"),
                format!("CTR gap: {gap:.1}%"),
            ],
            validation_approach:
                "Compare creative type performance and test correlation with overall metrics",
        })
    }

    fn audience_candidate(summary: &DatasetSummary) -> Option<Candidate> {
        let overall = summary.metrics.overall_roas?;
        let low = segments_below(summary.segments(Dimension::AudienceType), Metric::Roas, overall * 0.7);
        let (worst, roas) = worst_of(&low, Metric::Roas)?;
        let gap = gap_pct(overall, roas, 0.01);
        Some(Candidate {
            text: format!(
                "Audience segment '{}' showing poor ROAS of {roas:.2} compared to overall {overall:.2}",
                worst.segment
            ),
            category: Category::Audience,
            confidence: initial_confidence(gap, 50.0),
            evidence_used: vec!["audience_segmentation".into(), "roas_by_audience".into()],
            focus_metric: Metric::Roas,
            segment: Some(segment_ref(Dimension::AudienceType, worst)),
            expected_direction: ExpectedDirection::Decrease,
            supporting_observations: vec![
                format!("Audience ROAS: {roas:.2}"),
                format!("Overall ROAS: {overall:.2}"),
                format!("Performance gap: {gap:.1}%"),
            ],
            validation_approach:
                "Compare audience segment performance and validate impact on overall ROAS",
        })
    }

    fn platform_candidate(summary: &DatasetSummary) -> Option<Candidate> {
        let mut platforms: Vec<(&SegmentMetrics, f64)> = summary
            .segments(Dimension::Platform)
            .iter()
            .filter_map(|s| s.roas.map(|r| (s, r)))
            .collect();
        if platforms.len() < 2 {
            return None;
        }
        platforms.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.segment.cmp(&b.0.segment)));
        let (worst, worst_roas) = *platforms.first()?;
        let (best, best_roas) = *platforms.last()?;
        if best_roas <= worst_roas * 1.2 {
            return None;
        }
        let gap = (best_roas - worst_roas) / worst_roas.max(0.01) * 100.0;
        Some(Candidate {
            text: format!(
                "Platform '{}' (ROAS: {worst_roas:.2}) underperforming compared to '{}' (ROAS: {best_roas:.2})",
                worst.segment, best.segment
            ),
            category: Category::Platform,
            confidence: initial_confidence(gap, 50.0),
            evidence_used: vec!["platform_segmentation".into(), "roas_by_platform".into()],
            focus_metric: Metric::Roas,
            segment: Some(segment_ref(Dimension::Platform, worst)),
            expected_direction: ExpectedDirection::Decrease,
            supporting_observations: vec![
                format!("{} ROAS: {worst_roas:.2}", worst.segment),
                format!("{} ROAS: {best_roas:.2}", best.segment),
                format!("Performance gap: {gap:.1}%"),
            ],
            validation_approach:
                "Compare platform performance metrics and validate statistical significance",
        })
    }

    fn fallback(&self, index: usize) -> Candidate {
        let focus = self.focus_metric.as_str().to_uppercase();
        let (text, category, observation, evidence, confidence, approach) = match index % 3 {
            0 => (
                format!("Seasonal factors may be influencing {focus} performance"),
                Category::Seasonality,
                "Limited historical data available for trend analysis",
                "time_period",
                0.4,
                "Collect more historical data to identify seasonal patterns",
            ),
            1 => (
                format!("Ad fatigue may be contributing to {focus} changes"),
                Category::Creative,
                "Creative performance may degrade over time",
                "creative_age",
                0.35,
                "Analyze creative performance over time and test refresh impact",
            ),
            _ => (
                format!("Market competition changes may be affecting {focus}"),
                Category::Budget,
                "External market factors can impact performance",
                "market_conditions",
                0.3,
                "Monitor competitive landscape and correlate with performance changes",
            ),
        };
        Candidate {
            text,
            category,
            confidence,
            evidence_used: vec![evidence.to_string()],
            focus_metric: self.focus_metric,
            segment: None,
            expected_direction: ExpectedDirection::Decrease,
            supporting_observations: vec![observation.to_string()],
            validation_approach: approach,
        }
    }
}

impl HypothesisGenerator for RuleBasedGenerator {
    fn generate(&self, summary: &DatasetSummary) -> Result<Vec<Hypothesis>, PipelineError> {
        let mut candidates = self.trend_candidates(summary);
        candidates.extend(self.campaign_candidate(summary));
        candidates.extend(self.creative_candidate(summary));
        candidates.extend(Self::audience_candidate(summary));
        candidates.extend(Self::platform_candidate(summary));

        let derived = candidates.len();
        candidates.truncate(self.max_hypotheses);
        while candidates.len() < MIN_HYPOTHESES {
            let index = candidates.len();
            candidates.push(self.fallback(index));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let hypotheses: Vec<Hypothesis> = candidates
            .into_iter()
            .map(|c| c.into_hypothesis(next_id(&mut rng)))
            .collect();

        tracing::info!(
            derived,
            generated = hypotheses.len(),
            focus_metric = %self.focus_metric,
            "hypotheses generated"
        );
        Ok(hypotheses)
    }
}

/// A hypothesis before its id is drawn.
struct Candidate {
    text: String,
    category: Category,
    confidence: f64,
    evidence_used: Vec<String>,
    focus_metric: Metric,
    segment: Option<SegmentRef>,
    expected_direction: ExpectedDirection,
    supporting_observations: Vec<String>,
    validation_approach: &'static str,
}

impl Candidate {
    fn into_hypothesis(self, id: String) -> Hypothesis {
        Hypothesis {
            id,
            text: self.text,
            category: self.category,
            confidence: self.confidence,
            evidence_used: self.evidence_used,
            focus_metric: self.focus_metric,
            segment: self.segment,
            expected_direction: self.expected_direction,
            supporting_observations: self.supporting_observations,
            validation_approach: Some(self.validation_approach.to_string()),
        }
    }
}

fn next_id(rng: &mut StdRng) -> String {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
}

/// Map a change magnitude onto `[0.3, 0.8]`.
#[must_use]
pub fn initial_confidence(magnitude: f64, max_magnitude: f64) -> f64 {
    let normalized = (magnitude / max_magnitude).min(1.0);
    (0.3 + normalized * 0.5).clamp(0.0, 1.0)
}

fn abs_sum(a: Option<f64>, b: Option<f64>) -> f64 {
    a.unwrap_or(0.0).abs() + b.unwrap_or(0.0).abs()
}

fn gap_pct(reference: f64, value: f64, floor: f64) -> f64 {
    (reference - value).abs() / reference.max(floor) * 100.0
}

fn pct(change: Option<f64>) -> String {
    change.map_or_else(|| "n/a".to_string(), |c| format!("{c:.1}%"))
}

fn direction_label(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Increasing => "increasing",
        TrendDirection::Decreasing => "decreasing",
        TrendDirection::Stable => "stable",
    }
}

fn trend_evidence(trend: &str) -> Vec<String> {
    vec![
        trend.to_string(),
        "week_over_week_change".to_string(),
        "month_over_month_change".to_string(),
    ]
}

fn segment_ref(dimension: Dimension, segment: &SegmentMetrics) -> SegmentRef {
    SegmentRef {
        dimension,
        value: segment.segment.clone(),
    }
}

fn segments_below(segments: &[SegmentMetrics], metric: Metric, bound: f64) -> Vec<&SegmentMetrics> {
    segments
        .iter()
        .filter(|s| s.metric(metric).is_some_and(|v| v < bound))
        .collect()
}

/// Lowest `metric` value; ties go to the earlier (higher-spend) segment.
fn worst_of<'a>(segments: &[&'a SegmentMetrics], metric: Metric) -> Option<(&'a SegmentMetrics, f64)> {
    segments
        .iter()
        .filter_map(|s| s.metric(metric).map(|v| (*s, v)))
        .reduce(|best, next| if next.1 < best.1 { next } else { best })
}
