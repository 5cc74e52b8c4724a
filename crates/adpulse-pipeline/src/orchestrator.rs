//! Stage dispatch for one analysis run.
//!
//! Each stage is a plain function returning its output together with the
//! token of the stage to run next. The orchestrator loop runs every attempt
//! on the blocking pool under [`run_with_retry`], so the wall-clock budget
//! also cuts off an attempt that is still computing; the abandoned worker
//! finishes in the background and its output is dropped. Stage outputs are
//! checked against their [`Shape`] and each stage envelope is appended to
//! `envelopes.jsonl`. Outputs already written when a later stage fails stay
//! on disk.

use std::path::PathBuf;
use std::sync::Arc;

use adpulse_analytics::{build_summary, load_dataset, Dataset, LoadOptions, TrendSettings};
use adpulse_core::{
    AnalysisConfig, DatasetSummary, DateRange, Envelope, ErrorInfo, Hypothesis, Metric,
    PipelineError, StageStatus, ValidatedHypothesis,
};
use adpulse_insights::{
    HypothesisGenerator, HypothesisValidator, RuleBasedGenerator, ValidatorSettings,
};

use crate::output::{OutputWriter, SUMMARY_FILE, VALIDATED_FILE};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::schema::{
    check_message, envelope_shape, hypothesis_list_shape, summary_shape, validated_list_shape,
    Shape,
};

pub const LOAD_AGENT: &str = "dataset_loader";
pub const SUMMARY_AGENT: &str = "data_agent";
pub const GENERATE_AGENT: &str = "insight_agent";
pub const VALIDATE_AGENT: &str = "evaluator_agent";

/// Token returned by each stage naming the one to run next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStage {
    LoadDataset,
    Summarize,
    Generate,
    Validate,
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub dataset_path: PathBuf,
    pub output_dir: PathBuf,
    /// Rows outside this range are dropped at load time.
    pub date_range: Option<DateRange>,
}

/// Everything a run produced, including what it produced before failing.
#[derive(Debug, Default)]
pub struct RunReport {
    pub envelopes: Vec<Envelope<()>>,
    pub summary: Option<Arc<DatasetSummary>>,
    pub validated: Option<Vec<ValidatedHypothesis>>,
    /// The first fatal error, if any.
    pub failure: Option<ErrorInfo>,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Stage outputs carried between loop iterations.
#[derive(Default)]
struct RunState {
    dataset: Option<Arc<Dataset>>,
    summary: Option<Arc<DatasetSummary>>,
    hypotheses: Option<Arc<Vec<Hypothesis>>>,
}

pub struct Pipeline {
    config: AnalysisConfig,
    generator: Arc<dyn HypothesisGenerator>,
    policy: RetryPolicy,
}

impl Pipeline {
    /// # Errors
    ///
    /// Returns a configuration error when the retry settings cannot be
    /// turned into a [`RetryPolicy`].
    pub fn new(
        config: AnalysisConfig,
        generator: Box<dyn HypothesisGenerator>,
    ) -> Result<Self, PipelineError> {
        let policy = RetryPolicy::from_settings(&config.retry)?;
        Ok(Self {
            config,
            generator: Arc::from(generator),
            policy,
        })
    }

    /// Pipeline using the built-in [`RuleBasedGenerator`].
    ///
    /// # Errors
    ///
    /// Same as [`Pipeline::new`].
    pub fn rule_based(
        config: AnalysisConfig,
        focus_metric: Metric,
    ) -> Result<Self, PipelineError> {
        let generator = RuleBasedGenerator::from_config(&config, focus_metric);
        Self::new(config, Box::new(generator))
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run every stage in order. Never returns early: a fatal error ends the
    /// loop and is recorded in [`RunReport::failure`].
    pub async fn run(&self, request: &RunRequest) -> RunReport {
        let mut report = RunReport::default();
        tracing::info!(
            dataset = %request.dataset_path.display(),
            output_dir = %request.output_dir.display(),
            "pipeline run started"
        );

        let result = match OutputWriter::create(&request.output_dir).await {
            Ok(writer) => self.drive(request, &writer, &mut report).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => tracing::info!(stages = report.envelopes.len(), "pipeline run completed"),
            Err(error) => {
                tracing::error!(
                    error_type = error.error_type(),
                    error = %error,
                    "pipeline run failed"
                );
                report.failure = Some(ErrorInfo::from(&error));
            }
        }
        report
    }

    async fn drive(
        &self,
        request: &RunRequest,
        writer: &OutputWriter,
        report: &mut RunReport,
    ) -> Result<(), PipelineError> {
        let mut state = RunState::default();
        let mut next = NextStage::LoadDataset;

        while next != NextStage::Complete {
            next = match next {
                NextStage::LoadDataset => {
                    let options =
                        LoadOptions::from_config(&self.config).with_date_range(request.date_range);
                    let request = request.clone();
                    let (mut envelope, result) = self
                        .execute(LOAD_AGENT, move || load_stage(&request, &options))
                        .await;
                    if let Ok((dataset, _)) = &result {
                        if dataset.quality.invalid_rows > 0 {
                            envelope.status = StageStatus::Partial;
                        }
                    }
                    record(writer, report, envelope).await?;
                    let (dataset, next) = result?;
                    state.dataset = Some(Arc::new(dataset));
                    next
                }
                NextStage::Summarize => {
                    let dataset = Arc::clone(require(state.dataset.as_ref(), "dataset")?);
                    let settings = TrendSettings::from_config(&self.config);
                    let (envelope, result) = self
                        .execute(SUMMARY_AGENT, move || summarize_stage(&dataset, &settings))
                        .await;
                    record(writer, report, envelope).await?;
                    let (summary, next) = result?;
                    writer.write_json(SUMMARY_FILE, &summary).await?;
                    let summary = Arc::new(summary);
                    report.summary = Some(Arc::clone(&summary));
                    state.summary = Some(summary);
                    next
                }
                NextStage::Generate => {
                    let summary = Arc::clone(require(state.summary.as_ref(), "summary")?);
                    let generator = Arc::clone(&self.generator);
                    let (envelope, result) = self
                        .execute(GENERATE_AGENT, move || generate_stage(&*generator, &summary))
                        .await;
                    record(writer, report, envelope).await?;
                    let (hypotheses, next) = result?;
                    state.hypotheses = Some(Arc::new(hypotheses));
                    next
                }
                NextStage::Validate => {
                    let dataset = Arc::clone(require(state.dataset.as_ref(), "dataset")?);
                    let summary = Arc::clone(require(state.summary.as_ref(), "summary")?);
                    let hypotheses =
                        Arc::clone(require(state.hypotheses.as_ref(), "hypotheses")?);
                    let settings = ValidatorSettings::from_config(&self.config);
                    let (envelope, result) = self
                        .execute(VALIDATE_AGENT, move || {
                            validate_stage(&summary, &dataset, &hypotheses, &settings)
                        })
                        .await;
                    record(writer, report, envelope).await?;
                    let (validated, next) = result?;
                    writer.write_json(VALIDATED_FILE, &validated).await?;
                    report.validated = Some(validated);
                    next
                }
                NextStage::Complete => NextStage::Complete,
            };
        }
        Ok(())
    }

    /// Run `stage` under the retry policy, one blocking-pool task per attempt.
    async fn execute<T, F>(
        &self,
        agent: &str,
        stage: F,
    ) -> (Envelope<()>, Result<(T, NextStage), PipelineError>)
    where
        T: Send + 'static,
        F: Fn() -> Result<(T, NextStage), PipelineError> + Clone + Send + 'static,
    {
        run_with_retry(agent, &self.policy, || {
            let attempt = stage.clone();
            async move {
                match tokio::task::spawn_blocking(attempt).await {
                    Ok(result) => result,
                    Err(e) => Err(PipelineError::Unexpected(format!(
                        "stage {agent} worker did not finish: {e}"
                    ))),
                }
            }
        })
        .await
        .split(agent)
    }
}

async fn record(
    writer: &OutputWriter,
    report: &mut RunReport,
    envelope: Envelope<()>,
) -> Result<(), PipelineError> {
    check_message(&envelope, &envelope_shape(Shape::Null), "envelope")?;
    writer.append_envelope(&envelope).await?;
    report.envelopes.push(envelope);
    Ok(())
}

fn require<'a, T: ?Sized>(value: Option<&'a T>, name: &str) -> Result<&'a T, PipelineError> {
    value.ok_or_else(|| {
        PipelineError::Unexpected(format!("stage dispatched before its {name} was produced"))
    })
}

fn load_stage(
    request: &RunRequest,
    options: &LoadOptions,
) -> Result<(Dataset, NextStage), PipelineError> {
    let dataset = load_dataset(&request.dataset_path, options)?;
    Ok((dataset, NextStage::Summarize))
}

fn summarize_stage(
    dataset: &Dataset,
    settings: &TrendSettings,
) -> Result<(DatasetSummary, NextStage), PipelineError> {
    let summary = build_summary(dataset, settings);
    check_message(&summary, &summary_shape(), "data_agent_output")?;
    Ok((summary, NextStage::Generate))
}

fn generate_stage(
    generator: &dyn HypothesisGenerator,
    summary: &DatasetSummary,
) -> Result<(Vec<Hypothesis>, NextStage), PipelineError> {
    check_message(summary, &summary_shape(), "insight_agent_input")?;
    let hypotheses = generator.generate(summary)?;
    check_message(&hypotheses, &hypothesis_list_shape(), "insight_agent_output")?;
    Ok((hypotheses, NextStage::Validate))
}

fn validate_stage(
    summary: &DatasetSummary,
    dataset: &Dataset,
    hypotheses: &[Hypothesis],
    settings: &ValidatorSettings,
) -> Result<(Vec<ValidatedHypothesis>, NextStage), PipelineError> {
    check_message(&hypotheses, &hypothesis_list_shape(), "evaluator_agent_input")?;
    let validator = HypothesisValidator::new(summary, &dataset.rows, settings.clone());
    let validated = validator.validate_all(hypotheses);
    check_message(&validated, &validated_list_shape(), "evaluator_agent_output")?;
    Ok((validated, NextStage::Complete))
}
