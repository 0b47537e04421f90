use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::PipelineSettings;
use crate::sanitize;

use super::error::StageError;
use super::progress::{ProgressEvent, ProgressReporter};
use super::stage::{PipelineDescriptor, StageKind, StageSpec};
use super::tool::{ReconstructionTool, StageInvocation};
use super::workspace::{self, Workspace};

/// Files the pipeline left behind for decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputLocations {
    pub point_file: Option<PathBuf>,
    pub text_models: Vec<PathBuf>,
    pub model_dir: Option<PathBuf>,
}

impl OutputLocations {
    pub fn collect(workspace: &Workspace) -> Self {
        let candidates = workspace.point_cloud_candidates();
        let point_file = candidates
            .iter()
            .find(|p| **p == workspace.points_path())
            .cloned();
        let text_models = candidates
            .into_iter()
            .filter(|p| Some(p) != point_file.as_ref())
            .collect();
        Self {
            point_file,
            text_models,
            model_dir: workspace.find_model_dir(),
        }
    }

    /// Decode candidates, point file first.
    pub fn candidates(&self) -> Vec<PathBuf> {
        self.point_file
            .iter()
            .chain(self.text_models.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug)]
pub struct StageFailure {
    pub stage: StageKind,
    pub error: StageError,
}

#[derive(Debug)]
pub struct StageResult {
    pub completed_stages: Vec<StageKind>,
    pub outputs: OutputLocations,
    pub failure: Option<StageFailure>,
}

impl StageResult {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs the stage list against one working directory.
pub struct ReconstructionDriver {
    tool: Arc<dyn ReconstructionTool>,
    descriptor: PipelineDescriptor,
    stage_timeout: Duration,
}

impl ReconstructionDriver {
    pub fn new(
        tool: Arc<dyn ReconstructionTool>,
        descriptor: PipelineDescriptor,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            tool,
            descriptor,
            stage_timeout,
        }
    }

    pub fn from_settings(tool: Arc<dyn ReconstructionTool>, settings: &PipelineSettings) -> Self {
        Self::new(
            tool,
            PipelineDescriptor::standard(),
            Duration::from_secs(settings.stage_timeout_secs),
        )
    }

    pub fn descriptor(&self) -> &PipelineDescriptor {
        &self.descriptor
    }

    /// Runs every stage in order, stopping at the first failed required stage.
    ///
    /// Never retries. Optional stages (the exports) may fail without failing
    /// the run; cancellation and reporter halts always stop it.
    pub async fn run_stages(
        &self,
        workspace: &Workspace,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> StageResult {
        let mut completed_stages = Vec::new();
        let mut failure = None;

        for spec in &self.descriptor.stages {
            let stage = spec.kind;

            if cancel.is_cancelled() {
                failure = Some(StageFailure {
                    stage,
                    error: StageError::Cancelled { stage },
                });
                break;
            }

            if let Err(halt) = progress.report(ProgressEvent::StageStarted { stage }) {
                failure = Some(StageFailure {
                    stage,
                    error: StageError::Halted {
                        stage,
                        reason: halt.reason,
                    },
                });
                break;
            }

            let span = info_span!("stage", name = stage.name());
            match self.run_one(spec, workspace, cancel).instrument(span).await {
                Ok(()) => {
                    completed_stages.push(stage);
                    if let Err(halt) = progress.report(ProgressEvent::StageCompleted { stage }) {
                        failure = Some(StageFailure {
                            stage,
                            error: StageError::Halted {
                                stage,
                                reason: halt.reason,
                            },
                        });
                        break;
                    }
                }
                Err(error) if spec.required || error.is_abort() => {
                    warn!(stage = %stage, "Stage failed: {}", error);
                    // The run is over either way; a halt here changes nothing.
                    let _ = progress.report(ProgressEvent::StageFailed {
                        stage,
                        error: error.to_string(),
                    });
                    failure = Some(StageFailure { stage, error });
                    break;
                }
                Err(error) => {
                    warn!(stage = %stage, "Optional stage failed, continuing: {}", error);
                }
            }
        }

        StageResult {
            completed_stages,
            outputs: OutputLocations::collect(workspace),
            failure,
        }
    }

    async fn run_one(
        &self,
        spec: &StageSpec,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<(), StageError> {
        let stage = spec.kind;

        for input in &spec.inputs {
            let present = workspace
                .resolve(input)
                .map(|p| workspace::is_present(&p))
                .unwrap_or(false);
            if !present {
                return Err(StageError::MissingInput {
                    stage,
                    path: workspace.describe(input),
                });
            }
        }

        for output in &spec.outputs {
            if let Some(dir) = workspace.resolve(output) {
                std::fs::create_dir_all(&dir).map_err(|e| StageError::Workspace {
                    path: dir.clone(),
                    source: e,
                })?;
            }
        }

        let invocation = StageInvocation {
            stage,
            work_dir: workspace.root().to_path_buf(),
            model_dir: workspace.model_dir_relative(),
        };

        let started = Instant::now();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StageError::Cancelled { stage }),
            result = tokio::time::timeout(self.stage_timeout, self.tool.run_stage(&invocation, cancel)) => {
                match result {
                    Ok(output) => output?,
                    Err(_) => {
                        return Err(StageError::Timeout {
                            stage,
                            after: self.stage_timeout,
                        })
                    }
                }
            }
        };
        let elapsed_ms = saturating_millis(started.elapsed());

        if !output.success {
            let raw = if output.stderr.trim().is_empty() {
                &output.stdout
            } else {
                &output.stderr
            };
            warn!(
                stage = %stage,
                exit_code = ?output.exit_code,
                elapsed_ms,
                "Reconstruction tool failed:\n{}",
                raw
            );
            return Err(StageError::Failed {
                stage,
                exit_code: output.exit_code,
                summary: sanitize::summarize_tool_output(raw, Some(workspace.root())),
            });
        }

        info!(stage = %stage, elapsed_ms, "Stage completed");
        Ok(())
    }
}

fn saturating_millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
