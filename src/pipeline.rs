//! The two calls a caller makes: preview a prompt, or run it.

use crate::assembler::{assemble, GeneratedArtifact, ScriptSettings};
use crate::composer::compose;
use crate::config::Config;
use crate::executor::{Executor, ExecutorSettings, RunError, ScriptRun};
use crate::intent::interpret;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Prompt → intent → fragments → script, and optionally → interpreter.
///
/// Holds settings only; every call builds its intent and artifact from
/// scratch. Runs are not serialized: two concurrent runs get two temp files
/// and two interpreter processes.
pub struct Pipeline {
    script_settings: ScriptSettings,
    executor: Executor,
}

impl Pipeline {
    pub fn new(script_settings: ScriptSettings, executor: Executor) -> Self {
        Self {
            script_settings,
            executor,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.script_settings(),
            Executor::new(config.executor_settings()),
        )
    }

    pub fn with_settings(script_settings: ScriptSettings, executor_settings: ExecutorSettings) -> Self {
        Self::new(script_settings, Executor::new(executor_settings))
    }

    /// Builds the plan and script for a prompt without launching anything.
    pub fn preview(&self, text: Option<&str>) -> GeneratedArtifact {
        let intent = interpret(text);
        let composition = compose(&intent);
        let artifact = assemble(&intent, composition, &self.script_settings);

        info!("Generated plan: {}", artifact.plan_summary.replace('\n', "; "));
        for warning in &artifact.warnings {
            warn!("{}", warning);
        }

        artifact
    }

    /// Builds the script for a prompt and launches it.
    ///
    /// The artifact is returned alongside the run so the caller can show the
    /// plan while the log streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the interpreter cannot be found or started, or
    /// the script cannot be staged. See [`Executor::run`].
    pub async fn run(
        &self,
        text: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<(GeneratedArtifact, ScriptRun), RunError> {
        let artifact = self.preview(text);
        let run = self.executor.run(&artifact.script_text, cancel).await?;
        Ok((artifact, run))
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}
