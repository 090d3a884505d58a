//! Frontend build: clean the output roots, then run every copy job concurrently

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::clean;
use crate::config::BuildConfig;
use crate::fanout;
use crate::jobs::{self, JobKind};

/// What a failed build reports to its caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Return the first error
    #[default]
    Propagate,
    /// Log the error and report success
    Swallow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Cleaning,
    Copying,
    Done,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid build configuration: {0:#}")]
    Config(#[source] anyhow::Error),
    #[error("cleaning failed: {0}")]
    Clean(#[from] clean::Error),
    #[error("{job} job failed: {source}")]
    Copy {
        job: JobKind,
        #[source]
        source: fanout::Error,
    },
    #[error("localize failed: {0}")]
    Localize(#[source] fanout::Error),
    #[error("{job} job did not finish: {source}")]
    Join {
        job: JobKind,
        #[source]
        source: tokio::task::JoinError,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub error_policy: ErrorPolicy,
    /// Also copy the localized bundles into the destination once the copy jobs are done
    pub localize: bool,
    pub fan_out: fanout::Settings,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub clean_summary: clean::Summary,
    pub copy_summary: fanout::Summary,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}{}jobs completed: {}\njobs failed: {}",
            &self.clean_summary, &self.copy_summary, self.jobs_completed, self.jobs_failed
        )
    }
}

/// Runs builds for one configuration
#[derive(Debug)]
pub struct Orchestrator {
    config: BuildConfig,
    settings: Settings,
    state: BuildState,
}

impl Orchestrator {
    #[must_use]
    pub fn new(config: BuildConfig, settings: Settings) -> Self {
        Self {
            config,
            settings,
            state: BuildState::Idle,
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Cleans `destination` and `temp`, then copies every job's inputs into per-locale
    /// directories below `temp`.
    ///
    /// The configuration is validated first, an invalid one fails with [`Error::Config`] before
    /// anything is removed. All jobs run to completion even if one of them fails. Under [`ErrorPolicy::Swallow`] a
    /// failure is logged and the partial summary is returned as success.
    #[instrument(skip(self))]
    pub async fn build(
        &mut self,
        destination: &std::path::Path,
        temp: &std::path::Path,
    ) -> Result<Summary, Error> {
        let mut summary = Summary::default();
        let res = self.run_phases(destination, temp, &mut summary).await;
        match res {
            Ok(()) => {
                self.state = BuildState::Done;
                tracing::info!("build done");
                Ok(summary)
            }
            Err(error) => {
                self.state = BuildState::Failed;
                match self.settings.error_policy {
                    ErrorPolicy::Propagate => Err(error),
                    ErrorPolicy::Swallow => {
                        tracing::error!("build failed: {:#}", &error);
                        Ok(summary)
                    }
                }
            }
        }
    }

    async fn run_phases(
        &mut self,
        destination: &std::path::Path,
        temp: &std::path::Path,
        summary: &mut Summary,
    ) -> Result<(), Error> {
        // locale keys become directory names below both roots
        self.config.validate().map_err(Error::Config)?;
        self.state = BuildState::Cleaning;
        tracing::info!("cleaning dirs...");
        match clean::clean(&[destination.to_path_buf(), temp.to_path_buf()]).await {
            Ok(clean_summary) => summary.clean_summary = clean_summary,
            Err(error) => {
                summary.clean_summary = error.summary;
                return Err(error.into());
            }
        }
        self.state = BuildState::Copying;
        let mut join_set = tokio::task::JoinSet::new();
        let mut job_ids = std::collections::HashMap::new();
        for kind in JobKind::ALL {
            let config = self.config.clone();
            let output_root = temp.to_path_buf();
            let settings = self.settings.fan_out.clone();
            let do_job =
                || async move { jobs::run_job(kind, &config, &output_root, &settings).await };
            let handle = join_set.spawn(do_job());
            job_ids.insert(handle.id(), kind);
        }
        let mut first_error = None;
        while let Some(res) = join_set.join_next_with_id().await {
            let error = match res {
                Ok((_, Ok(job_summary))) => {
                    summary.jobs_completed += 1;
                    summary.copy_summary = summary.copy_summary + job_summary;
                    continue;
                }
                Ok((id, Err(error))) => {
                    summary.copy_summary = summary.copy_summary + error.summary;
                    Error::Copy {
                        job: job_ids[&id],
                        source: error,
                    }
                }
                Err(join_error) => Error::Join {
                    job: job_ids[&join_error.id()],
                    source: join_error,
                },
            };
            summary.jobs_failed += 1;
            if first_error.is_none() {
                first_error = Some(error);
            } else {
                tracing::error!("{:#}", &error);
            }
        }
        if let Some(error) = first_error {
            return Err(error);
        }
        if self.settings.localize {
            tracing::info!("copying localized bundles...");
            let localize_summary = jobs::localize(
                &self.config,
                &[destination.to_path_buf()],
                &self.settings.fan_out,
            )
            .await
            .map_err(Error::Localize)?;
            summary.copy_summary = summary.copy_summary + localize_summary;
        }
        Ok(())
    }
}
