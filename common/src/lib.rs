//! Common library for the rdist tools: per-locale fan-out copies and the frontend build
//!
//! A frontend build takes a handful of source trees (assets, icon fonts, web fonts, images shipped
//! by dependencies) and replicates each of them into one output directory per supported locale.
//!
//! # Building blocks
//!
//! - [`locale::localized_destinations`] expands an output root into one directory per locale
//! - [`clean::clean`] removes previous build output
//! - [`fanout::copy_fan_out`] copies one source selection into many destinations
//! - [`completion`] turns per-file reports into a single awaitable outcome
//! - [`jobs`] defines the four copy jobs of a build plus [`jobs::localize`]
//! - [`orchestrator::Orchestrator`] sequences cleaning before the concurrent copy jobs
//!
//! # Example
//!
//! ```rust,no_run
//! use common::{BuildConfig, Orchestrator, orchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = BuildConfig::from_file(std::path::Path::new("rdist.json"))?;
//! let mut orchestrator = Orchestrator::new(config, orchestrator::Settings::default());
//! let summary = orchestrator
//!     .build(std::path::Path::new("dist"), std::path::Path::new(".tmp"))
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod clean;
pub mod completion;
pub mod config;
pub mod fanout;
pub mod jobs;
pub mod locale;
pub mod orchestrator;
pub mod pattern;

mod testutils;

pub use config::{BuildConfig, OutputConfig, RuntimeConfig};
pub use locale::Locale;
pub use orchestrator::{ErrorPolicy, Orchestrator};

fn get_log_level(output: &OutputConfig) -> &'static str {
    if output.quiet {
        return "off";
    }
    match output.verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::new(get_log_level(output));
    // a subscriber may already be installed, e.g. when running under a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Sets up logging and a tokio runtime, then runs `func` to completion.
///
/// Returns `None` if the runtime could not be created or `func` failed, the error has been logged
/// at that point (unless running quietly).
pub fn run<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&output);
    execute(output, runtime, func)
}

fn execute<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    let tokio_runtime = match builder.build() {
        Ok(tokio_runtime) => tokio_runtime,
        Err(error) => {
            tracing::error!("failed to create tokio runtime: {:#}", &error);
            return None;
        }
    };
    match tokio_runtime.block_on(func()) {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            tracing::error!("{:#}", &error);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels() {
        let mut output = OutputConfig::default();
        assert_eq!(get_log_level(&output), "error");
        output.verbose = 2;
        assert_eq!(get_log_level(&output), "debug");
        output.verbose = 7;
        assert_eq!(get_log_level(&output), "trace");
        output.quiet = true;
        assert_eq!(get_log_level(&output), "off");
    }

    #[test]
    fn execute_reports_failure_as_none() {
        let res: Option<String> = execute(
            OutputConfig::default(),
            RuntimeConfig {
                max_workers: 1,
                max_blocking_threads: 0,
            },
            || async { Err(anyhow::anyhow!("boom")) },
        );
        assert!(res.is_none());
    }

    #[test]
    fn execute_returns_summary() {
        let res = execute(OutputConfig::default(), RuntimeConfig::default(), || async {
            Ok::<_, anyhow::Error>(42)
        });
        assert_eq!(res, Some(42));
    }
}
