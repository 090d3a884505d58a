use anyhow::Result;
use clap::Parser;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rdist",
    version,
    about = "Distribute frontend build inputs into one output tree per supported locale",
    long_about = "`rdist` copies assets, icon fonts, web fonts and dependency images into one directory per \
supported locale.

Both DESTINATION and TEMP are removed before anything is copied. Per-locale trees are staged below TEMP:

    TEMP/<locale>/assets/...          assets, relative to the app root
    TEMP/<locale>/static/...          icon and web fonts
    TEMP/<locale>/static/img/...      dependency images

EXAMPLE:
    # Build with the locales and paths listed in rdist.json
    rdist --config rdist.json dist .tmp --summary

Note: DESTINATION and TEMP are deleted recursively. Never point them at anything but build output."
)]
struct Args {
    // Build options
    /// Build configuration file (JSON): supported locales and source paths
    ///
    /// Relative paths inside the file are resolved against the file's directory.
    #[arg(short = 'c', long, value_name = "PATH", help_heading = "Build options")]
    config: std::path::PathBuf,

    /// What to do when a copy job fails
    ///
    /// `propagate` exits with an error, `swallow` only logs the failure and exits successfully.
    #[arg(
        long,
        value_enum,
        default_value_t = common::ErrorPolicy::Propagate,
        value_name = "POLICY",
        help_heading = "Build options"
    )]
    error_policy: common::ErrorPolicy,

    /// Also copy the already localized bundles into DESTINATION/<locale>/static
    ///
    /// Requires `paths.i18n` in the build configuration.
    #[arg(long, help_heading = "Build options")]
    localize: bool,

    // Progress & output
    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Performance & throttling
    /// Maximum number of open files, 0 means no limit, leaving unspecified means using 80% of max open files system limit
    #[arg(long, value_name = "N", help_heading = "Performance & throttling")]
    max_open_files: Option<usize>,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    // ARGUMENTS
    /// Output directory, removed before the build
    #[arg()]
    destination: std::path::PathBuf,

    /// Directory for temporary build artifacts, removed before the build
    #[arg()]
    temp: std::path::PathBuf,
}

#[instrument]
async fn async_main(args: Args) -> Result<common::orchestrator::Summary> {
    let config = common::BuildConfig::from_file(&args.config)?;
    tracing::info!(
        "building for locales: {:?}",
        config
            .locales
            .iter()
            .map(|locale| locale.key.as_str())
            .collect::<Vec<_>>()
    );
    let settings = common::orchestrator::Settings {
        error_policy: args.error_policy,
        localize: args.localize,
        fan_out: common::fanout::Settings::with_max_open_files(args.max_open_files),
    };
    let mut orchestrator = common::Orchestrator::new(config, settings);
    let summary = orchestrator.build(&args.destination, &args.temp).await?;
    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
