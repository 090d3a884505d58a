//! The locale-aware copy jobs a frontend build is made of

use anyhow::anyhow;
use tracing::instrument;

use crate::config::{BuildConfig, PathsConfig};
use crate::fanout::{self, CopySpec, Error, Summary};
use crate::locale;

/// Each job copies one kind of build input into every locale directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Everything under the assets root, keeping the path relative to the app root
    Assets,
    /// Material icon font files
    Icons,
    /// Every configured font family
    Fonts,
    /// Top-level PNG files shipped by a third-party dependency
    DependencyImages,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Assets,
        JobKind::Icons,
        JobKind::Fonts,
        JobKind::DependencyImages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            JobKind::Assets => "assets",
            JobKind::Icons => "icons",
            JobKind::Fonts => "fonts",
            JobKind::DependencyImages => "dependency-images",
        }
    }

    /// Subdirectory of each locale directory the job writes into
    pub fn sub_path(self) -> Option<&'static std::path::Path> {
        match self {
            JobKind::Assets => None,
            JobKind::Icons | JobKind::Fonts => Some(std::path::Path::new("static/")),
            JobKind::DependencyImages => Some(std::path::Path::new("static/img")),
        }
    }

    pub fn copy_specs(self, paths: &PathsConfig) -> anyhow::Result<Vec<CopySpec>> {
        Ok(match self {
            JobKind::Assets => vec![CopySpec::new(&paths.assets, "**/*", &paths.app)?],
            JobKind::Icons => vec![CopySpec::new(
                &paths.material_icons,
                "**/*.{woff2,woff,eot,ttf}",
                &paths.material_icons,
            )?],
            JobKind::Fonts => paths
                .fonts
                .iter()
                .map(|family| CopySpec::new(&family.root, "**/*.*", &family.base))
                .collect::<anyhow::Result<_>>()?,
            JobKind::DependencyImages => vec![CopySpec::new(
                &paths.dependency_images,
                "*.png",
                &paths.dependency_images,
            )?],
        })
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Runs fan-outs side by side as one operation: succeeds only if all of them succeed.
///
/// Every fan-out runs to its end, the first error is returned and the rest are logged.
async fn merge<Fut>(fan_outs: impl IntoIterator<Item = Fut>) -> Result<Summary, Error>
where
    Fut: std::future::Future<Output = Result<Summary, Error>>,
{
    let mut summary = Summary::default();
    let mut first_error = None;
    for res in futures::future::join_all(fan_outs).await {
        match res {
            Ok(fan_out_summary) => summary = summary + fan_out_summary,
            Err(error) => {
                summary = summary + error.summary;
                if first_error.is_none() {
                    first_error = Some(error.source);
                } else {
                    tracing::error!("{:#}", &error);
                }
            }
        }
    }
    match first_error {
        Some(source) => Err(Error::new(source, summary)),
        None => Ok(summary),
    }
}

/// Copies the inputs of `kind` into one directory per configured locale below `output_root`
#[instrument(skip(config, settings))]
pub async fn run_job(
    kind: JobKind,
    config: &BuildConfig,
    output_root: &std::path::Path,
    settings: &fanout::Settings,
) -> Result<Summary, Error> {
    tracing::info!("copying {kind}...");
    let specs = kind
        .copy_specs(&config.paths)
        .map_err(|err| Error::new(err, Default::default()))?;
    let destinations =
        locale::localized_destinations(output_root, &config.locales, kind.sub_path());
    let summary = merge(
        specs
            .iter()
            .map(|spec| fanout::copy_fan_out(spec, &destinations, settings)),
    )
    .await?;
    tracing::info!("copying {kind} done");
    Ok(summary)
}

/// Copies every locale's already localized `*.js` bundles into `<output dir>/<locale>/static`,
/// for each of `output_dirs`.
///
/// Unlike the other jobs the source differs per locale: bundles are read from
/// `<paths.i18n>/<locale>`.
#[instrument(skip(config, settings))]
pub async fn localize(
    config: &BuildConfig,
    output_dirs: &[std::path::PathBuf],
    settings: &fanout::Settings,
) -> Result<Summary, Error> {
    let i18n = config.paths.i18n.as_ref().ok_or_else(|| {
        Error::new(
            anyhow!("no localized bundle directory configured (paths.i18n)"),
            Default::default(),
        )
    })?;
    let mut fan_outs = Vec::with_capacity(config.locales.len());
    for locale in &config.locales {
        let source = i18n.join(&locale.key);
        let spec = CopySpec::new(&source, "*.js", &source)
            .map_err(|err| Error::new(err, Default::default()))?;
        let destinations: Vec<_> = output_dirs
            .iter()
            .map(|output_dir| output_dir.join(&locale.key).join("static"))
            .collect();
        fan_outs.push((spec, destinations));
    }
    merge(
        fan_outs
            .iter()
            .map(|(spec, destinations)| fanout::copy_fan_out(spec, destinations, settings)),
    )
    .await
}
