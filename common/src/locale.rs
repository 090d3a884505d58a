//! Supported locales and per-locale destination expansion

use serde::{Deserialize, Serialize};

/// One supported locale, `key` names its output directory (e.g. "en", "de")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locale {
    pub key: String,
}

impl Locale {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Returns one directory per locale inside `output_root`, in locale order.
///
/// If `sub_path` is given it is appended after each locale directory, e.g. with `output_root`
/// `/dist`, locales `en`, `de` and `sub_path` `static/` this yields `/dist/en/static/` and
/// `/dist/de/static/`.
pub fn localized_destinations(
    output_root: &std::path::Path,
    locales: &[Locale],
    sub_path: Option<&std::path::Path>,
) -> Vec<std::path::PathBuf> {
    locales
        .iter()
        .map(|locale| {
            let destination = output_root.join(&locale.key);
            match sub_path {
                Some(sub_path) => destination.join(sub_path),
                None => destination,
            }
        })
        .collect()
}
