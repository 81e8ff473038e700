use std::{num::NonZeroUsize, path::Path};

use config::{Config, Environment, File, FileFormat};
use miette::{Context, IntoDiagnostic, Result};
use serde::Deserialize;

/// Tunables shared by the subcommands. Loaded from an optional TOML file and
/// `VINEKEEPER_…` environment variables; CLI flags override the loaded
/// values where a flag exists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// How long each generated subtitle stays on screen, in seconds
    pub subtitle_duration: f64,

    /// Template for the generated subtitle text
    pub subtitle_template: String,

    /// Font the burn-in filter renders with. fontconfig struggles with
    /// generic names like "sans" on some platforms, hence a concrete default.
    pub font_name: String,
    pub font_size: u32,

    /// Canonical dimensions every video is normalized to before
    /// concatenation. Some sources only serve 480x480.
    pub canonical_width: u32,
    pub canonical_height: u32,

    /// Worker count for network downloads
    pub download_workers: usize,

    /// Worker count for local transcodes; 0 means available parallelism
    pub encode_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subtitle_duration: 2.5,
            subtitle_template: "[{uploader}] {title}".to_string(),
            font_name: "Arial".to_string(),
            font_size: 12,
            canonical_width: 720,
            canonical_height: 720,
            download_workers: 4,
            encode_workers: 0,
        }
    }
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).format(FileFormat::Toml));
        }

        let config = builder
            .add_source(Environment::with_prefix("VINEKEEPER").try_parsing(true))
            .build()
            .into_diagnostic()
            .wrap_err("could not load configuration")?;

        config
            .try_deserialize()
            .into_diagnostic()
            .wrap_err("invalid configuration")
    }

    pub fn download_workers(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.download_workers).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn encode_workers(&self) -> Result<NonZeroUsize> {
        match NonZeroUsize::new(self.encode_workers) {
            Some(workers) => Ok(workers),
            None => std::thread::available_parallelism()
                .into_diagnostic()
                .wrap_err("could not determine available parallelism"),
        }
    }

    pub fn canonical_dimensions(&self) -> (u32, u32) {
        (self.canonical_width, self.canonical_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let settings = Settings::default();
        assert_eq!(settings.subtitle_duration, 2.5);
        assert_eq!(settings.subtitle_template, "[{uploader}] {title}");
        assert_eq!(settings.canonical_dimensions(), (720, 720));
        assert_eq!(settings.download_workers().get(), 4);
    }

    #[test]
    fn zero_download_workers_still_yields_a_positive_pool() {
        let settings = Settings { download_workers: 0, ..Settings::default() };
        assert_eq!(settings.download_workers().get(), 1);
    }
}
