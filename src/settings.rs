use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::pdf::estimator::{CRISP_TEXT_SCALE, EstimatorConfig, ScalePolicy};
use crate::pdf::extractor::{
    DEFAULT_EMERGENCY_LADDER, DEFAULT_FALLBACK_SCALE, DEFAULT_JPEG_QUALITY,
    DEFAULT_LOSSY_THRESHOLD, ExtractorConfig, PREVIEW_SCALE, normalize_ladder,
};
use crate::pdf::naming::NamingPattern;

pub const CURRENT_VERSION: u32 = 2;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pdfsnip";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub scale_policy: ScalePolicy,

    /// Scale used when a page cannot be inspected
    #[serde(default = "default_crisp_scale")]
    pub conservative_scale: f32,

    #[serde(default = "default_fallback_scale")]
    pub fallback_scale: f32,

    #[serde(default = "default_emergency_ladder")]
    pub emergency_ladder: Vec<f32>,

    #[serde(default = "default_lossy_threshold")]
    pub lossy_threshold_bytes: u64,

    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    #[serde(default = "default_crisp_scale")]
    pub text_floor_scale: f32,

    #[serde(default = "default_true")]
    pub probe_enabled: bool,

    #[serde(default)]
    pub naming_pattern: NamingPattern,

    #[serde(default = "default_cache_size")]
    pub estimate_cache_size: usize,
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_crisp_scale() -> f32 {
    CRISP_TEXT_SCALE
}

fn default_fallback_scale() -> f32 {
    DEFAULT_FALLBACK_SCALE
}

fn default_emergency_ladder() -> Vec<f32> {
    DEFAULT_EMERGENCY_LADDER.to_vec()
}

fn default_lossy_threshold() -> u64 {
    DEFAULT_LOSSY_THRESHOLD
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_cache_size() -> usize {
    64
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            scale_policy: ScalePolicy::default(),
            conservative_scale: default_crisp_scale(),
            fallback_scale: default_fallback_scale(),
            emergency_ladder: default_emergency_ladder(),
            lossy_threshold_bytes: default_lossy_threshold(),
            jpeg_quality: default_jpeg_quality(),
            text_floor_scale: default_crisp_scale(),
            probe_enabled: true,
            naming_pattern: NamingPattern::default(),
            estimate_cache_size: default_cache_size(),
        }
    }
}

impl Settings {
    /// Load from `explicit` or the per-user config file. A missing file is
    /// created with defaults; an unreadable one is reported and ignored.
    #[must_use]
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = explicit.map(Path::to_path_buf).or_else(preferred_config_path);
        let Some(path) = path else {
            warn!("Could not determine config directory, using default settings");
            return Self::default();
        };

        if path.exists() {
            load_settings_from_path(&path).unwrap_or_default()
        } else {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            save_settings_to_file(&settings, &path);
            settings
        }
    }

    /// Parse YAML text, migrating and normalizing the result
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let mut settings: Settings = serde_yaml::from_str(content)?;
        if settings.version < CURRENT_VERSION {
            migrate_settings(&mut settings);
        }
        settings.normalize();
        Ok(settings)
    }

    /// Repair values the core cannot use
    pub fn normalize(&mut self) {
        let ladder = normalize_ladder(&self.emergency_ladder);
        if ladder != self.emergency_ladder {
            warn!(
                "emergency_ladder {:?} is not strictly descending, using {ladder:?}",
                self.emergency_ladder
            );
            self.emergency_ladder = ladder;
        }
        if !(self.fallback_scale.is_finite() && self.fallback_scale > 0.0) {
            warn!("fallback_scale {} invalid, using default", self.fallback_scale);
            self.fallback_scale = default_fallback_scale();
        }
        if !(self.conservative_scale.is_finite() && self.conservative_scale > 0.0) {
            self.conservative_scale = default_crisp_scale();
        }
        self.jpeg_quality = self.jpeg_quality.clamp(1, 100);
    }

    #[must_use]
    pub fn estimator_config(&self) -> EstimatorConfig {
        EstimatorConfig {
            policy: self.scale_policy,
            conservative_scale: self.conservative_scale,
            text_floor_scale: self.text_floor_scale,
            probe_enabled: self.probe_enabled,
            cache_size: self.estimate_cache_size,
        }
    }

    #[must_use]
    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            fallback_scale: self.fallback_scale,
            emergency_ladder: self.emergency_ladder.clone(),
            lossy_threshold_bytes: self.lossy_threshold_bytes,
            jpeg_quality: self.jpeg_quality,
            preview_scale: PREVIEW_SCALE,
        }
    }
}

fn preferred_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

fn load_settings_from_path(path: &Path) -> Option<Settings> {
    match fs::read_to_string(path) {
        Ok(content) => match Settings::from_yaml(&content) {
            Ok(settings) => {
                debug!("Loaded settings from {path:?}");
                if content_version(&content) < CURRENT_VERSION {
                    save_settings_to_file(&settings, path);
                }
                Some(settings)
            }
            Err(e) => {
                error!("Failed to parse settings file {path:?}: {e}");
                None
            }
        },
        Err(e) => {
            error!("Failed to read settings file {path:?}: {e}");
            None
        }
    }
}

fn content_version(content: &str) -> u32 {
    #[derive(Deserialize)]
    struct Versioned {
        #[serde(default)]
        version: u32,
    }
    serde_yaml::from_str::<Versioned>(content)
        .map(|v| v.version)
        .unwrap_or(CURRENT_VERSION)
}

fn migrate_settings(settings: &mut Settings) {
    info!(
        "Migrating settings from v{} to v{}",
        settings.version, CURRENT_VERSION
    );

    // v1 stored the emergency ladder in any order
    if settings.version < 2 {
        settings.emergency_ladder = normalize_ladder(&settings.emergency_ladder);
    }

    settings.version = CURRENT_VERSION;
}

fn save_settings_to_file(settings: &Settings, path: &Path) {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                error!("Failed to create config directory {parent:?}: {e}");
                return;
            }
        }
    }

    let content = match generate_settings_yaml(settings) {
        Ok(content) => content,
        Err(e) => {
            error!("Failed to serialize settings: {e}");
            return;
        }
    };

    match fs::write(path, content) {
        Ok(()) => debug!("Saved settings to {path:?}"),
        Err(e) => error!("Failed to save settings to {path:?}: {e}"),
    }
}

fn generate_settings_yaml(settings: &Settings) -> Result<String, serde_yaml::Error> {
    let mut content = String::from(SETTINGS_HEADER);
    content.push_str(&serde_yaml::to_string(settings)?);
    Ok(content)
}

const SETTINGS_HEADER: &str = r#"# ============================================================================
# pdfsnip settings
# ============================================================================
# scale_policy:       { mode: capped, max_scale: 8.0 } or { mode: native }
# emergency_ladder:   scales tried after the fallback, strictly descending
# naming_pattern:     literal text plus {n}, {n:03} and {doc}
# lossy_threshold_bytes: uncompressed RGB size above which output is JPEG

"#;
