use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use crate::capture::AutoCaptureConfig;
use crate::edge::HysteresisConfig;
use crate::feedback::{FeedbackConfig, Locale};
use crate::geometry::EvaluatorConfig;
use crate::pipeline::PipelineConfig;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AssistantSettings {
    pub volume: f32,
    pub locale: Locale,
    pub auto_capture: bool,

    pub analysis_width: u32,
    pub analysis_height: u32,
    pub analysis_interval_ms: u64,

    pub edge_margin_px: f32,
    pub min_area_ratio: f64,
    pub peak_area_ratio: f64,
    pub max_area_ratio: f64,

    pub upper_threshold: f32,
    pub lower_threshold: f32,

    pub stability_threshold: u32,
    pub countdown_secs: u32,
    pub announcement_interval_ms: u64,

    pub corrected_quality: u8,
    pub fallback_quality: u8,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        let evaluator = EvaluatorConfig::default();
        let hysteresis = HysteresisConfig::default();
        let auto_capture = AutoCaptureConfig::default();
        let pipeline = PipelineConfig::default();

        Self {
            volume: 1.0,
            locale: Locale::default(),
            auto_capture: true,
            analysis_width: pipeline.analysis_width,
            analysis_height: pipeline.analysis_height,
            analysis_interval_ms: 100,
            edge_margin_px: evaluator.edge_margin_px,
            min_area_ratio: evaluator.min_area_ratio,
            peak_area_ratio: evaluator.peak_area_ratio,
            max_area_ratio: evaluator.max_area_ratio,
            upper_threshold: hysteresis.upper,
            lower_threshold: hysteresis.lower,
            stability_threshold: auto_capture.stability_threshold,
            countdown_secs: auto_capture.countdown_secs,
            announcement_interval_ms: 2000,
            corrected_quality: pipeline.corrected_quality,
            fallback_quality: pipeline.fallback_quality,
        }
    }
}

impl AssistantSettings {
    pub fn validate(&self) -> Result<()> {
        if self.analysis_width == 0 || self.analysis_height == 0 {
            bail!("analysis resolution must be non-zero");
        }
        if self.analysis_interval_ms == 0 {
            bail!("analysisIntervalMs must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.lower_threshold)
            || !(0.0..=1.0).contains(&self.upper_threshold)
            || self.lower_threshold >= self.upper_threshold
        {
            bail!(
                "thresholds must satisfy 0 <= lower < upper <= 1 (got {} / {})",
                self.lower_threshold,
                self.upper_threshold
            );
        }
        if !(0.0 < self.min_area_ratio
            && self.min_area_ratio < self.peak_area_ratio
            && self.peak_area_ratio < self.max_area_ratio
            && self.max_area_ratio <= 1.0)
        {
            bail!("area ratios must satisfy 0 < min < peak < max <= 1");
        }
        if self.edge_margin_px < 0.0 || !self.edge_margin_px.is_finite() {
            bail!("edgeMarginPx must be a non-negative number");
        }
        if self.stability_threshold == 0 || self.countdown_secs == 0 {
            bail!("stabilityThreshold and countdownSecs must be at least 1");
        }
        for quality in [self.corrected_quality, self.fallback_quality] {
            if !(1..=100).contains(&quality) {
                bail!("JPEG quality must be within 1..=100 (got {quality})");
            }
        }
        Ok(())
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_millis(self.analysis_interval_ms)
    }

    pub fn evaluator(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            edge_margin_px: self.edge_margin_px,
            min_area_ratio: self.min_area_ratio,
            peak_area_ratio: self.peak_area_ratio,
            max_area_ratio: self.max_area_ratio,
        }
    }

    pub fn hysteresis(&self) -> HysteresisConfig {
        HysteresisConfig {
            upper: self.upper_threshold,
            lower: self.lower_threshold,
        }
    }

    pub fn auto_capture_config(&self) -> AutoCaptureConfig {
        AutoCaptureConfig {
            stability_threshold: self.stability_threshold,
            countdown_secs: self.countdown_secs,
        }
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            analysis_width: self.analysis_width,
            analysis_height: self.analysis_height,
            corrected_quality: self.corrected_quality,
            fallback_quality: self.fallback_quality,
        }
    }

    pub fn feedback(&self) -> FeedbackConfig {
        FeedbackConfig {
            volume: self.volume.clamp(0.0, 1.0),
            locale: self.locale,
            announcement_interval: Duration::from_millis(self.announcement_interval_ms),
        }
    }
}

/// JSON-file-backed settings. Unreadable or malformed files fall back to
/// defaults so a bad file never keeps the assistant from starting.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<AssistantSettings>,
}

fn parse(contents: &str) -> Result<AssistantSettings> {
    let settings: AssistantSettings =
        serde_json::from_str(contents).context("settings file is not valid JSON")?;
    settings.validate()?;
    Ok(settings)
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse(&contents).unwrap_or_else(|e| {
                log_warn!("Ignoring settings in {}: {e:#}", path.display());
                AssistantSettings::default()
            })
        } else {
            AssistantSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn get(&self) -> AssistantSettings {
        self.read().clone()
    }

    pub fn update(&self, settings: AssistantSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.write();
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn set_volume(&self, volume: f32) -> Result<()> {
        let mut settings = self.get();
        settings.volume = if volume.is_finite() {
            volume.clamp(0.0, 1.0)
        } else {
            settings.volume
        };
        self.update(settings)
    }

    pub fn set_locale(&self, locale: Locale) -> Result<()> {
        let mut settings = self.get();
        settings.locale = locale;
        self.update(settings)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        *self.write() = parse(&contents)?;
        Ok(())
    }

    fn persist(&self, data: &AssistantSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    // A poisoned lock still holds a complete settings value.
    fn read(&self) -> RwLockReadGuard<'_, AssistantSettings> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AssistantSettings> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = AssistantSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.analysis_interval(), Duration::from_millis(100));
        assert_eq!(settings.upper_threshold, 0.45);
        assert_eq!(settings.lower_threshold, 0.35);
        assert_eq!(settings.stability_threshold, 10);
        assert_eq!(settings.edge_margin_px, 20.0);
    }

    #[test]
    fn rejects_inverted_thresholds_and_bad_quality() {
        let mut settings = AssistantSettings::default();
        settings.lower_threshold = 0.5;
        assert!(settings.validate().is_err());

        let mut settings = AssistantSettings::default();
        settings.fallback_quality = 0;
        assert!(settings.validate().is_err());

        let mut settings = AssistantSettings::default();
        settings.analysis_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let settings: AssistantSettings =
            serde_json::from_str(r#"{"volume":0.25,"locale":"fr"}"#).unwrap();
        assert_eq!(settings.volume, 0.25);
        assert_eq!(settings.locale, Locale::Fr);
        assert_eq!(settings.countdown_secs, 2);
    }

    #[test]
    fn store_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.get(), AssistantSettings::default());
        store.set_volume(1.7).unwrap();
        store.set_locale(Locale::Es).unwrap();

        let reopened = SettingsStore::new(path).unwrap();
        let settings = reopened.get();
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.locale, Locale::Es);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.get(), AssistantSettings::default());
        assert!(store.reload().is_err());
    }

    #[test]
    fn out_of_range_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"countdownSecs":0,"volume":0.3}"#).unwrap();

        let store = SettingsStore::new(path).unwrap();
        let settings = store.get();
        assert_eq!(settings, AssistantSettings::default());
        assert_eq!(settings.countdown_secs, 2);
        settings.validate().unwrap();

        // A later reload of the same file is refused and keeps the defaults.
        assert!(store.reload().is_err());
        assert_eq!(store.get(), AssistantSettings::default());
    }

    #[test]
    fn invalid_update_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut bad = store.get();
        bad.countdown_secs = 0;
        assert!(store.update(bad).is_err());
        assert!(!path.exists());
    }
}
