//! Pipeline configuration
//!
//! Loaded from JSON. Every field has a default, so `{}` is a complete config.
//! Durations are human-readable strings ("500ms", "2s").

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spatia_core::{SpatiaError, SpatiaResult};
use spatia_project::{CameraIntrinsics, EyePose, ReferenceCamera};
use spatia_stabilize::{AnchorConfig, StreamConfig};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub projection: ProjectionConfig,
    pub streams: StreamsConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

/// Reference camera and the screen resolution landmarks are scaled to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub reference_width: u32,
    pub reference_height: u32,
    pub camera: ReferenceCamera,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            reference_width: 1280,
            reference_height: 960,
            camera: ReferenceCamera::new(
                EyePose::default(),
                CameraIntrinsics::centered(1280, 960, 1000.0),
            ),
        }
    }
}

/// Settings of one point/line stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub enabled: bool,
    pub point_scale: f32,
    pub line_width: f32,
    #[serde(with = "humantime_str")]
    pub hide_delay: Duration,
}

impl StreamSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            point_scale: self.point_scale,
            line_width: self.line_width,
            hide_delay: self.hide_delay,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        let base = StreamConfig::default();
        Self {
            enabled: true,
            point_scale: base.point_scale,
            line_width: base.line_width,
            hide_delay: base.hide_delay,
        }
    }
}

/// Face anchor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorSettings {
    pub enabled: bool,
    #[serde(with = "humantime_str")]
    pub hide_delay: Duration,
    #[serde(with = "humantime_str")]
    pub smooth_time: Duration,
    /// Reserved
    pub position_change_threshold: f32,
}

impl AnchorSettings {
    pub fn anchor_config(&self) -> AnchorConfig {
        AnchorConfig {
            hide_delay: self.hide_delay,
            smooth_time: self.smooth_time,
            position_change_threshold: self.position_change_threshold,
        }
    }
}

impl Default for AnchorSettings {
    fn default() -> Self {
        let base = AnchorConfig::default();
        Self {
            enabled: true,
            hide_delay: base.hide_delay,
            smooth_time: base.smooth_time,
            position_change_threshold: base.position_change_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamsConfig {
    pub body: StreamSettings,
    pub left_hand: StreamSettings,
    pub right_hand: StreamSettings,
    /// Off unless switched on
    pub face_contour: StreamSettings,
    pub face_anchor: AnchorSettings,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            body: StreamSettings::default(),
            left_hand: StreamSettings::default(),
            right_hand: StreamSettings::default(),
            face_contour: StreamSettings::disabled(),
            face_anchor: AnchorSettings::default(),
        }
    }
}

/// How inference results reach the stabilizers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Block on the graph's combined result every frame
    #[default]
    Sync,
    /// Each landmark source arrives on its own channel at its own cadence
    Async,
}

/// How a source image is moved into a pool buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturePath {
    /// Direct on-device copy
    DeviceCopy,
    /// Asynchronous readback request
    #[default]
    Readback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub mode: DispatchMode,
    pub capture_path: CapturePath,
    pub pool_capacity: usize,
    /// Wait applied when the loop has to retry at the next frame boundary
    #[serde(with = "humantime_str")]
    pub frame_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::Sync,
            capture_path: CapturePath::Readback,
            pool_capacity: 10,
            frame_interval: Duration::from_millis(16),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl PipelineConfig {
    /// Read, parse and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> SpatiaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SpatiaError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), "loaded pipeline configuration");
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> SpatiaResult<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| SpatiaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SpatiaResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SpatiaError::Config(e.to_string()))
    }

    pub fn validate(&self) -> SpatiaResult<()> {
        let p = &self.projection;
        if p.reference_width == 0 || p.reference_height == 0 {
            return Err(SpatiaError::Config(format!(
                "reference resolution must be non-zero, got {}x{}",
                p.reference_width, p.reference_height
            )));
        }
        let k = &p.camera.intrinsics;
        if !(k.fx.is_finite() && k.fy.is_finite()) || k.fx == 0.0 || k.fy == 0.0 {
            return Err(SpatiaError::Config("camera focal length must be finite and non-zero".into()));
        }

        let s = &self.streams;
        for (name, stream) in [
            ("body", &s.body),
            ("left_hand", &s.left_hand),
            ("right_hand", &s.right_hand),
            ("face_contour", &s.face_contour),
        ] {
            if !non_negative(stream.point_scale) || !non_negative(stream.line_width) {
                return Err(SpatiaError::Config(format!(
                    "{name}: point_scale and line_width must be non-negative"
                )));
            }
        }
        if s.face_anchor.smooth_time.is_zero() {
            return Err(SpatiaError::Config("face_anchor: smooth_time must be positive".into()));
        }
        if !non_negative(s.face_anchor.position_change_threshold) {
            return Err(SpatiaError::Config(
                "face_anchor: position_change_threshold must be non-negative".into(),
            ));
        }

        let d = &self.dispatch;
        if d.pool_capacity == 0 {
            return Err(SpatiaError::Config("dispatch: pool_capacity must be at least 1".into()));
        }
        if d.frame_interval.is_zero() {
            return Err(SpatiaError::Config("dispatch: frame_interval must be positive".into()));
        }

        Ok(())
    }
}

#[inline]
fn non_negative(value: f32) -> bool {
    value >= 0.0
}

/// Durations as humantime strings
mod humantime_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.projection.reference_width, 1280);
        assert_eq!(config.projection.reference_height, 960);
        assert_eq!(config.dispatch.pool_capacity, 10);
        assert_eq!(config.streams.body.hide_delay, Duration::from_millis(500));
        assert_eq!(config.streams.face_anchor.smooth_time, Duration::from_millis(100));
        assert!(!config.streams.face_contour.enabled);
        assert!(config.streams.face_anchor.enabled);
    }

    #[test]
    fn test_partial_document() {
        let json = r#"{
            "streams": { "left_hand": { "hide_delay": "1s 200ms", "enabled": false } },
            "dispatch": { "mode": "async", "capture_path": "device_copy", "frame_interval": "33ms" },
            "logging": { "json": true }
        }"#;
        let config = PipelineConfig::from_json(json).unwrap();

        assert_eq!(config.streams.left_hand.hide_delay, Duration::from_millis(1200));
        assert!(!config.streams.left_hand.enabled);
        assert_eq!(config.streams.left_hand.point_scale, 0.01);
        assert_eq!(config.dispatch.mode, DispatchMode::Async);
        assert_eq!(config.dispatch.capture_path, CapturePath::DeviceCopy);
        assert_eq!(config.dispatch.frame_interval, Duration::from_millis(33));
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_duration_rejected() {
        let err = PipelineConfig::from_json(r#"{"dispatch": {"frame_interval": "soon"}}"#).unwrap_err();
        assert!(matches!(err, SpatiaError::Config(_)));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(PipelineConfig::from_json(r#"{"dispatch": {"mode": "eager"}}"#).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = PipelineConfig::default();
        config.dispatch.pool_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_resolution() {
        let err = PipelineConfig::from_json(r#"{"projection": {"reference_width": 0}}"#).unwrap_err();
        assert!(err.to_string().contains("reference resolution"));
    }

    #[test]
    fn test_validate_rejects_negative_scale() {
        let mut config = PipelineConfig::default();
        config.streams.body.point_scale = -1.0;
        assert!(config.validate().is_err());

        config.streams.body.point_scale = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_smooth_time() {
        let err = PipelineConfig::from_json(r#"{"streams": {"face_anchor": {"smooth_time": "0s"}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("smooth_time"));
    }

    #[test]
    fn test_durations_serialize_as_text() {
        let json = PipelineConfig::default().to_json().unwrap();
        assert!(json.contains(r#""hide_delay": "500ms""#));
        assert!(json.contains(r#""frame_interval": "16ms""#));
    }

    #[test]
    fn test_settings_convert_to_stabilizer_configs() {
        let config = PipelineConfig::default();
        assert_eq!(config.streams.body.stream_config(), StreamConfig::default());
        assert_eq!(config.streams.face_anchor.anchor_config(), AnchorConfig::default());
    }
}
