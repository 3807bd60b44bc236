//! Object metadata describing how an uploaded recording is to be post-processed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

pub const SILENCE_THRESHOLD_RANGE: RangeInclusive<f64> = -50.0..=-20.0;
pub const MIN_SILENCE_DURATION_RANGE: RangeInclusive<f64> = 500.0..=2000.0;

const PROCESSING_VERSION: &str = "1.0";
const UI_VERSION: &str = "1.0";

/// Settings chosen for a recording.
///
/// [`Default`] yields the recommended settings. When deserialized, a missing flag counts as
/// `false` while missing numbers fall back to the recommended values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSettings {
    /// Whether a trimmed one-shot sample is derived from the recording.
    #[serde(default)]
    pub create_one_shot: bool,
    /// Level in dB below which audio counts as silence.
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f64,
    /// Minimum length of a silence in milliseconds.
    #[serde(default = "default_min_silence_duration")]
    pub min_silence_duration: f64,
    #[serde(default)]
    pub preserve_original: bool,
    #[serde(default)]
    pub auto_detect_threshold: bool,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_silence_threshold() -> f64 {
    -30.0
}

fn default_min_silence_duration() -> f64 {
    750.0
}

fn default_output_format() -> String {
    "original".to_string()
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        ProcessingSettings {
            create_one_shot: true,
            silence_threshold: default_silence_threshold(),
            min_silence_duration: default_min_silence_duration(),
            preserve_original: true,
            auto_detect_threshold: false,
            output_format: default_output_format(),
        }
    }
}

fn clamp_or_default(value: f64, range: &RangeInclusive<f64>, default: f64) -> f64 {
    let value = if value.is_nan() { default } else { value };
    value.clamp(*range.start(), *range.end())
}

/// Replaces unusable numbers by their defaults and clamps them into their permitted ranges.
pub fn validate_processing_settings(settings: &ProcessingSettings) -> ProcessingSettings {
    let defaults = ProcessingSettings::default();

    ProcessingSettings {
        silence_threshold: clamp_or_default(
            settings.silence_threshold,
            &SILENCE_THRESHOLD_RANGE,
            defaults.silence_threshold,
        ),
        min_silence_duration: clamp_or_default(
            settings.min_silence_duration,
            &MIN_SILENCE_DURATION_RANGE,
            defaults.min_silence_duration,
        ),
        ..settings.clone()
    }
}

/// Rounds half-way values towards positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

fn flag(value: bool) -> String {
    value.to_string()
}

/// Renders the settings as S3 user metadata.
pub fn format_processing_metadata(settings: &ProcessingSettings) -> BTreeMap<String, String> {
    let settings = validate_processing_settings(settings);

    BTreeMap::from([
        (
            "processing-enabled".to_string(),
            flag(settings.create_one_shot),
        ),
        (
            "silence-threshold".to_string(),
            round_half_up(settings.silence_threshold).to_string(),
        ),
        (
            "min-silence-duration".to_string(),
            round_half_up(settings.min_silence_duration).to_string(),
        ),
        (
            "preserve-original".to_string(),
            flag(settings.preserve_original),
        ),
        (
            "auto-detect-threshold".to_string(),
            flag(settings.auto_detect_threshold),
        ),
        (
            "processing-version".to_string(),
            PROCESSING_VERSION.to_string(),
        ),
        ("ui-version".to_string(), UI_VERSION.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: serde_json::Value) -> ProcessingSettings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn clamps_out_of_range_values() {
        let metadata = format_processing_metadata(&settings(json!({"silenceThreshold": -60})));
        assert_eq!(metadata["silence-threshold"], "-50");

        let metadata = format_processing_metadata(&settings(json!({"minSilenceDuration": 100})));
        assert_eq!(metadata["min-silence-duration"], "500");

        let metadata = format_processing_metadata(&settings(json!({
            "silenceThreshold": 0,
            "minSilenceDuration": 10000
        })));
        assert_eq!(metadata["silence-threshold"], "-20");
        assert_eq!(metadata["min-silence-duration"], "2000");
    }

    #[test]
    fn defaults_render_completely() {
        let metadata = format_processing_metadata(&ProcessingSettings::default());

        assert_eq!(
            metadata,
            BTreeMap::from([
                ("processing-enabled".to_string(), "true".to_string()),
                ("silence-threshold".to_string(), "-30".to_string()),
                ("min-silence-duration".to_string(), "750".to_string()),
                ("preserve-original".to_string(), "true".to_string()),
                ("auto-detect-threshold".to_string(), "false".to_string()),
                ("processing-version".to_string(), "1.0".to_string()),
                ("ui-version".to_string(), "1.0".to_string()),
            ])
        );
    }

    #[test]
    fn missing_flags_render_as_false() {
        let metadata = format_processing_metadata(&settings(json!({"silenceThreshold": -25})));

        assert_eq!(metadata["processing-enabled"], "false");
        assert_eq!(metadata["preserve-original"], "false");
        assert_eq!(metadata["auto-detect-threshold"], "false");
        assert_eq!(metadata["silence-threshold"], "-25");
        assert_eq!(metadata["min-silence-duration"], "750");
    }

    #[test]
    fn nan_falls_back_to_defaults() {
        let validated = validate_processing_settings(&ProcessingSettings {
            silence_threshold: f64::NAN,
            min_silence_duration: f64::NAN,
            ..ProcessingSettings::default()
        });

        assert_eq!(validated.silence_threshold, -30.0);
        assert_eq!(validated.min_silence_duration, 750.0);
    }

    #[test]
    fn rounds_half_up() {
        let metadata = format_processing_metadata(&ProcessingSettings {
            silence_threshold: -30.5,
            min_silence_duration: 750.5,
            ..ProcessingSettings::default()
        });

        assert_eq!(metadata["silence-threshold"], "-30");
        assert_eq!(metadata["min-silence-duration"], "751");
    }

    #[test]
    fn validation_keeps_other_fields() {
        let input = ProcessingSettings {
            create_one_shot: false,
            output_format: "wav".to_string(),
            silence_threshold: -100.0,
            ..ProcessingSettings::default()
        };

        let validated = validate_processing_settings(&input);

        assert!(!validated.create_one_shot);
        assert_eq!(validated.output_format, "wav");
        assert_eq!(validated.silence_threshold, -50.0);
        assert_eq!(
            format_processing_metadata(&input)["processing-enabled"],
            "false"
        );
    }
}
