use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

const DEFAULT_IMAGE_CHECK_DELAY_MS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse editor options: {0}")]
    Parse(#[from] serde_json::Error),
}

fn default_image_check_delay_ms() -> u64 {
    DEFAULT_IMAGE_CHECK_DELAY_MS
}

/// Options recognized by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorOptions {
    /// Height of the fixed chrome above the content, in pixels.
    #[serde(deserialize_with = "deserialize_int")]
    pub offset_top: i32,
    pub toolbar_height: f32,
    pub bottom_modal_height: f32,
    #[serde(default = "default_image_check_delay_ms")]
    pub image_check_delay_ms: u64,
    pub placeholder: Option<String>,
}

impl Default for EditorOptions {
    fn default() -> Self {
        Self {
            offset_top: 0,
            toolbar_height: 0.0,
            bottom_modal_height: 0.0,
            image_check_delay_ms: DEFAULT_IMAGE_CHECK_DELAY_MS,
            placeholder: None,
        }
    }
}

impl EditorOptions {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn image_check_delay(&self) -> Duration {
        Duration::from_millis(self.image_check_delay_ms)
    }
}

/// Which pieces of chrome currently cover the window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChromeState {
    pub toolbar_visible: bool,
    pub toolbar_height: f32,
    pub emoji_modal_visible: bool,
    pub text_style_modal_visible: bool,
    pub bottom_modal_height: f32,
}

impl ChromeState {
    pub fn from_options(options: &EditorOptions) -> Self {
        Self {
            toolbar_visible: true,
            toolbar_height: options.toolbar_height,
            emoji_modal_visible: false,
            text_style_modal_visible: false,
            bottom_modal_height: options.bottom_modal_height,
        }
    }

    pub fn bottom_modal_open(&self) -> bool {
        self.emoji_modal_visible || self.text_style_modal_visible
    }

    pub fn effective_toolbar_height(&self) -> f32 {
        if self.toolbar_visible {
            self.toolbar_height
        } else {
            0.0
        }
    }

    pub fn effective_bottom_modal_height(&self) -> f32 {
        if self.bottom_modal_open() {
            self.bottom_modal_height
        } else {
            0.0
        }
    }
}

/// Leading-integer coercion: `44`, `44.9`, `"44px"` and `" 44 "` all read as
/// 44; anything without a leading integer reads as 0.
fn deserialize_int<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(|n| n.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(0),
        Value::String(s) => leading_int(&s),
        Value::Bool(_) | Value::Null | Value::Array(_) | Value::Object(_) => 0,
    })
}

fn leading_int(s: &str) -> i32 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(ix, _)| ix)
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|n| (sign * n).clamp(i32::MIN as i64, i32::MAX as i64) as i32)
        .unwrap_or(0)
}
