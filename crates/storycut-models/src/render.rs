//! Render records and aspect ratios.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::ids::{MediaId, PlanId, RenderId};
use crate::job::JobError;

/// Aspect ratio expressed as `W:H`, e.g. `16:9`, `9:16`, `1:1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
pub struct AspectRatio {
    pub w: u32,
    pub h: u32,
}

/// Error parsing a `W:H` aspect-ratio string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid aspect ratio: {0}")]
pub struct AspectRatioParseError(pub String);

impl AspectRatio {
    pub const LANDSCAPE: AspectRatio = AspectRatio { w: 16, h: 9 };
    pub const PORTRAIT: AspectRatio = AspectRatio { w: 9, h: 16 };
    pub const SQUARE: AspectRatio = AspectRatio { w: 1, h: 1 };

    pub fn new(w: u32, h: u32) -> Result<Self, AspectRatioParseError> {
        if w == 0 || h == 0 {
            return Err(AspectRatioParseError(format!("{}:{}", w, h)));
        }
        Ok(Self { w, h })
    }

    /// Width / height as a float.
    pub fn as_f64(&self) -> f64 {
        self.w as f64 / self.h as f64
    }

    /// Compute the output frame `(W, H)` for this ratio.
    ///
    /// `reference_width` pins the shorter edge (1080 by default), so 16:9
    /// yields 1920x1080, 9:16 yields 1080x1920 and 1:1 yields 1080x1080.
    /// Dimensions are rounded to the nearest even number for yuv420p.
    pub fn target_frame(&self, reference_width: u32) -> (u32, u32) {
        let (w, h) = if self.w >= self.h {
            let w = reference_width as f64 * self.w as f64 / self.h as f64;
            (w, reference_width as f64)
        } else {
            let h = reference_width as f64 * self.h as f64 / self.w as f64;
            (reference_width as f64, h)
        };
        (round_even(w), round_even(h))
    }

    /// Canonical `W:H` form used as a blob key component (`16x9`).
    pub fn file_stem(&self) -> String {
        format!("{}x{}", self.w, self.h)
    }
}

fn round_even(v: f64) -> u32 {
    let n = v.round() as u32;
    if n % 2 == 0 {
        n
    } else {
        n + 1
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.w, self.h)
    }
}

impl FromStr for AspectRatio {
    type Err = AspectRatioParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(':')
            .ok_or_else(|| AspectRatioParseError(s.to_string()))?;
        let w: u32 = w
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError(s.to_string()))?;
        let h: u32 = h
            .trim()
            .parse()
            .map_err(|_| AspectRatioParseError(s.to_string()))?;
        AspectRatio::new(w, h)
    }
}

impl Serialize for AspectRatio {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AspectRatio {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Render status; same lattice as jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::Queued => "queued",
            RenderStatus::Running => "running",
            RenderStatus::Completed => "completed",
            RenderStatus::Failed => "failed",
            RenderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderStatus::Completed | RenderStatus::Failed | RenderStatus::Cancelled
        )
    }

    /// Same lattice as jobs: no transitions out of terminal states.
    pub fn can_transition_to(&self, next: RenderStatus) -> bool {
        matches!(
            (self, next),
            (RenderStatus::Queued, RenderStatus::Running)
                | (RenderStatus::Queued, RenderStatus::Cancelled)
                | (RenderStatus::Running, RenderStatus::Completed)
                | (RenderStatus::Running, RenderStatus::Failed)
                | (RenderStatus::Running, RenderStatus::Cancelled)
        )
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One rendered output for a `(plan, aspect_ratio)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Render {
    pub render_id: RenderId,
    pub media_id: MediaId,
    pub plan_id: PlanId,
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub status: RenderStatus,

    /// Readable only once status is Completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_uri: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,

    /// Measured output duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Render {
    pub fn new(media_id: MediaId, plan_id: PlanId, aspect_ratio: AspectRatio) -> Self {
        Self {
            render_id: RenderId::new(),
            media_id,
            plan_id,
            aspect_ratio,
            status: RenderStatus::Queued,
            output_uri: None,
            error: None,
            duration_seconds: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_ratios() {
        assert_eq!("16:9".parse::<AspectRatio>().unwrap(), AspectRatio::LANDSCAPE);
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::PORTRAIT);
        assert_eq!("1:1".parse::<AspectRatio>().unwrap(), AspectRatio::SQUARE);
        assert!("4x3".parse::<AspectRatio>().is_err());
        assert!("0:9".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn target_frames_pin_short_edge() {
        assert_eq!(AspectRatio::LANDSCAPE.target_frame(1080), (1920, 1080));
        assert_eq!(AspectRatio::PORTRAIT.target_frame(1080), (1080, 1920));
        assert_eq!(AspectRatio::SQUARE.target_frame(1080), (1080, 1080));
        // 4:3 at 1080 short edge -> 1440x1080
        let four_three = AspectRatio::new(4, 3).unwrap();
        assert_eq!(four_three.target_frame(1080), (1440, 1080));
    }

    #[test]
    fn frame_dimensions_are_even() {
        // 1080 * 16 / 9 is exact, but an odd reference must still round even
        let (w, h) = AspectRatio::LANDSCAPE.target_frame(721);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
        assert_eq!(h, 722);
    }

    #[test]
    fn serde_uses_colon_form() {
        let json = serde_json::to_string(&AspectRatio::PORTRAIT).unwrap();
        assert_eq!(json, "\"9:16\"");
        let back: AspectRatio = serde_json::from_str("\"16:9\"").unwrap();
        assert_eq!(back, AspectRatio::LANDSCAPE);
    }
}
