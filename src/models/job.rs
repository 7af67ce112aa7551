use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported output shapes. Each label maps to one fixed pixel size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "16:9")]
    Landscape16x9,
    #[serde(rename = "9:16")]
    Portrait9x16,
    #[serde(rename = "4:3")]
    Landscape4x3,
    #[serde(rename = "3:4")]
    Portrait3x4,
    #[serde(rename = "3:2")]
    Landscape3x2,
    #[serde(rename = "2:3")]
    Portrait2x3,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 7] = [
        AspectRatio::Square,
        AspectRatio::Landscape16x9,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape3x2,
        AspectRatio::Portrait2x3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape3x2 => "3:2",
            AspectRatio::Portrait2x3 => "2:3",
        }
    }

    /// `(width, height)` in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1328, 1328),
            AspectRatio::Landscape16x9 => (1024, 768),
            AspectRatio::Portrait9x16 => (928, 1664),
            AspectRatio::Landscape4x3 => (1472, 1140),
            AspectRatio::Portrait3x4 => (1140, 1472),
            AspectRatio::Landscape3x2 => (1584, 1056),
            AspectRatio::Portrait2x3 => (1056, 1584),
        }
    }

    pub fn labels() -> Vec<&'static str> {
        Self::ALL.iter().map(AspectRatio::as_str).collect()
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|ratio| ratio.as_str() == s)
            .ok_or(())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Where the finished image goes. `key` is only set when the caller chose one.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageTarget {
    pub bucket: String,
    pub key: Option<String>,
    pub region: String,
    pub credentials: Credentials,
}

/// A fully specified generation job. Built once by the resolver and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJob {
    pub prompt: String,
    pub composed_prompt: String,
    pub negative_prompt: String,
    pub aspect_ratio: AspectRatio,
    pub width: u32,
    pub height: u32,
    pub inference_steps: u32,
    pub guidance_scale: f64,
    pub seed: u32,
    pub storage: StorageTarget,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip_through_from_str() {
        for label in AspectRatio::labels() {
            let ratio: AspectRatio = label.parse().unwrap();
            assert_eq!(ratio.as_str(), label);
        }
        assert!("5:4".parse::<AspectRatio>().is_err());
        assert!("16x9".parse::<AspectRatio>().is_err());
    }

    #[test]
    fn test_default_is_sixteen_by_nine() {
        assert_eq!(AspectRatio::default().dimensions(), (1024, 768));
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let creds = Credentials {
            access_key_id: "AKIA".into(),
            secret_access_key: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }
}
