use serde::{Deserialize, Serialize};

/// `(width, height)` of the network canvas when the artifact does not say.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (1344, 800);

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Where the resized image sits on the padded canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PadAlignment {
    /// Letterbox: equal padding on both sides.
    Center,
    /// Padding only on the right and bottom edges.
    #[default]
    TopLeft,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub width: u32,
    pub height: u32,
    /// Per-channel mean in `[0, 1]` units, RGB order.
    pub mean: [f32; 3],
    /// Per-channel std in `[0, 1]` units, RGB order.
    pub std: [f32; 3],
    /// Emit channels in BGR order.
    pub to_bgr: bool,
    /// Pixel value in `[0, 255]` painted into the padding before
    /// normalization.
    pub pad_value: f32,
    pub pad: PadAlignment,
}

impl PreprocessConfig {
    pub fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "input size must be positive, got {}x{}",
                self.width, self.height
            ));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(format!("std must be finite and non-zero, got {:?}", self.std));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(format!("mean must be finite, got {:?}", self.mean));
        }
        if !(0.0..=255.0).contains(&self.pad_value) {
            return Err(format!("pad_value must be in [0, 255], got {}", self.pad_value));
        }
        Ok(())
    }

    /// Padding value as the 8-bit pixel written to the canvas.
    pub fn pad_pixel(&self) -> u8 {
        self.pad_value.round().clamp(0.0, 255.0) as u8
    }
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_INPUT_SIZE.0,
            height: DEFAULT_INPUT_SIZE.1,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            to_bgr: false,
            pad_value: 0.0,
            pad: PadAlignment::TopLeft,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PreprocessConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_std_and_size() {
        let cfg = PreprocessConfig {
            std: [0.2, 0.0, 0.2],
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("std"));

        let cfg = PreprocessConfig {
            width: 0,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().contains("input size"));
    }

    #[test]
    fn test_pad_value_range() {
        let cfg = PreprocessConfig {
            pad_value: 114.4,
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pad_pixel(), 114);

        for bad in [-1.0, 256.0, f32::NAN] {
            let cfg = PreprocessConfig {
                pad_value: bad,
                ..Default::default()
            };
            assert!(cfg.validate().unwrap_err().contains("pad_value"));
        }
    }
}
