use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image has zero extent ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },

    #[error("Unsupported channel depth {0} (expected 1 or 3)")]
    UnsupportedChannels(u8),

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },
}

/// In-memory interleaved 8-bit pixel buffer (HWC).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl RawImage {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            pixels,
        }
    }

    /// Solid image, mostly useful for tests and warm-up requests.
    pub fn filled(width: u32, height: u32, channels: u8, value: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self::new(width, height, channels, vec![value; len])
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    pub fn validate(&self) -> Result<(), ImageError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageError::ZeroDimension {
                width: self.width,
                height: self.height,
            });
        }
        if !matches!(self.channels, 1 | 3) {
            return Err(ImageError::UnsupportedChannels(self.channels));
        }
        let expected = self.expected_len();
        if self.pixels.len() != expected {
            return Err(ImageError::BufferSizeMismatch {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }
}

impl From<&DynamicImage> for RawImage {
    /// Grayscale sources stay single-channel, everything else becomes RGB8.
    fn from(img: &DynamicImage) -> Self {
        match img {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA16(_) => {
                let gray = img.to_luma8();
                Self::new(gray.width(), gray.height(), 1, gray.into_raw())
            }
            _ => {
                let rgb = img.to_rgb8();
                Self::new(rgb.width(), rgb.height(), 3, rgb.into_raw())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbaImage};

    #[test]
    fn test_validate_accepts_gray_and_rgb() {
        assert!(RawImage::filled(4, 3, 1, 0).validate().is_ok());
        assert!(RawImage::filled(4, 3, 3, 0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_extent() {
        let img = RawImage::new(0, 100, 3, vec![]);
        assert_eq!(
            img.validate(),
            Err(ImageError::ZeroDimension {
                width: 0,
                height: 100
            })
        );
    }

    #[test]
    fn test_validate_rejects_unsupported_channels() {
        let img = RawImage::filled(2, 2, 4, 0);
        assert_eq!(img.validate(), Err(ImageError::UnsupportedChannels(4)));
    }

    #[test]
    fn test_validate_rejects_short_buffer() {
        let img = RawImage::new(10, 10, 3, vec![0; 200]);
        assert_eq!(
            img.validate(),
            Err(ImageError::BufferSizeMismatch {
                expected: 300,
                actual: 200
            })
        );
    }

    #[test]
    fn test_from_dynamic_image() {
        let gray = DynamicImage::ImageLuma8(GrayImage::new(5, 2));
        let raw = RawImage::from(&gray);
        assert_eq!((raw.width, raw.height, raw.channels), (5, 2, 1));
        assert_eq!(raw.pixels.len(), 10);

        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(3, 3));
        let raw = RawImage::from(&rgba);
        assert_eq!(raw.channels, 3);
        assert_eq!(raw.pixels.len(), 27);
    }
}
