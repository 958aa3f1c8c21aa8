use schema::BoundingBox;

/// Geometry of one resize + pad operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformRecord {
    pub orig_width: u32,
    pub orig_height: u32,
    pub input_width: u32,
    pub input_height: u32,
    /// Size of the image content on the canvas, before padding.
    pub resized_width: u32,
    pub resized_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl TransformRecord {
    /// Identity mapping for an image already at network resolution.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            orig_width: width,
            orig_height: height,
            input_width: width,
            input_height: height,
            resized_width: width,
            resized_height: height,
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Map a canvas-space box back onto the original image, clamped to its
    /// bounds.
    pub fn to_original(&self, b: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            (b.x_min - self.offset_x) / self.scale_x,
            (b.y_min - self.offset_y) / self.scale_y,
            (b.x_max - self.offset_x) / self.scale_x,
            (b.y_max - self.offset_y) / self.scale_y,
        )
        .clamp_to(self.orig_width as f32, self.orig_height as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 800x600 letterboxed into 512x512: scale 0.64, content 512x384,
    /// vertical offset 64.
    fn letterbox_800x600() -> TransformRecord {
        TransformRecord {
            orig_width: 800,
            orig_height: 600,
            input_width: 512,
            input_height: 512,
            resized_width: 512,
            resized_height: 384,
            scale_x: 0.64,
            scale_y: 0.64,
            offset_x: 0.0,
            offset_y: 64.0,
        }
    }

    #[test]
    fn test_inverse_transform_known_values() {
        let t = letterbox_800x600();
        let b = t.to_original(&BoundingBox::new(204.8, 204.8, 307.2, 307.2));
        assert!((b.x_min - 320.0).abs() < 0.1, "x_min {}", b.x_min);
        assert!((b.y_min - 220.0).abs() < 0.1, "y_min {}", b.y_min);
        assert!((b.x_max - 480.0).abs() < 0.1, "x_max {}", b.x_max);
        assert!((b.y_max - 380.0).abs() < 0.1, "y_max {}", b.y_max);
    }

    #[test]
    fn test_inverse_transform_clamps_into_image() {
        let t = letterbox_800x600();
        // Box covering the top padding band and beyond the right edge
        let b = t.to_original(&BoundingBox::new(-10.0, 0.0, 600.0, 500.0));
        assert_eq!(b.x_min, 0.0);
        assert_eq!(b.y_min, 0.0);
        assert_eq!(b.x_max, 800.0);
        assert_eq!(b.y_max, 600.0);
    }
}
