use schema::BoundingBox;

/// Largest |dw|, |dh| accepted when decoding: ln(1000 / 16).
pub const MAX_LOG_RATIO: f32 = 4.135_166_6;

/// Decodes normalized `(dx, dy, dw, dh)` offsets against reference boxes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaBoxCoder {
    pub means: [f32; 4],
    pub stds: [f32; 4],
}

impl DeltaBoxCoder {
    pub fn new(means: [f32; 4], stds: [f32; 4]) -> Self {
        Self { means, stds }
    }

    /// Apply one offset set to `reference`, clipping to `[0, max_w] x [0, max_h]`.
    pub fn decode(
        &self,
        reference: &BoundingBox,
        deltas: &[f32],
        max_w: f32,
        max_h: f32,
    ) -> BoundingBox {
        let dx = deltas[0] * self.stds[0] + self.means[0];
        let dy = deltas[1] * self.stds[1] + self.means[1];
        let dw = (deltas[2] * self.stds[2] + self.means[2]).clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO);
        let dh = (deltas[3] * self.stds[3] + self.means[3]).clamp(-MAX_LOG_RATIO, MAX_LOG_RATIO);

        let (px, py) = reference.center();
        let pw = reference.x_max - reference.x_min;
        let ph = reference.y_max - reference.y_min;

        let gx = px + pw * dx;
        let gy = py + ph * dy;
        let gw = pw * dw.exp();
        let gh = ph * dh.exp();

        BoundingBox::from_cxcywh(gx, gy, gw, gh).clamp_to(max_w, max_h)
    }
}

impl Default for DeltaBoxCoder {
    fn default() -> Self {
        Self::new([0.0; 4], [0.1, 0.1, 0.2, 0.2])
    }
}
