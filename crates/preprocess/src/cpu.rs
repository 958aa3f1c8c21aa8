use crate::config::{PadAlignment, PreprocessConfig};
use crate::tensor::ImageTensor;
use crate::transform::TransformRecord;
use crate::{Preprocess, PreprocessError, PreprocessResult};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::Array3;
use schema::RawImage;
use std::borrow::Cow;

#[derive(Debug, Clone, Default)]
pub struct CpuPreProcessor {
    config: PreprocessConfig,
}

impl CpuPreProcessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Aspect-preserving fit of `width x height` into the canvas.
    fn fit(&self, width: u32, height: u32) -> TransformRecord {
        let (input_width, input_height) = self.config.input_size();
        let scale = (input_width as f32 / width as f32).min(input_height as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, input_width);
        let new_height = ((height as f32 * scale) as u32).clamp(1, input_height);

        let (offset_x, offset_y) = match self.config.pad {
            PadAlignment::Center => ((input_width - new_width) / 2, (input_height - new_height) / 2),
            PadAlignment::TopLeft => (0, 0),
        };

        TransformRecord {
            orig_width: width,
            orig_height: height,
            input_width,
            input_height,
            resized_width: new_width,
            resized_height: new_height,
            scale_x: new_width as f32 / width as f32,
            scale_y: new_height as f32 / height as f32,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        }
    }

    fn resize_and_pad(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(TransformRecord, Vec<u8>), PreprocessError> {
        let _s = span!("resize_and_pad");

        let transform = self.fit(width, height);
        let new_width = transform.resized_width;
        let new_height = transform.resized_height;

        let src = ImageRef::new(width, height, rgb, PixelType::U8x3)
            .map_err(|e| PreprocessError::Resize(e.to_string()))?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new()
            .resize(
                &src,
                &mut resized,
                &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
            )
            .map_err(|e| PreprocessError::Resize(e.to_string()))?;

        let mut canvas = vec![
            self.config.pad_pixel();
            (transform.input_width * transform.input_height * 3) as usize
        ];

        let resized_data = resized.buffer();
        let stride = transform.input_width * 3;
        let row_len = (new_width * 3) as usize;
        let (offset_x, offset_y) = (transform.offset_x as u32, transform.offset_y as u32);

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;
            canvas[dst_row..dst_row + row_len]
                .copy_from_slice(&resized_data[src_row..src_row + row_len]);
        }

        Ok((transform, canvas))
    }

    fn normalize(&self, canvas: &[u8], width: u32, height: u32) -> Result<ImageTensor, PreprocessError> {
        let _s = span!("normalize");

        let (width, height) = (width as usize, height as usize);
        let spatial = width * height;
        let mean = self.config.mean;
        let std = self.config.std;
        // Output plane -> source channel
        let order: [usize; 3] = if self.config.to_bgr { [2, 1, 0] } else { [0, 1, 2] };

        let mut output = vec![0.0f32; 3 * spatial];
        for (i, px) in canvas.chunks_exact(3).enumerate() {
            for (plane, &c) in order.iter().enumerate() {
                output[i + plane * spatial] = (px[c] as f32 / 255.0 - mean[c]) / std[c];
            }
        }

        Ok(ImageTensor::new(Array3::from_shape_vec(
            (3, height, width),
            output,
        )?))
    }
}

/// Replicate a single-channel buffer into interleaved RGB.
fn gray_to_rgb(gray: &[u8]) -> Vec<u8> {
    gray.iter().flat_map(|&v| [v, v, v]).collect()
}

impl Preprocess for CpuPreProcessor {
    fn preprocess(&self, image: &RawImage) -> Result<PreprocessResult, PreprocessError> {
        let _s = span!("preprocess_image", width = image.width, height = image.height);

        image.validate()?;

        let rgb: Cow<'_, [u8]> = match image.channels {
            1 => Cow::Owned(gray_to_rgb(&image.pixels)),
            _ => Cow::Borrowed(&image.pixels),
        };

        let (transform, canvas) = self.resize_and_pad(&rgb, image.width, image.height)?;
        let tensor = self.normalize(&canvas, transform.input_width, transform.input_height)?;

        tracing::trace!(
            scale_x = transform.scale_x,
            scale_y = transform.scale_y,
            offset_x = transform.offset_x,
            offset_y = transform.offset_y,
            "Image preprocessed"
        );

        Ok(PreprocessResult { tensor, transform })
    }

    fn input_size(&self) -> (u32, u32) {
        self.config.input_size()
    }
}
