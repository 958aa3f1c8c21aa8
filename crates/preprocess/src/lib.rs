pub mod config;
pub mod cpu;
pub mod tensor;
pub mod transform;

use schema::{ImageError, RawImage};
use thiserror::Error;

pub use config::{DEFAULT_INPUT_SIZE, PadAlignment, PreprocessConfig};
pub use cpu::CpuPreProcessor;
pub use tensor::ImageTensor;
pub use transform::TransformRecord;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Result of preprocessing: the network input plus what is needed to map
/// boxes back onto the source image.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    pub tensor: ImageTensor,
    pub transform: TransformRecord,
}

/// Image preprocessing implementations.
///
/// Implementations hold no per-request state, so a single instance can serve
/// concurrent callers.
pub trait Preprocess: Send + Sync {
    /// Convert `image` into the fixed-shape tensor the network expects.
    ///
    /// Deterministic: the same image always yields the same tensor.
    fn preprocess(&self, image: &RawImage) -> Result<PreprocessResult, PreprocessError>;

    /// Canvas size `(width, height)` this preprocessor targets.
    fn input_size(&self) -> (u32, u32);
}
