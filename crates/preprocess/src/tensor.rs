use ndarray::{Array3, ArrayView4, Axis};

/// Normalized network input for one request, channel-first `[C, H, W]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Array3<f32>,
}

impl ImageTensor {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }

    pub fn channels(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn width(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    /// `[1, C, H, W]` view for runtimes that expect a batch axis.
    pub fn batched(&self) -> ArrayView4<'_, f32> {
        self.data.view().insert_axis(Axis(0))
    }
}
