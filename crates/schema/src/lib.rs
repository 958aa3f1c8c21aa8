//! Data types shared across the detection pipeline: input images, boxes,
//! detections and the page/table layout they are grouped into.

mod bbox;
mod detection;
mod image;
mod layout;

pub use bbox::{BoundingBox, PixelRect};
pub use detection::Detection;
pub use image::{ImageError, RawImage};
pub use layout::{Cell, Page, Table};
