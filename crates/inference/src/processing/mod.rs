pub mod box_coder;
pub mod nms;
pub mod post;
