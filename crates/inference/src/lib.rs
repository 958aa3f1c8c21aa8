//! Table and cell detection with a cascaded two-stage detector.
//!
//! [`InferenceService`] owns one [`ModelArtifact`] and runs each request
//! through preprocessing, the cascade and post-processing.

pub mod architecture;
pub mod artifact;
pub mod backend;
pub mod config;
pub mod detector;
pub mod errors;
pub mod logging;
pub mod processing;
pub mod service;
pub mod tables;

// Re-export commonly used types for convenience
pub use architecture::{ArchitectureConfig, LabelSet};
pub use artifact::ModelArtifact;
#[cfg(feature = "ort-backend")]
pub use artifact::load_model;
pub use config::{DetectionLimit, DetectionOrder, InferenceConfig, ServiceConfig};
pub use detector::{CascadedDetector, StagePrediction};
pub use errors::{DetectError, ErrorKind, LoadError};
pub use schema::{BoundingBox, Detection, Page, RawImage};
pub use service::InferenceService;
