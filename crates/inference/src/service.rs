use crate::{
    artifact::ModelArtifact,
    config::InferenceConfig,
    errors::{DetectError, LoadError},
    tables::group_tables,
};
use common::span;
use once_cell::sync::OnceCell;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use schema::{Detection, Page, RawImage};
use std::sync::Arc;
use std::time::Instant;

type Loader = Box<dyn Fn() -> Result<ModelArtifact, LoadError> + Send + Sync>;

struct ServiceMetrics {
    duration: Histogram<f64>,
    requests: Counter<u64>,
    failures: Counter<u64>,
    detections: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> ServiceMetrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 1.5, 2.0, 5.0,
    ];
    ServiceMetrics {
        duration: meter
            .f64_histogram("inference_duration_seconds")
            .with_description("Time to process a single image (preprocess + cascade + postprocess)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        requests: meter
            .u64_counter("inference_requests_total")
            .with_description("Total detection requests")
            .build(),
        failures: meter
            .u64_counter("inference_failures_total")
            .with_description("Detection requests that returned an error")
            .build(),
        detections: meter
            .u64_counter("inference_detections_total")
            .with_description("Total detections produced")
            .build(),
    }
}

/// Request-facing entry point. Holds at most one loaded model, loaded once
/// and shared read-only by every request afterwards.
pub struct InferenceService {
    artifact: OnceCell<ModelArtifact>,
    loader: Option<Loader>,
    metrics: ServiceMetrics,
}

impl InferenceService {
    /// Service whose model is produced by `loader` on [`load`](Self::load).
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<ModelArtifact, LoadError> + Send + Sync + 'static,
    {
        Self {
            artifact: OnceCell::new(),
            loader: Some(Box::new(loader)),
            metrics: init_metrics("table_inference"),
        }
    }

    /// Service around an already built artifact.
    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            artifact: OnceCell::with_value(artifact),
            loader: None,
            metrics: init_metrics("table_inference"),
        }
    }

    /// Service loading ONNX graphs as described by `config`. Unless
    /// `lazy_load` is set the model is loaded before returning.
    #[cfg(feature = "ort-backend")]
    pub fn start(config: &crate::config::ServiceConfig) -> Result<Self, LoadError> {
        let cfg = config.clone();
        let service = Self::new(move || {
            crate::artifact::load_model(
                &cfg.model_config_path,
                &cfg.checkpoint_path,
                cfg.execution_provider,
                cfg.intra_threads,
            )
        });

        if !config.lazy_load {
            service.load()?;
        }
        Ok(service)
    }

    /// Load the model if it is not loaded yet.
    ///
    /// Concurrent callers block until the single in-flight load finishes. A
    /// failed load leaves the service unloaded, so a later call tries again.
    pub fn load(&self) -> Result<&ModelArtifact, LoadError> {
        self.artifact.get_or_try_init(|| {
            let loader = self
                .loader
                .as_ref()
                .ok_or_else(|| LoadError::Runtime("no model loader configured".into()))?;

            let _s = span!("load_model");
            let start = Instant::now();
            match loader() {
                Ok(artifact) => {
                    tracing::info!(
                        model = %artifact.architecture().name,
                        labels = artifact.labels().len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Model loaded"
                    );
                    Ok(artifact)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Model load failed");
                    Err(e)
                }
            }
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.artifact.get().is_some()
    }

    pub fn artifact(&self) -> Option<&ModelArtifact> {
        self.artifact.get()
    }

    /// Detect tables and cells in `image`. Fails with `ModelNotLoaded` until
    /// [`load`](Self::load) has succeeded.
    pub fn detect(
        &self,
        image: &RawImage,
        config: &InferenceConfig,
    ) -> Result<Vec<Detection>, DetectError> {
        let artifact = self.artifact.get().ok_or(DetectError::ModelNotLoaded)?;
        self.run(artifact, image, config)
    }

    /// Like [`detect`](Self::detect), loading the model on first use.
    pub fn detect_or_load(
        &self,
        image: &RawImage,
        config: &InferenceConfig,
    ) -> Result<Vec<Detection>, DetectError> {
        let artifact = self.load().map_err(|_| DetectError::ModelNotLoaded)?;
        self.run(artifact, image, config)
    }

    /// Run [`detect_or_load`](Self::detect_or_load) on the blocking pool.
    ///
    /// Dropping the returned future abandons the result; the request holds
    /// no shared state besides the read-only artifact.
    pub async fn detect_async(
        self: Arc<Self>,
        image: RawImage,
        config: InferenceConfig,
    ) -> Result<Vec<Detection>, DetectError> {
        tokio::task::spawn_blocking(move || self.detect_or_load(&image, &config))
            .await
            .map_err(|e| DetectError::Backend(format!("inference task failed: {e}")))?
    }

    /// Detect and group the result into tables for page `page_num`.
    pub fn detect_page(
        &self,
        image: &RawImage,
        config: &InferenceConfig,
        page_num: u32,
    ) -> Result<Page, DetectError> {
        let artifact = self.artifact.get().ok_or(DetectError::ModelNotLoaded)?;
        let detections = self.run(artifact, image, config)?;
        Ok(group_tables(
            &detections,
            &artifact.architecture().layout,
            page_num,
            image.width,
            image.height,
        ))
    }

    fn run(
        &self,
        artifact: &ModelArtifact,
        image: &RawImage,
        config: &InferenceConfig,
    ) -> Result<Vec<Detection>, DetectError> {
        let _s = span!("detect", width = image.width, height = image.height);
        let start = Instant::now();
        self.metrics.requests.add(1, &[]);

        let result = artifact.detect(image, config);

        match &result {
            Ok(detections) => {
                self.metrics
                    .duration
                    .record(start.elapsed().as_secs_f64(), &[]);
                self.metrics.detections.add(detections.len() as u64, &[]);
                tracing::debug!(detections = detections.len(), "Image processed");
            }
            Err(e) => {
                self.metrics
                    .failures
                    .add(1, &[KeyValue::new("kind", e.kind().as_str())]);
                if matches!(e, DetectError::InvalidImage(_) | DetectError::InvalidConfiguration(_)) {
                    tracing::warn!(error = %e, "Request rejected");
                } else {
                    tracing::error!(error = %e, "Detection failed");
                }
            }
        }

        result
    }
}
