use crate::architecture::{ArchitectureConfig, LabelSet};
use crate::backend::{FeatureBackbone, ProposalNetwork, RefinementStage};
use crate::config::InferenceConfig;
use crate::detector::CascadedDetector;
use crate::errors::{DetectError, LoadError};
use crate::processing::post::PostProcessor;
use common::span;
use preprocess::{CpuPreProcessor, Preprocess, PreprocessResult};
use schema::{Detection, RawImage};

/// Everything needed to serve requests for one model. Immutable once built.
pub struct ModelArtifact {
    architecture: ArchitectureConfig,
    preprocessor: CpuPreProcessor,
    detector: CascadedDetector,
    postprocessor: PostProcessor,
}

impl ModelArtifact {
    pub fn new(
        architecture: ArchitectureConfig,
        backbone: Box<dyn FeatureBackbone>,
        proposals: Box<dyn ProposalNetwork>,
        stages: Vec<Box<dyn RefinementStage>>,
    ) -> Result<Self, LoadError> {
        architecture.validate()?;

        let detector = CascadedDetector::new(&architecture, backbone, proposals, stages)?;
        let preprocessor = CpuPreProcessor::new(architecture.input.clone());
        let postprocessor = PostProcessor::new(architecture.label_set());

        Ok(Self {
            architecture,
            preprocessor,
            detector,
            postprocessor,
        })
    }

    pub fn architecture(&self) -> &ArchitectureConfig {
        &self.architecture
    }

    pub fn labels(&self) -> &LabelSet {
        self.postprocessor.labels()
    }

    /// Full pipeline for one image: preprocess, cascade, post-process.
    pub fn detect(
        &self,
        image: &RawImage,
        config: &InferenceConfig,
    ) -> Result<Vec<Detection>, DetectError> {
        let params = config.resolve(&self.architecture.test)?;

        let PreprocessResult { tensor, transform } = self.preprocessor.preprocess(image)?;
        let prediction = self.detector.forward(&tensor)?;

        let _s = span!("postprocess", regions = prediction.len());
        self.postprocessor
            .process(&prediction, &self.detector.final_coder(), &transform, &params)
    }
}

/// Read the architecture JSON and load its graphs from `checkpoint_dir`.
#[cfg(feature = "ort-backend")]
pub fn load_model(
    config_path: &std::path::Path,
    checkpoint_dir: &std::path::Path,
    provider: crate::config::ExecutionProvider,
    intra_threads: usize,
) -> Result<ModelArtifact, LoadError> {
    use crate::backend::ort::OrtGraphs;

    let json = std::fs::read_to_string(config_path).map_err(|source| LoadError::Io {
        path: config_path.to_path_buf(),
        source,
    })?;
    let architecture = ArchitectureConfig::from_json(&json)?;

    if !checkpoint_dir.is_dir() {
        return Err(LoadError::MissingResource(checkpoint_dir.to_path_buf()));
    }

    tracing::info!(
        model = %architecture.name,
        stages = architecture.stages.len(),
        checkpoint = %checkpoint_dir.display(),
        "Loading model graphs"
    );

    let graphs = OrtGraphs::load(&architecture, checkpoint_dir, provider, intra_threads)?;
    let stages = graphs
        .stages
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn RefinementStage>)
        .collect();

    ModelArtifact::new(
        architecture,
        Box::new(graphs.backbone),
        Box::new(graphs.proposals),
        stages,
    )
}
