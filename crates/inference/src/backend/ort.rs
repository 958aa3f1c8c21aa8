use super::{FeatureBackbone, FeatureMaps, ProposalNetwork, RefinementStage, RegionProposal};
use crate::architecture::{ArchitectureConfig, BackgroundPosition, GraphConfig};
use crate::config::ExecutionProvider;
use crate::detector::StagePrediction;
use crate::errors::{DetectError, LoadError};
use ndarray::{Array2, ArrayD, Axis, Ix2};
use ort::{
    session::{Session, SessionInputValue, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use preprocess::ImageTensor;
use schema::BoundingBox;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

type Inputs<'v> = Vec<(Cow<'v, str>, SessionInputValue<'v>)>;

fn backend_err(e: ort::Error) -> DetectError {
    DetectError::Backend(e.to_string())
}

/// One ONNX graph. `Session::run` needs exclusive access, so concurrent
/// requests serialize per graph.
pub struct OrtGraph {
    session: Mutex<Session>,
    path: PathBuf,
}

impl OrtGraph {
    /// Load a graph with the given execution provider.
    pub fn load(
        path: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> Result<Self, LoadError> {
        if !path.is_file() {
            return Err(LoadError::MissingResource(path.to_path_buf()));
        }

        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let runtime = |e: ort::Error| LoadError::Runtime(format!("{}: {e}", path.display()));

        let mut builder = Session::builder()
            .map_err(runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime)?
            .with_intra_threads(intra_threads)
            .map_err(runtime)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder
                    .with_execution_providers([
                        ort::execution_providers::CUDAExecutionProvider::default()
                            .with_device_id(0)
                            .build()
                            .error_on_failure(),
                    ])
                    .map_err(runtime)?;
            }
            ExecutionProvider::Cpu => {
                tracing::debug!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder.commit_from_file(path).map_err(runtime)?;

        tracing::info!(path = %path.display(), "Graph loaded");
        Ok(Self {
            session: Mutex::new(session),
            path: path.to_path_buf(),
        })
    }

    /// Run the graph and copy the named outputs out of the session.
    fn run(&self, inputs: Inputs<'_>, outputs: &[&str]) -> Result<Vec<ArrayD<f32>>, DetectError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectError::Backend(format!("{} session poisoned", self.path.display())))?;

        let results = session.run(inputs).map_err(backend_err)?;

        outputs
            .iter()
            .map(|name| {
                let value = results.get(*name).ok_or_else(|| {
                    DetectError::shape(format!("{} has no output {name:?}", self.path.display()))
                })?;
                let array = value.try_extract_array::<f32>().map_err(backend_err)?;
                Ok(array.into_owned())
            })
            .collect()
    }
}

fn feature_inputs<'v>(features: &'v FeatureMaps, names: &'v [String]) -> Result<Inputs<'v>, DetectError> {
    features
        .ordered(names)?
        .into_iter()
        .map(|(name, map)| {
            let tensor = TensorRef::from_array_view(map.view()).map_err(backend_err)?;
            Ok((Cow::Borrowed(name), SessionInputValue::from(tensor)))
        })
        .collect()
}

fn into_2d(array: ArrayD<f32>, what: &str) -> Result<Array2<f32>, DetectError> {
    // Accept an optional leading batch axis of size 1
    let array = if array.ndim() == 3 && array.shape()[0] == 1 {
        array.index_axis_move(Axis(0), 0)
    } else {
        array
    };
    array
        .into_dimensionality::<Ix2>()
        .map_err(|e| DetectError::shape(format!("{what}: {e}")))
}

pub struct OrtBackbone {
    graph: OrtGraph,
    image_input: String,
    features: Vec<String>,
}

impl FeatureBackbone for OrtBackbone {
    fn extract(&self, image: &ImageTensor) -> Result<FeatureMaps, DetectError> {
        let tensor = TensorRef::from_array_view(image.batched()).map_err(backend_err)?;
        let inputs: Inputs<'_> = vec![(
            Cow::Borrowed(self.image_input.as_str()),
            SessionInputValue::from(tensor),
        )];

        let names: Vec<&str> = self.features.iter().map(String::as_str).collect();
        let outputs = self.graph.run(inputs, &names)?;

        let mut maps = FeatureMaps::new();
        for (name, map) in self.features.iter().zip(outputs) {
            maps.push(name.clone(), map);
        }
        Ok(maps)
    }
}

pub struct OrtProposalNetwork {
    graph: OrtGraph,
    features: Vec<String>,
    boxes_output: String,
    scores_output: String,
}

impl ProposalNetwork for OrtProposalNetwork {
    fn propose(&self, features: &FeatureMaps) -> Result<Vec<RegionProposal>, DetectError> {
        let inputs = feature_inputs(features, &self.features)?;
        let mut outputs = self
            .graph
            .run(inputs, &[self.boxes_output.as_str(), self.scores_output.as_str()])?
            .into_iter();

        let (Some(boxes), Some(scores)) = (outputs.next(), outputs.next()) else {
            return Err(DetectError::shape("proposal graph returned too few outputs"));
        };

        let boxes = into_2d(boxes, "proposal boxes")?;
        let scores: Vec<f32> = scores.iter().copied().collect();
        if boxes.ncols() != 4 || boxes.nrows() != scores.len() {
            return Err(DetectError::shape(format!(
                "proposal boxes {:?} do not match {} objectness scores",
                boxes.dim(),
                scores.len()
            )));
        }

        Ok(boxes
            .rows()
            .into_iter()
            .zip(scores)
            .map(|(b, objectness)| RegionProposal {
                bbox: BoundingBox::new(b[0], b[1], b[2], b[3]),
                objectness,
            })
            .collect())
    }
}

pub struct OrtStage {
    graph: OrtGraph,
    features: Vec<String>,
    rois_input: String,
    cls_output: String,
    bbox_output: String,
    background: BackgroundPosition,
}

impl RefinementStage for OrtStage {
    fn refine(
        &self,
        regions: &[BoundingBox],
        features: &FeatureMaps,
    ) -> Result<StagePrediction, DetectError> {
        // [N, 5]: batch index followed by corners
        let rois = Array2::from_shape_fn((regions.len(), 5), |(i, j)| match j {
            0 => 0.0,
            1 => regions[i].x_min,
            2 => regions[i].y_min,
            3 => regions[i].x_max,
            _ => regions[i].y_max,
        });

        let mut inputs = feature_inputs(features, &self.features)?;
        inputs.push((
            Cow::Borrowed(self.rois_input.as_str()),
            SessionInputValue::from(TensorRef::from_array_view(rois.view()).map_err(backend_err)?),
        ));

        let mut outputs = self
            .graph
            .run(inputs, &[self.cls_output.as_str(), self.bbox_output.as_str()])?
            .into_iter();
        let (Some(logits), Some(deltas)) = (outputs.next(), outputs.next()) else {
            return Err(DetectError::shape("stage graph returned too few outputs"));
        };

        Ok(StagePrediction::from_logits(
            regions.to_vec(),
            into_2d(logits, "class logits")?,
            into_2d(deltas, "box offsets")?,
            self.background,
        ))
    }
}

/// Backbone, proposal network and stage heads for one checkpoint directory.
pub struct OrtGraphs {
    pub backbone: OrtBackbone,
    pub proposals: OrtProposalNetwork,
    pub stages: Vec<OrtStage>,
}

impl OrtGraphs {
    /// Load every graph `arch` names from `checkpoint_dir`.
    ///
    /// All files are checked before any session is created, so a missing
    /// graph is reported without initializing the runtime.
    pub fn load(
        arch: &ArchitectureConfig,
        checkpoint_dir: &Path,
        provider: ExecutionProvider,
        intra_threads: usize,
    ) -> Result<Self, LoadError> {
        let graphs: &GraphConfig = &arch.graphs;
        let files: Vec<PathBuf> = [&graphs.backbone, &graphs.rpn]
            .into_iter()
            .chain(arch.stages.iter().map(|s| &s.graph))
            .map(|name| checkpoint_dir.join(name))
            .collect();
        if let Some(missing) = files.iter().find(|p| !p.is_file()) {
            return Err(LoadError::MissingResource(missing.clone()));
        }

        let load = |path: &Path| OrtGraph::load(path, provider, intra_threads);

        let backbone = OrtBackbone {
            graph: load(&files[0])?,
            image_input: graphs.image_input.clone(),
            features: graphs.features.clone(),
        };
        let proposals = OrtProposalNetwork {
            graph: load(&files[1])?,
            features: graphs.features.clone(),
            boxes_output: graphs.proposal_boxes.clone(),
            scores_output: graphs.proposal_scores.clone(),
        };
        let stages = files[2..]
            .iter()
            .map(|path| {
                Ok(OrtStage {
                    graph: load(path)?,
                    features: graphs.features.clone(),
                    rois_input: graphs.rois_input.clone(),
                    cls_output: graphs.cls_output.clone(),
                    bbox_output: graphs.bbox_output.clone(),
                    background: arch.background,
                })
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        Ok(Self {
            backbone,
            proposals,
            stages,
        })
    }
}
