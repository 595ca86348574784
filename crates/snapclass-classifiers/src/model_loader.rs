//! Candle-backed pipeline factory
//!
//! Downloads weights and `config.json` from the Hugging Face Hub and builds
//! MobileNetV4 image classifiers. This is the only module that touches
//! Candle or hf-hub.

use crate::class_labels::ClassLabels;
use crate::classifier::{ClassifyOptions, ImagePipeline, PipelineFactory, Task};
use crate::config::{ClassifierConfig, DeviceType};
use crate::preprocess::image_to_tensor;
use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Module, D};
use candle_nn::{Func, VarBuilder};
use candle_transformers::models::mobilenetv4;
use hf_hub::api::sync::ApiBuilder;
use hf_hub::{Repo, RepoType};
use snapclass_core::{Error, ImageInput, Prediction, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const WEIGHTS_FILE: &str = "model.safetensors";
const CONFIG_FILE: &str = "config.json";
const IMAGENET_CLASSES: usize = 1000;

/// Supported model families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    MobileNetV4Small,
    MobileNetV4Medium,
    MobileNetV4Large,
    MobileNetV4HybridMedium,
    MobileNetV4HybridLarge,
}

impl Architecture {
    /// Infer the architecture from a hub model identifier
    pub fn from_model_id(model_id: &str) -> Option<Self> {
        let name = crate::service::model_short_name(model_id).to_ascii_lowercase();
        let arch = if name.starts_with("mobilenetv4_conv_small") {
            Self::MobileNetV4Small
        } else if name.starts_with("mobilenetv4_conv_medium") {
            Self::MobileNetV4Medium
        } else if name.starts_with("mobilenetv4_conv_large") {
            Self::MobileNetV4Large
        } else if name.starts_with("mobilenetv4_hybrid_medium") {
            Self::MobileNetV4HybridMedium
        } else if name.starts_with("mobilenetv4_hybrid_large") {
            Self::MobileNetV4HybridLarge
        } else {
            return None;
        };
        Some(arch)
    }

    /// Input resolution the pretrained weights expect
    pub fn default_resolution(&self) -> usize {
        match self {
            Self::MobileNetV4Small => 224,
            Self::MobileNetV4Medium | Self::MobileNetV4HybridMedium => 256,
            Self::MobileNetV4Large | Self::MobileNetV4HybridLarge => 384,
        }
    }

    fn config(&self) -> mobilenetv4::Config {
        match self {
            Self::MobileNetV4Small => mobilenetv4::Config::small(),
            Self::MobileNetV4Medium => mobilenetv4::Config::medium(),
            Self::MobileNetV4Large => mobilenetv4::Config::large(),
            Self::MobileNetV4HybridMedium => mobilenetv4::Config::hybrid_medium(),
            Self::MobileNetV4HybridLarge => mobilenetv4::Config::hybrid_large(),
        }
    }
}

/// Resolution encoded in timm tags such as `e2400_r224_in1k`
pub fn resolution_from_model_id(model_id: &str) -> Option<usize> {
    model_short_tag_parts(model_id)
        .filter_map(|part| part.strip_prefix('r'))
        .find_map(|digits| digits.parse().ok())
}

fn model_short_tag_parts(model_id: &str) -> impl Iterator<Item = &str> {
    let name = crate::service::model_short_name(model_id);
    let tag = name.split_once('.').map(|(_, tag)| tag).unwrap_or("");
    tag.split('_')
}

/// Builds Candle pipelines from hub models
pub struct CandlePipelineFactory {
    device: DeviceType,
    revision: String,
    cache_dir: PathBuf,
}

impl CandlePipelineFactory {
    pub fn new(device: DeviceType, revision: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            device,
            revision: revision.into(),
            cache_dir: cache_dir.into(),
        }
    }

    /// Create a factory from classifier configuration
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let cache_dir = config.cache_dir.clone().unwrap_or_else(default_cache_dir);
        Self::new(config.device.to_device_type(), config.revision.clone(), cache_dir)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[async_trait]
impl PipelineFactory for CandlePipelineFactory {
    async fn load(&self, task: Task, model_id: &str) -> Result<Arc<dyn ImagePipeline>> {
        match task {
            Task::ImageClassification => {}
        }

        let model_id = model_id.to_string();
        let revision = self.revision.clone();
        let cache_dir = self.cache_dir.clone();
        let device = self.device;

        let pipeline = tokio::task::spawn_blocking(move || {
            CandleImagePipeline::load(&model_id, &revision, &cache_dir, device)
        })
        .await
        .map_err(|e| Error::internal(format!("Model load task failed: {}", e)))??;

        Ok(Arc::new(pipeline))
    }
}

/// A loaded MobileNetV4 classifier
pub struct CandleImagePipeline {
    model_id: String,
    inner: Arc<LoadedModel>,
}

struct LoadedModel {
    model: Func<'static>,
    device: Device,
    resolution: usize,
    labels: ClassLabels,
}

impl CandleImagePipeline {
    /// Download (or reuse cached) files and build the network
    pub fn load(model_id: &str, revision: &str, cache_dir: &Path, device: DeviceType) -> Result<Self> {
        let arch = Architecture::from_model_id(model_id).ok_or_else(|| {
            Error::model_load(model_id, "unsupported architecture; expected a timm MobileNetV4 model")
        })?;

        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir.to_path_buf())
            .with_progress(false)
            .build()
            .map_err(|e| Error::model_load(model_id, format!("Failed to initialize HF API: {}", e)))?;

        let repo = api.repo(Repo::with_revision(
            model_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));

        tracing::debug!("Downloading {} for '{}'", WEIGHTS_FILE, model_id);
        let weights = repo
            .get(WEIGHTS_FILE)
            .map_err(|e| Error::model_load(model_id, format!("Failed to download weights: {}", e)))?;

        let model_config = match repo.get(CONFIG_FILE) {
            Ok(path) => read_json(&path),
            Err(e) => {
                tracing::warn!("No {} for '{}': {}", CONFIG_FILE, model_id, e);
                None
            }
        };

        let num_classes = model_config
            .as_ref()
            .and_then(ClassLabels::num_classes_in)
            .unwrap_or(IMAGENET_CLASSES);

        let labels = match model_config.as_ref().and_then(ClassLabels::from_model_config) {
            Some(labels) if labels.len() == num_classes => labels,
            Some(labels) => {
                tracing::warn!(
                    "'{}' declares {} classes but labels {}; using generic labels",
                    model_id,
                    num_classes,
                    labels.len()
                );
                ClassLabels::generic(num_classes)
            }
            None => ClassLabels::generic(num_classes),
        };

        let device = create_device(device).map_err(|e| Error::model_load(model_id, e.to_string()))?;

        // Safety: the weights file is owned by the hub cache and not modified
        // while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(|e| Error::model_load(model_id, format!("Failed to map weights: {}", e)))?;

        let model = mobilenetv4::mobilenetv4(&arch.config(), num_classes, vb)
            .map_err(|e| Error::model_load(model_id, format!("Failed to build network: {}", e)))?;

        let resolution = resolution_from_model_id(model_id).unwrap_or_else(|| arch.default_resolution());

        tracing::info!(
            "Built {:?} for '{}' ({} classes, {}px input)",
            arch,
            model_id,
            num_classes,
            resolution
        );

        Ok(Self {
            model_id: model_id.to_string(),
            inner: Arc::new(LoadedModel {
                model,
                device,
                resolution,
                labels,
            }),
        })
    }
}

impl LoadedModel {
    fn predict(&self, bytes: &[u8], top_k: usize) -> Result<Vec<Prediction>> {
        let input = image_to_tensor(bytes, self.resolution)?;
        let probabilities = self
            .forward(&input)
            .map_err(|e| Error::classification(format!("Inference failed: {}", e)))?;

        Ok(self.labels.rank(&probabilities, top_k))
    }

    fn forward(&self, input: &candle_core::Tensor) -> candle_core::Result<Vec<f32>> {
        let batch = input.to_device(&self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&batch)?;
        candle_nn::ops::softmax(&logits, D::Minus1)?
            .i(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()
    }
}

#[async_trait]
impl ImagePipeline for CandleImagePipeline {
    async fn invoke(&self, image: &ImageInput, options: ClassifyOptions) -> Result<Vec<Prediction>> {
        let model = Arc::clone(&self.inner);
        let bytes = image.bytes().clone();

        tokio::task::spawn_blocking(move || model.predict(&bytes, options.top_k))
            .await
            .map_err(|e| Error::classification(format!("Inference task failed: {}", e)))?
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Create Candle device from device type
fn create_device(device_type: DeviceType) -> Result<Device> {
    match device_type {
        DeviceType::Cpu => Ok(Device::Cpu),
        DeviceType::Cuda(idx) => Device::new_cuda(idx)
            .map_err(|e| Error::config(format!("Failed to create CUDA device: {}", e))),
        DeviceType::Metal(idx) => Device::new_metal(idx)
            .map_err(|e| Error::config(format!("Failed to create Metal device: {}", e))),
    }
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| tracing::warn!("Failed to read {}: {}", path.display(), e))
        .ok()?;
    serde_json::from_str(&content)
        .map_err(|e| tracing::warn!("Failed to parse {}: {}", path.display(), e))
        .ok()
}

/// Platform cache directory for downloaded models
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("snapclass")
        .join("models")
}
