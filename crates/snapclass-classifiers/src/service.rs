//! Model access service
//!
//! [`ClassifierService`] owns the one pipeline handle of the process. Loading
//! is lazy and single-flight: the first caller starts the load, every caller
//! arriving while it runs awaits the same shared future, and once it succeeds
//! the handle is memoized.
//!
//! If the active model fails to load, the service switches to the configured
//! fallback model and tries it exactly once. When that fails too the error is
//! returned and nothing retries automatically. The next call to
//! [`ClassifierService::get_classifier`] starts a fresh load from the active
//! model, which after a switch is the fallback.
//!
//! ```text
//! Unloaded -> Loading -> Ready
//!                |
//!                +-> LoadingFallback -> Ready
//!                |          |
//!                +----------+-> Failed -> (retry) Loading
//! ```

use crate::classifier::{ClassifyOptions, ImagePipeline, PipelineFactory, Task};
use crate::config::ClassifierConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use snapclass_core::{Error, ImageInput, LabelNormalizer, Prediction, Result};
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Where the service is in its load lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPhase {
    Unloaded,
    Loading,
    LoadingFallback,
    Ready,
    Failed,
}

/// Serializable snapshot of the service state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub phase: LoadPhase,
    /// Full identifier of the active model
    pub model_id: String,
    /// Short, human-readable model name
    pub model_name: String,
    /// Whether a load is in flight
    pub loading: bool,
    /// Reason of the last failed load, cleared on success
    pub last_error: Option<String>,
}

/// Load lifecycle notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelEvent {
    LoadStarted {
        model_id: String,
    },
    FallbackStarted {
        failed_model_id: String,
        model_id: String,
    },
    Loaded {
        model_id: String,
    },
    LoadFailed {
        model_id: String,
        reason: String,
    },
}

/// Why a load attempt failed; cloneable so every waiter gets a copy
#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub model_id: String,
    pub reason: String,
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.model_id, self.reason)
    }
}

impl From<LoadFailure> for Error {
    fn from(failure: LoadFailure) -> Self {
        Error::model_load(failure.model_id, failure.reason)
    }
}

type LoadOutcome = std::result::Result<Arc<dyn ImagePipeline>, LoadFailure>;
type LoadFuture = Shared<BoxFuture<'static, LoadOutcome>>;

/// Lazily loads one classification pipeline and runs images through it
///
/// Cloning is cheap; clones share the same state.
#[derive(Clone)]
pub struct ClassifierService {
    inner: Arc<ServiceInner>,
}

/// Non-owning handle to a [`ClassifierService`]
///
/// Does not keep the service, its loaded model or its event channel alive.
#[derive(Clone)]
pub struct WeakClassifierService {
    inner: Weak<ServiceInner>,
}

impl WeakClassifierService {
    pub fn upgrade(&self) -> Option<ClassifierService> {
        self.inner.upgrade().map(|inner| ClassifierService { inner })
    }
}

struct ServiceInner {
    config: ClassifierConfig,
    factory: Arc<dyn PipelineFactory>,
    normalizer: LabelNormalizer,
    state: Mutex<ServiceState>,
    events: broadcast::Sender<ModelEvent>,
}

struct ServiceState {
    handle: Option<Arc<dyn ImagePipeline>>,
    in_flight: Option<LoadFuture>,
    active_model_id: String,
    phase: LoadPhase,
    last_error: Option<String>,
}

impl ClassifierService {
    /// Create a service; nothing is loaded until first use
    pub fn new(config: ClassifierConfig, factory: Arc<dyn PipelineFactory>) -> Result<Self> {
        config.validate()?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = ServiceState {
            handle: None,
            in_flight: None,
            active_model_id: config.primary_model.clone(),
            phase: LoadPhase::Unloaded,
            last_error: None,
        };

        Ok(Self {
            inner: Arc::new(ServiceInner {
                config,
                factory,
                normalizer: LabelNormalizer::new()?,
                state: Mutex::new(state),
                events,
            }),
        })
    }

    /// Return the ready pipeline, loading it first if needed
    ///
    /// Concurrent callers share one load. A load keeps running even if every
    /// caller stops waiting for it.
    pub async fn get_classifier(&self) -> Result<Arc<dyn ImagePipeline>> {
        let load = {
            let mut state = self.inner.state.lock();
            if let Some(handle) = &state.handle {
                return Ok(Arc::clone(handle));
            }

            if let Some(load) = state.in_flight.clone() {
                debug!("Joining in-flight load of '{}'", state.active_model_id);
                load
            } else {
                self.start_load(&mut state)
            }
        };

        load.await.map_err(Error::from)
    }

    /// Start loading without waiting for the result
    ///
    /// Does nothing if the model is ready or a load is already running. The
    /// service is in the loading state when this returns.
    pub fn load_in_background(&self) {
        let mut state = self.inner.state.lock();
        if state.handle.is_none() && state.in_flight.is_none() {
            let _ = self.start_load(&mut state);
        }
    }

    /// Classify one image
    ///
    /// Returns at most `top_k` predictions with normalized labels, in the
    /// order the pipeline produced them.
    pub async fn classify_image(&self, image: &ImageInput) -> Result<Vec<Prediction>> {
        let pipeline = self.get_classifier().await?;
        let options = ClassifyOptions {
            top_k: self.inner.config.top_k,
        };

        let start = Instant::now();
        let raw = match pipeline.invoke(image, options).await {
            Ok(raw) => raw,
            Err(e) => {
                metrics::counter!("snapclass_classifications_total", "outcome" => "error")
                    .increment(1);
                error!("Error classifying image with '{}': {}", pipeline.model_id(), e);
                return Err(match e {
                    Error::Classification(_) | Error::InvalidImage(_) => e,
                    other => Error::classification(other.to_string()),
                });
            }
        };

        let latency_us = start.elapsed().as_micros() as f64;
        metrics::histogram!("snapclass_inference_latency_us").record(latency_us);
        metrics::counter!("snapclass_classifications_total", "outcome" => "success").increment(1);

        let predictions: Vec<Prediction> = raw
            .into_iter()
            .take(options.top_k)
            .map(|p| Prediction::new(self.inner.normalizer.normalize(&p.label), p.score))
            .collect();

        debug!(
            "Classified {} byte image in {:.1}ms, top: {:?}",
            image.len(),
            latency_us / 1000.0,
            predictions.first().map(|p| p.label.as_str())
        );

        Ok(predictions)
    }

    /// Short name of the active model (last path segment of its identifier)
    pub fn get_model_name(&self) -> String {
        model_short_name(&self.inner.state.lock().active_model_id).to_string()
    }

    /// Full identifier of the active model
    pub fn model_id(&self) -> String {
        self.inner.state.lock().active_model_id.clone()
    }

    /// Whether a load is currently in flight
    pub fn is_model_loading(&self) -> bool {
        self.inner.state.lock().in_flight.is_some()
    }

    pub fn status(&self) -> ModelStatus {
        let state = self.inner.state.lock();
        ModelStatus {
            phase: state.phase,
            model_id: state.active_model_id.clone(),
            model_name: model_short_name(&state.active_model_id).to_string(),
            loading: state.in_flight.is_some(),
            last_error: state.last_error.clone(),
        }
    }

    /// Subscribe to load lifecycle events
    ///
    /// The channel closes once every clone of the service is dropped.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.inner.events.subscribe()
    }

    pub fn downgrade(&self) -> WeakClassifierService {
        WeakClassifierService {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn start_load(&self, state: &mut ServiceState) -> LoadFuture {
        let model_id = state.active_model_id.clone();
        state.phase = LoadPhase::Loading;
        state.last_error = None;
        self.inner.publish(ModelEvent::LoadStarted {
            model_id: model_id.clone(),
        });

        // The state lock is held until `in_flight` is set, so the task
        // cannot settle before the future is visible to other callers. The
        // task settles the state itself, whether or not anyone awaits it.
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            match AssertUnwindSafe(inner.load_with_fallback(model_id))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let reason = format!("load panicked: {}", panic_message(panic.as_ref()));
                    Err(inner.settle_aborted(reason))
                }
            }
        });

        let inner = Arc::clone(&self.inner);
        let load = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(inner.settle_aborted(format!("load task aborted: {}", e))),
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(load.clone());
        load
    }
}

impl ServiceInner {
    async fn load_with_fallback(&self, model_id: String) -> LoadOutcome {
        let failure = match self.load_model(&model_id).await {
            Ok(pipeline) => return Ok(self.settle_ready(pipeline)),
            Err(failure) => failure,
        };

        let fallback = match &self.config.fallback_model {
            Some(fallback) if *fallback != model_id => fallback.clone(),
            _ => return Err(self.settle_failed(failure)),
        };

        warn!(
            "Model '{}' failed to load ({}), trying fallback '{}'",
            model_id, failure.reason, fallback
        );
        {
            let mut state = self.state.lock();
            state.active_model_id = fallback.clone();
            state.phase = LoadPhase::LoadingFallback;
            state.last_error = Some(failure.to_string());
        }
        self.publish(ModelEvent::FallbackStarted {
            failed_model_id: model_id,
            model_id: fallback.clone(),
        });

        match self.load_model(&fallback).await {
            Ok(pipeline) => Ok(self.settle_ready(pipeline)),
            Err(failure) => Err(self.settle_failed(failure)),
        }
    }

    async fn load_model(&self, model_id: &str) -> LoadOutcome {
        info!("Loading image classification model '{}'", model_id);
        let start = Instant::now();

        match self.factory.load(Task::ImageClassification, model_id).await {
            Ok(pipeline) => {
                metrics::counter!("snapclass_model_loads_total", "outcome" => "success")
                    .increment(1);
                info!(
                    "Model '{}' loaded in {:.2}s",
                    model_id,
                    start.elapsed().as_secs_f64()
                );
                Ok(pipeline)
            }
            Err(e) => {
                metrics::counter!("snapclass_model_loads_total", "outcome" => "failure")
                    .increment(1);
                error!("Error loading model '{}': {}", model_id, e);
                let reason = match e {
                    Error::ModelLoad { reason, .. } => reason,
                    other => other.to_string(),
                };
                Err(LoadFailure {
                    model_id: model_id.to_string(),
                    reason,
                })
            }
        }
    }

    fn settle_ready(&self, pipeline: Arc<dyn ImagePipeline>) -> Arc<dyn ImagePipeline> {
        let mut state = self.state.lock();
        state.handle = Some(Arc::clone(&pipeline));
        state.in_flight = None;
        state.phase = LoadPhase::Ready;
        state.last_error = None;
        self.publish(ModelEvent::Loaded {
            model_id: state.active_model_id.clone(),
        });
        pipeline
    }

    fn settle_failed(&self, failure: LoadFailure) -> LoadFailure {
        let mut state = self.state.lock();
        state.in_flight = None;
        state.phase = LoadPhase::Failed;
        state.last_error = Some(failure.to_string());
        self.publish(ModelEvent::LoadFailed {
            model_id: failure.model_id.clone(),
            reason: failure.reason.clone(),
        });
        failure
    }

    fn settle_aborted(&self, reason: String) -> LoadFailure {
        let model_id = self.state.lock().active_model_id.clone();
        error!("Load of '{}' died: {}", model_id, reason);
        self.settle_failed(LoadFailure { model_id, reason })
    }

    fn publish(&self, event: ModelEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.events.send(event);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Trailing path segment of a model identifier
pub fn model_short_name(model_id: &str) -> &str {
    let trimmed = model_id.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticPipeline {
        model_id: String,
    }

    #[async_trait]
    impl ImagePipeline for StaticPipeline {
        async fn invoke(&self, _image: &ImageInput, _options: ClassifyOptions) -> Result<Vec<Prediction>> {
            Ok(vec![Prediction::new("n02129604 tiger, Panthera tigris", 0.9)])
        }

        fn model_id(&self) -> &str {
            &self.model_id
        }
    }

    struct StaticFactory;

    #[async_trait]
    impl PipelineFactory for StaticFactory {
        async fn load(&self, _task: Task, model_id: &str) -> Result<Arc<dyn ImagePipeline>> {
            Ok(Arc::new(StaticPipeline {
                model_id: model_id.to_string(),
            }))
        }
    }

    #[test]
    fn test_model_short_name() {
        assert_eq!(
            model_short_name("timm/mobilenetv4_conv_small.e2400_r224_in1k"),
            "mobilenetv4_conv_small.e2400_r224_in1k"
        );
        assert_eq!(model_short_name("resnet18"), "resnet18");
        assert_eq!(model_short_name("org/model/"), "model");
    }

    #[test]
    fn test_initial_status() {
        let service =
            ClassifierService::new(ClassifierConfig::default(), Arc::new(StaticFactory)).unwrap();
        let status = service.status();

        assert_eq!(status.phase, LoadPhase::Unloaded);
        assert!(!status.loading);
        assert_eq!(status.model_name, "mobilenetv4_conv_small.e2400_r224_in1k");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClassifierConfig::default().with_top_k(0);
        assert!(ClassifierService::new(config, Arc::new(StaticFactory)).is_err());
    }

    #[tokio::test]
    async fn test_classify_normalizes_labels() {
        let service =
            ClassifierService::new(ClassifierConfig::default(), Arc::new(StaticFactory)).unwrap();
        let image = ImageInput::new(vec![1u8, 2, 3], "image/png").unwrap();

        let predictions = service.classify_image(&image).await.unwrap();

        assert_eq!(predictions, vec![Prediction::new("tiger", 0.9)]);
        assert_eq!(service.status().phase, LoadPhase::Ready);
    }

    #[test]
    fn test_event_serialization() {
        let event = ModelEvent::LoadFailed {
            model_id: "a/b".to_string(),
            reason: "offline".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "load_failed");
        assert_eq!(json["reason"], "offline");
    }
}
