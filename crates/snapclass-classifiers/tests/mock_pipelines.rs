//! Mock pipelines for testing
//!
//! Configurable implementations of the inference boundary used to exercise
//! the service's loading, fallback and classification behavior without
//! downloading models.

use async_trait::async_trait;
use parking_lot::Mutex;
use snapclass_classifiers::{
    ClassifierConfig, ClassifierService, ClassifyOptions, ImagePipeline, LoadPhase, ModelEvent,
    PipelineFactory, Task,
};
use snapclass_core::{Error, ImageInput, Prediction, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PRIMARY: &str = "test-org/primary-model";
const FALLBACK: &str = "test-org/fallback-model";

/// A pipeline returning a fixed prediction list
pub struct MockPipeline {
    model_id: String,
    predictions: Vec<Prediction>,
    fail_with: Option<String>,
    call_count: AtomicU32,
}

impl MockPipeline {
    pub fn new(model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            predictions: vec![Prediction::new("tabby cat", 0.8)],
            fail_with: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the predictions this pipeline will return
    pub fn with_predictions(mut self, predictions: Vec<Prediction>) -> Self {
        self.predictions = predictions;
        self
    }

    /// Make every invocation fail
    pub fn failing(mut self, message: &str) -> Self {
        self.fail_with = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ImagePipeline for MockPipeline {
    async fn invoke(&self, _image: &ImageInput, _options: ClassifyOptions) -> Result<Vec<Prediction>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        match &self.fail_with {
            Some(message) => Err(Error::internal(message.clone())),
            None => Ok(self.predictions.clone()),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// A factory that counts loads and fails for selected model ids
pub struct MockFactory {
    latency: Option<Duration>,
    failing: Mutex<HashSet<String>>,
    loaded: Mutex<Vec<String>>,
    load_count: AtomicU32,
    pipeline: Mutex<Option<Arc<MockPipeline>>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            latency: None,
            failing: Mutex::new(HashSet::new()),
            loaded: Mutex::new(Vec::new()),
            load_count: AtomicU32::new(0),
            pipeline: Mutex::new(None),
        }
    }

    /// Set simulated load latency
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Serve this pipeline instead of building a new one per load
    pub fn with_pipeline(self, pipeline: Arc<MockPipeline>) -> Self {
        *self.pipeline.lock() = Some(pipeline);
        self
    }

    pub fn fail_model(&self, model_id: &str) {
        self.failing.lock().insert(model_id.to_string());
    }

    pub fn heal_model(&self, model_id: &str) {
        self.failing.lock().remove(model_id);
    }

    /// Number of load attempts, successful or not
    pub fn load_count(&self) -> u32 {
        self.load_count.load(Ordering::SeqCst)
    }

    /// Model ids in the order they were attempted
    pub fn attempts(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

#[async_trait]
impl PipelineFactory for MockFactory {
    async fn load(&self, _task: Task, model_id: &str) -> Result<Arc<dyn ImagePipeline>> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        self.loaded.lock().push(model_id.to_string());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.lock().contains(model_id) {
            return Err(Error::model_load(model_id, "simulated download failure"));
        }

        let pipeline = self.pipeline.lock().clone();
        Ok(match pipeline {
            Some(pipeline) => pipeline,
            None => Arc::new(MockPipeline::new(model_id)),
        })
    }
}

/// A factory whose first loads panic instead of returning
pub struct PanickingFactory {
    panics_left: AtomicU32,
}

impl PanickingFactory {
    pub fn new(panics: u32) -> Self {
        Self {
            panics_left: AtomicU32::new(panics),
        }
    }
}

#[async_trait]
impl PipelineFactory for PanickingFactory {
    async fn load(&self, _task: Task, model_id: &str) -> Result<Arc<dyn ImagePipeline>> {
        let left = self.panics_left.load(Ordering::SeqCst);
        if left > 0 {
            self.panics_left.store(left - 1, Ordering::SeqCst);
            panic!("weights for '{}' are corrupt", model_id);
        }
        Ok(Arc::new(MockPipeline::new(model_id)))
    }
}

fn test_config() -> ClassifierConfig {
    ClassifierConfig::default()
        .with_primary_model(PRIMARY)
        .with_fallback_model(Some(FALLBACK.to_string()))
}

fn service_with(factory: Arc<MockFactory>) -> ClassifierService {
    ClassifierService::new(test_config(), factory).unwrap()
}

fn test_image() -> ImageInput {
    ImageInput::new(vec![0x89, b'P', b'N', b'G'], "image/png").unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let factory = Arc::new(MockFactory::new().with_latency(Duration::from_millis(50)));
        let service = service_with(Arc::clone(&factory));

        let calls = (0..8).map(|_| service.get_classifier());
        let handles = futures::future::join_all(calls).await;

        assert_eq!(factory.load_count(), 1);
        let first = handles[0].as_ref().unwrap();
        for handle in &handles {
            assert!(Arc::ptr_eq(first, handle.as_ref().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_handle_is_memoized() {
        let factory = Arc::new(MockFactory::new());
        let service = service_with(Arc::clone(&factory));

        let a = service.get_classifier().await.unwrap();
        let b = service.get_classifier().await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.load_count(), 1);
        assert_eq!(a.model_id(), PRIMARY);
        assert!(!service.is_model_loading());
    }

    #[tokio::test]
    async fn test_loading_flag_while_in_flight() {
        let factory = Arc::new(MockFactory::new().with_latency(Duration::from_millis(100)));
        let service = service_with(Arc::clone(&factory));

        assert!(!service.is_model_loading());
        service.load_in_background();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(service.is_model_loading());
        assert_eq!(service.status().phase, LoadPhase::Loading);

        service.get_classifier().await.unwrap();
        assert!(!service.is_model_loading());
        assert_eq!(factory.load_count(), 1);
    }

    #[tokio::test]
    async fn test_background_load_is_idempotent() {
        let factory = Arc::new(MockFactory::new().with_latency(Duration::from_millis(20)));
        let service = service_with(Arc::clone(&factory));

        service.load_in_background();
        assert!(service.is_model_loading());
        service.load_in_background();

        service.get_classifier().await.unwrap();
        service.load_in_background();

        assert!(!service.is_model_loading());
        assert_eq!(factory.load_count(), 1);
    }

    #[tokio::test]
    async fn test_background_load_settles_after_panic() {
        let factory = Arc::new(PanickingFactory::new(1));
        let service = ClassifierService::new(test_config(), factory).unwrap();

        service.load_in_background();
        for _ in 0..100 {
            if !service.is_model_loading() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = service.status();
        assert!(!status.loading);
        assert_eq!(status.phase, LoadPhase::Failed);
        assert!(status.last_error.unwrap().contains("panicked"));

        // A new background load is accepted and succeeds.
        service.load_in_background();
        assert!(service.is_model_loading());
        let pipeline = service.get_classifier().await.unwrap();
        assert_eq!(pipeline.model_id(), PRIMARY);
        assert_eq!(service.status().phase, LoadPhase::Ready);
    }

    #[tokio::test]
    async fn test_fallback_success_switches_model() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        let service = service_with(Arc::clone(&factory));

        let pipeline = service.get_classifier().await.unwrap();

        assert_eq!(pipeline.model_id(), FALLBACK);
        assert_eq!(service.get_model_name(), "fallback-model");
        assert_eq!(factory.attempts(), vec![PRIMARY.to_string(), FALLBACK.to_string()]);
        assert_eq!(service.status().phase, LoadPhase::Ready);
        assert!(service.status().last_error.is_none());
    }

    #[tokio::test]
    async fn test_double_failure_is_reported() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        factory.fail_model(FALLBACK);
        let service = service_with(Arc::clone(&factory));

        let err = service.get_classifier().await.err().unwrap();

        assert!(matches!(err, Error::ModelLoad { ref model_id, .. } if model_id == FALLBACK));
        assert_eq!(factory.load_count(), 2);
        assert!(!service.is_model_loading());

        let status = service.status();
        assert_eq!(status.phase, LoadPhase::Failed);
        assert!(status.last_error.unwrap().contains("simulated download failure"));
    }

    #[tokio::test]
    async fn test_no_fallback_configured() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        let config = test_config().with_fallback_model(None);
        let service = ClassifierService::new(config, Arc::clone(&factory) as Arc<dyn PipelineFactory>).unwrap();

        assert!(service.get_classifier().await.is_err());
        assert_eq!(factory.attempts(), vec![PRIMARY.to_string()]);
        assert_eq!(service.get_model_name(), "primary-model");
    }

    #[tokio::test]
    async fn test_retry_after_failure_starts_from_fallback() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        factory.fail_model(FALLBACK);
        let service = service_with(Arc::clone(&factory));

        assert!(service.get_classifier().await.is_err());

        factory.heal_model(FALLBACK);
        let pipeline = service.get_classifier().await.unwrap();

        assert_eq!(pipeline.model_id(), FALLBACK);
        assert_eq!(
            factory.attempts(),
            vec![PRIMARY.to_string(), FALLBACK.to_string(), FALLBACK.to_string()]
        );
    }

    #[tokio::test]
    async fn test_retry_from_fallback_does_not_loop() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        factory.fail_model(FALLBACK);
        let service = service_with(Arc::clone(&factory));

        assert!(service.get_classifier().await.is_err());
        assert!(service.get_classifier().await.is_err());

        // The second round tries the fallback once and stops.
        assert_eq!(factory.load_count(), 3);
    }

    #[tokio::test]
    async fn test_load_survives_abandoned_caller() {
        let factory = Arc::new(MockFactory::new().with_latency(Duration::from_millis(50)));
        let service = service_with(Arc::clone(&factory));

        let caller = {
            let service = service.clone();
            tokio::spawn(async move { service.get_classifier().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(service.status().phase, LoadPhase::Ready);
        service.get_classifier().await.unwrap();
        assert_eq!(factory.load_count(), 1);
    }

    #[tokio::test]
    async fn test_classify_truncates_and_keeps_order() {
        let predictions: Vec<Prediction> = (0..15)
            .map(|i| Prediction::new(format!("class {}", i), 1.0 - i as f32 * 0.05))
            .collect();
        let pipeline = Arc::new(MockPipeline::new(PRIMARY).with_predictions(predictions));
        let factory = Arc::new(MockFactory::new().with_pipeline(Arc::clone(&pipeline)));
        let service = service_with(factory);

        let result = service.classify_image(&test_image()).await.unwrap();

        assert_eq!(result.len(), 10);
        assert_eq!(result[0].label, "class 0");
        assert_eq!(result[9].label, "class 9");
        assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(pipeline.call_count(), 1);
    }

    #[tokio::test]
    async fn test_classify_preserves_pipeline_order() {
        let predictions = vec![
            Prediction::new("low", 0.1),
            Prediction::new("high", 0.9),
        ];
        let pipeline = Arc::new(MockPipeline::new(PRIMARY).with_predictions(predictions));
        let service = service_with(Arc::new(MockFactory::new().with_pipeline(pipeline)));

        let result = service.classify_image(&test_image()).await.unwrap();

        assert_eq!(result[0].label, "low");
        assert_eq!(result[1].label, "high");
    }

    #[tokio::test]
    async fn test_classify_normalizes_dataset_labels() {
        let predictions = vec![
            Prediction::new("n02123045 tabby, tabby cat", 0.7),
            Prediction::new("golden retriever", 0.2),
        ];
        let pipeline = Arc::new(MockPipeline::new(PRIMARY).with_predictions(predictions));
        let service = service_with(Arc::new(MockFactory::new().with_pipeline(pipeline)));

        let result = service.classify_image(&test_image()).await.unwrap();

        assert_eq!(result[0], Prediction::new("tabby", 0.7));
        assert_eq!(result[1], Prediction::new("golden retriever", 0.2));
    }

    #[tokio::test]
    async fn test_classify_empty_result() {
        let pipeline = Arc::new(MockPipeline::new(PRIMARY).with_predictions(Vec::new()));
        let service = service_with(Arc::new(MockFactory::new().with_pipeline(pipeline)));

        assert!(service.classify_image(&test_image()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inference_failure_is_classification_error() {
        let pipeline = Arc::new(MockPipeline::new(PRIMARY).failing("tensor shape mismatch"));
        let service = service_with(Arc::new(MockFactory::new().with_pipeline(pipeline)));

        let err = service.classify_image(&test_image()).await.unwrap_err();

        assert!(matches!(err, Error::Classification(_)));
        assert!(err.to_string().contains("tensor shape mismatch"));
        // The model stays loaded.
        assert_eq!(service.status().phase, LoadPhase::Ready);
    }

    #[tokio::test]
    async fn test_undecodable_image_keeps_its_kind() {
        struct RejectingPipeline;

        #[async_trait]
        impl ImagePipeline for RejectingPipeline {
            async fn invoke(&self, _image: &ImageInput, _options: ClassifyOptions) -> Result<Vec<Prediction>> {
                Err(Error::invalid_image("truncated JPEG"))
            }

            fn model_id(&self) -> &str {
                PRIMARY
            }
        }

        struct RejectingFactory;

        #[async_trait]
        impl PipelineFactory for RejectingFactory {
            async fn load(&self, _task: Task, _model_id: &str) -> Result<Arc<dyn ImagePipeline>> {
                Ok(Arc::new(RejectingPipeline))
            }
        }

        let service = ClassifierService::new(test_config(), Arc::new(RejectingFactory)).unwrap();
        let err = service.classify_image(&test_image()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidImage(_)));
    }

    #[tokio::test]
    async fn test_classify_when_load_fails() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        factory.fail_model(FALLBACK);
        let service = service_with(factory);

        let err = service.classify_image(&test_image()).await.unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }

    #[tokio::test]
    async fn test_events_for_fallback_load() {
        let factory = Arc::new(MockFactory::new());
        factory.fail_model(PRIMARY);
        let service = service_with(factory);
        let mut events = service.subscribe();

        service.get_classifier().await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = events.try_recv() {
            received.push(event);
        }

        assert_eq!(
            received,
            vec![
                ModelEvent::LoadStarted {
                    model_id: PRIMARY.to_string()
                },
                ModelEvent::FallbackStarted {
                    failed_model_id: PRIMARY.to_string(),
                    model_id: FALLBACK.to_string(),
                },
                ModelEvent::Loaded {
                    model_id: FALLBACK.to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_pipeline_call_count() {
        let pipeline = MockPipeline::new("m");
        pipeline
            .invoke(&test_image(), ClassifyOptions::default())
            .await
            .unwrap();
        assert_eq!(pipeline.call_count(), 1);
    }
}
