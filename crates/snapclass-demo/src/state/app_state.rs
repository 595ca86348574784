use crate::config::DemoConfig;
use crate::history::RecentImages;
use crate::models::{ClassificationResponse, DemoEvent};
use crate::state::EventBus;
use metrics_exporter_prometheus::PrometheusHandle;
use snapclass_classifiers::{ClassifierService, ModelEvent, PipelineFactory};
use snapclass_core::{render_results, ImageInput, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;

/// Shared application state
#[derive(Clone)]
pub struct DemoAppState {
    /// Demo configuration
    pub config: Arc<DemoConfig>,

    /// The one classifier of the process
    pub classifier: ClassifierService,

    /// Recently classified images for the gallery
    pub history: Arc<RecentImages>,

    /// Real-time event bus for WebSocket broadcasting
    pub event_bus: Arc<EventBus>,

    /// Prometheus renderer; absent when no recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl DemoAppState {
    pub fn new(
        config: DemoConfig,
        factory: Arc<dyn PipelineFactory>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let classifier = ClassifierService::new(config.classifier.clone(), factory)?;
        let history = Arc::new(RecentImages::new(config.history_capacity));

        let state = Self {
            config: Arc::new(config),
            classifier,
            history,
            event_bus: Arc::new(EventBus::default()),
            metrics,
        };
        state.forward_model_events();

        Ok(state)
    }

    /// Classify an image and record it in the history
    pub async fn classify_and_record(&self, image: ImageInput) -> Result<ClassificationResponse> {
        let start = Instant::now();
        let predictions = self.classifier.classify_image(&image).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let model = self.classifier.get_model_name();
        let entry = self.history.push(image, &model, &predictions);

        let response = ClassificationResponse {
            id: entry.id,
            model,
            view: render_results(&predictions, false),
            predictions,
            latency_ms,
        };

        self.event_bus
            .publish(DemoEvent::ClassificationCompleted(response.clone()));
        self.publish_history();

        Ok(response)
    }

    /// Tell clients the history changed
    pub fn publish_history(&self) {
        self.event_bus
            .publish(DemoEvent::HistoryChanged(self.history.list()));
    }

    /// Relay model lifecycle events as status snapshots
    ///
    /// The relay holds the service weakly, so it ends once the last state
    /// clone is dropped and the event channel closes.
    fn forward_model_events(&self) {
        let mut events = self.classifier.subscribe();
        let classifier = self.classifier.downgrade();
        let bus = Arc::clone(&self.event_bus);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let ModelEvent::LoadFailed { model_id, reason } = &event {
                            tracing::warn!("Model '{}' unavailable: {}", model_id, reason);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Model event relay lagged by {}", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }

                match classifier.upgrade() {
                    Some(classifier) => {
                        bus.publish(DemoEvent::ModelStatusChanged(classifier.status()))
                    }
                    None => break,
                }
            }
            tracing::debug!("Model event relay stopped");
        });
    }
}
