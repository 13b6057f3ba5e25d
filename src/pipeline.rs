//! Pipeline wiring a producer, a broadcast buffer and its subscribers.

use crate::buffer::{BroadcastBuffer, BufferConfig, BufferStats};
use crate::coordinator::Coordinator;
use crate::error::{FlowError, Result};
use crate::events::{EventSink, TracingSink};
use crate::producer::{Producer, ProducerStats};
use crate::subscribers::{
    spawn_subscriber, ErrorPolicy, ItemHandler, LogHandler, SubscriberConfig, SubscriberHandle,
    SubscriberReport,
};
use crate::types::SubscriberState;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Number of items the demo producer prints.
pub const DEFAULT_ITEMS: u64 = 20;

/// Default wait for all subscribers to finish.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(60);

/// Pipeline configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Items the producer emits (`1..=items`).
    /// Default: 20
    pub items: u64,

    /// Pause between emissions.
    /// Default: 1s
    pub producer_delay: Duration,

    pub buffer: BufferConfig,

    /// Subscribers, started in order before the producer.
    /// Default: "jack" at 1000ms per item, "pete" at 3000ms per item
    pub subscribers: Vec<SubscriberConfig>,

    #[serde(default)]
    pub on_subscriber_error: ErrorPolicy,

    /// How long to wait for every subscriber to finish.
    /// Default: 60s
    pub grace_period: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            items: DEFAULT_ITEMS,
            producer_delay: Duration::from_secs(1),
            buffer: BufferConfig::default(),
            subscribers: vec![
                SubscriberConfig::new("jack", Duration::from_millis(1000)),
                SubscriberConfig::new("pete", Duration::from_millis(3000)),
            ],
            on_subscriber_error: ErrorPolicy::LogOnly,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl PipelineConfig {
    /// Parse a JSON configuration and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.buffer.validate()?;
        let mut names = HashSet::new();
        for sub in &self.subscribers {
            sub.validate()?;
            if !names.insert(sub.name.as_str()) {
                return Err(FlowError::InvalidConfig(format!(
                    "duplicate subscriber name: {}",
                    sub.name
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a complete run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    /// One report per subscriber, in configuration order.
    pub subscribers: Vec<SubscriberReport>,
    pub producer: ProducerStats,
    pub buffer: BufferStats,
}

impl RunReport {
    pub fn subscriber(&self, name: &str) -> Option<&SubscriberReport> {
        self.subscribers.iter().find(|r| r.name == name)
    }

    /// Subscribers that ended `Errored`.
    pub fn failed(&self) -> Vec<&SubscriberReport> {
        self.subscribers
            .iter()
            .filter(|r| matches!(r.state, SubscriberState::Errored { .. }))
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.subscribers
            .iter()
            .all(|r| r.state == SubscriberState::Completed)
    }

    /// `Err(FlowError::Subscriber)` for the first subscriber that ended `Errored`.
    pub fn check(&self) -> Result<()> {
        for report in &self.subscribers {
            if let SubscriberState::Errored { reason } = &report.state {
                return Err(FlowError::Subscriber {
                    name: report.name.clone(),
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }
}

/// One producer, one buffer, N subscribers.
pub struct Pipeline {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
    handlers: HashMap<String, Box<dyn ItemHandler>>,
}

impl Pipeline {
    /// Create a pipeline that reports through `tracing`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    pub fn with_sink(config: PipelineConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            sink,
            handlers: HashMap::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Use `handler` for the subscriber called `name` instead of [`LogHandler`].
    pub fn handler(mut self, name: impl Into<String>, handler: impl ItemHandler) -> Self {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }

    /// Run to completion.
    ///
    /// Subscribers are attached before the producer starts. On timeout every
    /// unfinished subscriber is cancelled, the producer is stopped and
    /// [`FlowError::CompletionTimeout`] is returned.
    pub fn run(mut self) -> Result<RunReport> {
        let config = &self.config;
        let buffer = BroadcastBuffer::new(config.buffer.clone(), Arc::clone(&self.sink))?;
        let mut coordinator = Coordinator::new(Arc::clone(&self.sink));

        info!(
            items = config.items,
            capacity = config.buffer.capacity,
            retention = ?config.buffer.retention,
            overflow = ?config.buffer.overflow,
            "Printing {} magazines per subscriber, with room in publisher for {}",
            config.items,
            config.buffer.capacity
        );

        let mut handles: Vec<SubscriberHandle> = Vec::with_capacity(config.subscribers.len());
        for sub in &config.subscribers {
            let reports = coordinator.register(sub.name.clone());
            let subscription = buffer.subscribe(sub.start);
            let handler = self
                .handlers
                .remove(&sub.name)
                .unwrap_or_else(|| Box::new(LogHandler) as Box<dyn ItemHandler>);
            let spawned = spawn_subscriber(
                sub.clone(),
                subscription,
                handler,
                config.on_subscriber_error,
                Arc::clone(&self.sink),
                reports,
            );
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    abort(&buffer, &handles);
                    return Err(e);
                }
            }
        }

        let producer = match Producer::new(config.items, config.producer_delay)
            .spawn(Arc::clone(&buffer))
        {
            Ok(producer) => producer,
            Err(e) => {
                abort(&buffer, &handles);
                return Err(e);
            }
        };

        match coordinator.wait(config.grace_period) {
            Ok(subscribers) => {
                let producer = producer.join()?;
                for handle in handles {
                    handle.join();
                }
                let report = RunReport {
                    subscribers,
                    producer,
                    buffer: buffer.stats(),
                };
                info!(
                    dropped = report.buffer.dropped,
                    failed = report.failed().len(),
                    "pipeline finished"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "cancelling unfinished subscribers");
                producer.stop();
                for handle in handles.iter().filter(|h| !h.state().is_terminal()) {
                    warn!(subscriber = handle.name(), "cancelling");
                    handle.cancel();
                }
                if let Err(join_err) = producer.join() {
                    warn!(error = %join_err, "producer ended with error");
                }
                Err(e)
            }
        }
    }
}

/// Tear down partially started subscribers.
fn abort(buffer: &BroadcastBuffer, handles: &[SubscriberHandle]) {
    buffer.complete();
    for handle in handles {
        handle.cancel();
    }
}
