//! Event processors: the pluggable functions workers invoke per event.
//!
//! The collaborator domains (audio, MIDI, network, texture sharing, user
//! input) supply their own implementations through the registry; the runtime
//! ships a pass-through processor so a manager is usable stand-alone, and a
//! file processor that routes file-typed events into the async file engine.
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::event::{Event, EventType};
use crate::error::{FramegateError, FramegateResult};
use crate::fileio::AsyncFileEngine;

/// A processor bound to one event type.
///
/// `scratch` is a pool buffer sized for the event payload, loaned for the
/// duration of this call.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Short name for logs and alerts.
    fn name(&self) -> &str;

    /// Handle one event. Errors are recorded on the event and counted; they
    /// never stop the worker.
    async fn process(&self, event: &mut Event, scratch: &mut Vec<u8>) -> FramegateResult<()>;
}

/// Default processor: moves the payload through the scratch buffer and
/// succeeds. Keeps the pipeline observable before real handlers are bound.
pub struct PassthroughProcessor {
    name: String,
}

impl PassthroughProcessor {
    /// Create a pass-through processor named after its event type.
    pub fn new(event_type: EventType) -> Self {
        Self {
            name: format!("passthrough-{}", event_type),
        }
    }
}

#[async_trait]
impl EventProcessor for PassthroughProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: &mut Event, scratch: &mut Vec<u8>) -> FramegateResult<()> {
        if let Some(payload) = &event.payload {
            let take = payload.len().min(scratch.capacity());
            scratch.extend_from_slice(&payload[..take]);
        }
        Ok(())
    }
}

/// Processor for file-typed events, backed by the async file engine.
pub struct FileEventProcessor {
    engine: Arc<AsyncFileEngine>,
}

impl FileEventProcessor {
    /// Create a file processor over the given engine.
    pub fn new(engine: Arc<AsyncFileEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl EventProcessor for FileEventProcessor {
    fn name(&self) -> &str {
        "file-engine"
    }

    async fn process(&self, event: &mut Event, scratch: &mut Vec<u8>) -> FramegateResult<()> {
        match event.event_type {
            EventType::FileRead => {
                let path = event.source_path.clone().ok_or_else(|| {
                    FramegateError::event_processing(&event.id, "file-read without source path")
                })?;
                let outcome = self.engine.read(&path, &event.cancel, &event.id).await?;
                event.metadata.data_size = Some(outcome.bytes_read);
                let take = outcome.data.len().min(scratch.capacity());
                scratch.extend_from_slice(&outcome.data[..take]);
                Ok(())
            }
            EventType::FileWrite => {
                let path = event.source_path.clone().ok_or_else(|| {
                    FramegateError::event_processing(&event.id, "file-write without source path")
                })?;
                let payload = event.payload.take().unwrap_or_default();
                let result = self
                    .engine
                    .write(
                        &path,
                        &payload,
                        event.flags.create_backup,
                        &event.cancel,
                        &event.id,
                    )
                    .await;
                event.payload = Some(payload);
                result.map(|_| ())
            }
            other => Err(FramegateError::event_processing(
                &event.id,
                format!("file processor bound to {} event", other),
            )),
        }
    }
}

/// Mapping from event type to its processor.
pub struct ProcessorRegistry {
    processors: HashMap<EventType, Arc<dyn EventProcessor>>,
}

impl ProcessorRegistry {
    /// Registry with a pass-through processor for every event type.
    pub fn with_defaults() -> Self {
        let mut processors: HashMap<EventType, Arc<dyn EventProcessor>> = HashMap::new();
        for event_type in EventType::ALL {
            processors.insert(event_type, Arc::new(PassthroughProcessor::new(event_type)));
        }
        Self { processors }
    }

    /// Bind a processor to an event type, replacing the previous binding.
    pub fn register(&mut self, event_type: EventType, processor: Arc<dyn EventProcessor>) {
        self.processors.insert(event_type, processor);
    }

    /// Processor for an event type. The registry is total, so this always
    /// resolves.
    pub fn get(&self, event_type: EventType) -> Arc<dyn EventProcessor> {
        self.processors
            .get(&event_type)
            .cloned()
            .unwrap_or_else(|| Arc::new(PassthroughProcessor::new(event_type)))
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::EventPriority;

    #[tokio::test]
    async fn test_passthrough_copies_payload() {
        let processor = PassthroughProcessor::new(EventType::CacheUpdate);
        let mut event =
            Event::new(EventType::CacheUpdate, EventPriority::Low).with_payload(vec![7u8; 128]);
        let mut scratch = Vec::with_capacity(4096);
        processor.process(&mut event, &mut scratch).await.unwrap();
        assert_eq!(scratch.len(), 128);
    }

    #[test]
    fn test_registry_is_total() {
        let registry = ProcessorRegistry::with_defaults();
        for event_type in EventType::ALL {
            assert!(!registry.get(event_type).name().is_empty());
        }
    }

    #[test]
    fn test_register_replaces_binding() {
        struct Named;
        #[async_trait]
        impl EventProcessor for Named {
            fn name(&self) -> &str {
                "custom"
            }
            async fn process(&self, _: &mut Event, _: &mut Vec<u8>) -> FramegateResult<()> {
                Ok(())
            }
        }

        let mut registry = ProcessorRegistry::with_defaults();
        registry.register(EventType::Network, Arc::new(Named));
        assert_eq!(registry.get(EventType::Network).name(), "custom");
    }
}
