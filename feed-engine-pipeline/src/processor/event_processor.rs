use std::{collections::HashMap, sync::Arc};

use feed_engine_shared::types::{EntityType, Event, EventAction};
use tracing::debug;

use crate::errors::ProcessorError;
use crate::processor::{Classify, EventPlan, ProcessEvents};

/// `EventProcessor` turns queued events into plans.
/// It manages a registry of classifiers keyed by entity type and action.
pub struct EventProcessor {
    classifier_registry: HashMap<(EntityType, EventAction), Arc<dyn Classify>>,
}

impl EventProcessor {
    pub fn new() -> Self {
        Self {
            classifier_registry: HashMap::new(),
        }
    }

    /// Registers a classifier for one entity type and action, replacing any
    /// previous one.
    pub fn register_classifier(
        &mut self,
        entity_type: EntityType,
        action: EventAction,
        classifier: Arc<dyn Classify>,
    ) {
        self.classifier_registry.insert((entity_type, action), classifier);
    }

    pub fn is_registered(&self, entity_type: EntityType, action: EventAction) -> bool {
        self.classifier_registry.contains_key(&(entity_type, action))
    }
}

impl Default for EventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessEvents for EventProcessor {
    /// Events without a registered classifier carry nothing for the feeds.
    fn classify(&self, event: &Event) -> Result<Option<EventPlan>, ProcessorError> {
        let Some(classifier) = self.classifier_registry.get(&(event.entity_type, event.action)) else {
            debug!(
                event_id = event.id,
                entity_type = %event.entity_type,
                action = %event.action,
                "No classifier registered"
            );
            return Ok(None);
        };
        let plan = classifier.classify(event)?;
        Ok(plan.filter(|plan| !plan.is_empty()))
    }
}
