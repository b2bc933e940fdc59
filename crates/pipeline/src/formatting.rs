//! Lookup table from event type to [`EventFormatter`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::{EventFormatter, EventType};

/// Formatters keyed by the event type they render.
///
/// Event types without a formatter are still recorded in history but not
/// forwarded.
#[derive(Clone, Default)]
pub struct FormatterRegistry {
    formatters: HashMap<EventType, Arc<dyn EventFormatter>>,
}

impl FormatterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `formatter` for `event_type`, replacing any previous one.
    pub fn register(&mut self, event_type: EventType, formatter: Arc<dyn EventFormatter>) {
        self.formatters.insert(event_type, formatter);
    }

    /// Builder-style variant of [`Self::register`].
    pub fn with(mut self, event_type: EventType, formatter: Arc<dyn EventFormatter>) -> Self {
        self.register(event_type, formatter);
        self
    }

    /// Returns the formatter for `event_type`, if any.
    pub fn get(&self, event_type: &EventType) -> Option<&Arc<dyn EventFormatter>> {
        self.formatters.get(event_type)
    }

    /// Event types that have a formatter, sorted.
    pub fn event_types(&self) -> Vec<&EventType> {
        let mut types: Vec<_> = self.formatters.keys().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatterRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormatError;

    struct Fixed(&'static str);

    impl EventFormatter for Fixed {
        fn format(&self, _payload: &serde_json::Value) -> Result<String, FormatError> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn lookup_by_event_type() {
        let push = EventType::new("push").unwrap();
        let registry = FormatterRegistry::new().with(push.clone(), Arc::new(Fixed("pushed")));

        let text = registry.get(&push).unwrap().format(&serde_json::json!({})).unwrap();
        assert_eq!(text, "pushed");
        assert!(registry.get(&EventType::new("star").unwrap()).is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let push = EventType::new("push").unwrap();
        let registry = FormatterRegistry::new()
            .with(push.clone(), Arc::new(Fixed("one")))
            .with(push.clone(), Arc::new(Fixed("two")));

        assert_eq!(registry.event_types().len(), 1);
        let text = registry.get(&push).unwrap().format(&serde_json::Value::Null).unwrap();
        assert_eq!(text, "two");
    }
}
