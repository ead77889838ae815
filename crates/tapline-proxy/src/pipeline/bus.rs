use super::plugin::{EventSet, PluginEvent};
use crate::matching::UrlMatcherSet;
use std::collections::HashMap;

/// A plugin's subscription to one event.
#[derive(Debug, Clone)]
pub struct Subscriber {
    /// Position of the plugin in registration order
    pub index: usize,
    pub name: String,
    watch: UrlMatcherSet,
}

impl Subscriber {
    pub fn watches(&self, url: &str) -> bool {
        self.watch.matches(url)
    }
}

/// Ordered event hub. Subscribers of each event are kept in registration order.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: HashMap<PluginEvent, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe plugin `index` to every event in `events`.
    ///
    /// Callers must subscribe in registration order.
    pub fn subscribe(&mut self, index: usize, name: &str, events: EventSet, watch: UrlMatcherSet) {
        for event in PluginEvent::ALL {
            if !events.contains(event) {
                continue;
            }
            let list = self.subscribers.entry(event).or_default();
            debug_assert!(list.last().map(|s| s.index < index).unwrap_or(true));
            list.push(Subscriber {
                index,
                name: name.to_string(),
                watch: watch.clone(),
            });
        }
    }

    pub fn subscribers(&self, event: PluginEvent) -> &[Subscriber] {
        self.subscribers
            .get(&event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Subscribers of a URL-scoped event whose watch set matches `url`.
    pub fn subscribers_for<'a>(
        &'a self,
        event: PluginEvent,
        url: &'a str,
    ) -> impl Iterator<Item = &'a Subscriber> + 'a {
        self.subscribers(event)
            .iter()
            .filter(move |s| s.watches(url))
    }
}
