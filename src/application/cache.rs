use std::collections::HashMap;

use crate::core::domain::ModelReply;

/// Memoized model answers keyed on the exact (prompt, model) pair.
///
/// Only successful answers are kept; a failed query is retried on the next round.
#[derive(Debug, Default)]
pub struct ResponseCache {
    enabled: bool,
    entries: HashMap<(String, String), String>,
}

impl ResponseCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, prompt: &str, model: &str) -> Option<ModelReply> {
        if !self.enabled {
            return None;
        }
        self.entries
            .get(&(prompt.to_string(), model.to_string()))
            .map(|text| ModelReply::Answer(text.clone()))
    }

    pub fn remember(&mut self, prompt: &str, model: &str, reply: &ModelReply) {
        if !self.enabled {
            return;
        }
        if let ModelReply::Answer(text) = reply {
            self.entries
                .insert((prompt.to_string(), model.to_string()), text.clone());
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
