use std::collections::HashSet;

use crate::core::error::{Error, Result};

/// Similarity above which an unknown model id gets a "did you mean" hint.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// The fixed set of model identifiers that rounds may query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: Vec<String>,
}

impl ModelCatalog {
    pub fn new<I, S>(models: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<String> = models.into_iter().map(Into::into).collect();
        if models.is_empty() {
            return Err(Error::Config(
                "model catalog must list at least one model".into(),
            ));
        }
        let mut seen = HashSet::new();
        for model in &models {
            if model.trim().is_empty() {
                return Err(Error::Config("model identifiers may not be blank".into()));
            }
            if !seen.insert(model.as_str()) {
                return Err(Error::Config(format!(
                    "model '{model}' is listed more than once"
                )));
            }
        }
        Ok(Self { models })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }

    /// Rejects the first selected model that is not part of the catalog.
    pub fn check_selection(&self, selected: &[String]) -> Result<()> {
        for model in selected {
            if self.contains(model) {
                continue;
            }
            let hint = self
                .closest(model)
                .map(|candidate| format!(" (did you mean '{candidate}'?)"))
                .unwrap_or_default();
            return Err(Error::Validation(format!(
                "unknown model '{model}'{hint}; available models: {}",
                self.models.join(", ")
            )));
        }
        Ok(())
    }

    fn closest(&self, model: &str) -> Option<&str> {
        self.models
            .iter()
            .map(|candidate| (candidate, strsim::jaro_winkler(model, candidate)))
            .filter(|(_, score)| *score >= SUGGESTION_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(candidate, _)| candidate.as_str())
    }
}
