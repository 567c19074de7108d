//! Per-model sampling parameters.
//!
//! A read-only table handed to the sequencer at construction. Lookup tries
//! the exact model id, then the id without its `:tag`, then the fallback.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sampling parameters sent as the request `options`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    /// Sampling temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
    /// Top-k cutoff
    pub top_k: u32,
    /// Minimum probability relative to the top token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_p: Option<f64>,
}

impl SamplingOptions {
    /// Create sampling options without `min_p`
    #[must_use]
    pub fn new(temperature: f64, top_p: f64, top_k: u32) -> Self {
        Self {
            temperature,
            top_p,
            top_k,
            min_p: None,
        }
    }

    /// Set `min_p`
    #[must_use]
    pub fn with_min_p(mut self, min_p: f64) -> Self {
        self.min_p = Some(min_p);
        self
    }

    fn merge(&mut self, overrides: &SamplingToml) {
        if let Some(temperature) = overrides.temperature {
            self.temperature = temperature;
        }
        if let Some(top_p) = overrides.top_p {
            self.top_p = top_p;
        }
        if let Some(top_k) = overrides.top_k {
            self.top_k = top_k;
        }
        if overrides.min_p.is_some() {
            self.min_p = overrides.min_p;
        }
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::new(0.7, 0.9, 40)
    }
}

/// A `[models."<id>"]` section of the TOML configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingToml {
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Top-k cutoff
    pub top_k: Option<u32>,
    /// Minimum probability relative to the top token
    pub min_p: Option<f64>,
}

/// Model id → sampling parameters, with a universal fallback
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingTable {
    entries: HashMap<String, SamplingOptions>,
    fallback: SamplingOptions,
}

impl Default for SamplingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SamplingTable {
    /// An empty table that answers every lookup with `fallback`
    #[must_use]
    pub fn with_fallback(fallback: SamplingOptions) -> Self {
        Self {
            entries: HashMap::new(),
            fallback,
        }
    }

    /// The table of recommended settings for common model families
    #[must_use]
    pub fn builtin() -> Self {
        let mut table = Self::with_fallback(SamplingOptions::default());
        table.insert("qwen3", SamplingOptions::new(0.6, 0.95, 20).with_min_p(0.0));
        table.insert("deepseek-r1", SamplingOptions::new(0.6, 0.95, 40));
        table.insert("gemma3", SamplingOptions::new(1.0, 0.95, 64));
        table.insert("llama3.2", SamplingOptions::new(0.6, 0.9, 40));
        table
    }

    /// Add or replace an entry
    pub fn insert(&mut self, model: impl Into<String>, options: SamplingOptions) {
        self.entries.insert(model.into(), options);
    }

    /// Options used when no entry matches
    #[must_use]
    pub fn fallback(&self) -> &SamplingOptions {
        &self.fallback
    }

    /// Options for a model id
    #[must_use]
    pub fn lookup(&self, model: &str) -> &SamplingOptions {
        self.entries
            .get(model)
            .or_else(|| {
                let (family, _tag) = model.split_once(':')?;
                self.entries.get(family)
            })
            .unwrap_or(&self.fallback)
    }

    /// Apply `[models.*]` sections; each starts from what the id currently
    /// resolves to, so partial sections only change the fields they name
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, SamplingToml>) {
        for (model, section) in overrides {
            let mut options = self.lookup(model).clone();
            options.merge(section);
            self.entries.insert(model.clone(), options);
        }
    }

    /// Number of explicit entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no explicit entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_exact_then_family_then_fallback() {
        let table = SamplingTable::builtin();
        assert_eq!(table.lookup("gemma3").top_k, 64);
        assert_eq!(table.lookup("gemma3:12b").top_k, 64);
        assert_eq!(table.lookup("mistral:7b"), &SamplingOptions::default());
        assert_eq!(table.lookup(""), table.fallback());
    }

    #[test]
    fn test_exact_tag_beats_family() {
        let mut table = SamplingTable::builtin();
        table.insert("qwen3:0.6b", SamplingOptions::new(0.2, 0.5, 5));
        assert_eq!(table.lookup("qwen3:0.6b").top_k, 5);
        assert_eq!(table.lookup("qwen3:8b").top_k, 20);
    }

    #[test]
    fn test_partial_override_keeps_other_fields() {
        let mut table = SamplingTable::builtin();
        let mut overrides = HashMap::new();
        overrides.insert(
            "qwen3:14b".to_string(),
            SamplingToml {
                temperature: Some(0.3),
                ..SamplingToml::default()
            },
        );
        table.apply_overrides(&overrides);

        let options = table.lookup("qwen3:14b");
        assert!((options.temperature - 0.3).abs() < f64::EPSILON);
        assert_eq!(options.top_k, 20);
        assert_eq!(options.min_p, Some(0.0));
    }

    #[test]
    fn test_fixture_table() {
        let table = SamplingTable::with_fallback(SamplingOptions::new(0.1, 0.2, 3));
        assert!(table.is_empty());
        assert_eq!(table.lookup("anything").top_k, 3);
    }

    #[test]
    fn test_options_wire_shape() {
        assert_eq!(
            serde_json::to_value(SamplingOptions::new(0.5, 0.9, 40)).unwrap(),
            json!({"temperature": 0.5, "top_p": 0.9, "top_k": 40})
        );
    }
}
