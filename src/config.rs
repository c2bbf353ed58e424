//! Pipeline configuration.
//!
//! Every section has a `Default` reproducing the constants the pipeline was
//! tuned with, so an empty JSON object is a complete configuration. Loaded
//! configurations go through [`PipelineConfig::validate`] before use.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KgError, KgResult, ValidationError};
use crate::kg::SimilarityKind;
use crate::schema::{is_relation_token, KgSchema};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Honorific prefixes stripped from Person names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Tokens matched case-insensitively; a trailing `.` is optional.
    pub honorifics: Vec<String>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            honorifics: strings(&["dr.", "prof.", "dean", "president", "pres.", "sir", "mr.", "mrs."]),
        }
    }
}

/// Containment rule shared by the Corroboration Resolver and the KG Builder.
///
/// `A` is similar to `B` when `A`'s name contains `B`'s name
/// case-insensitively and `B`'s name is not a stopword of that kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainmentConfig {
    /// Occupation names never used as a containment target.
    pub occupation_stopwords: Vec<String>,
    /// Organization names never used as a containment target.
    pub organization_stopwords: Vec<String>,
}

impl Default for ContainmentConfig {
    fn default() -> Self {
        Self {
            occupation_stopwords: strings(&["research"]),
            organization_stopwords: strings(&["university", "foundation"]),
        }
    }
}

impl ContainmentConfig {
    fn stopwords(&self, kind: SimilarityKind) -> &[String] {
        match kind {
            SimilarityKind::SimilarOccupation => &self.occupation_stopwords,
            SimilarityKind::SimilarOrganization => &self.organization_stopwords,
        }
    }

    /// Returns true if `container` is similar to `contained` under `kind`.
    #[must_use]
    pub fn is_similar(&self, kind: SimilarityKind, container: &str, contained: &str) -> bool {
        let contained = contained.trim().to_lowercase();
        if contained.is_empty() {
            return false;
        }
        if self
            .stopwords(kind)
            .iter()
            .any(|s| s.trim().to_lowercase() == contained)
        {
            return false;
        }
        container.to_lowercase().contains(&contained)
    }
}

/// Settings of the Corroboration Resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorroborationConfig {
    /// Relation types whose targets can corroborate a surname match.
    pub relation_types: Vec<String>,
    /// Feed corroborated pairs into the equivalence classes.
    pub merge_into_clusters: bool,
}

impl Default for CorroborationConfig {
    fn default() -> Self {
        Self {
            relation_types: strings(&["WORKS_FOR", "WORKS_ON", "HAS_TITLE"]),
            merge_into_clusters: false,
        }
    }
}

/// What a canonical node's `count` measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCountMode {
    /// Distinct mentions merged into the node.
    #[default]
    Mentions,
    /// Schema-conformant mention-relations touching the node, one per endpoint.
    Relations,
}

/// Settings of the extraction worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Extractor threads in the pool.
    pub workers: usize,
    /// Bound of the job queue feeding the workers.
    pub queue_capacity: usize,
    /// Re-submit pages with unusable output once within the same run.
    pub retry_failed: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            retry_failed: true,
        }
    }
}

impl ExtractionConfig {
    const MAX_WORKERS: usize = 256;

    /// Rejects degenerate pool sizes.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for zero or excessive workers, or a zero queue.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.workers == 0 || self.workers > Self::MAX_WORKERS {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "extraction.workers must be between 1 and {} (got {})",
                    Self::MAX_WORKERS,
                    self.workers
                ),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "extraction.queue_capacity must be at least 1".to_string(),
            });
        }
        Ok(self)
    }
}

/// Settings of the graph analysis run after the KG is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Person-Person relation types forming the interaction graph.
    pub interaction_types: Vec<String>,
    /// Canonical names left out of the interaction graph (the diary author).
    pub excluded_names: Vec<String>,
    /// PageRank damping factor, in `[0, 1)`.
    pub damping: f64,
    /// Upper bound on PageRank iterations.
    pub max_iterations: usize,
    /// PageRank stops early once the total score change drops below this.
    pub tolerance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            interaction_types: strings(&["TALKED_ABOUT", "TALKED_WITH", "WORKS_WITH"]),
            excluded_names: strings(&["WW", "Warren Weaver"]),
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-7,
        }
    }
}

impl AnalysisConfig {
    /// Checks PageRank parameters.
    ///
    /// # Errors
    /// Returns `InvalidConfig` for a damping factor outside `[0, 1)`, zero
    /// iterations or a negative tolerance.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if !(0.0..1.0).contains(&self.damping) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("analysis.damping must be in [0, 1) (got {})", self.damping),
            });
        }
        if self.max_iterations == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "analysis.max_iterations must be at least 1".to_string(),
            });
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(ValidationError::InvalidConfig {
                reason: format!("analysis.tolerance must be non-negative (got {})", self.tolerance),
            });
        }
        for t in &self.interaction_types {
            if !is_relation_token(t) {
                return Err(ValidationError::InvalidRelationType { value: t.clone() });
            }
        }
        Ok(self)
    }
}

/// Configuration of one pipeline run. Static for the duration of the run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Honorific stripping.
    pub normalizer: NormalizerConfig,
    /// Containment stopwords for similarity links and edges.
    pub containment: ContainmentConfig,
    /// Relation-backed surname corroboration.
    pub corroboration: CorroborationConfig,
    /// Rename tables and allowed triples of the canonical graph.
    pub schema: KgSchema,
    /// What a canonical node's `count` counts.
    pub node_count: NodeCountMode,
    /// Extraction worker pool.
    pub extraction: ExtractionConfig,
    /// Interaction components and PageRank.
    pub analysis: AnalysisConfig,
}

impl PipelineConfig {
    /// Parses a JSON configuration and validates it.
    ///
    /// # Errors
    /// Returns a validation error for malformed JSON or invalid settings.
    pub fn from_json_str(json: &str) -> KgResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("config is not valid JSON: {e}"),
        })?;
        config.validate()
    }

    /// Reads a JSON configuration file and validates it.
    ///
    /// # Errors
    /// Returns a validation error if the file cannot be read or is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> KgResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    /// Validates every section.
    ///
    /// # Errors
    /// Returns the first validation error found.
    pub fn validate(self) -> KgResult<Self> {
        if self.normalizer.honorifics.iter().any(|h| h.trim().is_empty()) {
            return Err(KgError::Validation(ValidationError::InvalidConfig {
                reason: "normalizer.honorifics must not contain blank entries".to_string(),
            }));
        }
        for t in &self.corroboration.relation_types {
            if !is_relation_token(t) {
                return Err(ValidationError::InvalidRelationType { value: t.clone() }.into());
            }
        }
        Ok(Self {
            schema: self.schema.validate()?,
            extraction: self.extraction.validate()?,
            analysis: self.analysis.validate()?,
            ..self
        })
    }
}
