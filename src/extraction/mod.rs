//! Extraction: parsing extractor payloads and running the extractor over
//! pending pages.

mod payload;
mod runner;

pub use payload::{normalize_relation_type, parse_extraction, Extraction, RawEntity, RawRelation};
pub use runner::{ExtractionReport, ExtractionRunner, Extractor};
