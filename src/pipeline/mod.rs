//! Fragment processing pipeline
//!
//! Folds an ordered fragment stream over per-session parser state:
//! - DualChannelClassifier: splits reasoning from content
//! - StructuredStreamExtractor: narrative section plus delimited records
//! - RecordDecoder: turns record payloads into typed values

pub mod classifier;
pub mod decoder;
pub mod extractor;
pub mod marker;

pub use classifier::{
    ClassifiedEvent, ClassifierConfig, DEFAULT_CLOSE_TAG, DEFAULT_OPEN_TAG, DualChannelClassifier,
    strip_reasoning_artifacts,
};
pub use decoder::{DecodeError, JsonValueDecoder, RecordDecoder, TopicDecoder, extract_json};
pub use extractor::{ExtractEvent, ExtractedRecord, ExtractorConfig, SkippedRecord, StructuredStreamExtractor};
