//! Incremental extraction of a narrative section and delimited records.
//!
//! The stream looks like `THINKING: <narrative> TOPIC: <payload> TOPIC: ...`.
//! Narrative text is released as soon as it cannot be part of a record
//! marker; each record is decoded once the next marker (or the end of the
//! stream) proves its payload complete.

use crate::llm::Fragment;

use super::decoder::RecordDecoder;
use super::marker::{partial_suffix_len, split_partial};

/// Default marker opening the narrative section
pub const DEFAULT_NARRATIVE_MARKER: &str = "THINKING:";

/// Default marker preceding every record
pub const DEFAULT_RECORD_MARKER: &str = "TOPIC:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub narrative_marker: String,
    pub record_marker: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            narrative_marker: DEFAULT_NARRATIVE_MARKER.to_string(),
            record_marker: DEFAULT_RECORD_MARKER.to_string(),
        }
    }
}

/// A decoded record and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord<T> {
    /// 1-based arrival order; skipped payloads still consume theirs
    pub ordinal: u32,
    pub payload: T,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractEvent<T> {
    Narrative(String),
    Record(ExtractedRecord<T>),
}

/// A record payload that failed to decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub ordinal: u32,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Preamble,
    Narrative,
    Record,
}

/// Per-session extractor state
pub struct StructuredStreamExtractor<D: RecordDecoder> {
    config: ExtractorConfig,
    decoder: D,
    mode: Mode,
    buffer: String,
    narrative: String,
    last_ordinal: u32,
    decoded: usize,
    skipped: Vec<SkippedRecord>,
}

impl<D: RecordDecoder> StructuredStreamExtractor<D> {
    pub fn new(decoder: D) -> Self {
        Self::with_config(ExtractorConfig::default(), decoder)
    }

    pub fn with_config(config: ExtractorConfig, decoder: D) -> Self {
        Self {
            config,
            decoder,
            mode: Mode::Preamble,
            buffer: String::new(),
            narrative: String::new(),
            last_ordinal: 0,
            decoded: 0,
            skipped: Vec::new(),
        }
    }

    /// Feed one fragment, returning whatever it proves
    pub fn consume(&mut self, fragment: &Fragment) -> Vec<ExtractEvent<D::Output>> {
        let text = fragment.reasoning_text().unwrap_or(fragment.as_str());
        self.buffer.push_str(text);

        let mut events = Vec::new();
        loop {
            let progressed = match self.mode {
                Mode::Preamble => self.scan_preamble(),
                Mode::Narrative => self.scan_narrative(&mut events),
                Mode::Record => self.scan_record(&mut events),
            };
            if !progressed {
                break;
            }
        }
        events
    }

    /// End of stream: flush held narrative and decode the last record
    pub fn finish(&mut self) -> Vec<ExtractEvent<D::Output>> {
        let mut events = Vec::new();
        let rest = std::mem::take(&mut self.buffer);
        match self.mode {
            Mode::Preamble => {
                if !rest.trim().is_empty() {
                    log::debug!("Discarding {} bytes of text without a narrative marker", rest.len());
                }
            }
            Mode::Narrative => self.emit_narrative(rest.trim_end(), &mut events),
            Mode::Record => self.emit_record(&rest, &mut events),
        }
        events
    }

    /// Narrative text released so far
    pub fn narrative(&self) -> &str {
        &self.narrative
    }

    /// Number of records decoded so far
    pub fn record_count(&self) -> usize {
        self.decoded
    }

    /// Ordinal of the last record seen, decoded or not
    pub fn last_ordinal(&self) -> u32 {
        self.last_ordinal
    }

    /// Payloads that failed to decode
    pub fn skipped(&self) -> &[SkippedRecord] {
        &self.skipped
    }

    fn scan_preamble(&mut self) -> bool {
        let narrative = self.buffer.find(&self.config.narrative_marker);
        let record = self.buffer.find(&self.config.record_marker);

        let (pos, len, next) = match (narrative, record) {
            (Some(n), Some(r)) if r < n => (r, self.config.record_marker.len(), Mode::Record),
            (Some(n), _) => (n, self.config.narrative_marker.len(), Mode::Narrative),
            (None, Some(r)) => (r, self.config.record_marker.len(), Mode::Record),
            (None, None) => {
                let held = partial_suffix_len(&self.buffer, &self.config.narrative_marker)
                    .max(partial_suffix_len(&self.buffer, &self.config.record_marker));
                self.buffer.drain(..self.buffer.len() - held);
                return false;
            }
        };

        self.buffer.drain(..pos + len);
        self.mode = next;
        true
    }

    fn scan_narrative(&mut self, events: &mut Vec<ExtractEvent<D::Output>>) -> bool {
        if let Some(pos) = self.buffer.find(&self.config.record_marker) {
            let section: String = self.buffer.drain(..pos + self.config.record_marker.len()).collect();
            self.emit_narrative(section[..pos].trim_end(), events);
            self.mode = Mode::Record;
            return true;
        }

        let (settled, _) = split_partial(&self.buffer, &self.config.record_marker);
        let ready = settled.trim_end().len();
        let released: String = self.buffer.drain(..ready).collect();
        self.emit_narrative(&released, events);
        false
    }

    fn scan_record(&mut self, events: &mut Vec<ExtractEvent<D::Output>>) -> bool {
        match self.buffer.find(&self.config.record_marker) {
            Some(pos) => {
                let section: String = self.buffer.drain(..pos + self.config.record_marker.len()).collect();
                self.emit_record(&section[..pos], events);
                true
            }
            None => false,
        }
    }

    fn emit_narrative(&mut self, text: &str, events: &mut Vec<ExtractEvent<D::Output>>) {
        let text = if self.narrative.is_empty() {
            text.trim_start()
        } else {
            text
        };
        if text.is_empty() {
            return;
        }
        self.narrative.push_str(text);
        events.push(ExtractEvent::Narrative(text.to_string()));
    }

    fn emit_record(&mut self, raw: &str, events: &mut Vec<ExtractEvent<D::Output>>) {
        self.last_ordinal += 1;
        let ordinal = self.last_ordinal;
        let raw = raw.trim();

        match self.decoder.decode(raw) {
            Ok(payload) => {
                self.decoded += 1;
                events.push(ExtractEvent::Record(ExtractedRecord {
                    ordinal,
                    payload,
                    raw: raw.to_string(),
                }));
            }
            Err(e) => {
                log::warn!("Skipping record {}: {}", ordinal, e);
                self.skipped.push(SkippedRecord {
                    ordinal,
                    raw: raw.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::decoder::{JsonValueDecoder, TopicDecoder};
    use serde_json::json;

    type Events = Vec<ExtractEvent<serde_json::Value>>;

    fn run(parts: &[&str]) -> (StructuredStreamExtractor<JsonValueDecoder>, Events) {
        let mut extractor = StructuredStreamExtractor::new(JsonValueDecoder);
        let mut events = Vec::new();
        for part in parts {
            events.extend(extractor.consume(&Fragment::content(*part)));
        }
        events.extend(extractor.finish());
        (extractor, events)
    }

    fn narrative_of(events: &Events) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                ExtractEvent::Narrative(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn records_of(events: &Events) -> Vec<(u32, serde_json::Value)> {
        events
            .iter()
            .filter_map(|e| match e {
                ExtractEvent::Record(r) => Some((r.ordinal, r.payload.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_narrative_then_records() {
        let (_, events) = run(&[
            "THINKING:\nbecause X",
            " is true\nTOPIC:\n{\"title\":\"A\"}\nTOPIC:\n{\"title\":\"B\"}",
        ]);
        assert_eq!(narrative_of(&events), "because X is true");
        assert_eq!(
            records_of(&events),
            vec![(1, json!({"title": "A"})), (2, json!({"title": "B"}))]
        );
    }

    #[test]
    fn test_record_emitted_when_next_marker_arrives() {
        let mut extractor = StructuredStreamExtractor::new(JsonValueDecoder);
        extractor.consume(&Fragment::content("THINKING: ok TOPIC: {\"n\":1}"));
        assert_eq!(extractor.record_count(), 0);
        let events = extractor.consume(&Fragment::content(" TOPIC: {\"n\":2}"));
        assert_eq!(records_of(&events), vec![(1, json!({"n": 1}))]);
        let events = extractor.finish();
        assert_eq!(records_of(&events), vec![(2, json!({"n": 2}))]);
    }

    #[test]
    fn test_preamble_discarded() {
        let (extractor, events) = run(&["Sure! Here you go.\nTHINKING: plan\nTOPIC: {}"]);
        assert_eq!(narrative_of(&events), "plan");
        assert_eq!(extractor.narrative(), "plan");
    }

    #[test]
    fn test_starts_directly_with_record() {
        let (_, events) = run(&["TOPIC: {\"title\":\"only\"}"]);
        assert_eq!(narrative_of(&events), "");
        assert_eq!(records_of(&events), vec![(1, json!({"title": "only"}))]);
    }

    #[test]
    fn test_malformed_record_skipped_without_gap() {
        let (extractor, events) = run(&[
            "THINKING: x\nTOPIC: {\"n\":1}\nTOPIC: {broken\nTOPIC: {\"n\":3}",
        ]);
        assert_eq!(
            records_of(&events),
            vec![(1, json!({"n": 1})), (3, json!({"n": 3}))]
        );
        assert_eq!(extractor.skipped().len(), 1);
        assert_eq!(extractor.skipped()[0].ordinal, 2);
        assert_eq!(extractor.last_ordinal(), 3);
    }

    #[test]
    fn test_partial_marker_held_back() {
        let mut extractor = StructuredStreamExtractor::new(JsonValueDecoder);
        let events = extractor.consume(&Fragment::content("THINKING: alpha TOP"));
        assert_eq!(narrative_of(&events), "alpha");
        let events = extractor.consume(&Fragment::content("IC: {}"));
        assert!(narrative_of(&events).is_empty());
        assert_eq!(extractor.narrative(), "alpha");
    }

    #[test]
    fn test_false_partial_marker_released_as_narrative() {
        let (_, events) = run(&["THINKING: learn TO", "OLS first\nTOPIC: {}"]);
        assert_eq!(narrative_of(&events), "learn TOOLS first");
    }

    #[test]
    fn test_unterminated_narrative_flushed_on_finish() {
        let (_, events) = run(&["THINKING: thoughts  \n"]);
        assert_eq!(narrative_of(&events), "thoughts");
        assert!(records_of(&events).is_empty());
    }

    #[test]
    fn test_no_markers_yields_nothing() {
        let (_, events) = run(&["just chatting"]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_split_invariance() {
        let source = "intro THINKING:\n  We start with basics,\nthen go deeper.  \nTOPIC:\n```json\n{\"title\":\"A\",\"estimatedMinutes\":20}\n```\nTOPIC: {\"title\":\"B\"}\nTOPIC: nope\nTOPIC: {\"title\":\"D\"}\n";
        let (_, whole) = run(&[source]);

        for size in [1, 2, 3, 4, 6, 9, 13] {
            let parts: Vec<String> = source
                .as_bytes()
                .chunks(size)
                .map(|c| String::from_utf8(c.to_vec()).unwrap())
                .collect();
            let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
            let (_, split) = run(&parts);
            assert_eq!(narrative_of(&split), narrative_of(&whole), "size {}", size);
            assert_eq!(records_of(&split), records_of(&whole), "size {}", size);
        }

        assert_eq!(narrative_of(&whole), "We start with basics,\nthen go deeper.");
        let ordinals: Vec<u32> = records_of(&whole).iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, vec![1, 2, 4]);
    }

    #[test]
    fn test_topic_decoder_records() {
        let mut extractor = StructuredStreamExtractor::new(TopicDecoder);
        extractor.consume(&Fragment::content("THINKING: t\nTOPIC: {\"title\":\"Ownership\"}"));
        let events = extractor.finish();
        match &events[0] {
            ExtractEvent::Record(record) => {
                assert_eq!(record.ordinal, 1);
                assert_eq!(record.payload.title, "Ownership");
                assert_eq!(record.payload.estimated_minutes, 30);
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_markers() {
        let config = ExtractorConfig {
            narrative_marker: "PLAN:".to_string(),
            record_marker: "ITEM:".to_string(),
        };
        let mut extractor = StructuredStreamExtractor::with_config(config, JsonValueDecoder);
        let mut events = extractor.consume(&Fragment::content("PLAN: go ITEM: {\"a\":1} ITEM: {\"a\":2}"));
        events.extend(extractor.finish());
        assert_eq!(narrative_of(&events), "go");
        assert_eq!(records_of(&events).len(), 2);
    }
}
