//! Dispatch-metadata codec.
//!
//! The only state that crosses the worker boundary. Wire format is
//! `key:value|key:value|…` with keys and values free of `:` and `|`.
//! Recognised keys: `session`, `question`, `return_from_english`, `subject`.
//! Unknown keys are preserved and ignored; missing keys read as absent.

use crate::subject::Subject;
use std::str::FromStr;

/// Parsed dispatch metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchMetadata {
    /// Session id carried into a freshly dispatched worker.
    pub session: Option<String>,
    /// Question text replayed to the newly activated agent.
    pub question: Option<String>,
    /// Session id of a pipeline session being resumed after the realtime
    /// worker hands control back.
    pub return_from_english: Option<String>,
    /// The subject that was active before the handoff.
    pub subject: Option<Subject>,
    /// Unrecognised keys, preserved in order.
    pub extra: Vec<(String, String)>,
}

impl DispatchMetadata {
    /// Metadata for the pipeline → realtime dispatch.
    pub fn for_english_dispatch(
        session_id: impl Into<String>,
        question: impl Into<String>,
        prior_subject: Option<Subject>,
    ) -> Self {
        Self {
            session: Some(session_id.into()),
            question: Some(question.into()),
            subject: prior_subject,
            ..Self::default()
        }
    }

    /// Metadata for the realtime → pipeline return dispatch.
    pub fn for_return_to_pipeline(
        session_id: impl Into<String>,
        question: impl Into<String>,
        prior_subject: Option<Subject>,
    ) -> Self {
        Self {
            return_from_english: Some(session_id.into()),
            question: Some(question.into()),
            subject: prior_subject,
            ..Self::default()
        }
    }

    /// Parses the `k:v|k:v` wire form. Tolerant: entries without a `:` are
    /// kept as unknown keys with an empty value; unknown keys are preserved.
    pub fn parse(raw: &str) -> Self {
        let mut metadata = Self::default();
        for entry in raw.split('|') {
            if entry.is_empty() {
                continue;
            }
            let (key, value) = match entry.split_once(':') {
                Some((key, value)) => (key, value),
                None => (entry, ""),
            };
            match key {
                "session" => metadata.session = Some(value.to_string()),
                "question" => metadata.question = Some(value.to_string()),
                "return_from_english" => {
                    metadata.return_from_english = Some(value.to_string());
                }
                "subject" => metadata.subject = Subject::from_str(value).ok(),
                _ => metadata.extra.push((key.to_string(), value.to_string())),
            }
        }
        metadata
    }

    /// Serialises to the `k:v|k:v` wire form. Absent keys are omitted;
    /// unknown keys are carried through verbatim.
    pub fn format(&self) -> String {
        let mut entries = Vec::new();
        if let Some(session) = &self.session {
            entries.push(format!("session:{session}"));
        }
        if let Some(id) = &self.return_from_english {
            entries.push(format!("return_from_english:{id}"));
        }
        if let Some(question) = &self.question {
            entries.push(format!("question:{question}"));
        }
        if let Some(subject) = self.subject {
            entries.push(format!("subject:{subject}"));
        }
        for (key, value) in &self.extra {
            entries.push(format!("{key}:{value}"));
        }
        entries.join("|")
    }
}
