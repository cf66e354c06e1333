//! Sentence-boundary guarded synthesis.
//!
//! Between the language model and text-to-speech, streamed text is buffered
//! at sentence boundaries and every sentence passes through the safety
//! filter's check-and-rewrite before the synthesis engine sees it. Partial
//! sentences are never synthesized except for the final flush at stream end.

use crate::engines::{SpeechSynthesizer, TextStream};
use crate::error::AgentError;
use schola_guardrail::SafetyFilter;
use schola_telemetry::SpanEvent;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Sentence-terminator punctuation. A terminator ends a sentence when the
/// trimmed buffer ends with it, or mid-buffer when followed by whitespace
/// (so decimals like `3.14` stay intact).
pub const SENTENCE_ENDINGS: [char; 5] = ['.', '!', '?', ':', ';'];

/// Accumulates streamed chunks and releases complete sentences.
#[derive(Debug, Default)]
pub struct SentenceBuffer {
    buffer: String,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every complete sentence it released, in
    /// order. A chunk carrying two terminators releases two sentences.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut flushed = Vec::new();

        while let Some(split_at) = next_sentence_end(&self.buffer) {
            let rest = self.buffer.split_off(split_at);
            flushed.push(std::mem::replace(&mut self.buffer, rest));
        }

        let trimmed = self.buffer.trim_end();
        if !trimmed.is_empty()
            && trimmed
                .chars()
                .next_back()
                .is_some_and(|c| SENTENCE_ENDINGS.contains(&c))
        {
            flushed.push(std::mem::take(&mut self.buffer));
        }
        flushed
    }

    /// Releases the remaining partial sentence at stream end, if it has any
    /// non-whitespace content.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Byte offset just past the first terminator that is followed by
/// whitespace, if any.
fn next_sentence_end(buffer: &str) -> Option<usize> {
    let mut chars = buffer.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        if SENTENCE_ENDINGS.contains(&c) {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some(index + c.len_utf8());
                }
            }
        }
    }
    None
}

/// Drives a text stream through the guardrail into synthesis.
///
/// Per sentence: check-and-rewrite, synthesize the safe text, push the
/// audio downstream, and record a `tts.sentence` span with both latencies.
/// Returns the concatenation of the safe text that was actually spoken.
pub async fn speak_guarded(
    filter: &SafetyFilter,
    tts: &Arc<dyn SpeechSynthesizer>,
    voice: &str,
    session_id: &str,
    agent_name: &str,
    mut text: TextStream,
    audio_tx: &mpsc::UnboundedSender<Vec<u8>>,
) -> Result<String, AgentError> {
    let mut buffer = SentenceBuffer::new();
    let mut spoken = String::new();

    while let Some(chunk) = text.recv().await {
        for sentence in buffer.push(&chunk) {
            flush_sentence(
                filter, tts, voice, session_id, agent_name, &sentence, audio_tx, &mut spoken,
            )
            .await?;
        }
    }
    if let Some(rest) = buffer.finish() {
        flush_sentence(
            filter, tts, voice, session_id, agent_name, &rest, audio_tx, &mut spoken,
        )
        .await?;
    }

    Ok(spoken)
}

#[allow(clippy::too_many_arguments)]
async fn flush_sentence(
    filter: &SafetyFilter,
    tts: &Arc<dyn SpeechSynthesizer>,
    voice: &str,
    session_id: &str,
    agent_name: &str,
    sentence: &str,
    audio_tx: &mpsc::UnboundedSender<Vec<u8>>,
    spoken: &mut String,
) -> Result<(), AgentError> {
    let guard_started = Instant::now();
    let (safe_text, rewritten) = filter
        .check_and_rewrite(sentence, session_id, agent_name)
        .await;
    let guardrail_ms = guard_started.elapsed().as_millis() as u64;

    let synth_started = Instant::now();
    let audio = tts.synthesize(&safe_text, voice).await?;
    let synthesis_ms = synth_started.elapsed().as_millis() as u64;

    SpanEvent::TtsSentence {
        session_id: session_id.to_string(),
        sentence_length: safe_text.chars().count(),
        guardrail_ms,
        synthesis_ms,
        rewritten,
    }
    .emit();

    // The room side of the audio path may be gone during a drain; speech
    // already synthesized is simply dropped.
    let _ = audio_tx.send(audio);
    spoken.push_str(&safe_text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flushes_once_per_terminator() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("What is").is_empty());
        let flushed = buffer.push(" an adjective?");
        assert_eq!(flushed, vec!["What is an adjective?"]);
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn multi_terminator_chunk_flushes_in_order() {
        let mut buffer = SentenceBuffer::new();
        let flushed = buffer.push("Hello. World!");
        assert_eq!(flushed, vec!["Hello.".to_string(), " World!".to_string()]);
    }

    #[test]
    fn no_terminator_flushes_only_on_finish() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("fifty").is_empty());
        assert!(buffer.push("-six").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("fifty-six"));
    }

    #[test]
    fn decimal_point_does_not_split() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("Pi is 3.14").is_empty());
        let flushed = buffer.push(" roughly.");
        assert_eq!(flushed, vec!["Pi is 3.14 roughly."]);
    }

    #[test]
    fn trailing_whitespace_still_flushes() {
        let mut buffer = SentenceBuffer::new();
        let flushed = buffer.push("All done! ");
        assert_eq!(flushed, vec!["All done!"]);
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn whitespace_only_finish_is_empty() {
        let mut buffer = SentenceBuffer::new();
        assert!(buffer.push("   ").is_empty());
        assert!(buffer.finish().is_none());
    }
}
