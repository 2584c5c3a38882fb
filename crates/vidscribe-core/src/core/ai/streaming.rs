//! Incremental decoding of line-delimited JSON responses.
//!
//! Used by every provider's streaming mode. Only textual deltas are kept;
//! control lines, SSE framing and malformed lines are skipped.

use futures::{Stream, StreamExt};
use serde_json::Value;

/// Pulls the text delta out of one decoded JSON line, if it carries one.
pub type DeltaExtractor = fn(&Value) -> Option<String>;

/// Splits a byte stream into lines and concatenates their text deltas.
#[derive(Debug)]
pub struct LineAccumulator {
    buffer: Vec<u8>,
    text: String,
    extract: DeltaExtractor,
}

impl LineAccumulator {
    pub fn new(extract: DeltaExtractor) -> Self {
        Self {
            buffer: Vec::new(),
            text: String::new(),
            extract,
        }
    }

    /// Feeds a chunk; complete lines are processed immediately.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line);
        }
    }

    /// Processes any trailing partial line and returns the accumulated text.
    pub fn finish(mut self) -> String {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.process_line(&rest);
        }
        self.text
    }

    fn process_line(&mut self, raw: &[u8]) {
        let Ok(line) = std::str::from_utf8(raw) else {
            return;
        };
        let line = line.trim();
        let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if payload.is_empty() || payload == "[DONE]" {
            return;
        }
        let Ok(value) = serde_json::from_str::<Value>(payload) else {
            return;
        };
        if let Some(delta) = (self.extract)(&value) {
            self.text.push_str(&delta);
        }
    }
}

/// Drains a chunk stream into the concatenated text deltas.
pub async fn collect_text<S, B, E>(mut stream: S, extract: DeltaExtractor) -> Result<String, E>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut accumulator = LineAccumulator::new(extract);
    while let Some(chunk) = stream.next().await {
        accumulator.push(chunk?.as_ref());
    }
    Ok(accumulator.finish())
}

// =============================================================================
// Delta extractors per wire format
// =============================================================================

/// Ollama `/api/generate`: `{"response": "..."}`
pub fn ollama_delta(value: &Value) -> Option<String> {
    value.get("response")?.as_str().map(str::to_string)
}

/// Chat-completions: `{"choices":[{"delta":{"content":"..."}}]}`
pub fn chat_completion_delta(value: &Value) -> Option<String> {
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Gemini SSE: `{"candidates":[{"content":{"parts":[{"text":"..."}]}}]}`
pub fn gemini_delta(value: &Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn chunks_split_mid_line_are_reassembled() {
        let mut acc = LineAccumulator::new(ollama_delta);
        acc.push(br#"{"response":"Hel"#);
        acc.push(b"lo\"}\n{\"response\":\" wor");
        acc.push(b"ld\",\"done\":false}\n{\"done\":true}");
        assert_eq!(acc.finish(), "Hello world");
    }

    #[test]
    fn malformed_and_control_lines_are_ignored() {
        let mut acc = LineAccumulator::new(chat_completion_delta);
        acc.push(b": keep-alive\n");
        acc.push(b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n");
        acc.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"A cat\"}}]}\n");
        acc.push(b"not json at all\n\n");
        acc.push(b"data: {\"choices\":[{\"delta\":{\"content\":\" sits.\"}}]}\n");
        acc.push(b"data: [DONE]\n");
        assert_eq!(acc.finish(), "A cat sits.");
    }

    #[test]
    fn gemini_parts_are_joined() {
        let mut acc = LineAccumulator::new(gemini_delta);
        acc.push(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Two \"},{\"text\":\"dogs\"}]}}]}\r\n");
        assert_eq!(acc.finish(), "Two dogs");
    }

    #[tokio::test]
    async fn collect_text_propagates_stream_errors() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"{\"response\":\"partial\"}\n".as_slice()),
            Err("connection reset".to_string()),
        ];
        let result = collect_text(stream::iter(chunks), ollama_delta).await;
        assert_eq!(result.unwrap_err(), "connection reset");
    }

    #[tokio::test]
    async fn collect_text_concatenates() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(b"{\"response\":\"a\"}\n{\"resp".to_vec()),
            Ok(b"onse\":\"b\"}\n".to_vec()),
        ];
        let text = collect_text(stream::iter(chunks), ollama_delta).await.unwrap();
        assert_eq!(text, "ab");
    }
}
