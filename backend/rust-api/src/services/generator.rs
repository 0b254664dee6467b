use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::EngineError;
use crate::metrics::GENERATOR_CALLS_TOTAL;
use crate::models::{Stream, OPTION_COUNT};

/// Fixed batch requested from the upstream generator per call.
pub const GENERATION_BATCH: usize = 5;

/// Candidate item as produced by the generator, not yet a bank question.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    #[serde(rename = "correctAnswerIndex")]
    pub correct_answer_index: i64,
}

/// External text-generation collaborator. Implementations must not persist;
/// persistence of accepted items is the assembler's responsibility.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(
        &self,
        class: u8,
        stream: Stream,
        subject: &str,
        topic: &str,
    ) -> Result<Vec<GeneratedQuestion>, EngineError>;
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Adapter over a Gemini-style `generateContent` HTTP endpoint.
pub struct GeminiGenerator {
    http_client: Client,
    api_url: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(api_url: String, api_key: String) -> Self {
        Self {
            http_client: Client::new(),
            api_url,
            api_key,
        }
    }
}

#[async_trait]
impl QuestionGenerator for GeminiGenerator {
    async fn generate(
        &self,
        class: u8,
        stream: Stream,
        subject: &str,
        topic: &str,
    ) -> Result<Vec<GeneratedQuestion>, EngineError> {
        let prompt = build_prompt(class, stream, subject, topic);
        let url = format!("{}?key={}", self.api_url, self.api_key);

        tracing::debug!(
            "Calling question generator for class={} stream={} subject={} topic={:?}",
            class,
            stream,
            subject,
            topic
        );

        let result = self
            .http_client
            .post(&url)
            .json(&json!({
                "contents": [{ "parts": [{ "text": prompt }] }],
            }))
            .timeout(std::time::Duration::from_secs(20))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                GENERATOR_CALLS_TOTAL.with_label_values(&["error"]).inc();
                return Err(EngineError::Generation(format!(
                    "generator unreachable: {}",
                    e
                )));
            }
        };

        if !response.status().is_success() {
            GENERATOR_CALLS_TOTAL.with_label_values(&["error"]).inc();
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(EngineError::Generation(format!(
                "generator returned {}: {}",
                status, body
            )));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            GENERATOR_CALLS_TOTAL.with_label_values(&["error"]).inc();
            EngineError::Generation(format!("malformed generator envelope: {}", e))
        })?;

        let raw_text = parsed
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .unwrap_or_default();

        let accepted = parse_candidates(&raw_text)?;
        GENERATOR_CALLS_TOTAL.with_label_values(&["success"]).inc();
        tracing::info!(
            "Generator produced {} usable candidates for class={} subject={}",
            accepted.len(),
            class,
            subject
        );

        Ok(accepted)
    }
}

fn build_prompt(class: u8, stream: Stream, subject: &str, topic: &str) -> String {
    format!(
        "Generate {batch} multiple-choice questions for Class {class} students in stream \
         \"{stream}\" on the topic \"{topic}\" in the subject \"{subject}\".\n\n\
         Respond ONLY with raw JSON using this format:\n\n\
         [\n  {{\n    \"question\": \"What is 2 + 2?\",\n    \"options\": [\"1\", \"2\", \"3\", \"4\"],\n    \"correctAnswerIndex\": 3\n  }}\n]\n\n\
         Do NOT add triple backticks or extra explanations. Output should be raw JSON only.",
        batch = GENERATION_BATCH,
        class = class,
        stream = stream,
        topic = topic,
        subject = subject,
    )
}

/// Removes a surrounding Markdown code fence, if the model added one anyway.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parses the generator payload as a strict array of candidate items.
/// Individually malformed items are filtered out; a payload that is not an
/// array at all fails with `GenerationError`.
pub fn parse_candidates(raw: &str) -> Result<Vec<GeneratedQuestion>, EngineError> {
    let body = strip_code_fences(raw);
    let items: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| {
        EngineError::Generation(format!("generator returned unparseable content: {}", e))
    })?;

    let accepted = items
        .into_iter()
        .filter_map(|item| {
            let question = item.get("question")?.as_str()?.trim().to_string();
            if question.is_empty() {
                return None;
            }
            let options: Vec<String> = item
                .get("options")?
                .as_array()?
                .iter()
                .map(|opt| opt.as_str().map(|s| s.trim().to_string()))
                .collect::<Option<Vec<_>>>()?;
            if options.len() != OPTION_COUNT {
                return None;
            }
            let correct_answer_index = item.get("correctAnswerIndex")?.as_i64()?;
            if !(0..OPTION_COUNT as i64).contains(&correct_answer_index) {
                return None;
            }
            Some(GeneratedQuestion {
                question,
                options,
                correct_answer_index,
            })
        })
        .collect();

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_ITEM: &str = r#"{"question": "What is 2 + 2?", "options": ["1", "2", "3", "4"], "correctAnswerIndex": 3}"#;

    #[test]
    fn strips_json_code_fence() {
        let fenced = "```json\n[1, 2]\n```";
        assert_eq!(strip_code_fences(fenced), "[1, 2]");
    }

    #[test]
    fn strips_bare_code_fence() {
        let fenced = "```\n[1, 2]\n```";
        assert_eq!(strip_code_fences(fenced), "[1, 2]");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences("  [1, 2] "), "[1, 2]");
    }

    #[test]
    fn parses_well_formed_batch() {
        let raw = format!("[{}]", VALID_ITEM);
        let parsed = parse_candidates(&raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].question, "What is 2 + 2?");
        assert_eq!(parsed[0].correct_answer_index, 3);
    }

    #[test]
    fn parses_fenced_batch() {
        let raw = format!("```json\n[{}]\n```", VALID_ITEM);
        assert_eq!(parse_candidates(&raw).unwrap().len(), 1);
    }

    #[test]
    fn filters_item_with_wrong_option_count() {
        let raw = r#"[{"question": "Q?", "options": ["a", "b", "c"], "correctAnswerIndex": 0}]"#;
        assert!(parse_candidates(raw).unwrap().is_empty());
    }

    #[test]
    fn filters_item_with_out_of_range_index() {
        let raw = r#"[{"question": "Q?", "options": ["a", "b", "c", "d"], "correctAnswerIndex": 4}]"#;
        assert!(parse_candidates(raw).unwrap().is_empty());
    }

    #[test]
    fn filters_item_with_fractional_index() {
        let raw = r#"[{"question": "Q?", "options": ["a", "b", "c", "d"], "correctAnswerIndex": 1.5}]"#;
        assert!(parse_candidates(raw).unwrap().is_empty());
    }

    #[test]
    fn keeps_good_items_when_siblings_are_malformed() {
        let raw = format!(
            r#"[{}, {{"question": "", "options": ["a", "b", "c", "d"], "correctAnswerIndex": 0}}]"#,
            VALID_ITEM
        );
        assert_eq!(parse_candidates(&raw).unwrap().len(), 1);
    }

    #[test]
    fn non_array_payload_is_a_generation_error() {
        let err = parse_candidates(r#"{"oops": true}"#).unwrap_err();
        assert!(matches!(err, EngineError::Generation(_)));
    }

    #[test]
    fn prose_payload_is_a_generation_error() {
        let err = parse_candidates("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, EngineError::Generation(_)));
    }
}
