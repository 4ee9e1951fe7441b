use std::sync::Arc;

use async_trait::async_trait;
use handl_core::domain::call::CallInsight;
use handl_core::domain::task::ExtractedInfo;
use serde_json::Value;
use thiserror::Error;

use crate::conversation::{bool_field, parse_info_request, parse_json_object, string_field};
use crate::llm::{ChatMessage, LlmClient};

const INSIGHT_PROMPT: &str = r#"You are a call analyst for Handl. An AI assistant called a business for a user; analyze the transcript.

1. summary: 2-3 sentences on the outcome.
2. price: any specific price, quote or range mentioned ("number" or "min-max"), else null.
3. hasNewQuestions/newQuestions: did the business ask for details we did not have, or did the call show we need more from the user before calling others? Only ask for what is strictly necessary.
4. insights: what from this call would help the NEXT call to a different business (e.g. "They quoted $100 but can do it today").

Return JSON:
{"summary": string, "price": string|number|null, "hasNewQuestions": boolean,
 "newQuestions": [{"field": string, "reason": string, "question": string,
   "type": "text"|"select"|"number"|"tel"|"date"|"textarea", "required": boolean,
   "options": [string], "placeholder": string}],
 "insights": string}"#;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InsightError {
    #[error("transcript is empty")]
    EmptyTranscript,
    #[error("language model request failed: {0}")]
    Llm(String),
    #[error("insight extractor returned a malformed response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait CallInsightExtractor: Send + Sync {
    async fn extract(
        &self,
        transcript: &str,
        context: &ExtractedInfo,
    ) -> Result<CallInsight, InsightError>;
}

pub struct LlmInsightExtractor {
    client: Arc<dyn LlmClient>,
}

impl LlmInsightExtractor {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallInsightExtractor for LlmInsightExtractor {
    async fn extract(
        &self,
        transcript: &str,
        context: &ExtractedInfo,
    ) -> Result<CallInsight, InsightError> {
        if transcript.trim().is_empty() {
            return Err(InsightError::EmptyTranscript);
        }

        let task_context = serde_json::to_string(context)
            .map_err(|error| InsightError::MalformedResponse(error.to_string()))?;
        let messages = [
            ChatMessage::system(format!(
                "{INSIGHT_PROMPT}\n\nThe assistant was calling about: {task_context}"
            )),
            ChatMessage::user(format!("Here is the transcript to analyze:\n\n{transcript}")),
        ];

        let raw = self
            .client
            .complete(&messages)
            .await
            .map_err(|error| InsightError::Llm(error.to_string()))?;
        parse_insight(&raw)
    }
}

/// Numeric prices become their decimal string; `insights` maps to negotiation notes.
pub fn parse_insight(raw: &str) -> Result<CallInsight, InsightError> {
    let object = parse_json_object(raw).map_err(InsightError::MalformedResponse)?;

    let price = match object.get("price") {
        Some(Value::Number(number)) => Some(number.to_string()),
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    };

    let new_questions = match object.get("newQuestions") {
        Some(Value::Array(entries)) => entries.iter().filter_map(parse_info_request).collect(),
        _ => Vec::new(),
    };

    Ok(CallInsight {
        summary: string_field(&object, "summary").unwrap_or_default(),
        price,
        has_new_questions: bool_field(&object, "hasNewQuestions"),
        new_questions,
        negotiation_notes: string_field(&object, "insights")
            .or_else(|| string_field(&object, "negotiationNotes")),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use handl_core::domain::task::ExtractedInfo;

    use super::{parse_insight, CallInsightExtractor, InsightError, LlmInsightExtractor};
    use crate::testing::ScriptedLlm;

    #[test]
    fn numeric_price_is_normalised_to_string() {
        let insight = parse_insight(
            r#"{"summary": "Quoted a repair.", "price": 150, "hasNewQuestions": false,
                "newQuestions": [], "insights": "Same-day service available"}"#,
        )
        .expect("valid insight");

        assert_eq!(insight.price.as_deref(), Some("150"));
        assert_eq!(insight.negotiation_notes.as_deref(), Some("Same-day service available"));
        assert!(insight.pending_questions().is_none());
    }

    #[test]
    fn range_price_and_new_questions_are_kept() {
        let insight = parse_insight(
            r#"{"summary": "Needs the model.", "price": "120-180", "hasNewQuestions": true,
                "newQuestions": [{"field": "device_model", "question": "Which model?", "required": true}]}"#,
        )
        .expect("valid insight");

        assert_eq!(insight.price.as_deref(), Some("120-180"));
        assert_eq!(insight.pending_questions().map(<[_]>::len), Some(1));
    }

    #[test]
    fn null_price_and_prose_output() {
        let insight = parse_insight(r#"{"summary": "No answer.", "price": null}"#).expect("valid");
        assert!(insight.price.is_none());
        assert!(!insight.has_new_questions);

        assert!(matches!(
            parse_insight("The call went well."),
            Err(InsightError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn extractor_sends_transcript_and_task_context() {
        let llm = Arc::new(ScriptedLlm::with_responses([r#"{"summary": "ok", "price": "90"}"#]));
        let extractor = LlmInsightExtractor::new(llm.clone());
        let context =
            ExtractedInfo { service: Some("screen repair".to_string()), ..ExtractedInfo::default() };

        let insight = extractor
            .extract("AI: how much? Shop: ninety dollars", &context)
            .await
            .expect("insight");

        assert_eq!(insight.price.as_deref(), Some("90"));
        let requests = llm.requests();
        assert!(requests[0][0].content.contains("screen repair"));
        assert!(requests[0][1].content.contains("ninety dollars"));
    }

    #[tokio::test]
    async fn empty_transcript_is_not_sent() {
        let llm = Arc::new(ScriptedLlm::with_responses(Vec::<String>::new()));
        let extractor = LlmInsightExtractor::new(llm.clone());

        let error =
            extractor.extract("  ", &ExtractedInfo::default()).await.expect_err("empty transcript");
        assert_eq!(error, InsightError::EmptyTranscript);
        assert!(llm.requests().is_empty());
    }
}
