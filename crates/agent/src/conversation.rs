use std::sync::Arc;

use async_trait::async_trait;
use handl_core::domain::task::{
    CallType, ExtractedInfo, InfoRequest, InputKind, ResponseKind, TaskDescriptor,
};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::llm::{ChatMessage, LlmClient, Role};

const ANALYZER_PROMPT: &str = r#"You are the task analysis assistant for Handl, a service that places phone calls on a user's behalf.
Analyze the conversation and decide whether the latest user message changes the task or only needs a reply.

- New or additional task information: respond with "responseType": "task_update" and return the COMPLETE updated task.
- Questions, chit-chat or thanks: respond with "responseType": "conversation", include a "reply", and echo the previous extractedInfo, missingInfo, callType and callObjective unchanged.
- Confirmations such as "let's go" or "start calling" are task updates.

Return a single JSON object:
{
  "responseType": "task_update" | "conversation",
  "reply": "string, conversation turns only",
  "callType": "call_businesses" | "call_specific_number" | null,
  "extractedInfo": {
    "service": string|null, "serviceDetails": string|null, "location": string|null,
    "budget": string|null, "timeConstraints": string|null,
    "preferredCriteria": "cheapest"|"fastest"|"nearest"|"best_rated"|null,
    "phoneNumber": string|null, "questionsToAsk": [string], "additionalNotes": string|null,
    "userName": string|null, "callbackNumber": string|null
  },
  "missingInfo": [
    {"field": "name", "reason": "why", "question": "friendly question",
     "type": "text"|"select"|"number"|"tel"|"date"|"textarea", "required": boolean,
     "options": [string], "placeholder": string}
  ],
  "callObjective": "1-2 sentence summary of what the calls should accomplish"
}

Rules:
- Location is required for call_businesses; a phone number is required for call_specific_number.
- Mark a field required only if calls cannot proceed without it.
- Always list userName and callbackNumber as optional missingInfo entries until provided.
- Use "select" only for yes/no or short category lists; use "text" for models, brands and places."#;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalyzerError {
    #[error("conversation history is empty")]
    EmptyHistory,
    #[error("language model request failed: {0}")]
    Llm(String),
    #[error("analyzer returned a malformed response: {0}")]
    MalformedResponse(String),
}

impl AnalyzerError {
    /// Malformed output breaks the collaborator contract; transport errors do not.
    pub fn is_contract_failure(&self) -> bool {
        matches!(self, Self::MalformedResponse(_))
    }
}

/// One analyzed turn. `raw` is the analyzer output kept as the assistant turn.
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    pub response_kind: ResponseKind,
    pub reply: Option<String>,
    pub call_type: Option<CallType>,
    pub extracted_info: ExtractedInfo,
    pub missing_info: Vec<InfoRequest>,
    pub call_objective: Option<String>,
    pub raw: String,
}

impl Analysis {
    /// Task updates replace the descriptor's state; conversation turns leave it alone.
    pub fn apply_to(&self, descriptor: &mut TaskDescriptor) {
        descriptor.response_kind = self.response_kind;
        if self.response_kind == ResponseKind::Conversation {
            return;
        }

        descriptor.call_type = self.call_type;
        descriptor.extracted_info = self.extracted_info.clone();
        descriptor.missing_info = self.missing_info.clone();
        descriptor.call_objective = self.call_objective.clone();
    }
}

#[async_trait]
pub trait ConversationAnalyzer: Send + Sync {
    async fn analyze(&self, history: &[ChatMessage]) -> Result<Analysis, AnalyzerError>;
}

pub struct LlmConversationAnalyzer {
    client: Arc<dyn LlmClient>,
}

impl LlmConversationAnalyzer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConversationAnalyzer for LlmConversationAnalyzer {
    async fn analyze(&self, history: &[ChatMessage]) -> Result<Analysis, AnalyzerError> {
        let turns = history.iter().filter(|message| message.role != Role::System);
        let mut messages = vec![ChatMessage::system(ANALYZER_PROMPT)];
        messages.extend(turns.cloned());
        if messages.len() == 1 {
            return Err(AnalyzerError::EmptyHistory);
        }

        let raw = self
            .client
            .complete(&messages)
            .await
            .map_err(|error| AnalyzerError::Llm(error.to_string()))?;
        parse_analysis(&raw)
    }
}

/// Parses analyzer output into an [`Analysis`].
///
/// Unknown `callType` values become `None`, unknown input kinds become text,
/// and `missingInfo` entries without a field name are dropped.
pub fn parse_analysis(raw: &str) -> Result<Analysis, AnalyzerError> {
    let object = parse_json_object(raw).map_err(AnalyzerError::MalformedResponse)?;

    let response_kind = match object.get("responseType") {
        None | Some(Value::Null) => ResponseKind::TaskUpdate,
        Some(Value::String(kind)) => ResponseKind::parse(kind).ok_or_else(|| {
            AnalyzerError::MalformedResponse(format!("unknown responseType `{kind}`"))
        })?,
        Some(other) => {
            return Err(AnalyzerError::MalformedResponse(format!(
                "responseType must be a string, got {other}"
            )))
        }
    };

    // A task update replaces the descriptor, so it must carry the full field set.
    let extracted_info = match object.get("extractedInfo") {
        Some(Value::Object(fields)) => ExtractedInfo::from_json_object(fields),
        None | Some(Value::Null) if response_kind == ResponseKind::TaskUpdate => {
            return Err(AnalyzerError::MalformedResponse(
                "task_update without extractedInfo".to_string(),
            ))
        }
        None | Some(Value::Null) => ExtractedInfo::default(),
        Some(other) => {
            return Err(AnalyzerError::MalformedResponse(format!(
                "extractedInfo must be an object, got {other}"
            )))
        }
    };

    let missing_info = match object.get("missingInfo") {
        Some(Value::Array(entries)) => entries.iter().filter_map(parse_info_request).collect(),
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(AnalyzerError::MalformedResponse(format!(
                "missingInfo must be an array, got {other}"
            )))
        }
    };

    Ok(Analysis {
        response_kind,
        reply: string_field(&object, "reply"),
        call_type: string_field(&object, "callType").as_deref().and_then(CallType::parse),
        extracted_info,
        missing_info,
        call_objective: string_field(&object, "callObjective"),
        raw: raw.trim().to_string(),
    })
}

/// Accepts a bare JSON object, optionally wrapped in prose or a code fence.
pub(crate) fn parse_json_object(raw: &str) -> Result<Map<String, Value>, String> {
    let trimmed = raw.trim();
    let candidate = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => return Err("response does not contain a JSON object".to_string()),
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err("response is not a JSON object".to_string()),
        Err(error) => Err(format!("response is not valid JSON: {error}")),
    }
}

pub(crate) fn parse_info_request(value: &Value) -> Option<InfoRequest> {
    let entry = value.as_object()?;
    let field = string_field(entry, "field")?;
    let question = string_field(entry, "question").unwrap_or_else(|| field.clone());

    let mut request = InfoRequest::new(field, question, bool_field(entry, "required"))
        .with_kind(
            string_field(entry, "type").as_deref().map(InputKind::parse_lenient).unwrap_or_default(),
        );
    if let Some(reason) = string_field(entry, "reason") {
        request = request.with_reason(reason);
    }
    request.placeholder = string_field(entry, "placeholder");
    request.options = match entry.get("options") {
        Some(Value::Array(options)) => options
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|option| !option.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    Some(request)
}

pub(crate) fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    match object.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use handl_core::domain::task::{
        CallType, InfoRequest, InputKind, PreferredCriteria, ResponseKind, TaskDescriptor,
    };

    use super::{parse_analysis, AnalyzerError, ConversationAnalyzer, LlmConversationAnalyzer};
    use crate::llm::{ChatMessage, Role};
    use crate::testing::ScriptedLlm;

    const TASK_UPDATE: &str = r#"{
        "responseType": "task_update",
        "callType": "call_businesses",
        "extractedInfo": {
            "service": "screen repair",
            "location": "San Jose",
            "preferredCriteria": "cheapest",
            "device_model": "iPhone 13",
            "questionsToAsk": ["How much?", "How long?"]
        },
        "missingInfo": [
            {"field": "userName", "question": "What name should I use?", "type": "text", "required": false},
            {"field": "urgency", "question": "How urgent?", "type": "select", "required": true,
             "options": ["Today", "This week", " "]},
            {"question": "entry without a field is dropped"}
        ],
        "callObjective": "Find the cheapest iPhone 13 screen repair in San Jose"
    }"#;

    #[test]
    fn task_update_is_parsed_into_typed_fields() {
        let analysis = parse_analysis(TASK_UPDATE).expect("valid analysis");

        assert_eq!(analysis.response_kind, ResponseKind::TaskUpdate);
        assert_eq!(analysis.call_type, Some(CallType::CallBusinesses));
        assert_eq!(
            analysis.extracted_info.preferred_criteria,
            Some(PreferredCriteria::Cheapest)
        );
        assert_eq!(
            analysis.extracted_info.extras.get("device_model").map(String::as_str),
            Some("iPhone 13")
        );
        assert_eq!(analysis.missing_info.len(), 2);
        assert_eq!(analysis.missing_info[1].input_kind, InputKind::Select);
        assert_eq!(analysis.missing_info[1].options, vec!["Today", "This week"]);
        assert!(analysis.missing_info[1].required);
    }

    #[test]
    fn conversation_turn_never_alters_extracted_or_missing_info() {
        let mut descriptor = TaskDescriptor::default();
        parse_analysis(TASK_UPDATE).expect("task update").apply_to(&mut descriptor);
        let before = descriptor.clone();

        let reply = parse_analysis(
            r#"{"responseType": "conversation", "reply": "I call businesses for you.",
                "extractedInfo": {}, "missingInfo": [], "callType": null}"#,
        )
        .expect("conversation");
        reply.apply_to(&mut descriptor);

        assert_eq!(descriptor.response_kind, ResponseKind::Conversation);
        assert_eq!(descriptor.extracted_info, before.extracted_info);
        assert_eq!(descriptor.missing_info, before.missing_info);
        assert_eq!(descriptor.call_type, before.call_type);
        assert_eq!(reply.reply.as_deref(), Some("I call businesses for you."));
    }

    #[test]
    fn task_update_replaces_rather_than_merges() {
        let mut descriptor = TaskDescriptor::default();
        descriptor.missing_info.push(InfoRequest::new("budget", "Budget?", true));
        descriptor.extracted_info.budget = Some("$100".to_string());

        parse_analysis(TASK_UPDATE).expect("task update").apply_to(&mut descriptor);

        assert!(descriptor.extracted_info.budget.is_none());
        assert!(descriptor.missing_info.iter().all(|request| request.field != "budget"));
    }

    #[test]
    fn malformed_output_is_a_contract_failure() {
        for raw in ["Sure! Here is your task.", "[1, 2, 3]", "{\"responseType\": \"chat\"}"] {
            let error = parse_analysis(raw).expect_err("malformed");
            assert!(error.is_contract_failure(), "{raw}: {error}");
        }
    }

    #[test]
    fn task_update_without_extracted_info_keeps_the_stored_fields() {
        let mut descriptor = TaskDescriptor::default();
        parse_analysis(TASK_UPDATE).expect("task update").apply_to(&mut descriptor);
        let before = descriptor.clone();

        for raw in [
            r#"{"responseType": "task_update", "callType": "call_businesses", "callObjective": "Get a quote"}"#,
            r#"{"callType": "call_businesses", "extractedInfo": null, "callObjective": "Get a quote"}"#,
        ] {
            let error = parse_analysis(raw).expect_err("incomplete task update");
            assert!(error.is_contract_failure(), "{raw}: {error}");
        }

        assert_eq!(descriptor, before);
        assert_eq!(descriptor.extracted_info.location.as_deref(), Some("San Jose"));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let analysis = parse_analysis("```json\n{\"responseType\":\"conversation\",\"reply\":\"hi\"}\n```")
            .expect("fenced json");
        assert_eq!(analysis.response_kind, ResponseKind::Conversation);
    }

    #[tokio::test]
    async fn analyzer_prepends_system_prompt_to_history() {
        let llm = Arc::new(ScriptedLlm::with_responses([TASK_UPDATE]));
        let analyzer = LlmConversationAnalyzer::new(llm.clone());

        let analysis = analyzer
            .analyze(&[ChatMessage::user("find the cheapest screen repair in San Jose")])
            .await
            .expect("analysis");

        assert_eq!(analysis.call_type, Some(CallType::CallBusinesses));
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][1].role, Role::User);
    }

    #[tokio::test]
    async fn empty_history_is_rejected_without_calling_the_model() {
        let llm = Arc::new(ScriptedLlm::with_responses(Vec::<String>::new()));
        let analyzer = LlmConversationAnalyzer::new(llm.clone());

        let error = analyzer.analyze(&[]).await.expect_err("empty history");
        assert_eq!(error, AnalyzerError::EmptyHistory);
        assert!(llm.requests().is_empty());
    }
}
