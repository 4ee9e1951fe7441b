use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::readiness::MissingInfoResolver;

/// Whether the latest analyzed turn changed the task or only produced a reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    TaskUpdate,
    Conversation,
}

impl ResponseKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "task_update" | "taskupdate" => Some(Self::TaskUpdate),
            "conversation" => Some(Self::Conversation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    CallBusinesses,
    CallSpecificNumber,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallBusinesses => "call_businesses",
            Self::CallSpecificNumber => "call_specific_number",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "call_businesses" => Some(Self::CallBusinesses),
            "call_specific_number" => Some(Self::CallSpecificNumber),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredCriteria {
    Cheapest,
    Fastest,
    Nearest,
    BestRated,
}

impl PreferredCriteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cheapest => "cheapest",
            Self::Fastest => "fastest",
            Self::Nearest => "nearest",
            Self::BestRated => "best_rated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "cheapest" => Some(Self::Cheapest),
            "fastest" => Some(Self::Fastest),
            "nearest" => Some(Self::Nearest),
            "best_rated" => Some(Self::BestRated),
            _ => None,
        }
    }
}

/// How a clarification form should collect an answer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Text,
    Select,
    Number,
    Tel,
    Date,
    Textarea,
}

impl InputKind {
    /// Unknown kinds degrade to free text so a form can always be rendered.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "select" => Self::Select,
            "number" => Self::Number,
            "tel" => Self::Tel,
            "date" => Self::Date,
            "textarea" => Self::Textarea,
            _ => Self::Text,
        }
    }
}

/// A single question the engine needs answered before (or between) calls.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoRequest {
    pub field: String,
    #[serde(default)]
    pub reason: String,
    pub question: String,
    #[serde(rename = "type", default)]
    pub input_kind: InputKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl InfoRequest {
    pub fn new(field: impl Into<String>, question: impl Into<String>, required: bool) -> Self {
        Self {
            field: field.into(),
            reason: String::new(),
            question: question.into(),
            input_kind: InputKind::Text,
            required,
            options: Vec::new(),
            placeholder: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_kind(mut self, input_kind: InputKind) -> Self {
        self.input_kind = input_kind;
        self
    }
}

/// Facts extracted from the conversation so far.
///
/// Every named field is optional. Fields the analyzer discovers beyond the
/// named ones land in `extras`, keyed by the analyzer's field name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractedInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_constraints: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_criteria: Option<PreferredCriteria>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_number: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub questions_to_ask: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,
    #[serde(flatten)]
    pub extras: BTreeMap<String, String>,
}

const NAMED_FIELDS: [&str; 12] = [
    "service",
    "servicedetails",
    "location",
    "budget",
    "timeconstraints",
    "preferredcriteria",
    "phonenumber",
    "username",
    "callbacknumber",
    "questionstoask",
    "additionalnotes",
    "timeconstraint",
];

impl ExtractedInfo {
    /// Builds the fact set from a loosely-typed JSON object.
    ///
    /// Known keys are accepted in camelCase or snake_case. Anything else is
    /// stringified into `extras`; nulls are skipped.
    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut info = Self::default();

        for (key, value) in object {
            let Some(text) = stringify(value) else {
                continue;
            };

            match normalize_field(key).as_str() {
                "service" => info.service = Some(text),
                "servicedetails" => info.service_details = Some(text),
                "location" => info.location = Some(text),
                "budget" => info.budget = Some(text),
                "timeconstraints" | "timeconstraint" => info.time_constraints = Some(text),
                "preferredcriteria" => match PreferredCriteria::parse(&text) {
                    Some(criteria) => info.preferred_criteria = Some(criteria),
                    None => {
                        info.extras.insert(key.clone(), text);
                    }
                },
                "phonenumber" => info.phone_number = Some(text),
                "username" => info.user_name = Some(text),
                "callbacknumber" => info.callback_number = Some(text),
                "questionstoask" => info.questions_to_ask = string_list(value),
                "additionalnotes" => info.additional_notes = Some(text),
                _ => {
                    info.extras.insert(key.clone(), text);
                }
            }
        }

        info
    }

    /// Returns the non-blank value recorded under `field`, if any.
    pub fn value_of(&self, field: &str) -> Option<String> {
        let normalized = normalize_field(field);
        let named = match normalized.as_str() {
            "service" => self.service.clone(),
            "servicedetails" => self.service_details.clone(),
            "location" => self.location.clone(),
            "budget" => self.budget.clone(),
            "timeconstraints" | "timeconstraint" => self.time_constraints.clone(),
            "preferredcriteria" => self.preferred_criteria.map(|c| c.as_str().to_string()),
            "phonenumber" => self.phone_number.clone(),
            "username" => self.user_name.clone(),
            "callbacknumber" => self.callback_number.clone(),
            "questionstoask" if !self.questions_to_ask.is_empty() => {
                Some(self.questions_to_ask.join("; "))
            }
            "additionalnotes" => self.additional_notes.clone(),
            _ => None,
        };

        let value = if NAMED_FIELDS.contains(&normalized.as_str()) {
            named
        } else {
            self.extras.get(field).cloned().or_else(|| {
                self.extras
                    .iter()
                    .find(|(key, _)| normalize_field(key) == normalized)
                    .map(|(_, value)| value.clone())
            })
        };

        value.filter(|value| !value.trim().is_empty())
    }

    pub fn has_value(&self, field: &str) -> bool {
        self.value_of(field).is_some()
    }
}

/// Structured representation of what the user wants accomplished.
///
/// Readiness is derived on every read through [`TaskDescriptor::is_call_ready`]
/// and is never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub response_kind: ResponseKind,
    pub call_type: Option<CallType>,
    pub extracted_info: ExtractedInfo,
    pub missing_info: Vec<InfoRequest>,
    pub call_objective: Option<String>,
}

impl Default for TaskDescriptor {
    fn default() -> Self {
        Self {
            response_kind: ResponseKind::Conversation,
            call_type: None,
            extracted_info: ExtractedInfo::default(),
            missing_info: Vec::new(),
            call_objective: None,
        }
    }
}

impl TaskDescriptor {
    pub fn is_call_ready(&self) -> bool {
        MissingInfoResolver::resolve(self)
    }

    pub fn objective(&self) -> Option<&str> {
        self.call_objective.as_deref().map(str::trim).filter(|objective| !objective.is_empty())
    }

    /// Appends to `serviceDetails`, keeping whatever was already recorded.
    pub fn append_service_details(&mut self, addition: &str) {
        let addition = addition.trim();
        if addition.is_empty() {
            return;
        }

        self.extracted_info.service_details = match self.extracted_info.service_details.take() {
            Some(existing) if !existing.trim().is_empty() => {
                Some(format!("{}\n{addition}", existing.trim_end()))
            }
            _ => Some(addition.to_string()),
        };
    }
}

fn normalize_field(field: &str) -> String {
    field.chars().filter(|ch| *ch != '_' && *ch != '-').flat_map(char::to_lowercase).collect()
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Array(items) => {
            let parts = items.iter().filter_map(stringify).collect::<Vec<_>>();
            Some(parts.join(", "))
        }
        Value::Object(_) => Some(value.to_string()),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(stringify)
            .filter(|item| !item.trim().is_empty())
            .collect(),
        Value::String(text) if !text.trim().is_empty() => vec![text.clone()],
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ExtractedInfo, PreferredCriteria, TaskDescriptor};

    #[test]
    fn known_fields_accept_camel_and_snake_case() {
        let payload = json!({
            "service": "screen repair",
            "service_details": "iPhone 13",
            "timeConstraints": "this week",
            "preferredCriteria": "best rated",
            "questionsToAsk": ["price?", "", "turnaround?"],
            "phoneNumber": null,
        });

        let info = ExtractedInfo::from_json_object(payload.as_object().expect("object"));

        assert_eq!(info.service.as_deref(), Some("screen repair"));
        assert_eq!(info.service_details.as_deref(), Some("iPhone 13"));
        assert_eq!(info.time_constraints.as_deref(), Some("this week"));
        assert_eq!(info.preferred_criteria, Some(PreferredCriteria::BestRated));
        assert_eq!(info.questions_to_ask, vec!["price?".to_string(), "turnaround?".to_string()]);
        assert!(info.phone_number.is_none());
        assert!(info.extras.is_empty());
    }

    #[test]
    fn unknown_fields_land_in_extension_bag_as_strings() {
        let payload = json!({
            "device_model": "Pixel 7",
            "has_insurance": true,
            "square_feet": 1200,
        });

        let info = ExtractedInfo::from_json_object(payload.as_object().expect("object"));

        assert_eq!(info.extras.get("device_model").map(String::as_str), Some("Pixel 7"));
        assert_eq!(info.extras.get("has_insurance").map(String::as_str), Some("true"));
        assert_eq!(info.extras.get("square_feet").map(String::as_str), Some("1200"));
        assert!(info.has_value("deviceModel"));
        assert!(!info.has_value("budget"));
    }

    #[test]
    fn blank_values_do_not_count_as_answers() {
        let info = ExtractedInfo { location: Some("   ".to_string()), ..ExtractedInfo::default() };
        assert!(!info.has_value("location"));
    }

    #[test]
    fn service_details_are_appended_not_replaced() {
        let mut descriptor = TaskDescriptor::default();
        descriptor.append_service_details("cracked screen");
        descriptor.append_service_details("  ");
        descriptor.append_service_details("model: iPhone 13");

        assert_eq!(
            descriptor.extracted_info.service_details.as_deref(),
            Some("cracked screen\nmodel: iPhone 13")
        );
    }

    #[test]
    fn extension_bag_round_trips_through_serde() {
        let mut info = ExtractedInfo { service: Some("plumber".to_string()), ..Default::default() };
        info.extras.insert("urgency".to_string(), "today".to_string());

        let encoded = serde_json::to_value(&info).expect("encode");
        assert_eq!(encoded["urgency"], "today");
        assert_eq!(encoded["service"], "plumber");

        let decoded: ExtractedInfo = serde_json::from_value(encoded).expect("decode");
        assert_eq!(decoded, info);
    }
}
