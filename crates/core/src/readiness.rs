//! Call-readiness resolution and clarification answer folding.
//!
//! The resolver never writes to a [`TaskDescriptor`]. Answers collected from a
//! clarification form are folded into a single synthetic user turn that is fed
//! back through the conversation analyzer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::task::{CallType, InfoRequest, TaskDescriptor};

/// A reason a descriptor is not yet call-ready.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessGap {
    UnansweredRequired { field: String },
    MissingObjective,
    MissingCallType,
    MissingPhoneNumber,
    MissingLocation,
}

/// One answer typed into a clarification form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAnswer {
    pub field: String,
    pub value: String,
}

impl FieldAnswer {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("required field `{field}` was submitted empty")]
    RequiredFieldEmpty { field: String },
    #[error("no answers were provided")]
    NothingAnswered,
}

#[derive(Clone, Debug, Default)]
pub struct MissingInfoResolver;

impl MissingInfoResolver {
    pub fn resolve(descriptor: &TaskDescriptor) -> bool {
        Self::gaps(descriptor).is_empty()
    }

    pub fn gaps(descriptor: &TaskDescriptor) -> Vec<ReadinessGap> {
        let info = &descriptor.extracted_info;
        let mut gaps = descriptor
            .missing_info
            .iter()
            .filter(|request| request.required && !info.has_value(&request.field))
            .map(|request| ReadinessGap::UnansweredRequired { field: request.field.clone() })
            .collect::<Vec<_>>();

        if descriptor.objective().is_none() {
            gaps.push(ReadinessGap::MissingObjective);
        }

        match descriptor.call_type {
            None => gaps.push(ReadinessGap::MissingCallType),
            Some(CallType::CallSpecificNumber) if !info.has_value("phoneNumber") => {
                gaps.push(ReadinessGap::MissingPhoneNumber)
            }
            Some(CallType::CallBusinesses) if !info.has_value("location") => {
                gaps.push(ReadinessGap::MissingLocation)
            }
            Some(_) => {}
        }

        gaps
    }

    /// Entries the clarification form should still show, required first.
    pub fn pending_requests(descriptor: &TaskDescriptor) -> Vec<&InfoRequest> {
        let mut pending = descriptor
            .missing_info
            .iter()
            .filter(|request| !descriptor.extracted_info.has_value(&request.field))
            .collect::<Vec<_>>();
        pending.sort_by_key(|request| !request.required);
        pending
    }

    /// Folds a batch of answers into one synthetic user message.
    ///
    /// Blank optional answers are skipped; a blank required answer is an error.
    pub fn fold_answers(
        requests: &[InfoRequest],
        answers: &[FieldAnswer],
    ) -> Result<String, AnswerError> {
        let lines = Self::answered_lines(requests, answers)?;
        Ok(format!("Here is the additional information:\n{}", lines.join("\n")))
    }

    /// Renders answers as `- question value` lines without the preamble.
    pub fn answered_lines(
        requests: &[InfoRequest],
        answers: &[FieldAnswer],
    ) -> Result<Vec<String>, AnswerError> {
        for request in requests.iter().filter(|request| request.required) {
            let answered = answers
                .iter()
                .any(|answer| answer.field == request.field && !answer.value.trim().is_empty());
            if !answered {
                return Err(AnswerError::RequiredFieldEmpty { field: request.field.clone() });
            }
        }

        let lines = answers
            .iter()
            .filter(|answer| !answer.value.trim().is_empty())
            .map(|answer| {
                let label = requests
                    .iter()
                    .find(|request| request.field == answer.field)
                    .map(|request| request.question.trim())
                    .filter(|question| !question.is_empty())
                    .unwrap_or(answer.field.as_str());
                format!("- {label} {}", answer.value.trim())
            })
            .collect::<Vec<_>>();

        if lines.is_empty() {
            return Err(AnswerError::NothingAnswered);
        }
        Ok(lines)
    }
}
