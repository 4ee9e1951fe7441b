//! Price and note carry-over between calls in one sequence.

use serde::{Deserialize, Serialize};

use crate::domain::call::CallInsight;

/// What earlier calls in the sequence learned that later calls should use.
///
/// Only the call sequencer writes to this. `best_price_seen` is last-writer-wins:
/// the most recent quoted price replaces the previous one without any numeric
/// comparison.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationContext {
    pub best_price_seen: Option<String>,
    pub carry_notes: Option<String>,
}

impl NegotiationContext {
    pub fn from_insight(insight: &CallInsight) -> Self {
        let mut context = Self::default();
        context.absorb(insight);
        context
    }

    /// Overwrites each field the insight carries a non-blank value for.
    pub fn absorb(&mut self, insight: &CallInsight) {
        if let Some(price) = non_blank(insight.price.as_deref()) {
            self.best_price_seen = Some(price);
        }
        if let Some(notes) = non_blank(insight.negotiation_notes.as_deref()) {
            self.carry_notes = Some(notes);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.best_price_seen.is_none() && self.carry_notes.is_none()
    }

    /// Base objective plus a price-matching directive and any carried notes.
    pub fn enhance_objective(&self, base: &str) -> String {
        let mut objective = base.trim().to_string();

        if let Some(price) = &self.best_price_seen {
            objective.push_str(&format!(
                "\n\nNEGOTIATION CONTEXT: Another business quoted {price}. \
                 Try to get a better price or ask them to match it."
            ));
        }
        if let Some(notes) = &self.carry_notes {
            objective.push_str(&format!("\n\nINSIGHTS FROM PREVIOUS CALLS: {notes}"));
        }

        objective
    }
}

/// Objective for the next dispatch, with or without carry-over.
pub fn enhanced_objective(base: &str, context: Option<&NegotiationContext>) -> String {
    match context {
        Some(context) => context.enhance_objective(base),
        None => base.trim().to_string(),
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
