use serde::{Deserialize, Serialize};

/// One phone number eligible to be dialed, with an optional display label.
///
/// The number is kept verbatim; format validation belongs to the call
/// placement service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTarget {
    pub identity: Option<String>,
    pub phone_number: String,
}

impl CallTarget {
    pub fn new(identity: Option<String>, phone_number: impl Into<String>) -> Self {
        let identity = identity.filter(|name| !name.trim().is_empty());
        Self { identity, phone_number: phone_number.into() }
    }

    pub fn display_name(&self) -> &str {
        self.identity.as_deref().unwrap_or(&self.phone_number)
    }
}
