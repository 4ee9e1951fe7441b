use async_trait::async_trait;
use handl_agent::directory::{DirectoryError, DirectorySearch};
use handl_core::config::DirectoryConfig;
use handl_core::queue::{DirectoryListing, DirectoryQuery};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::warn;

const DETAIL_FIELDS: &str =
    "name,formatted_address,formatted_phone_number,rating,user_ratings_total,opening_hours";

/// Text search followed by a details lookup per place for phone numbers.
pub struct PlacesDirectory {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl PlacesDirectory {
    pub fn from_config(client: Client, config: &DirectoryConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, String> {
        let response = self
            .client
            .get(format!("{}/{path}", self.base_url))
            .query(params)
            .send()
            .await
            .map_err(|error| error.to_string())?;
        if !response.status().is_success() {
            return Err(format!("places endpoint returned {}", response.status()));
        }
        response.json().await.map_err(|error| error.to_string())
    }

    async fn details(&self, place_id: &str, api_key: &str) -> Option<Value> {
        let params = [("place_id", place_id), ("fields", DETAIL_FIELDS), ("key", api_key)];
        match self.get_json("details/json", &params).await {
            Ok(payload) if payload.get("status").and_then(Value::as_str) == Some("OK") => {
                payload.get("result").cloned()
            }
            Ok(payload) => {
                warn!(
                    event_name = "directory.details.rejected",
                    place_id,
                    status = payload.get("status").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                    "place details unavailable; using search record"
                );
                None
            }
            Err(error) => {
                warn!(
                    event_name = "directory.details.failed",
                    place_id,
                    error = %error,
                    "place details request failed; using search record"
                );
                None
            }
        }
    }
}

#[async_trait]
impl DirectorySearch for PlacesDirectory {
    async fn search(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryListing>, DirectoryError> {
        let api_key = self
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| DirectoryError::NotConfigured("directory.api_key is not set".to_string()))?;

        let search_text = query.search_text();
        let payload = self
            .get_json("textsearch/json", &[("query", search_text.as_str()), ("key", api_key)])
            .await
            .map_err(DirectoryError::Unavailable)?;
        let places = search_results(&payload)?;

        let mut listings = Vec::new();
        for place in places.into_iter().take(query.limit) {
            let Some(place_id) = place.get("place_id").and_then(Value::as_str) else {
                continue;
            };
            let details = self.details(place_id, api_key).await;
            listings.push(listing_from(&place, details.as_ref()));
        }
        Ok(listings)
    }
}

pub fn search_results(payload: &Value) -> Result<Vec<Value>, DirectoryError> {
    match payload.get("status").and_then(Value::as_str) {
        Some("OK") => Ok(payload
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()),
        Some("ZERO_RESULTS") => Ok(Vec::new()),
        Some(status) => Err(DirectoryError::Rejected(format!("places search status {status}"))),
        None => Err(DirectoryError::Unavailable("places search response has no status".to_string())),
    }
}

/// Details win where present; without details the listing has no phone number.
pub fn listing_from(place: &Value, details: Option<&Value>) -> DirectoryListing {
    let text = |value: &Value, key: &str| {
        value.get(key).and_then(Value::as_str).map(str::to_string).filter(|text| !text.is_empty())
    };
    let source = details.unwrap_or(place);

    DirectoryListing {
        name: text(source, "name").or_else(|| text(place, "name")).unwrap_or_default(),
        address: text(source, "formatted_address")
            .or_else(|| text(place, "formatted_address"))
            .unwrap_or_default(),
        phone_number: details.and_then(|details| text(details, "formatted_phone_number")),
        rating: source.get("rating").and_then(Value::as_f64).filter(|rating| *rating > 0.0),
        total_ratings: source
            .get("user_ratings_total")
            .and_then(Value::as_u64)
            .and_then(|total| u32::try_from(total).ok())
            .filter(|total| *total > 0),
        place_id: text(place, "place_id").unwrap_or_default(),
        is_open: source.pointer("/opening_hours/open_now").and_then(Value::as_bool),
    }
}

#[cfg(test)]
mod tests {
    use handl_agent::directory::DirectoryError;
    use serde_json::json;

    use super::{listing_from, search_results};

    #[test]
    fn details_supply_phone_and_open_flag() {
        let place = json!({"place_id": "p1", "name": "Fix Fast", "formatted_address": "1 Main", "rating": 4.1});
        let details = json!({
            "name": "Fix Fast Repairs",
            "formatted_phone_number": "(555) 010-0111",
            "rating": 4.6,
            "user_ratings_total": 210,
            "opening_hours": {"open_now": true}
        });

        let listing = listing_from(&place, Some(&details));

        assert_eq!(listing.name, "Fix Fast Repairs");
        assert_eq!(listing.address, "1 Main");
        assert_eq!(listing.phone_number.as_deref(), Some("(555) 010-0111"));
        assert_eq!(listing.rating, Some(4.6));
        assert_eq!(listing.total_ratings, Some(210));
        assert_eq!(listing.is_open, Some(true));
        assert_eq!(listing.place_id, "p1");
    }

    #[test]
    fn missing_details_fall_back_to_search_record_without_phone() {
        let place = json!({
            "place_id": "p2",
            "name": "Screen Pros",
            "formatted_address": "2 Side St",
            "rating": 4.8,
            "opening_hours": {"open_now": false}
        });

        let listing = listing_from(&place, None);

        assert_eq!(listing.name, "Screen Pros");
        assert!(listing.phone_number.is_none());
        assert_eq!(listing.rating, Some(4.8));
        assert_eq!(listing.is_open, Some(false));
    }

    #[test]
    fn zero_results_is_empty_and_other_statuses_fail() {
        assert!(search_results(&json!({"status": "ZERO_RESULTS"})).expect("empty").is_empty());
        assert_eq!(
            search_results(&json!({"status": "OK", "results": [{"place_id": "p"}]}))
                .expect("results")
                .len(),
            1
        );
        assert!(matches!(
            search_results(&json!({"status": "REQUEST_DENIED"})),
            Err(DirectoryError::Rejected(_))
        ));
    }
}
