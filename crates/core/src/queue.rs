//! Call target queue construction from manual entries and directory results.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::target::CallTarget;
use crate::domain::task::PreferredCriteria;

/// A number typed in by the user, optionally labelled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualTarget {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: String,
}

/// One business returned by directory search.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub total_ratings: Option<u32>,
    pub place_id: String,
    #[serde(default)]
    pub is_open: Option<bool>,
}

impl DirectoryListing {
    pub fn dialable_number(&self) -> Option<&str> {
        self.phone_number.as_deref().map(str::trim).filter(|number| !number.is_empty())
    }

    pub fn to_target(&self) -> Option<CallTarget> {
        self.dialable_number().map(|number| CallTarget::new(Some(self.name.clone()), number))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryQuery {
    pub query: String,
    pub location: Option<String>,
    pub limit: usize,
    pub preferred_criteria: Option<PreferredCriteria>,
}

impl DirectoryQuery {
    pub const DEFAULT_LIMIT: usize = 5;

    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            location: None,
            limit: Self::DEFAULT_LIMIT,
            preferred_criteria: None,
        }
    }

    /// `"{query} in {location}"` when a location is known.
    pub fn search_text(&self) -> String {
        match self.location.as_deref().map(str::trim).filter(|location| !location.is_empty()) {
            Some(location) => format!("{} in {location}", self.query.trim()),
            None => self.query.trim().to_string(),
        }
    }
}

fn open_rank(listing: &DirectoryListing) -> u8 {
    match listing.is_open {
        Some(true) => 0,
        None => 1,
        Some(false) => 2,
    }
}

/// Higher ratings first; unrated listings after rated ones.
fn rating_desc(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare_listings(
    a: &DirectoryListing,
    b: &DirectoryListing,
    criteria: Option<PreferredCriteria>,
) -> Ordering {
    let by_open = open_rank(a).cmp(&open_rank(b));
    let by_criteria = match criteria {
        Some(PreferredCriteria::BestRated) => rating_desc(a.rating, b.rating).then_with(|| {
            b.total_ratings.unwrap_or(0).cmp(&a.total_ratings.unwrap_or(0))
        }),
        Some(PreferredCriteria::Cheapest) | Some(PreferredCriteria::Fastest) => {
            rating_desc(a.rating, b.rating)
        }
        Some(PreferredCriteria::Nearest) | None => Ordering::Equal,
    };
    by_open.then(by_criteria)
}

/// Stable sort: ties keep the directory's native order.
pub fn rank_listings(listings: &mut [DirectoryListing], criteria: Option<PreferredCriteria>) {
    listings.sort_by(|a, b| compare_listings(a, b, criteria));
}

/// Listings with a dialable number first, each half ranked independently.
pub fn order_for_display(
    listings: Vec<DirectoryListing>,
    criteria: Option<PreferredCriteria>,
) -> Vec<DirectoryListing> {
    let (mut with_phone, mut without_phone): (Vec<_>, Vec<_>) =
        listings.into_iter().partition(|listing| listing.dialable_number().is_some());
    rank_listings(&mut with_phone, criteria);
    rank_listings(&mut without_phone, criteria);
    with_phone.extend(without_phone);
    with_phone
}

/// Directory results plus which of them the user will call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSelection {
    pub listings: Vec<DirectoryListing>,
    pub selected: Vec<bool>,
}

impl SearchSelection {
    /// Every listing with a dialable number starts selected.
    pub fn preselected(listings: Vec<DirectoryListing>) -> Self {
        let selected = listings.iter().map(|listing| listing.dialable_number().is_some()).collect();
        Self { listings, selected }
    }

    /// Listings without a number can never be selected.
    pub fn set_selected(&mut self, index: usize, selected: bool) -> bool {
        let dialable = self
            .listings
            .get(index)
            .map(|listing| listing.dialable_number().is_some())
            .unwrap_or(false);
        match self.selected.get_mut(index) {
            Some(slot) if dialable => {
                *slot = selected;
                true
            }
            _ => false,
        }
    }

    pub fn selected_targets(&self) -> Vec<CallTarget> {
        self.listings
            .iter()
            .zip(self.selected.iter())
            .filter(|(_, selected)| **selected)
            .filter_map(|(listing, _)| listing.to_target())
            .collect()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("manual target #{index} has an empty phone number")]
    EmptyPhoneNumber { index: usize },
    #[error("no call targets were provided")]
    Empty,
}

/// Builds the dial-order queue: manual entries first, then selected listings.
#[derive(Clone, Debug, Default)]
pub struct TargetQueueBuilder {
    targets: Vec<CallTarget>,
    manual_count: usize,
}

impl TargetQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_manual(mut self, manual: &[ManualTarget]) -> Result<Self, QueueError> {
        for entry in manual {
            let index = self.manual_count;
            self.manual_count += 1;
            if entry.phone_number.trim().is_empty() {
                return Err(QueueError::EmptyPhoneNumber { index });
            }
            self.targets.push(CallTarget::new(entry.name.clone(), entry.phone_number.trim()));
        }
        Ok(self)
    }

    /// Listings without a dialable number are dropped.
    pub fn add_listings(mut self, listings: &[DirectoryListing]) -> Self {
        self.targets.extend(listings.iter().filter_map(DirectoryListing::to_target));
        self
    }

    pub fn add_selection(mut self, selection: &SearchSelection) -> Self {
        self.targets.extend(selection.selected_targets());
        self
    }

    pub fn build(self) -> Result<Vec<CallTarget>, QueueError> {
        if self.targets.is_empty() {
            return Err(QueueError::Empty);
        }
        Ok(self.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        order_for_display, rank_listings, DirectoryListing, DirectoryQuery, ManualTarget,
        QueueError, SearchSelection, TargetQueueBuilder,
    };
    use crate::domain::task::PreferredCriteria;

    fn listing(
        name: &str,
        phone: Option<&str>,
        rating: Option<f64>,
        total: Option<u32>,
        open: Option<bool>,
    ) -> DirectoryListing {
        DirectoryListing {
            name: name.to_string(),
            address: format!("{name} street"),
            phone_number: phone.map(str::to_string),
            rating,
            total_ratings: total,
            place_id: format!("place-{name}"),
            is_open: open,
        }
    }

    fn names(listings: &[DirectoryListing]) -> Vec<&str> {
        listings.iter().map(|listing| listing.name.as_str()).collect()
    }

    #[test]
    fn open_businesses_sort_before_closed_ones() {
        let mut listings = vec![
            listing("closed", Some("1"), Some(5.0), None, Some(false)),
            listing("unknown", Some("2"), Some(4.0), None, None),
            listing("open", Some("3"), Some(3.0), None, Some(true)),
        ];
        rank_listings(&mut listings, Some(PreferredCriteria::BestRated));
        assert_eq!(names(&listings), vec!["open", "unknown", "closed"]);
    }

    #[test]
    fn best_rated_breaks_rating_ties_by_review_count() {
        let mut listings = vec![
            listing("few", Some("1"), Some(4.5), Some(10), Some(true)),
            listing("unrated", Some("2"), None, Some(900), Some(true)),
            listing("many", Some("3"), Some(4.5), Some(200), Some(true)),
            listing("top", Some("4"), Some(4.9), Some(5), Some(true)),
        ];
        rank_listings(&mut listings, Some(PreferredCriteria::BestRated));
        assert_eq!(names(&listings), vec!["top", "many", "few", "unrated"]);
    }

    #[test]
    fn cheapest_and_fastest_use_rating_as_proxy() {
        for criteria in [PreferredCriteria::Cheapest, PreferredCriteria::Fastest] {
            let mut listings = vec![
                listing("low", Some("1"), Some(3.1), Some(900), None),
                listing("high", Some("2"), Some(4.8), Some(1), None),
            ];
            rank_listings(&mut listings, Some(criteria));
            assert_eq!(names(&listings), vec!["high", "low"]);
        }
    }

    #[test]
    fn nearest_keeps_native_order_within_open_state() {
        let mut listings = vec![
            listing("first", Some("1"), Some(2.0), None, Some(true)),
            listing("second", Some("2"), Some(5.0), None, Some(true)),
            listing("third", Some("3"), Some(4.0), None, Some(true)),
        ];
        rank_listings(&mut listings, Some(PreferredCriteria::Nearest));
        assert_eq!(names(&listings), vec!["first", "second", "third"]);
    }

    #[test]
    fn display_order_puts_dialable_listings_first() {
        let ordered = order_for_display(
            vec![
                listing("no-phone", None, Some(5.0), None, Some(true)),
                listing("blank-phone", Some("  "), Some(5.0), None, Some(true)),
                listing("phone", Some("+15550100"), Some(1.0), None, Some(false)),
            ],
            Some(PreferredCriteria::BestRated),
        );
        assert_eq!(names(&ordered), vec!["phone", "no-phone", "blank-phone"]);
    }

    #[test]
    fn selection_preselects_only_dialable_listings() {
        let mut selection = SearchSelection::preselected(vec![
            listing("a", Some("+1555"), None, None, None),
            listing("b", None, None, None, None),
            listing("c", Some("+1666"), None, None, None),
        ]);
        assert_eq!(selection.selected, vec![true, false, true]);
        assert!(!selection.set_selected(1, true));
        assert!(selection.set_selected(0, false));

        let targets = selection.selected_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].phone_number, "+1666");
    }

    #[test]
    fn queue_is_manual_entries_followed_by_selected_results() {
        let selection =
            SearchSelection::preselected(vec![listing("Shop", Some("+1777"), None, None, None)]);
        let queue = TargetQueueBuilder::new()
            .add_manual(&[ManualTarget { name: None, phone_number: " +1555 ".to_string() }])
            .expect("valid manual entry")
            .add_selection(&selection)
            .build()
            .expect("non-empty queue");

        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].phone_number, "+1555");
        assert!(queue[0].identity.is_none());
        assert_eq!(queue[1].identity.as_deref(), Some("Shop"));
    }

    #[test]
    fn empty_manual_number_and_empty_queue_are_rejected() {
        let error = TargetQueueBuilder::new()
            .add_manual(&[
                ManualTarget { name: Some("ok".to_string()), phone_number: "+1".to_string() },
                ManualTarget { name: Some("bad".to_string()), phone_number: " ".to_string() },
            ])
            .expect_err("blank phone number");
        assert_eq!(error, QueueError::EmptyPhoneNumber { index: 1 });

        assert_eq!(TargetQueueBuilder::new().build().expect_err("empty"), QueueError::Empty);
    }

    #[test]
    fn search_text_includes_location_when_known() {
        let mut query = DirectoryQuery::new("screen repair");
        assert_eq!(query.search_text(), "screen repair");
        assert_eq!(query.limit, 5);

        query.location = Some("San Jose".to_string());
        assert_eq!(query.search_text(), "screen repair in San Jose");
    }
}
