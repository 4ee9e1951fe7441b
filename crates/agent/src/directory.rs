use async_trait::async_trait;
use handl_core::domain::task::TaskDescriptor;
use handl_core::queue::{DirectoryListing, DirectoryQuery};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("directory search is not configured: {0}")]
    NotConfigured(String),
    #[error("directory search rejected the query: {0}")]
    Rejected(String),
    #[error("directory search is unavailable: {0}")]
    Unavailable(String),
}

/// Business lookup. Results come back in the directory's native order.
#[async_trait]
pub trait DirectorySearch: Send + Sync {
    async fn search(&self, query: &DirectoryQuery) -> Result<Vec<DirectoryListing>, DirectoryError>;
}

/// Builds a search from the task: service as the query, plus location and criteria.
pub fn query_for(descriptor: &TaskDescriptor, limit: usize) -> Option<DirectoryQuery> {
    let info = &descriptor.extracted_info;
    let query = info.value_of("service")?;

    Some(DirectoryQuery {
        query,
        location: info.value_of("location"),
        limit,
        preferred_criteria: info.preferred_criteria,
    })
}

#[cfg(test)]
mod tests {
    use handl_core::domain::task::{ExtractedInfo, PreferredCriteria, TaskDescriptor};

    use super::query_for;

    #[test]
    fn query_uses_service_location_and_criteria() {
        let descriptor = TaskDescriptor {
            extracted_info: ExtractedInfo {
                service: Some("plumber".to_string()),
                location: Some("Oakland".to_string()),
                preferred_criteria: Some(PreferredCriteria::BestRated),
                ..ExtractedInfo::default()
            },
            ..TaskDescriptor::default()
        };

        let query = query_for(&descriptor, 7).expect("service present");
        assert_eq!(query.search_text(), "plumber in Oakland");
        assert_eq!(query.limit, 7);
        assert_eq!(query.preferred_criteria, Some(PreferredCriteria::BestRated));
    }

    #[test]
    fn no_service_means_no_query() {
        assert!(query_for(&TaskDescriptor::default(), 5).is_none());
    }
}
