//! Filter and pagination
//!
//! Pure functions every backend applies to its normalized listings.

use crate::model::{Filter, Labels};

/// Check whether a target tuple passes a filter
///
/// A `None` filter matches everything. Each non-empty dimension must equal the
/// target value exactly, and every filter label must be present with an equal
/// value among the target labels.
pub fn matches_filter(
    filter: Option<&Filter>,
    resource_pool_id: &str,
    resource_type_id: &str,
    location: &str,
    labels: &Labels,
) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    if !filter.resource_pool_id.is_empty() && filter.resource_pool_id != resource_pool_id {
        return false;
    }
    if !filter.resource_type_id.is_empty() && filter.resource_type_id != resource_type_id {
        return false;
    }
    if !filter.location.is_empty() && filter.location != location {
        return false;
    }

    filter
        .labels
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Filter check for catalog entries
///
/// Resource types have no pool, location or labels, so only the type
/// dimension applies.
pub fn matches_resource_type(filter: Option<&Filter>, resource_type_id: &str) -> bool {
    match filter {
        Some(f) => f.resource_type_id.is_empty() || f.resource_type_id == resource_type_id,
        None => true,
    }
}

/// Slice a listing to the requested window
///
/// `limit == 0` is unbounded. An offset at or past the end yields an empty
/// vector.
pub fn apply_pagination<T>(items: Vec<T>, limit: usize, offset: usize) -> Vec<T> {
    if offset >= items.len() {
        return Vec::new();
    }

    let end = if limit > 0 {
        items.len().min(offset.saturating_add(limit))
    } else {
        items.len()
    };

    items.into_iter().skip(offset).take(end - offset).collect()
}

/// Apply the filter's limit/offset, or nothing for a missing filter
pub fn paginate<T>(filter: Option<&Filter>, items: Vec<T>) -> Vec<T> {
    match filter {
        Some(f) => apply_pagination(items, f.limit, f.offset),
        None => items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_none_filter_matches_everything() {
        assert!(matches_filter(None, "p", "t", "l", &Labels::new()));
    }

    #[test]
    fn test_empty_dimensions_impose_no_constraint() {
        let filter = Filter::default();
        assert!(matches_filter(Some(&filter), "pool", "type", "zone", &Labels::new()));
    }

    #[test]
    fn test_populated_dimension_must_match_exactly() {
        let filter = Filter {
            location: "us-central1-a".into(),
            ..Filter::default()
        };
        assert!(matches_filter(Some(&filter), "", "", "us-central1-a", &Labels::new()));
        assert!(!matches_filter(Some(&filter), "", "", "us-central1-b", &Labels::new()));
        assert!(!matches_filter(Some(&filter), "", "", "US-CENTRAL1-A", &Labels::new()));
    }

    #[test]
    fn test_labels_subset_match() {
        let filter = Filter::default().with_label("env", "prod");
        let target = labels(&[("env", "prod"), ("team", "ran")]);
        assert!(matches_filter(Some(&filter), "", "", "", &target));

        let wrong_value = labels(&[("env", "dev")]);
        assert!(!matches_filter(Some(&filter), "", "", "", &wrong_value));
        assert!(!matches_filter(Some(&filter), "", "", "", &Labels::new()));
    }

    #[test]
    fn test_resource_type_filter_ignores_pool_dimensions() {
        let filter = Filter::for_pool("gcp-zone-a");
        assert!(matches_resource_type(Some(&filter), "n2-standard-2"));
        let filter = Filter {
            resource_type_id: "e2-medium".into(),
            ..Filter::default()
        };
        assert!(!matches_resource_type(Some(&filter), "n2-standard-2"));
        assert!(matches_resource_type(None, "n2-standard-2"));
    }

    #[test]
    fn test_pagination_windows() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(apply_pagination(items.clone(), 0, 0), items);
        assert_eq!(apply_pagination(items.clone(), 3, 0), vec![0, 1, 2]);
        assert_eq!(apply_pagination(items.clone(), 3, 2), vec![2, 3, 4]);
        assert!(apply_pagination(items.clone(), 3, 20).is_empty());
        assert_eq!(apply_pagination(items.clone(), 10, 5), vec![5, 6, 7, 8, 9]);
        assert_eq!(apply_pagination(items.clone(), 0, 7), vec![7, 8, 9]);
        assert!(apply_pagination(items, 1, 10).is_empty());
    }

    #[test]
    fn test_paginate_without_filter_returns_all() {
        let items = vec!["a", "b"];
        assert_eq!(paginate(None, items.clone()), items);
        let filter = Filter::default().with_page(1, 1);
        assert_eq!(paginate(Some(&filter), items), vec!["b"]);
    }
}
