//! Search request composition.

use serde::{Deserialize, Serialize};

use crate::clause::Clause;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchMode {
    #[default]
    Changes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub mode: SearchMode,
    pub clauses: Vec<Clause>,
    pub page: u32,
    pub page_size: u32,
}

/// Builds a fresh request from the committed clauses. Pages are 1-indexed and
/// not clamped here; callers keep `page` within the known page range.
pub fn compose(mode: SearchMode, clauses: &[Clause], page: u32, page_size: u32) -> SearchRequest {
    SearchRequest {
        mode,
        clauses: clauses.to_vec(),
        page,
        page_size,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRequest {
    pub request_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Operation;
    use crate::clause::{ClauseValue, Joiner};

    #[test]
    fn compose_is_fresh_but_equal_across_calls() {
        let clauses = vec![
            Clause::new("status", Operation::Eq, ClauseValue::Scalar("approved".into())),
            Clause::new("created_at", Operation::Last7, ClauseValue::None).joined(Joiner::And),
        ];
        let first = compose(SearchMode::Changes, &clauses, 2, 25);
        let second = compose(SearchMode::Changes, &clauses, 2, 25);
        assert_eq!(first, second);
        assert!(!std::ptr::eq(first.clauses.as_ptr(), second.clauses.as_ptr()));
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn request_serializes_to_the_search_contract() {
        let clauses = vec![Clause::new(
            "status",
            Operation::In,
            ClauseValue::List(vec!["approved".into(), "pending".into()]),
        )];
        let json = serde_json::to_value(compose(SearchMode::Changes, &clauses, 1, 50)).unwrap();
        assert_eq!(json["mode"], "CHANGES");
        assert_eq!(json["page"], 1);
        assert_eq!(json["page_size"], 50);
        assert_eq!(json["clauses"][0]["values"][1], "pending");
        assert!(json["clauses"][0].get("joiner").is_none());
    }

    #[test]
    fn composer_does_not_clamp_pages() {
        let request = compose(SearchMode::Changes, &[], 0, 10);
        assert_eq!(request.page, 0);
    }
}
