// VecBatch — merge.rs
// Folds the last attempt, reconciled records and the still-failing set
// into one AggregatedResult.
// Author: d65v <https://github.com/d65v>

use std::collections::HashMap;

use crate::config::OutcomeOrdering;
use crate::record::{AggregatedError, AggregatedResult, Record, RecordOutcome};
use crate::transport::{BatchResponse, STATUS_OK};

/// Everything the orchestrator knows when a batch reaches a terminal state.
#[derive(Debug, Default)]
pub struct MergeInput<'a> {
    /// The translated response of the final attempt, if it was delivered.
    pub latest: Option<BatchResponse>,
    /// Outcomes confirmed by reconciliation, in the order they were found.
    pub reconciled: Vec<RecordOutcome>,
    /// Records that are still unconfirmed.
    pub failed: &'a [Record],
    /// Messages of every transport error seen across attempts.
    pub transport_errors: Vec<String>,
    /// Status of the most recent transport error, 0 if there was none.
    pub last_error_status: u16,
    pub attempts: u32,
    pub ordering: OutcomeOrdering,
    /// `(collection, id)` of the batch as first submitted; used for
    /// `SubmissionOrder`.
    pub submitted: &'a [(String, String)],
}

pub fn merge_results(input: MergeInput<'_>) -> AggregatedResult {
    let MergeInput {
        latest,
        reconciled,
        failed,
        transport_errors,
        last_error_status,
        attempts,
        ordering,
        submitted,
    } = input;

    // Nothing failing and nothing reconciled: the last attempt is the answer.
    if failed.is_empty() && reconciled.is_empty() {
        return match latest {
            Some(response) => AggregatedResult {
                status_code: response.status_code,
                outcomes: non_empty(response.outcomes),
                error: response.error,
                attempts,
            },
            None => AggregatedResult {
                attempts,
                ..Default::default()
            },
        };
    }

    let (latest_status, mut outcomes, latest_error) = match latest {
        Some(response) => (Some(response.status_code), response.outcomes, response.error),
        None => (None, Vec::new(), None),
    };
    outcomes.extend(reconciled);
    if ordering == OutcomeOrdering::SubmissionOrder {
        sort_by_submission(&mut outcomes, submitted);
    }

    if failed.is_empty() {
        return AggregatedResult {
            status_code: latest_status.unwrap_or(STATUS_OK),
            outcomes: non_empty(outcomes),
            error: latest_error,
            attempts,
        };
    }

    let ids: Vec<&str> = failed.iter().map(|r| r.id()).collect();
    let mut messages = transport_errors;
    messages.push(format!("records failed to be created: {}", ids.join(", ")));

    AggregatedResult {
        status_code: last_error_status,
        outcomes: non_empty(outcomes),
        error: Some(AggregatedError::new(last_error_status, messages)),
        attempts,
    }
}

fn non_empty(outcomes: Vec<RecordOutcome>) -> Option<Vec<RecordOutcome>> {
    if outcomes.is_empty() {
        None
    } else {
        Some(outcomes)
    }
}

/// Stable sort by position in the submitted batch; unknown records go last.
fn sort_by_submission(outcomes: &mut [RecordOutcome], submitted: &[(String, String)]) {
    let position: HashMap<(&str, &str), usize> = submitted
        .iter()
        .enumerate()
        .map(|(i, (collection, id))| ((collection.as_str(), id.as_str()), i))
        .collect();
    outcomes.sort_by_key(|o| {
        position
            .get(&(o.collection.as_str(), o.id.as_str()))
            .copied()
            .unwrap_or(usize::MAX)
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::OutcomeStatus;
    use crate::transport::STATUS_PARTIAL_FAILURE;

    fn rec(id: &str) -> Record {
        Record::new("Doc").with_id(id)
    }

    fn ok_response(ids: &[&str]) -> BatchResponse {
        BatchResponse {
            status_code: STATUS_OK,
            outcomes: ids.iter().map(|id| RecordOutcome::succeeded(&rec(id))).collect(),
            error: None,
        }
    }

    fn keys(ids: &[&str]) -> Vec<(String, String)> {
        ids.iter().map(|id| ("Doc".to_string(), id.to_string())).collect()
    }

    fn ids(result: &AggregatedResult) -> Vec<&str> {
        result.outcomes().iter().map(|o| o.id.as_str()).collect()
    }

    #[test]
    fn test_plain_success_passes_through() {
        let response = ok_response(&["a", "b"]);
        let result = merge_results(MergeInput {
            latest: Some(response.clone()),
            attempts: 1,
            ..Default::default()
        });
        assert_eq!(result.status_code, STATUS_OK);
        assert_eq!(result.outcomes, Some(response.outcomes));
        assert!(result.error.is_none());
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn test_partial_failure_error_passes_through() {
        let response = BatchResponse {
            status_code: STATUS_PARTIAL_FAILURE,
            outcomes: vec![RecordOutcome::failed(&rec("a"), "bad")],
            error: Some(AggregatedError::new(STATUS_PARTIAL_FAILURE, vec!["bad".into()])),
        };
        let result = merge_results(MergeInput {
            latest: Some(response),
            ..Default::default()
        });
        assert_eq!(result.status_code, STATUS_PARTIAL_FAILURE);
        assert_eq!(result.error.unwrap().messages, vec!["bad".to_string()]);
    }

    #[test]
    fn test_reconciled_appended_after_latest() {
        let submitted = keys(&["a", "b", "c"]);
        let result = merge_results(MergeInput {
            latest: Some(ok_response(&["b", "c"])),
            reconciled: vec![RecordOutcome::succeeded(&rec("a"))],
            submitted: &submitted,
            ..Default::default()
        });
        assert_eq!(ids(&result), vec!["b", "c", "a"]);
        assert!(result.error.is_none());
    }

    #[test]
    fn test_submission_order_reinterleaves() {
        let submitted = keys(&["a", "b", "c"]);
        let result = merge_results(MergeInput {
            latest: Some(ok_response(&["b", "c"])),
            reconciled: vec![RecordOutcome::succeeded(&rec("a"))],
            ordering: OutcomeOrdering::SubmissionOrder,
            submitted: &submitted,
            ..Default::default()
        });
        assert_eq!(ids(&result), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_submission_order_distinguishes_collections() {
        let submitted = vec![
            ("Doc".to_string(), "a".to_string()),
            ("Note".to_string(), "a".to_string()),
        ];
        let note = RecordOutcome::succeeded(&Record::new("Note").with_id("a"));
        let result = merge_results(MergeInput {
            latest: Some(BatchResponse {
                status_code: STATUS_OK,
                outcomes: vec![note],
                error: None,
            }),
            reconciled: vec![RecordOutcome::succeeded(&rec("a"))],
            ordering: OutcomeOrdering::SubmissionOrder,
            submitted: &submitted,
            ..Default::default()
        });
        let order: Vec<&str> = result.outcomes().iter().map(|o| o.collection.as_str()).collect();
        assert_eq!(order, vec!["Doc", "Note"]);
    }

    #[test]
    fn test_all_reconciled_is_success() {
        let result = merge_results(MergeInput {
            reconciled: vec![
                RecordOutcome::succeeded(&rec("a")),
                RecordOutcome::succeeded(&rec("b")),
            ],
            transport_errors: vec!["read timed out".into()],
            last_error_status: 0,
            attempts: 1,
            ..Default::default()
        });
        assert_eq!(result.status_code, STATUS_OK);
        assert!(result.error.is_none());
        assert!(result.outcomes().iter().all(|o| o.status == OutcomeStatus::Success));
    }

    #[test]
    fn test_failed_records_listed_in_error() {
        let failed = vec![rec("x"), rec("y")];
        let result = merge_results(MergeInput {
            reconciled: vec![RecordOutcome::succeeded(&rec("a"))],
            failed: &failed,
            transport_errors: vec!["timeout #1".into(), "timeout #2".into()],
            last_error_status: 504,
            attempts: 2,
            ..Default::default()
        });
        assert_eq!(result.status_code, 504);
        assert_eq!(ids(&result), vec!["a"]);
        let error = result.error.unwrap();
        assert_eq!(
            error.messages,
            vec![
                "timeout #1".to_string(),
                "timeout #2".to_string(),
                "records failed to be created: x, y".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_without_outcomes_has_none() {
        let failed = vec![rec("x")];
        let result = merge_results(MergeInput {
            failed: &failed,
            transport_errors: vec!["refused".into()],
            ..Default::default()
        });
        assert!(result.outcomes.is_none());
        assert_eq!(result.status_code, 0);
    }
}
