use serde::{Deserialize, Serialize};

use super::token::{Token, TokenStatus};

/// The fully recomputed view of queue state for one scope.
///
/// Holds the ordered active tokens (`WAITING` or `IN_PROGRESS`) plus
/// aggregate counts. A snapshot is always rebuilt from a complete token
/// list, never incrementally patched, so partial updates and out-of-order
/// pushes cannot cause drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// Active tokens ordered by queue position (unpositioned last, ties by id).
    pub tokens: Vec<Token>,
    /// Number of active tokens in `WAITING`.
    pub waiting: usize,
    /// Number of active tokens in `IN_PROGRESS`.
    pub in_progress: usize,
    /// Total number of active tokens. Terminal and unknown-status tokens are
    /// not counted.
    pub total: usize,
}

impl QueueSnapshot {
    /// Build a snapshot from a full token list.
    pub fn compute(tokens: &[Token]) -> Self {
        let mut active: Vec<Token> = tokens
            .iter()
            .filter(|t| t.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|t| (t.queue_position.unwrap_or(i32::MAX), t.id));

        let waiting = active
            .iter()
            .filter(|t| t.status == TokenStatus::Waiting)
            .count();
        let in_progress = active
            .iter()
            .filter(|t| t.status == TokenStatus::InProgress)
            .count();
        let total = active.len();

        Self {
            tokens: active,
            waiting,
            in_progress,
            total,
        }
    }

    /// Whether the active set is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The token currently being served, if any.
    pub fn current(&self) -> Option<&Token> {
        self.tokens
            .iter()
            .find(|t| t.status == TokenStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: i64, status: TokenStatus, position: Option<i32>) -> Token {
        Token {
            id,
            token_number: format!("T-{}", id),
            user_id: None,
            patient_name: None,
            department_id: 1,
            department_name: None,
            status,
            booking_time: None,
            estimated_wait_time: None,
            queue_position: position,
            service_start_time: None,
            service_end_time: None,
        }
    }

    #[test]
    fn aggregates_count_only_active_tokens() {
        let tokens = vec![
            token(1, TokenStatus::Waiting, Some(1)),
            token(2, TokenStatus::InProgress, Some(0)),
        ];
        let snapshot = QueueSnapshot::compute(&tokens);
        assert_eq!(snapshot.waiting, 1);
        assert_eq!(snapshot.in_progress, 1);
        assert_eq!(snapshot.total, 2);

        // Re-pull after token 2 completed: the active set shrinks.
        let tokens = vec![
            token(1, TokenStatus::Waiting, Some(1)),
            token(2, TokenStatus::Completed, None),
        ];
        let snapshot = QueueSnapshot::compute(&tokens);
        assert_eq!(snapshot.waiting, 1);
        assert_eq!(snapshot.in_progress, 0);
        assert_eq!(snapshot.total, 1);
    }

    #[test]
    fn tokens_ordered_by_position_then_id() {
        let tokens = vec![
            token(5, TokenStatus::Waiting, Some(2)),
            token(9, TokenStatus::Waiting, None),
            token(3, TokenStatus::InProgress, Some(0)),
            token(8, TokenStatus::Waiting, Some(1)),
            token(2, TokenStatus::Waiting, None),
        ];
        let snapshot = QueueSnapshot::compute(&tokens);
        let order: Vec<i64> = snapshot.tokens.iter().map(|t| t.id).collect();
        assert_eq!(order, vec![3, 8, 5, 2, 9]);
    }

    #[test]
    fn terminal_and_unknown_statuses_are_excluded() {
        let tokens = vec![
            token(1, TokenStatus::Completed, Some(0)),
            token(2, TokenStatus::Cancelled, Some(1)),
            token(3, TokenStatus::Other("ON_HOLD".into()), Some(2)),
            token(4, TokenStatus::Waiting, Some(3)),
        ];
        let snapshot = QueueSnapshot::compute(&tokens);
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.tokens[0].id, 4);
    }

    #[test]
    fn current_returns_in_progress_token() {
        let tokens = vec![
            token(1, TokenStatus::Waiting, Some(1)),
            token(2, TokenStatus::InProgress, Some(0)),
        ];
        let snapshot = QueueSnapshot::compute(&tokens);
        assert_eq!(snapshot.current().map(|t| t.id), Some(2));

        assert_eq!(QueueSnapshot::default().current(), None);
    }
}
