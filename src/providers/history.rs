//! History reader: recent rubric scores for difficulty selection. The
//! history backend itself belongs to the excluded analytics surface; the
//! core only consumes `recentFeedback(userId, N) -> [scores]`.

use async_trait::async_trait;

use crate::error::CoreError;

#[async_trait]
pub trait HistoryReader: Send + Sync {
    async fn recent_feedback(&self, user_id: &str, n: usize) -> Result<Vec<f64>, CoreError>;
}

/// A reader with no history available. The difficulty selector treats an
/// empty result the same as "insufficient data" and falls back to
/// Intermediate.
pub struct EmptyHistoryReader;

#[async_trait]
impl HistoryReader for EmptyHistoryReader {
    async fn recent_feedback(&self, _user_id: &str, _n: usize) -> Result<Vec<f64>, CoreError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_reader_returns_no_scores() {
        let scores = EmptyHistoryReader.recent_feedback("user-1", 10).await.unwrap();
        assert!(scores.is_empty());
    }
}
