//! Display-ready transcript reconstruction.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One utterance or message attributed to the human or the remote agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, insertion-ordered sequence of turns.
///
/// The realtime service can deliver the same transcript fragment more than
/// once (and locally appended user text is echoed back as an item), so two
/// turns with identical role and content whose timestamps fall within the
/// dedup window are treated as one.
pub struct TranscriptAggregator {
    turns: Vec<ConversationTurn>,
    window: TimeDelta,
}

impl TranscriptAggregator {
    pub fn new(window: Duration) -> Self {
        Self {
            turns: Vec::new(),
            window: TimeDelta::from_std(window).unwrap_or_else(|_| TimeDelta::milliseconds(2000)),
        }
    }

    /// Appends a turn unless it duplicates an existing one, returning the
    /// stored turn when something was added.
    pub fn append(
        &mut self,
        role: Role,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<&ConversationTurn> {
        let duplicate = self.turns.iter().any(|turn| {
            turn.role == role
                && turn.content == content
                && (turn.timestamp - timestamp).abs() < self.window
        });
        if duplicate {
            return None;
        }
        self.turns.push(ConversationTurn {
            role,
            content: content.to_owned(),
            timestamp,
        });
        self.turns.last()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn snapshot(&self) -> Vec<ConversationTurn> {
        self.turns.clone()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(offset_ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + offset_ms).unwrap()
    }

    fn aggregator() -> TranscriptAggregator {
        TranscriptAggregator::new(Duration::from_millis(2000))
    }

    #[test]
    fn same_turn_within_window_is_one_entry() {
        let mut transcript = aggregator();
        assert!(
            transcript
                .append(Role::Assistant, "Hello there", at(0))
                .is_some()
        );
        assert!(
            transcript
                .append(Role::Assistant, "Hello there", at(500))
                .is_none()
        );
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn same_turn_beyond_window_is_two_entries() {
        let mut transcript = aggregator();
        transcript.append(Role::User, "yes", at(0));
        transcript.append(Role::User, "yes", at(3000));
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn roles_are_part_of_turn_identity() {
        let mut transcript = aggregator();
        transcript.append(Role::User, "hello", at(0));
        transcript.append(Role::Assistant, "hello", at(100));
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut transcript = aggregator();
        let lines = ["one", "two", "three", "four"];
        for (index, line) in lines.iter().enumerate() {
            transcript.append(Role::User, line, at(index as i64 * 2500));
        }
        let stored: Vec<&str> = transcript
            .turns()
            .iter()
            .map(|turn| turn.content.as_str())
            .collect();
        assert_eq!(stored, lines);
    }

    #[test]
    fn clear_empties_the_sequence() {
        let mut transcript = aggregator();
        transcript.append(Role::User, "hello", at(0));
        transcript.clear();
        assert!(transcript.is_empty());
    }
}
