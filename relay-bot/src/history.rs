//! Per-user conversation history.
//!
//! Each user owns one bounded buffer of turns, oldest first. Buffers are
//! created on first use and live for the life of the process.
//!
//! Operations lock only the one user's buffer and never across an `.await`.
//! Two in-flight exchanges for the *same* user are not serialized: their
//! appends may interleave, and a rollback removes whatever turn is newest at
//! that moment.

use crate::message::{Role, Turn};
use dashmap::DashMap;
use std::collections::VecDeque;

/// Default number of turns remembered per user.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Bounded per-user conversation buffers.
pub struct HistoryStore {
    buffers: DashMap<String, VecDeque<Turn>>,
    max_turns: usize,
}

impl HistoryStore {
    /// Create a store that keeps at most `max_turns` turns per user.
    pub fn new(max_turns: usize) -> Self {
        Self {
            buffers: DashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Append a turn to the user's buffer. Does not trim.
    pub fn append(&self, user_id: &str, role: Role, text: impl Into<String>) {
        self.buffers
            .entry(user_id.to_string())
            .or_default()
            .push_back(Turn::new(role, text));
    }

    /// Drop the oldest turns until the buffer holds at most `max_turns`.
    ///
    /// Returns the dropped turns, oldest first.
    pub fn trim(&self, user_id: &str) -> Vec<Turn> {
        let Some(mut buffer) = self.buffers.get_mut(user_id) else {
            return Vec::new();
        };
        let excess = buffer.len().saturating_sub(self.max_turns);
        if excess == 0 {
            return Vec::new();
        }
        tracing::debug!(user_id = %user_id, dropped = excess, "Trimmed conversation history");
        buffer.drain(..excess).collect()
    }

    /// Put turns removed by [`trim`](Self::trim) back at the front of the buffer.
    ///
    /// Only as many as fit under `max_turns` are restored, newest of them first.
    pub fn restore_oldest(&self, user_id: &str, turns: Vec<Turn>) {
        if turns.is_empty() {
            return;
        }
        let mut buffer = self.buffers.entry(user_id.to_string()).or_default();
        let room = self.max_turns.saturating_sub(buffer.len());
        for turn in turns.into_iter().rev().take(room) {
            buffer.push_front(turn);
        }
    }

    /// The system turn followed by the user's buffer, oldest first.
    pub fn render(&self, user_id: &str, system_prompt: &str) -> Vec<Turn> {
        let mut context = vec![Turn::system(system_prompt)];
        if let Some(buffer) = self.buffers.get(user_id) {
            context.extend(buffer.iter().cloned());
        }
        context
    }

    /// Remove and return the newest turn. No-op on an empty or unknown buffer.
    pub fn rollback_last(&self, user_id: &str) -> Option<Turn> {
        self.buffers.get_mut(user_id)?.pop_back()
    }

    /// Forget everything for this user.
    pub fn reset(&self, user_id: &str) {
        self.buffers.insert(user_id.to_string(), VecDeque::new());
    }

    /// Snapshot of the user's buffer, oldest first.
    pub fn turns(&self, user_id: &str) -> Vec<Turn> {
        self.buffers
            .get(user_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.buffers.get(user_id).map_or(0, |buffer| buffer.len())
    }

    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPT: &str = "be nice";

    fn append_user_turns(store: &HistoryStore, user: &str, count: usize) {
        for i in 0..count {
            store.append(user, Role::User, format!("msg {i}"));
            store.trim(user);
        }
    }

    #[test]
    fn test_new_user_renders_only_system_prompt() {
        let store = HistoryStore::default();
        assert_eq!(store.render("nobody", PROMPT), vec![Turn::system(PROMPT)]);
        assert!(store.is_empty("nobody"));
    }

    #[test]
    fn test_render_preserves_order_under_limit() {
        let store = HistoryStore::new(20);
        append_user_turns(&store, "u", 20);

        let rendered = store.render("u", PROMPT);
        assert_eq!(rendered.len(), 21);
        assert_eq!(rendered[0], Turn::system(PROMPT));
        for (i, turn) in rendered[1..].iter().enumerate() {
            assert_eq!(turn, &Turn::user(format!("msg {i}")));
        }
    }

    #[test]
    fn test_trim_keeps_newest_turns() {
        let store = HistoryStore::new(20);
        append_user_turns(&store, "u", 35);

        let turns = store.turns("u");
        assert_eq!(turns.len(), 20);
        assert_eq!(turns.first().unwrap().text, "msg 15");
        assert_eq!(turns.last().unwrap().text, "msg 34");
    }

    #[test]
    fn test_append_alone_does_not_trim() {
        let store = HistoryStore::new(2);
        store.append("u", Role::User, "a");
        store.append("u", Role::Assistant, "b");
        store.append("u", Role::User, "c");
        assert_eq!(store.len("u"), 3);
        store.trim("u");
        assert_eq!(store.turns("u"), vec![Turn::assistant("b"), Turn::user("c")]);
    }

    #[test]
    fn test_reset_then_render() {
        let store = HistoryStore::default();
        append_user_turns(&store, "u", 5);
        store.reset("u");
        assert_eq!(store.render("u", PROMPT), vec![Turn::system(PROMPT)]);
        store.reset("u");
        assert!(store.is_empty("u"));
    }

    #[test]
    fn test_rollback_on_empty_is_noop() {
        let store = HistoryStore::default();
        assert_eq!(store.rollback_last("ghost"), None);
        store.reset("u");
        assert_eq!(store.rollback_last("u"), None);
        assert!(store.is_empty("u"));
    }

    #[test]
    fn test_rollback_restores_previous_state() {
        let store = HistoryStore::default();
        store.append("u", Role::User, "first");
        store.append("u", Role::Assistant, "reply");
        let before = store.turns("u");

        store.append("u", Role::User, "hi");
        store.trim("u");
        assert_eq!(store.rollback_last("u"), Some(Turn::user("hi")));
        assert_eq!(store.turns("u"), before);
    }

    #[test]
    fn test_rollback_at_capacity_with_restore() {
        let store = HistoryStore::new(3);
        append_user_turns(&store, "u", 3);
        let before = store.turns("u");

        store.append("u", Role::User, "overflow");
        let dropped = store.trim("u");
        assert_eq!(dropped, vec![Turn::user("msg 0")]);
        assert_eq!(store.len("u"), 3);

        store.rollback_last("u");
        store.restore_oldest("u", dropped);
        assert_eq!(store.turns("u"), before);
    }

    #[test]
    fn test_restore_never_exceeds_limit() {
        let store = HistoryStore::new(2);
        store.append("u", Role::User, "a");
        store.append("u", Role::User, "b");
        store.restore_oldest("u", vec![Turn::user("x"), Turn::user("y")]);
        assert_eq!(store.len("u"), 2);

        store.rollback_last("u");
        store.restore_oldest("u", vec![Turn::user("x"), Turn::user("y")]);
        assert_eq!(store.turns("u"), vec![Turn::user("y"), Turn::user("a")]);
    }

    #[test]
    fn test_users_are_independent() {
        let store = HistoryStore::default();
        store.append("a", Role::User, "from a");
        store.append("b", Role::User, "from b");
        store.reset("a");
        assert!(store.is_empty("a"));
        assert_eq!(store.turns("b"), vec![Turn::user("from b")]);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let store = HistoryStore::new(0);
        assert_eq!(store.max_turns(), 1);
    }
}
