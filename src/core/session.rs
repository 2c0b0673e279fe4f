//! The set of open conversations, each behind its own turn coordinator.

use std::collections::HashMap;

use crate::core::conversation::{Conversation, ConversationId};
use crate::core::turn::TurnCoordinator;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    coordinators: HashMap<ConversationId, TurnCoordinator>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_conversations(conversations: impl IntoIterator<Item = Conversation>) -> Self {
        let mut registry = Self::new();
        for conversation in conversations {
            registry.insert(conversation);
        }
        registry
    }

    /// Adds a conversation, replacing any coordinator with the same id.
    pub fn insert(&mut self, conversation: Conversation) -> &mut TurnCoordinator {
        let id = conversation.id.clone();
        if let Some(mut previous) = self.coordinators.remove(&id) {
            previous.shutdown();
        }
        self.coordinators
            .entry(id)
            .or_insert_with(|| TurnCoordinator::new(conversation))
    }

    pub fn get(&self, id: &ConversationId) -> Option<&TurnCoordinator> {
        self.coordinators.get(id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut TurnCoordinator> {
        self.coordinators.get_mut(id)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.coordinators.contains_key(id)
    }

    /// Removes a conversation, cancelling anything it still has in flight.
    pub fn remove(&mut self, id: &ConversationId) -> Option<Conversation> {
        let mut coordinator = self.coordinators.remove(id)?;
        coordinator.shutdown();
        Some(coordinator.conversation().clone())
    }

    pub fn len(&self) -> usize {
        self.coordinators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinators.is_empty()
    }

    /// Coordinators ordered for the chat menu: most recently updated first,
    /// ties broken by id so the order is stable between frames.
    pub fn ordered(&self) -> Vec<&TurnCoordinator> {
        let mut sessions: Vec<_> = self.coordinators.values().collect();
        sessions.sort_by(|a, b| {
            b.conversation()
                .updated_at
                .cmp(&a.conversation().updated_at)
                .then_with(|| b.id().cmp(a.id()))
        });
        sessions
    }

    pub fn sending_count(&self) -> usize {
        self.coordinators.values().filter(|c| c.is_sending()).count()
    }

    pub fn shutdown_all(&mut self) {
        for coordinator in self.coordinators.values_mut() {
            coordinator.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::Role;
    use crate::utils::test_utils::test_settings;

    #[test]
    fn ordered_lists_most_recent_first() {
        let mut older = Conversation::new("m");
        older.append(Role::User, "old");
        let mut newer = Conversation::new("m");
        newer.append(Role::User, "new");
        newer.updated_at = older.updated_at + chrono::Duration::seconds(1);

        let registry = SessionRegistry::from_conversations([older.clone(), newer.clone()]);
        let ids: Vec<_> = registry.ordered().into_iter().map(|c| c.id().clone()).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[test]
    fn remove_cancels_in_flight_turn() {
        let mut registry = SessionRegistry::new();
        let conversation = Conversation::new("m");
        let id = conversation.id.clone();
        let job = registry
            .insert(conversation)
            .send("hi", &test_settings())
            .unwrap();
        assert_eq!(registry.sending_count(), 1);

        let removed = registry.remove(&id).unwrap();
        assert!(job.cancel.is_cancelled());
        assert!(removed.is_empty(), "cancelled turn is rolled back");
        assert!(registry.is_empty());
        assert!(registry.remove(&id).is_none());
    }

    #[test]
    fn shutdown_all_cancels_every_session() {
        let mut registry = SessionRegistry::new();
        let a = registry
            .insert(Conversation::new("m"))
            .send("a", &test_settings())
            .unwrap();
        let b = registry
            .insert(Conversation::new("m"))
            .send("b", &test_settings())
            .unwrap();

        registry.shutdown_all();
        assert!(a.cancel.is_cancelled());
        assert!(b.cancel.is_cancelled());
        assert_eq!(registry.sending_count(), 0);
    }
}
