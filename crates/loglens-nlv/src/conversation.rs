// In-process conversation memory
//
// Conversations are append-only turn lists keyed by a minted id and are
// gone after a restart; an unknown id simply starts a new conversation
// upstream.

use crate::models::ConversationTurn;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, PartialEq)]
pub enum ConversationError {
    #[error("conversation not found")]
    NotFound,
}

#[derive(Default)]
pub struct ConversationStore {
    store: RwLock<HashMap<String, Vec<ConversationTurn>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.store
            .write()
            .unwrap()
            .insert(id.clone(), Vec::new());
        id
    }

    pub fn history(&self, id: &str) -> Result<Vec<ConversationTurn>, ConversationError> {
        self.store
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or(ConversationError::NotFound)
    }

    pub fn add_turn(&self, id: &str, turn: ConversationTurn) -> Result<(), ConversationError> {
        let mut store = self.store.write().unwrap();
        match store.get_mut(id) {
            Some(turns) => {
                turns.push(turn);
                Ok(())
            }
            None => Err(ConversationError::NotFound),
        }
    }
}
