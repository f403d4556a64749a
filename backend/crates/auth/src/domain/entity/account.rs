//! Account Entity
//!
//! A user's attachment of one external game-API credential.

use kernel::id::{AccountId, UserId};
use serde::Serialize;

use crate::domain::entity::character::Character;

/// Account entity (owns its Characters)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    /// API key id; unique together with `api_vcode`
    pub api_key_id: i64,
    pub api_vcode: String,
    pub api_access_mask: i64,
    pub active: bool,
    pub characters: Vec<Character>,
}

impl Account {
    pub fn new(
        user_id: UserId,
        api_key_id: i64,
        api_vcode: impl Into<String>,
        api_access_mask: i64,
    ) -> Self {
        Self {
            id: AccountId::unsaved(),
            user_id,
            api_key_id,
            api_vcode: api_vcode.into(),
            api_access_mask,
            active: true,
            characters: Vec::new(),
        }
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// Number of characters flagged as default (valid accounts have 0 or 1)
    pub fn default_character_count(&self) -> usize {
        self.characters
            .iter()
            .filter(|c| c.default_character)
            .count()
    }
}
