//! Character Entity

use kernel::id::{AccountId, CharacterId, CorporationId};
use serde::Serialize;

/// A single in-game avatar exposed by an Account's API credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: CharacterId,
    pub account_id: AccountId,
    pub corporation_id: CorporationId,
    pub name: String,
    /// Character id assigned by the game
    pub eve_character_id: i64,
    pub default_character: bool,
    pub active: bool,
}

impl Character {
    pub fn new(
        account_id: AccountId,
        corporation_id: CorporationId,
        name: impl Into<String>,
        eve_character_id: i64,
    ) -> Self {
        Self {
            id: CharacterId::unsaved(),
            account_id,
            corporation_id,
            name: name.into(),
            eve_character_id,
            default_character: false,
            active: true,
        }
    }
}
