//! Corporation Entity

use kernel::id::CorporationId;
use serde::Serialize;

/// Corporation-level API credential; key id and vcode exist only together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredential {
    pub key_id: i64,
    pub vcode: String,
}

impl ApiCredential {
    /// Combine two nullable columns; a half-filled pair counts as absent
    pub fn from_columns(key_id: Option<i64>, vcode: Option<String>) -> Option<Self> {
        match (key_id, vcode) {
            (Some(key_id), Some(vcode)) => Some(Self { key_id, vcode }),
            _ => None,
        }
    }
}

/// An in-game organization characters belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Corporation {
    pub id: CorporationId,
    pub name: String,
    pub ticker: String,
    pub eve_corporation_id: i64,
    /// Game id of the CEO character
    pub ceo_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_credential: Option<ApiCredential>,
    pub active: bool,
}

impl Corporation {
    pub fn new(
        name: impl Into<String>,
        ticker: impl Into<String>,
        eve_corporation_id: i64,
        ceo_id: i64,
    ) -> Self {
        Self {
            id: CorporationId::unsaved(),
            name: name.into(),
            ticker: ticker.into(),
            eve_corporation_id,
            ceo_id,
            api_credential: None,
            active: true,
        }
    }

    /// Split the credential into its two nullable columns
    pub fn api_columns(&self) -> (Option<i64>, Option<&str>) {
        match &self.api_credential {
            Some(c) => (Some(c.key_id), Some(c.vcode.as_str())),
            None => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_pair() {
        assert!(ApiCredential::from_columns(Some(1), None).is_none());
        assert!(ApiCredential::from_columns(None, Some("v".into())).is_none());
        assert_eq!(
            ApiCredential::from_columns(Some(1), Some("v".into())),
            Some(ApiCredential {
                key_id: 1,
                vcode: "v".into()
            })
        );
    }

    #[test]
    fn test_json_omits_missing_credential() {
        let corp = Corporation::new("Test Corp", "TEST", 98000001, 90000001);
        let json = serde_json::to_value(&corp).unwrap();
        assert!(json.get("apiCredential").is_none());
        assert_eq!(json["eveCorporationId"], 98000001);
    }
}
