//! API DTOs (Data Transfer Objects)

use serde::{Deserialize, Serialize};

// ============================================================================
// Responses
// ============================================================================

/// Envelope shared by every endpoint
///
/// Error responses are rendered by `AppError` with the same leading fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    /// Error kind name; serialized as `null` on success
    pub error: Option<String>,
    pub logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    /// SSO state issued by `/login/sso`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl ApiResponse {
    pub fn ok(logged_in: bool) -> Self {
        Self {
            success: true,
            error: None,
            logged_in,
            redirect: None,
            csrf_token: None,
            state: None,
        }
    }

    /// Unsuccessful but not erroneous, e.g. login required
    pub fn declined(logged_in: bool) -> Self {
        Self {
            success: false,
            ..Self::ok(logged_in)
        }
    }

    pub fn with_redirect(mut self, redirect: impl Into<String>) -> Self {
        self.redirect = Some(redirect.into());
        self
    }

    pub fn with_csrf_token(mut self, token: String) -> Self {
        self.csrf_token = Some(token);
        self
    }

    pub fn with_state(mut self, state: String) -> Self {
        self.state = Some(state);
        self
    }
}

// ============================================================================
// Login
// ============================================================================

/// Login request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Token handed out by `GET /login`
    #[serde(default)]
    pub csrf_token: Option<String>,
}

/// `GET /login/sso` query
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SsoQuery {
    pub state: Option<String>,
}

// ============================================================================
// Authorize
// ============================================================================

/// `GET /authorize` query
///
/// Missing parameters deserialize as empty strings and are rejected by the
/// handler, so the client still gets the JSON envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeQuery {
    pub app: String,
    pub callback: String,
    pub auth: String,
    pub roles: Option<String>,
}

impl AuthorizeQuery {
    pub fn is_complete(&self) -> bool {
        !self.app.is_empty() && !self.callback.is_empty() && !self.auth.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serializes_as_null() {
        let json = serde_json::to_value(ApiResponse::ok(false)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": true, "error": null, "loggedIn": false})
        );
    }

    #[test]
    fn test_optional_fields() {
        let json = serde_json::to_value(ApiResponse::declined(false).with_redirect("/login")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["redirect"], "/login");
        assert!(json.get("csrfToken").is_none());
    }

    #[test]
    fn test_login_request_without_csrf_token() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"username":"test1","password":"test1"}"#).unwrap();
        assert_eq!(req.username, "test1");
        assert!(req.csrf_token.is_none());
    }

    #[test]
    fn test_authorize_query_completeness() {
        let query = AuthorizeQuery {
            app: "1".into(),
            callback: "https://app.example.com/cb".into(),
            ..Default::default()
        };
        assert!(!query.is_complete());
    }
}
