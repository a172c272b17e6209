//! Account models and request/response payloads.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub daily_calorie_goal: Option<i64>,
    pub dietary_preferences: Option<String>,
    pub profile_image: Option<Vec<u8>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Account as returned to clients. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub daily_calorie_goal: Option<i64>,
    pub dietary_preferences: Option<String>,
    /// Base64-encoded image bytes
    pub profile_image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            email: account.email,
            daily_calorie_goal: account.daily_calorie_goal,
            dietary_preferences: account.dietary_preferences,
            profile_image: account.profile_image.map(|bytes| BASE64.encode(bytes)),
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Body of `PUT /user/:username`. Absent fields are left untouched.
#[derive(Default, Deserialize, Serialize)]
pub struct UpdateAccountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_calorie_goal: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_preferences: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: 1,
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            daily_calorie_goal: Some(2000),
            dietary_preferences: None,
            profile_image: Some(vec![0xff, 0xd8, 0xff]),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn response_omits_password_hash() {
        let json = serde_json::to_string(&AccountResponse::from(account())).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn profile_image_is_base64() {
        let response = AccountResponse::from(account());
        assert_eq!(response.profile_image.as_deref(), Some("/9j/"));
    }

    #[test]
    fn update_request_fields_default_to_absent() {
        let req: UpdateAccountRequest =
            serde_json::from_str(r#"{"daily_calorie_goal": 1800, "username": "ignored"}"#).unwrap();
        assert_eq!(req.daily_calorie_goal, Some(1800));
        assert!(req.email.is_none());
        assert!(req.password.is_none());
        assert!(req.dietary_preferences.is_none());
    }
}
