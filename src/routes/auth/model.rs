use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{DataScopeFilter, IssuedToken, LoginOutcome};
use crate::models::{RoleLevel, User};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// 登录结果：直接签发会话令牌，或要求继续提交动态口令
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub require_totp: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_token: Option<String>,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Session(issued) => Self::from(issued),
            LoginOutcome::ChallengeRequired { challenge_token } => Self {
                require_totp: true,
                token: None,
                expires_at: None,
                temp_token: Some(challenge_token),
            },
        }
    }
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            require_totp: false,
            token: Some(issued.token),
            expires_at: Some(issued.expires_at),
            temp_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyTotpRequest {
    pub temp_token: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct TotpCodeRequest {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub user: User,
    pub roles: Vec<String>,
    pub role_level: RoleLevel,
    pub permissions: Vec<String>,
    pub data_scope: DataScopeFilter,
}
