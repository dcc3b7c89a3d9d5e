use std::time::Duration;

use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::AdminTier;

/// 加盐哈希，同一密码两次结果不同
pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(hash(password, DEFAULT_COST)?)
}

/// 哈希格式错误时按不匹配处理
pub fn verify_password(password_hash: &str, password: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

/// 令牌类型，两类令牌的签名方式相同，只能靠这个字段区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Session,
    Challenge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub user_id: i64,
    pub tenant_id: i64,
    pub username: String,
    pub admin_tier: AdminTier,
    pub kind: TokenKind,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

/// 密码校验通过、等待二次验证时发放
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeClaims {
    pub user_id: i64,
    pub tenant_id: i64,
    pub username: String,
    pub require_otp: bool,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
    pub nbf: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Duration,
    challenge_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, session_ttl: Duration, challenge_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            session_ttl,
            challenge_ttl,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_nbf = true;
        validation
    }

    fn window(ttl: Duration) -> (i64, i64, DateTime<Utc>) {
        let now = Utc::now();
        let expires_at = now + chrono::Duration::seconds(ttl.as_secs() as i64);
        (now.timestamp(), expires_at.timestamp(), expires_at)
    }

    pub fn issue_session_token(
        &self,
        user_id: i64,
        tenant_id: i64,
        username: &str,
        admin_tier: AdminTier,
    ) -> Result<IssuedToken, AppError> {
        let (now, exp, expires_at) = Self::window(self.session_ttl);
        let claims = SessionClaims {
            user_id,
            tenant_id,
            username: username.to_string(),
            admin_tier,
            kind: TokenKind::Session,
            jti: uuid::Uuid::new_v4().to_string(),
            exp,
            iat: now,
            nbf: now,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn issue_challenge_token(
        &self,
        user_id: i64,
        tenant_id: i64,
        username: &str,
    ) -> Result<IssuedToken, AppError> {
        let (now, exp, expires_at) = Self::window(self.challenge_ttl);
        let claims = ChallengeClaims {
            user_id,
            tenant_id,
            username: username.to_string(),
            require_otp: true,
            kind: TokenKind::Challenge,
            exp,
            iat: now,
            nbf: now,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        Ok(IssuedToken { token, expires_at })
    }

    pub fn verify_session_token(&self, token: &str) -> Result<SessionClaims, AppError> {
        let data = decode::<SessionClaims>(token, &self.decoding, &Self::validation())
            .map_err(|_| AppError::InvalidToken)?;
        if data.claims.kind != TokenKind::Session {
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }

    pub fn verify_challenge_token(&self, token: &str) -> Result<ChallengeClaims, AppError> {
        let data = decode::<ChallengeClaims>(token, &self.decoding, &Self::validation())
            .map_err(|_| AppError::InvalidToken)?;
        if data.claims.kind != TokenKind::Challenge || !data.claims.require_otp {
            return Err(AppError::InvalidToken);
        }
        Ok(data.claims)
    }

    /// 为已登录用户换发新令牌，旧令牌由调用方决定是否吊销
    pub fn refresh_session_token(&self, claims: &SessionClaims) -> Result<IssuedToken, AppError> {
        self.issue_session_token(
            claims.user_id,
            claims.tenant_id,
            &claims.username,
            claims.admin_tier,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(
            "test-secret-0123456789",
            Duration::from_secs(3600),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = hash_password("s3cret!").unwrap();
        let b = hash_password("s3cret!").unwrap();
        assert_ne!(a, b);
        assert!(verify_password(&a, "s3cret!"));
        assert!(verify_password(&b, "s3cret!"));
        assert!(!verify_password(&a, "S3cret!"));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("not-a-bcrypt-hash", "anything"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn session_token_round_trip() {
        let tokens = service();
        let issued = tokens
            .issue_session_token(7, 3, "alice", AdminTier::Normal)
            .unwrap();
        let claims = tokens.verify_session_token(&issued.token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.tenant_id, 3);
        assert_eq!(claims.admin_tier, AdminTier::Normal);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn challenge_and_session_tokens_are_not_interchangeable() {
        let tokens = service();
        let challenge = tokens.issue_challenge_token(7, 3, "alice").unwrap();
        let session = tokens
            .issue_session_token(7, 3, "alice", AdminTier::Normal)
            .unwrap();

        assert!(matches!(
            tokens.verify_session_token(&challenge.token),
            Err(AppError::InvalidToken)
        ));
        assert!(matches!(
            tokens.verify_challenge_token(&session.token),
            Err(AppError::InvalidToken)
        ));
        assert!(tokens.verify_challenge_token(&challenge.token).is_ok());
    }

    #[test]
    fn forged_kind_with_other_secret_is_rejected() {
        let other = TokenService::new(
            "another-secret-987654",
            Duration::from_secs(3600),
            Duration::from_secs(300),
        );
        let issued = other
            .issue_session_token(1, 0, "root", AdminTier::SuperAdmin)
            .unwrap();
        assert!(matches!(
            service().verify_session_token(&issued.token),
            Err(AppError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = service();
        let claims = SessionClaims {
            user_id: 1,
            tenant_id: 0,
            username: "old".into(),
            admin_tier: AdminTier::Normal,
            kind: TokenKind::Session,
            jti: "x".into(),
            exp: Utc::now().timestamp() - 3600,
            iat: Utc::now().timestamp() - 7200,
            nbf: Utc::now().timestamp() - 7200,
        };
        let token = encode(&Header::default(), &claims, &tokens.encoding).unwrap();
        assert!(matches!(
            tokens.verify_session_token(&token),
            Err(AppError::InvalidToken)
        ));
    }
}
