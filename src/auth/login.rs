use std::sync::{Arc, LazyLock};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{info, warn};

use super::audit::{AuditLogger, LoginAuditEntry};
use super::credential::{IssuedToken, TokenService, hash_password, verify_password};
use super::denylist::TokenDenylist;
use super::lockout::LoginGuard;
use super::tenant::{check_tenant_lease, resolve_setting};
use super::totp::{TotpEnrollment, generate_totp_secret, validate_totp_code};
use crate::cache::{KvStore, keys};
use crate::clock::Clock;
use crate::config::Config;
use crate::error::AppError;
use crate::models::setting::USER_LOCK_INACTIVE_DAYS;
use crate::models::{LoginInfo, User, UserStatus};
use crate::notify::{self, Channel, Notification, Notifier};
use crate::repository::Repository;

/// 未启用绑定的 TOTP 密钥保留 5 分钟
const TOTP_PENDING_TTL: Duration = Duration::from_secs(5 * 60);
const PWD_RESET_CODE_TTL: Duration = Duration::from_secs(5 * 60);
const PWD_RESET_SEND_INTERVAL: Duration = Duration::from_secs(60);
/// 验证码输错这么多次后作废，需要重新获取
pub const PWD_RESET_MAX_FAILURES: i64 = 5;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 64;

/// 找回密码统一返回的提示，不区分邮箱是否存在
pub const PASSWORD_RESET_SENT: &str = "如果该邮箱已注册，验证码将发送到您的邮箱";

/// 用户名不存在时也做一次同等代价的校验
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hash_password("dummy-password-for-timing").unwrap_or_default()
});

#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub password: String,
    pub ip: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoginOutcome {
    Session(IssuedToken),
    /// 需要继续提交动态口令
    ChallengeRequired { challenge_token: String },
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::Validation(format!(
            "密码长度必须在{}到{}个字符之间",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// 3 到 32 个字符，只允许字母、数字、下划线、点和横线
pub fn validate_username(username: &str) -> Result<(), AppError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(AppError::Validation("用户名长度必须在3到32个字符之间".into()));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(AppError::Validation("用户名只能包含字母、数字、下划线、点和横线".into()));
    }
    Ok(())
}

pub struct LoginService {
    config: Arc<Config>,
    repo: Arc<dyn Repository>,
    cache: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    tokens: Arc<TokenService>,
    guard: Arc<LoginGuard>,
    denylist: Arc<TokenDenylist>,
    audit: Arc<AuditLogger>,
    notifier: Arc<dyn Notifier>,
}

impl LoginService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        repo: Arc<dyn Repository>,
        cache: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        tokens: Arc<TokenService>,
        guard: Arc<LoginGuard>,
        denylist: Arc<TokenDenylist>,
        audit: Arc<AuditLogger>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            repo,
            cache,
            clock,
            tokens,
            guard,
            denylist,
            audit,
            notifier,
        }
    }

    fn log_attempt(
        &self,
        user: Option<&User>,
        attempt_username: &str,
        ip: &str,
        ua: &str,
        success: bool,
        message: String,
    ) {
        self.audit.record_login(LoginAuditEntry {
            tenant_id: user.map(|u| u.tenant_id).unwrap_or_default(),
            user_id: user.map(|u| u.id).unwrap_or_default(),
            username: attempt_username.to_string(),
            ip: ip.to_string(),
            user_agent: ua.to_string(),
            success,
            message,
        });
    }

    fn lock_error(&self, remaining_secs: i64) -> AppError {
        let minutes = (remaining_secs + 59) / 60;
        AppError::AccountLocked {
            remaining_secs: Some(remaining_secs),
            message: format!("登录失败次数过多，账户已锁定，请{}分钟后再试", minutes),
        }
    }

    /// 记录一次失败并给出对应的错误
    async fn failure(&self, username: &str) -> AppError {
        match self.guard.record_failure(username).await {
            Ok((_, true)) => self.lock_error(self.guard.lock_duration().as_secs() as i64),
            Ok((remaining_attempts, false)) => AppError::InvalidCredentials { remaining_attempts },
            Err(e) => e,
        }
    }

    async fn inactive_lock_days(&self, tenant_id: i64) -> Result<i64, AppError> {
        let configured = resolve_setting(self.repo.as_ref(), tenant_id, USER_LOCK_INACTIVE_DAYS)
            .await?
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|days| *days >= 0);
        Ok(configured.unwrap_or(self.config.inactive_lock_days))
    }

    /// 密码登录，各步骤严格按顺序执行
    pub async fn login(&self, attempt: LoginAttempt) -> Result<LoginOutcome, AppError> {
        let LoginAttempt {
            username,
            password,
            ip,
            user_agent,
        } = attempt;

        // 1. 已锁定直接拒绝，不做密码校验
        let (locked, remaining) = self.guard.is_locked(&username).await?;
        if locked {
            self.log_attempt(None, &username, &ip, &user_agent, false, "账户已锁定".into());
            return Err(self.lock_error(remaining));
        }

        // 2. 跨租户按用户名查找
        let Some(user) = self.repo.find_user_by_username(&username).await? else {
            verify_password(&DUMMY_HASH, &password);
            self.log_attempt(None, &username, &ip, &user_agent, false, "用户不存在".into());
            return Err(self.failure(&username).await);
        };

        // 3. 校验密码
        if !verify_password(&user.password_hash, &password) {
            self.log_attempt(Some(&user), &username, &ip, &user_agent, false, "密码错误".into());
            return Err(self.failure(&username).await);
        }

        // 4. / 5. 账号状态
        match user.status {
            UserStatus::Disabled => {
                self.log_attempt(Some(&user), &username, &ip, &user_agent, false, "用户已被禁用".into());
                return Err(AppError::AccountDisabled);
            }
            UserStatus::Locked => {
                self.log_attempt(Some(&user), &username, &ip, &user_agent, false, "用户已被锁定".into());
                return Err(AppError::AccountLocked {
                    remaining_secs: None,
                    message: "账号已被锁定，请联系管理员解锁".into(),
                });
            }
            UserStatus::Active => {}
        }

        // 6. 长期未登录自动锁定，超级管理员除外
        if !user.is_super_admin_tier() {
            if let Some(last_login_at) = user.last_login_at {
                let days = self.inactive_lock_days(user.tenant_id).await?;
                if days > 0 && self.clock.now() - last_login_at > chrono::Duration::days(days) {
                    self.repo.lock_user_if_active(user.id).await?;
                    let message = format!("超过{}天未登录自动锁定", days);
                    warn!(user_id = user.id, days, "account locked for inactivity");
                    self.log_attempt(Some(&user), &username, &ip, &user_agent, false, message);
                    return Err(AppError::AccountLocked {
                        remaining_secs: None,
                        message: format!("账号因超过{}天未登录已被锁定，请联系管理员解锁", days),
                    });
                }
            }
        }

        check_tenant_lease(self.repo.as_ref(), &user, self.clock.now()).await?;

        // 7. 开启了二次验证时只发挑战令牌
        if user.totp_enabled {
            let challenge =
                self.tokens
                    .issue_challenge_token(user.id, user.tenant_id, &user.username)?;
            info!(user_id = user.id, "password accepted, waiting for one-time code");
            return Ok(LoginOutcome::ChallengeRequired {
                challenge_token: challenge.token,
            });
        }

        // 8. 发放会话令牌
        let issued = self.finish_login(&user, &ip, &user_agent).await?;
        Ok(LoginOutcome::Session(issued))
    }

    /// 第二步：挑战令牌 + 动态口令
    pub async fn verify_totp(
        &self,
        challenge_token: &str,
        code: &str,
        ip: &str,
        user_agent: &str,
    ) -> Result<IssuedToken, AppError> {
        let claims = self.tokens.verify_challenge_token(challenge_token)?;

        let (locked, remaining) = self.guard.is_locked(&claims.username).await?;
        if locked {
            return Err(self.lock_error(remaining));
        }

        let user = self
            .repo
            .find_user(claims.user_id)
            .await?
            .ok_or(AppError::InvalidToken)?;
        if user.status != UserStatus::Active {
            return Err(AppError::AccountDisabled);
        }
        let secret = match (&user.totp_secret, user.totp_enabled) {
            (Some(secret), true) => secret.clone(),
            _ => return Err(AppError::Validation("未启用二次验证".into())),
        };

        if !validate_totp_code(&secret, code) {
            self.log_attempt(Some(&user), &user.username, ip, user_agent, false, "动态口令错误".into());
            return match self.failure(&user.username).await {
                AppError::InvalidCredentials { .. } => Err(AppError::InvalidTotpCode),
                other => Err(other),
            };
        }

        self.finish_login(&user, ip, user_agent).await
    }

    /// 登录成功后的记录：清除失败计数、更新登录信息、写审计日志
    async fn finish_login(
        &self,
        user: &User,
        ip: &str,
        user_agent: &str,
    ) -> Result<IssuedToken, AppError> {
        let issued = self.tokens.issue_session_token(
            user.id,
            user.tenant_id,
            &user.username,
            user.admin_tier,
        )?;

        if let Err(e) = self.guard.clear_failures(&user.username).await {
            warn!(user_id = user.id, error = %e, "failed to clear login failures");
        }
        self.repo
            .record_login(
                user.id,
                LoginInfo {
                    at: self.clock.now(),
                    ip: ip.to_string(),
                },
            )
            .await?;
        self.log_attempt(Some(user), &user.username, ip, user_agent, true, "登录成功".into());
        info!(user_id = user.id, tenant_id = user.tenant_id, "login succeeded");
        Ok(issued)
    }

    /// 注销：按配置的会话时长写入黑名单，不依赖令牌实际剩余时间
    pub async fn logout(&self, token: &str) -> Result<(), AppError> {
        self.denylist.revoke(token, self.tokens.session_ttl()).await
    }

    async fn load_user(&self, user_id: i64) -> Result<User, AppError> {
        self.repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))
    }

    /// 生成待绑定的密钥，确认前不会生效
    pub async fn begin_totp_enrollment(&self, user_id: i64) -> Result<TotpEnrollment, AppError> {
        let user = self.load_user(user_id).await?;
        if user.totp_enabled {
            return Err(AppError::Validation("已开启二次验证".into()));
        }
        let enrollment = generate_totp_secret(&self.config.totp_issuer, &user.username)?;
        self.cache
            .set_ex(
                &keys::totp_pending_key(user_id),
                &enrollment.secret,
                TOTP_PENDING_TTL,
            )
            .await?;
        Ok(enrollment)
    }

    pub async fn confirm_totp_enrollment(&self, user_id: i64, code: &str) -> Result<(), AppError> {
        let key = keys::totp_pending_key(user_id);
        let secret = self
            .cache
            .get(&key)
            .await?
            .ok_or_else(|| AppError::Validation("请先生成二次验证密钥".into()))?;
        if !validate_totp_code(&secret, code) {
            return Err(AppError::InvalidTotpCode);
        }
        self.repo.update_totp(user_id, true, Some(secret)).await?;
        self.cache.del(&key).await?;
        info!(user_id, "totp enabled");
        Ok(())
    }

    /// 关闭二次验证需要当前有效的动态口令
    pub async fn disable_totp(&self, user_id: i64, code: &str) -> Result<(), AppError> {
        let user = self.load_user(user_id).await?;
        let secret = match (&user.totp_secret, user.totp_enabled) {
            (Some(secret), true) => secret,
            _ => return Err(AppError::Validation("未启用二次验证".into())),
        };
        if !validate_totp_code(secret, code) {
            return Err(AppError::InvalidTotpCode);
        }
        self.repo.update_totp(user_id, false, None).await?;
        info!(user_id, "totp disabled");
        Ok(())
    }

    pub async fn change_password(
        &self,
        user_id: i64,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        validate_new_password(new_password)?;
        let user = self.load_user(user_id).await?;
        if !verify_password(&user.password_hash, old_password) {
            return Err(AppError::Validation("原密码错误".into()));
        }
        let hashed = hash_password(new_password)?;
        self.repo.update_password(user_id, &hashed).await?;
        Ok(())
    }

    /// 发送找回密码验证码，无论邮箱是否存在都返回同样的结果
    pub async fn forgot_password(&self, email: &str) -> Result<(), AppError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("请输入有效的邮箱地址".into()));
        }

        let limit_key = keys::pwd_reset_limit_key(email);
        if self.cache.exists(&limit_key).await? {
            return Err(AppError::RateLimited {
                retry_after_secs: PWD_RESET_SEND_INTERVAL.as_secs(),
            });
        }
        self.cache
            .set_ex(&limit_key, "1", PWD_RESET_SEND_INTERVAL)
            .await?;

        if self.repo.find_user_by_email(email).await?.is_none() {
            return Ok(());
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.cache
            .set_ex(&keys::pwd_reset_key(email), &code, PWD_RESET_CODE_TTL)
            .await?;
        self.cache.del(&keys::pwd_reset_fail_key(email)).await?;
        notify::dispatch(
            self.notifier.clone(),
            Notification {
                channel: Channel::Email,
                recipient: email.to_string(),
                subject: "密码重置验证码".into(),
                body: format!("您的验证码是 {}，5分钟内有效。", code),
            },
        );
        Ok(())
    }

    pub async fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        validate_new_password(new_password)?;
        let email = email.trim();
        let code_key = keys::pwd_reset_key(email);
        let fail_key = keys::pwd_reset_fail_key(email);
        let invalid = || AppError::Validation("验证码错误或已过期".into());

        let stored = self.cache.get(&code_key).await?.ok_or_else(invalid)?;
        if stored != code {
            let failures = self
                .cache
                .incr_with_ttl(&fail_key, PWD_RESET_CODE_TTL)
                .await?;
            if failures >= PWD_RESET_MAX_FAILURES {
                self.cache.del(&code_key).await?;
                self.cache.del(&fail_key).await?;
                warn!(failures, "password reset code discarded after repeated failures");
            }
            return Err(invalid());
        }
        let user = self
            .repo
            .find_user_by_email(email)
            .await?
            .ok_or_else(invalid)?;

        let hashed = hash_password(new_password)?;
        self.repo.update_password(user.id, &hashed).await?;
        self.cache.del(&code_key).await?;
        self.cache.del(&fail_key).await?;
        self.guard.clear_failures(&user.username).await?;
        info!(user_id = user.id, "password reset by email code");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice.w-01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("张三丰").is_err());
    }

    #[test]
    fn password_length_bounds() {
        assert!(validate_new_password("12345").is_err());
        assert!(validate_new_password("123456").is_ok());
        assert!(validate_new_password(&"x".repeat(MAX_PASSWORD_LEN + 1)).is_err());
    }
}
