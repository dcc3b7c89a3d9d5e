use sha2::{Digest, Sha256};

/// 登录失败计数键前缀
const LOGIN_FAIL_PREFIX: &str = "login:fail:";

/// 登录锁定键前缀
const LOGIN_LOCK_PREFIX: &str = "login:lock:";

/// 令牌黑名单键前缀
const TOKEN_BLACKLIST_PREFIX: &str = "token:blacklist:";

/// 用户权限码缓存键前缀
const USER_PERMISSIONS_PREFIX: &str = "user:permissions:";

/// 待绑定的 TOTP 密钥
const TOTP_PENDING_PREFIX: &str = "totp:pending:";

/// 找回密码验证码
const PWD_RESET_PREFIX: &str = "pwd_reset:";

/// 找回密码验证码输错次数
const PWD_RESET_FAIL_PREFIX: &str = "pwd_reset_fail:";

/// 找回密码发送频率限制
const PWD_RESET_LIMIT_PREFIX: &str = "pwd_reset_limit:";

pub fn login_fail_key(username: &str) -> String {
    format!("{}{}", LOGIN_FAIL_PREFIX, username)
}

pub fn login_lock_key(username: &str) -> String {
    format!("{}{}", LOGIN_LOCK_PREFIX, username)
}

/// 黑名单键使用令牌的 SHA-256 摘要，避免把完整 JWT 作为键名
pub fn token_blacklist_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}", TOKEN_BLACKLIST_PREFIX, hex)
}

pub fn user_permissions_key(user_id: i64) -> String {
    format!("{}{}", USER_PERMISSIONS_PREFIX, user_id)
}

pub fn totp_pending_key(user_id: i64) -> String {
    format!("{}{}", TOTP_PENDING_PREFIX, user_id)
}

pub fn pwd_reset_key(email: &str) -> String {
    format!("{}{}", PWD_RESET_PREFIX, email)
}

pub fn pwd_reset_fail_key(email: &str) -> String {
    format!("{}{}", PWD_RESET_FAIL_PREFIX, email)
}

pub fn pwd_reset_limit_key(email: &str) -> String {
    format!("{}{}", PWD_RESET_LIMIT_PREFIX, email)
}

/// 全局 IP 限流
pub fn global_rate_limit_key(ip: &str) -> String {
    format!("ratelimit:global:{}", ip)
}

/// 单接口 IP 限流
pub fn route_rate_limit_key(path: &str, ip: &str) -> String {
    format!("ratelimit:{}:{}", path, ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blacklist_key_is_stable_digest() {
        let a = token_blacklist_key("abc.def.ghi");
        let b = token_blacklist_key("abc.def.ghi");
        assert_eq!(a, b);
        assert!(a.starts_with("token:blacklist:"));
        assert_eq!(a.len(), "token:blacklist:".len() + 64);
        assert_ne!(a, token_blacklist_key("abc.def.ghj"));
    }
}
