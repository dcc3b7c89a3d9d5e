use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 是否记录登录日志
pub const LOG_LOGIN_ENABLED: &str = "log_login_enabled";

/// 是否记录写操作日志
pub const LOG_OPERATION_ENABLED: &str = "log_operation_enabled";

/// 多少天未登录自动锁定，0 表示关闭
pub const USER_LOCK_INACTIVE_DAYS: &str = "user_lock_inactive_days";

/// 系统配置行，tenant_id 为 0 时是全局默认值
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub tenant_id: i64,
    pub key: String,
    pub value: String,
}

/// 开关类配置的取值约定
pub fn is_enabled(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "on" | "yes")
}
