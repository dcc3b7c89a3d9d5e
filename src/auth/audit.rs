use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::setting::{self, LOG_LOGIN_ENABLED, LOG_OPERATION_ENABLED};
use crate::models::{LoginLog, OperationLog};
use crate::repository::Repository;

/// 登录日志和操作日志，写入放在后台任务中，失败不影响请求结果
pub struct AuditLogger {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    login_switch: TtlCache<i64, bool>,
    operation_switch: TtlCache<i64, bool>,
}

/// 一次登录尝试的审计信息
#[derive(Debug, Clone)]
pub struct LoginAuditEntry {
    pub tenant_id: i64,
    pub user_id: i64,
    pub username: String,
    pub ip: String,
    pub user_agent: String,
    pub success: bool,
    pub message: String,
}

/// 一次写操作的审计信息
#[derive(Debug, Clone)]
pub struct OperationAuditEntry {
    pub tenant_id: i64,
    pub user_id: i64,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub ip: String,
    pub user_agent: String,
    pub duration_ms: i64,
}

impl AuditLogger {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::minutes(1);
        Self {
            login_switch: TtlCache::new(clock.clone(), ttl),
            operation_switch: TtlCache::new(clock.clone(), ttl),
            repo,
            clock,
        }
    }

    /// 开关配置变更后调用
    pub fn invalidate(&self) {
        self.login_switch.invalidate();
        self.operation_switch.invalidate();
    }

    /// 租户开关优先，其次全局开关，都没有时默认开启
    async fn enabled(
        &self,
        switch: &TtlCache<i64, bool>,
        key: &str,
        tenant_id: i64,
    ) -> Result<bool, AppError> {
        if switch.get(&0).is_none() {
            let rows = self.repo.settings_by_key(key).await?;
            let values: HashMap<i64, bool> = rows
                .into_iter()
                .map(|s| (s.tenant_id, setting::is_enabled(&s.value)))
                .collect();
            switch.replace(values);
        }

        let tenant = switch.get(&tenant_id).flatten();
        let global = switch.get(&0).flatten();
        Ok(tenant.or(global).unwrap_or(true))
    }

    pub fn record_login(self: &Arc<Self>, entry: LoginAuditEntry) -> JoinHandle<()> {
        let logger = Arc::clone(self);
        tokio::spawn(async move {
            let enabled = logger
                .enabled(&logger.login_switch, LOG_LOGIN_ENABLED, entry.tenant_id)
                .await;
            match enabled {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!(error = %e, "failed to read login log switch");
                    return;
                }
            }
            let log = LoginLog {
                tenant_id: entry.tenant_id,
                user_id: entry.user_id,
                username: entry.username,
                ip: entry.ip,
                user_agent: entry.user_agent,
                success: entry.success,
                message: entry.message,
                created_at: logger.clock.now(),
            };
            if let Err(e) = logger.repo.insert_login_log(log).await {
                warn!(error = %e, "failed to write login log");
            }
        })
    }

    pub fn record_operation(self: &Arc<Self>, entry: OperationAuditEntry) -> JoinHandle<()> {
        let logger = Arc::clone(self);
        tokio::spawn(async move {
            let enabled = logger
                .enabled(&logger.operation_switch, LOG_OPERATION_ENABLED, entry.tenant_id)
                .await;
            match enabled {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!(error = %e, "failed to read operation log switch");
                    return;
                }
            }
            let log = OperationLog {
                tenant_id: entry.tenant_id,
                user_id: entry.user_id,
                method: entry.method,
                path: entry.path,
                status: i32::from(entry.status),
                ip: entry.ip,
                user_agent: entry.user_agent,
                duration_ms: entry.duration_ms,
                created_at: logger.clock.now(),
            };
            if let Err(e) = logger.repo.insert_operation_log(log).await {
                warn!(error = %e, "failed to write operation log");
            }
        })
    }
}
