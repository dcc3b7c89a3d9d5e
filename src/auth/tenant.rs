use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::User;
use crate::repository::{SettingStore, UserStore};

/// 调用方可见的租户范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TenantScope {
    /// 超级管理员，不按租户过滤
    All,
    Tenant(i64),
}

impl TenantScope {
    /// 列表查询的租户条件
    pub fn tenant_filter(&self) -> Option<i64> {
        match self {
            TenantScope::All => None,
            TenantScope::Tenant(id) => Some(*id),
        }
    }

    pub fn allows(&self, tenant_id: i64) -> bool {
        match self {
            TenantScope::All => true,
            TenantScope::Tenant(id) => *id == tenant_id,
        }
    }
}

/// 跨租户访问按不存在处理，不暴露实体是否存在
pub fn ensure_same_tenant(
    scope: &TenantScope,
    entity_tenant_id: i64,
    what: &str,
) -> Result<(), AppError> {
    if scope.allows(entity_tenant_id) {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{}不存在", what)))
    }
}

/// 租户配置优先，其次全局配置
pub async fn resolve_setting<R: SettingStore + ?Sized>(
    repo: &R,
    tenant_id: i64,
    key: &str,
) -> Result<Option<String>, AppError> {
    if tenant_id != 0 {
        if let Some(setting) = repo.find_setting(tenant_id, key).await? {
            return Ok(Some(setting.value));
        }
    }
    Ok(repo.find_setting(0, key).await?.map(|s| s.value))
}

/// 租户到期后其下所有用户都不能登录
pub async fn check_tenant_lease<R: UserStore + ?Sized>(
    repo: &R,
    user: &User,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if user.tenant_id == 0 {
        return Ok(());
    }
    let owner = if user.id == user.tenant_id {
        Some(user.clone())
    } else {
        repo.find_user(user.tenant_id).await?
    };
    match owner.and_then(|o| o.expire_time) {
        Some(expire_time) if expire_time <= now => {
            Err(AppError::forbidden("租户已到期，请联系平台管理员"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::models::{AdminTier, NewUser};
    use crate::repository::MemoryRepository;

    #[test]
    fn scope_filters() {
        assert_eq!(TenantScope::All.tenant_filter(), None);
        assert_eq!(TenantScope::Tenant(4).tenant_filter(), Some(4));
        assert!(ensure_same_tenant(&TenantScope::Tenant(4), 4, "用户").is_ok());
        assert!(matches!(
            ensure_same_tenant(&TenantScope::Tenant(4), 5, "用户"),
            Err(AppError::NotFound(_))
        ));
        assert!(ensure_same_tenant(&TenantScope::All, 5, "用户").is_ok());
    }

    #[tokio::test]
    async fn tenant_setting_overrides_global() {
        let repo = MemoryRepository::new(Arc::new(ManualClock::default()));
        repo.put_setting(0, "k", "global");
        assert_eq!(resolve_setting(&repo, 9, "k").await.unwrap().as_deref(), Some("global"));
        repo.put_setting(9, "k", "tenant");
        assert_eq!(resolve_setting(&repo, 9, "k").await.unwrap().as_deref(), Some("tenant"));
        assert_eq!(resolve_setting(&repo, 8, "k").await.unwrap().as_deref(), Some("global"));
        assert_eq!(resolve_setting(&repo, 9, "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn lease_applies_to_every_member() {
        let clock = Arc::new(ManualClock::default());
        let repo = MemoryRepository::new(clock.clone());
        let owner = repo
            .create_user(NewUser {
                tenant_id: 0,
                username: "acme".into(),
                password_hash: "x".into(),
                email: String::new(),
                phone: String::new(),
                nickname: "acme".into(),
                department_id: 0,
                admin_tier: AdminTier::TenantAdmin,
                max_users: 0,
                expire_time: Some(clock.now() + chrono::Duration::days(1)),
                company: "Acme".into(),
                role_ids: vec![],
                promote_to_own_tenant: true,
            })
            .await
            .unwrap();
        let member = repo.seed_user(owner.id, "m1", "x", AdminTier::Normal);
        assert!(check_tenant_lease(&repo, &owner, clock.now()).await.is_ok());
        assert!(check_tenant_lease(&repo, &member, clock.now()).await.is_ok());
        clock.advance(chrono::Duration::days(2));
        assert!(matches!(
            check_tenant_lease(&repo, &member, clock.now()).await,
            Err(AppError::Forbidden { .. })
        ));
        assert!(check_tenant_lease(&repo, &owner, clock.now()).await.is_err());
    }
}
