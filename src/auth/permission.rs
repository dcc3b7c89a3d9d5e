use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use tracing::{debug, warn};

use crate::cache::{self, KvStore, keys};
use crate::error::AppError;
use crate::models::{AdminTier, RoleLevel, User};
use crate::repository::Repository;

/// 角色级别与权限编码的计算
///
/// 所有特权比较都基于 [`RoleLevel`]，不比较角色 id 或名称。
pub struct PermissionResolver {
    repo: Arc<dyn Repository>,
    cache: Arc<dyn KvStore>,
    cache_ttl: Duration,
}

impl PermissionResolver {
    pub fn new(repo: Arc<dyn Repository>, cache: Arc<dyn KvStore>, cache_ttl: Duration) -> Self {
        Self {
            repo,
            cache,
            cache_ttl,
        }
    }

    pub fn role_level(code: &str) -> RoleLevel {
        RoleLevel::from_code(code)
    }

    async fn load_user(&self, user_id: i64) -> Result<User, AppError> {
        self.repo
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("用户不存在".into()))
    }

    /// 管理员级别优先，其余取所有内置角色中最高的一级，没有内置角色时为普通用户
    pub async fn level_of(&self, user: &User) -> Result<RoleLevel, AppError> {
        match user.admin_tier {
            AdminTier::SuperAdmin => return Ok(RoleLevel::SuperAdmin),
            AdminTier::TenantAdmin => return Ok(RoleLevel::Admin),
            AdminTier::Normal => {}
        }

        let roles = self.repo.roles_of_user(user.id).await?;
        Ok(roles
            .iter()
            .map(|r| r.level())
            .filter(|level| *level != RoleLevel::Custom)
            .min()
            .unwrap_or(RoleLevel::User))
    }

    pub async fn user_role_level(&self, user_id: i64) -> Result<RoleLevel, AppError> {
        let user = self.load_user(user_id).await?;
        self.level_of(&user).await
    }

    pub async fn is_super_admin(&self, user_id: i64) -> Result<bool, AppError> {
        Ok(self.user_role_level(user_id).await? == RoleLevel::SuperAdmin)
    }

    /// 有效权限编码集合，超级管理员拥有全部编码
    pub async fn effective_permission_codes(
        &self,
        user_id: i64,
    ) -> Result<BTreeSet<String>, AppError> {
        let key = keys::user_permissions_key(user_id);
        match cache::get_json::<BTreeSet<String>>(self.cache.as_ref(), &key).await {
            Ok(Some(codes)) => return Ok(codes),
            Ok(None) => {}
            Err(e) => warn!(user_id, error = %e, "permission cache read failed"),
        }

        let codes: BTreeSet<String> = if self.is_super_admin(user_id).await? {
            self.repo.all_permission_codes().await?.into_iter().collect()
        } else {
            self.repo
                .permission_codes_for_user(user_id)
                .await?
                .into_iter()
                .collect()
        };

        if let Err(e) = cache::set_json(self.cache.as_ref(), &key, &codes, self.cache_ttl).await {
            warn!(user_id, error = %e, "permission cache write failed");
        }
        Ok(codes)
    }

    pub async fn has_permission(&self, user_id: i64, code: &str) -> Result<bool, AppError> {
        Ok(self.effective_permission_codes(user_id).await?.contains(code))
    }

    pub async fn invalidate_user(&self, user_id: i64) -> Result<(), AppError> {
        debug!(user_id, "invalidating permission cache");
        self.cache.del(&keys::user_permissions_key(user_id)).await?;
        Ok(())
    }

    /// 角色权限变更后，清除所有持有该角色的用户缓存
    pub async fn invalidate_role(&self, role_id: i64) -> Result<(), AppError> {
        let user_ids = self.repo.user_ids_with_role(role_id).await?;
        try_join_all(user_ids.into_iter().map(|id| self.invalidate_user(id))).await?;
        Ok(())
    }

    /// 只能操作级别严格低于自己的角色
    pub async fn can_operate_role(
        &self,
        operator_id: i64,
        target_role_code: &str,
    ) -> Result<bool, AppError> {
        let operator = self.user_role_level(operator_id).await?;
        Ok(operator < RoleLevel::from_code(target_role_code))
    }

    /// 任何一个角色的级别不低于操作者时整批拒绝，未知角色返回 NotFound
    pub async fn can_assign_roles(
        &self,
        operator_id: i64,
        role_ids: &[i64],
    ) -> Result<bool, AppError> {
        let operator = self.user_role_level(operator_id).await?;
        let roles = try_join_all(role_ids.iter().map(|id| self.repo.find_role(*id))).await?;

        for (role_id, role) in role_ids.iter().zip(roles) {
            let role = role.ok_or_else(|| AppError::NotFound(format!("角色{}不存在", role_id)))?;
            if role.level() <= operator {
                debug!(operator_id, role_id, code = %role.code, "role assignment above operator level");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 只能管理级别严格低于自己的用户
    pub async fn has_higher_level(
        &self,
        operator_id: i64,
        target_user_id: i64,
    ) -> Result<bool, AppError> {
        let operator = self.user_role_level(operator_id).await?;
        let target = self.user_role_level(target_user_id).await?;
        Ok(operator < target)
    }
}
