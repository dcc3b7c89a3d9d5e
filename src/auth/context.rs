use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::credential::SessionClaims;
use super::data_scope::DataScopeFilter;
use super::permission::PermissionResolver;
use super::tenant::TenantScope;
use crate::error::AppError;
use crate::models::{AdminTier, RoleLevel};

/// 通过认证的请求上下文，由认证中间件写入请求扩展
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: SessionClaims,
    /// 原始 bearer 令牌，注销时写入黑名单
    pub token: String,
    pub department_id: i64,
    pub role_level: RoleLevel,
    /// 数据范围中间件执行后才有值
    pub data_scope: Option<DataScopeFilter>,
}

impl AuthContext {
    pub fn user_id(&self) -> i64 {
        self.claims.user_id
    }

    pub fn tenant_id(&self) -> i64 {
        self.claims.tenant_id
    }

    pub fn username(&self) -> &str {
        &self.claims.username
    }

    pub fn admin_tier(&self) -> AdminTier {
        self.claims.admin_tier
    }

    pub fn is_super_admin(&self) -> bool {
        self.role_level == RoleLevel::SuperAdmin
    }

    pub fn tenant_scope(&self) -> TenantScope {
        if self.is_super_admin() {
            TenantScope::All
        } else {
            TenantScope::Tenant(self.tenant_id())
        }
    }

    pub fn data_scope(&self) -> DataScopeFilter {
        self.data_scope
            .clone()
            .unwrap_or_else(DataScopeFilter::unrestricted)
    }

    pub async fn require_permission(
        &self,
        resolver: &PermissionResolver,
        code: &str,
    ) -> Result<(), AppError> {
        if self.is_super_admin() || resolver.has_permission(self.user_id(), code).await? {
            Ok(())
        } else {
            Err(AppError::missing_permission(code))
        }
    }

    /// 任意一个权限即可
    pub async fn require_any_permission(
        &self,
        resolver: &PermissionResolver,
        codes: &[&str],
    ) -> Result<(), AppError> {
        if self.is_super_admin() {
            return Ok(());
        }
        let granted = resolver.effective_permission_codes(self.user_id()).await?;
        if codes.iter().any(|code| granted.contains(*code)) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                permission: codes.first().map(|c| c.to_string()),
                message: format!("无操作权限: {}", codes.join(" | ")),
            })
        }
    }

    pub fn require_super_admin(&self) -> Result<(), AppError> {
        if self.is_super_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("仅超级管理员可以执行此操作"))
        }
    }
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("请先登录".into()))
    }
}
