// 持久层接口
// 业务代码只依赖这些 trait，生产环境用 PostgreSQL 实现，测试用内存实现

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    ApiPermission, Department, LoginInfo, LoginLog, NewUser, OperationLog, Role, RoleDraft,
    Setting, User, UserQuery, UserStatus,
};

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} already exists")]
    Conflict(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("tenant seat quota exhausted ({0})")]
    QuotaExceeded(i32),
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Database(e) => AppError::from(e),
            RepoError::Conflict(what) => AppError::Conflict(format!("{}已存在", what)),
            RepoError::NotFound(what) => AppError::NotFound(format!("{}不存在", what)),
            RepoError::QuotaExceeded(max) => {
                AppError::Validation(format!("租户用户数已达上限（{}）", max))
            }
        }
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// 未删除的用户
    async fn find_user(&self, id: i64) -> RepoResult<Option<User>>;

    /// 跨租户按用户名查找，同名时取 id 最小的一条
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    async fn list_users(&self, query: &UserQuery) -> RepoResult<(Vec<User>, i64)>;

    async fn count_tenant_users(&self, tenant_id: i64) -> RepoResult<i64>;

    /// 插入用户及其角色关联，整体在一个事务内完成
    ///
    /// 所属租户设置了席位上限时，名额检查和插入在同一事务里，满员返回 `QuotaExceeded`。
    async fn create_user(&self, new_user: NewUser) -> RepoResult<User>;

    /// 写回资料字段：邮箱、手机、昵称、部门、公司、席位上限、到期时间
    async fn update_user(&self, user: &User) -> RepoResult<User>;

    async fn update_user_status(&self, id: i64, status: UserStatus) -> RepoResult<()>;

    /// 仅当用户仍处于正常状态时改为锁定，返回是否发生了修改
    async fn lock_user_if_active(&self, id: i64) -> RepoResult<bool>;

    /// 更新最后登录时间、IP，登录次数加一
    async fn record_login(&self, id: i64, info: LoginInfo) -> RepoResult<()>;

    async fn update_totp(&self, id: i64, enabled: bool, secret: Option<String>)
    -> RepoResult<()>;

    async fn update_password(&self, id: i64, password_hash: &str) -> RepoResult<()>;

    async fn soft_delete_user(&self, id: i64, at: DateTime<Utc>) -> RepoResult<()>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_role(&self, id: i64) -> RepoResult<Option<Role>>;

    async fn roles_of_user(&self, user_id: i64) -> RepoResult<Vec<Role>>;

    /// None 表示全部租户
    async fn list_roles(&self, tenant_id: Option<i64>) -> RepoResult<Vec<Role>>;

    async fn create_role(&self, draft: RoleDraft) -> RepoResult<Role>;

    async fn update_role(&self, id: i64, draft: RoleDraft) -> RepoResult<Role>;

    /// 删除角色并清理所有关联
    async fn delete_role(&self, id: i64) -> RepoResult<()>;

    async fn user_ids_with_role(&self, role_id: i64) -> RepoResult<Vec<i64>>;

    // 以下关联替换都是先删后插，在同一事务内完成

    async fn replace_user_roles(&self, user_id: i64, role_ids: &[i64]) -> RepoResult<()>;

    async fn replace_role_permissions(&self, role_id: i64, permission_ids: &[i64])
    -> RepoResult<()>;

    async fn replace_role_menus(&self, role_id: i64, menu_ids: &[i64]) -> RepoResult<()>;

    async fn replace_user_menus(&self, user_id: i64, menu_ids: &[i64]) -> RepoResult<()>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn all_permission_codes(&self) -> RepoResult<Vec<String>>;

    /// 用户所有角色可达的权限编码（未去重）
    async fn permission_codes_for_user(&self, user_id: i64) -> RepoResult<Vec<String>>;

    /// 所有 API 类型的权限
    async fn api_permissions(&self) -> RepoResult<Vec<ApiPermission>>;
}

#[async_trait]
pub trait DepartmentStore: Send + Sync {
    async fn list_departments(&self, tenant_id: Option<i64>) -> RepoResult<Vec<Department>>;
}

#[async_trait]
pub trait SettingStore: Send + Sync {
    async fn find_setting(&self, tenant_id: i64, key: &str) -> RepoResult<Option<Setting>>;

    /// 某个键在所有租户（含全局行）下的取值
    async fn settings_by_key(&self, key: &str) -> RepoResult<Vec<Setting>>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn insert_login_log(&self, log: LoginLog) -> RepoResult<()>;

    /// 某个用户最近的登录记录，新的在前
    async fn recent_login_logs(&self, user_id: i64, limit: i64) -> RepoResult<Vec<LoginLog>>;

    async fn insert_operation_log(&self, log: OperationLog) -> RepoResult<()>;
}

/// 全部存储能力的组合
pub trait Repository:
    UserStore + RoleStore + PermissionStore + DepartmentStore + SettingStore + AuditLog
{
}

impl<T> Repository for T where
    T: UserStore + RoleStore + PermissionStore + DepartmentStore + SettingStore + AuditLog
{
}
