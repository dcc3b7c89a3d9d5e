use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::{
    AuditLog, DepartmentStore, PermissionStore, RepoError, RepoResult, RoleStore, SettingStore,
    UserStore,
};
use crate::models::{
    ApiPermission, Department, LoginInfo, LoginLog, NewUser, OperationLog, PermissionKind, Role,
    RoleDraft, Setting, User, UserQuery, UserStatus,
};

macro_rules! user_select {
    ($tail:literal) => {
        concat!(
            "SELECT id, tenant_id, username, password_hash, email, phone, nickname, \
             department_id, status, admin_tier, totp_enabled, totp_secret, last_login_at, \
             last_login_ip, login_count, expire_time, max_users, company, created_at, deleted_at \
             FROM users ",
            $tail
        )
    };
}

const USER_RETURNING: &str = " RETURNING id, tenant_id, username, password_hash, email, phone, \
    nickname, department_id, status, admin_tier, totp_enabled, totp_secret, last_login_at, \
    last_login_ip, login_count, expire_time, max_users, company, created_at, deleted_at";

const ROLE_COLUMNS: &str = "r.id, r.tenant_id, r.name, r.code, r.status, r.sort, r.data_scope, r.remark";

/// PostgreSQL 唯一约束冲突
fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|d| d.code())
        .is_some_and(|code| code == "23505")
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgRepository {
    async fn find_user(&self, id: i64) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(user_select!("WHERE id = $1 AND deleted_at IS NULL"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(user_select!(
            "WHERE username = $1 AND deleted_at IS NULL ORDER BY id LIMIT 1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(user_select!(
            "WHERE email = $1 AND email <> '' AND deleted_at IS NULL ORDER BY id LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, query: &UserQuery) -> RepoResult<(Vec<User>, i64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &UserQuery) {
            builder.push(" WHERE deleted_at IS NULL");
            if let Some(tenant_id) = query.tenant_id {
                builder.push(" AND tenant_id = ").push_bind(tenant_id);
            }
            if let Some(departments) = &query.department_ids {
                builder
                    .push(" AND department_id = ANY(")
                    .push_bind(departments.clone())
                    .push(")");
            }
            if let Some(user_id) = query.only_user_id {
                builder.push(" AND id = ").push_bind(user_id);
            }
            if let Some(tier) = query.admin_tier {
                builder.push(" AND admin_tier = ").push_bind(tier);
            }
            if let Some(keyword) = query.keyword.as_deref().filter(|k| !k.is_empty()) {
                let pattern = format!("%{}%", keyword);
                builder
                    .push(" AND (username ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR nickname ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR email ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(user_select!(""));
        push_filters(&mut select, query);
        select
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(query.page_size)
            .push(" OFFSET ")
            .push_bind((query.page - 1).max(0) * query.page_size);
        let users = select.build_query_as::<User>().fetch_all(&self.pool).await?;

        Ok((users, total))
    }

    async fn count_tenant_users(&self, tenant_id: i64) -> RepoResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND deleted_at IS NULL",
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn create_user(&self, new_user: NewUser) -> RepoResult<User> {
        let mut tx = self.pool.begin().await?;

        let taken: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM users WHERE username = $1 AND deleted_at IS NULL LIMIT 1",
        )
        .bind(&new_user.username)
        .fetch_optional(&mut *tx)
        .await?;
        if taken.is_some() {
            return Err(RepoError::Conflict("用户名".into()));
        }

        // 锁住租户管理员行，同一租户的并发创建在这里排队
        if !new_user.promote_to_own_tenant && new_user.tenant_id != 0 {
            let max_users: Option<i32> = sqlx::query_scalar(
                "SELECT max_users FROM users WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            )
            .bind(new_user.tenant_id)
            .fetch_optional(&mut *tx)
            .await?;
            if let Some(max) = max_users.filter(|max| *max > 0) {
                let used: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM users WHERE tenant_id = $1 AND deleted_at IS NULL",
                )
                .bind(new_user.tenant_id)
                .fetch_one(&mut *tx)
                .await?;
                if used >= i64::from(max) {
                    return Err(RepoError::QuotaExceeded(max));
                }
            }
        }

        let insert = format!(
            "INSERT INTO users (tenant_id, username, password_hash, email, phone, nickname, \
             department_id, status, admin_tier, max_users, expire_time, company) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12){}",
            USER_RETURNING
        );
        let mut user = sqlx::query_as::<_, User>(&insert)
            .bind(new_user.tenant_id)
            .bind(&new_user.username)
            .bind(&new_user.password_hash)
            .bind(&new_user.email)
            .bind(&new_user.phone)
            .bind(&new_user.nickname)
            .bind(new_user.department_id)
            .bind(UserStatus::Active)
            .bind(new_user.admin_tier)
            .bind(new_user.max_users)
            .bind(new_user.expire_time)
            .bind(&new_user.company)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepoError::Conflict("用户名".into())
                } else {
                    RepoError::Database(e)
                }
            })?;

        if new_user.promote_to_own_tenant {
            let promote = format!("UPDATE users SET tenant_id = id WHERE id = $1{}", USER_RETURNING);
            user = sqlx::query_as::<_, User>(&promote)
                .bind(user.id)
                .fetch_one(&mut *tx)
                .await?;
        }

        if !new_user.role_ids.is_empty() {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) SELECT $1, UNNEST($2::BIGINT[])",
            )
            .bind(user.id)
            .bind(&new_user.role_ids)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> RepoResult<User> {
        let update = format!(
            "UPDATE users SET email = $2, phone = $3, nickname = $4, department_id = $5, \
             company = $6, max_users = $7, expire_time = $8 \
             WHERE id = $1 AND deleted_at IS NULL{}",
            USER_RETURNING
        );
        let updated = sqlx::query_as::<_, User>(&update)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.nickname)
            .bind(user.department_id)
            .bind(&user.company)
            .bind(user.max_users)
            .bind(user.expire_time)
            .fetch_optional(&self.pool)
            .await?;
        updated.ok_or_else(|| RepoError::NotFound("用户".into()))
    }

    async fn update_user_status(&self, id: i64, status: UserStatus) -> RepoResult<()> {
        sqlx::query("UPDATE users SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn lock_user_if_active(&self, id: i64) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE users SET status = $2 WHERE id = $1 AND status = $3")
            .bind(id)
            .bind(UserStatus::Locked)
            .bind(UserStatus::Active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_login(&self, id: i64, info: LoginInfo) -> RepoResult<()> {
        sqlx::query(
            "UPDATE users SET last_login_at = $2, last_login_ip = $3, \
             login_count = login_count + 1 WHERE id = $1",
        )
        .bind(id)
        .bind(info.at)
        .bind(info.ip)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_totp(&self, id: i64, enabled: bool, secret: Option<String>) -> RepoResult<()> {
        sqlx::query("UPDATE users SET totp_enabled = $2, totp_secret = $3 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .bind(secret)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> RepoResult<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn soft_delete_user(&self, id: i64, at: DateTime<Utc>) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET deleted_at = $2 WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleStore for PgRepository {
    async fn find_role(&self, id: i64) -> RepoResult<Option<Role>> {
        let sql = format!("SELECT {} FROM roles r WHERE r.id = $1", ROLE_COLUMNS);
        let role = sqlx::query_as::<_, Role>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn roles_of_user(&self, user_id: i64) -> RepoResult<Vec<Role>> {
        let sql = format!(
            "SELECT {} FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 AND r.status = 1 ORDER BY r.sort, r.id",
            ROLE_COLUMNS
        );
        let roles = sqlx::query_as::<_, Role>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn list_roles(&self, tenant_id: Option<i64>) -> RepoResult<Vec<Role>> {
        let sql = format!(
            "SELECT {} FROM roles r WHERE ($1::BIGINT IS NULL OR r.tenant_id = $1) \
             ORDER BY r.sort, r.id",
            ROLE_COLUMNS
        );
        let roles = sqlx::query_as::<_, Role>(&sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn create_role(&self, draft: RoleDraft) -> RepoResult<Role> {
        let role = sqlx::query_as::<_, Role>(
            "INSERT INTO roles (tenant_id, name, code, status, sort, data_scope, remark) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, tenant_id, name, code, status, sort, data_scope, remark",
        )
        .bind(draft.tenant_id)
        .bind(&draft.name)
        .bind(&draft.code)
        .bind(draft.status)
        .bind(draft.sort)
        .bind(draft.data_scope)
        .bind(&draft.remark)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Conflict("角色编码".into())
            } else {
                RepoError::Database(e)
            }
        })?;
        Ok(role)
    }

    async fn update_role(&self, id: i64, draft: RoleDraft) -> RepoResult<Role> {
        let role = sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = $2, code = $3, status = $4, sort = $5, data_scope = $6, \
             remark = $7 WHERE id = $1 \
             RETURNING id, tenant_id, name, code, status, sort, data_scope, remark",
        )
        .bind(id)
        .bind(&draft.name)
        .bind(&draft.code)
        .bind(draft.status)
        .bind(draft.sort)
        .bind(draft.data_scope)
        .bind(&draft.remark)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Conflict("角色编码".into())
            } else {
                RepoError::Database(e)
            }
        })?;
        role.ok_or_else(|| RepoError::NotFound("角色".into()))
    }

    async fn delete_role(&self, id: i64) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;
        for sql in [
            "DELETE FROM user_roles WHERE role_id = $1",
            "DELETE FROM role_permissions WHERE role_id = $1",
            "DELETE FROM role_menus WHERE role_id = $1",
            "DELETE FROM roles WHERE id = $1",
        ] {
            sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn user_ids_with_role(&self, role_id: i64) -> RepoResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT user_id FROM user_roles WHERE role_id = $1")
            .bind(role_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn replace_user_roles(&self, user_id: i64, role_ids: &[i64]) -> RepoResult<()> {
        self.replace_associations("user_roles", "user_id", "role_id", user_id, role_ids)
            .await
    }

    async fn replace_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> RepoResult<()> {
        self.replace_associations(
            "role_permissions",
            "role_id",
            "permission_id",
            role_id,
            permission_ids,
        )
        .await
    }

    async fn replace_role_menus(&self, role_id: i64, menu_ids: &[i64]) -> RepoResult<()> {
        self.replace_associations("role_menus", "role_id", "menu_id", role_id, menu_ids)
            .await
    }

    async fn replace_user_menus(&self, user_id: i64, menu_ids: &[i64]) -> RepoResult<()> {
        self.replace_associations("user_menus", "user_id", "menu_id", user_id, menu_ids)
            .await
    }
}

impl PgRepository {
    /// 先删后插，放在同一事务里，并发读不会看到空关联
    async fn replace_associations(
        &self,
        table: &'static str,
        owner_column: &'static str,
        target_column: &'static str,
        owner_id: i64,
        target_ids: &[i64],
    ) -> RepoResult<()> {
        let mut tx = self.pool.begin().await?;

        let delete = format!("DELETE FROM {} WHERE {} = $1", table, owner_column);
        sqlx::query(&delete).bind(owner_id).execute(&mut *tx).await?;

        if !target_ids.is_empty() {
            let insert = format!(
                "INSERT INTO {} ({}, {}) SELECT $1, UNNEST($2::BIGINT[]) ON CONFLICT DO NOTHING",
                table, owner_column, target_column
            );
            sqlx::query(&insert)
                .bind(owner_id)
                .bind(target_ids)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for PgRepository {
    async fn all_permission_codes(&self) -> RepoResult<Vec<String>> {
        let codes = sqlx::query_scalar("SELECT code FROM permissions WHERE code <> ''")
            .fetch_all(&self.pool)
            .await?;
        Ok(codes)
    }

    async fn permission_codes_for_user(&self, user_id: i64) -> RepoResult<Vec<String>> {
        let codes = sqlx::query_scalar(
            "SELECT p.code FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             JOIN user_roles ur ON ur.role_id = rp.role_id \
             JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 AND r.status = 1 AND p.code <> ''",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    async fn api_permissions(&self) -> RepoResult<Vec<ApiPermission>> {
        let rows = sqlx::query_as::<_, ApiPermission>(
            "SELECT code, method, path FROM permissions WHERE kind = $1 ORDER BY id",
        )
        .bind(PermissionKind::Api)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl DepartmentStore for PgRepository {
    async fn list_departments(&self, tenant_id: Option<i64>) -> RepoResult<Vec<Department>> {
        let departments = sqlx::query_as::<_, Department>(
            "SELECT id, tenant_id, parent_id, name, sort, status FROM departments \
             WHERE ($1::BIGINT IS NULL OR tenant_id = $1) ORDER BY sort, id",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(departments)
    }
}

#[async_trait]
impl SettingStore for PgRepository {
    async fn find_setting(&self, tenant_id: i64, key: &str) -> RepoResult<Option<Setting>> {
        let setting = sqlx::query_as::<_, Setting>(
            "SELECT tenant_id, setting_key AS key, setting_value AS value FROM settings \
             WHERE tenant_id = $1 AND setting_key = $2",
        )
        .bind(tenant_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(setting)
    }

    async fn settings_by_key(&self, key: &str) -> RepoResult<Vec<Setting>> {
        let settings = sqlx::query_as::<_, Setting>(
            "SELECT tenant_id, setting_key AS key, setting_value AS value FROM settings \
             WHERE setting_key = $1",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;
        Ok(settings)
    }
}

#[async_trait]
impl AuditLog for PgRepository {
    async fn insert_login_log(&self, log: LoginLog) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO login_logs (tenant_id, user_id, username, ip, user_agent, success, \
             message, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(log.tenant_id)
        .bind(log.user_id)
        .bind(&log.username)
        .bind(&log.ip)
        .bind(&log.user_agent)
        .bind(log.success)
        .bind(&log.message)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_login_logs(&self, user_id: i64, limit: i64) -> RepoResult<Vec<LoginLog>> {
        let logs = sqlx::query_as::<_, LoginLog>(
            "SELECT tenant_id, user_id, username, ip, user_agent, success, message, created_at \
             FROM login_logs WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }

    async fn insert_operation_log(&self, log: OperationLog) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO operation_logs (tenant_id, user_id, method, path, status, ip, \
             user_agent, duration_ms, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(log.tenant_id)
        .bind(log.user_id)
        .bind(&log.method)
        .bind(&log.path)
        .bind(log.status)
        .bind(&log.ip)
        .bind(&log.user_agent)
        .bind(log.duration_ms)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
