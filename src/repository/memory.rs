use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    AuditLog, DepartmentStore, PermissionStore, RepoError, RepoResult, RoleStore, SettingStore,
    UserStore,
};
use crate::clock::Clock;
use crate::models::{
    AdminTier, ApiPermission, Department, LoginInfo, LoginLog, NewUser, OperationLog, Permission,
    PermissionKind, Role, RoleDraft, Setting, User, UserQuery, UserStatus,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, User>,
    roles: BTreeMap<i64, Role>,
    permissions: BTreeMap<i64, Permission>,
    departments: BTreeMap<i64, Department>,
    settings: Vec<Setting>,
    login_logs: Vec<LoginLog>,
    operation_logs: Vec<OperationLog>,
    user_roles: BTreeSet<(i64, i64)>,
    role_permissions: BTreeSet<(i64, i64)>,
    role_menus: BTreeSet<(i64, i64)>,
    user_menus: BTreeSet<(i64, i64)>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn live_user(&self, id: i64) -> Option<&User> {
        self.users.get(&id).filter(|u| !u.is_deleted())
    }

    /// 租户设置的席位上限，0 或租户不存在时不限
    fn seat_limit(&self, tenant_id: i64) -> Option<i32> {
        if tenant_id == 0 {
            return None;
        }
        self.live_user(tenant_id)
            .map(|owner| owner.max_users)
            .filter(|max| *max > 0)
    }

    fn live_users_in(&self, tenant_id: i64) -> i64 {
        self.users
            .values()
            .filter(|u| !u.is_deleted() && u.tenant_id == tenant_id)
            .count() as i64
    }

    fn active_role_ids_of(&self, user_id: i64) -> Vec<i64> {
        self.user_roles
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, rid)| *rid)
            .filter(|rid| self.roles.get(rid).is_some_and(|r| r.status == 1))
            .collect()
    }
}

/// 进程内存储，供测试和本地演示使用
///
/// 所有写操作在同一把写锁内完成，关联替换和租户管理员创建因此天然是原子的。
pub struct MemoryRepository {
    clock: Arc<dyn Clock>,
    tables: RwLock<Tables>,
}

/// 关联表替换的目标
#[derive(Clone, Copy)]
enum Association {
    UserRoles,
    RolePermissions,
    RoleMenus,
    UserMenus,
}

impl MemoryRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接写入一个正常状态的用户
    pub fn seed_user(
        &self,
        tenant_id: i64,
        username: &str,
        password_hash: &str,
        admin_tier: AdminTier,
    ) -> User {
        let now = self.clock.now();
        let mut tables = self.write();
        let id = tables.next_id();
        let user = User {
            id,
            tenant_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            email: String::new(),
            phone: String::new(),
            nickname: username.to_string(),
            department_id: 0,
            status: UserStatus::Active,
            admin_tier,
            totp_enabled: false,
            totp_secret: None,
            last_login_at: None,
            last_login_ip: String::new(),
            login_count: 0,
            expire_time: None,
            max_users: 0,
            company: String::new(),
            created_at: now,
            deleted_at: None,
        };
        tables.users.insert(id, user.clone());
        user
    }

    /// 修改已存在的用户
    pub fn edit_user(&self, id: i64, edit: impl FnOnce(&mut User)) {
        if let Some(user) = self.write().users.get_mut(&id) {
            edit(user);
        }
    }

    pub fn seed_permission(
        &self,
        code: &str,
        kind: PermissionKind,
        method: &str,
        path: &str,
    ) -> Permission {
        let mut tables = self.write();
        let id = tables.next_id();
        let permission = Permission {
            id,
            parent_id: 0,
            name: code.to_string(),
            code: code.to_string(),
            kind,
            method: method.to_string(),
            path: path.to_string(),
        };
        tables.permissions.insert(id, permission.clone());
        permission
    }

    pub fn seed_department(&self, tenant_id: i64, parent_id: i64, name: &str) -> Department {
        let mut tables = self.write();
        let id = tables.next_id();
        let department = Department {
            id,
            tenant_id,
            parent_id,
            name: name.to_string(),
            sort: 0,
            status: 1,
        };
        tables.departments.insert(id, department.clone());
        department
    }

    pub fn put_setting(&self, tenant_id: i64, key: &str, value: &str) {
        let mut tables = self.write();
        tables
            .settings
            .retain(|s| !(s.tenant_id == tenant_id && s.key == key));
        tables.settings.push(Setting {
            tenant_id,
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    pub fn login_logs(&self) -> Vec<LoginLog> {
        self.read().login_logs.clone()
    }

    pub fn operation_logs(&self) -> Vec<OperationLog> {
        self.read().operation_logs.clone()
    }

    pub fn role_menu_ids(&self, role_id: i64) -> Vec<i64> {
        self.read()
            .role_menus
            .iter()
            .filter(|(rid, _)| *rid == role_id)
            .map(|(_, mid)| *mid)
            .collect()
    }

    pub fn user_menu_ids(&self, user_id: i64) -> Vec<i64> {
        self.read()
            .user_menus
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, mid)| *mid)
            .collect()
    }

    fn replace(&self, association: Association, owner_id: i64, target_ids: &[i64]) {
        let mut tables = self.write();
        let set = match association {
            Association::UserRoles => &mut tables.user_roles,
            Association::RolePermissions => &mut tables.role_permissions,
            Association::RoleMenus => &mut tables.role_menus,
            Association::UserMenus => &mut tables.user_menus,
        };
        set.retain(|(owner, _)| *owner != owner_id);
        set.extend(target_ids.iter().map(|target| (owner_id, *target)));
    }

    fn with_user(&self, id: i64, f: impl FnOnce(&mut User)) -> RepoResult<()> {
        let mut tables = self.write();
        match tables.users.get_mut(&id).filter(|u| !u.is_deleted()) {
            Some(user) => {
                f(user);
                Ok(())
            }
            None => Err(RepoError::NotFound("用户".into())),
        }
    }
}

#[async_trait]
impl UserStore for MemoryRepository {
    async fn find_user(&self, id: i64) -> RepoResult<Option<User>> {
        Ok(self.read().live_user(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| !u.is_deleted() && u.username == username)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        if email.is_empty() {
            return Ok(None);
        }
        Ok(self
            .read()
            .users
            .values()
            .find(|u| !u.is_deleted() && u.email == email)
            .cloned())
    }

    async fn list_users(&self, query: &UserQuery) -> RepoResult<(Vec<User>, i64)> {
        let tables = self.read();
        let keyword = query.keyword.as_deref().unwrap_or_default().to_lowercase();
        let mut matched: Vec<User> = tables
            .users
            .values()
            .filter(|u| !u.is_deleted())
            .filter(|u| query.tenant_id.is_none_or(|t| u.tenant_id == t))
            .filter(|u| {
                query
                    .department_ids
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&u.department_id))
            })
            .filter(|u| query.only_user_id.is_none_or(|id| u.id == id))
            .filter(|u| query.admin_tier.is_none_or(|tier| u.admin_tier == tier))
            .filter(|u| {
                keyword.is_empty()
                    || u.username.to_lowercase().contains(&keyword)
                    || u.nickname.to_lowercase().contains(&keyword)
                    || u.email.to_lowercase().contains(&keyword)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.id.cmp(&a.id));

        let total = matched.len() as i64;
        let skip = ((query.page - 1).max(0) * query.page_size) as usize;
        let users = matched
            .into_iter()
            .skip(skip)
            .take(query.page_size.max(0) as usize)
            .collect();
        Ok((users, total))
    }

    async fn count_tenant_users(&self, tenant_id: i64) -> RepoResult<i64> {
        Ok(self.read().live_users_in(tenant_id))
    }

    async fn create_user(&self, new_user: NewUser) -> RepoResult<User> {
        let now = self.clock.now();
        let mut tables = self.write();

        if tables
            .users
            .values()
            .any(|u| !u.is_deleted() && u.username == new_user.username)
        {
            return Err(RepoError::Conflict("用户名".into()));
        }
        if !new_user.promote_to_own_tenant {
            if let Some(max) = tables.seat_limit(new_user.tenant_id) {
                if tables.live_users_in(new_user.tenant_id) >= i64::from(max) {
                    return Err(RepoError::QuotaExceeded(max));
                }
            }
        }

        let id = tables.next_id();
        let user = User {
            id,
            tenant_id: if new_user.promote_to_own_tenant {
                id
            } else {
                new_user.tenant_id
            },
            username: new_user.username,
            password_hash: new_user.password_hash,
            email: new_user.email,
            phone: new_user.phone,
            nickname: new_user.nickname,
            department_id: new_user.department_id,
            status: UserStatus::Active,
            admin_tier: new_user.admin_tier,
            totp_enabled: false,
            totp_secret: None,
            last_login_at: None,
            last_login_ip: String::new(),
            login_count: 0,
            expire_time: new_user.expire_time,
            max_users: new_user.max_users,
            company: new_user.company,
            created_at: now,
            deleted_at: None,
        };
        tables.users.insert(id, user.clone());
        tables
            .user_roles
            .extend(new_user.role_ids.iter().map(|rid| (id, *rid)));
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> RepoResult<User> {
        let mut tables = self.write();
        let stored = tables
            .users
            .get_mut(&user.id)
            .filter(|u| !u.is_deleted())
            .ok_or_else(|| RepoError::NotFound("用户".into()))?;
        stored.email = user.email.clone();
        stored.phone = user.phone.clone();
        stored.nickname = user.nickname.clone();
        stored.department_id = user.department_id;
        stored.company = user.company.clone();
        stored.max_users = user.max_users;
        stored.expire_time = user.expire_time;
        Ok(stored.clone())
    }

    async fn update_user_status(&self, id: i64, status: UserStatus) -> RepoResult<()> {
        self.with_user(id, |u| u.status = status)
    }

    async fn lock_user_if_active(&self, id: i64) -> RepoResult<bool> {
        let mut changed = false;
        self.with_user(id, |u| {
            if u.status == UserStatus::Active {
                u.status = UserStatus::Locked;
                changed = true;
            }
        })?;
        Ok(changed)
    }

    async fn record_login(&self, id: i64, info: LoginInfo) -> RepoResult<()> {
        self.with_user(id, |u| {
            u.last_login_at = Some(info.at);
            u.last_login_ip = info.ip;
            u.login_count += 1;
        })
    }

    async fn update_totp(&self, id: i64, enabled: bool, secret: Option<String>) -> RepoResult<()> {
        self.with_user(id, |u| {
            u.totp_enabled = enabled;
            u.totp_secret = secret;
        })
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> RepoResult<()> {
        self.with_user(id, |u| u.password_hash = password_hash.to_string())
    }

    async fn soft_delete_user(&self, id: i64, at: DateTime<Utc>) -> RepoResult<()> {
        self.with_user(id, |u| u.deleted_at = Some(at))?;
        self.replace(Association::UserRoles, id, &[]);
        Ok(())
    }
}

#[async_trait]
impl RoleStore for MemoryRepository {
    async fn find_role(&self, id: i64) -> RepoResult<Option<Role>> {
        Ok(self.read().roles.get(&id).cloned())
    }

    async fn roles_of_user(&self, user_id: i64) -> RepoResult<Vec<Role>> {
        let tables = self.read();
        Ok(tables
            .active_role_ids_of(user_id)
            .into_iter()
            .filter_map(|rid| tables.roles.get(&rid).cloned())
            .collect())
    }

    async fn list_roles(&self, tenant_id: Option<i64>) -> RepoResult<Vec<Role>> {
        let mut roles: Vec<Role> = self
            .read()
            .roles
            .values()
            .filter(|r| tenant_id.is_none_or(|t| r.tenant_id == t))
            .cloned()
            .collect();
        roles.sort_by_key(|r| (r.sort, r.id));
        Ok(roles)
    }

    async fn create_role(&self, draft: RoleDraft) -> RepoResult<Role> {
        let mut tables = self.write();
        if tables
            .roles
            .values()
            .any(|r| r.tenant_id == draft.tenant_id && r.code == draft.code)
        {
            return Err(RepoError::Conflict("角色编码".into()));
        }
        let id = tables.next_id();
        let role = Role {
            id,
            tenant_id: draft.tenant_id,
            name: draft.name,
            code: draft.code,
            status: draft.status,
            sort: draft.sort,
            data_scope: draft.data_scope,
            remark: draft.remark,
        };
        tables.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn update_role(&self, id: i64, draft: RoleDraft) -> RepoResult<Role> {
        let mut tables = self.write();
        let tenant_id = match tables.roles.get(&id) {
            Some(role) => role.tenant_id,
            None => return Err(RepoError::NotFound("角色".into())),
        };
        if tables
            .roles
            .values()
            .any(|r| r.id != id && r.tenant_id == tenant_id && r.code == draft.code)
        {
            return Err(RepoError::Conflict("角色编码".into()));
        }
        let role = tables
            .roles
            .get_mut(&id)
            .ok_or_else(|| RepoError::NotFound("角色".into()))?;
        role.name = draft.name;
        role.code = draft.code;
        role.status = draft.status;
        role.sort = draft.sort;
        role.data_scope = draft.data_scope;
        role.remark = draft.remark;
        Ok(role.clone())
    }

    async fn delete_role(&self, id: i64) -> RepoResult<()> {
        let mut tables = self.write();
        tables.roles.remove(&id);
        tables.user_roles.retain(|(_, rid)| *rid != id);
        tables.role_permissions.retain(|(rid, _)| *rid != id);
        tables.role_menus.retain(|(rid, _)| *rid != id);
        Ok(())
    }

    async fn user_ids_with_role(&self, role_id: i64) -> RepoResult<Vec<i64>> {
        Ok(self
            .read()
            .user_roles
            .iter()
            .filter(|(_, rid)| *rid == role_id)
            .map(|(uid, _)| *uid)
            .collect())
    }

    async fn replace_user_roles(&self, user_id: i64, role_ids: &[i64]) -> RepoResult<()> {
        self.replace(Association::UserRoles, user_id, role_ids);
        Ok(())
    }

    async fn replace_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> RepoResult<()> {
        self.replace(Association::RolePermissions, role_id, permission_ids);
        Ok(())
    }

    async fn replace_role_menus(&self, role_id: i64, menu_ids: &[i64]) -> RepoResult<()> {
        self.replace(Association::RoleMenus, role_id, menu_ids);
        Ok(())
    }

    async fn replace_user_menus(&self, user_id: i64, menu_ids: &[i64]) -> RepoResult<()> {
        self.replace(Association::UserMenus, user_id, menu_ids);
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryRepository {
    async fn all_permission_codes(&self) -> RepoResult<Vec<String>> {
        Ok(self
            .read()
            .permissions
            .values()
            .filter(|p| !p.code.is_empty())
            .map(|p| p.code.clone())
            .collect())
    }

    async fn permission_codes_for_user(&self, user_id: i64) -> RepoResult<Vec<String>> {
        let tables = self.read();
        let role_ids = tables.active_role_ids_of(user_id);
        Ok(tables
            .role_permissions
            .iter()
            .filter(|(rid, _)| role_ids.contains(rid))
            .filter_map(|(_, pid)| tables.permissions.get(pid))
            .filter(|p| !p.code.is_empty())
            .map(|p| p.code.clone())
            .collect())
    }

    async fn api_permissions(&self) -> RepoResult<Vec<ApiPermission>> {
        Ok(self
            .read()
            .permissions
            .values()
            .filter(|p| p.kind == PermissionKind::Api)
            .map(|p| ApiPermission {
                code: p.code.clone(),
                method: p.method.clone(),
                path: p.path.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl DepartmentStore for MemoryRepository {
    async fn list_departments(&self, tenant_id: Option<i64>) -> RepoResult<Vec<Department>> {
        Ok(self
            .read()
            .departments
            .values()
            .filter(|d| tenant_id.is_none_or(|t| d.tenant_id == t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SettingStore for MemoryRepository {
    async fn find_setting(&self, tenant_id: i64, key: &str) -> RepoResult<Option<Setting>> {
        Ok(self
            .read()
            .settings
            .iter()
            .find(|s| s.tenant_id == tenant_id && s.key == key)
            .cloned())
    }

    async fn settings_by_key(&self, key: &str) -> RepoResult<Vec<Setting>> {
        Ok(self
            .read()
            .settings
            .iter()
            .filter(|s| s.key == key)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AuditLog for MemoryRepository {
    async fn insert_login_log(&self, log: LoginLog) -> RepoResult<()> {
        self.write().login_logs.push(log);
        Ok(())
    }

    async fn recent_login_logs(&self, user_id: i64, limit: i64) -> RepoResult<Vec<LoginLog>> {
        Ok(self
            .read()
            .login_logs
            .iter()
            .rev()
            .filter(|log| log.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_operation_log(&self, log: OperationLog) -> RepoResult<()> {
        self.write().operation_logs.push(log);
        Ok(())
    }
}
