use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use crate::error::AppError;
use crate::models::{DataScope, Department, RoleLevel};
use crate::repository::Repository;

/// 下游查询使用的数据范围
///
/// `departments` 为 `None` 时不按部门过滤，`Some(vec![])` 表示没有任何可见部门。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataScopeFilter {
    pub scope: DataScope,
    pub departments: Option<Vec<i64>>,
}

impl DataScopeFilter {
    pub fn unrestricted() -> Self {
        Self {
            scope: DataScope::All,
            departments: None,
        }
    }

    /// 没有部门条件又不是全部数据时，只能看本人的数据
    pub fn owner_only(&self) -> bool {
        self.departments.is_none() && self.scope != DataScope::All
    }
}

/// 从 root 出发沿父子关系收集所有下级部门，root 在首位
///
/// 用 visited 集合防止脏数据里的环导致死循环。
pub fn descendant_departments(all: &[Department], root: i64) -> Vec<i64> {
    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for dept in all {
        children.entry(dept.parent_id).or_default().push(dept.id);
    }

    let mut visited = HashSet::from([root]);
    let mut result = vec![root];
    let mut queue = VecDeque::from([root]);
    while let Some(id) = queue.pop_front() {
        for child in children.get(&id).into_iter().flatten() {
            if visited.insert(*child) {
                result.push(*child);
                queue.push_back(*child);
            }
        }
    }
    result
}

pub struct DataScopeResolver {
    repo: Arc<dyn Repository>,
}

impl DataScopeResolver {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn resolve(
        &self,
        user_id: i64,
        tenant_id: i64,
        department_id: i64,
        level: RoleLevel,
    ) -> Result<DataScopeFilter, AppError> {
        if level == RoleLevel::SuperAdmin {
            return Ok(DataScopeFilter::unrestricted());
        }

        let scope = self
            .repo
            .roles_of_user(user_id)
            .await?
            .iter()
            .map(|r| r.data_scope)
            .min()
            .unwrap_or(DataScope::SelfOnly);

        let departments = match scope {
            DataScope::All | DataScope::SelfOnly => None,
            _ if department_id == 0 => None,
            DataScope::DeptTree => {
                let all = self.repo.list_departments(Some(tenant_id)).await?;
                Some(descendant_departments(&all, department_id))
            }
            DataScope::Dept => Some(vec![department_id]),
        };

        Ok(DataScopeFilter { scope, departments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{AdminTier, RoleDraft};
    use crate::repository::{MemoryRepository, RoleStore};

    fn dept(id: i64, parent_id: i64) -> Department {
        Department {
            id,
            tenant_id: 1,
            parent_id,
            name: format!("d{}", id),
            sort: 0,
            status: 1,
        }
    }

    //        1
    //      /   \
    //     2     3
    //    / \     \
    //   4   5     6
    //   |
    //   7
    fn tree() -> Vec<Department> {
        vec![
            dept(1, 0),
            dept(2, 1),
            dept(3, 1),
            dept(4, 2),
            dept(5, 2),
            dept(6, 3),
            dept(7, 4),
        ]
    }

    #[test]
    fn subtree_excludes_siblings_and_ancestors() {
        let mut ids = descendant_departments(&tree(), 2);
        assert_eq!(ids[0], 2);
        ids.sort();
        assert_eq!(ids, vec![2, 4, 5, 7]);

        assert_eq!(descendant_departments(&tree(), 6), vec![6]);
        let mut all = descendant_departments(&tree(), 1);
        all.sort();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn cycles_terminate() {
        let looped = vec![dept(1, 3), dept(2, 1), dept(3, 2)];
        let mut ids = descendant_departments(&looped, 1);
        ids.sort();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn widest_role_scope_wins() {
        let repo = Arc::new(MemoryRepository::new(Arc::new(ManualClock::default())));
        let root = repo.seed_department(1, 0, "hq");
        let sales = repo.seed_department(1, root.id, "sales");
        let east = repo.seed_department(1, sales.id, "east");
        repo.seed_department(1, root.id, "ops");

        let mut ids = Vec::new();
        for (code, scope) in [("self", DataScope::SelfOnly), ("tree", DataScope::DeptTree)] {
            let role = repo
                .create_role(RoleDraft {
                    tenant_id: 1,
                    name: code.into(),
                    code: code.into(),
                    status: 1,
                    sort: 0,
                    data_scope: scope,
                    remark: String::new(),
                })
                .await
                .unwrap();
            ids.push(role.id);
        }

        let user = repo.seed_user(1, "sam", "x", AdminTier::Normal);
        repo.edit_user(user.id, |u| u.department_id = sales.id);
        let resolver = DataScopeResolver::new(repo.clone());

        let filter = resolver
            .resolve(user.id, 1, sales.id, RoleLevel::User)
            .await
            .unwrap();
        assert_eq!(filter.scope, DataScope::SelfOnly);
        assert!(filter.owner_only());

        repo.replace_user_roles(user.id, &ids).await.unwrap();
        let filter = resolver
            .resolve(user.id, 1, sales.id, RoleLevel::User)
            .await
            .unwrap();
        assert_eq!(filter.scope, DataScope::DeptTree);
        assert_eq!(filter.departments, Some(vec![sales.id, east.id]));

        let filter = resolver
            .resolve(user.id, 1, sales.id, RoleLevel::SuperAdmin)
            .await
            .unwrap();
        assert_eq!(filter, DataScopeFilter::unrestricted());
    }
}
