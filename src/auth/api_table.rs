use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::ApiPermission;
use crate::repository::Repository;

/// 路径模式匹配：以 `:` 开头的段匹配任意单段，其余段逐字相等，段数必须一致
pub fn match_path(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return false;
    }
    pattern_segments
        .iter()
        .zip(&path_segments)
        .all(|(p, s)| p.starts_with(':') || p == s)
}

/// 权限表中登记的 API，按请求方法分组缓存在进程内
///
/// 每个受保护请求都要查一次，过期前不再访问存储。
pub struct ApiPermissionTable {
    repo: Arc<dyn Repository>,
    by_method: TtlCache<String, Vec<ApiPermission>>,
}

impl ApiPermissionTable {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            repo,
            by_method: TtlCache::new(clock, ttl),
        }
    }

    /// 权限表变更后调用
    pub fn invalidate(&self) {
        self.by_method.invalidate();
    }

    /// 第一条与请求方法和路径匹配的登记
    pub async fn find(&self, method: &str, path: &str) -> Result<Option<ApiPermission>, AppError> {
        let key = method.to_string();
        let candidates = match self.by_method.get(&key) {
            Some(cached) => cached.unwrap_or_default(),
            None => {
                let mut grouped: HashMap<String, Vec<ApiPermission>> = HashMap::new();
                for permission in self.repo.api_permissions().await? {
                    grouped
                        .entry(permission.method.clone())
                        .or_default()
                        .push(permission);
                }
                let candidates = grouped.get(&key).cloned().unwrap_or_default();
                self.by_method.replace(grouped);
                candidates
            }
        };
        Ok(candidates.into_iter().find(|p| match_path(&p.path, path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::PermissionKind;
    use crate::repository::MemoryRepository;

    #[test]
    fn wildcard_matches_single_segment() {
        assert!(match_path("/api/users/:id/roles", "/api/users/42/roles"));
        assert!(match_path("/api/users/:id", "/api/users/abc"));
        assert!(match_path("/api/users", "/api/users"));
    }

    #[test]
    fn segment_count_must_match() {
        assert!(!match_path("/api/users/:id/roles", "/api/users/42/roles/extra"));
        assert!(!match_path("/api/users/:id/roles", "/api/users/roles"));
        assert!(!match_path("/api/users/:id", "/api/users/42/"));
    }

    #[test]
    fn literal_segments_must_be_equal() {
        assert!(!match_path("/api/users/:id/roles", "/api/groups/42/roles"));
        assert!(!match_path("/api/users/:id/roles", "/api/users/42/menus"));
        assert!(!match_path("/api/Users", "/api/users"));
    }

    #[tokio::test]
    async fn table_is_cached_until_ttl_or_invalidate() {
        let clock = Arc::new(ManualClock::default());
        let repo = Arc::new(MemoryRepository::new(clock.clone()));
        let table = ApiPermissionTable::new(repo.clone(), clock.clone(), chrono::Duration::minutes(5));
        repo.seed_permission("user:list", PermissionKind::Api, "GET", "/api/users");

        let found = table.find("GET", "/api/users").await.unwrap();
        assert_eq!(found.map(|p| p.code).as_deref(), Some("user:list"));
        assert!(table.find("PUT", "/api/users").await.unwrap().is_none());

        // 缓存期内看不到新登记的接口
        repo.seed_permission("role:edit", PermissionKind::Api, "PUT", "/api/roles/:id");
        assert!(table.find("PUT", "/api/roles/3").await.unwrap().is_none());

        table.invalidate();
        assert!(table.find("PUT", "/api/roles/3").await.unwrap().is_some());

        repo.seed_permission("role:drop", PermissionKind::Api, "DELETE", "/api/roles/:id");
        clock.advance(chrono::Duration::minutes(6));
        assert!(table.find("DELETE", "/api/roles/3").await.unwrap().is_some());
    }
}
