// 认证与授权核心
// 凭证、角色权限、数据范围、租户隔离、登录流程

pub mod api_table;
pub mod audit;
pub mod context;
pub mod credential;
pub mod data_scope;
pub mod denylist;
pub mod lockout;
pub mod login;
pub mod permission;
pub mod tenant;
pub mod totp;

pub use api_table::{ApiPermissionTable, match_path};
pub use audit::{AuditLogger, OperationAuditEntry};
pub use context::AuthContext;
pub use credential::{
    ChallengeClaims, IssuedToken, SessionClaims, TokenKind, TokenService, hash_password,
    verify_password,
};
pub use data_scope::{DataScopeFilter, DataScopeResolver, descendant_departments};
pub use denylist::TokenDenylist;
pub use lockout::LoginGuard;
pub use login::{LoginAttempt, LoginOutcome, LoginService};
pub use permission::PermissionResolver;
pub use tenant::{TenantScope, check_tenant_lease, ensure_same_tenant, resolve_setting};
pub use totp::{TotpEnrollment, generate_totp_secret, validate_totp_code};
