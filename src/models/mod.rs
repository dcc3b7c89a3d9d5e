pub mod department;
pub mod login_log;
pub mod operation_log;
pub mod permission;
pub mod role;
pub mod setting;
pub mod user;

pub use department::Department;
pub use login_log::LoginLog;
pub use operation_log::OperationLog;
pub use permission::{ApiPermission, Permission, PermissionKind};
pub use role::{DataScope, Role, RoleDraft, RoleLevel};
pub use setting::Setting;
pub use user::{AdminTier, LoginInfo, NewUser, User, UserQuery, UserStatus};
