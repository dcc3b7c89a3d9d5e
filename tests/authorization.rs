mod common;

use axum::http::{Method, StatusCode};
use cms_backend::models::{AdminTier, DataScope, PermissionKind};
use cms_backend::repository::{RoleStore, UserStore};
use common::{TestApp, eventually};
use serde_json::json;

struct BuiltinRoles {
    super_admin: i64,
    admin: i64,
    user: i64,
}

async fn builtin_roles(app: &TestApp) -> BuiltinRoles {
    BuiltinRoles {
        super_admin: app.seed_role(0, "super_admin", DataScope::All).await.id,
        admin: app.seed_role(0, "admin", DataScope::DeptTree).await.id,
        user: app.seed_role(0, "user", DataScope::SelfOnly).await.id,
    }
}

async fn role_codes(app: &TestApp, user_id: i64) -> Vec<String> {
    app.repo
        .roles_of_user(user_id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.code)
        .collect()
}

#[tokio::test]
async fn plain_user_cannot_grant_admin_but_super_admin_can() {
    let app = TestApp::new();
    let roles = builtin_roles(&app).await;

    let listing = app
        .repo
        .seed_permission("user:list", PermissionKind::Button, "", "");
    app.repo
        .replace_role_permissions(roles.admin, &[listing.id])
        .await
        .unwrap();

    let alice = app.seed_user(1, "alice", AdminTier::Normal);
    let dave = app.seed_user(1, "dave", AdminTier::Normal);
    let bob = app.seed_user(0, "bob", AdminTier::Normal);
    app.grant_roles(alice.id, &[roles.user]).await;
    app.grant_roles(dave.id, &[roles.user]).await;
    app.grant_roles(bob.id, &[roles.super_admin]).await;

    let alice_token = app.token_for("alice").await;
    let uri = format!("/api/users/{}/roles", dave.id);
    let (status, body) = app
        .request(
            Method::PUT,
            &uri,
            Some(&alice_token),
            Some(json!({ "role_ids": [roles.admin] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 4003);
    assert_eq!(role_codes(&app, dave.id).await, vec!["user"]);

    // 给自己升级同样被拒绝
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/users/{}/roles", alice.id),
            Some(&alice_token),
            Some(json!({ "role_ids": [roles.admin] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(role_codes(&app, alice.id).await, vec!["user"]);

    // 先把 dave 的旧权限写进缓存
    assert!(
        !app.state
            .permissions
            .has_permission(dave.id, "user:list")
            .await
            .unwrap()
    );

    let bob_token = app.token_for("bob").await;
    let (status, body) = app
        .request(
            Method::PUT,
            &uri,
            Some(&bob_token),
            Some(json!({ "role_ids": [roles.admin] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(role_codes(&app, dave.id).await, vec!["admin"]);
    assert!(
        app.state
            .permissions
            .has_permission(dave.id, "user:list")
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn other_tenants_users_look_missing() {
    let app = TestApp::new();
    let roles = builtin_roles(&app).await;
    let dave = app.seed_user(1, "dave", AdminTier::Normal);
    app.grant_roles(dave.id, &[roles.user]).await;
    app.seed_user(2, "eve", AdminTier::TenantAdmin);

    let token = app.token_for("eve").await;
    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/users/{}/status", dave.id),
            Some(&token),
            Some(json!({ "status": "disabled" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 4004);

    let (status, body) = app
        .request(Method::GET, "/api/users", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["resp_data"]["list"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|u| u["username"].as_str())
        .collect();
    assert_eq!(names, vec!["eve"]);
}

#[tokio::test]
async fn tenant_admin_disables_lower_user() {
    let app = TestApp::new();
    let roles = builtin_roles(&app).await;
    app.seed_user(1, "acme", AdminTier::TenantAdmin);
    let dave = app.seed_user(1, "dave", AdminTier::Normal);
    app.grant_roles(dave.id, &[roles.user]).await;

    let token = app.token_for("acme").await;
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/users/{}/status", dave.id),
            Some(&token),
            Some(json!({ "status": "disabled" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.login("dave", common::PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1002);
}

#[tokio::test]
async fn user_list_follows_department_tree() {
    let app = TestApp::new();
    let root = app.repo.seed_department(5, 0, "sales");
    let east = app.repo.seed_department(5, root.id, "sales-east");
    let support = app.repo.seed_department(5, 0, "support");

    let manager_role = app.seed_role(5, "sales_manager", DataScope::DeptTree).await;
    let self_role = app.seed_role(5, "clerk", DataScope::SelfOnly).await;

    let manager = app.seed_user(5, "manager", AdminTier::Normal);
    let seller = app.seed_user(5, "seller", AdminTier::Normal);
    let helper = app.seed_user(5, "helper", AdminTier::Normal);
    app.repo.edit_user(manager.id, |u| u.department_id = root.id);
    app.repo.edit_user(seller.id, |u| u.department_id = east.id);
    app.repo.edit_user(helper.id, |u| u.department_id = support.id);
    app.grant_roles(manager.id, &[manager_role.id]).await;
    app.grant_roles(seller.id, &[self_role.id]).await;

    let names = |body: serde_json::Value| -> Vec<String> {
        let mut names: Vec<String> = body["resp_data"]["list"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|u| u["username"].as_str().map(str::to_string))
            .collect();
        names.sort();
        names
    };

    let token = app.token_for("manager").await;
    let (status, body) = app
        .request(Method::GET, "/api/users", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["total"], 2);
    assert_eq!(names(body), vec!["manager", "seller"]);

    let token = app.token_for("seller").await;
    let (_, body) = app
        .request(Method::GET, "/api/users", Some(&token), None)
        .await;
    assert_eq!(names(body), vec!["seller"]);
}

#[tokio::test]
async fn role_codes_and_levels_are_checked() {
    let app = TestApp::new();
    builtin_roles(&app).await;
    app.seed_user(3, "owner", AdminTier::TenantAdmin);
    let token = app.token_for("owner").await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/roles",
            Some(&token),
            Some(json!({ "name": "Admins", "code": "Admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/roles",
            Some(&token),
            Some(json!({ "name": "Admins", "code": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/roles",
            Some(&token),
            Some(json!({ "name": "Editors", "code": "editor", "data_scope": "dept" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["resp_data"]["tenant_id"], 3);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/roles",
            Some(&token),
            Some(json!({ "name": "Editors again", "code": "editor" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn seat_quota_limits_user_creation() {
    let app = TestApp::new();
    builtin_roles(&app).await;
    let owner = app.seed_user(0, "acme", AdminTier::TenantAdmin);
    app.repo.edit_user(owner.id, |u| {
        u.tenant_id = u.id;
        u.max_users = 2;
    });
    let token = app.token_for("acme").await;

    let create = |username: &str| {
        json!({ "username": username, "password": common::PASSWORD })
    };
    let (status, body) = app
        .request(Method::POST, "/api/users", Some(&token), Some(create("staff1")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["resp_data"]["tenant_id"], owner.id);

    let (status, body) = app
        .request(Method::POST, "/api/users", Some(&token), Some(create("staff2")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);
}

#[tokio::test]
async fn only_super_admin_provisions_tenants() {
    let app = TestApp::new();
    builtin_roles(&app).await;
    app.seed_user(0, "root", AdminTier::SuperAdmin);
    app.seed_user(4, "owner", AdminTier::TenantAdmin);

    let request = json!({
        "username": "newco",
        "password": common::PASSWORD,
        "company": "NewCo",
        "max_users": 10
    });

    let token = app.token_for("owner").await;
    let (status, _) = app
        .request(Method::POST, "/api/admins", Some(&token), Some(request.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = app.token_for("root").await;
    let (status, body) = app
        .request(Method::POST, "/api/admins", Some(&token), Some(request))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["resp_data"]["tenant_id"], body["resp_data"]["id"]);
    assert_eq!(body["resp_data"]["admin_tier"], "tenant_admin");

    // 用户名全局唯一
    let (status, _) = app
        .request(
            Method::POST,
            "/api/admins",
            Some(&token),
            Some(json!({ "username": "newco", "password": common::PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn tenant_admin_manages_menus_and_deletes_users() {
    let app = TestApp::new();
    let roles = builtin_roles(&app).await;
    app.seed_user(3, "owner", AdminTier::TenantAdmin);
    let editor = app.seed_role(3, "editor", DataScope::Dept).await;
    let dave = app.seed_user(3, "dave", AdminTier::Normal);
    app.grant_roles(dave.id, &[roles.user, editor.id]).await;
    let token = app.token_for("owner").await;

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/roles/{}/menus", editor.id),
            Some(&token),
            Some(json!({ "menu_ids": [11, 12] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.repo.role_menu_ids(editor.id), vec![11, 12]);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/users/{}/menus", dave.id),
            Some(&token),
            Some(json!({ "menu_ids": [21] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.repo.user_menu_ids(dave.id), vec![21]);

    // 全局内置角色只有超级管理员能改
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/roles/{}/menus", roles.user),
            Some(&token),
            Some(json!({ "menu_ids": [1] })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/users/{}", dave.id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(app.repo.find_user_by_username("dave").await.unwrap().is_none());

    let (status, _) = app.login("dave", common::PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn superior_views_edits_and_resets_lower_users() {
    let app = TestApp::new();
    let roles = builtin_roles(&app).await;
    let owner = app.seed_user(6, "owner", AdminTier::TenantAdmin);
    let sales = app.repo.seed_department(6, 0, "sales");
    let elsewhere = app.repo.seed_department(7, 0, "elsewhere");
    let erin = app.seed_user(6, "erin", AdminTier::Normal);
    let finn = app.seed_user(6, "finn", AdminTier::Normal);
    app.grant_roles(erin.id, &[roles.user]).await;
    app.grant_roles(finn.id, &[roles.user]).await;

    let finn_uri = format!("/api/users/{}", finn.id);
    let reset_uri = format!("/api/users/{}/reset-password", finn.id);

    // 同级之间不能查看、修改或重置密码
    let erin_token = app.token_for("erin").await;
    let (status, _) = app
        .request(Method::GET, &finn_uri, Some(&erin_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .request(
            Method::PUT,
            &finn_uri,
            Some(&erin_token),
            Some(json!({ "nickname": "renamed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .request(
            Method::PUT,
            &reset_uri,
            Some(&erin_token),
            Some(json!({ "password": "taken-over-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // 下级更不能改上级
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/users/{}", owner.id),
            Some(&erin_token),
            Some(json!({ "email": "erin@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // 本人可以查看自己
    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/users/{}", erin.id),
            Some(&erin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["username"], "erin");

    let token = app.token_for("owner").await;
    let (status, body) = app
        .request(
            Method::PUT,
            &finn_uri,
            Some(&token),
            Some(json!({
                "nickname": "Finn F",
                "email": "finn@example.com",
                "department_id": sales.id
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["nickname"], "Finn F");
    assert_eq!(body["resp_data"]["department_id"], sales.id);

    // 其他租户的部门按不存在处理
    let (status, _) = app
        .request(
            Method::PUT,
            &finn_uri,
            Some(&token),
            Some(json!({ "department_id": elsewhere.id })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.request(Method::GET, &finn_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["email"], "finn@example.com");
    assert_eq!(body["resp_data"]["department_id"], sales.id);

    let (status, _) = app
        .request(
            Method::PUT,
            &reset_uri,
            Some(&token),
            Some(json!({ "password": "brand-new-1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.login("finn", common::PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("finn", "brand-new-1").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn super_admin_maintains_tenant_admins() {
    let app = TestApp::new();
    builtin_roles(&app).await;
    let root = app.seed_user(0, "root", AdminTier::SuperAdmin);
    let root_token = app.token_for("root").await;

    let mut ids = Vec::new();
    for (username, company) in [("acme", "Acme"), ("globex", "Globex")] {
        let (status, body) = app
            .request(
                Method::POST,
                "/api/admins",
                Some(&root_token),
                Some(json!({
                    "username": username,
                    "password": common::PASSWORD,
                    "company": company,
                    "max_users": 5
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        ids.push(body["resp_data"]["id"].as_i64().unwrap());
    }
    let acme_id = ids[0];

    // 用户名同样要符合规则
    let (status, _) = app
        .request(
            Method::POST,
            "/api/admins",
            Some(&root_token),
            Some(json!({ "username": "a b", "password": common::PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(Method::GET, "/api/admins", Some(&root_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["total"], 2);
    let (_, body) = app
        .request(Method::GET, "/api/admins?keyword=acm", Some(&root_token), None)
        .await;
    assert_eq!(body["resp_data"]["total"], 1);
    assert_eq!(body["resp_data"]["list"][0]["username"], "acme");

    // 非租户管理员的账号不在这里维护
    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/admins/{}", root.id),
            Some(&root_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let acme_uri = format!("/api/admins/{}", acme_id);
    let (status, body) = app
        .request(
            Method::PUT,
            &acme_uri,
            Some(&root_token),
            Some(json!({ "max_users": 1, "company": "Acme Inc" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["max_users"], 1);
    assert_eq!(body["resp_data"]["company"], "Acme Inc");
    let (status, _) = app
        .request(
            Method::PUT,
            &acme_uri,
            Some(&root_token),
            Some(json!({ "max_users": -1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 租户管理员自己占一个名额
    let acme_token = app.token_for("acme").await;
    let staff = json!({ "username": "staff1", "password": common::PASSWORD });
    let (status, _) = app
        .request(Method::POST, "/api/users", Some(&acme_token), Some(staff.clone()))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(Method::GET, "/api/admins", Some(&acme_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.request(
        Method::PUT,
        &acme_uri,
        Some(&root_token),
        Some(json!({ "max_users": 0 })),
    )
    .await;
    let (status, body) = app
        .request(Method::POST, "/api/users", Some(&acme_token), Some(staff))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let staff_id = body["resp_data"]["id"].as_i64().unwrap();

    // 租户下还有用户时不能删除
    let (status, _) = app
        .request(Method::DELETE, &acme_uri, Some(&root_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/users/{}", staff_id),
            Some(&acme_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .request(Method::DELETE, &acme_uri, Some(&root_token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.login("acme", common::PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn write_requests_are_recorded_in_operation_log() {
    let app = TestApp::new();
    let roles = builtin_roles(&app).await;
    let owner = app.seed_user(8, "owner", AdminTier::TenantAdmin);
    let gail = app.seed_user(8, "gail", AdminTier::Normal);
    app.grant_roles(gail.id, &[roles.user]).await;
    let editor = app.seed_role(8, "editor", DataScope::SelfOnly).await;
    let token = app.token_for("owner").await;

    let permissions_uri = format!("/api/roles/{}/permissions", editor.id);
    let (status, _) = app
        .request(
            Method::PUT,
            &permissions_uri,
            Some(&token),
            Some(json!({ "permission_ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    eventually(|| app.repo.operation_logs().len() == 1).await;

    let log = &app.repo.operation_logs()[0];
    assert_eq!(log.tenant_id, 8);
    assert_eq!(log.user_id, owner.id);
    assert_eq!(log.method, "PUT");
    assert_eq!(log.path, permissions_uri);
    assert_eq!(log.status, 200);

    // 被拒绝的写操作同样记录
    let gail_token = app.token_for("gail").await;
    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/users/{}/status", owner.id),
            Some(&gail_token),
            Some(json!({ "status": "disabled" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    eventually(|| app.repo.operation_logs().len() == 2).await;
    assert_eq!(app.repo.operation_logs()[1].status, 403);

    // 读请求不记录，租户关闭开关后也不再记录
    app.request(Method::GET, "/api/roles", Some(&token), None).await;
    app.repo.put_setting(8, "log_operation_enabled", "0");
    app.state.audit.invalidate();
    let (status, _) = app
        .request(
            Method::PUT,
            &permissions_uri,
            Some(&token),
            Some(json!({ "permission_ids": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(app.repo.operation_logs().len(), 2);
}
