mod common;

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::json;

use runhost::config::RegistrationMode;

// ── Health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let Some(app) = common::spawn_app().await else { return };

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    common::cleanup(app).await;
}

#[tokio::test]
async fn security_headers_present() {
    let Some(app) = common::spawn_app().await else { return };

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    let headers = resp.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");

    common::cleanup(app).await;
}

// ── Registration & Auth ─────────────────────────────────────────

#[tokio::test]
async fn first_tenant_is_system_admin() {
    let Some(app) = common::spawn_app().await else { return };
    let token = app.bootstrap().await;

    let (body, status) = app.get_auth("/api/v1/tenant", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_system_admin"], true);
    assert_eq!(body["project_quota"], 1);
    assert_eq!(body["slots"]["total_slots"], 1);
    assert_eq!(body["slots"]["available_slots"], 1);
    assert!(body.get("password_hash").is_none());

    let (second, _) = app.tenant("other@test.com").await;
    let (body, _) = app.get_auth("/api/v1/tenant", &second).await;
    assert_eq!(body["is_system_admin"], false);

    common::cleanup(app).await;
}

#[tokio::test]
async fn closed_registration_rejects_second_tenant() {
    let Some(app) = common::spawn_app_with(|c| c.registration = RegistrationMode::Closed).await
    else {
        return;
    };
    app.bootstrap().await;

    let (body, status) = app.register("other@test.com", "password123", "Other").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].as_str().unwrap().contains("disabled"));

    common::cleanup(app).await;
}

#[tokio::test]
async fn register_rejects_short_password_and_duplicates() {
    let Some(app) = common::spawn_app().await else { return };

    let (_, status) = app.register("admin@test.com", "short", "Admin").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.bootstrap().await;
    let (_, status) = app.register("ADMIN@test.com", "password123", "Again").await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn login_valid_and_invalid_credentials() {
    let Some(app) = common::spawn_app().await else { return };
    app.bootstrap().await;

    let (body, status) = app.login("admin@test.com", "password123").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    let (_, status) = app.login("admin@test.com", "wrongpassword").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, status) = app.login("nobody@test.com", "password123").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

#[tokio::test]
async fn login_brute_force_protection() {
    let Some(app) = common::spawn_app().await else { return };
    app.bootstrap().await;

    for _ in 0..5 {
        let (_, status) = app.login("admin@test.com", "wrongpassword").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (_, status) = app.login("admin@test.com", "password123").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    common::cleanup(app).await;
}

#[tokio::test]
async fn cookie_authentication_works() {
    let Some(app) = common::spawn_app().await else { return };
    let token = app.bootstrap().await;

    let resp = app
        .client
        .get(app.url("/api/v1/tenant"))
        .header("cookie", format!("access_token={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    common::cleanup(app).await;
}

#[tokio::test]
async fn unauthenticated_requests_rejected() {
    let Some(app) = common::spawn_app().await else { return };

    for path in ["/api/v1/tenant", "/api/v1/projects", "/api/v1/admin/stats"] {
        let resp = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{path}");
    }

    let (_, status) = app.get_auth("/api/v1/projects", "not-a-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::cleanup(app).await;
}

// ── Projects ────────────────────────────────────────────────────

#[tokio::test]
async fn create_list_get_and_delete_project() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, tenant_id) = app.tenant("owner@test.com").await;

    let project = app.create_project(&token, "My Bot", "sleep 30").await;
    assert_eq!(project["name"], "my-bot");
    assert_eq!(project["is_premium"], false);
    assert_eq!(project["is_locked"], false);
    assert_eq!(project["expiry_date"], json!(null));
    assert_eq!(project["run_command"], json!(["python3", "main.py"]));
    assert_eq!(project["resource_limits"]["ram_mb"], 512);
    assert_eq!(project["execution_info"]["status"], "not_run");
    assert!(project.get("filebrowser_pass").is_none());
    let root = app.project_root(&tenant_id, "my-bot");
    assert!(root.join("main.py").is_file());

    let id = project["id"].as_str().unwrap();
    let (list, status) = app.get_auth("/api/v1/projects", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (single, status) = app.get_auth(&format!("/api/v1/projects/{id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(single["id"], id);

    let (_, status) = app.delete_auth(&format!("/api/v1/projects/{id}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!root.exists());
    let (_, status) = app.get_auth(&format!("/api/v1/projects/{id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Quota is untouched by deletion.
    let (me, _) = app.get_auth("/api/v1/tenant", &token).await;
    assert_eq!(me["project_quota"], 1);
    assert_eq!(me["slots"]["used_slots"], 0);

    common::cleanup(app).await;
}

#[tokio::test]
async fn quota_refuses_second_project_before_touching_disk() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, tenant_id) = app.tenant("owner@test.com").await;
    app.create_project(&token, "first", "sleep 30").await;

    let (body, status) = app
        .upload_project(&token, "second", "main.py", b"sleep 30")
        .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED, "{body}");
    assert!(!app.project_root(&tenant_id, "second").exists());

    common::cleanup(app).await;
}

#[tokio::test]
async fn invalid_uploads_are_rejected() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, tenant_id) = app.tenant("owner@test.com").await;

    let (_, status) = app.upload_project(&token, "notes", "notes.txt", b"hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status) = app.upload_project(&token, "../escape", "main.py", b"hi").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, status) = app.upload_project(&token, "broken", "bundle.zip", b"not a zip").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.project_root(&tenant_id, "broken").exists());

    let resp = app
        .client
        .post(app.url("/api/v1/projects"))
        .bearer_auth(&token)
        .json(&json!({ "name": "bot" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    common::cleanup(app).await;
}

#[tokio::test]
async fn run_command_update_is_validated() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, _) = app.tenant("owner@test.com").await;
    let project = app.create_project(&token, "bot", "sleep 30").await;
    let path = format!("/api/v1/projects/{}/command", project["id"].as_str().unwrap());

    let (_, status) = app.put_auth(&path, &token, &json!({ "run_command": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, status) = app
        .put_auth(&path, &token, &json!({ "run_command": ["python3", "-u"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (body, status) = app
        .put_auth(&path, &token, &json!({ "run_command": ["python3", "-u", "main.py"] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_command"], json!(["python3", "-u", "main.py"]));

    common::cleanup(app).await;
}

#[tokio::test]
async fn tenant_isolation() {
    let Some(app) = common::spawn_app().await else { return };
    let admin = app.bootstrap().await;
    let (alice, _) = app.tenant("alice@test.com").await;
    let (bob, _) = app.tenant("bob@test.com").await;

    let project = app.create_project(&alice, "bot", "sleep 30").await;
    let id = project["id"].as_str().unwrap();

    let (_, status) = app.get_auth(&format!("/api/v1/projects/{id}"), &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app
        .post_auth(&format!("/api/v1/projects/{id}/start"), &bob, &json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app.delete_auth(&format!("/api/v1/projects/{id}"), &bob).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (list, _) = app.get_auth("/api/v1/projects", &bob).await;
    assert!(list.as_array().unwrap().is_empty());

    // System admins may inspect any project.
    let (_, status) = app.get_auth(&format!("/api/v1/projects/{id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);

    common::cleanup(app).await;
}

// ── Deployment ──────────────────────────────────────────────────

#[tokio::test]
async fn install_start_status_stop_cycle() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, _) = app.tenant("owner@test.com").await;
    let project = app.create_project(&token, "bot", "echo started\nsleep 30").await;
    let base = format!("/api/v1/projects/{}", project["id"].as_str().unwrap());

    let (body, status) = app.post_auth(&format!("{base}/start"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "start before install: {body}");

    let (body, status) = app.post_auth(&format!("{base}/install"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["message"].as_str().unwrap().contains("ready"));

    let (body, status) = app.post_auth(&format!("{base}/start"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["pid"].as_u64().unwrap() > 0);

    let (_, status) = app.post_auth(&format!("{base}/start"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (body, _) = app.get_auth(&format!("{base}/status"), &token).await;
    assert_eq!(body["status"], "running");
    let (body, _) = app.get_auth(&format!("{base}/status?detailed=true"), &token).await;
    assert_eq!(body["status"], "running");
    assert!(body["pid"].is_number());

    let (body, status) = app.get_auth(&format!("{base}/usage"), &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["memory_bytes"].as_u64().unwrap() > 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let resp = app
        .client
        .get(app.url(&format!("{base}/logs")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("started"));

    let (_, status) = app.post_auth(&format!("{base}/stop"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, status) = app.post_auth(&format!("{base}/stop"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (body, _) = app.get_auth(&format!("{base}/status"), &token).await;
    assert_eq!(body["status"], "stopped");

    common::cleanup(app).await;
}

#[tokio::test]
async fn empty_log_is_not_found() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, _) = app.tenant("owner@test.com").await;
    let project = app.create_project(&token, "quiet", "sleep 30").await;
    let base = format!("/api/v1/projects/{}", project["id"].as_str().unwrap());

    let (_, status) = app.get_auth(&format!("{base}/logs"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, status) = app.get_auth(&format!("{base}/usage"), &token).await;
    assert_eq!(status, StatusCode::CONFLICT);

    common::cleanup(app).await;
}

#[tokio::test]
async fn start_is_rate_limited_per_project() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, _) = app.tenant("owner@test.com").await;
    let project = app.create_project(&token, "bot", "sleep 30").await;
    let path = format!("/api/v1/projects/{}/start", project["id"].as_str().unwrap());

    // No environment, so every attempt fails fast but still counts.
    for _ in 0..10 {
        let (_, status) = app.post_auth(&path, &token, &json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (_, status) = app.post_auth(&path, &token, &json!({})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    common::cleanup(app).await;
}

#[tokio::test]
async fn file_browser_unconfigured_is_unavailable() {
    let Some(app) = common::spawn_app().await else { return };
    let (token, _) = app.tenant("owner@test.com").await;
    let project = app.create_project(&token, "bot", "sleep 30").await;

    let (_, status) = app
        .post_auth(
            &format!("/api/v1/projects/{}/files", project["id"].as_str().unwrap()),
            &token,
            &json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    common::cleanup(app).await;
}

// ── Admin & billing ─────────────────────────────────────────────

#[tokio::test]
async fn non_admin_cannot_access_admin_routes() {
    let Some(app) = common::spawn_app().await else { return };
    app.bootstrap().await;
    let (token, tenant_id) = app.tenant("owner@test.com").await;

    let (_, status) = app.get_auth("/api/v1/admin/stats", &token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app
        .post_auth(&format!("/api/v1/admin/tenants/{tenant_id}/quota/grant"), &token, &json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, status) = app
        .post_auth(&format!("/api/v1/billing/tenants/{tenant_id}/slots"), &token, &json!({}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    common::cleanup(app).await;
}

#[tokio::test]
async fn grant_and_revoke_move_premium_lock() {
    let Some(app) = common::spawn_app().await else { return };
    let admin = app.bootstrap().await;
    let (token, tenant_id) = app.tenant("owner@test.com").await;
    let quota = format!("/api/v1/admin/tenants/{tenant_id}/quota");

    // Revoking at the free tier is refused.
    let (_, status) = app.post_auth(&format!("{quota}/revoke"), &admin, &json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    app.create_project(&token, "free", "sleep 30").await;
    let (body, status) = app.post_auth(&format!("{quota}/grant"), &admin, &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_quota"], 2);
    assert_eq!(body["affected_project"], json!(null));

    let premium = app.create_project(&token, "premium", "sleep 30").await;
    assert_eq!(premium["is_premium"], true);
    assert_eq!(premium["resource_limits"]["ram_mb"], 1024);
    assert!(premium["expiry_date"].is_string());
    let premium_id = premium["id"].as_str().unwrap();

    let (body, status) = app.post_auth(&format!("{quota}/revoke"), &admin, &json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_quota"], 1);
    assert_eq!(body["affected_project"], premium_id);

    let base = format!("/api/v1/projects/{premium_id}");
    let (body, _) = app.get_auth(&base, &token).await;
    assert_eq!(body["is_locked"], true);
    let (_, status) = app.post_auth(&format!("{base}/start"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::LOCKED);
    let (_, status) = app.post_auth(&format!("{base}/install"), &token, &json!({})).await;
    assert_eq!(status, StatusCode::LOCKED);
    let (_, status) = app
        .put_auth(&format!("{base}/command"), &token, &json!({ "run_command": ["python3", "main.py"] }))
        .await;
    assert_eq!(status, StatusCode::LOCKED);
    // Inspection still works.
    let (_, status) = app.get_auth(&format!("{base}/status"), &token).await;
    assert_eq!(status, StatusCode::OK);

    let (body, _) = app.post_auth(&format!("{quota}/grant"), &admin, &json!({})).await;
    assert_eq!(body["affected_project"], premium_id);
    let (body, _) = app.get_auth(&base, &token).await;
    assert_eq!(body["is_locked"], false);

    let (stats, status) = app.get_auth("/api/v1/admin/stats", &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["tenants"], 2);
    assert_eq!(stats["premium_tenants"], 1);
    assert_eq!(stats["projects"], 2);
    assert_eq!(stats["premium_projects"], 1);

    let (detail, status) = app.get_auth(&format!("/api/v1/admin/tenants/{tenant_id}"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["projects"].as_array().unwrap().len(), 2);

    let (events, status) = app
        .get_auth(&format!("/api/v1/admin/tenants/{tenant_id}/audit?limit=3"), &admin)
        .await;
    assert_eq!(status, StatusCode::OK);
    let actions: Vec<_> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(actions, ["quota.granted", "quota.revoked", "project.created"]);

    common::cleanup(app).await;
}

#[tokio::test]
async fn project_audit_trail_is_scoped_to_the_project() {
    let Some(app) = common::spawn_app().await else { return };
    let admin = app.bootstrap().await;
    let (owner, _) = app.tenant("owner@test.com").await;
    let (other, _) = app.tenant("other@test.com").await;

    let mine = app.create_project(&owner, "mine", "sleep 30").await;
    let mine_id = mine["id"].as_str().unwrap();
    let theirs = app.create_project(&other, "theirs", "sleep 30").await;
    let theirs_id = theirs["id"].as_str().unwrap();

    let base = format!("/api/v1/projects/{mine_id}");
    let (_, status) = app
        .put_auth(&format!("{base}/command"), &owner, &json!({ "run_command": ["python3", "app.py"] }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let actions = |events: serde_json::Value| -> Vec<String> {
        events
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["action"].as_str().unwrap().to_string())
            .collect()
    };

    let (events, status) = app.get_auth(&format!("{base}/audit"), &owner).await;
    assert_eq!(status, StatusCode::OK);
    assert!(events.as_array().unwrap().iter().all(|e| e["resource_id"] == mine_id));
    assert_eq!(actions(events), ["project.command_updated", "project.created"]);

    let (events, _) = app.get_auth(&format!("{base}/audit?limit=1"), &owner).await;
    assert_eq!(actions(events), ["project.command_updated"]);

    let (events, _) = app
        .get_auth(&format!("/api/v1/projects/{theirs_id}/audit"), &other)
        .await;
    assert_eq!(actions(events), ["project.created"]);

    let (_, status) = app.get_auth(&format!("{base}/audit"), &other).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (events, status) = app.get_auth(&format!("{base}/audit"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().unwrap().len(), 2);

    common::cleanup(app).await;
}

#[tokio::test]
async fn expired_projects_are_locked_on_read_and_renewal_unlocks() {
    let Some(app) = common::spawn_app().await else { return };
    let admin = app.bootstrap().await;
    let (token, tenant_id) = app.tenant("owner@test.com").await;

    let (body, status) = app
        .post_auth(&format!("/api/v1/billing/tenants/{tenant_id}/slots"), &admin, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_quota"], 2);

    app.create_project(&token, "free", "sleep 30").await;
    let premium = app.create_project(&token, "premium", "sleep 30").await;
    let id = premium["id"].as_str().unwrap();

    sqlx::query("UPDATE projects SET expiry_date = now() - interval '1 hour' WHERE id = $1::uuid")
        .bind(id)
        .execute(&app.pool)
        .await
        .unwrap();

    let (list, _) = app.get_auth("/api/v1/projects", &token).await;
    let locked: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["is_locked"] == true)
        .collect();
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0]["id"], id);

    let (body, status) = app
        .post_auth(&format!("/api/v1/billing/projects/{id}/renew"), &admin, &json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_locked"], false);

    let (body, _) = app.get_auth(&format!("/api/v1/projects/{id}"), &token).await;
    assert_eq!(body["is_locked"], false);

    common::cleanup(app).await;
}
