use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tempfile::TempDir;
use uuid::Uuid;

use runhost::config::{
    Config, LifecycleTimings, RegistrationMode, RuntimeSettings, SandboxKind, SandboxSettings,
    TierConfig,
};

/// Creates `<env>/bin/python` as a shell shim so project scripts run under sh.
const CREATE_ENV: &str = r#"mkdir -p "$0/bin" && printf '#!/bin/sh\nexec /bin/sh "$@"\n' > "$0/bin/python" && chmod +x "$0/bin/python""#;

const BOUNDARY: &str = "runhost-test-boundary";

/// A running test server instance with a dedicated test database.
pub struct TestApp {
    pub addr: SocketAddr,
    pub pool: PgPool,
    pub client: Client,
    pub db_name: String,
    pub projects_dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn project_root(&self, tenant_id: &str, name: &str) -> PathBuf {
        self.projects_dir.path().join(tenant_id).join(name)
    }

    pub async fn register(&self, email: &str, password: &str, name: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/register"))
            .json(&json!({ "email": email, "password": password, "name": name }))
            .send()
            .await
            .expect("register request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    pub async fn login(&self, email: &str, password: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Register the bootstrap tenant (system admin), return access token.
    pub async fn bootstrap(&self) -> String {
        let (body, status) = self.register("admin@test.com", "password123", "Admin").await;
        assert_eq!(status, StatusCode::OK, "bootstrap register failed: {body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    /// Register a regular tenant, return (access token, tenant id).
    pub async fn tenant(&self, email: &str) -> (String, String) {
        let (body, status) = self.register(email, "password123", "Tenant").await;
        assert_eq!(status, StatusCode::OK, "tenant register failed: {body}");
        let token = body["access_token"].as_str().unwrap().to_string();
        let (me, _) = self.get_auth("/api/v1/tenant", &token).await;
        (token, me["id"].as_str().unwrap().to_string())
    }

    /// Upload a project as multipart, return (body, status).
    pub async fn upload_project(
        &self,
        token: &str,
        name: &str,
        file_name: &str,
        content: &[u8],
    ) -> (Value, StatusCode) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let resp = self
            .client
            .post(self.url("/api/v1/projects"))
            .bearer_auth(token)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .expect("upload request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Upload a single-script project and return its JSON.
    pub async fn create_project(&self, token: &str, name: &str, script: &str) -> Value {
        let (body, status) = self
            .upload_project(token, name, "main.py", script.as_bytes())
            .await;
        assert_eq!(status, StatusCode::CREATED, "create project failed: {body}");
        body
    }

    /// Make an authenticated GET request.
    pub async fn get_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated POST request with JSON body.
    pub async fn post_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated PUT request with JSON body.
    pub async fn put_auth(&self, path: &str, token: &str, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .expect("put request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }

    /// Make an authenticated DELETE request.
    pub async fn delete_auth(&self, path: &str, token: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .delete(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("delete request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(json!(null));
        (body, status)
    }
}

fn admin_url(base_url: &str) -> String {
    base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/postgres"))
        .unwrap_or_else(|| base_url.to_string())
}

/// Spawn a test app with open registration. `None` when no database is configured.
pub async fn spawn_app() -> Option<TestApp> {
    spawn_app_with(|_| {}).await
}

pub async fn spawn_app_with<F: FnOnce(&mut Config)>(configure: F) -> Option<TestApp> {
    let _ = dotenvy::dotenv();

    let Ok(base_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping HTTP test");
        return None;
    };

    // Create a unique test database
    let db_name = format!("runhost_test_{}", Uuid::now_v7().simple());

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect to postgres for test DB creation");

    sqlx::query(&format!("CREATE DATABASE \"{db_name}\""))
        .execute(&admin_pool)
        .await
        .expect("Failed to create test database");

    admin_pool.close().await;

    let test_url = base_url
        .rsplit_once('/')
        .map(|(base, _)| format!("{base}/{db_name}"))
        .unwrap_or_else(|| base_url.clone());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&test_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test database");

    let projects_dir = tempfile::tempdir().expect("Failed to create projects dir");

    let mut config = Config {
        database_url: test_url,
        jwt_secret: "test-jwt-secret-that-is-long-enough".to_string(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to random port
        registration: RegistrationMode::Open,
        log_level: "warn".to_string(),
        projects_dir: projects_dir.path().to_path_buf(),
        max_upload_size: 1_048_576,
        sandbox: SandboxSettings {
            kind: SandboxKind::None,
            ..SandboxSettings::default()
        },
        runtime: RuntimeSettings {
            create_command: vec!["/bin/sh".to_string(), "-c".to_string(), CREATE_ENV.to_string()],
            install_args: vec!["-c".to_string(), "exit 0".to_string()],
            ..RuntimeSettings::default()
        },
        tiers: TierConfig::default(),
        timings: LifecycleTimings {
            stop_grace: Duration::from_secs(2),
            restart_settle: Duration::from_millis(50),
            start_timeout: Duration::from_secs(5),
            install_timeout: Duration::from_secs(10),
            usage_sample: Duration::from_millis(100),
        },
        sweep_interval: Duration::ZERO,
        filebrowser: None,
    };
    configure(&mut config);

    let (app, _state) = runhost::build_app(pool.clone(), config);

    // Bind to random port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .expect("Server failed");
    });

    let client = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();

    Some(TestApp {
        addr,
        pool,
        client,
        db_name,
        projects_dir,
    })
}

/// Drop the test database after tests complete.
pub async fn cleanup(app: TestApp) {
    let db_name = app.db_name.clone();
    app.pool.close().await;

    let base_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for tests");

    let admin_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&admin_url(&base_url))
        .await
        .expect("Failed to connect for cleanup");

    let _ = sqlx::query(&format!("DROP DATABASE IF EXISTS \"{db_name}\" WITH (FORCE)"))
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;
}
