use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::entitlements::RenewalPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub registration: RegistrationMode,
    pub log_level: String,
    pub projects_dir: PathBuf,
    pub max_upload_size: usize,
    pub sandbox: SandboxSettings,
    pub runtime: RuntimeSettings,
    pub tiers: TierConfig,
    pub timings: LifecycleTimings,
    /// Zero disables the background sweep.
    pub sweep_interval: Duration,
    pub filebrowser: Option<FileBrowserConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationMode {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxKind {
    Firejail,
    /// No isolation at all. Limits are recorded but not enforced.
    None,
}

/// Host-wide isolation settings shared by every project run.
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    pub kind: SandboxKind,
    pub safeguard_path: PathBuf,
    pub secret_files: Vec<PathBuf>,
    pub cpu_pool: Vec<u32>,
    pub network: bool,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            kind: SandboxKind::Firejail,
            safeguard_path: PathBuf::from("/opt/runhost_safeguards"),
            secret_files: Vec::new(),
            cpu_pool: vec![0],
            network: true,
        }
    }
}

/// Layout and tooling of the per-project runtime environment.
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub env_dir: String,
    /// Interpreter path relative to the environment directory.
    pub interpreter: String,
    pub create_command: Vec<String>,
    pub install_args: Vec<String>,
    pub manifest: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            env_dir: ".venv".to_string(),
            interpreter: "bin/python".to_string(),
            create_command: split_words("python3 -m venv"),
            install_args: split_words("-m pip install --no-cache-dir -r"),
            manifest: "requirements.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierConfig {
    pub free_quota: i32,
    pub free_ram_mb: i32,
    pub premium_ram_mb: i32,
    pub cpu_share: i32,
    pub timeout_seconds: i32,
    pub renewal_days: i64,
    pub renewal_policy: RenewalPolicy,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            free_quota: 1,
            free_ram_mb: 512,
            premium_ram_mb: 1024,
            cpu_share: 50,
            timeout_seconds: 3600,
            renewal_days: 30,
            renewal_policy: RenewalPolicy::Reset,
        }
    }
}

impl TierConfig {
    pub fn renewal_period(&self) -> chrono::Duration {
        chrono::Duration::days(self.renewal_days)
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleTimings {
    pub stop_grace: Duration,
    pub restart_settle: Duration,
    pub start_timeout: Duration,
    pub install_timeout: Duration,
    pub usage_sample: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            stop_grace: Duration::from_secs(5),
            restart_settle: Duration::from_millis(1000),
            start_timeout: Duration::from_secs(30),
            install_timeout: Duration::from_secs(600),
            usage_sample: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileBrowserConfig {
    pub api_url: String,
    pub admin_user: String,
    pub admin_pass: String,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env_required = |key: &str| {
            lookup(key).ok_or_else(|| format!("Missing required environment variable: {key}"))
        };
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("RUNHOST_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid RUNHOST_HOST: {e}"))?;
        let port: u16 = parse_var("RUNHOST_PORT", &env_or("RUNHOST_PORT", "3000"))?;

        let registration = match env_or("RUNHOST_REGISTRATION", "closed").as_str() {
            "open" => RegistrationMode::Open,
            _ => RegistrationMode::Closed,
        };

        let log_level = env_or("RUNHOST_LOG_LEVEL", "info");
        let projects_dir = PathBuf::from(env_or("RUNHOST_PROJECTS_DIR", "./projects"));
        let max_upload_size: usize =
            parse_var("RUNHOST_MAX_UPLOAD_SIZE", &env_or("RUNHOST_MAX_UPLOAD_SIZE", "52428800"))?;

        let kind = match env_or("RUNHOST_SANDBOX", "firejail").as_str() {
            "firejail" => SandboxKind::Firejail,
            "none" => SandboxKind::None,
            other => return Err(format!("Invalid RUNHOST_SANDBOX: {other}")),
        };

        let secret_files = match lookup("RUNHOST_SECRET_FILES") {
            Some(list) => split_list(&list).into_iter().map(PathBuf::from).collect(),
            None => std::env::current_dir()
                .map(|cwd| vec![cwd.join(".env")])
                .unwrap_or_default(),
        };

        let cpu_pool = split_list(&env_or("RUNHOST_CPU_CORES", "0"))
            .into_iter()
            .map(|core| parse_var::<u32>("RUNHOST_CPU_CORES", &core))
            .collect::<Result<Vec<_>, _>>()?;
        if cpu_pool.is_empty() {
            return Err("RUNHOST_CPU_CORES must list at least one core".to_string());
        }

        let sandbox = SandboxSettings {
            kind,
            safeguard_path: PathBuf::from(env_or("RUNHOST_SAFEGUARD_PATH", "/opt/runhost_safeguards")),
            secret_files,
            cpu_pool,
            network: parse_bool("RUNHOST_PROJECT_NETWORK", &env_or("RUNHOST_PROJECT_NETWORK", "true"))?,
        };

        let runtime = RuntimeSettings {
            env_dir: env_or("RUNHOST_ENV_DIR", ".venv"),
            interpreter: env_or("RUNHOST_ENV_INTERPRETER", "bin/python"),
            create_command: split_words(&env_or("RUNHOST_ENV_CREATE_CMD", "python3 -m venv")),
            install_args: split_words(&env_or(
                "RUNHOST_INSTALL_ARGS",
                "-m pip install --no-cache-dir -r",
            )),
            manifest: env_or("RUNHOST_MANIFEST", "requirements.txt"),
        };
        if runtime.create_command.is_empty() {
            return Err("RUNHOST_ENV_CREATE_CMD must not be empty".to_string());
        }

        let tiers = TierConfig {
            free_quota: parse_var("RUNHOST_FREE_QUOTA", &env_or("RUNHOST_FREE_QUOTA", "1"))?,
            free_ram_mb: parse_var("RUNHOST_FREE_RAM_MB", &env_or("RUNHOST_FREE_RAM_MB", "512"))?,
            premium_ram_mb: parse_var(
                "RUNHOST_PREMIUM_RAM_MB",
                &env_or("RUNHOST_PREMIUM_RAM_MB", "1024"),
            )?,
            cpu_share: parse_var("RUNHOST_CPU_SHARE", &env_or("RUNHOST_CPU_SHARE", "50"))?,
            timeout_seconds: parse_var(
                "RUNHOST_TIMEOUT_SECONDS",
                &env_or("RUNHOST_TIMEOUT_SECONDS", "3600"),
            )?,
            renewal_days: parse_var("RUNHOST_RENEWAL_DAYS", &env_or("RUNHOST_RENEWAL_DAYS", "30"))?,
            renewal_policy: env_or("RUNHOST_RENEWAL_POLICY", "reset")
                .parse()
                .map_err(|e| format!("Invalid RUNHOST_RENEWAL_POLICY: {e}"))?,
        };

        let timings = LifecycleTimings {
            stop_grace: secs(parse_var(
                "RUNHOST_STOP_GRACE_SECS",
                &env_or("RUNHOST_STOP_GRACE_SECS", "5"),
            )?),
            restart_settle: Duration::from_millis(parse_var(
                "RUNHOST_RESTART_SETTLE_MS",
                &env_or("RUNHOST_RESTART_SETTLE_MS", "1000"),
            )?),
            start_timeout: secs(parse_var(
                "RUNHOST_START_TIMEOUT_SECS",
                &env_or("RUNHOST_START_TIMEOUT_SECS", "30"),
            )?),
            install_timeout: secs(parse_var(
                "RUNHOST_INSTALL_TIMEOUT_SECS",
                &env_or("RUNHOST_INSTALL_TIMEOUT_SECS", "600"),
            )?),
            usage_sample: Duration::from_millis(parse_var(
                "RUNHOST_USAGE_SAMPLE_MS",
                &env_or("RUNHOST_USAGE_SAMPLE_MS", "500"),
            )?),
        };

        let sweep_interval = secs(parse_var(
            "RUNHOST_SWEEP_INTERVAL_SECS",
            &env_or("RUNHOST_SWEEP_INTERVAL_SECS", "300"),
        )?);

        let filebrowser = match (
            lookup("FILEBROWSER_API_URL"),
            lookup("FILEBROWSER_ADMIN_USER"),
            lookup("FILEBROWSER_ADMIN_PASS"),
            lookup("FILEBROWSER_PUBLIC_URL"),
        ) {
            (Some(api_url), Some(admin_user), Some(admin_pass), Some(public_url)) => {
                Some(FileBrowserConfig {
                    api_url: api_url.trim_end_matches('/').to_string(),
                    admin_user,
                    admin_pass,
                    public_url: public_url.trim_end_matches('/').to_string(),
                })
            }
            _ => None,
        };

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            registration,
            log_level,
            projects_dir,
            max_upload_size,
            sandbox,
            runtime,
            tiers,
            timings,
            sweep_interval,
            filebrowser,
        })
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(format!("Invalid {key}: {other}")),
    }
}

fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
