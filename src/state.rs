use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::entitlements::{Entitlements, QuotaController};
use crate::filebrowser::FileBrowser;
use crate::provision::Provisioner;
use crate::rate_limit::{ActionRateLimiter, LoginRateLimiter};
use crate::runtime::Supervisor;
use crate::store::ProjectStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub store: Arc<dyn ProjectStore>,
    pub supervisor: Arc<Supervisor>,
    pub entitlements: Arc<Entitlements>,
    pub quota: Arc<QuotaController>,
    pub provisioner: Provisioner,
    pub filebrowser: Option<Arc<FileBrowser>>,
    pub login_limiter: LoginRateLimiter,
    pub action_limiter: ActionRateLimiter,
}
