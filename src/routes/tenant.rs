use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::auth::extractor::AuthTenant;
use crate::config::TierConfig;
use crate::error::AppError;
use crate::models::Tenant;
use crate::state::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotStats {
    pub total_slots: i32,
    pub free_slots: i32,
    pub premium_slots: i32,
    pub used_slots: i32,
    pub available_slots: i32,
}

impl SlotStats {
    pub fn new(quota: i32, used: usize, tiers: &TierConfig) -> Self {
        let used = i32::try_from(used).unwrap_or(i32::MAX);
        Self {
            total_slots: quota,
            free_slots: quota.min(tiers.free_quota),
            premium_slots: (quota - tiers.free_quota).max(0),
            used_slots: used,
            available_slots: (quota - used).max(0),
        }
    }
}

#[derive(Serialize)]
pub struct TenantResponse {
    #[serde(flatten)]
    pub tenant: Tenant,
    pub slots: SlotStats,
}

pub async fn get_tenant(
    auth: AuthTenant,
    State(state): State<SharedState>,
) -> Result<Json<TenantResponse>, AppError> {
    let tenant = state
        .store
        .tenant(auth.tenant_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Tenant not found".to_string()))?;
    let used = state.store.projects_for_tenant(tenant.id).await?.len();
    let slots = SlotStats::new(tenant.project_quota, used, &state.config.tiers);
    Ok(Json(TenantResponse { tenant, slots }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_split_into_free_and_premium() {
        let tiers = TierConfig::default();
        let stats = SlotStats::new(3, 2, &tiers);
        assert_eq!(stats.free_slots, 1);
        assert_eq!(stats.premium_slots, 2);
        assert_eq!(stats.available_slots, 1);
    }

    #[test]
    fn over_quota_has_no_available_slots() {
        let stats = SlotStats::new(1, 2, &TierConfig::default());
        assert_eq!(stats.available_slots, 0);
        assert_eq!(stats.premium_slots, 0);
    }
}
