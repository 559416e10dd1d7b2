//! Module entitlement resolution
//!
//! A tenant may use a module when it is a core module, when it holds an
//! effective subscription row for it, or when an effective package contains
//! it. Resolution fails closed: on a storage error only the core set remains.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::ModuleRepository;
use crate::models::{is_core_code, PackageGrant, TenantModule};

/// Union of core codes, effective subscriptions and effective package grants
pub fn resolve_module_codes(
    core: &[String],
    subscriptions: &[TenantModule],
    package_grants: &[PackageGrant],
    now: DateTime<Utc>,
) -> BTreeSet<String> {
    let mut codes: BTreeSet<String> = core.iter().cloned().collect();

    codes.extend(
        subscriptions
            .iter()
            .filter(|tm| tm.is_effective(now))
            .map(|tm| tm.module_code.clone()),
    );

    codes.extend(
        package_grants
            .iter()
            .filter(|g| g.status.grants_access() && g.expires_at.map_or(true, |exp| exp > now))
            .map(|g| g.module_code.clone()),
    );

    codes
}

/// Entitlement lookups against the database
#[derive(Clone)]
pub struct EntitlementService {
    pool: SqlitePool,
}

impl EntitlementService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Every module code the tenant may use right now
    pub async fn get_tenant_all_modules(&self, tenant_id: Uuid) -> BTreeSet<String> {
        self.modules_at(tenant_id, Utc::now()).await
    }

    pub async fn modules_at(&self, tenant_id: Uuid, now: DateTime<Utc>) -> BTreeSet<String> {
        let repo = ModuleRepository::new(&self.pool);

        let core = match repo.core_codes().await {
            Ok(core) => core,
            Err(e) => {
                error!(%tenant_id, "Failed to load core modules: {:#}", e);
                return BTreeSet::new();
            }
        };

        let subscriptions = match repo.tenant_modules(tenant_id).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(%tenant_id, "Failed to load tenant modules: {:#}", e);
                return core.into_iter().collect();
            }
        };

        let grants = match repo.package_grants(tenant_id).await {
            Ok(grants) => grants,
            Err(e) => {
                error!(%tenant_id, "Failed to load package grants: {:#}", e);
                return core.into_iter().collect();
            }
        };

        let codes = resolve_module_codes(&core, &subscriptions, &grants, now);
        debug!(%tenant_id, modules = codes.len(), "Resolved tenant modules");
        codes
    }

    /// Core codes short-circuit without touching storage
    pub async fn has_module_access(&self, tenant_id: Uuid, code: &str) -> bool {
        if is_core_code(code) {
            return true;
        }
        self.get_tenant_all_modules(tenant_id).await.contains(code)
    }
}
