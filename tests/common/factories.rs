//! Test factories for seeding data
//!
//! Factories write tenants and users straight through the repositories so
//! tests can start from any lifecycle state without walking the API.

use chrono::{DateTime, Duration, Utc};
use fake::faker::company::en::CompanyName;
use fake::faker::name::en::{FirstName, LastName};
use fake::Fake;
use uuid::Uuid;

use medsas::{
    db::{tenant_repository, user_repository, TenantRepository, UserRepository},
    models::{ActivationOptions, NewUser, Tenant, TenantStatus, User, UserRole, UserStatus},
    services::{AuthService, ModuleService},
};

use super::fixtures::STRONG_PASSWORD;
use super::test_app::TestApp;

/// Builder for a seeded user
pub struct UserSeed {
    pub role: UserRole,
    pub status: UserStatus,
    pub tenant_id: Option<Uuid>,
    pub email: Option<String>,
    pub trial_end: Option<DateTime<Utc>>,
}

impl UserSeed {
    pub fn new(role: UserRole, status: UserStatus) -> Self {
        Self {
            role,
            status,
            tenant_id: None,
            email: None,
            trial_end: Some(Utc::now() + Duration::days(30)),
        }
    }

    pub fn in_tenant(mut self, tenant: &Tenant) -> Self {
        self.tenant_id = Some(tenant.id);
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn trial_ending(mut self, end: DateTime<Utc>) -> Self {
        self.trial_end = Some(end);
        self
    }

    pub async fn insert(self, app: &TestApp) -> User {
        let now = Utc::now();
        let first_name: String = FirstName().fake();
        let email = self
            .email
            .unwrap_or_else(|| format!("{}.{}@example.com", first_name.to_lowercase(), Uuid::new_v4().simple()));

        let new_user = NewUser {
            tenant_id: self.tenant_id,
            email,
            first_name,
            last_name: LastName().fake(),
            phone: None,
            password_hash: AuthService::hash_password(STRONG_PASSWORD).unwrap(),
            role: self.role,
            status: self.status,
            email_verified: true,
            trial_start_date: self.trial_end.map(|end| end - Duration::days(30)),
            trial_end_date: self.trial_end,
        };

        let mut conn = app.state.db.acquire().await.unwrap();
        let id = user_repository::insert(&mut *conn, &new_user, now)
            .await
            .unwrap();
        drop(conn);

        UserRepository::new(&app.state.db)
            .get_by_id(id)
            .await
            .unwrap()
            .unwrap()
    }
}

/// A trial tenant on the free plan
pub async fn seed_tenant(app: &TestApp) -> Tenant {
    let name: String = CompanyName().fake();
    let now = Utc::now();
    let mut conn = app.state.db.acquire().await.unwrap();
    let slug = tenant_repository::unique_slug(&mut *conn, &name).await.unwrap();
    tenant_repository::insert(&mut *conn, &name, &slug, now)
        .await
        .unwrap()
}

pub async fn set_tenant_status(app: &TestApp, tenant: &Tenant, status: TenantStatus) {
    let mut conn = app.state.db.acquire().await.unwrap();
    tenant_repository::set_status(&mut *conn, tenant.id, status, Utc::now())
        .await
        .unwrap();
}

pub async fn reload_tenant(app: &TestApp, id: Uuid) -> Tenant {
    TenantRepository::new(&app.state.db)
        .get_by_id(id)
        .await
        .unwrap()
        .unwrap()
}

pub async fn reload_user(app: &TestApp, id: Uuid) -> User {
    UserRepository::new(&app.state.db)
        .get_by_id(id)
        .await
        .unwrap()
        .unwrap()
}

pub async fn seed_super_admin(app: &TestApp) -> User {
    UserSeed::new(UserRole::SuperAdmin, UserStatus::Active)
        .insert(app)
        .await
}

/// A tenant with an active tenant admin
pub async fn seed_tenant_with_admin(app: &TestApp) -> (Tenant, User) {
    let tenant = seed_tenant(app).await;
    let admin = UserSeed::new(UserRole::TenantAdmin, UserStatus::Active)
        .in_tenant(&tenant)
        .insert(app)
        .await;
    (tenant, admin)
}

/// Give a tenant a paid subscription to `code`
pub async fn grant_module(app: &TestApp, tenant: &Tenant, code: &str) {
    ModuleService::new(app.state.db.clone())
        .activate_module_for_tenant(tenant.id, code, &ActivationOptions::default(), Utc::now())
        .await
        .unwrap();
}

/// Move a suspension's end into the past
pub async fn end_suspension_at(app: &TestApp, suspension_id: &str, until: DateTime<Utc>) {
    sqlx::query("UPDATE suspensions SET suspended_until = ? WHERE id = ?")
        .bind(medsas::utils::time::to_db(until))
        .bind(suspension_id)
        .execute(&app.state.db)
        .await
        .unwrap();
}
