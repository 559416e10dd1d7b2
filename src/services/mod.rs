//! Business logic services

pub mod auth;
pub mod email;
pub mod entitlement;
pub mod ledger;
pub mod lifecycle;
pub mod modules;
pub mod payment;
pub mod scheduler;
pub mod suspension;
pub mod tenants;

pub use auth::{AuthService, Registration};
pub use email::{build_mailer, EmailService, LogMailer, Mailer, OutgoingMail, SmtpMailer};
pub use entitlement::{resolve_module_codes, EntitlementService};
pub use ledger::LedgerService;
pub use lifecycle::{authorize_admin_action, Actor, LifecycleService, SweepReport};
pub use modules::{plan_activation, ActivationPlan, ModuleOutcome, ModuleService};
pub use payment::PaymentService;
pub use scheduler::{start_lifecycle_scheduler, LifecycleSweeper, SweepSummary};
pub use suspension::SuspensionService;
pub use tenants::TenantService;
