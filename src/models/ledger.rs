//! Current accounts (customers, suppliers) and their ledger entries

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

text_enum! {
    pub enum AccountType {
        Customer => "CUSTOMER",
        Supplier => "SUPPLIER",
        Both => "BOTH",
    }
}

impl AccountType {
    /// Prefix of generated account codes
    pub fn code_prefix(&self) -> &'static str {
        match self {
            AccountType::Customer => "C",
            AccountType::Supplier => "S",
            AccountType::Both => "CS",
        }
    }
}

text_enum! {
    pub enum DocumentType {
        Invoice => "INVOICE",
        Receipt => "RECEIPT",
        Payment => "PAYMENT",
        Refund => "REFUND",
        Opening => "OPENING",
        Adjustment => "ADJUSTMENT",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentAccount {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub tax_number: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account with its balance computed from the ledger
#[derive(Debug, Clone, Serialize)]
pub struct CurrentAccountSummary {
    #[serde(flatten)]
    pub account: CurrentAccount,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub current_account_id: Uuid,
    pub transaction_date: DateTime<Utc>,
    pub document_type: DocumentType,
    pub document_number: Option<String>,
    pub description: Option<String>,
    pub debit_amount: Decimal,
    pub credit_amount: Decimal,
    /// Balance snapshot stored when the entry was posted
    pub balance: Decimal,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn net(&self) -> Decimal {
        self.debit_amount - self.credit_amount
    }
}

/// Ledger entry with the balance computed on read
#[derive(Debug, Clone, Serialize)]
pub struct LedgerRow {
    #[serde(flatten)]
    pub transaction: LedgerTransaction,
    pub running_balance: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub document_type: Option<DocumentType>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerPage {
    pub account: CurrentAccount,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
    pub transactions: Vec<LedgerRow>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCurrentAccountRequest {
    #[validate(length(min = 1, max = 200, message = "Account name is required"))]
    pub name: String,
    pub account_type: AccountType,
    #[validate(length(max = 50))]
    pub tax_number: Option<String>,
    #[validate(email(message = "A valid e-mail address is required"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCurrentAccountRequest {
    #[validate(length(min = 1, max = 200, message = "Account name is required"))]
    pub name: Option<String>,
    pub account_type: Option<AccountType>,
    pub tax_number: Option<String>,
    #[validate(email(message = "A valid e-mail address is required"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostTransactionRequest {
    /// Defaults to now
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    pub document_type: DocumentType,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub debit_amount: Decimal,
    #[serde(default)]
    pub credit_amount: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountListQuery {
    pub search: Option<String>,
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub include_inactive: bool,
}
