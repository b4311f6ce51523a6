//! # Master Data Repository
//!
//! Branches, contacts and cash/bank accounts. These rows are maintained
//! outside the invoice engine; the engine only reads them and keeps their
//! persisted balances current (see [`super::balance`]).

use chrono::Utc;
use defter_core::Currency;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::debug;

use super::amount;
use crate::error::DbResult;

// =============================================================================
// Domain Rows
// =============================================================================

/// A counterparty (customer or supplier).
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub id: i64,
    pub branch_id: i64,
    pub code: String,
    pub name: String,
    /// Receivable (+) or payable (−) balance, 2 places.
    pub balance: Decimal,
}

/// A cash register or bank account.
#[derive(Debug, Clone, PartialEq)]
pub struct CashBankAccount {
    pub id: i64,
    pub branch_id: i64,
    pub code: String,
    pub name: String,
    pub currency: Currency,
    pub balance: Decimal,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for branches, contacts and cash/bank accounts.
#[derive(Debug, Clone)]
pub struct MasterDataRepository {
    pool: SqlitePool,
}

impl MasterDataRepository {
    /// Creates a new MasterDataRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MasterDataRepository { pool }
    }

    /// Inserts a branch and returns its id.
    pub async fn insert_branch(&self, code: &str, name: &str) -> DbResult<i64> {
        debug!(code = %code, "Inserting branch");

        let result = sqlx::query("INSERT INTO branches (code, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(code)
            .bind(name)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Whether a branch exists.
    pub async fn branch_exists(&self, id: i64) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM branches WHERE id = ?1")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Looks up a branch id by its code.
    pub async fn find_branch_by_code(&self, code: &str) -> DbResult<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM branches WHERE code = ?1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Inserts a contact and returns its id.
    pub async fn insert_contact(&self, branch_id: i64, code: &str, name: &str) -> DbResult<i64> {
        debug!(branch_id = branch_id, code = %code, "Inserting contact");

        let result = sqlx::query(
            "INSERT INTO contacts (branch_id, code, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(branch_id)
        .bind(code)
        .bind(name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Gets a live contact of the branch.
    pub async fn get_contact(&self, branch_id: i64, id: i64) -> DbResult<Option<Contact>> {
        let record: Option<ContactRecord> = sqlx::query_as(
            r#"
            SELECT id, branch_id, code, name, balance_cents
            FROM contacts
            WHERE id = ?1 AND branch_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Contact::from))
    }

    /// Inserts a cash/bank account and returns its id.
    pub async fn insert_cash_bank_account(
        &self,
        branch_id: i64,
        code: &str,
        name: &str,
        currency: Currency,
    ) -> DbResult<i64> {
        debug!(branch_id = branch_id, code = %code, currency = %currency, "Inserting cash/bank account");

        let result = sqlx::query(
            r#"
            INSERT INTO cash_bank_accounts (branch_id, code, name, currency, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(branch_id)
        .bind(code)
        .bind(name)
        .bind(currency)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Gets a live cash/bank account of the branch.
    pub async fn get_account(&self, branch_id: i64, id: i64) -> DbResult<Option<CashBankAccount>> {
        let record: Option<AccountRecord> = sqlx::query_as(
            r#"
            SELECT id, branch_id, code, name, currency, balance_cents
            FROM cash_bank_accounts
            WHERE id = ?1 AND branch_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(id)
        .bind(branch_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(CashBankAccount::from))
    }
}

// =============================================================================
// Record Types
// =============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
struct ContactRecord {
    id: i64,
    branch_id: i64,
    code: String,
    name: String,
    balance_cents: i64,
}

impl From<ContactRecord> for Contact {
    fn from(r: ContactRecord) -> Self {
        Contact {
            id: r.id,
            branch_id: r.branch_id,
            code: r.code,
            name: r.name,
            balance: amount(r.balance_cents),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct AccountRecord {
    id: i64,
    branch_id: i64,
    code: String,
    name: String,
    currency: Currency,
    balance_cents: i64,
}

impl From<AccountRecord> for CashBankAccount {
    fn from(r: AccountRecord) -> Self {
        CashBankAccount {
            id: r.id,
            branch_id: r.branch_id,
            code: r.code,
            name: r.name,
            currency: r.currency,
            balance: amount(r.balance_cents),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
