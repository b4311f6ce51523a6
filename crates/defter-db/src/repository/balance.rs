//! # Balance Repository
//!
//! Recomputes persisted balances from source rows. Every method runs on the
//! caller's transaction so a balance never commits apart from the write that
//! changed it.
//!
//! ## Formulas
//! ```text
//! invoice  = total_gross − total_withholding − Σ live payments linked to it
//!
//! account  = Σ live In payments − Σ live Out payments
//!
//! contact  = Σ live invoices (total_gross − total_withholding) × sign
//!            − Σ live In payments + Σ live Out payments
//!
//!            sign = +1  sales, purchase_return   (contact owes us)
//!                   −1  purchase, sales_return, expense
//! ```
//!
//! Recalculation is a derived write: it does not bump `row_version`, so a
//! caller's concurrency token stays valid across payment postings.

use defter_core::{InvoiceType, PaymentDirection};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use tracing::debug;

use super::amount;
use crate::error::{DbError, DbResult};

/// Repository for balance recalculation.
///
/// Every recalculation runs on the caller's transaction, so it holds no pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalanceRepository;

impl BalanceRepository {
    pub fn new() -> Self {
        BalanceRepository
    }

    /// Recomputes and stores an invoice's open balance.
    pub async fn recalculate_invoice(&self, conn: &mut SqliteConnection, invoice_id: i64) -> DbResult<Decimal> {
        let balance_cents: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT i.total_gross_cents - i.total_withholding_cents - COALESCE((
                SELECT SUM(p.amount_cents)
                FROM payments p
                WHERE p.linked_invoice_id = i.id AND p.is_deleted = 0
            ), 0)
            FROM invoices i
            WHERE i.id = ?1 AND i.is_deleted = 0
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut *conn)
        .await?;

        let balance_cents = balance_cents.ok_or_else(|| DbError::not_found("Invoice", invoice_id))?;

        sqlx::query("UPDATE invoices SET balance_cents = ?2 WHERE id = ?1")
            .bind(invoice_id)
            .bind(balance_cents)
            .execute(&mut *conn)
            .await?;

        debug!(invoice_id = invoice_id, balance_cents = balance_cents, "Invoice balance recalculated");

        Ok(amount(balance_cents))
    }

    /// Recomputes and stores a cash/bank account balance.
    pub async fn recalculate_account(&self, conn: &mut SqliteConnection, account_id: i64) -> DbResult<Decimal> {
        let balance_cents: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN direction = ?2 THEN amount_cents ELSE -amount_cents END), 0)
            FROM payments
            WHERE account_id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(account_id)
        .bind(PaymentDirection::In)
        .fetch_one(&mut *conn)
        .await?;

        let result = sqlx::query("UPDATE cash_bank_accounts SET balance_cents = ?2 WHERE id = ?1")
            .bind(account_id)
            .bind(balance_cents)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("CashBankAccount", account_id));
        }

        debug!(account_id = account_id, balance_cents = balance_cents, "Account balance recalculated");

        Ok(amount(balance_cents))
    }

    /// Recomputes and stores a contact's receivable/payable balance.
    pub async fn recalculate_contact(&self, conn: &mut SqliteConnection, contact_id: i64) -> DbResult<Decimal> {
        let invoiced: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(
                CASE WHEN invoice_type IN (?2, ?3)
                     THEN total_gross_cents - total_withholding_cents
                     ELSE -(total_gross_cents - total_withholding_cents)
                END
            ), 0)
            FROM invoices
            WHERE contact_id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(contact_id)
        .bind(InvoiceType::Sales)
        .bind(InvoiceType::PurchaseReturn)
        .fetch_one(&mut *conn)
        .await?;

        let paid: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN direction = ?2 THEN amount_cents ELSE -amount_cents END), 0)
            FROM payments
            WHERE contact_id = ?1 AND is_deleted = 0
            "#,
        )
        .bind(contact_id)
        .bind(PaymentDirection::In)
        .fetch_one(&mut *conn)
        .await?;

        let balance_cents = invoiced - paid;

        let result = sqlx::query("UPDATE contacts SET balance_cents = ?2 WHERE id = ?1")
            .bind(contact_id)
            .bind(balance_cents)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Contact", contact_id));
        }

        debug!(contact_id = contact_id, balance_cents = balance_cents, "Contact balance recalculated");

        Ok(amount(balance_cents))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::fixtures::{now, seeded};
    use super::super::payment::NewPayment;
    use super::*;
    use defter_core::Currency;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_balances_follow_payments() {
        let s = seeded().await;
        let invoice_id = crate::repository::invoice::tests::insert_bare_invoice(&s).await;
        sqlx::query("UPDATE invoices SET total_gross_cents = 12000, total_withholding_cents = 2000 WHERE id = ?1")
            .bind(invoice_id)
            .execute(s.db.pool())
            .await
            .unwrap();

        let balances = s.db.balances();
        let payments = s.db.payments();
        let mut tx = s.db.begin().await.unwrap();

        assert_eq!(balances.recalculate_invoice(&mut tx, invoice_id).await.unwrap(), dec!(100.00));
        assert_eq!(balances.recalculate_contact(&mut tx, s.contact_id).await.unwrap(), dec!(100.00));

        payments
            .insert(
                &mut tx,
                &NewPayment {
                    branch_id: s.branch_id,
                    account_id: s.account_id,
                    contact_id: Some(s.contact_id),
                    linked_invoice_id: Some(invoice_id),
                    date_utc: now(),
                    direction: PaymentDirection::In,
                    amount: dec!(40),
                    currency: Currency::Try,
                    description: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(balances.recalculate_invoice(&mut tx, invoice_id).await.unwrap(), dec!(60.00));
        assert_eq!(balances.recalculate_contact(&mut tx, s.contact_id).await.unwrap(), dec!(60.00));
        assert_eq!(balances.recalculate_account(&mut tx, s.account_id).await.unwrap(), dec!(40.00));
        tx.commit().await.unwrap();

        let contact = s.db.master().get_contact(s.branch_id, s.contact_id).await.unwrap().unwrap();
        assert_eq!(contact.balance, dec!(60.00));
        let account = s.db.master().get_account(s.branch_id, s.account_id).await.unwrap().unwrap();
        assert_eq!(account.balance, dec!(40.00));
    }

    #[tokio::test]
    async fn test_missing_rows_are_not_found() {
        let s = seeded().await;
        let balances = s.db.balances();
        let mut tx = s.db.begin().await.unwrap();

        assert!(matches!(
            balances.recalculate_invoice(&mut tx, 999).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            balances.recalculate_account(&mut tx, 999).await,
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            balances.recalculate_contact(&mut tx, 999).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
