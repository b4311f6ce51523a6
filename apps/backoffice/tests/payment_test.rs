//! Payment command tests: balance recalculation on create and delete.

mod common;

use defter_backoffice::commands::invoice::{create_invoice, get_invoice, update_invoice, UpdateInvoiceRequest};
use defter_backoffice::commands::payment::{create_payment, delete_payment, CreatePaymentRequest, DeletePaymentRequest};
use defter_backoffice::{dispatch, ErrorCode};
use defter_core::PaymentDirection;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use common::{fixture, invoice, invoice_date, line, token, Fixture};

/// Sales invoice of 100 + 20 VAT for the fixture contact.
async fn sales_invoice(f: &Fixture) -> i64 {
    create_invoice(
        &f.state,
        invoice("Sales", f.contact_id, vec![line(f.notebook_id, dec!(1), dec!(100), 20)]),
        &token(),
    )
    .await
    .unwrap()
    .id
}

fn payment(f: &Fixture, invoice_id: Option<i64>, amount: Decimal) -> CreatePaymentRequest {
    CreatePaymentRequest {
        account_id: f.account_id,
        contact_id: None,
        linked_invoice_id: invoice_id,
        date_utc: invoice_date(),
        direction: PaymentDirection::In,
        amount,
        currency: None,
        description: Some("  Tahsilat  ".to_string()),
    }
}

async fn account_balance(f: &Fixture) -> Decimal {
    f.db.master().get_account(f.branch_id, f.account_id).await.unwrap().unwrap().balance
}

async fn contact_balance(f: &Fixture) -> Decimal {
    f.db.master().get_contact(f.branch_id, f.contact_id).await.unwrap().unwrap().balance
}

#[tokio::test]
async fn payment_reduces_balances() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;
    assert_eq!(contact_balance(&f).await, dec!(120.00));

    let paid = create_payment(&f.state, payment(&f, Some(invoice_id), dec!(40)), &token())
        .await
        .unwrap();

    assert_eq!(paid.amount, dec!(40.00));
    assert_eq!(paid.invoice_balance, Some(dec!(80.00)));
    assert_eq!(paid.contact_balance, Some(dec!(80.00)));
    assert_eq!(paid.account_balance, dec!(40.00));

    let detail = get_invoice(&f.state, invoice_id, false).await.unwrap();
    assert_eq!(detail.balance, dec!(80.00));
    assert_eq!(account_balance(&f).await, dec!(40.00));
    assert_eq!(contact_balance(&f).await, dec!(80.00));

    let stored = f.db.payments().get(f.branch_id, paid.id).await.unwrap().unwrap();
    assert_eq!(stored.contact_id, Some(f.contact_id));
    assert_eq!(stored.description.as_deref(), Some("Tahsilat"));
}

#[tokio::test]
async fn over_balance_payment_writes_nothing() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;

    let err = create_payment(&f.state, payment(&f, Some(invoice_id), dec!(150)), &token())
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::BusinessRule);
    assert_eq!(err.details[0].target, "amount");
    assert!(f.db.payments().list_for_invoice(invoice_id).await.unwrap().is_empty());
    assert_eq!(account_balance(&f).await, dec!(0.00));
    assert_eq!(get_invoice(&f.state, invoice_id, false).await.unwrap().balance, dec!(120.00));
}

#[tokio::test]
async fn concurrent_payments_cannot_overpay() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;

    let (token_a, token_b) = (token(), token());
    let (first, second) = tokio::join!(
        create_payment(&f.state, payment(&f, Some(invoice_id), dec!(100)), &token_a),
        create_payment(&f.state, payment(&f, Some(invoice_id), dec!(100)), &token_b),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    let rejected = outcomes.iter().find_map(|o| o.as_ref().err()).unwrap();
    assert_eq!(rejected.code, ErrorCode::BusinessRule);
    assert_eq!(rejected.details[0].target, "amount");

    assert_eq!(f.db.payments().list_for_invoice(invoice_id).await.unwrap().len(), 1);
    assert_eq!(get_invoice(&f.state, invoice_id, false).await.unwrap().balance, dec!(20.00));
    assert_eq!(account_balance(&f).await, dec!(100.00));
}

#[tokio::test]
async fn linked_payment_rules() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;

    let mut usd = payment(&f, Some(invoice_id), dec!(10));
    usd.currency = Some("usd".to_string());
    let err = create_payment(&f.state, usd, &token()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BusinessRule);
    assert_eq!(err.details[0].target, "currency");

    let mut stranger = payment(&f, Some(invoice_id), dec!(10));
    stranger.contact_id = Some(f.other_contact_id);
    let err = create_payment(&f.state, stranger, &token()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BusinessRule);

    let err = create_payment(&f.state, payment(&f, Some(9999), dec!(10)), &token())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let mut no_account = payment(&f, Some(invoice_id), dec!(10));
    no_account.account_id = 9999;
    let err = create_payment(&f.state, no_account, &token()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let err = create_payment(&f.state, payment(&f, Some(invoice_id), dec!(0)), &token())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
    assert_eq!(err.details[0].target, "amount");
}

#[tokio::test]
async fn unlinked_payment_moves_only_the_account() {
    let f = fixture().await;
    let mut out = payment(&f, None, dec!(25.5));
    out.direction = PaymentDirection::Out;

    let paid = create_payment(&f.state, out, &token()).await.unwrap();

    assert_eq!(paid.invoice_balance, None);
    assert_eq!(paid.contact_balance, None);
    assert_eq!(paid.account_balance, dec!(-25.50));
}

#[tokio::test]
async fn delete_restores_balances() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;
    let paid = create_payment(&f.state, payment(&f, Some(invoice_id), dec!(40)), &token())
        .await
        .unwrap();

    let deleted = delete_payment(
        &f.state,
        DeletePaymentRequest {
            id: paid.id,
            row_version: paid.row_version.clone(),
        },
        &token(),
    )
    .await
    .unwrap();

    assert_eq!(deleted.invoice_balance, Some(dec!(120.00)));
    assert_eq!(deleted.account_balance, dec!(0.00));
    assert_eq!(contact_balance(&f).await, dec!(120.00));
    assert!(f.db.payments().get(f.branch_id, paid.id).await.unwrap().is_none());

    let err = delete_payment(
        &f.state,
        DeletePaymentRequest {
            id: paid.id,
            row_version: paid.row_version,
        },
        &token(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn stale_payment_token_is_a_conflict() {
    let f = fixture().await;
    let paid = create_payment(&f.state, payment(&f, None, dec!(10)), &token()).await.unwrap();

    let err = delete_payment(
        &f.state,
        DeletePaymentRequest {
            id: paid.id,
            row_version: defter_core::RowVersion::new(7).to_token(),
        },
        &token(),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::ConcurrencyConflict);
    assert_eq!(account_balance(&f).await, dec!(10.00));
}

#[tokio::test]
async fn invoice_update_keeps_payments_applied() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;
    create_payment(&f.state, payment(&f, Some(invoice_id), dec!(40)), &token())
        .await
        .unwrap();
    let before = get_invoice(&f.state, invoice_id, false).await.unwrap();

    let mut kept = line(f.notebook_id, dec!(2), dec!(100), 20);
    kept.id = Some(before.lines[0].id);
    let updated = update_invoice(
        &f.state,
        UpdateInvoiceRequest {
            id: invoice_id,
            row_version: before.row_version,
            invoice: invoice("Sales", f.contact_id, vec![kept]),
        },
        &token(),
    )
    .await
    .unwrap();

    assert_eq!(updated.total_gross, dec!(240.00));
    assert_eq!(updated.balance, dec!(200.00));
    assert_eq!(contact_balance(&f).await, dec!(200.00));
}

#[tokio::test]
async fn payment_through_json() {
    let f = fixture().await;
    let invoice_id = sales_invoice(&f).await;
    let raw = format!(
        r#"{{ "accountId": {}, "linkedInvoiceId": {}, "dateUtc": "2026-03-02T10:00:00Z",
             "direction": "in", "amount": "19.999" }}"#,
        f.account_id, invoice_id
    );

    let paid = dispatch(&f.state, "pay", &raw, &token()).await.unwrap();

    assert_eq!(paid["amount"], "20.00");
    assert_eq!(paid["currency"], "TRY");
    assert_eq!(paid["invoiceBalance"], "100.00");
    assert_eq!(paid["accountBalance"], "20.00");

    let raw = format!(
        r#"{{ "id": {}, "rowVersion": "{}" }}"#,
        paid["id"].as_i64().unwrap(),
        paid["rowVersion"].as_str().unwrap()
    );
    let deleted = dispatch(&f.state, "unpay", &raw, &token()).await.unwrap();
    assert_eq!(deleted["invoiceBalance"], "120.00");
}
