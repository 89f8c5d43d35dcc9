mod common;

use anyhow::Result;
use common::{add_debit, create_customer, manager, staff, test_service};
use debitbook::application::LedgerError;
use debitbook::domain::TransactionStatus;

#[tokio::test]
async fn test_approve_sets_decision_fields() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let approver = manager();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    let approved = service.approve_transaction(tx.id, &approver).await?;
    assert_eq!(approved.status, TransactionStatus::Approved);
    assert_eq!(approved.approved_by, Some(approver.id));
    assert!(approved.approved_at.is_some());
    assert!(approved.rejection_reason.is_none());

    Ok(())
}

#[tokio::test]
async fn test_staff_cannot_approve() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    let err = service
        .approve_transaction(tx.id, &creator)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Authorization { .. }));

    // The transaction remains pending after the refused attempt.
    let fetched = service.get_transaction(tx.id).await?;
    assert_eq!(fetched.status, TransactionStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_approve_twice_conflicts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let approver = manager();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    service.approve_transaction(tx.id, &approver).await?;
    let err = service
        .approve_transaction(tx.id, &approver)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    Ok(())
}

#[tokio::test]
async fn test_reject_after_approve_conflicts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let approver = manager();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    service.approve_transaction(tx.id, &approver).await?;
    let err = service
        .reject_transaction(tx.id, &approver, "changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    // The prior decision is never overwritten.
    let fetched = service.get_transaction(tx.id).await?;
    assert_eq!(fetched.status, TransactionStatus::Approved);
    assert!(fetched.rejection_reason.is_none());

    Ok(())
}

#[tokio::test]
async fn test_reject_requires_reason() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let approver = manager();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    let err = service
        .reject_transaction(tx.id, &approver, "  ")
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // The transaction is still pending and can be rejected properly.
    let rejected = service
        .reject_transaction(tx.id, &approver, "amount disputed")
        .await?;
    assert_eq!(rejected.status, TransactionStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("amount disputed"));
    assert_eq!(rejected.approved_by, Some(approver.id));
    assert!(rejected.approved_at.is_some());

    Ok(())
}

#[tokio::test]
async fn test_unknown_transaction_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let approver = manager();

    let err = service
        .approve_transaction(uuid::Uuid::new_v4(), &approver)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_approve_and_reject_exactly_one_wins() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let first = manager();
    let second = manager();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    let (approve_result, reject_result) = tokio::join!(
        service.approve_transaction(tx.id, &first),
        service.reject_transaction(tx.id, &second, "duplicate entry"),
    );

    let approve_won = approve_result.is_ok();
    let reject_won = reject_result.is_ok();
    assert!(
        approve_won ^ reject_won,
        "exactly one of the concurrent decisions must win"
    );

    if let Err(err) = &approve_result {
        assert!(matches!(err, LedgerError::Conflict(_)));
    }
    if let Err(err) = &reject_result {
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    // The terminal status matches whichever call succeeded, and the
    // transaction is never both approved and rejected.
    let fetched = service.get_transaction(tx.id).await?;
    if approve_won {
        assert_eq!(fetched.status, TransactionStatus::Approved);
        assert!(fetched.rejection_reason.is_none());
    } else {
        assert_eq!(fetched.status, TransactionStatus::Rejected);
        assert_eq!(fetched.rejection_reason.as_deref(), Some("duplicate entry"));
    }

    Ok(())
}

#[tokio::test]
async fn test_concurrent_double_approve_exactly_one_wins() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let first = manager();
    let second = manager();
    let customer = create_customer(&service, &creator, "Ada").await?;
    let tx = add_debit(&service, &creator, &customer, 2500).await?;

    let (a, b) = tokio::join!(
        service.approve_transaction(tx.id, &first),
        service.approve_transaction(tx.id, &second),
    );

    assert!(a.is_ok() ^ b.is_ok());

    // Only the winner's decision is recorded, and the balance counts the
    // amount exactly once.
    assert_eq!(service.customer_balance(customer.id).await?, 2500);

    Ok(())
}
