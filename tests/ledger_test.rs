mod common;

use anyhow::Result;
use common::{add_debit, admin, create_customer, manager, staff, test_service};
use debitbook::application::LedgerError;
use debitbook::domain::{TransactionStatus, TransactionType};
use debitbook::storage::{TransactionEdit, TransactionFilter};

#[tokio::test]
async fn test_create_customer_and_fetch() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();

    let customer = service
        .create_customer(
            "Ada".to_string(),
            Some("ada@example.com".to_string()),
            None,
            None,
            &actor,
        )
        .await?;

    let fetched = service.get_customer(customer.id).await?;
    assert_eq!(fetched.name, "Ada");
    assert_eq!(fetched.email.as_deref(), Some("ada@example.com"));
    assert!(fetched.is_active);
    assert_eq!(fetched.created_by, actor.id);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_customer_name_conflicts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();

    create_customer(&service, &actor, "Bob").await?;
    let err = service
        .create_customer("Bob".to_string(), None, None, None, &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Conflict(_)));

    Ok(())
}

#[tokio::test]
async fn test_concurrent_duplicate_customer_exactly_one_wins() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();

    let (a, b) = tokio::join!(
        service.create_customer("Bob".to_string(), None, None, None, &actor),
        service.create_customer("Bob".to_string(), None, None, None, &actor),
    );

    let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(successes, 1, "exactly one creation should win");
    for result in [a, b] {
        if let Err(err) = result {
            assert!(matches!(err, LedgerError::Conflict(_)));
        }
    }

    let customers = service.list_customers(true).await?;
    assert_eq!(customers.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_deactivated_name_can_be_reused() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = manager();

    let bob = create_customer(&service, &actor, "Bob").await?;
    service.deactivate_customer(bob.id, &actor).await?;

    // The unique constraint applies to active customers only.
    let bob2 = create_customer(&service, &actor, "Bob").await?;
    assert_ne!(bob.id, bob2.id);

    Ok(())
}

#[tokio::test]
async fn test_deactivate_requires_manager_or_admin() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let creator = staff();
    let customer = create_customer(&service, &creator, "Ada").await?;

    let err = service
        .deactivate_customer(customer.id, &creator)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Authorization { .. }));

    service.deactivate_customer(customer.id, &manager()).await?;
    let fetched = service.get_customer(customer.id).await?;
    assert!(!fetched.is_active);

    Ok(())
}

#[tokio::test]
async fn test_create_transaction_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;

    // Non-positive amount
    let err = service
        .create_transaction(
            customer.id,
            TransactionType::Debit,
            0,
            "zero".to_string(),
            None,
            None,
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // Empty description
    let err = service
        .create_transaction(
            customer.id,
            TransactionType::Debit,
            1000,
            "   ".to_string(),
            None,
            None,
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // Unknown customer
    let err = service
        .create_transaction(
            uuid::Uuid::new_v4(),
            TransactionType::Debit,
            1000,
            "ghost".to_string(),
            None,
            None,
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    Ok(())
}

#[tokio::test]
async fn test_inactive_customer_rejects_new_transactions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = manager();
    let customer = create_customer(&service, &actor, "Ada").await?;
    service.deactivate_customer(customer.id, &actor).await?;

    let err = add_debit(&service, &actor, &customer, 1000)
        .await
        .unwrap_err()
        .downcast::<LedgerError>()?;
    assert!(matches!(err, LedgerError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn test_new_transaction_is_pending() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;

    let tx = add_debit(&service, &actor, &customer, 2500).await?;
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert!(tx.approved_by.is_none());

    let fetched = service.get_transaction(tx.id).await?;
    assert_eq!(fetched.amount_cents, 2500);
    assert_eq!(fetched.status, TransactionStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_edit_pending_transaction() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;
    let tx = add_debit(&service, &actor, &customer, 2500).await?;

    let edited = service
        .edit_transaction(
            tx.id,
            TransactionEdit {
                amount_cents: Some(3000),
                description: Some("corrected amount".to_string()),
                ..TransactionEdit::default()
            },
            &actor,
        )
        .await?;

    assert_eq!(edited.amount_cents, 3000);
    assert_eq!(edited.description, "corrected amount");
    assert_eq!(edited.status, TransactionStatus::Pending);

    Ok(())
}

#[tokio::test]
async fn test_edit_transaction_type() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;
    let tx = add_debit(&service, &actor, &customer, 2500).await?;

    let edited = service
        .edit_transaction(
            tx.id,
            TransactionEdit {
                transaction_type: Some(TransactionType::Payment),
                ..TransactionEdit::default()
            },
            &actor,
        )
        .await?;
    assert_eq!(edited.transaction_type, TransactionType::Payment);

    // The flipped direction carries through to the balance.
    service.approve_transaction(tx.id, &manager()).await?;
    assert_eq!(service.customer_balance(customer.id).await?, -2500);

    Ok(())
}

#[tokio::test]
async fn test_edit_terminal_transaction_conflicts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let approver = manager();
    let customer = create_customer(&service, &actor, "Ada").await?;
    let tx = add_debit(&service, &actor, &customer, 2500).await?;
    service.approve_transaction(tx.id, &approver).await?;

    let err = service
        .edit_transaction(
            tx.id,
            TransactionEdit {
                amount_cents: Some(1),
                ..TransactionEdit::default()
            },
            &actor,
        )
        .await
        .unwrap_err();
    // The message reports the row's actual terminal status.
    match &err {
        LedgerError::Conflict(message) => assert!(message.contains("approved")),
        other => panic!("expected conflict, got {other}"),
    }

    // The approved row is untouched.
    let fetched = service.get_transaction(tx.id).await?;
    assert_eq!(fetched.amount_cents, 2500);

    Ok(())
}

#[tokio::test]
async fn test_edit_validation() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;
    let tx = add_debit(&service, &actor, &customer, 2500).await?;

    let err = service
        .edit_transaction(tx.id, TransactionEdit::default(), &actor)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let err = service
        .edit_transaction(
            tx.id,
            TransactionEdit {
                amount_cents: Some(-100),
                ..TransactionEdit::default()
            },
            &actor,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    Ok(())
}

#[tokio::test]
async fn test_delete_pending_is_admin_only() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;
    let tx = add_debit(&service, &actor, &customer, 2500).await?;

    let err = service
        .delete_transaction(tx.id, &manager())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Authorization { .. }));

    service.delete_transaction(tx.id, &admin()).await?;
    let err = service.get_transaction(tx.id).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound { .. }));

    Ok(())
}

#[tokio::test]
async fn test_delete_terminal_transaction_conflicts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let customer = create_customer(&service, &actor, "Ada").await?;
    let tx = add_debit(&service, &actor, &customer, 2500).await?;
    service.approve_transaction(tx.id, &manager()).await?;

    let err = service
        .delete_transaction(tx.id, &admin())
        .await
        .unwrap_err();
    match &err {
        LedgerError::Conflict(message) => assert!(message.contains("approved")),
        other => panic!("expected conflict, got {other}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_list_transactions_filters() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let actor = staff();
    let approver = manager();
    let ada = create_customer(&service, &actor, "Ada").await?;
    let bob = create_customer(&service, &actor, "Bob").await?;

    let t1 = add_debit(&service, &actor, &ada, 1000).await?;
    add_debit(&service, &actor, &ada, 2000).await?;
    add_debit(&service, &actor, &bob, 3000).await?;
    service.approve_transaction(t1.id, &approver).await?;

    let ada_txs = service
        .list_transactions(TransactionFilter {
            customer_id: Some(ada.id),
            ..TransactionFilter::default()
        })
        .await?;
    assert_eq!(ada_txs.len(), 2);

    let pending = service
        .list_transactions(TransactionFilter {
            status: Some(TransactionStatus::Pending),
            ..TransactionFilter::default()
        })
        .await?;
    assert_eq!(pending.len(), 2);

    let limited = service
        .list_transactions(TransactionFilter {
            limit: Some(1),
            ..TransactionFilter::default()
        })
        .await?;
    assert_eq!(limited.len(), 1);

    Ok(())
}
