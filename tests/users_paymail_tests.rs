//! Users, their paymails and the destinations served for incoming payments

mod common;

use std::sync::Arc;

use common::{Harness, TestResult, TestUser};
use spv_wallet_core::{
    bsv::address::Address,
    data_structures::PaymailAddress,
    errors::ErrorKind,
    key_management::{derive_address, type42},
    paymail::PaymailDestinationService,
    storage::{Repositories, SqlitePragmaConfig},
    users::{PaymailRequest, UsersService},
    SqliteStorage,
};

fn destinations(harness: &Harness) -> PaymailDestinationService {
    PaymailDestinationService::new(harness.users.clone(), harness.repositories.addresses.clone())
}

/// The user id is the address of the public key and creation is idempotent
#[tokio::test]
async fn test_create_user_is_idempotent() -> TestResult {
    let harness = Harness::new().await?;
    let key = TestUser::from_seed(4);

    let first = harness
        .users
        .create_user(&harness.token, &key.pubkey_hex(), &[PaymailRequest::new("Dana@Example.com")])
        .await?;
    assert_eq!(first.id, Address::from_public_key(&key.public).to_string());

    let second = harness
        .users
        .create_user(&harness.token, &key.pubkey_hex(), &[PaymailRequest::new("dana@example.com")])
        .await?;
    assert_eq!(first, second);

    let paymails = harness
        .repositories
        .paymails
        .list_paymails(&harness.token, &first.id)
        .await?;
    assert_eq!(paymails.len(), 1);
    assert_eq!(paymails[0].address(), "dana@example.com");
    assert_eq!(paymails[0].public_name, "dana");
    Ok(())
}

/// Bad keys, foreign domains and taken aliases are refused
#[tokio::test]
async fn test_user_validation() -> TestResult {
    let harness = Harness::new().await?;

    let err = harness
        .users
        .create_user(&harness.token, "02abcd", &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRequired);

    let key = TestUser::from_seed(5);
    let err = harness
        .users
        .create_user(&harness.token, &key.pubkey_hex(), &[PaymailRequest::new("erin@other.org")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRequired);

    harness.create_user(6, &["frank@example.com"]).await?;
    let err = harness
        .users
        .create_user(&harness.token, &key.pubkey_hex(), &[PaymailRequest::new("frank@example.com")])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRequired);
    Ok(())
}

/// The first paymail stays the default
#[tokio::test]
async fn test_default_paymail() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &[]).await?;
    assert!(harness.users.default_paymail(&harness.token, &user.id).await?.is_none());

    harness
        .users
        .add_paymail(&harness.token, &user.id, &PaymailRequest::new("first@example.com"))
        .await?;
    harness
        .users
        .add_paymail(&harness.token, &user.id, &PaymailRequest::new("second@example.com"))
        .await?;

    let default = harness
        .users
        .default_paymail(&harness.token, &user.id)
        .await?
        .ok_or("no default paymail")?;
    assert_eq!(default.address(), "first@example.com");

    let err = harness
        .users
        .add_paymail(&harness.token, "1NoSuchUser", &PaymailRequest::new("ghost@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserNotFound);
    Ok(())
}

/// A served destination is stored with instructions that re-derive it from
/// the user's own key
#[tokio::test]
async fn test_destination_is_spendable_by_owner() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    let paymail = PaymailAddress::parse("alice@example.com")?;
    let service = destinations(&harness);

    let pki = service.pki(&harness.token, &paymail).await?;
    assert_eq!(
        pki,
        type42::derive_child(&user.public, &type42::paymail_pki_invoice("alice", "example.com"))?
    );

    let response = service.create_destination(&harness.token, &paymail, 1_000).await?;
    assert_eq!(response.outputs.len(), 1);
    assert_eq!(response.outputs[0].satoshis, 1_000);
    assert!(!response.reference.is_empty());

    let address = response.outputs[0].address.clone().ok_or("no address")?;
    let saved = harness
        .repositories
        .addresses
        .find_addresses(&harness.token, &[address.clone()])
        .await?;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].user_id, user.id);
    assert_eq!(
        derive_address(&user.public, &saved[0].custom_instructions)?.to_string(),
        address
    );

    let again = service.create_destination(&harness.token, &paymail, 1_000).await?;
    assert_ne!(again.reference, response.reference);
    assert_ne!(again.outputs[0].script, response.outputs[0].script);
    Ok(())
}

/// Unknown paymails are reported as missing
#[tokio::test]
async fn test_unknown_paymail() -> TestResult {
    let harness = Harness::new().await?;
    let service = destinations(&harness);
    let paymail = PaymailAddress::parse("nobody@example.com")?;

    let err = service.pki(&harness.token, &paymail).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PaymailNotFound);
    let err = service
        .create_destination(&harness.token, &paymail, 5)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PaymailNotFound);
    Ok(())
}

/// Users and paymails persist across reopening a file database
#[tokio::test]
async fn test_file_database_survives_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("wallet.db");
    let key = TestUser::from_seed(8);
    let token = spv_wallet_core::TokioCancellationToken::new();

    let open = |storage: Arc<SqliteStorage>| {
        let repositories = Repositories::from_sqlite(storage);
        UsersService::new(
            repositories.users.clone(),
            repositories.paymails.clone(),
            vec!["example.com".to_string()],
        )
    };

    let created = {
        let storage =
            SqliteStorage::new_with_config(&path, SqlitePragmaConfig::conservative()).await?;
        open(Arc::new(storage))
            .create_user(&token, &key.pubkey_hex(), &[PaymailRequest::new("gina@example.com")])
            .await?
    };

    let users = open(Arc::new(SqliteStorage::new(&path).await?));
    assert_eq!(users.get_user(&token, &created.id).await?, created);
    let default = users
        .default_paymail(&token, &created.id)
        .await?
        .ok_or("paymail lost")?;
    assert_eq!(default.address(), "gina@example.com");
    Ok(())
}
