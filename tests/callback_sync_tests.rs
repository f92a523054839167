//! Broadcaster callbacks applied to tracked transactions

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Harness, TestResult};
use spv_wallet_core::{
    bsv::{
        hash::TxId,
        merkle_path::{MerklePath, PathElement},
        script::Script,
        spv::SpvTransaction,
        transaction::{Transaction, TxInput, TxOutput},
    },
    chain::{ArcTxStatus, TxInfo},
    data_structures::{TrackedTransaction, TxStatus},
    errors::ErrorKind,
    mocks::{MockFailureModes, MockTransactionRepository},
    storage::TransactionRepository,
    CallbackSyncService,
};

const BLOCK_HEIGHT: u64 = 885803;
const BLOCK_HASH: &str = "00000000000000000f0905597b6cac80031f0f56834e74dce1a714c682a9ed38";
const SIBLING: &str = "4dff1d32c1a02d7797e33d7c4ab2f96fe6699005b6d79e6391bdf5e358232e06";
const OUTSIDER: &str = "84d44ab896962f9e57970af36cc4a17da3c8ce550f449e74641645074dc95622";

fn broadcasted_tx() -> Transaction {
    let mut tx = Transaction::new();
    tx.inputs.push(TxInput::new(TxId::from_internal_bytes([7u8; 32]), 1));
    tx.outputs.push(TxOutput::new(900, Script::p2pkh(&[3u8; 20])));
    tx
}

/// Two-leaf block holding `txid` at offset 1
fn merkle_path(txid: &TxId) -> TestResult<MerklePath> {
    let sibling = TxId::from_hex(SIBLING)?;
    Ok(MerklePath::new(
        BLOCK_HEIGHT,
        vec![vec![
            PathElement::hash(0, *sibling.as_internal_bytes()),
            PathElement::txid(1, txid),
        ]],
    ))
}

fn mined_callback(txid: &TxId) -> TestResult<TxInfo> {
    let mut info = TxInfo::new(txid.to_hex(), ArcTxStatus::Mined);
    info.block_height = Some(BLOCK_HEIGHT);
    info.block_hash = Some(BLOCK_HASH.to_string());
    info.merkle_path = Some(merkle_path(txid)?.to_hex());
    info.timestamp = Utc::now() + Duration::minutes(10);
    Ok(info)
}

async fn stored(harness: &Harness) -> TestResult<Transaction> {
    let tx = broadcasted_tx();
    harness
        .repositories
        .transactions
        .save_transaction(
            &harness.token,
            &TrackedTransaction::new(tx.txid(), TxStatus::Broadcasted).with_raw_hex(tx.to_hex()),
        )
        .await?;
    Ok(tx)
}

async fn reload(harness: &Harness, txid: &TxId) -> TestResult<TrackedTransaction> {
    Ok(harness
        .repositories
        .transactions
        .get_transaction(&harness.token, txid)
        .await?
        .ok_or("transaction disappeared")?)
}

/// A MINED callback turns the raw row into BEEF carrying the path
#[tokio::test]
async fn test_mined_callback() -> TestResult {
    let harness = Harness::new().await?;
    let tx = stored(&harness).await?;
    let txid = tx.txid();
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());

    let info = mined_callback(&txid)?;
    service.handle(&harness.token, &info).await?;

    let row = reload(&harness, &txid).await?;
    assert_eq!(row.status, TxStatus::Mined);
    assert_eq!(row.block_height, Some(BLOCK_HEIGHT));
    assert_eq!(row.block_hash.as_deref(), Some(BLOCK_HASH));
    assert!(row.raw_hex.is_none());
    assert_eq!(row.updated_at, info.timestamp);

    let spv = SpvTransaction::from_beef_hex(row.beef_hex.as_deref().unwrap_or_default())?;
    assert_eq!(spv.txid(), txid);
    assert_eq!(spv.merkle_path, Some(merkle_path(&txid)?));
    Ok(())
}

/// Handling the same callback twice leaves the row as after the first time
#[tokio::test]
async fn test_callback_is_idempotent() -> TestResult {
    let harness = Harness::new().await?;
    let txid = stored(&harness).await?.txid();
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());
    let info = mined_callback(&txid)?;

    service.handle(&harness.token, &info).await?;
    let once = reload(&harness, &txid).await?;
    service.handle(&harness.token, &info).await?;
    let twice = reload(&harness, &txid).await?;
    assert_eq!(once, twice);
    Ok(())
}

/// Paths that disagree with the callback or miss the transaction are refused
#[tokio::test]
async fn test_invalid_merkle_paths() -> TestResult {
    let harness = Harness::new().await?;
    let txid = stored(&harness).await?.txid();
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());

    let mut wrong_height = mined_callback(&txid)?;
    wrong_height.block_height = Some(BLOCK_HEIGHT + 1);
    let err = service.handle(&harness.token, &wrong_height).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MerklePathInvalid);

    let mut foreign_path = mined_callback(&txid)?;
    foreign_path.merkle_path = Some(merkle_path(&TxId::from_hex(OUTSIDER)?)?.to_hex());
    let err = service.handle(&harness.token, &foreign_path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MerklePathInvalid);

    let mut no_path = mined_callback(&txid)?;
    no_path.merkle_path = None;
    let err = service.handle(&harness.token, &no_path).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MerklePathInvalid);

    let mut garbage = mined_callback(&txid)?;
    garbage.merkle_path = Some("zz".to_string());
    let err = service.handle(&harness.token, &garbage).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MerklePathInvalid);

    assert_eq!(reload(&harness, &txid).await?.status, TxStatus::Broadcasted);
    Ok(())
}

/// Callbacks older than the row are dropped
#[tokio::test]
async fn test_out_of_order_callback_dropped() -> TestResult {
    let harness = Harness::new().await?;
    let txid = stored(&harness).await?.txid();
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());

    let mut stale = mined_callback(&txid)?;
    stale.timestamp = Utc::now() - Duration::hours(1);
    service.handle(&harness.token, &stale).await?;

    let row = reload(&harness, &txid).await?;
    assert_eq!(row.status, TxStatus::Broadcasted);
    assert!(row.raw_hex.is_some());
    Ok(())
}

/// Rejections mark the row problematic; in-flight statuses change nothing
#[tokio::test]
async fn test_status_only_callbacks() -> TestResult {
    let harness = Harness::new().await?;
    let txid = stored(&harness).await?.txid();
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());

    let mut seen = TxInfo::new(txid.to_hex(), ArcTxStatus::SeenOnNetwork);
    seen.timestamp = Utc::now() + Duration::minutes(1);
    service.handle(&harness.token, &seen).await?;
    assert_eq!(reload(&harness, &txid).await?.status, TxStatus::Broadcasted);

    let mut rejected = TxInfo::new(txid.to_hex(), ArcTxStatus::DoubleSpendAttempted);
    rejected.timestamp = Utc::now() + Duration::minutes(2);
    service.handle(&harness.token, &rejected).await?;
    let row = reload(&harness, &txid).await?;
    assert_eq!(row.status, TxStatus::Problematic);
    assert_eq!(row.updated_at, rejected.timestamp);
    Ok(())
}

/// Callbacks must name a known transaction
#[tokio::test]
async fn test_callback_identity() -> TestResult {
    let harness = Harness::new().await?;
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());

    let err = service
        .handle(&harness.token, &TxInfo::new("", ArcTxStatus::Mined))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCallback);

    let err = service
        .handle(&harness.token, &TxInfo::new("not-a-txid", ArcTxStatus::Mined))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidCallback);

    let unknown = mined_callback(&TxId::from_hex(OUTSIDER)?)?;
    let err = service.handle(&harness.token, &unknown).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
    Ok(())
}

/// Repository failures surface unchanged
#[tokio::test]
async fn test_repository_failures() -> TestResult {
    let repository = MockTransactionRepository::new();
    let tx = broadcasted_tx();
    let txid = tx.txid();
    repository
        .insert(TrackedTransaction::new(txid, TxStatus::Broadcasted).with_raw_hex(tx.to_hex()))
        .await;
    let service = CallbackSyncService::new(Arc::new(repository.clone()));
    let token = spv_wallet_core::TokioCancellationToken::new();

    repository
        .set_failure_mode(MockFailureModes {
            fail_on_get: true,
            fail_on_update: false,
        })
        .await;
    let err = service.handle(&token, &mined_callback(&txid)?).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    repository
        .set_failure_mode(MockFailureModes {
            fail_on_get: false,
            fail_on_update: true,
        })
        .await;
    let err = service.handle(&token, &mined_callback(&txid)?).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert_eq!(
        repository.get(&txid).await.map(|row| row.status),
        Some(TxStatus::Broadcasted)
    );

    repository.set_failure_mode(MockFailureModes::default()).await;
    service.handle(&token, &mined_callback(&txid)?).await?;
    assert_eq!(
        repository.get(&txid).await.map(|row| row.status),
        Some(TxStatus::Mined)
    );
    Ok(())
}

/// A callback body as ARC posts it
#[tokio::test]
async fn test_callback_from_json() -> TestResult {
    let harness = Harness::new().await?;
    let txid = stored(&harness).await?.txid();
    let body = serde_json::json!({
        "txid": txid.to_hex(),
        "txStatus": "MINED",
        "timestamp": (Utc::now() + Duration::minutes(5)).to_rfc3339(),
        "blockHash": BLOCK_HASH,
        "blockHeight": BLOCK_HEIGHT,
        "merklePath": merkle_path(&txid)?.to_hex(),
    });
    let info: TxInfo = serde_json::from_value(body)?;

    CallbackSyncService::new(harness.repositories.transactions.clone())
        .handle(&harness.token, &info)
        .await?;
    assert_eq!(reload(&harness, &txid).await?.status, TxStatus::Mined);
    Ok(())
}

/// A later MINED callback naming another block replaces the proof
#[tokio::test]
async fn test_reorg_overwrites_block() -> TestResult {
    let harness = Harness::new().await?;
    let txid = stored(&harness).await?.txid();
    let service = CallbackSyncService::new(harness.repositories.transactions.clone());
    service.handle(&harness.token, &mined_callback(&txid)?).await?;

    let other_hash = "0000000000000000021c6d1e5b8f9a4d7e3c2b1a0f9e8d7c6b5a493827160504";
    let mut moved = mined_callback(&txid)?;
    moved.block_hash = Some(other_hash.to_string());
    moved.timestamp = Utc::now() + Duration::minutes(30);
    service.handle(&harness.token, &moved).await?;

    let row = reload(&harness, &txid).await?;
    assert_eq!(row.status, TxStatus::Mined);
    assert_eq!(row.block_hash.as_deref(), Some(other_hash));
    assert_eq!(row.updated_at, moved.timestamp);
    Ok(())
}
