//! Outline building end to end: output specs, funding, fee and change

mod common;

use common::{foreign_script, Harness, TestResult};
use spv_wallet_core::{
    bsv::{
        address::Address,
        spv::SpvTransaction,
        transaction::{Transaction, TxOutput},
    },
    data_structures::Bucket,
    errors::ErrorKind,
    fee::{FeeUnit, ESTIMATED_P2PKH_INPUT_SIZE},
    key_management::derive_address,
    outlines::{plan_change, OutlineFormat, PaymailOutputSpec},
    paymail::{P2pDestinations, PaymentOutput},
    storage::AddressRepository,
    OutputSpec, TransactionSpec,
};

/// One satoshi to an external paymail from a single 10 satoshi UTXO
#[tokio::test]
async fn test_minimal_paymail_outline() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    let funding = harness.fund(&user, &[10]).await?;
    let script = foreign_script(9);
    harness
        .external_recipient("bob@example.com", 1, &script, "R")
        .await;

    let outline = harness
        .outlines(FeeUnit::new(1, 1000))
        .create_raw(
            &harness.token,
            &TransactionSpec::new(&user.id, vec![OutputSpec::paymail("bob@example.com", 1)]),
        )
        .await?;
    assert_eq!(outline.format, OutlineFormat::Raw);

    let tx = Transaction::from_hex(&outline.hex)?;
    assert_eq!(tx.inputs.len(), 1);
    assert_eq!(tx.inputs[0].source_txid, funding.txid());
    assert_eq!(tx.inputs[0].source_vout, 0);

    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(tx.outputs[0].satoshis, 1);
    assert_eq!(tx.outputs[0].locking_script, script);
    let paymail = outline.annotations.outputs[&0]
        .paymail
        .clone()
        .expect("paymail annotation");
    assert_eq!(paymail.sender, "alice@example.com");
    assert_eq!(paymail.receiver, "bob@example.com");
    assert_eq!(paymail.reference, "R");

    // 192 bytes without change, 226 with it: one satoshi either way
    assert_eq!(tx.outputs[1].satoshis, 8);
    let change = &outline.annotations.outputs[&1];
    assert_eq!(change.bucket, Bucket::Bsv);
    let instructions = change
        .custom_instructions
        .clone()
        .expect("change instructions");
    let expected = derive_address(&user.public, &instructions)?;
    assert_eq!(
        Address::from_locking_script(&tx.outputs[1].locking_script),
        Some(expected.clone())
    );

    let saved = harness
        .repositories
        .addresses
        .find_addresses(&harness.token, &[expected.to_string()])
        .await?;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].user_id, user.id);
    assert_eq!(saved[0].custom_instructions, instructions);
    Ok(())
}

/// String pushes become an OP_FALSE OP_RETURN output without value
#[tokio::test]
async fn test_data_outline() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    harness.fund(&user, &[10]).await?;

    let outline = harness
        .outlines(FeeUnit::default())
        .create_raw(
            &harness.token,
            &TransactionSpec::new(&user.id, vec![OutputSpec::strings(["Example", " ", "data"])]),
        )
        .await?;

    let tx = Transaction::from_hex(&outline.hex)?;
    assert_eq!(
        tx.outputs[0].locking_script.to_hex(),
        "006a074578616d706c6501200464617461"
    );
    assert_eq!(tx.outputs[0].satoshis, 0);
    assert_eq!(outline.annotations.outputs[&0].bucket, Bucket::Data);
    assert_eq!(tx.outputs.len(), 2);
    assert_eq!(tx.outputs[1].satoshis, 9);
    Ok(())
}

/// A host that splits by itself cannot serve a split request
#[tokio::test]
async fn test_split_rejected_when_host_splits() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    harness.fund(&user, &[100]).await?;
    harness
        .paymail
        .add_destinations(
            "bob@example.com",
            P2pDestinations {
                outputs: vec![
                    PaymentOutput {
                        address: None,
                        satoshis: 3,
                        script: foreign_script(9).to_hex(),
                    },
                    PaymentOutput {
                        address: None,
                        satoshis: 3,
                        script: foreign_script(10).to_hex(),
                    },
                ],
                reference: "R".to_string(),
            },
        )
        .await;

    let spec = TransactionSpec::new(
        &user.id,
        vec![OutputSpec::Paymail(PaymailOutputSpec {
            to: "bob@example.com".to_string(),
            satoshis: 6,
            splits: Some(2),
            from: None,
        })],
    );
    let err = harness
        .outlines(FeeUnit::default())
        .create_raw(&harness.token, &spec)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::HostCannotSplitWhenRecipientSplitting);
    Ok(())
}

/// A single host output is split into equal outputs sharing one annotation
#[tokio::test]
async fn test_split_into_equal_outputs() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    harness.fund(&user, &[100]).await?;
    harness
        .external_recipient("bob@example.com", 6, &foreign_script(9), "R")
        .await;

    let spec = TransactionSpec::new(
        &user.id,
        vec![OutputSpec::Paymail(PaymailOutputSpec {
            to: "bob@example.com".to_string(),
            satoshis: 6,
            splits: Some(3),
            from: None,
        })],
    );
    let outline = harness
        .outlines(FeeUnit::default())
        .create_raw(&harness.token, &spec)
        .await?;

    let tx = Transaction::from_hex(&outline.hex)?;
    for vout in 0..3u32 {
        assert_eq!(tx.outputs[vout as usize].satoshis, 2);
        assert_eq!(tx.outputs[vout as usize].locking_script, foreign_script(9));
        assert_eq!(
            outline.annotations.outputs[&vout]
                .paymail
                .as_ref()
                .map(|p| p.reference.as_str()),
            Some("R")
        );
    }
    Ok(())
}

/// Splits must divide the amount
#[tokio::test]
async fn test_splits_must_divide_satoshis() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    harness.fund(&user, &[100]).await?;

    let spec = TransactionSpec::new(
        &user.id,
        vec![OutputSpec::Paymail(PaymailOutputSpec {
            to: "bob@example.com".to_string(),
            satoshis: 7,
            splits: Some(2),
            from: None,
        })],
    );
    let err = harness
        .outlines(FeeUnit::default())
        .create_raw(&harness.token, &spec)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SplitsMustDivideSatoshis);
    Ok(())
}

/// The sender must own the `from` paymail, or have a default one
#[tokio::test]
async fn test_sender_paymail_rules() -> TestResult {
    let harness = Harness::new().await?;
    let alice = harness.create_user(1, &["alice@example.com"]).await?;
    let nameless = harness.create_user(2, &[]).await?;
    harness.create_user(3, &["carol@example.com"]).await?;
    harness.fund(&alice, &[100]).await?;
    harness.fund(&nameless, &[100]).await?;
    harness
        .external_recipient("bob@example.com", 5, &foreign_script(9), "R")
        .await;
    let outlines = harness.outlines(FeeUnit::default());

    let not_owned = TransactionSpec::new(
        &alice.id,
        vec![OutputSpec::Paymail(PaymailOutputSpec {
            to: "bob@example.com".to_string(),
            satoshis: 5,
            splits: None,
            from: Some("carol@example.com".to_string()),
        })],
    );
    let err = outlines.create_raw(&harness.token, &not_owned).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SenderPaymailNotOwned);

    let no_default =
        TransactionSpec::new(&nameless.id, vec![OutputSpec::paymail("bob@example.com", 5)]);
    let err = outlines.create_raw(&harness.token, &no_default).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SenderPaymailAddressNoDefault);
    Ok(())
}

/// Paying a paymail served by this wallet derives a destination of the receiver
#[tokio::test]
async fn test_outline_to_local_paymail() -> TestResult {
    let harness = Harness::new().await?;
    let alice = harness.create_user(1, &["alice@example.com"]).await?;
    let bob = harness.create_user(2, &["bob@example.com"]).await?;
    harness.fund(&alice, &[50]).await?;

    let outline = harness
        .outlines(FeeUnit::default())
        .create_raw(
            &harness.token,
            &TransactionSpec::new(&alice.id, vec![OutputSpec::paymail("bob@example.com", 20)]),
        )
        .await?;

    let tx = Transaction::from_hex(&outline.hex)?;
    let address = Address::from_locking_script(&tx.outputs[0].locking_script)
        .expect("P2PKH destination");
    let saved = harness
        .repositories
        .addresses
        .find_addresses(&harness.token, &[address.to_string()])
        .await?;
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].user_id, bob.id);
    Ok(())
}

/// Decoding an outline yields the inputs and outputs its annotations describe
#[tokio::test]
async fn test_outline_matches_annotations() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    harness.fund(&user, &[7, 8, 9]).await?;
    harness
        .external_recipient("bob@example.com", 15, &foreign_script(9), "R")
        .await;
    let unit = FeeUnit::new(1, 100);

    let outline = harness
        .outlines(unit)
        .create_raw(
            &harness.token,
            &TransactionSpec::new(
                &user.id,
                vec![
                    OutputSpec::paymail("bob@example.com", 15),
                    OutputSpec::strings(["memo"]),
                ],
            ),
        )
        .await?;

    let tx = Transaction::from_hex(&outline.hex)?;
    assert_eq!(tx.inputs.len(), outline.annotations.inputs.len());
    assert_eq!(tx.outputs.len(), outline.annotations.outputs.len());

    for (index, input) in tx.inputs.iter().enumerate() {
        let annotation = &outline.annotations.inputs[&(index as u32)];
        assert_eq!(annotation.outpoint.tx_id, input.source_txid);
        assert_eq!(annotation.outpoint.vout, input.source_vout);
    }

    let inputs: u64 = outline.annotations.inputs.values().map(|a| a.satoshis).sum();
    let outputs = tx.total_output_satoshis();
    assert!(inputs > outputs);
    let paid: Vec<TxOutput> = tx
        .outputs
        .iter()
        .enumerate()
        .filter(|(vout, _)| {
            outline.annotations.outputs[&(*vout as u32)]
                .custom_instructions
                .is_none()
        })
        .map(|(_, output)| output.clone())
        .collect();
    let input_sizes = vec![ESTIMATED_P2PKH_INPUT_SIZE; tx.inputs.len()];
    let plan = plan_change(&input_sizes, inputs, &paid, unit)?;
    assert_eq!(inputs - outputs, plan.fee());
    Ok(())
}

/// BEEF outlines carry the proven funding transaction
#[tokio::test]
async fn test_outline_with_proofs() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    let funding = harness.fund(&user, &[10]).await?;

    let outline = harness
        .outlines(FeeUnit::default())
        .create_with_proofs(
            &harness.token,
            &TransactionSpec::new(&user.id, vec![OutputSpec::strings(["proof"])]),
        )
        .await?;
    assert_eq!(outline.format, OutlineFormat::Beef);

    let spv = SpvTransaction::from_beef_hex(&outline.hex)?;
    let ancestor = spv
        .ancestors
        .get(&funding.txid())
        .expect("funding transaction attached");
    assert!(ancestor.is_mined());
    assert!(spv.missing_sources().is_empty());
    Ok(())
}

/// Outlines need a user and at least one output
#[tokio::test]
async fn test_outline_validation() -> TestResult {
    let harness = Harness::new().await?;
    let user = harness.create_user(1, &["alice@example.com"]).await?;
    let outlines = harness.outlines(FeeUnit::default());

    let err = outlines
        .create_raw(&harness.token, &TransactionSpec::new(&user.id, Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRequired);

    let err = outlines
        .create_raw(
            &harness.token,
            &TransactionSpec::new("", vec![OutputSpec::strings(["x"])]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationRequired);
    Ok(())
}
