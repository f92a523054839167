//! Server side of incoming P2P payments
//!
//! When an external sender asks for destinations, a fresh key is derived from
//! the paymail's PKI key and its address is stored, so the recorder recognises
//! the output once the sender delivers the signed transaction.

use std::sync::Arc;

use secp256k1::PublicKey;
use tracing::debug;

use crate::{
    bsv::address::Address,
    cancellation::TokioCancellationToken,
    data_structures::{Paymail, PaymailAddress, WalletAddress},
    errors::{WalletError, WalletResult},
    key_management::{type42, CustomInstruction, CustomInstructions},
    paymail::{P2pDestinations, PaymentOutput},
    storage::AddressRepository,
    users::UsersService,
};

#[derive(Clone)]
pub struct PaymailDestinationService {
    users: UsersService,
    addresses: Arc<dyn AddressRepository>,
}

impl PaymailDestinationService {
    pub fn new(users: UsersService, addresses: Arc<dyn AddressRepository>) -> Self {
        Self { users, addresses }
    }

    /// PKI key of a paymail served by this wallet
    pub async fn pki(
        &self,
        token: &TokioCancellationToken,
        paymail: &PaymailAddress,
    ) -> WalletResult<PublicKey> {
        let (_, pki) = self.paymail_with_pki(token, paymail).await?;
        Ok(pki)
    }

    pub async fn create_destination(
        &self,
        token: &TokioCancellationToken,
        paymail: &PaymailAddress,
        satoshis: u64,
    ) -> WalletResult<P2pDestinations> {
        let (model, pki) = self.paymail_with_pki(token, paymail).await?;

        let reference = type42::random_reference();
        let instructions = CustomInstructions::new(vec![
            CustomInstruction::type42(type42::paymail_pki_invoice(&model.alias, &model.domain)),
            CustomInstruction::type42(type42::destination_invoice(&reference)),
        ]);
        let destination_key = type42::derive_child(&pki, &type42::destination_invoice(&reference))?;
        let address = Address::from_public_key(&destination_key);

        self.addresses
            .save_address(
                token,
                &WalletAddress::new(address.to_string(), model.user_id.clone(), instructions),
            )
            .await?;

        debug!(
            paymail = %paymail,
            user_id = %model.user_id,
            address = %address,
            "Paymail destination created"
        );

        Ok(P2pDestinations {
            outputs: vec![PaymentOutput {
                address: Some(address.to_string()),
                satoshis,
                script: address.locking_script().to_hex(),
            }],
            reference,
        })
    }

    async fn paymail_with_pki(
        &self,
        token: &TokioCancellationToken,
        paymail: &PaymailAddress,
    ) -> WalletResult<(Paymail, PublicKey)> {
        let model = self
            .users
            .find_paymail(token, paymail)
            .await?
            .ok_or_else(|| WalletError::PaymailNotFound(paymail.to_string()))?;
        let user_key = self.users.pubkey(token, &model.user_id).await?;
        let pki = type42::derive_child(
            &user_key,
            &type42::paymail_pki_invoice(&model.alias, &model.domain),
        )?;
        Ok((model, pki))
    }
}
