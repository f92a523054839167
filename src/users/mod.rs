//! Users and their paymails

use std::sync::Arc;

use chrono::Utc;
use secp256k1::PublicKey;
use tracing::info;

use crate::{
    bsv::address::Address,
    cancellation::TokioCancellationToken,
    data_structures::{NewPaymail, Paymail, PaymailAddress, User},
    errors::{WalletError, WalletResult},
    key_management::public_key_from_hex,
    storage::{PaymailRepository, UserRepository},
};

/// Paymail requested together with a new user
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PaymailRequest {
    pub address: String,
    pub public_name: String,
    pub avatar: String,
}

impl PaymailRequest {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

#[derive(Clone)]
pub struct UsersService {
    users: Arc<dyn UserRepository>,
    paymails: Arc<dyn PaymailRepository>,
    /// Domains paymails may be created on; empty accepts any domain
    domains: Vec<String>,
}

impl UsersService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        paymails: Arc<dyn PaymailRepository>,
        domains: Vec<String>,
    ) -> Self {
        Self {
            users,
            paymails,
            domains: domains.into_iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    /// Create a user from a public key; an existing user with the same key is
    /// returned unchanged, but the requested paymails are still added
    pub async fn create_user(
        &self,
        token: &TokioCancellationToken,
        pub_key_hex: &str,
        paymails: &[PaymailRequest],
    ) -> WalletResult<User> {
        let pub_key = public_key_from_hex(pub_key_hex)
            .map_err(|e| WalletError::ValidationRequired(format!("invalid public key: {e}")))?;
        let now = Utc::now();
        let user = User {
            id: Address::from_public_key(&pub_key).to_string(),
            pub_key: hex::encode(pub_key.serialize()),
            created_at: now,
            updated_at: now,
        };

        let parsed = paymails
            .iter()
            .map(|request| self.parse_paymail(&request.address))
            .collect::<WalletResult<Vec<_>>>()?;

        let user = self.users.create_user(token, &user).await?;
        for (request, address) in paymails.iter().zip(parsed) {
            self.insert_paymail(token, &user.id, address, request).await?;
        }

        info!(user_id = %user.id, paymails = paymails.len(), "User created");
        Ok(user)
    }

    pub async fn get_user(&self, token: &TokioCancellationToken, user_id: &str) -> WalletResult<User> {
        self.users
            .get_user(token, user_id)
            .await?
            .ok_or_else(|| WalletError::UserNotFound(user_id.to_string()))
    }

    pub async fn add_paymail(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        request: &PaymailRequest,
    ) -> WalletResult<Paymail> {
        let address = self.parse_paymail(&request.address)?;
        self.get_user(token, user_id).await?;
        self.insert_paymail(token, user_id, address, request).await
    }

    /// First paymail created for the user
    pub async fn default_paymail(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Option<Paymail>> {
        self.paymails.default_paymail(token, user_id).await
    }

    pub async fn pubkey(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<PublicKey> {
        let user = self.get_user(token, user_id).await?;
        public_key_from_hex(&user.pub_key)
    }

    /// Whether `paymail` exists and belongs to the user
    pub async fn has_paymail(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        paymail: &PaymailAddress,
    ) -> WalletResult<bool> {
        Ok(self
            .paymails
            .find_paymail(token, paymail.alias(), paymail.domain())
            .await?
            .is_some_and(|p| p.user_id == user_id))
    }

    pub async fn find_paymail(
        &self,
        token: &TokioCancellationToken,
        paymail: &PaymailAddress,
    ) -> WalletResult<Option<Paymail>> {
        self.paymails
            .find_paymail(token, paymail.alias(), paymail.domain())
            .await
    }

    fn parse_paymail(&self, raw: &str) -> WalletResult<PaymailAddress> {
        let address = PaymailAddress::parse(raw)?;
        if !self.domains.is_empty() && !self.domains.iter().any(|d| d == address.domain()) {
            return Err(WalletError::ValidationRequired(format!(
                "paymail domain {} is not served by this wallet",
                address.domain()
            )));
        }
        Ok(address)
    }

    async fn insert_paymail(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        address: PaymailAddress,
        request: &PaymailRequest,
    ) -> WalletResult<Paymail> {
        if let Some(existing) = self.find_paymail(token, &address).await? {
            if existing.user_id == user_id {
                return Ok(existing);
            }
        }
        let public_name = if request.public_name.is_empty() {
            address.alias().to_string()
        } else {
            request.public_name.clone()
        };
        self.paymails
            .add_paymail(
                token,
                &NewPaymail {
                    user_id: user_id.to_string(),
                    address,
                    public_name,
                    avatar: request.avatar.clone(),
                },
            )
            .await
    }
}
