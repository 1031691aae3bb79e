//! Account data model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::crypto::SignatureAlgorithm;
use crate::keystore::compat::current_key_id;
use crate::signer::derived::DEFAULT_DERIVATION_PATH;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserInfo {
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// Wallet handle bound to an account: a remote wallet id plus one address
/// per network.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WalletBinding {
    pub id: String,
    pub networks: HashMap<String, String>,
}

impl WalletBinding {
    /// The mainnet address when present, otherwise any bound address.
    pub fn primary_address(&self) -> Option<&str> {
        self.networks
            .get("mainnet")
            .or_else(|| self.networks.values().next())
            .map(|s| s.as_str())
    }
}

/// Display metadata derived per wallet address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DisplayEmoji {
    pub address: String,
    pub emoji: String,
    pub name: String,
}

/// One known account. Owned exclusively by the directory; mutated only
/// through its update methods. At most one account is active at a time and
/// usernames are unique.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Account {
    pub user_info: UserInfo,
    pub is_active: bool,
    pub wallet: Option<WalletBinding>,
    /// Identifies a password-derived key in the current store; the prefix
    /// doubles as the store password for these accounts.
    pub prefix: Option<String>,
    pub evm_addresses: Option<HashMap<String, String>>,
    pub display_emojis: Option<Vec<DisplayEmoji>>,
    /// Serialized key descriptor for accounts whose key is not
    /// prefix-addressed (hardware aliases, seed phrases).
    pub key_blob: Option<String>,
}

impl Account {
    pub fn username(&self) -> &str {
        &self.user_info.username
    }

    /// Re-derive the key descriptor for this account. Never persisted in
    /// this form; the blob and prefix fields are the source of truth.
    pub fn key_descriptor(&self) -> Option<KeyDescriptor> {
        if let Some(blob) = &self.key_blob {
            return match serde_json::from_str::<KeyBlob>(blob) {
                Ok(KeyBlob::HardwareAlias { alias }) => {
                    Some(KeyDescriptor::LegacyHardwareRef { alias })
                }
                Ok(KeyBlob::SeedPhrase {
                    mnemonic,
                    derivation_path,
                }) => Some(KeyDescriptor::DerivedRef {
                    mnemonic,
                    derivation_path: derivation_path
                        .unwrap_or_else(|| DEFAULT_DERIVATION_PATH.to_string()),
                    curve: SignatureAlgorithm::EcdsaSecp256k1,
                }),
                Err(_) => None,
            };
        }
        let prefix = self.prefix.as_deref().filter(|p| !p.trim().is_empty())?;
        Some(KeyDescriptor::RawKeyRef {
            key_id: current_key_id(prefix),
            password: prefix.to_string(),
        })
    }
}

/// Mapping from a remote user id to the local key prefix it signs with.
/// Rewritten wholesale whenever any entry changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UserPrefix {
    pub user_id: String,
    pub prefix: String,
}

/// How to obtain a signer for an account. Derived on demand from
/// `Account.prefix` / `Account.key_blob`.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyDescriptor {
    RawKeyRef {
        key_id: String,
        password: String,
    },
    LegacyHardwareRef {
        alias: String,
    },
    DerivedRef {
        mnemonic: String,
        derivation_path: String,
        curve: SignatureAlgorithm,
    },
}

/// Persisted form of the non-prefix key descriptors.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyBlob {
    HardwareAlias {
        alias: String,
    },
    SeedPhrase {
        mnemonic: String,
        derivation_path: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_account() -> Account {
        Account {
            user_info: UserInfo {
                username: "alice".into(),
                nickname: None,
                avatar: None,
            },
            is_active: false,
            wallet: None,
            prefix: None,
            evm_addresses: None,
            display_emojis: None,
            key_blob: None,
        }
    }

    #[test]
    fn test_prefix_account_descriptor() {
        let mut account = base_account();
        account.prefix = Some("abc123".into());

        assert_eq!(
            account.key_descriptor(),
            Some(KeyDescriptor::RawKeyRef {
                key_id: "prefix_key_abc123".into(),
                password: "abc123".into(),
            })
        );
    }

    #[test]
    fn test_blank_prefix_has_no_descriptor() {
        let mut account = base_account();
        account.prefix = Some("   ".into());
        assert_eq!(account.key_descriptor(), None);
    }

    #[test]
    fn test_key_blob_takes_precedence_over_prefix() {
        let mut account = base_account();
        account.prefix = Some("abc".into());
        account.key_blob =
            Some(r#"{"type":"hardware_alias","alias":"user_keystore_old"}"#.into());

        assert_eq!(
            account.key_descriptor(),
            Some(KeyDescriptor::LegacyHardwareRef {
                alias: "user_keystore_old".into()
            })
        );
    }

    #[test]
    fn test_seed_blob_defaults_derivation_path() {
        let mut account = base_account();
        account.key_blob = Some(r#"{"type":"seed_phrase","mnemonic":"a b c"}"#.into());

        match account.key_descriptor() {
            Some(KeyDescriptor::DerivedRef {
                derivation_path, ..
            }) => assert_eq!(derivation_path, DEFAULT_DERIVATION_PATH),
            other => panic!("unexpected descriptor: {other:?}"),
        }
    }

    #[test]
    fn test_primary_address_prefers_mainnet() {
        let mut networks = HashMap::new();
        networks.insert("testnet".to_string(), "0xt".to_string());
        networks.insert("mainnet".to_string(), "0xm".to_string());
        let binding = WalletBinding {
            id: "w1".into(),
            networks,
        };
        assert_eq!(binding.primary_address(), Some("0xm"));
    }
}
