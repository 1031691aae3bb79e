//! Account registry and the account-switch protocol.
//!
//! The directory is a plain service object constructed once per process
//! with its collaborators injected; nothing in here is a global. Listeners
//! hold explicit subscription handles rather than weak references, and the
//! switch guard is an atomic compare-and-swap: a losing concurrent switch
//! request observes the flag and aborts without side effects.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::account::cache::AccountCache;
use crate::account::device::DeviceInfoProvider;
use crate::account::types::{Account, DisplayEmoji, KeyDescriptor, UserInfo, UserPrefix, WalletBinding};
use crate::client::{AccountKeyPayload, IdentityProvider, LoginEndpoint, LoginRequest};
use crate::crypto::DomainTag;
use crate::error::{ApiError, StorageError, SwitchError};
use crate::keystore::compat::{legacy_alias, KeyCompatibilityResolver};
use crate::keystore::legacy::LegacyKeyStore;
use crate::signer::{HardwareSigner, KeySigner, SeedSigner};
use crate::storage::Storage;

const REGISTERED_KEY: &str = "session_registered";
const SESSION_CACHE_PREFIX: &str = "session:";

#[derive(Clone, Debug)]
pub enum AccountEvent {
    AccountUpdated(Account),
    UserInfoUpdated(UserInfo),
    WalletUpdated(WalletBinding),
    /// The active-account context changed and dependent screens should
    /// rebuild from scratch.
    Relaunch,
}

/// Handle returned by [`AccountDirectory::subscribe`]; pass it back to
/// `unsubscribe` to stop receiving events.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

type Listener = Box<dyn Fn(&AccountEvent) + Send + Sync>;

#[derive(Default)]
struct DirectoryState {
    accounts: Vec<Account>,
    prefixes: Vec<UserPrefix>,
}

pub struct AccountDirectory {
    storage: Arc<Storage>,
    cache: Arc<AccountCache>,
    resolver: Arc<KeyCompatibilityResolver>,
    legacy: Arc<dyn LegacyKeyStore>,
    login: Arc<dyn LoginEndpoint>,
    identity: Arc<dyn IdentityProvider>,
    device: Arc<DeviceInfoProvider>,
    state: Mutex<DirectoryState>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_subscription: AtomicU64,
    switching: AtomicBool,
}

impl AccountDirectory {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<Storage>,
        cache: Arc<AccountCache>,
        resolver: Arc<KeyCompatibilityResolver>,
        legacy: Arc<dyn LegacyKeyStore>,
        login: Arc<dyn LoginEndpoint>,
        identity: Arc<dyn IdentityProvider>,
        device: Arc<DeviceInfoProvider>,
    ) -> Self {
        Self {
            storage,
            cache,
            resolver,
            legacy,
            login,
            identity,
            device,
            state: Mutex::new(DirectoryState::default()),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            switching: AtomicBool::new(false),
        }
    }

    /// Read the persisted collections and enforce the single-active
    /// invariant. When no account is flagged active the first one wins.
    pub fn load(&self) -> Result<(), StorageError> {
        let prefixes = self.cache.read_prefixes()?;
        let accounts = self.cache.read_accounts()?;

        let active = {
            let mut state = self.state.lock().expect("directory state poisoned");
            state.prefixes = prefixes;
            if accounts.is_empty() {
                debug!("no cached accounts; login or restore required");
                state.accounts = accounts;
                None
            } else {
                let active_username = accounts
                    .iter()
                    .find(|a| a.is_active)
                    .unwrap_or(&accounts[0])
                    .username()
                    .to_string();
                state.accounts = accounts;
                for account in &mut state.accounts {
                    account.is_active = account.username() == active_username;
                }
                state
                    .accounts
                    .iter()
                    .find(|a| a.is_active)
                    .cloned()
            }
        };

        if let Some(active) = active {
            info!("loaded account directory, active account: {}", active.username());
            self.notify(&AccountEvent::AccountUpdated(active));
        }
        Ok(())
    }

    pub fn list(&self) -> Vec<Account> {
        self.state
            .lock()
            .expect("directory state poisoned")
            .accounts
            .clone()
    }

    pub fn active(&self) -> Option<Account> {
        self.state
            .lock()
            .expect("directory state poisoned")
            .accounts
            .iter()
            .find(|a| a.is_active)
            .cloned()
    }

    /// Insert or replace an account by username and make it active. When a
    /// remote uid is supplied the prefix table is rewritten to bind it.
    pub fn upsert(&self, account: Account, uid: Option<&str>) {
        let mut account = account;
        account.is_active = true;
        refresh_display_metadata(&mut account);

        {
            let mut state = self.state.lock().expect("directory state poisoned");
            state
                .accounts
                .retain(|a| a.username() != account.username());
            for existing in &mut state.accounts {
                existing.is_active = false;
            }
            state.accounts.push(account.clone());

            if let (Some(prefix), Some(uid)) = (account.prefix.as_ref(), uid) {
                state.prefixes.retain(|p| p.user_id != uid);
                state.prefixes.push(UserPrefix {
                    user_id: uid.to_string(),
                    prefix: prefix.clone(),
                });
            }
            self.persist_locked(&state);
        }
        self.notify(&AccountEvent::AccountUpdated(account));
    }

    pub fn update_user_info(&self, user_info: UserInfo) {
        let updated = {
            let mut state = self.state.lock().expect("directory state poisoned");
            let Some(account) = state.accounts.iter_mut().find(|a| a.is_active) else {
                return;
            };
            account.user_info = user_info.clone();
            self.persist_locked(&state);
            true
        };
        if updated {
            self.notify(&AccountEvent::UserInfoUpdated(user_info));
        }
    }

    pub fn update_wallet_binding(&self, wallet: WalletBinding) {
        let updated = {
            let mut state = self.state.lock().expect("directory state poisoned");
            let Some(account) = state.accounts.iter_mut().find(|a| a.is_active) else {
                return;
            };
            account.wallet = Some(wallet.clone());
            refresh_display_metadata(account);
            self.persist_locked(&state);
            true
        };
        if updated {
            self.notify(&AccountEvent::WalletUpdated(wallet));
        }
    }

    pub fn update_evm_addresses(&self, addresses: std::collections::HashMap<String, String>) {
        let mut state = self.state.lock().expect("directory state poisoned");
        if let Some(account) = state.accounts.iter_mut().find(|a| a.is_active) {
            account.evm_addresses = Some(addresses);
            refresh_display_metadata(account);
            self.persist_locked(&state);
        }
    }

    pub fn update_display_emojis(&self, username: &str, emojis: Vec<DisplayEmoji>) {
        let mut state = self.state.lock().expect("directory state poisoned");
        if let Some(account) = state
            .accounts
            .iter_mut()
            .find(|a| a.username() == username)
        {
            account.display_emojis = Some(emojis);
            self.persist_locked(&state);
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AccountEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .expect("listener registry poisoned")
            .push((id, Box::new(listener)));
        Subscription { id }
    }

    pub fn unsubscribe(&self, subscription: Subscription) {
        self.listeners
            .lock()
            .expect("listener registry poisoned")
            .retain(|(id, _)| *id != subscription.id);
    }

    fn notify(&self, event: &AccountEvent) {
        let listeners = self.listeners.lock().expect("listener registry poisoned");
        for (_, listener) in listeners.iter() {
            listener(event);
        }
    }

    /// Switch the active account.
    ///
    /// Runs the full challenge-response protocol unless the target is
    /// already active, in which case the session caches are still reset
    /// and exactly one relaunch notification goes out. Returns one boolean
    /// outcome; the specific failure kind is only logged. No retries.
    pub async fn switch(&self, username: &str) -> bool {
        let target = {
            let state = self.state.lock().expect("directory state poisoned");
            state
                .accounts
                .iter()
                .find(|a| a.username() == username)
                .cloned()
        };
        let Some(account) = target else {
            warn!("switch requested for unknown account '{username}'");
            return false;
        };

        if account.is_active {
            debug!("account '{username}' already active; relaunching without a new login");
            self.clear_session_caches();
            self.notify(&AccountEvent::Relaunch);
            return true;
        }

        if self
            .switching
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("a switch is already in flight; dropping request for '{username}'");
            return false;
        }

        let outcome = self.switch_inner(&account).await;
        let success = match outcome {
            Ok(()) => {
                self.commit_switch(&account).await;
                info!("switched active account to '{username}'");
                true
            }
            Err(e) => {
                warn!("account switch to '{username}' failed: {e}");
                false
            }
        };
        self.switching.store(false, Ordering::SeqCst);
        success
    }

    async fn switch_inner(&self, account: &Account) -> Result<(), SwitchError> {
        // A clean challenge needs a fresh anonymous identity session.
        if !self.identity.is_anonymous().await {
            self.identity.sign_out().await;
            self.identity
                .sign_in_anonymously()
                .await
                .map_err(|_| SwitchError::SetAnonymousFailed)?;
        }

        let signer = self
            .signer_for(account)
            .ok_or(SwitchError::SignerResolution)?;
        debug!(
            "resolved signer for '{}': sign={} hash={} weight={}",
            account.username(),
            signer.signature_algorithm(),
            signer.hash_algorithm(),
            signer.key_weight()
        );

        // Forced refresh: the challenge must never be signed over a stale
        // cached token.
        let token = self.identity.id_token(true).await?;
        let signature = signer.sign_with_tag(token.as_bytes(), DomainTag::User)?;
        let request = LoginRequest {
            signature,
            account_key: AccountKeyPayload {
                public_key: signer.public_key_hex()?,
                hash_algo: signer.hash_algorithm().wire_index(),
                sign_algo: signer.signature_algorithm().wire_index(),
                weight: signer.key_weight(),
            },
            device_info: self.device.info(),
        };

        let response = self.login.login(&request).await.map_err(|e| match e {
            ApiError::LoginRejected => SwitchError::RemoteLoginRejected,
            other => SwitchError::Transport(other.to_string()),
        })?;

        let exchange_token = response
            .custom_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(SwitchError::MissingExchangeToken)?;
        self.identity
            .exchange_custom_token(&exchange_token)
            .await
            .map_err(|e| SwitchError::IdentityExchangeFailed(e.to_string()))?;

        self.set_registered();
        Ok(())
    }

    async fn commit_switch(&self, account: &Account) {
        let uid = self.identity.current_uid().await;
        let updated = {
            let mut state = self.state.lock().expect("directory state poisoned");
            for existing in &mut state.accounts {
                existing.is_active = existing.username() == account.username();
            }
            if let Some(target) = state
                .accounts
                .iter_mut()
                .find(|a| a.username() == account.username())
            {
                refresh_display_metadata(target);
            }
            if let (Some(prefix), Some(uid)) = (account.prefix.as_ref(), uid.as_ref()) {
                state.prefixes.retain(|p| &p.user_id != uid);
                state.prefixes.push(UserPrefix {
                    user_id: uid.clone(),
                    prefix: prefix.clone(),
                });
            }
            self.persist_locked(&state);
            state
                .accounts
                .iter()
                .find(|a| a.username() == account.username())
                .cloned()
        };

        self.clear_session_caches();
        if let Some(updated) = updated {
            self.notify(&AccountEvent::AccountUpdated(updated));
        }
        self.notify(&AccountEvent::Relaunch);
    }

    /// Drop the active account entirely: reset the identity session to
    /// anonymous, remove the account and its prefix binding, and relaunch.
    pub async fn remove_active(&self) -> bool {
        let removed = {
            let mut state = self.state.lock().expect("directory state poisoned");
            let Some(index) = state.accounts.iter().position(|a| a.is_active) else {
                debug!("no active account to remove");
                return false;
            };
            let account = state.accounts.remove(index);
            if let Some(wallet) = &account.wallet {
                let wallet_id = wallet.id.clone();
                state.prefixes.retain(|p| p.user_id != wallet_id);
            }
            self.persist_locked(&state);
            account
        };
        info!("removed account '{}'", removed.username());

        self.identity.sign_out().await;
        if let Err(e) = self.identity.sign_in_anonymously().await {
            warn!("could not re-establish anonymous session after removal: {e}");
        }
        self.clear_registered();
        self.clear_session_caches();
        self.notify(&AccountEvent::Relaunch);
        true
    }

    fn signer_for(&self, account: &Account) -> Option<Box<dyn KeySigner>> {
        match account.key_descriptor()? {
            KeyDescriptor::RawKeyRef { .. } => {
                // The prefix doubles as the store password.
                let prefix = account.prefix.as_deref()?;
                if let Some(signer) = self.resolver.resolve(prefix, prefix) {
                    return Some(Box::new(signer));
                }
                // A hardware-bound legacy key cannot be migrated but is
                // still usable in place.
                let alias = legacy_alias(prefix);
                if self.legacy.contains(&alias) {
                    return HardwareSigner::new(self.legacy.clone(), &alias)
                        .ok()
                        .map(|s| Box::new(s) as Box<dyn KeySigner>);
                }
                None
            }
            KeyDescriptor::LegacyHardwareRef { alias } => {
                HardwareSigner::new(self.legacy.clone(), &alias)
                    .ok()
                    .map(|s| Box::new(s) as Box<dyn KeySigner>)
            }
            KeyDescriptor::DerivedRef {
                mnemonic,
                derivation_path,
                ..
            } => SeedSigner::with_path(&mnemonic, &derivation_path)
                .ok()
                .map(|s| Box::new(s) as Box<dyn KeySigner>),
        }
    }

    fn persist_locked(&self, state: &DirectoryState) {
        if let Err(e) = self.cache.write_accounts(&state.accounts) {
            warn!("failed to persist accounts: {e}");
        }
        if let Err(e) = self.cache.write_prefixes(&state.prefixes) {
            warn!("failed to persist user prefixes: {e}");
        }
    }

    fn set_registered(&self) {
        if let Err(e) = self.storage.put(REGISTERED_KEY, &true) {
            warn!("failed to persist registration flag: {e}");
        }
    }

    fn clear_registered(&self) {
        let _ = self.storage.remove(REGISTERED_KEY);
    }

    pub fn is_registered(&self) -> bool {
        self.storage
            .get::<bool>(REGISTERED_KEY)
            .ok()
            .flatten()
            .unwrap_or(false)
    }

    /// Per-user derived caches live under a session namespace; they are
    /// invalid the moment the active account changes.
    fn clear_session_caches(&self) {
        for key in self.storage.keys_with_prefix(SESSION_CACHE_PREFIX) {
            let _ = self.storage.remove(&key);
        }
    }
}

const EMOJI_PALETTE: [(&str, &str); 8] = [
    ("🦊", "Fox"),
    ("🐼", "Panda"),
    ("🦁", "Lion"),
    ("🐸", "Frog"),
    ("🐙", "Octopus"),
    ("🦉", "Owl"),
    ("🐧", "Penguin"),
    ("🐳", "Whale"),
];

/// Make sure every bound address has display metadata, keeping whatever
/// the user already picked.
fn refresh_display_metadata(account: &mut Account) {
    let mut addresses: Vec<String> = Vec::new();
    if let Some(wallet) = &account.wallet {
        addresses.extend(wallet.networks.values().cloned());
    }
    if let Some(evm) = &account.evm_addresses {
        addresses.extend(evm.values().cloned());
    }
    if addresses.is_empty() {
        return;
    }

    let mut emojis = account.display_emojis.take().unwrap_or_default();
    for address in addresses {
        if emojis.iter().any(|e| e.address == address) {
            continue;
        }
        let index = address.as_bytes().iter().map(|&b| b as usize).sum::<usize>()
            % EMOJI_PALETTE.len();
        let (emoji, name) = EMOJI_PALETTE[index];
        emojis.push(DisplayEmoji {
            address,
            emoji: emoji.to_string(),
            name: name.to_string(),
        });
    }
    account.display_emojis = Some(emojis);
}
