//! Account registry and the account-switch protocol.
//!
//! - Known accounts and the single active account
//! - Persisted account/prefix caches
//! - The challenge-response switch protocol against the remote identity
//!   service

pub mod cache;
pub mod device;
pub mod directory;
pub mod types;

pub use cache::AccountCache;
pub use device::DeviceInfoProvider;
pub use directory::{AccountDirectory, AccountEvent, Subscription};
pub use types::{Account, KeyDescriptor, UserInfo, UserPrefix, WalletBinding};
