use thiserror::Error;

/// Failures raised by the key stores, signers and the migration sweep.
///
/// The compatibility resolver and the migration coordinator never let these
/// escape to the switch protocol; they are logged and collapsed into a
/// not-found / false outcome at that boundary.
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("entry '{alias}' is not an EC private key (found: {kind})")]
    UnsupportedKeyType { alias: String, kind: String },
    #[error("private key has unexpected size: {actual} bytes (expected {expected})")]
    InvalidKeySize { actual: usize, expected: usize },
    #[error("hardware store access failed for '{alias}': {reason}")]
    HardwareAccess { alias: String, reason: String },
    #[error("key '{0}' is hardware-bound and cannot be exported")]
    NonExportable(String),
    #[error("wrong password for key '{0}'")]
    WrongPassword(String),
    #[error("migrated key '{0}' failed verification: no public key could be derived")]
    MigrationVerification(String),
    #[error("failed to store migrated key '{0}': {1}")]
    MigrationStorage(String, String),
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("key store operation failed: {0}")]
    StoreFailure(String),
    #[error("invalid seed phrase: {0}")]
    InvalidSeedPhrase(String),
    #[error("key derivation failed for path '{0}'")]
    DerivationFailed(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Strict signature-codec failures. Only surfaced by the `try_` variants;
/// the best-effort codec entry points fall back instead of raising.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed DER signature: {0}")]
    MalformedDer(&'static str),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Remote login endpoint failures. A 404 is a semantic response (the server
/// does not recognise the public key / the signature failed verification),
/// everything else is transport-level.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("remote login rejected the public key (404)")]
    LoginRejected,
    #[error("remote endpoint returned status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Transport(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("anonymous sign-in failed: {0}")]
    AnonymousSignIn(String),
    #[error("identity token retrieval failed: {0}")]
    Token(String),
    #[error("custom token exchange failed: {0}")]
    Exchange(String),
}

/// Internal taxonomy of account-switch failures. The caller of `switch`
/// only ever sees a boolean; the specific kind is preserved in the logs.
#[derive(Error, Debug)]
pub enum SwitchError {
    #[error("could not establish an anonymous identity session")]
    SetAnonymousFailed,
    #[error("no signer could be resolved for the target account")]
    SignerResolution,
    #[error("identity token retrieval failed: {0}")]
    TokenRetrieval(#[from] IdentityError),
    #[error("challenge signing failed: {0}")]
    ChallengeSigning(#[from] KeyError),
    #[error("remote login rejected the key (signature mismatch or unknown public key)")]
    RemoteLoginRejected,
    #[error("remote login transport failure: {0}")]
    Transport(String),
    #[error("remote login returned no exchange token")]
    MissingExchangeToken,
    #[error("identity exchange failed: {0}")]
    IdentityExchangeFailed(String),
}
