use thiserror::Error;

// === StoreError ===

/// Errors raised by the durable key-value store and the SQLite layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A SQLite statement failed.
    #[error("Database error: {0}")]
    Database(String),
    /// A stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A mutex guarding shared state was poisoned by a panicking holder.
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

// === TreeError ===

/// Errors raised by the external bookmark tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Link with the given ID was not found.
    #[error("Bookmark not found: {0}")]
    NotFound(String),
    /// Folder with the given ID was not found.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),
    /// The backing store failed.
    #[error("Bookmark tree error: {0}")]
    Backend(String),
}

impl From<StoreError> for TreeError {
    fn from(e: StoreError) -> Self {
        TreeError::Backend(e.to_string())
    }
}

impl From<rusqlite::Error> for TreeError {
    fn from(e: rusqlite::Error) -> Self {
        TreeError::Backend(e.to_string())
    }
}

// === ProviderError ===

/// Errors related to AI provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// No API key is configured for the selected provider.
    #[error("No API key configured for {0}")]
    MissingApiKey(String),
    /// Provider name is not one of the supported backends.
    #[error("Unsupported provider: {0}")]
    Unsupported(String),
    /// Transport-level failure (DNS, TLS, timeout...).
    #[error("Provider request failed: {0}")]
    Http(String),
    /// The provider answered with a non-success status.
    #[error("Provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    /// The provider answered but the body could not be interpreted.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Http(e.to_string())
    }
}

// === EnrichmentError ===

/// Errors related to page metadata enrichment.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    /// The preview service has no API keys configured.
    #[error("No preview API keys configured")]
    NoKeys,
    /// Every configured key has used up its hourly quota.
    #[error("Preview quota exhausted for all keys")]
    QuotaExhausted,
    /// Transport-level failure.
    #[error("Metadata request failed: {0}")]
    Http(String),
    /// The service answered with a non-success status.
    #[error("Metadata service returned HTTP {0}")]
    Status(u16),
    /// The response body could not be interpreted.
    #[error("Malformed metadata response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for EnrichmentError {
    fn from(e: reqwest::Error) -> Self {
        EnrichmentError::Http(e.to_string())
    }
}

// === CryptoError ===

/// Errors related to cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Failed to derive encryption key from the passphrase.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
    /// Encryption operation failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),
    /// Decryption operation failed.
    #[error("Decryption failed: {0}")]
    Decryption(String),
    /// Failed to generate random bytes.
    #[error("Random generation failed: {0}")]
    RandomGeneration(String),
    /// The sealed value is not valid base64 or is too short.
    #[error("Invalid sealed value: {0}")]
    InvalidInput(String),
}

// === SettingsError ===

/// Errors related to settings management.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The provided settings key is not recognized.
    #[error("Invalid settings key: {0}")]
    InvalidKey(String),
    /// The provided value is not valid for the given key.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
    /// Reading or writing the settings document failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Sealing or opening an API key failed.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

// === MoveError ===

/// Errors related to relocating links in the bookmark tree.
#[derive(Debug, Error)]
pub enum MoveError {
    /// The tree has no root container to create folders under.
    #[error("Bookmark tree has no root container")]
    NoRootContainer,
    /// The category name is empty after trimming.
    #[error("Invalid category: {0:?}")]
    InvalidCategory(String),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

// === SessionError ===

/// Errors related to organize sessions and history.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another session is already running.
    #[error("Organize session already running: {0}")]
    AlreadyRunning(String),
    /// There is no current session.
    #[error("No active organize session")]
    NoActiveSession,
    /// The operation requires a session in a different state.
    #[error("Session {id} is {status}, expected {expected}")]
    InvalidState {
        id: String,
        status: String,
        expected: String,
    },
    /// History record with the given ID was not found.
    #[error("Organize record not found: {0}")]
    RecordNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Move(#[from] MoveError),
}

// === CommandError ===

/// Errors raised by the command surface before a command reaches the engine.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The method or message type is not recognized.
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    /// A required parameter is missing or has the wrong type.
    #[error("invalid params: {0}")]
    InvalidParams(String),
    /// An engine component failed in a way that has no structured response.
    #[error("{0}")]
    Internal(String),
}

impl From<&str> for CommandError {
    fn from(msg: &str) -> Self {
        CommandError::InvalidParams(msg.to_string())
    }
}
