// search-mcp-server/src/auth.rs
// ============================================================================
// Module: Authn/Authz
// Description: API-key validation and permission enforcement.
// Purpose: Provide strict, fail-closed auth for tool calls.
// Dependencies: base64, chrono, rand, serde, sha2
// ============================================================================

//! ## Overview
//! API keys are opaque secrets compared by SHA-256 digest; plaintext exists
//! only at generation time and is returned to the caller exactly once. The
//! persisted key file never contains plaintext. Permission checks walk the
//! caller's granted patterns: wildcard, exact, then prefix patterns ending in
//! `*`. All decisions fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use search_mcp_core::AggregatorError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix carried by every generated key.
pub const KEY_PREFIX: &str = "smcp_";
/// Random secret length in bytes before encoding.
const SECRET_BYTES: usize = 32;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Persisted API-key record. The plaintext secret is never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyRecord {
    /// Opaque key identifier.
    pub id: String,
    /// Lowercase hex SHA-256 of the plaintext key.
    pub hashed_key: String,
    /// Human-readable key name.
    pub name: String,
    /// Granted permission patterns.
    pub permissions: Vec<String>,
    /// RFC-3339 creation time.
    pub created_at: String,
    /// RFC-3339 expiry, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// RFC-3339 last successful validation, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    /// False once revoked.
    pub enabled: bool,
}

/// Key metadata safe to list; hashes never leave the manager.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyMetadata {
    /// Opaque key identifier.
    pub id: String,
    /// Human-readable key name.
    pub name: String,
    /// Granted permission patterns.
    pub permissions: Vec<String>,
    /// RFC-3339 creation time.
    pub created_at: String,
    /// RFC-3339 expiry, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    /// RFC-3339 last successful validation, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    /// False once revoked.
    pub enabled: bool,
}

/// Result of key generation; the only place plaintext ever appears.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// Opaque key identifier.
    pub id: String,
    /// Full plaintext key, returned exactly once.
    pub plaintext: String,
    /// Human-readable key name.
    pub name: String,
    /// Granted permission patterns.
    pub permissions: Vec<String>,
}

/// On-disk key file shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyFile {
    /// Whether auth is enabled for the aggregator.
    auth_enabled: bool,
    /// Persisted key records.
    #[serde(default)]
    api_keys: Vec<ApiKeyRecord>,
}

// ============================================================================
// SECTION: Auth Context
// ============================================================================

/// Per-request identity and permissions snapshot. Never stored.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Validated key id; `None` for anonymous callers.
    pub api_key_id: Option<String>,
    /// Granted permission patterns.
    pub permissions: Vec<String>,
    /// True when a key validated successfully.
    pub authenticated: bool,
}

impl AuthContext {
    /// Builds the anonymous wildcard context used when auth is disabled.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            api_key_id: None,
            permissions: vec!["*".to_string()],
            authenticated: false,
        }
    }

    /// Returns the rate-limit identifier for this caller.
    #[must_use]
    pub fn identifier(&self) -> &str {
        self.api_key_id.as_deref().unwrap_or("anonymous")
    }

    /// Returns the rate-limit tier for this caller.
    #[must_use]
    pub const fn tier(&self) -> &'static str {
        if self.authenticated {
            "authenticated"
        } else {
            "default"
        }
    }

    /// Checks a required permission against the granted patterns.
    #[must_use]
    pub fn has_permission(&self, required: &str) -> bool {
        self.permissions.iter().any(|granted| permission_matches(granted, required))
    }
}

/// Matches one granted pattern against a required permission.
///
/// Rules, in order: `*` grants everything; an exact match grants; a pattern
/// ending in `*` grants any permission starting with the pattern's prefix.
#[must_use]
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == "*" {
        return true;
    }
    if granted == required {
        return true;
    }
    if let Some(prefix) = granted.strip_suffix('*') {
        return required.starts_with(prefix);
    }
    false
}

// ============================================================================
// SECTION: Auth Manager
// ============================================================================

/// API-key store and validator.
///
/// # Invariants
/// - Plaintext keys are never read from or written to disk.
/// - A missing key file disables auth even when it was requested.
pub struct AuthManager {
    /// Whether auth is enforced.
    enabled: bool,
    /// Key records; writes are rare, reads scan linearly.
    keys: Mutex<Vec<ApiKeyRecord>>,
    /// Persistence path, when the manager is file-backed.
    path: Option<PathBuf>,
}

impl AuthManager {
    /// Creates a disabled manager; every caller becomes anonymous.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            keys: Mutex::new(Vec::new()),
            path: None,
        }
    }

    /// Loads the key file, honoring its `authEnabled` flag.
    ///
    /// A missing file disables auth even when `requested` is true.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ConfigurationError`] when the file exists
    /// but cannot be parsed.
    pub fn load(path: &Path, requested: bool) -> Result<Self, AggregatorError> {
        if !path.exists() {
            return Ok(Self::disabled());
        }
        let raw = fs::read_to_string(path).map_err(|err| {
            AggregatorError::configuration(format!(
                "api key file read failed for {}: {err}",
                path.display()
            ))
        })?;
        let file: KeyFile = serde_json::from_str(&raw).map_err(|err| {
            AggregatorError::configuration(format!(
                "api key file parse failed for {}: {err}",
                path.display()
            ))
        })?;
        Ok(Self {
            enabled: requested && file.auth_enabled,
            keys: Mutex::new(file.api_keys),
            path: Some(path.to_path_buf()),
        })
    }

    /// Returns true when auth is enforced.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Validates a plaintext key into a request context.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::AuthenticationError`] for missing, unknown,
    /// disabled, or expired keys when auth is enabled.
    pub fn validate(&self, plaintext: Option<&str>) -> Result<AuthContext, AggregatorError> {
        if !self.enabled {
            return Ok(AuthContext::anonymous());
        }
        let plaintext =
            plaintext.ok_or_else(|| AggregatorError::unauthenticated("missing API key"))?;
        let hashed = hash_key(plaintext);
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| AggregatorError::unauthenticated("key store unavailable"))?;
        let record = keys
            .iter_mut()
            .find(|record| record.hashed_key == hashed)
            .ok_or_else(|| AggregatorError::unauthenticated("unknown API key"))?;
        if !record.enabled {
            return Err(AggregatorError::unauthenticated("API key disabled"));
        }
        if let Some(expires_at) = &record.expires_at
            && let Ok(expiry) = DateTime::parse_from_rfc3339(expires_at)
            && expiry.with_timezone(&Utc) <= Utc::now()
        {
            return Err(AggregatorError::unauthenticated("API key expired"));
        }
        record.last_used_at = Some(now_rfc3339());
        Ok(AuthContext {
            api_key_id: Some(record.id.clone()),
            permissions: record.permissions.clone(),
            authenticated: true,
        })
    }

    /// Generates a new key and persists the hashed record.
    ///
    /// The returned plaintext is shown exactly once and never stored.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ConfigurationError`] when persistence fails.
    pub fn generate(
        &self,
        name: &str,
        permissions: Vec<String>,
        expires_in: Option<Duration>,
    ) -> Result<GeneratedKey, AggregatorError> {
        let mut secret = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut secret);
        let plaintext = format!("{KEY_PREFIX}{}", URL_SAFE_NO_PAD.encode(secret));
        let mut id_bytes = [0u8; 8];
        OsRng.fill_bytes(&mut id_bytes);
        let id = format!("key_{}", hex_encode(&id_bytes));
        let expires_at = expires_in.map(|expires_in| {
            (Utc::now() + chrono::Duration::from_std(expires_in).unwrap_or_default())
                .to_rfc3339_opts(SecondsFormat::Millis, true)
        });
        let record = ApiKeyRecord {
            id: id.clone(),
            hashed_key: hash_key(&plaintext),
            name: name.to_string(),
            permissions: permissions.clone(),
            created_at: now_rfc3339(),
            expires_at,
            last_used_at: None,
            enabled: true,
        };
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(record);
        }
        self.save()?;
        Ok(GeneratedKey {
            id,
            plaintext,
            name: name.to_string(),
            permissions,
        })
    }

    /// Disables a key by id. Returns true when a key was found.
    pub fn revoke(&self, id: &str) -> bool {
        let revoked = self.keys.lock().is_ok_and(|mut keys| {
            keys.iter_mut().find(|record| record.id == id).is_some_and(|record| {
                record.enabled = false;
                true
            })
        });
        if revoked {
            let _ = self.save();
        }
        revoked
    }

    /// Lists key metadata; hashed keys never leave the manager.
    #[must_use]
    pub fn list(&self) -> Vec<ApiKeyMetadata> {
        self.keys.lock().map_or_else(
            |_| Vec::new(),
            |keys| {
                keys.iter()
                    .map(|record| ApiKeyMetadata {
                        id: record.id.clone(),
                        name: record.name.clone(),
                        permissions: record.permissions.clone(),
                        created_at: record.created_at.clone(),
                        expires_at: record.expires_at.clone(),
                        last_used_at: record.last_used_at.clone(),
                        enabled: record.enabled,
                    })
                    .collect()
            },
        )
    }

    /// Persists the key file when a path is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AggregatorError::ConfigurationError`] when the write fails.
    pub fn save(&self) -> Result<(), AggregatorError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let api_keys = self
            .keys
            .lock()
            .map_or_else(|_| Vec::new(), |keys| keys.clone());
        let file = KeyFile {
            auth_enabled: self.enabled,
            api_keys,
        };
        let payload = serde_json::to_string_pretty(&file)
            .map_err(|err| AggregatorError::configuration(format!("key file encode failed: {err}")))?;
        fs::write(path, payload).map_err(|err| {
            AggregatorError::configuration(format!(
                "key file write failed for {}: {err}",
                path.display()
            ))
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Hashes a plaintext key into lowercase hex SHA-256.
#[must_use]
pub fn hash_key(plaintext: &str) -> String {
    hex_encode(&Sha256::digest(plaintext.as_bytes()))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_backed_manager(dir: &Path) -> AuthManager {
        let path = dir.join("api-keys.json");
        fs::write(&path, r#"{"authEnabled": true, "apiKeys": []}"#).expect("seed key file");
        AuthManager::load(&path, true).expect("load manager")
    }

    #[test]
    fn disabled_manager_returns_anonymous_wildcard() {
        let manager = AuthManager::disabled();
        let context = manager.validate(None).expect("anonymous context");
        assert!(!context.authenticated);
        assert!(context.has_permission("tools:anything"));
        assert_eq!(context.identifier(), "anonymous");
        assert_eq!(context.tier(), "default");
    }

    #[test]
    fn missing_key_file_disables_auth_even_when_requested() {
        let dir = tempdir().expect("tempdir");
        let manager =
            AuthManager::load(&dir.path().join("absent.json"), true).expect("load manager");
        assert!(!manager.is_enabled());
    }

    #[test]
    fn generated_key_validates_once_generated() {
        let dir = tempdir().expect("tempdir");
        let manager = file_backed_manager(dir.path());
        let generated = manager
            .generate("ci", vec!["tools:echo.*".to_string()], None)
            .expect("generate key");
        assert!(generated.plaintext.starts_with(KEY_PREFIX));

        let context = manager.validate(Some(&generated.plaintext)).expect("validate");
        assert!(context.authenticated);
        assert_eq!(context.api_key_id.as_deref(), Some(generated.id.as_str()));
        assert_eq!(context.tier(), "authenticated");
    }

    #[test]
    fn unknown_missing_and_revoked_keys_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let manager = file_backed_manager(dir.path());
        let generated = manager.generate("ci", vec!["*".to_string()], None).expect("generate");

        assert!(manager.validate(None).is_err());
        assert!(manager.validate(Some("smcp_not_a_key")).is_err());

        assert!(manager.revoke(&generated.id));
        let error = manager.validate(Some(&generated.plaintext)).expect_err("revoked");
        assert_eq!(error.code(), "AUTHENTICATION_ERROR");
    }

    #[test]
    fn expired_key_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let manager = file_backed_manager(dir.path());
        let generated = manager
            .generate("ephemeral", vec!["*".to_string()], Some(Duration::ZERO))
            .expect("generate");
        let error = manager.validate(Some(&generated.plaintext)).expect_err("expired");
        assert!(error.to_string().contains("expired"));
    }

    #[test]
    fn validation_updates_last_used_at() {
        let dir = tempdir().expect("tempdir");
        let manager = file_backed_manager(dir.path());
        let generated = manager.generate("ci", vec!["*".to_string()], None).expect("generate");
        assert!(manager.list()[0].last_used_at.is_none());
        manager.validate(Some(&generated.plaintext)).expect("validate");
        assert!(manager.list()[0].last_used_at.is_some());
    }

    #[test]
    fn permission_rules_apply_in_order() {
        assert!(permission_matches("*", "tools:anything"));
        assert!(permission_matches("tools:search", "tools:search"));
        assert!(permission_matches("tools:*", "tools:search"));
        assert!(permission_matches("tools:echo.*", "tools:echo.say"));
        assert!(!permission_matches("tools:echo.*", "tools:other.say"));
        assert!(!permission_matches("tools:search", "tools:other"));
    }

    #[test]
    fn save_and_load_preserve_records_without_plaintext() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("api-keys.json");
        fs::write(&path, r#"{"authEnabled": true, "apiKeys": []}"#).expect("seed");
        let manager = AuthManager::load(&path, true).expect("load");
        let generated = manager
            .generate("ci", vec!["tools:*".to_string()], Some(Duration::from_secs(3600)))
            .expect("generate");

        let raw = fs::read_to_string(&path).expect("read key file");
        assert!(!raw.contains(&generated.plaintext));

        let reloaded = AuthManager::load(&path, true).expect("reload");
        let keys = reloaded.list();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].id, generated.id);
        assert_eq!(keys[0].name, "ci");
        assert_eq!(keys[0].permissions, vec!["tools:*".to_string()]);
        assert!(keys[0].expires_at.is_some());
        assert!(keys[0].enabled);
        assert!(reloaded.validate(Some(&generated.plaintext)).is_ok());
    }
}
