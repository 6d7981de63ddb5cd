//! Credential profiles.
//!
//! A profile names a provider connection: endpoint, model, settings and
//! the API key. Keys are obfuscated at rest with a keystream XOR and
//! base64; this is a deterrent against casual disclosure, not
//! cryptography, and the store says so in its docs on purpose. One
//! profile is active at a time. The whole table persists as a single JSON
//! document when a path is configured.

use crate::config::Provider;
use crate::error::{LlmError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};
use uuid::Uuid;

/// Schema version written into each profile record.
const PROFILE_VERSION: u32 = 1;

/// Keystream pad for key obfuscation.
const OBFUSCATION_PAD: &[u8] = b"graphbridge.profile.pad.v1";

fn obfuscate(plain: &str) -> String {
    let mixed: Vec<u8> = plain
        .bytes()
        .zip(OBFUSCATION_PAD.iter().cycle())
        .map(|(b, p)| b ^ p)
        .collect();
    BASE64.encode(mixed)
}

fn deobfuscate(stored: &str) -> Result<String> {
    let mixed = BASE64
        .decode(stored)
        .map_err(|e| LlmError::ProfileStore(format!("corrupt key material: {}", e)))?;
    let plain: Vec<u8> = mixed
        .iter()
        .zip(OBFUSCATION_PAD.iter().cycle())
        .map(|(b, p)| b ^ p)
        .collect();
    String::from_utf8(plain)
        .map_err(|e| LlmError::ProfileStore(format!("corrupt key material: {}", e)))
}

/// Model sampling settings carried per profile.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One named provider profile. The `key` field holds obfuscated material;
/// use [`ProfileStore::get_active`] to get a usable profile back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub provider: Provider,
    pub endpoint: String,
    pub model: String,

    #[serde(default)]
    pub settings: ProfileSettings,

    /// Obfuscated API key.
    key: String,

    pub timestamp: DateTime<Utc>,
    pub version: u32,
}

impl Profile {
    /// The deobfuscated API key.
    pub fn api_key(&self) -> Result<String> {
        deobfuscate(&self.key)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    profiles: HashMap<String, Profile>,
    active_id: Option<String>,
}

/// Table of profiles with one active pointer.
pub struct ProfileStore {
    path: Option<PathBuf>,
    document: Mutex<StoreDocument>,
}

impl ProfileStore {
    /// In-memory store; nothing persists.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: Mutex::new(StoreDocument::default()),
        }
    }

    /// Store backed by a JSON document. A missing or unreadable file
    /// starts empty rather than failing the caller.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Profile document unreadable, starting empty");
                StoreDocument::default()
            }),
            Err(_) => StoreDocument::default(),
        };
        Self {
            path: Some(path),
            document: Mutex::new(document),
        }
    }

    fn persist(&self, document: &StoreDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LlmError::ProfileStore(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(document)
            .map_err(|e| LlmError::ProfileStore(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| LlmError::ProfileStore(e.to_string()))?;
        Ok(())
    }

    /// Create or replace a profile. The first stored profile becomes
    /// active. Returns the profile id.
    pub fn store(
        &self,
        name: impl Into<String>,
        provider: Provider,
        api_key: &str,
        model: Option<String>,
        endpoint: Option<String>,
        settings: ProfileSettings,
    ) -> Result<String> {
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            provider,
            endpoint: endpoint.unwrap_or_else(|| provider.default_endpoint().to_string()),
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            settings,
            key: obfuscate(api_key),
            timestamp: Utc::now(),
            version: PROFILE_VERSION,
        };

        let mut document = self.document.lock();
        let id = profile.id.clone();
        document.profiles.insert(id.clone(), profile);
        if document.active_id.is_none() {
            document.active_id = Some(id.clone());
        }
        self.persist(&document)?;
        debug!(profile_id = %id, "Stored provider profile");
        Ok(id)
    }

    /// All profiles, keys still obfuscated, sorted by name.
    pub fn list_profiles(&self) -> Vec<Profile> {
        let document = self.document.lock();
        let mut profiles: Vec<Profile> = document.profiles.values().cloned().collect();
        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    /// Point the active marker at a profile.
    pub fn set_active(&self, profile_id: &str) -> Result<()> {
        let mut document = self.document.lock();
        if !document.profiles.contains_key(profile_id) {
            return Err(LlmError::ProfileStore(format!(
                "profile not found: {}",
                profile_id
            )));
        }
        document.active_id = Some(profile_id.to_string());
        self.persist(&document)
    }

    /// Remove a profile. Deleting the active profile clears the pointer.
    pub fn delete(&self, profile_id: &str) -> Result<()> {
        let mut document = self.document.lock();
        if document.profiles.remove(profile_id).is_none() {
            return Err(LlmError::ProfileStore(format!(
                "profile not found: {}",
                profile_id
            )));
        }
        if document.active_id.as_deref() == Some(profile_id) {
            document.active_id = None;
        }
        self.persist(&document)
    }

    /// The active profile, if one is set.
    pub fn get_active(&self) -> Option<Profile> {
        let document = self.document.lock();
        document
            .active_id
            .as_ref()
            .and_then(|id| document.profiles.get(id))
            .cloned()
    }

    /// True when any profile is stored.
    pub fn has(&self) -> bool {
        !self.document.lock().profiles.is_empty()
    }
}
