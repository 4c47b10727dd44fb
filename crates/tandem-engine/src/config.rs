//! Bridge configuration
//!
//! Settings are fixed when an [`Environment`](crate::Environment) is created.
//! They can be built in code or loaded from TOML:
//!
//! ```toml
//! encoding = "latin1"
//! linear-lookup-threshold = 8
//! catch-panics = false
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};

/// Text encoding used for strings crossing the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8; invalid byte sequences fail conversion to `string`
    #[default]
    #[serde(rename = "utf8", alias = "utf-8")]
    Utf8,
    /// ISO-8859-1; every byte is one character
    #[serde(alias = "iso-8859-1")]
    Latin1,
}

impl TextEncoding {
    /// Encode host text into script bytes
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| if (c as u32) < 0x100 { c as u8 } else { b'?' })
                .collect(),
        }
    }

    /// Decode script bytes into host text
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextEncoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// Per-environment bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct BridgeConfig {
    /// Encoding for strings crossing the boundary
    pub encoding: TextEncoding,

    /// Longest member name looked up by interned identity; longer names
    /// fall back to byte comparison
    pub short_key_limit: usize,

    /// Name tables smaller than this are scanned linearly instead of
    /// binary searched
    pub linear_lookup_threshold: usize,

    /// Chunk name used by [`Environment::run`](crate::Environment::run)
    pub default_chunk_name: String,

    /// Report host panics inside adapters as script errors
    pub catch_panics: bool,

    /// Drop the receiver when a bound method is called with colon syntax
    pub strip_receiver: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            short_key_limit: 40,
            linear_lookup_threshold: 4,
            default_chunk_name: "chunk".to_string(),
            catch_panics: true,
            strip_receiver: true,
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> BridgeResult<Self> {
        let config: BridgeConfig =
            toml::from_str(content).map_err(|e| BridgeError::argument(format!("invalid bridge config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn from_file(path: &Path) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::argument(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> BridgeResult<()> {
        if self.short_key_limit == 0 {
            return Err(BridgeError::argument("short-key-limit must be at least 1"));
        }
        if self.default_chunk_name.is_empty() {
            return Err(BridgeError::argument("default-chunk-name cannot be empty"));
        }
        Ok(())
    }
}
