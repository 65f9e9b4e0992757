//! Veil configuration
//!
//! TOML file, then `VEIL_*` environment overrides, then validation:
//!
//! ```toml
//! [domain]
//! chain_id = 11155111
//! verifying_contract = "0x…"
//!
//! [authorization]
//! duration_days = 365
//! lock_policy = "hide-values"
//!
//! [display]
//! default_precision = 4
//!
//! [[contracts]]
//! label = "vault"
//! address = "0x…"
//! ```

use crate::authorization::{ContractSet, DomainParams, LockPolicy, DEFAULT_DURATION_DAYS};
use crate::ciphertext::FieldKind;
use crate::effects::FilesystemStorage;
use crate::errors::{VeilError, VeilResult};
use crate::format::{DEFAULT_PLACEHOLDER, DEFAULT_PRECISION, VALUE_DECIMALS};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "VEIL_";

/// Complete Veil configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    /// EIP-712 domain permits are signed under
    pub domain: DomainConfig,
    /// Authorization lifetime and lock behavior
    pub authorization: AuthorizationConfig,
    /// Display precision and placeholder
    pub display: DisplayConfig,
    /// Where cached authorizations live
    pub storage: StorageConfig,
    /// Target contracts an authorization is requested for
    pub contracts: Vec<ContractConfig>,
}

/// EIP-712 domain parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Domain name
    pub name: String,
    /// Domain version
    pub version: String,
    /// Chain id
    pub chain_id: u64,
    /// Verifying contract
    pub verifying_contract: Address,
}

impl Default for DomainConfig {
    fn default() -> Self {
        let params = DomainParams::default();
        Self {
            name: params.name,
            version: params.version,
            chain_id: params.chain_id,
            verifying_contract: params.verifying_contract,
        }
    }
}

impl From<&DomainConfig> for DomainParams {
    fn from(config: &DomainConfig) -> Self {
        Self {
            name: config.name.clone(),
            version: config.version.clone(),
            chain_id: config.chain_id,
            verifying_contract: config.verifying_contract,
        }
    }
}

/// Authorization settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Validity window of newly signed authorizations
    pub duration_days: u64,
    /// What `lock` does to the cached record
    pub lock_policy: LockPolicy,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            duration_days: DEFAULT_DURATION_DAYS,
            lock_policy: LockPolicy::default(),
        }
    }
}

/// Display settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Fraction digits for kinds without an explicit entry
    pub default_precision: u32,
    /// Redacted placeholder
    pub placeholder: String,
    /// Fraction digits per field kind
    #[serde(with = "kind_map")]
    pub precision: BTreeMap<FieldKind, u32>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_precision: DEFAULT_PRECISION,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            precision: BTreeMap::new(),
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Cache directory; the platform data directory when unset
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Directory to cache authorizations in
    pub fn resolve_dir(&self) -> VeilResult<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => FilesystemStorage::default_dir()
                .ok_or_else(|| VeilError::config("no platform data directory; set storage.dir")),
        }
    }
}

/// One target contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Human-readable name
    pub label: String,
    /// Contract address
    pub address: Address,
}

impl VeilConfig {
    /// Load from a TOML file.
    pub fn load_from_file(path: &Path) -> VeilResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            VeilError::config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text.
    pub fn from_toml_str(content: &str) -> VeilResult<Self> {
        toml::from_str(content).map_err(|e| VeilError::config(format!("invalid TOML: {e}")))
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> VeilResult<String> {
        toml::to_string_pretty(self).map_err(|e| VeilError::serialization(e.to_string()))
    }

    /// Apply `VEIL_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> VeilResult<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `VEIL_*` overrides from an explicit variable list.
    pub fn merge_with_vars(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> VeilResult<()> {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "CHAIN_ID" => {
                    self.domain.chain_id = parse_var(&key, &value)?;
                }
                "VERIFYING_CONTRACT" => {
                    self.domain.verifying_contract = parse_var(&key, &value)?;
                }
                "DURATION_DAYS" => {
                    self.authorization.duration_days = parse_var(&key, &value)?;
                }
                "LOCK_POLICY" => {
                    self.authorization.lock_policy = value.parse()?;
                }
                "STORAGE_DIR" => {
                    self.storage.dir = Some(PathBuf::from(value));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Check invariants the session relies on.
    pub fn validate(&self) -> VeilResult<()> {
        if self.authorization.duration_days == 0 {
            return Err(VeilError::config("authorization.duration_days must be positive"));
        }
        if self.display.default_precision > VALUE_DECIMALS {
            return Err(VeilError::config(format!(
                "display.default_precision must be at most {VALUE_DECIMALS}"
            )));
        }
        if let Some((kind, digits)) = self
            .display
            .precision
            .iter()
            .find(|(_, digits)| **digits > VALUE_DECIMALS)
        {
            return Err(VeilError::config(format!(
                "display.precision.{kind} = {digits} exceeds {VALUE_DECIMALS}"
            )));
        }
        if self.display.placeholder.is_empty() {
            return Err(VeilError::config("display.placeholder must not be empty"));
        }
        if self.contracts.is_empty() {
            return Err(VeilError::config("at least one [[contracts]] entry is required"));
        }
        let mut seen = HashSet::new();
        for contract in &self.contracts {
            if !seen.insert(contract.address) {
                return Err(VeilError::config(format!(
                    "contract {} ({}) is listed twice",
                    contract.address, contract.label
                )));
            }
        }
        Ok(())
    }

    /// Domain parameters for permit signing
    pub fn domain_params(&self) -> DomainParams {
        DomainParams::from(&self.domain)
    }

    /// Canonical set of configured target contracts
    pub fn contract_set(&self) -> VeilResult<ContractSet> {
        ContractSet::new(self.contracts.iter().map(|contract| contract.address))
    }

    /// Address of a contract by label
    pub fn contract(&self, label: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.label == label)
            .map(|contract| contract.address)
    }
}

/// TOML table keys are strings; field kinds are keyed by their label.
mod kind_map {
    use crate::ciphertext::FieldKind;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<FieldKind, u32>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(kind, digits)| (kind.label(), *digits))
            .collect::<BTreeMap<_, _>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<FieldKind, u32>, D::Error> {
        BTreeMap::<String, u32>::deserialize(deserializer)?
            .into_iter()
            .map(|(label, digits)| {
                label
                    .parse::<FieldKind>()
                    .map(|kind| (kind, digits))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

fn parse_var<T>(key: &str, value: &str) -> VeilResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VeilError::config(format!("{key}: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
