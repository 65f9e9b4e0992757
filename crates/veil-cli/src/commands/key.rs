// Storage key derivation

use alloy_primitives::Address;
use anyhow::Result;
use clap::Args;
use veil_core::{ContractSet, StorageKey, VeilConfig};

#[derive(Args, Debug)]
pub struct KeyArgs {
    /// User address
    #[arg(long)]
    pub user: Address,

    /// Target contract; repeat for each contract. Defaults to the configured set.
    #[arg(long = "contract")]
    pub contracts: Vec<Address>,
}

/// Print the key an authorization for `user` and the contracts is cached under.
pub fn run(args: &KeyArgs, config: &VeilConfig) -> Result<String> {
    let contracts = if args.contracts.is_empty() {
        config.contract_set()?
    } else {
        ContractSet::new(args.contracts.iter().copied())?
    };
    let key = StorageKey::derive(&args.user, &contracts, &config.domain_params());
    Ok(format!("{}\n", key.as_str()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_key_ignores_contract_order() {
        let config = VeilConfig::default();
        let user = Address::repeat_byte(0x11);
        let a = Address::repeat_byte(0x22);
        let b = Address::repeat_byte(0x33);

        let forward = run(&KeyArgs { user, contracts: vec![a, b] }, &config).unwrap();
        let reversed = run(&KeyArgs { user, contracts: vec![b, a, b] }, &config).unwrap();
        assert_eq!(forward, reversed);
        assert!(forward.starts_with(veil_core::authorization::STORAGE_KEY_PREFIX));
    }

    #[test]
    fn test_key_without_contracts_needs_configured_set() {
        let args = KeyArgs {
            user: Address::repeat_byte(0x11),
            contracts: Vec::new(),
        };
        assert!(run(&args, &VeilConfig::default()).is_err());
    }
}
