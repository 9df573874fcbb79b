use bitcoin::{address::NetworkUnchecked, Address, Network, ScriptBuf};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors produced when validating a user-supplied address string.
#[derive(Debug, Error)]
pub enum AddressParseError {
    #[error("invalid bitcoin address: {0}")]
    Malformed(#[from] bitcoin::address::ParseError),

    #[error("address not valid for network {0}")]
    WrongNetwork(Network),
}

/// A wrapper around [`bitcoin::Address`] that remembers the [`Network`] it was
/// checked against, so that it can implement [`serde::Deserialize`] and be
/// stored/reloaded without re-deciding the network.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BitcoinAddress {
    /// The [`bitcoin::Network`] that this address is valid in.
    network: Network,

    /// The actual [`Address`] that this type wraps.
    address: Address,
}

impl BitcoinAddress {
    /// Parses and network-checks an address string.
    ///
    /// Redeem receivers sometimes arrive with a stray `0x` prefix copied from
    /// the destination chain; it is stripped before parsing.
    pub fn parse(address_str: &str, network: Network) -> Result<Self, AddressParseError> {
        let address_str = address_str.strip_prefix("0x").unwrap_or(address_str);
        let address = address_str.parse::<Address<NetworkUnchecked>>()?;

        let checked_address = address
            .require_network(network)
            .map_err(|_| AddressParseError::WrongNetwork(network))?;

        Ok(Self {
            network,
            address: checked_address,
        })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn script_pubkey(&self) -> ScriptBuf {
        self.address.script_pubkey()
    }

    pub fn matches_script_pubkey(&self, script: &bitcoin::Script) -> bool {
        self.address.matches_script_pubkey(script)
    }
}

impl std::fmt::Display for BitcoinAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.address.fmt(f)
    }
}

impl<'de> Deserialize<'de> for BitcoinAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct BitcoinAddressShim {
            network: Network,
            address: String,
        }

        let shim = BitcoinAddressShim::deserialize(deserializer)?;
        let address = shim
            .address
            .parse::<Address<NetworkUnchecked>>()
            .map_err(|_| de::Error::custom("invalid bitcoin address"))?
            .require_network(shim.network)
            .map_err(|_| de::Error::custom("address invalid for given network"))?;

        Ok(BitcoinAddress {
            network: shim.network,
            address,
        })
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::Network;

    use super::BitcoinAddress;

    #[test]
    fn parses_valid_testnet_address() {
        let addr = "moHYHpgk4YgTCeLBmDE2teQ3qVLUtM95Fn";
        let parsed = BitcoinAddress::parse(addr, Network::Testnet)
            .expect("valid testnet address must parse");

        assert_eq!(parsed.to_string(), addr);
        assert_eq!(*parsed.network(), Network::Testnet);
    }

    #[test]
    fn strips_stray_evm_prefix() {
        let addr = "0xmoHYHpgk4YgTCeLBmDE2teQ3qVLUtM95Fn";
        let parsed = BitcoinAddress::parse(addr, Network::Testnet)
            .expect("prefix must be stripped before parsing");

        assert_eq!(parsed.to_string(), "moHYHpgk4YgTCeLBmDE2teQ3qVLUtM95Fn");
    }

    #[test]
    fn rejects_garbage_and_wrong_network() {
        assert!(BitcoinAddress::parse("not-an-addr", Network::Testnet).is_err());

        // mainnet address offered as testnet
        let mainnet = "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2";
        assert!(BitcoinAddress::parse(mainnet, Network::Testnet).is_err());
    }
}
