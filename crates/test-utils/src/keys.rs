use bitcoin::{Address, CompressedPublicKey, Network};
use secp256k1::{Keypair, PublicKey, SecretKey, SECP256K1};
use wbtc_bridge_primitives::bitcoin::BitcoinAddress;

/// Deterministic keypair from a one-byte seed.
pub fn keypair(seed: u8) -> Keypair {
    let secret_key = SecretKey::from_slice(&[seed; 32]).expect("non-zero seed is a valid key");
    Keypair::from_secret_key(SECP256K1, &secret_key)
}

/// Deterministic p2wpkh address.
pub fn p2wpkh_address(seed: u8, network: Network) -> BitcoinAddress {
    let public_key = CompressedPublicKey(PublicKey::from_secret_key(
        SECP256K1,
        &keypair(seed).secret_key(),
    ));
    let address = Address::p2wpkh(&public_key, network);

    BitcoinAddress::parse(&address.to_string(), network).expect("derived address is valid")
}
