use bitcoin::Amount;

/// Flat fee attached to every bridge-issued BTC transaction.
pub const BTC_TX_FEE: Amount = Amount::from_sat(10_000);

/// Floor under which a change output is dropped instead of created.
pub const DUST_LIMIT: Amount = Amount::from_sat(546);
