use bitcoin::{
    absolute::LockTime,
    opcodes::all::OP_RETURN,
    script::{Builder, Instruction, PushBytesBuf},
    transaction, Amount, OutPoint, Script, ScriptBuf, Transaction, TxIn, TxOut, Witness,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The script families the vault tracks for owned outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    Any,
    P2pkh,
    P2wpkh,
}

impl ScriptKind {
    pub fn of_script(script: &Script) -> Self {
        if script.is_p2pkh() {
            Self::P2pkh
        } else if script.is_p2wpkh() {
            Self::P2wpkh
        } else {
            Self::Any
        }
    }
}

impl std::fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::P2pkh => write!(f, "p2pkh"),
            Self::P2wpkh => write!(f, "p2wpkh"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown script kind: {0}")]
pub struct ParseScriptKindError(String);

impl std::str::FromStr for ScriptKind {
    type Err = ParseScriptKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any" => Ok(Self::Any),
            "p2pkh" => Ok(Self::P2pkh),
            "p2wpkh" => Ok(Self::P2wpkh),
            other => Err(ParseScriptKindError(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("OP_RETURN payload too long: {0} bytes")]
    PayloadTooLong(usize),
}

/// Create a standard null-data script carrying the given payload.
pub fn op_return_script(data: &[u8]) -> Result<ScriptBuf, ScriptError> {
    let mut push_data = PushBytesBuf::new();
    push_data
        .extend_from_slice(data)
        .map_err(|_| ScriptError::PayloadTooLong(data.len()))?;

    Ok(Builder::new()
        .push_opcode(OP_RETURN)
        .push_slice(push_data)
        .into_script())
}

/// Extract the single pushed payload of a null-data script.
///
/// Returns `None` for anything that is not `OP_RETURN <push>`.
pub fn op_return_data(script: &Script) -> Option<Vec<u8>> {
    let mut instructions = script.instructions();

    match instructions.next() {
        Some(Ok(Instruction::Op(OP_RETURN))) => {}
        _ => return None,
    }

    let data = match instructions.next() {
        Some(Ok(Instruction::PushBytes(bytes))) => bytes.as_bytes().to_vec(),
        _ => return None,
    };

    // trailing opcodes make it a nonstandard script
    if instructions.next().is_some() {
        return None;
    }

    Some(data)
}

/// Create a bitcoin [`Transaction`] for the given inputs and outputs.
pub fn create_tx(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Transaction {
    Transaction {
        version: transaction::Version(2),
        lock_time: LockTime::from_consensus(0),
        input: tx_ins,
        output: tx_outs,
    }
}

/// Create a list of [`TxIn`]'s from given [`OutPoint`]'s.
///
/// The `witness` and `script_sig` fields are left empty and the `sequence`
/// enables replace-by-fee with no locktime.
pub fn create_tx_ins(utxos: impl IntoIterator<Item = OutPoint>) -> Vec<TxIn> {
    let mut tx_ins = Vec::new();

    for utxo in utxos {
        tx_ins.push(TxIn {
            previous_output: utxo,
            sequence: bitcoin::transaction::Sequence::ENABLE_RBF_NO_LOCKTIME,
            script_sig: ScriptBuf::default(),
            witness: Witness::new(),
        });
    }

    tx_ins
}

/// Create a list of [`TxOut`]'s based on pairs of scripts and corresponding amounts.
pub fn create_tx_outs(
    scripts_and_amounts: impl IntoIterator<Item = (ScriptBuf, Amount)>,
) -> Vec<TxOut> {
    scripts_and_amounts
        .into_iter()
        .map(|(script_pubkey, value)| TxOut {
            script_pubkey,
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_return_roundtrip() {
        let payload = [7u8; 32];
        let script = op_return_script(&payload).expect("32 bytes fit in a push");

        assert!(script.is_op_return());
        assert_eq!(op_return_data(&script), Some(payload.to_vec()));
    }

    #[test]
    fn op_return_data_rejects_non_null_data() {
        let p2pkh = "76a914000000000000000000000000000000000000000088ac";
        let script = ScriptBuf::from_hex(p2pkh).unwrap();

        assert_eq!(op_return_data(&script), None);
    }

    #[test]
    fn script_kind_detection() {
        let p2pkh =
            ScriptBuf::from_hex("76a914000000000000000000000000000000000000000088ac").unwrap();
        let p2wpkh = ScriptBuf::from_hex("00140000000000000000000000000000000000000000").unwrap();
        let op_return = op_return_script(&[0u8; 4]).unwrap();

        assert_eq!(ScriptKind::of_script(&p2pkh), ScriptKind::P2pkh);
        assert_eq!(ScriptKind::of_script(&p2wpkh), ScriptKind::P2wpkh);
        assert_eq!(ScriptKind::of_script(&op_return), ScriptKind::Any);
    }
}
