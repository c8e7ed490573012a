//! Primitive ledger types: output references, transactions, blocks.
//!
//! All of these are immutable value objects once constructed; transactions
//! are shared by `Arc` between the mempool, block bodies and callers.
//! Identity is always the double SHA-256 of the serialized form.

use crate::amount::Amount;
use crate::hash::{sha256d, BlockHash, TxId};
use crate::serialize::{
    read_vec, write_byte_vec, write_vec, Decodable, Encodable, Reader, Result as SerResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Index value marking the coinbase pseudo-input's output reference.
pub const COINBASE_OUTPOINT_INDEX: u32 = 0xffff_ffff;

/// Reference to a specific transaction output: (creating txid, index).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OutPoint {
    pub txid: TxId,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, vout: u32) -> Self {
        OutPoint { txid, vout }
    }

    /// The placeholder reference used by coinbase inputs. Not a real UTXO.
    pub fn null() -> Self {
        OutPoint {
            txid: TxId::ZERO,
            vout: COINBASE_OUTPOINT_INDEX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == COINBASE_OUTPOINT_INDEX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl Encodable for OutPoint {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.txid.as_bytes());
        out.extend_from_slice(&self.vout.to_le_bytes());
    }
}

impl Decodable for OutPoint {
    fn decode_from(reader: &mut Reader<'_>) -> SerResult<Self> {
        let txid = TxId::from_bytes(reader.read_array()?);
        let vout = reader.read_u32()?;
        Ok(OutPoint { txid, vout })
    }
}

/// Transaction input: the output being spent plus its unlocking proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl Encodable for TxIn {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.prevout.encode_to(out);
        write_byte_vec(out, &self.script_sig);
        out.extend_from_slice(&self.sequence.to_le_bytes());
    }
}

impl Decodable for TxIn {
    fn decode_from(reader: &mut Reader<'_>) -> SerResult<Self> {
        Ok(TxIn {
            prevout: OutPoint::decode_from(reader)?,
            script_sig: reader.read_byte_vec()?,
            sequence: reader.read_u32()?,
        })
    }
}

/// Transaction output: an amount locked by a spending predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

impl Encodable for TxOut {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.sats().to_le_bytes());
        write_byte_vec(out, &self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn decode_from(reader: &mut Reader<'_>) -> SerResult<Self> {
        Ok(TxOut {
            value: Amount::from_sats(reader.read_i64()?),
            script_pubkey: reader.read_byte_vec()?,
        })
    }
}

/// An ordered list of inputs and outputs plus version and lock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

/// Transactions are value objects shared by reference count.
pub type TransactionRef = Arc<Transaction>;

impl Transaction {
    /// Transaction identity: sha256d of the serialized form.
    pub fn txid(&self) -> TxId {
        TxId::from_bytes(sha256d(&crate::serialize::serialize(self)))
    }

    /// A coinbase has exactly one input and that input is the null
    /// reference.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }

    /// Sum of output values, `None` on machine-word overflow.
    pub fn total_output_value(&self) -> Option<Amount> {
        self.outputs.iter().map(|o| o.value).sum()
    }
}

impl Encodable for Transaction {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        write_vec(out, &self.inputs);
        write_vec(out, &self.outputs);
        out.extend_from_slice(&self.lock_time.to_le_bytes());
    }
}

impl Decodable for Transaction {
    fn decode_from(reader: &mut Reader<'_>) -> SerResult<Self> {
        Ok(Transaction {
            version: reader.read_u32()?,
            inputs: read_vec(reader)?,
            outputs: read_vec(reader)?,
            lock_time: reader.read_u32()?,
        })
    }
}

/// Block header: parent link, merkle commitment, timestamp, difficulty
/// target (compact encoding) and nonce. Serializes to exactly 80 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_blockhash: BlockHash,
    pub merkle_root: [u8; 32],
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn block_hash(&self) -> BlockHash {
        BlockHash::from_bytes(sha256d(&crate::serialize::serialize(self)))
    }
}

impl Encodable for BlockHeader {
    fn encode_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(self.prev_blockhash.as_bytes());
        out.extend_from_slice(&self.merkle_root);
        out.extend_from_slice(&self.time.to_le_bytes());
        out.extend_from_slice(&self.bits.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
    }
}

impl Decodable for BlockHeader {
    fn decode_from(reader: &mut Reader<'_>) -> SerResult<Self> {
        Ok(BlockHeader {
            version: reader.read_i32()?,
            prev_blockhash: BlockHash::from_bytes(reader.read_array()?),
            merkle_root: reader.read_array()?,
            time: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }
}

/// Header plus ordered transactions, the first of which must be the
/// coinbase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn block_hash(&self) -> BlockHash {
        self.header.block_hash()
    }

    pub fn txids(&self) -> Vec<TxId> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }
}

impl Encodable for Block {
    fn encode_to(&self, out: &mut Vec<u8>) {
        self.header.encode_to(out);
        write_vec(out, &self.transactions);
    }
}

impl Decodable for Block {
    fn decode_from(reader: &mut Reader<'_>) -> SerResult<Self> {
        Ok(Block {
            header: BlockHeader::decode_from(reader)?,
            transactions: read_vec(reader)?,
        })
    }
}
