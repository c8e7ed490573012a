//! Error taxonomy for consensus validation.
//!
//! Every rejection of attacker-controlled input is a structured enum value,
//! never a panic: deserialization failures surface as `SerializeError` and
//! are converted into transaction or block invalidity at the boundary.
//! Policy rejections are local and must not trigger peer banning, which is
//! what `ConsensusError::is_consensus_violation` lets the caller decide.

use thiserror::Error;

/// Stream (de)serialization failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializeError {
    #[error("unexpected end of data")]
    UnexpectedEof,

    #[error("non-minimal compact size encoding")]
    NonMinimalCompactSize,

    #[error("compact size exceeds limit: {0}")]
    OversizedLength(u64),

    #[error("trailing bytes after decoded value")]
    TrailingBytes,

    #[error("invalid field value: {0}")]
    InvalidValue(&'static str),
}

/// Script interpreter failures. Closed set: every rejection maps to exactly
/// one of these codes, deterministically for a given (script, flags) pair.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    #[error("script evaluated without error but finished with a false top element")]
    EvalFalse,

    #[error("OP_RETURN encountered")]
    OpReturn,

    #[error("script is too large")]
    ScriptSize,

    #[error("push exceeds max script element size")]
    PushSize,

    #[error("operation limit exceeded")]
    OpCount,

    #[error("stack size limit exceeded")]
    StackSize,

    #[error("sigchecks limit exceeded")]
    SigChecks,

    #[error("pubkey count out of range for multisig")]
    PubkeyCount,

    #[error("signature count out of range for multisig")]
    SigCount,

    #[error("disabled opcode")]
    DisabledOpcode,

    #[error("unknown opcode")]
    BadOpcode,

    #[error("operation on an empty or too-small stack")]
    InvalidStackOperation,

    #[error("operation on an empty or too-small altstack")]
    InvalidAltstackOperation,

    #[error("OP_VERIFY failed")]
    Verify,

    #[error("OP_EQUALVERIFY failed")]
    EqualVerify,

    #[error("OP_CHECKSIGVERIFY failed")]
    CheckSigVerify,

    #[error("OP_CHECKMULTISIGVERIFY failed")]
    CheckMultisigVerify,

    #[error("OP_CHECKDATASIGVERIFY failed")]
    CheckDataSigVerify,

    #[error("OP_NUMEQUALVERIFY failed")]
    NumEqualVerify,

    #[error("unbalanced conditional")]
    UnbalancedConditional,

    #[error("conditional operand is not a canonical boolean")]
    MinimalIf,

    #[error("negative lock time")]
    NegativeLockTime,

    #[error("lock time requirement not satisfied")]
    UnsatisfiedLockTime,

    #[error("signature is not in strict DER encoding")]
    SigDer,

    #[error("signature s value is not in the lower half of the curve order")]
    SigHighS,

    #[error("signature hash type is invalid")]
    SigHashType,

    #[error("non-canonical public key encoding")]
    PubkeyEncoding,

    #[error("dummy multisig element must be null")]
    SigNullDummy,

    #[error("signature must be null after a failed check")]
    SigNullFail,

    #[error("data push is not minimally encoded")]
    MinimalData,

    #[error("script number is not minimally encoded")]
    MinimalNum,

    #[error("script number overflow")]
    NumberOverflow,

    #[error("unlocking script contains non-push opcodes")]
    SigPushOnly,

    #[error("stack not clean after evaluation")]
    CleanStack,

    #[error("upgradable NOP used while discouraged")]
    DiscourageUpgradableNops,

    #[error("division by zero")]
    DivByZero,

    #[error("invalid operand for split or bitwise operation")]
    InvalidOperandSize,
}

/// Transaction-level consensus failures: structural plus UTXO-referential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("serialized transaction exceeds size limit")]
    Oversized,

    #[error("output value out of money range")]
    OutputValueOutOfRange,

    #[error("sum of output values out of money range")]
    TotalOutputOutOfRange,

    #[error("duplicate input {0}")]
    DuplicateInput(String),

    #[error("coinbase unlocking script length out of range")]
    BadCoinbaseLength,

    #[error("non-coinbase transaction has a null input reference")]
    NullPrevout,

    #[error("input {index} references a missing or spent coin")]
    MissingInput { index: usize },

    #[error("spend of coinbase output at depth {depth} below maturity")]
    PrematureCoinbaseSpend { depth: u64 },

    #[error("sum of input values out of money range")]
    TotalInputOutOfRange,

    #[error("inputs {input} below outputs {output}")]
    FeeOutOfRange { input: i64, output: i64 },

    #[error("transaction is not final")]
    NonFinal,

    #[error("input sequence locks not satisfied")]
    SequenceLocked,

    #[error("input {index} script rejected: {error}")]
    ScriptFailure { index: usize, error: ScriptError },
}

/// Block-level consensus failures: structure, proof-of-work, timing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    Empty,

    #[error("serialized block exceeds size ceiling")]
    Oversized,

    #[error("proof of work target is invalid")]
    BadTarget,

    #[error("block hash does not satisfy proof of work")]
    HighHash,

    #[error("difficulty bits do not match the required work")]
    BadDiffBits,

    #[error("block timestamp is not past the median of recent blocks")]
    TimeTooOld,

    #[error("block timestamp too far in the future")]
    TimeTooNew,

    #[error("merkle root does not commit to the transaction list")]
    BadMerkleRoot,

    #[error("transaction list is a mutated duplication of itself")]
    MutatedMerkleTree,

    #[error("first transaction is not a coinbase")]
    MissingCoinbase,

    #[error("transaction at index {0} is an extra coinbase")]
    ExtraCoinbase(usize),

    #[error("block sigchecks limit exceeded")]
    SigChecks,

    #[error("coinbase pays {claimed} but only {allowed} is available")]
    BadCoinbaseValue { claimed: i64, allowed: i64 },

    #[error("coinbase would overwrite an unspent prior coinbase")]
    CoinbaseOverwrite,

    #[error("unknown parent block")]
    OrphanHeader,

    #[error("builds on an invalid ancestor")]
    InvalidAncestor,

    #[error("transaction invalid: {0}")]
    Tx(#[from] TxError),
}

/// Chain state machine failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("unknown block {0}")]
    UnknownBlock(String),

    #[error("no undo data for block {0}")]
    MissingUndo(String),

    #[error("block data not stored for {0}")]
    MissingBlockData(String),

    #[error("undo data does not match the block being disconnected")]
    UndoMismatch,

    #[error("interrupted by shutdown request")]
    Interrupted,

    #[error("no valid chain candidate")]
    NoCandidate,
}

/// Local policy rejections. Never grounds for banning a peer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("fee {fee} below minimum relay fee {required}")]
    FeeBelowMinimum { fee: i64, required: i64 },

    #[error("transaction exceeds local size policy")]
    TooLarge,

    #[error("non-standard script shape: {0}")]
    NonStandard(&'static str),

    #[error("conflicts with an in-mempool spend of the same output")]
    MempoolConflict,

    #[error("transaction already in mempool")]
    AlreadyInMempool,
}

/// Top-level error type threaded through the validation API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("serialization: {0}")]
    Serialize(#[from] SerializeError),

    #[error("script: {0}")]
    Script(#[from] ScriptError),

    #[error("transaction: {0}")]
    Tx(#[from] TxError),

    #[error("block: {0}")]
    Block(#[from] BlockError),

    #[error("chain: {0}")]
    Chain(#[from] ChainError),

    #[error("policy: {0}")]
    Policy(#[from] PolicyError),
}

impl ConsensusError {
    /// True when the rejection indicates a consensus rule violation a peer
    /// could be banned for, as opposed to a local policy preference or an
    /// internal condition.
    pub fn is_consensus_violation(&self) -> bool {
        match self {
            ConsensusError::Serialize(_)
            | ConsensusError::Script(_)
            | ConsensusError::Tx(_)
            | ConsensusError::Block(_) => true,
            ConsensusError::Chain(_) | ConsensusError::Policy(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
