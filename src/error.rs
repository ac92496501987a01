use crate::engine::FronctocolId;
use thiserror::Error;

/// All errors surfaced by this crate.
///
/// Configuration and protocol-shape errors abort the owning party's engine;
/// transport errors are handled by the transport loop (retry on the
/// connecting side, propagate otherwise); randomness depletion and
/// assertion failures are treated as fatal engineering bugs.
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown identity {0}")]
    UnknownIdentity(String),

    #[error("duplicate identity {0} in peer set")]
    DuplicateIdentity(String),

    #[error("modulus mismatch: expected {expected}, got {actual}")]
    ModulusMismatch { expected: u128, actual: u128 },

    #[error("dealer patrons disagree on info for {kind}")]
    InconsistentRandomnessInfo { kind: &'static str },

    #[error("big number magnitude of {0} bytes exceeds the 2^16-1 wire limit")]
    BigNumberTooLarge(usize),

    #[error("unknown control block byte {0:#x}")]
    UnknownControlBlock(u8),

    #[error("received message for unknown fronctocol {0:?}")]
    UnknownFronctocol(FronctocolId),

    #[error("received message for already-completed fronctocol {0:?}")]
    AlreadyCompleted(FronctocolId),

    #[error("batch round disagreement: sibling fronctocols emitted different actions")]
    BatchActionMismatch,

    #[error("await is not supported inside a Batch")]
    BatchAwaitUnsupported,

    #[error("batch length disagreement: ours {ours}, peer's {theirs}")]
    BatchLengthMismatch { ours: usize, theirs: usize },

    #[error("dispenser of kind {kind} exhausted: requested {requested}, had {available}")]
    RandomnessDepleted {
        kind: &'static str,
        requested: usize,
        available: usize,
    },

    #[error("{0} received a message it has no handler for")]
    UnexpectedMessage(&'static str),

    #[error("completed child handed back an unexpected result type in {0}")]
    UnexpectedResultType(&'static str),

    #[error("promise {0:?} was already awaited")]
    PromiseAlreadyAwaited(FronctocolId),

    #[error("promise {0:?} has no result available")]
    PromiseNotReady(FronctocolId),

    #[error("fronctocol {0:?} received a message from a non-peer")]
    NotAPeer(FronctocolId),

    #[error("engine has aborted, no further messages are processed")]
    Aborted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("malformed peer address: {0}")]
    MalformedAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Asserts an internal invariant. In debug builds this panics immediately;
/// in release builds the caller's `Result::Err` path is taken instead so a
/// violated invariant aborts the owning engine rather than the process.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $err:expr) => {
        if !$cond {
            debug_assert!($cond, "invariant violated: {}", stringify!($cond));
            return Err($err);
        }
    };
}
