//! Decryption policies for Chakra Drive private files.
//!
//! A file's secret key is wrapped by a threshold network under an access
//! condition naming the owner's wallet and one pinned policy program. This
//! crate holds:
//! - the versioned policy programs and their registry of pinned content ids
//! - the access condition builder and evaluator
//! - the threshold network interface and an in-process implementation
//!
//! Program revisions are immutable once deployed. Files record the revision
//! they were encrypted against and are always decrypted with that revision.

pub mod conditions;
pub mod constants;
mod error;
pub mod local;
pub mod network;
pub mod program;
pub mod registry;

pub use conditions::{
    conditions_to_decrypt, evaluate, AccessControlCondition, ConditionItem, ConditionOperator,
    SolRpcConditions,
};
pub use error::{PolicyError, PolicyResult};
pub use local::{Clock, LocalThresholdNetwork};
pub use network::{
    EncryptRequest, ExecuteJsRequest, ExecuteJsResponse, NonceRegistry, ResourceAbilityRequest,
    SessionSig, SessionSigRequest, SessionSigsMap, ThresholdNetwork,
};
pub use program::{
    run_policy, AuthSig, DecryptAndCombineRequest, FailureCause, PolicyFailure, PolicyOutcome,
    PolicyParams, PolicyValidator, SandboxRuntime, SiwsPolicyV0, SiwsPolicyV1, SiwsPolicyV2,
};
pub use registry::{PolicyVersion, ProgramEntry, ProgramRegistry};
