// VMBENCH ERROR TAXONOMY
// TYPED FAILURES FROM THE LIBRARY. THE BINARY AND WORKLOAD GLUE WRAP THESE
// IN anyhow WITH CONTEXT; CALLERS RECOVER THEM WITH downcast_ref.

use thiserror::Error;

use crate::artifacts::ArtifactKind;
use crate::vm::VmThread;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    // NO FREE, SIBLING-DISJOINT CORE BELOW THE HOST CORE COUNT
    #[error("no free physical core left ({cores} logical cores on host)")]
    ResourceExhausted { cores: usize },

    #[error("host has {available} cores, need {required} (vmm + api + vcpus)")]
    InsufficientCores { available: usize, required: usize },

    #[error("failed to pin {thread} thread to core {core}")]
    PinRejected { thread: VmThread, core: usize },

    #[error("guest benchmark build exited with code {exit_code}")]
    BuildFailed { exit_code: i32 },

    #[error("cannot merge {other} artifacts into a {this} set")]
    KindMismatch { this: ArtifactKind, other: ArtifactKind },

    #[error("no artifact set supplies the {0} dimension")]
    MissingDimension(ArtifactKind),

    #[error("more than one artifact set supplies the {0} dimension")]
    DuplicateDimension(ArtifactKind),

    #[error("artifact {name} is a {kind}, not a disk")]
    NotADisk { name: String, kind: ArtifactKind },

    #[error("topology: {0}")]
    Topology(String),

    #[error("{0}")]
    Collaborator(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
