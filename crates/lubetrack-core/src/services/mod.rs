//! Client-facing services built on the core components.

mod execution;

pub use execution::{
    CompletionRequest, EvidencePhoto, ExecutionService, IssueRequest,
};
