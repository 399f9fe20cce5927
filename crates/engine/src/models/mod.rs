//! Engine data model
//!
//! - `capability` - The closed set of routable actions (Capability)
//! - `envelope` - Request/response envelopes and call identity
//! - `attempt` - Per-attempt audit records
//! - `requests` - Typed request builders for the common capabilities

mod attempt;
mod capability;
mod envelope;
mod requests;

pub use attempt::{AttemptOutcome, AttemptRecord};
pub use capability::Capability;
pub use envelope::{
    CallFailureKind, CallId, CandidateFailure, Params, RequestEnvelope, ResponseEnvelope,
};
pub use requests::{
    CapabilityRequest, EmailMessage, EnvelopeRequest, LetterRequest, ObjectUpload,
    PostalAddress, SearchQuery, Signer,
};
