//! Secondary-factor verification subsystem.
//!
//! # Data Flow
//! ```text
//! VerificationRequest (subject, secret, fingerprint)
//!     → issuer.rs (format check, enrollment lookup)
//!     → totp.rs / enrollment.rs (secret check, single-use bookkeeping)
//!     → challenge.rs (issue token bound to fingerprint)
//!     → ChallengeResponse handed to the submitter
//! ```
//!
//! # Security Constraints
//! - Secrets are never logged or serialized
//! - Challenges are bound to one operation fingerprint and one subject
//! - A challenge backs at most one successful submission

pub mod challenge;
pub mod enrollment;
pub mod issuer;
pub mod totp;
pub mod types;

pub use challenge::{ChallengeRegistry, ChallengeRejection, ChallengeReservation};
pub use enrollment::EnrollmentStore;
pub use issuer::{LocalVerificationIssuer, VerificationIssuer};
pub use totp::Totp;
pub use types::{
    ChallengeResponse, ChallengeToken, Secret, SecretKind, SecretMaterial, VerificationError,
    VerificationRequest, VerificationResult,
};
