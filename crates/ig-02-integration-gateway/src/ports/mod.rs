//! Ports Layer
//!
//! Driven ports the gateway depends on: credential persistence, usage
//! recording and time.

pub mod outbound;

pub use outbound::{
    ClientEdit, CredentialStore, KeyEdit, ManualTimeSource, SystemTimeSource, TimeSource,
    UsageSink,
};
