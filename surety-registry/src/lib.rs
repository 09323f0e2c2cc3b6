//! Airline membership and flight records.
//!
//! - [`MembershipRegistry`]: airline identities, funding, and admission
//!   voting (single-sponsor bootstrap, then multi-party consensus)
//! - [`FlightDirectory`]: flights registered by participating airlines and
//!   their single-shot status transition, gated by a [`VerdictAuthority`]

pub mod directory;
pub mod membership;

pub use directory::{Flight, FlightDirectory, VerdictAuthority};
pub use membership::{Admission, Airline, MembershipRegistry};
