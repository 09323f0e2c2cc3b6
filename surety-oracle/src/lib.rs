//! Oracle consensus for flight status verdicts.
//!
//! Oracles register with a stake and receive three indexes derived from
//! their identity. A status request is tagged with one index; only oracles
//! holding that index may answer. The first status to collect the quorum of
//! matching answers becomes the flight's verdict.
//!
//! ```text
//!  request_status ──► OPEN ──(quorum on one status)──► FINALIZED
//!                      ▲  │                                │
//!                      └──┘ submit_response                └─► FlightDirectory::apply_verdict
//! ```

pub mod aggregator;
pub mod index;

pub use aggregator::{
    OracleAggregator, OracleRegistration, RequestState, StatusRequest, SubmissionOutcome,
};
pub use index::IndexDeriver;
