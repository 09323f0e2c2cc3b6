//! Aggregator - collects oracle responses and finalizes verdicts at quorum.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::index::IndexDeriver;
use surety_core::{
    Address, Amount, EventBus, FlightKey, FlightStatus, OracleConfig, Result, SuretyError,
    SuretyEvent,
};
use surety_registry::{FlightDirectory, VerdictAuthority};

/// A registered oracle. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRegistration {
    /// Oracle identity
    pub address: Address,
    /// Assigned indexes
    pub indexes: Vec<u8>,
    /// Stake paid at registration
    pub stake: Amount,
    /// When the oracle registered
    pub registered_at: DateTime<Utc>,
}

/// Lifecycle of a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    /// Collecting responses
    Open,
    /// Quorum reached on the contained status
    Finalized(FlightStatus),
}

/// A request for oracles to report a flight's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRequest {
    /// Hash of index and flight key
    pub id: String,
    /// Only oracles holding this index may respond
    pub index: u8,
    /// Flight being reported on
    pub flight: FlightKey,
    /// Who opened the request
    pub requester: Address,
    /// When the request was opened
    pub opened_at: DateTime<Utc>,
    /// Current state
    pub state: RequestState,
    /// Oracles per reported status
    pub responses: HashMap<FlightStatus, HashSet<Address>>,
    /// Each oracle's current vote
    pub votes: HashMap<Address, FlightStatus>,
}

impl StatusRequest {
    /// Whether the request still accepts responses.
    pub fn is_open(&self) -> bool {
        self.state == RequestState::Open
    }

    /// Matching responses for a status.
    pub fn tally(&self, status: FlightStatus) -> usize {
        self.responses.get(&status).map_or(0, HashSet::len)
    }

    /// Record `oracle`'s vote, replacing any earlier vote. Returns the new tally.
    fn record(&mut self, oracle: &Address, status: FlightStatus) -> usize {
        if let Some(previous) = self.votes.insert(oracle.clone(), status) {
            if previous != status {
                if let Some(voters) = self.responses.get_mut(&previous) {
                    voters.remove(oracle);
                }
            }
        }
        let voters = self.responses.entry(status).or_default();
        voters.insert(oracle.clone());
        voters.len()
    }
}

/// Result of an accepted `submit_response` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// Vote counted; quorum not yet reached
    Recorded { status: FlightStatus, votes: usize },
    /// This vote completed the quorum
    Finalized { status: FlightStatus },
    /// Request already finalized; nothing changed
    Stale,
}

/// Collects independent oracle reports and finalizes one verdict per flight.
pub struct OracleAggregator {
    config: OracleConfig,
    authority: VerdictAuthority,
    deriver: IndexDeriver,
    directory: Arc<FlightDirectory>,
    events: EventBus,
    oracles: Arc<RwLock<HashMap<Address, OracleRegistration>>>,
    /// One request per flight; the entry lock serializes its responses
    requests: DashMap<FlightKey, StatusRequest>,
    request_nonce: AtomicU64,
}

impl OracleAggregator {
    /// Create an aggregator holding the directory's verdict authority.
    ///
    /// Fails with `Unauthorized` if the authority was already claimed.
    pub async fn new(
        config: OracleConfig,
        directory: Arc<FlightDirectory>,
        events: EventBus,
    ) -> Result<Self> {
        let authority = directory.claim_verdict_authority().await?;

        Ok(Self {
            deriver: IndexDeriver::new(config.seed.clone(), config.index_space),
            config,
            authority,
            directory,
            events,
            oracles: Arc::new(RwLock::new(HashMap::new())),
            requests: DashMap::new(),
            request_nonce: AtomicU64::new(0),
        })
    }

    /// Register an oracle. Returns its assigned indexes.
    pub async fn register_oracle(&self, oracle: &Address, stake: Amount) -> Result<Vec<u8>> {
        if stake < self.config.registration_stake {
            return Err(SuretyError::InsufficientStake {
                required: self.config.registration_stake,
                provided: stake,
            });
        }

        let indexes = {
            let mut oracles = self.oracles.write().await;
            if oracles.contains_key(oracle) {
                return Err(SuretyError::AlreadyRegistered(oracle.to_string()));
            }

            let nonce = oracles.len() as u64;
            let indexes =
                self.deriver
                    .oracle_indexes(oracle, nonce, self.config.indexes_per_oracle);

            oracles.insert(
                oracle.clone(),
                OracleRegistration {
                    address: oracle.clone(),
                    indexes: indexes.clone(),
                    stake,
                    registered_at: Utc::now(),
                },
            );
            indexes
        };

        info!(oracle = %oracle, indexes = ?indexes, "Oracle registered");

        self.events
            .publish(SuretyEvent::OracleRegistered {
                oracle: oracle.clone(),
                indexes: indexes.clone(),
            })
            .await;

        Ok(indexes)
    }

    /// Indexes assigned to an oracle.
    pub async fn indexes(&self, oracle: &Address) -> Result<Vec<u8>> {
        self.oracles
            .read()
            .await
            .get(oracle)
            .map(|o| o.indexes.clone())
            .ok_or_else(|| SuretyError::NotFound(format!("oracle {}", oracle)))
    }

    /// Snapshot of an oracle registration.
    pub async fn oracle(&self, oracle: &Address) -> Option<OracleRegistration> {
        self.oracles.read().await.get(oracle).cloned()
    }

    /// Number of registered oracles.
    pub async fn oracle_count(&self) -> usize {
        self.oracles.read().await.len()
    }

    /// Open a status request for a flight, or return the one already open
    /// or finalized for it.
    pub async fn request_status(&self, requester: &Address, flight: &FlightKey) -> Result<StatusRequest> {
        self.directory.status(flight).await?;

        let request = match self.requests.entry(flight.clone()) {
            Entry::Occupied(existing) => {
                debug!(flight = %flight, index = existing.get().index, "Status request already exists");
                return Ok(existing.get().clone());
            }
            Entry::Vacant(slot) => {
                let nonce = self.request_nonce.fetch_add(1, Ordering::SeqCst);
                let index = self.deriver.request_index(flight, nonce);
                let request = StatusRequest {
                    id: IndexDeriver::request_id(index, flight),
                    index,
                    flight: flight.clone(),
                    requester: requester.clone(),
                    opened_at: Utc::now(),
                    state: RequestState::Open,
                    responses: HashMap::new(),
                    votes: HashMap::new(),
                };
                slot.insert(request.clone());
                request
            }
        };

        info!(
            flight = %flight,
            index = request.index,
            requester = %requester,
            "Status request opened"
        );

        self.events
            .publish(SuretyEvent::StatusRequested {
                index: request.index,
                flight: flight.clone(),
            })
            .await;

        Ok(request)
    }

    /// Accept one oracle's report for an open request.
    pub async fn submit_response(
        &self,
        oracle: &Address,
        index: u8,
        flight: &FlightKey,
        status: FlightStatus,
    ) -> Result<SubmissionOutcome> {
        let holds_index = self
            .oracles
            .read()
            .await
            .get(oracle)
            .is_some_and(|o| o.indexes.contains(&index));
        if !holds_index {
            return Err(SuretyError::Unauthorized(format!(
                "{} is not assigned index {}",
                oracle, index
            )));
        }

        let outcome = {
            let mut request = self
                .requests
                .get_mut(flight)
                .filter(|r| r.index == index)
                .ok_or_else(|| {
                    SuretyError::NotFound(format!("request {} for flight {}", index, flight))
                })?;

            if let RequestState::Finalized(verdict) = request.state {
                debug!(
                    flight = %flight,
                    oracle = %oracle,
                    verdict = %verdict,
                    "Stale response ignored"
                );
                return Ok(SubmissionOutcome::Stale);
            }

            if !status.is_terminal() {
                return Err(SuretyError::InvalidStatus(status.code()));
            }

            let votes = request.record(oracle, status);
            debug!(
                flight = %flight,
                oracle = %oracle,
                status = %status,
                votes = votes,
                "Oracle response recorded"
            );

            if votes >= self.config.min_responses {
                request.state = RequestState::Finalized(status);
                SubmissionOutcome::Finalized { status }
            } else {
                SubmissionOutcome::Recorded { status, votes }
            }
        };

        self.events
            .publish(SuretyEvent::OracleReport {
                oracle: oracle.clone(),
                flight: flight.clone(),
                status,
            })
            .await;

        if let SubmissionOutcome::Finalized { status } = outcome {
            self.directory
                .apply_verdict(&self.authority, flight, status)
                .await?;

            info!(flight = %flight, status = %status, "Flight status finalized");

            self.events
                .publish(SuretyEvent::FlightStatusFinalized {
                    flight: flight.clone(),
                    status,
                })
                .await;
        }

        Ok(outcome)
    }

    /// Snapshot of the request for a flight.
    pub fn request(&self, flight: &FlightKey) -> Option<StatusRequest> {
        self.requests.get(flight).map(|r| r.clone())
    }

    /// Requests still collecting responses.
    pub fn open_requests(&self) -> Vec<StatusRequest> {
        self.requests
            .iter()
            .filter(|r| r.is_open())
            .map(|r| r.clone())
            .collect()
    }

    /// Drop open requests older than the configured TTL so a fresh request
    /// can be opened. Returns the affected flights.
    pub fn expire_stale(&self, now: DateTime<Utc>) -> Vec<FlightKey> {
        let Some(ttl_secs) = self.config.request_ttl_secs else {
            return Vec::new();
        };
        // Unrepresentable TTLs never elapse.
        let Some(ttl) = i64::try_from(ttl_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
        else {
            return Vec::new();
        };

        let mut expired = Vec::new();
        self.requests.retain(|flight, request| {
            let stale = request.is_open() && now - request.opened_at > ttl;
            if stale {
                warn!(
                    flight = %flight,
                    index = request.index,
                    votes = request.votes.len(),
                    "Status request expired without quorum"
                );
                expired.push(flight.clone());
            }
            !stale
        });
        expired
    }
}
