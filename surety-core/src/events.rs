//! Notification records and the bus that delivers them.
//!
//! Core operations publish [`SuretyEvent`]s; delivery to subscribers is the
//! bus's concern, not the publishing component's. Subscribers that fall
//! behind lose the oldest records rather than stalling publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::types::{Address, Amount, FlightKey, FlightStatus};

/// Default broadcast channel capacity.
const CHANNEL_CAPACITY: usize = 256;

/// Something observable happened in the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SuretyEvent {
    /// Operational switch flipped by the owner
    OperationalChanged { operational: bool },
    /// An airline funded its participation
    AirlineFunded { airline: Address, total: Amount },
    /// Outcome of an admission proposal
    AirlineAdmission {
        airline: Address,
        admitted: bool,
        votes: usize,
        required: usize,
    },
    /// A flight was registered for coverage
    FlightRegistered { flight: FlightKey },
    /// An oracle joined with its assigned indexes
    OracleRegistered { oracle: Address, indexes: Vec<u8> },
    /// Oracles holding `index` should report on `flight`
    StatusRequested { index: u8, flight: FlightKey },
    /// One oracle's accepted report
    OracleReport {
        oracle: Address,
        flight: FlightKey,
        status: FlightStatus,
    },
    /// Quorum reached; the verdict is final
    FlightStatusFinalized { flight: FlightKey, status: FlightStatus },
    /// A passenger bought coverage
    PolicyPurchased {
        passenger: Address,
        flight: FlightKey,
        premium: Amount,
    },
    /// A payout was credited to a passenger
    PayoutCredited {
        passenger: Address,
        flight: FlightKey,
        amount: Amount,
    },
    /// A passenger withdrew their balance
    Withdrawn { passenger: Address, amount: Amount },
}

impl SuretyEvent {
    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OperationalChanged { .. } => "operational_changed",
            Self::AirlineFunded { .. } => "airline_funded",
            Self::AirlineAdmission { .. } => "airline_admission",
            Self::FlightRegistered { .. } => "flight_registered",
            Self::OracleRegistered { .. } => "oracle_registered",
            Self::StatusRequested { .. } => "status_requested",
            Self::OracleReport { .. } => "oracle_report",
            Self::FlightStatusFinalized { .. } => "flight_status_finalized",
            Self::PolicyPurchased { .. } => "policy_purchased",
            Self::PayoutCredited { .. } => "payout_credited",
            Self::Withdrawn { .. } => "withdrawn",
        }
    }
}

/// A published event with its identity and publication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique record ID
    pub id: String,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: SuretyEvent,
}

/// Publish/subscribe bus with bounded history.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
    history: Arc<RwLock<VecDeque<EventRecord>>>,
    max_history: usize,
}

impl EventBus {
    /// Create a bus keeping at most `max_history` records.
    pub fn new(max_history: usize) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Arc::new(RwLock::new(VecDeque::new())),
            max_history,
        }
    }

    /// Publish an event to history and live subscribers.
    pub async fn publish(&self, event: SuretyEvent) -> EventRecord {
        let record = EventRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event,
        };

        debug!(event_id = %record.id, kind = record.event.kind(), "Publishing event");

        {
            let mut history = self.history.write().await;
            history.push_back(record.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        // No live subscribers is not an error
        let _ = self.sender.send(record.clone());

        record
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> BroadcastStream<EventRecord> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }

    /// All retained records of one kind, oldest first.
    pub async fn of_kind(&self, kind: &str) -> Vec<EventRecord> {
        let history = self.history.read().await;
        history
            .iter()
            .filter(|r| r.event.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of retained records.
    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Whether no records are retained.
    pub async fn is_empty(&self) -> bool {
        self.history.read().await.is_empty()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = EventBus::new(2);
        for operational in [true, false, true] {
            bus.publish(SuretyEvent::OperationalChanged { operational }).await;
        }

        assert_eq!(bus.len().await, 2);
        let recent = bus.recent(10).await;
        assert_eq!(
            recent[0].event,
            SuretyEvent::OperationalChanged { operational: true }
        );
        assert_eq!(
            recent[1].event,
            SuretyEvent::OperationalChanged { operational: false }
        );
    }

    #[tokio::test]
    async fn test_subscriber_receives_published() {
        let bus = EventBus::default();
        let mut stream = bus.subscribe();

        let published = bus
            .publish(SuretyEvent::Withdrawn {
                passenger: Address::new("p"),
                amount: 5,
            })
            .await;

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received, published);
    }

    #[tokio::test]
    async fn test_of_kind_filters() {
        let bus = EventBus::default();
        bus.publish(SuretyEvent::OperationalChanged { operational: false }).await;
        bus.publish(SuretyEvent::Withdrawn {
            passenger: Address::new("p"),
            amount: 1,
        })
        .await;

        assert_eq!(bus.of_kind("withdrawn").await.len(), 1);
        assert!(bus.of_kind("payout_credited").await.is_empty());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let json = serde_json::to_value(SuretyEvent::OperationalChanged { operational: true }).unwrap();
        assert_eq!(json["type"], "operational_changed");
        assert_eq!(json["operational"], true);
    }
}
