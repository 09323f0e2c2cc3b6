//! End-to-end marketplace scenarios
//!
//! Drives the public call surface the way the boundary would:
//! - Airline bootstrap and multi-party admission
//! - Flight registration, coverage purchase, oracle consensus
//! - Payout credit and withdrawal
//! - Event delivery to subscribers

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio_stream::StreamExt;

use surety::{
    ether, Address, CallContext, FlightKey, FlightStatus, FlightSurety, FlightSuretyBuilder,
    InMemoryTransfer, SubmissionOutcome, SuretyError, SuretyEvent,
};

const FOUNDER: &str = "airline-a";
const PASSENGER: &str = "passenger-p";

fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn ctx(caller: &str) -> CallContext {
    CallContext::new(caller)
}

struct Market {
    surety: FlightSurety,
    transfer: Arc<InMemoryTransfer>,
    next_oracle: usize,
}

impl Market {
    /// Founder funded; flight BD674 registered.
    async fn with_flight() -> (Self, FlightKey) {
        let transfer = Arc::new(InMemoryTransfer::new());
        let surety = FlightSuretyBuilder::new()
            .owner("owner")
            .founding_airline(FOUNDER)
            .transfer(transfer.clone())
            .build()
            .await
            .unwrap();

        surety
            .fund(&ctx(FOUNDER).with_value(ether(10)), &Address::new(FOUNDER))
            .await
            .unwrap();
        let flight = surety
            .register_flight(&ctx(FOUNDER), "BD674", t0(), t0())
            .await
            .unwrap();

        (
            Self {
                surety,
                transfer,
                next_oracle: 0,
            },
            flight,
        )
    }

    /// Register oracles until `count` of them hold `index`.
    async fn oracles_holding(&mut self, index: u8, count: usize) -> Vec<String> {
        let mut holders = Vec::new();
        while holders.len() < count {
            let name = format!("oracle-{}", self.next_oracle);
            self.next_oracle += 1;
            let indexes = self
                .surety
                .register_oracle(&ctx(&name).with_value(ether(1)))
                .await
                .unwrap();
            if indexes.contains(&index) {
                holders.push(name);
            }
        }
        holders
    }

    /// Open a request and have three holders report `status`.
    async fn reach_verdict(&mut self, flight: &FlightKey, status: FlightStatus) {
        let request = self
            .surety
            .request_status(&ctx(PASSENGER), flight)
            .await
            .unwrap();
        let oracles = self.oracles_holding(request.index, 3).await;

        let mut outcomes = Vec::new();
        for oracle in &oracles {
            outcomes.push(
                self.surety
                    .submit_response(&ctx(oracle), request.index, flight, status)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(outcomes[2], SubmissionOutcome::Finalized { status });
    }
}

// =============================================================================
// Admission
// =============================================================================

#[tokio::test]
async fn test_unfunded_founder_cannot_register_airline() {
    let surety = FlightSuretyBuilder::new()
        .founding_airline(FOUNDER)
        .build()
        .await
        .unwrap();

    let err = surety
        .register_airline(&ctx(FOUNDER), &Address::new("airline-b"))
        .await
        .unwrap_err();
    assert!(matches!(err, SuretyError::Unauthorized(_)));
    assert!(!surety.is_registered(&Address::new("airline-b")).await);

    // Underfunding changes nothing
    let err = surety
        .fund(&ctx(FOUNDER).with_value(ether(5)), &Address::new(FOUNDER))
        .await
        .unwrap_err();
    assert!(matches!(err, SuretyError::InsufficientFunds { .. }));
    assert!(!surety.is_funded(&Address::new(FOUNDER)).await);
}

#[tokio::test]
async fn test_admission_bootstrap_then_consensus() {
    let (market, _) = Market::with_flight().await;
    let surety = &market.surety;

    for name in ["airline-b", "airline-c", "airline-d"] {
        let admission = surety
            .register_airline(&ctx(FOUNDER), &Address::new(name))
            .await
            .unwrap();
        assert!(admission.admitted, "{} should be admitted by a single sponsor", name);
        surety
            .fund(&ctx(name).with_value(ether(10)), &Address::new(name))
            .await
            .unwrap();
    }
    assert_eq!(surety.registered_airlines().await, 4);

    let fifth = Address::new("airline-e");
    let first = surety.register_airline(&ctx(FOUNDER), &fifth).await.unwrap();
    assert!(!first.admitted);
    assert!(!surety.is_registered(&fifth).await);

    let second = surety.register_airline(&ctx("airline-c"), &fifth).await.unwrap();
    assert!(second.admitted);
    assert!(surety.is_registered(&fifth).await);
    assert_eq!(surety.registered_airlines().await, 5);
}

// =============================================================================
// Insurance lifecycle
// =============================================================================

#[tokio::test]
async fn test_late_airline_pays_and_withdraws() {
    let (mut market, flight) = Market::with_flight().await;
    let passenger = Address::new(PASSENGER);

    market
        .surety
        .buy_policy(&ctx(PASSENGER).with_value(ether(1)), &flight)
        .await
        .unwrap();

    market.reach_verdict(&flight, FlightStatus::LateAirline).await;

    assert_eq!(
        market.surety.status(&flight).await.unwrap(),
        FlightStatus::LateAirline
    );
    assert_eq!(market.surety.balance(&passenger), ether(3) / 2);

    let withdrawn = market.surety.withdraw(&ctx(PASSENGER)).await.unwrap();
    assert_eq!(withdrawn, ether(3) / 2);
    assert_eq!(market.surety.balance(&passenger), 0);
    assert_eq!(market.transfer.paid_to(&passenger).await, ether(3) / 2);

    // Nothing left to take
    assert_eq!(market.surety.withdraw(&ctx(PASSENGER)).await.unwrap(), 0);
    assert_eq!(market.transfer.total_paid().await, ether(3) / 2);
}

#[tokio::test]
async fn test_on_time_pays_nothing() {
    let (mut market, flight) = Market::with_flight().await;

    market
        .surety
        .buy_policy(&ctx(PASSENGER).with_value(ether(1)), &flight)
        .await
        .unwrap();
    market.reach_verdict(&flight, FlightStatus::OnTime).await;

    assert_eq!(market.surety.balance(&Address::new(PASSENGER)), 0);
    let policies = market.surety.policies_for(&Address::new(PASSENGER));
    assert_eq!(policies.len(), 1);
    assert!(policies[0].settled);
    assert_eq!(policies[0].payout, 0);
}

#[tokio::test]
async fn test_late_responses_do_not_pay_twice() {
    let (mut market, flight) = Market::with_flight().await;
    market
        .surety
        .buy_policy(&ctx(PASSENGER).with_value(ether(1)), &flight)
        .await
        .unwrap();
    market.reach_verdict(&flight, FlightStatus::LateAirline).await;

    let request = market.surety.status_request(&flight).unwrap();
    let stragglers = market.oracles_holding(request.index, 2).await;
    for oracle in &stragglers {
        let outcome = market
            .surety
            .submit_response(&ctx(oracle), request.index, &flight, FlightStatus::LateAirline)
            .await
            .unwrap();
        assert_eq!(outcome, SubmissionOutcome::Stale);
    }

    assert_eq!(market.surety.balance(&Address::new(PASSENGER)), ether(3) / 2);
    assert!(market.surety.escrow().solvency().is_solvent());
}

#[tokio::test]
async fn test_no_coverage_after_verdict() {
    let (mut market, flight) = Market::with_flight().await;
    market.reach_verdict(&flight, FlightStatus::LateTechnical).await;

    let err = market
        .surety
        .buy_policy(&ctx(PASSENGER).with_value(ether(1)), &flight)
        .await
        .unwrap_err();
    assert!(matches!(err, SuretyError::FlightAlreadyFinalized(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_transfer_once() {
    let (mut market, flight) = Market::with_flight().await;
    market
        .surety
        .buy_policy(&ctx(PASSENGER).with_value(ether(1)), &flight)
        .await
        .unwrap();
    market.reach_verdict(&flight, FlightStatus::LateAirline).await;

    let surety = Arc::new(market.surety);
    let handles: Vec<_> = (0..6)
        .map(|_| {
            let surety = surety.clone();
            tokio::spawn(async move { surety.withdraw(&ctx(PASSENGER)).await })
        })
        .collect();

    let mut nonzero = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() > 0 {
            nonzero += 1;
        }
    }

    assert_eq!(nonzero, 1);
    assert_eq!(market.transfer.total_paid().await, ether(3) / 2);
}

// =============================================================================
// Events
// =============================================================================

#[tokio::test]
async fn test_subscriber_sees_verdict() {
    let (mut market, flight) = Market::with_flight().await;
    let mut stream = market.surety.events().subscribe();

    market.reach_verdict(&flight, FlightStatus::LateAirline).await;

    let mut finalized = None;
    while let Some(item) = stream.next().await {
        // Lagging only drops older records
        let Ok(record) = item else { continue };
        if let SuretyEvent::FlightStatusFinalized { flight, status } = record.event {
            finalized = Some((flight, status));
            break;
        }
    }
    assert_eq!(finalized, Some((flight, FlightStatus::LateAirline)));
}
