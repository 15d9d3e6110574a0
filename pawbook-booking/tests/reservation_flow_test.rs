mod common;

use chrono::Duration;
use common::{christmas_eve, harness, harness_with_ttl, request};
use pawbook_booking::{CapacityResolver, SettleOutcome, FALLBACK_CAPACITY};
use pawbook_core::repository::CapacityRepository;
use pawbook_core::{Clock, CoreError, NewCapacityOverride, ReservationStatus, Service, Slot};
use pawbook_shared::models::ReservationEventKind;
use uuid::Uuid;

#[tokio::test]
async fn test_create_holds_one_unit() {
    let h = harness(&[(Service::Daycare, 3)]);

    let hold = h.manager.create(request(Service::Daycare, "k1")).await.unwrap();
    assert_eq!(hold.status, ReservationStatus::Active);
    assert_eq!(hold.expires_at, h.clock.now() + Duration::minutes(10));

    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!((record.capacity, record.reserved, record.confirmed), (3, 1, 0));
}

#[tokio::test]
async fn test_idempotent_create_returns_same_hold() {
    let h = harness(&[(Service::Daycare, 3)]);

    let first = h.manager.create(request(Service::Daycare, "retry-me")).await.unwrap();
    let second = h.manager.create(request(Service::Daycare, "retry-me")).await.unwrap();
    assert_eq!(first.id, second.id);

    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!(record.reserved, 1);
}

#[tokio::test]
async fn test_retry_after_lapse_replaces_unswept_hold() {
    let h = harness_with_ttl(&[(Service::TrialDay, 1)], Duration::seconds(1));

    let first = h.manager.create(request(Service::TrialDay, "slow-retry")).await.unwrap();
    h.clock.advance(Duration::seconds(2));

    let second = h.manager.create(request(Service::TrialDay, "slow-retry")).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(h.manager.get(first.id).await.unwrap().status, ReservationStatus::Expired);
    assert!(h.manager.payable(second.id).await.is_ok());

    let record = h
        .manager
        .availability(Service::TrialDay, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!((record.reserved, record.remaining()), (1, 0));
}

#[tokio::test]
async fn test_key_can_be_reused_after_release() {
    let h = harness(&[(Service::Daycare, 3)]);

    let first = h.manager.create(request(Service::Daycare, "again")).await.unwrap();
    h.manager.release(first.id).await.unwrap();
    let second = h.manager.create(request(Service::Daycare, "again")).await.unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn test_commit_is_idempotent() {
    let h = harness(&[(Service::Daycare, 3)]);
    let hold = h.manager.create(request(Service::Daycare, "pay")).await.unwrap();

    assert_eq!(h.manager.commit(hold.id).await.unwrap(), SettleOutcome::Applied);
    assert_eq!(
        h.manager.commit(hold.id).await.unwrap(),
        SettleOutcome::Unchanged(ReservationStatus::Committed)
    );

    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!((record.reserved, record.confirmed), (0, 1));
}

#[tokio::test]
async fn test_release_is_idempotent_and_frees_capacity() {
    let h = harness(&[(Service::TrialDay, 1)]);
    let hold = h.manager.create(request(Service::TrialDay, "leave")).await.unwrap();
    assert!(matches!(
        h.manager.create(request(Service::TrialDay, "waiting")).await,
        Err(CoreError::Full(_))
    ));

    assert_eq!(h.manager.release(hold.id).await.unwrap(), SettleOutcome::Applied);
    assert_eq!(
        h.manager.release(hold.id).await.unwrap(),
        SettleOutcome::Unchanged(ReservationStatus::Released)
    );

    let next = h.manager.create(request(Service::TrialDay, "waiting")).await.unwrap();
    assert_eq!(next.status, ReservationStatus::Active);
}

#[tokio::test]
async fn test_release_after_commit_changes_nothing() {
    let h = harness(&[(Service::Daycare, 3)]);
    let hold = h.manager.create(request(Service::Daycare, "paid")).await.unwrap();

    h.manager.commit(hold.id).await.unwrap();
    assert_eq!(
        h.manager.release(hold.id).await.unwrap(),
        SettleOutcome::Unchanged(ReservationStatus::Committed)
    );

    let stored = h.manager.get(hold.id).await.unwrap();
    assert_eq!(stored.status, ReservationStatus::Committed);
    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!((record.reserved, record.confirmed), (0, 1));
}

#[tokio::test]
async fn test_unknown_reservation_is_a_no_op() {
    let h = harness(&[]);
    let id = Uuid::new_v4();

    assert_eq!(h.manager.commit(id).await.unwrap(), SettleOutcome::NotFound);
    assert_eq!(h.manager.release(id).await.unwrap(), SettleOutcome::NotFound);
    assert!(matches!(h.manager.get(id).await, Err(CoreError::NotFound(_))));
}

#[tokio::test]
async fn test_expire_only_after_ttl() {
    let h = harness_with_ttl(&[(Service::Daycare, 3)], Duration::seconds(1));
    let hold = h.manager.create(request(Service::Daycare, "slow-payer")).await.unwrap();

    assert_eq!(
        h.manager.expire(hold.id).await.unwrap(),
        SettleOutcome::Unchanged(ReservationStatus::Active)
    );

    h.clock.advance(Duration::seconds(2));
    assert_eq!(h.manager.expire(hold.id).await.unwrap(), SettleOutcome::Applied);
    assert_eq!(h.manager.get(hold.id).await.unwrap().status, ReservationStatus::Expired);

    // A late webhook does not resurrect it.
    assert_eq!(
        h.manager.commit(hold.id).await.unwrap(),
        SettleOutcome::Unchanged(ReservationStatus::Expired)
    );
    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!((record.reserved, record.confirmed), (0, 0));
}

#[tokio::test]
async fn test_commit_succeeds_past_ttl_before_sweep() {
    let h = harness_with_ttl(&[(Service::Daycare, 3)], Duration::seconds(1));
    let hold = h.manager.create(request(Service::Daycare, "paid-late")).await.unwrap();

    h.clock.advance(Duration::seconds(30));
    assert_eq!(h.manager.commit(hold.id).await.unwrap(), SettleOutcome::Applied);
}

#[tokio::test]
async fn test_payable_rejects_settled_and_lapsed_holds() {
    let h = harness_with_ttl(&[(Service::Daycare, 3)], Duration::minutes(10));
    let released = h.manager.create(request(Service::Daycare, "r")).await.unwrap();
    h.manager.release(released.id).await.unwrap();
    assert!(matches!(
        h.manager.payable(released.id).await,
        Err(CoreError::InvalidState { status: ReservationStatus::Released, .. })
    ));

    let lapsed = h.manager.create(request(Service::Daycare, "l")).await.unwrap();
    assert!(h.manager.payable(lapsed.id).await.is_ok());
    h.clock.advance(Duration::minutes(11));
    assert!(matches!(h.manager.payable(lapsed.id).await, Err(CoreError::HoldExpired(_))));
}

#[tokio::test]
async fn test_attach_payment_intent_to_active_hold() {
    let h = harness(&[(Service::Daycare, 3)]);
    let hold = h.manager.create(request(Service::Daycare, "intent")).await.unwrap();

    let updated = h.manager.attach_payment_intent(hold.id, "pi_42").await.unwrap();
    assert_eq!(updated.pending_payment_intent_id.as_deref(), Some("pi_42"));

    h.manager.commit(hold.id).await.unwrap();
    assert!(matches!(
        h.manager.attach_payment_intent(hold.id, "pi_43").await,
        Err(CoreError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_resolver_precedence() {
    let h = harness(&[]);
    let resolver = CapacityResolver::new(h.capacity.clone());
    let date = christmas_eve();
    let slot = Slot::all_day();

    assert_eq!(
        resolver.effective_capacity(Service::Daycare, date, &slot).await.unwrap(),
        FALLBACK_CAPACITY
    );

    h.capacity.set_default(Service::Daycare, 12).await.unwrap();
    assert_eq!(resolver.effective_capacity(Service::Daycare, date, &slot).await.unwrap(), 12);

    h.capacity
        .add_override(NewCapacityOverride {
            service: Service::Daycare,
            date_start: date,
            date_end: date,
            slot: slot.clone(),
            capacity: 2,
            reason: Some("Short staffed".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(resolver.effective_capacity(Service::Daycare, date, &slot).await.unwrap(), 2);
    assert_eq!(
        resolver
            .effective_capacity(Service::Daycare, date + Duration::days(1), &slot)
            .await
            .unwrap(),
        12
    );
}

#[tokio::test]
async fn test_capacity_change_applies_without_stranding_holds() {
    let h = harness(&[(Service::Daycare, 3)]);
    h.manager.create(request(Service::Daycare, "a")).await.unwrap();
    h.manager.create(request(Service::Daycare, "b")).await.unwrap();

    h.capacity.set_default(Service::Daycare, 1).await.unwrap();
    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!(record.capacity, 2);
    assert_eq!(record.remaining(), 0);

    h.capacity.set_default(Service::Daycare, 6).await.unwrap();
    let record = h
        .manager
        .availability(Service::Daycare, christmas_eve(), &Slot::all_day())
        .await
        .unwrap();
    assert_eq!(record.capacity, 6);
}

#[tokio::test]
async fn test_events_follow_hold_lifecycle() {
    let h = harness(&[(Service::Daycare, 3)]);
    let mut events = h.manager.subscribe();

    let hold = h.manager.create(request(Service::Daycare, "evt")).await.unwrap();
    h.manager.commit(hold.id).await.unwrap();
    h.manager.commit(hold.id).await.unwrap();

    let created = events.recv().await.unwrap();
    assert_eq!(created.kind, ReservationEventKind::HoldCreated);
    assert_eq!(created.reservation_id, hold.id);
    assert_eq!(created.remaining, 2);

    let committed = events.recv().await.unwrap();
    assert_eq!(committed.kind, ReservationEventKind::Committed);
    assert!(committed.concerns("Daycare", christmas_eve()));

    // Replays publish nothing.
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_rejects_invalid_request() {
    let h = harness(&[]);
    let mut bad = request(Service::Daycare, " ");
    assert!(matches!(h.manager.create(bad.clone()).await, Err(CoreError::Validation(_))));

    bad.idempotency_key = "ok".to_string();
    bad.user_email = "not-an-email".to_string();
    assert!(matches!(h.manager.create(bad).await, Err(CoreError::Validation(_))));
}
