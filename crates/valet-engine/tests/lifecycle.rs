//! Integration tests: car lifecycle through the engine

mod common;

use chrono::Duration;
use common::Harness;
use valet_core::{CarStatus, Error, KeyKind, Leg};

#[tokio::test]
async fn test_end_to_end_flow() {
    let h = Harness::new().await;
    let e = &h.engine;

    let record = e
        .submit_car_in(1, "KA01AB1234", "V100", Some("5550199"))
        .await
        .unwrap();
    assert_eq!(record.status, CarStatus::InRequest);
    assert!(!record.seen_parking && !record.seen_bringing);

    h.clock.advance(Duration::minutes(1));
    let record = e.assign_driver(1, "KA01AB1234", "D1").await.unwrap();
    assert_eq!(record.status, CarStatus::AssignedParking);
    assert_eq!(record.driver_for(Leg::Parking), Some("D1"));

    let record = e.mark_seen(1, "KA01AB1234", Leg::Parking).await.unwrap();
    assert!(record.seen_parking);

    h.clock.advance(Duration::minutes(4));
    let record = e.mark_parked(1, "KA01AB1234", "A12").await.unwrap();
    assert_eq!(record.status, CarStatus::Parked);
    assert_eq!(record.parking_spot.as_deref(), Some("A12"));
    assert_eq!(record.parked_at, Some(h.clock_now()));

    h.clock.advance(Duration::hours(3));
    let record = e.request_car_out(1, "KA01AB1234").await.unwrap();
    assert_eq!(record.status, CarStatus::OutRequest);

    let record = e.assign_driver(1, "KA01AB1234", "D2").await.unwrap();
    assert_eq!(record.status, CarStatus::AssignedBringing);
    assert_eq!(record.driver_for(Leg::Bringing), Some("D2"));
    assert_eq!(record.driver_for(Leg::Parking), Some("D1"));

    let record = e.mark_brought(1, "KA01AB1234").await.unwrap();
    assert_eq!(record.status, CarStatus::BroughtToClient);

    h.clock.advance(Duration::minutes(2));
    let archived = e.mark_handed_over(1, "KA01AB1234").await.unwrap();
    assert_eq!(archived.status, CarStatus::HandedOver);
    assert_eq!(archived.parking_spot.as_deref(), Some("A12"));
    assert_eq!(archived.handed_over_at, Some(h.clock_now()));
    assert!(archived.seen_parking);

    assert!(e.list_active(1).await.unwrap().is_empty());
    let archive = e.search(1, None, true).await.unwrap();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive[0].record, archived);
}

#[tokio::test]
async fn test_duplicate_keys_and_tenant_isolation() {
    let h = Harness::new().await;
    let e = &h.engine;

    e.submit_car_in(1, "KA01AB1234", "V1", None).await.unwrap();

    let err = e
        .submit_car_in(1, "KA01AB1234", "V2", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateKey {
            key: KeyKind::CarNo,
            ref value,
        } if value == "KA01AB1234"
    ));
    assert_eq!(err.to_string(), "Car No KA01AB1234 already exists");

    let err = e
        .submit_car_in(1, "KA99ZZ0001", "V1", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::DuplicateKey {
            key: KeyKind::ValetId,
            ..
        }
    ));

    // Same keys in another tenant are independent
    e.submit_car_in(2, "KA01AB1234", "V1", None).await.unwrap();
    assert_eq!(e.list_active(1).await.unwrap().len(), 1);
    assert_eq!(e.list_active(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_blank_inputs_rejected() {
    let h = Harness::new().await;
    let e = &h.engine;

    assert!(matches!(
        e.submit_car_in(1, "  ", "V1", None).await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        e.submit_car_in(1, "C1", "", None).await,
        Err(Error::InvalidInput(_))
    ));

    h.checked_in_and_assigned(1, "C1", "V1", "D1").await;
    assert!(matches!(
        e.mark_parked(1, "C1", " ").await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_unknown_tenant() {
    let h = Harness::new().await;
    assert!(matches!(
        h.engine.list_active(3).await,
        Err(Error::InvalidTenant(_))
    ));
    assert!(matches!(
        h.engine.submit_car_in(0, "C1", "V1", None).await,
        Err(Error::InvalidTenant(_))
    ));
}

#[tokio::test]
async fn test_assign_rejected_outside_assignable_states() {
    let h = Harness::new().await;
    let e = &h.engine;

    h.checked_in_and_assigned(1, "C1", "V1", "D1").await;
    e.mark_parked(1, "C1", "B4").await.unwrap();
    let before = e.get_car(1, "C1").await.unwrap();

    h.clock.advance(Duration::minutes(10));
    let err = e.assign_driver(1, "C1", "D2").await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            current: CarStatus::Parked,
            ..
        }
    ));
    assert_eq!(e.get_car(1, "C1").await.unwrap(), before);

    // brought_to_client rejects assignment as well
    h.brought_to_client(1, "C2", "V2").await;
    let before = e.get_car(1, "C2").await.unwrap();
    assert!(matches!(
        e.assign_driver(1, "C2", "D1").await,
        Err(Error::InvalidTransition {
            current: CarStatus::BroughtToClient,
            ..
        })
    ));
    assert_eq!(e.get_car(1, "C2").await.unwrap(), before);
}

#[tokio::test]
async fn test_assign_unknown_driver() {
    let h = Harness::new().await;
    let e = &h.engine;
    e.submit_car_in(1, "C1", "V1", None).await.unwrap();

    for id in ["M1", "nobody", ""] {
        assert!(matches!(
            e.assign_driver(1, "C1", id).await,
            Err(Error::UnknownDriver(_))
        ));
    }
    assert_eq!(
        e.get_car(1, "C1").await.unwrap().status,
        CarStatus::InRequest
    );

    // A driver of another tenant is unknown here
    h.store
        .register_user(&common::tables(2), "D9", None, "driver")
        .await
        .unwrap();
    assert!(matches!(
        e.assign_driver(1, "C1", "D9").await,
        Err(Error::UnknownDriver(_))
    ));
}

#[tokio::test]
async fn test_reassignment_rebinds_and_resets_seen() {
    let h = Harness::new().await;
    let e = &h.engine;

    let first = h.checked_in_and_assigned(1, "C1", "V1", "D1").await;
    e.mark_seen(1, "C1", Leg::Parking).await.unwrap();

    h.clock.advance(Duration::minutes(7));
    let second = e.assign_driver(1, "C1", "D2").await.unwrap();

    assert_eq!(second.status, CarStatus::AssignedParking);
    assert_eq!(second.driver_for(Leg::Parking), Some("D2"));
    assert!(!second.seen_parking);
    assert_eq!(second.driver_assigned_at, Some(h.clock_now()));
    assert_ne!(second.driver_assigned_at, first.driver_assigned_at);
    assert_eq!(e.list_active(1).await.unwrap().len(), 1);

    assert!(e.list_driver_jobs(1, "D1").await.unwrap().is_empty());
    assert_eq!(e.list_driver_jobs(1, "D2").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_mark_brought_precondition() {
    let h = Harness::new().await;
    let e = &h.engine;

    h.checked_in_and_assigned(1, "C1", "V1", "D1").await;
    e.mark_parked(1, "C1", "A1").await.unwrap();
    e.request_car_out(1, "C1").await.unwrap();

    let err = e.mark_brought(1, "C1").await.unwrap_err();
    assert!(matches!(
        err,
        Error::PreconditionFailed {
            current: CarStatus::OutRequest,
            expected: CarStatus::AssignedBringing,
            ..
        }
    ));
    assert_eq!(err.to_string(), "Car C1 is out_request, expected assigned_bringing");
    assert_eq!(
        e.get_car(1, "C1").await.unwrap().status,
        CarStatus::OutRequest
    );
}

#[tokio::test]
async fn test_out_of_order_steps_rejected() {
    let h = Harness::new().await;
    let e = &h.engine;
    e.submit_car_in(1, "C1", "V1", None).await.unwrap();

    assert!(matches!(
        e.mark_parked(1, "C1", "A1").await,
        Err(Error::InvalidTransition { .. })
    ));
    assert!(matches!(
        e.request_car_out(1, "C1").await,
        Err(Error::InvalidTransition { .. })
    ));
    assert!(matches!(
        e.mark_handed_over(1, "C1").await,
        Err(Error::PreconditionFailed { .. })
    ));
    assert!(matches!(
        e.mark_seen(1, "C1", Leg::Bringing).await,
        Err(Error::InvalidTransition { .. })
    ));
    assert!(matches!(
        e.request_car_out(1, "missing").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_mark_seen_keeps_first_timestamp() {
    let h = Harness::new().await;
    let e = &h.engine;
    h.checked_in_and_assigned(1, "C1", "V1", "D1").await;

    let first = e.mark_seen(1, "C1", Leg::Parking).await.unwrap();
    h.clock.advance(Duration::minutes(2));
    let again = e.mark_seen(1, "C1", Leg::Parking).await.unwrap();

    assert_eq!(again.status, CarStatus::AssignedParking);
    assert_eq!(again.seen_parking_at, first.seen_parking_at);
}

#[tokio::test]
async fn test_lookups() {
    let h = Harness::new().await;
    let e = &h.engine;
    e.submit_car_in(1, "C1", "V1", None).await.unwrap();

    assert_eq!(e.find_by_valet_id(1, "V1").await.unwrap().car_no, "C1");
    assert!(matches!(
        e.find_by_valet_id(1, "V2").await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(e.get_car(1, "C2").await, Err(Error::NotFound(_))));
    assert_eq!(
        e.list_drivers(1).await.unwrap(),
        vec!["D1".to_string(), "D2".to_string()]
    );
    assert!(matches!(
        e.list_driver_jobs(1, "M1").await,
        Err(Error::UnknownDriver(_))
    ));
}
