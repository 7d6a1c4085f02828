//! Integration tests: concurrent writes on the same car

mod common;

use common::Harness;
use valet_core::{CarStatus, Error, Leg};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_assignments_leave_one_driver() {
    let h = Harness::new().await;
    h.engine
        .submit_car_in(1, "C1", "V1", None)
        .await
        .unwrap();

    let (first, second) = tokio::join!(
        h.engine.assign_driver(1, "C1", "D1"),
        h.engine.assign_driver(1, "C1", "D2"),
    );

    // Both requests are valid; they serialize and the last writer wins
    let winners: Vec<String> = [first, second]
        .into_iter()
        .filter_map(|result| result.ok())
        .map(|record| record.driver_for(Leg::Parking).unwrap_or_default().to_string())
        .collect();
    assert!(!winners.is_empty());

    let record = h.engine.get_car(1, "C1").await.unwrap();
    assert_eq!(record.status, CarStatus::AssignedParking);
    let driver = record.driver_for(Leg::Parking).unwrap();
    assert!(driver == "D1" || driver == "D2");
    assert!(winners.iter().any(|w| w == driver));
    assert!(record.driver_assigned_for_bringing.is_none());
    assert_eq!(h.engine.list_active(1).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_car_in_same_key() {
    let h = Harness::new().await;

    let (first, second) = tokio::join!(
        h.engine.submit_car_in(1, "C1", "V1", None),
        h.engine.submit_car_in(1, "C1", "V2", None),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(Error::DuplicateKey { .. })))
    );
    assert_eq!(h.engine.list_active(1).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_hand_over_archives_once() {
    let h = Harness::new().await;
    h.brought_to_client(1, "C1", "V1").await;

    let (first, second) = tokio::join!(
        h.engine.mark_handed_over(1, "C1"),
        h.engine.mark_handed_over(1, "C1"),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(Error::NotFound(_))))
    );

    let archived = h.engine.search(1, None, true).await.unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].record.status, CarStatus::HandedOver);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_cars_progress_independently() {
    let h = Harness::new().await;
    for i in 0..6 {
        h.engine
            .submit_car_in(1, &format!("C{i}"), &format!("V{i}"), None)
            .await
            .unwrap();
    }

    let assignments = (0..6).map(|i| {
        let engine = &h.engine;
        async move {
            let car_no = format!("C{i}");
            let driver = if i % 2 == 0 { "D1" } else { "D2" };
            engine.assign_driver(1, &car_no, driver).await
        }
    });
    for result in futures::future::join_all(assignments).await {
        assert_eq!(result.unwrap().status, CarStatus::AssignedParking);
    }

    assert_eq!(h.engine.list_driver_jobs(1, "D1").await.unwrap().len(), 3);
    assert_eq!(h.engine.list_driver_jobs(1, "D2").await.unwrap().len(), 3);
}
