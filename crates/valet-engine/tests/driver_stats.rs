//! Integration tests: per-driver statistics

mod common;

use chrono::Duration;
use common::Harness;
use valet_core::DriverStats;

fn stats_for<'a>(stats: &'a [DriverStats], driver_id: &str) -> &'a DriverStats {
    stats
        .iter()
        .find(|s| s.driver_id == driver_id)
        .unwrap_or_else(|| panic!("no stats for {driver_id}"))
}

#[tokio::test]
async fn test_driver_stats_count_both_data_sets() {
    let h = Harness::new().await;
    let e = &h.engine;

    // Parked yesterday by D1: not completed today
    h.clock.set(common::start_time() - Duration::days(1));
    h.checked_in_and_assigned(1, "C4", "V4", "D1").await;
    e.mark_parked(1, "C4", "P4").await.unwrap();
    h.clock.set(common::start_time());

    // C1: parked by D1 and brought by D2 today, then archived
    h.brought_to_client(1, "C1", "V1").await;
    e.mark_handed_over(1, "C1").await.unwrap();

    // C2: parked by D1 today, bringing leg in progress with D1
    h.checked_in_and_assigned(1, "C2", "V2", "D1").await;
    e.mark_parked(1, "C2", "P2").await.unwrap();
    e.request_car_out(1, "C2").await.unwrap();
    e.assign_driver(1, "C2", "D1").await.unwrap();

    // C3: parking leg in progress with D2
    h.checked_in_and_assigned(1, "C3", "V3", "D2").await;

    let stats = e.driver_stats(1).await.unwrap();
    assert_eq!(stats.len(), 2);

    // Per-leg fields count live assignments; completions span both data sets
    let d1 = stats_for(&stats, "D1");
    assert_eq!(d1.parking_today, 0);
    assert_eq!(d1.retrieval_today, 1);
    assert_eq!(d1.jobs_in_progress, 1);
    assert_eq!(d1.jobs_completed_today, 2);

    let d2 = stats_for(&stats, "D2");
    assert_eq!(d2.parking_today, 1);
    assert_eq!(d2.retrieval_today, 0);
    assert_eq!(d2.jobs_in_progress, 1);
    assert_eq!(d2.jobs_completed_today, 1);
}

#[tokio::test]
async fn test_driver_stats_roll_over_at_midnight() {
    let h = Harness::new().await;
    h.brought_to_client(1, "C1", "V1").await;

    let today = h.engine.driver_stats(1).await.unwrap();
    assert_eq!(stats_for(&today, "D1").jobs_completed_today, 1);
    assert_eq!(stats_for(&today, "D2").jobs_completed_today, 1);
    assert!(today.iter().all(|s| s.jobs_in_progress == 0));

    h.clock.advance(Duration::days(1));
    let tomorrow = h.engine.driver_stats(1).await.unwrap();
    for stats in &tomorrow {
        assert_eq!(stats.jobs_completed_today, 0);
        assert_eq!(stats.jobs_in_progress, 0);
        assert_eq!(stats.parking_today + stats.retrieval_today, 0);
    }
}

#[tokio::test]
async fn test_driver_stats_per_tenant() {
    let h = Harness::new().await;
    h.checked_in_and_assigned(2, "C1", "V1", "D1").await;

    let site1 = h.engine.driver_stats(1).await.unwrap();
    assert!(site1.iter().all(|s| s.jobs_in_progress == 0));

    let site2 = h.engine.driver_stats(2).await.unwrap();
    let d1 = stats_for(&site2, "D1");
    assert_eq!(d1.jobs_in_progress, 1);
    assert_eq!(d1.parking_today, 1);
    assert_eq!(d1.retrieval_today, 0);
}

#[tokio::test]
async fn test_driver_stats_split_assignments_by_leg() {
    let h = Harness::new().await;
    let e = &h.engine;

    h.checked_in_and_assigned(1, "C1", "V1", "D1").await;
    h.checked_in_and_assigned(1, "C2", "V2", "D1").await;
    h.checked_in_and_assigned(1, "C3", "V3", "D1").await;
    e.mark_parked(1, "C3", "P3").await.unwrap();
    e.request_car_out(1, "C3").await.unwrap();
    e.assign_driver(1, "C3", "D1").await.unwrap();

    let stats = e.driver_stats(1).await.unwrap();
    let d1 = stats_for(&stats, "D1");
    assert_eq!(d1.parking_today, 2);
    assert_eq!(d1.retrieval_today, 1);
    assert_eq!(d1.jobs_in_progress, 3);
    assert_eq!(d1.jobs_completed_today, 1);

    // Finishing a leg moves it from in-progress to completed
    e.mark_brought(1, "C3").await.unwrap();
    let stats = e.driver_stats(1).await.unwrap();
    let d1 = stats_for(&stats, "D1");
    assert_eq!(d1.retrieval_today, 0);
    assert_eq!(d1.jobs_in_progress, 2);
    assert_eq!(d1.jobs_completed_today, 2);
}
