//! Tests for job_store (in-memory database).

use std::time::Duration;

use crate::job_store::{
    unix_timestamp, ItemResult, ItemStatus, JobDb, JobFilter, JobStatus, Lease, NewJob,
    RequestedItem,
};
use crate::testing::lease;

fn new_job(owner: &str, priority: u8, n: usize) -> NewJob {
    NewJob {
        owner_id: owner.to_string(),
        priority,
        items: (0..n)
            .map(|i| RequestedItem::new(format!("https://example.com/{i}.bin")))
            .collect(),
        metadata: None,
    }
}

fn success(path: &str) -> ItemResult {
    ItemResult {
        status: ItemStatus::Success,
        filepath: Some(path.to_string()),
        size: Some(3),
        checksum: Some("abc".into()),
        error: None,
        attempts: 1,
        completed_at: unix_timestamp(),
    }
}

#[tokio::test]
async fn create_and_get_roundtrip() {
    let db = JobDb::open_memory().await.unwrap();
    let mut job = new_job("alice", 7, 2);
    job.items[1].destination_hint = Some("b.tif".into());
    job.metadata = Some(serde_json::json!({"source": "catalog"}));
    let id = db.create_job(&job).await.unwrap();

    let rec = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(rec.job_id, id);
    assert_eq!(rec.owner_id, "alice");
    assert_eq!(rec.status, JobStatus::Pending);
    assert_eq!(rec.priority, 7);
    assert_eq!(rec.items, job.items);
    assert_eq!(rec.metadata, job.metadata);
    assert!(rec.results.is_empty());
    assert!(rec.started_at.is_none());
    assert!(db.get_job("no-such-job").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_job_is_refused() {
    let db = JobDb::open_memory().await.unwrap();
    assert!(db.create_job(&new_job("alice", 5, 0)).await.is_err());
}

#[tokio::test]
async fn claim_order_is_priority_then_fifo() {
    let db = JobDb::open_memory().await.unwrap();
    let low = db.create_job(&new_job("o", 1, 1)).await.unwrap();
    let mid_a = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    let high = db.create_job(&new_job("o", 10, 1)).await.unwrap();
    let mid_b = db.create_job(&new_job("o", 5, 1)).await.unwrap();

    let mut order = Vec::new();
    while let Some(id) = db.claim_next_pending(&lease()).await.unwrap() {
        order.push(id);
    }
    assert_eq!(order, vec![high, mid_a, mid_b, low]);
}

#[tokio::test]
async fn claimed_job_is_not_claimed_twice() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    assert_eq!(db.claim_next_pending(&lease()).await.unwrap(), Some(id.clone()));
    assert_eq!(db.claim_next_pending(&lease()).await.unwrap(), None);
    let rec = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(rec.status, JobStatus::InProgress);
    assert!(rec.started_at.is_some());
}

#[tokio::test]
async fn first_result_for_an_index_wins() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 3)).await.unwrap();
    db.claim_next_pending(&lease()).await.unwrap();

    assert!(db
        .record_item_result(&id, 0, &success("/d/0.bin"), Some("0.bin"))
        .await
        .unwrap());
    assert!(!db
        .record_item_result(&id, 0, &ItemResult::failed("late", 2, 0), None)
        .await
        .unwrap());
    assert!(db
        .record_item_result(&id, 2, &ItemResult::failed("HTTP 404", 1, 0), Some("2.bin"))
        .await
        .unwrap());

    let rec = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(rec.results.len(), 2);
    assert_eq!(rec.results[&0].status, ItemStatus::Success);
    assert_eq!(rec.results[&2].error.as_deref(), Some("HTTP 404"));
    assert_eq!(rec.current_file.as_deref(), Some("2.bin"));
    let p = rec.progress();
    assert_eq!((p.total, p.completed, p.failed, p.skipped), (3, 1, 1, 0));
}

#[tokio::test]
async fn finish_is_one_way() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    // Not in progress yet.
    assert!(!db.finish_job(&id, JobStatus::Completed, &lease()).await.unwrap());

    db.claim_next_pending(&lease()).await.unwrap();
    db.record_item_result(&id, 0, &success("/d/0.bin"), Some("0.bin"))
        .await
        .unwrap();
    assert!(db.finish_job(&id, JobStatus::Completed, &lease()).await.unwrap());
    assert!(!db.finish_job(&id, JobStatus::Failed, &lease()).await.unwrap());
    assert!(db.finish_job(&id, JobStatus::InProgress, &lease()).await.is_err());

    let rec = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(rec.status, JobStatus::Completed);
    assert!(rec.finished_at.is_some());
    assert!(rec.current_file.is_none());

    // Recovery only touches in-progress jobs.
    assert_eq!(db.recover_in_progress().await.unwrap(), 0);
    assert_eq!(db.claim_next_pending(&lease()).await.unwrap(), None);
}

#[tokio::test]
async fn cancel_pending_job_is_immediate() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 2)).await.unwrap();
    let status = db.request_cancel(&id, Some("user request")).await.unwrap();
    assert_eq!(status, Some(JobStatus::Cancelled));

    let rec = db.get_job(&id).await.unwrap().unwrap();
    assert!(rec.finished_at.is_some());
    assert_eq!(rec.cancel_reason.as_deref(), Some("user request"));
    assert!(rec.results.is_empty());
    assert_eq!(rec.progress().skipped, 2);
    // Never dispatched.
    assert_eq!(db.claim_next_pending(&lease()).await.unwrap(), None);
}

#[tokio::test]
async fn cancel_running_job_sets_flag_only() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 2)).await.unwrap();
    db.claim_next_pending(&lease()).await.unwrap();
    assert!(!db.is_cancel_requested(&id).await.unwrap());

    let status = db.request_cancel(&id, None).await.unwrap();
    assert_eq!(status, Some(JobStatus::InProgress));
    assert!(db.is_cancel_requested(&id).await.unwrap());

    // Second request keeps the first reason and changes nothing.
    db.request_cancel(&id, Some("again")).await.unwrap();
    assert!(db.get_job(&id).await.unwrap().unwrap().cancel_reason.is_none());

    assert!(db.finish_job(&id, JobStatus::Cancelled, &lease()).await.unwrap());
    assert_eq!(
        db.request_cancel(&id, None).await.unwrap(),
        Some(JobStatus::Cancelled)
    );
}

#[tokio::test]
async fn cancel_terminal_or_missing_job() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    db.claim_next_pending(&lease()).await.unwrap();
    db.record_item_result(&id, 0, &success("/d/0.bin"), None)
        .await
        .unwrap();
    db.finish_job(&id, JobStatus::Completed, &lease()).await.unwrap();

    assert_eq!(
        db.request_cancel(&id, None).await.unwrap(),
        Some(JobStatus::Completed)
    );
    assert!(!db.is_cancel_requested(&id).await.unwrap());
    assert_eq!(db.request_cancel("missing", None).await.unwrap(), None);
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let db = JobDb::open_memory().await.unwrap();
    let mut alice = Vec::new();
    for _ in 0..5 {
        alice.push(db.create_job(&new_job("alice", 5, 1)).await.unwrap());
    }
    let bob = db.create_job(&new_job("bob", 5, 1)).await.unwrap();
    db.request_cancel(&alice[0], None).await.unwrap();

    let by_alice = JobFilter {
        owner_id: Some("alice".into()),
        status: None,
    };
    let (page1, total) = db.list_jobs(&by_alice, 0, 2).await.unwrap();
    assert_eq!(total, 5);
    assert_eq!(page1.len(), 2);
    // Newest first.
    assert_eq!(page1[0].job_id, alice[4]);
    assert_eq!(page1[1].job_id, alice[3]);
    let (page3, _) = db.list_jobs(&by_alice, 4, 2).await.unwrap();
    assert_eq!(page3.len(), 1);
    assert_eq!(page3[0].job_id, alice[0]);

    let cancelled = JobFilter {
        owner_id: None,
        status: Some(JobStatus::Cancelled),
    };
    let (jobs, total) = db.list_jobs(&cancelled, 0, 10).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(jobs[0].job_id, alice[0]);

    let (all, total) = db.list_jobs(&JobFilter::default(), 0, 100).await.unwrap();
    assert_eq!(total, 6);
    assert_eq!(all[0].job_id, bob);
    assert_eq!(all[0].total_items, 1);
}

#[tokio::test]
async fn queue_position_counts_jobs_ahead() {
    let db = JobDb::open_memory().await.unwrap();
    let a = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    let b = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    let urgent = db.create_job(&new_job("o", 9, 1)).await.unwrap();

    assert_eq!(db.queue_position(&urgent).await.unwrap(), Some(1));
    assert_eq!(db.queue_position(&a).await.unwrap(), Some(2));
    assert_eq!(db.queue_position(&b).await.unwrap(), Some(3));

    db.claim_next_pending(&lease()).await.unwrap();
    assert_eq!(db.queue_position(&urgent).await.unwrap(), None);
    assert_eq!(db.queue_position(&a).await.unwrap(), Some(1));
    assert_eq!(db.queue_position("missing").await.unwrap(), None);
}

#[tokio::test]
async fn expired_and_delete() {
    let db = JobDb::open_memory().await.unwrap();
    let done = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    let waiting = db.create_job(&new_job("o", 1, 1)).await.unwrap();
    db.claim_next_pending(&lease()).await.unwrap();
    db.record_item_result(&done, 0, &success("/d/0.bin"), None)
        .await
        .unwrap();
    db.finish_job(&done, JobStatus::Completed, &lease()).await.unwrap();

    let now = unix_timestamp();
    assert!(db.list_expired(now - 3600).await.unwrap().is_empty());
    let expired = db.list_expired(now + 10).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].job_id, done);
    assert_eq!(expired[0].owner_id, "o");

    assert!(db.delete_job(&done).await.unwrap());
    assert!(!db.delete_job(&done).await.unwrap());
    assert!(db.get_job(&done).await.unwrap().is_none());
    assert!(db.get_job(&waiting).await.unwrap().is_some());
}

#[tokio::test]
async fn recover_returns_lapsed_jobs_to_queue_with_results() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 3)).await.unwrap();
    let dead = Lease::new("dead-worker", Duration::ZERO);
    db.claim_next_pending(&dead).await.unwrap();
    db.record_item_result(&id, 1, &success("/d/1.bin"), Some("1.bin"))
        .await
        .unwrap();

    assert_eq!(db.recover_in_progress().await.unwrap(), 1);
    let rec = db.get_job(&id).await.unwrap().unwrap();
    assert_eq!(rec.status, JobStatus::Pending);
    assert_eq!(rec.results.len(), 1);
    assert!(rec.current_file.is_none());
    // The old holder can neither renew nor finish it any more.
    assert!(!db.renew_lease(&id, &dead).await.unwrap());
    assert_eq!(db.claim_next_pending(&lease()).await.unwrap(), Some(id.clone()));
    assert!(!db.finish_job(&id, JobStatus::Completed, &dead).await.unwrap());
}

#[tokio::test]
async fn recover_leaves_live_leases_alone() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    db.claim_next_pending(&lease()).await.unwrap();

    assert_eq!(db.recover_in_progress().await.unwrap(), 0);
    assert_eq!(
        db.get_job(&id).await.unwrap().unwrap().status,
        JobStatus::InProgress
    );
    assert!(db.renew_lease(&id, &lease()).await.unwrap());
    let other = Lease::new("other-worker", Duration::from_secs(60));
    assert!(!db.renew_lease(&id, &other).await.unwrap());
    assert!(!db.finish_job(&id, JobStatus::Completed, &other).await.unwrap());
}

#[tokio::test]
async fn renewed_lease_outlives_its_first_expiry() {
    let db = JobDb::open_memory().await.unwrap();
    let id = db.create_job(&new_job("o", 5, 1)).await.unwrap();
    let short = Lease::new("short-worker", Duration::from_millis(400));
    db.claim_next_pending(&short).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(db.renew_lease(&id, &short).await.unwrap());
    tokio::time::sleep(Duration::from_millis(250)).await;
    // Past the original expiry, inside the renewed one.
    assert_eq!(db.recover_in_progress().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(db.recover_in_progress().await.unwrap(), 1);
}

#[tokio::test]
async fn file_backed_db_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state").join("jobs.db");
    let id = {
        let db = JobDb::open_at(&path).await.unwrap();
        db.create_job(&new_job("o", 5, 1)).await.unwrap()
    };
    let db = JobDb::open_at(&path).await.unwrap();
    assert_eq!(
        db.get_job(&id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );
}
