use super::*;
use tempfile::TempDir;

async fn governor(limits: UsageLimits) -> (TempDir, UsageGovernor) {
    let dir = TempDir::new().expect("should create temp dir");
    let db = Database::new(dir.path().join("test.db"))
        .await
        .expect("should open database");
    (dir, UsageGovernor::new(db, limits))
}

fn default_limits() -> UsageLimits {
    UsageLimits {
        request_limit: 50,
        token_limit: 200_000,
    }
}

#[tokio::test]
async fn admits_up_to_the_limit_then_rejects() {
    let (_dir, governor) = governor(default_limits()).await;

    for i in 0..50 {
        governor
            .check_and_increment("u1")
            .await
            .unwrap_or_else(|e| panic!("request {} should be admitted: {}", i + 1, e));
    }

    let err = governor
        .check_and_increment("u1")
        .await
        .expect_err("51st request should be rejected");
    assert!(matches!(err, RagError::RateLimit { limit: 50 }));
}

#[tokio::test]
async fn limits_are_per_user() {
    let (_dir, governor) = governor(UsageLimits {
        request_limit: 1,
        token_limit: 1000,
    })
    .await;

    governor
        .check_and_increment("u1")
        .await
        .expect("u1 first request admitted");
    governor
        .check_and_increment("u1")
        .await
        .expect_err("u1 second request rejected");

    governor
        .check_and_increment("u2")
        .await
        .expect("u2 unaffected by u1's counter");
}

#[tokio::test]
async fn token_ceiling_blocks_next_request() {
    let (_dir, governor) = governor(UsageLimits {
        request_limit: 50,
        token_limit: 100,
    })
    .await;

    governor
        .check_and_increment("u1")
        .await
        .expect("first request admitted");

    // Write-time accounting is unbounded; the ceiling bites on the next gate.
    governor
        .add_tokens("u1", 250)
        .await
        .expect("token accounting should succeed");

    let err = governor
        .check_and_increment("u1")
        .await
        .expect_err("over-budget user should be rejected");
    assert!(matches!(err, RagError::TokenLimit { limit: 100 }));
}

#[tokio::test]
async fn non_positive_token_counts_are_ignored() {
    let (_dir, governor) = governor(default_limits()).await;

    governor.add_tokens("u1", 0).await.expect("zero is a no-op");
    governor
        .add_tokens("u1", -10)
        .await
        .expect("negative is a no-op");

    let snapshot = governor.snapshot("u1").await.expect("should snapshot");
    assert_eq!(snapshot.tokens_used, 0);
}

#[tokio::test]
async fn request_counter_resets_after_a_day() {
    let (_dir, governor) = governor(UsageLimits {
        request_limit: 2,
        token_limit: 1000,
    })
    .await;

    let start = Utc::now();
    governor
        .check_and_increment_at("u1", start)
        .await
        .expect("admitted");
    governor
        .check_and_increment_at("u1", start)
        .await
        .expect("admitted");
    governor
        .check_and_increment_at("u1", start)
        .await
        .expect_err("limit reached");

    // Just under a day: still limited.
    let almost = start + Duration::hours(23);
    governor
        .check_and_increment_at("u1", almost)
        .await
        .expect_err("window has not elapsed");

    // Past the window: counter resets and requests flow again.
    let next_day = start + Duration::hours(25);
    governor
        .check_and_increment_at("u1", next_day)
        .await
        .expect("window elapsed, admitted again");
}

#[tokio::test]
async fn token_counter_resets_after_thirty_days() {
    let (_dir, governor) = governor(UsageLimits {
        request_limit: 100,
        token_limit: 100,
    })
    .await;

    let start = Utc::now();
    governor
        .check_and_increment_at("u1", start)
        .await
        .expect("admitted");
    governor.add_tokens("u1", 500).await.expect("tokens recorded");

    governor
        .check_and_increment_at("u1", start + Duration::days(1))
        .await
        .expect_err("token budget exhausted");

    governor
        .check_and_increment_at("u1", start + Duration::days(31))
        .await
        .expect("token window elapsed, admitted again");

    let snapshot = governor.snapshot("u1").await.expect("should snapshot");
    assert_eq!(snapshot.tokens_used, 0);
}

#[tokio::test]
async fn resets_are_independent() {
    let (_dir, governor) = governor(UsageLimits {
        request_limit: 1,
        token_limit: 1000,
    })
    .await;

    let start = Utc::now();
    governor
        .check_and_increment_at("u1", start)
        .await
        .expect("admitted");
    governor.add_tokens("u1", 300).await.expect("tokens recorded");

    // A day later the request counter resets, but token usage carries over.
    let next_day = start + Duration::hours(25);
    governor
        .check_and_increment_at("u1", next_day)
        .await
        .expect("request counter reset");

    let record = UsageQueries::get(governor.db.pool(), "u1")
        .await
        .expect("should query")
        .expect("record exists");
    assert_eq!(record.tokens_used, 300);
}

#[tokio::test]
async fn concurrent_requests_at_boundary_admit_exactly_the_limit() {
    let (_dir, governor) = governor(UsageLimits {
        request_limit: 10,
        token_limit: 100_000,
    })
    .await;
    let governor = std::sync::Arc::new(governor);

    let mut handles = Vec::new();
    for _ in 0..25 {
        let governor = std::sync::Arc::clone(&governor);
        handles.push(tokio::spawn(async move {
            governor.check_and_increment("u1").await.is_ok()
        }));
    }

    let mut admitted = 0;
    for handle in handles {
        if handle.await.expect("task should not panic") {
            admitted += 1;
        }
    }

    assert_eq!(admitted, 10);
    let snapshot = governor.snapshot("u1").await.expect("should snapshot");
    assert_eq!(snapshot.request_count, 10);
}
