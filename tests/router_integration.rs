//! End-to-end flows over a real SQLite engine in a temp directory: the
//! clear-then-rescrape cycle, persistence across process restarts, and the
//! scraper path feeding malformed rows.

use std::sync::Arc;

use recruitdb::storage::store::meta;
use recruitdb::{Recruit, SqliteEngine, StoreRouter, TeamInfo, Timings};
use serde_json::json;

fn router(dir: &std::path::Path) -> StoreRouter {
    StoreRouter::new(Arc::new(SqliteEngine::new(dir)), Timings::default())
}

fn scraped(id: i64, name: &str, pos: &str, watched: bool) -> Recruit {
    Recruit {
        id,
        name: name.to_string(),
        pos: pos.to_string(),
        watched,
        ..Default::default()
    }
}

#[tokio::test]
async fn clear_then_rescrape_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());

    router
        .set_active_team("12345", Some(&TeamInfo::with_school_name("Acme U")))
        .await
        .unwrap();

    // First scrape.
    router
        .save_recruits(vec![
            scraped(1, "Sam Boyd", "QB", true),
            scraped(2, "Lee Marsh", "RB", false),
            scraped(3, "Chris Faber", "WR", false),
        ])
        .await
        .unwrap();
    let (total, watched) = router.refresh_team_counts().await.unwrap();
    assert_eq!((total, watched), (3, 1));

    // Re-scrape: clear, import a smaller board, refresh.
    let outcome = router.clear_all_recruits().await.unwrap();
    assert!(outcome.success);
    assert_eq!(router.get_all_recruits().await.unwrap(), vec![]);

    router
        .save_recruits(vec![scraped(4, "Pat Irwin", "K", false)])
        .await
        .unwrap();
    let (total, watched) = router.refresh_team_counts().await.unwrap();
    assert_eq!((total, watched), (1, 0));

    assert_eq!(
        router.get_team_metadata(meta::RECRUIT_COUNT).await.unwrap(),
        Some(json!(1))
    );
}

#[tokio::test]
async fn data_survives_a_router_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let router = router(dir.path());
        router
            .set_active_team(
                "12345",
                Some(&TeamInfo {
                    school_name: Some("Acme U".to_string()),
                    division: Some("D-IA".to_string()),
                    ..Default::default()
                }),
            )
            .await
            .unwrap();
        router.save_recruit(scraped(1, "Sam Boyd", "QB", true)).await.unwrap();
        router.save_config("scrapeUrl", json!("https://example.test/recruiting")).await.unwrap();
        router.shutdown().await;
    }

    // Fresh router over the same data directory, as after a restart.
    let router = router(dir.path());
    router.set_active_team("12345", None).await.unwrap();

    let recruits = router.get_all_recruits().await.unwrap();
    assert_eq!(recruits.len(), 1);
    assert_eq!(recruits[0].name, "Sam Boyd");
    assert_eq!(
        router.get_config("scrapeUrl").await.unwrap(),
        Some(json!("https://example.test/recruiting"))
    );

    // Registering with no info must not erase previously-known fields.
    let record = router.registry().get_team_info("12345").await.unwrap().unwrap();
    assert_eq!(record.school_name, "Acme U");
    assert_eq!(record.division.as_deref(), Some("D-IA"));
}

#[tokio::test]
async fn scraper_rows_with_missing_identity_are_repaired() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());
    router.set_active_team("12345", None).await.unwrap();

    let saved = router
        .save_recruits(vec![
            scraped(0, "", "QB", false),
            scraped(7, "Named Player", "", false),
        ])
        .await
        .unwrap();

    assert!(saved[0].id > 0);
    assert_eq!(saved[0].name, format!("Unknown Recruit {}", saved[0].id));
    assert_eq!(saved[1].pos, "UNK");

    let stored = router.get_all_recruits().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|r| r.id > 0 && !r.name.is_empty() && !r.pos.is_empty()));
}

#[tokio::test]
async fn rating_writeback_overwrites_whole_documents() {
    let dir = tempfile::tempdir().unwrap();
    let router = router(dir.path());
    router.set_active_team("12345", None).await.unwrap();

    router.save_recruit(scraped(1, "Sam Boyd", "QB", true)).await.unwrap();

    // The rating calculator reads, computes role ratings, writes back whole.
    let mut recruit = router.get_recruit_by_id(1).await.unwrap().unwrap();
    recruit.r1 = 87.2;
    recruit.r2 = 64.0;
    router.save_recruit(recruit).await.unwrap();

    let stored = router.get_recruit_by_id(1).await.unwrap().unwrap();
    assert_eq!(stored.r1, 87.2);
    assert!(stored.watched, "unrelated fields ride along with the document");
    assert_eq!(router.get_all_recruits().await.unwrap().len(), 1);
}
