mod common;

use common::*;
use creator_sync::db;
use creator_sync::model::{JobKind, MediaType};
use creator_sync::normalize::Normalizer;
use creator_sync::writer::upsert_batch;
use serde_json::json;

#[tokio::test]
async fn one_failing_row_does_not_abort_the_batch() {
    let pool = setup_pool().await;
    sqlx::query(
        "CREATE TRIGGER reject_c3 BEFORE INSERT ON creator_posts \
         WHEN NEW.shortcode = 'C3' BEGIN SELECT RAISE(ABORT, 'simulated write failure'); END;",
    )
    .execute(&pool)
    .await
    .unwrap();

    let raw: Vec<_> = (1..=5).map(|i| raw_post(&format!("C{}", i), i)).collect();
    let items = Normalizer::default().normalize_all(&raw, JobKind::Posts, "owner-1");
    assert_eq!(items.len(), 5);

    let report = upsert_batch(&pool, None, items, 5).await;
    assert_eq!(report.saved_count, 4);
    assert_eq!(report.results.len(), 5);
    let failed: Vec<_> = report.results.iter().filter(|r| !r.saved).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].external_id, "C3");
    assert!(failed[0].error.as_deref().unwrap().contains("simulated write failure"));

    let saved = db::list_posts(&pool, "owner-1", None, None).await.unwrap();
    let mut codes: Vec<_> = saved.iter().map(|p| p.external_id.clone()).collect();
    codes.sort();
    assert_eq!(codes, vec!["C1", "C2", "C4", "C5"]);
}

#[tokio::test]
async fn batch_rehosts_media_with_fallback() {
    let pool = setup_pool().await;
    let host = FakeHost::default();
    let raw = vec![raw_post("GOOD", 1), raw_post("BAD", 2)];
    let items = Normalizer::default().normalize_all(&raw, JobKind::Posts, "owner-1");

    let report = upsert_batch(&pool, Some(&host), items, 2).await;
    assert_eq!(report.saved_count, 2);
    assert_eq!(host.uploads.lock().await.len(), 2);

    let saved = db::list_posts(&pool, "owner-1", None, None).await.unwrap();
    let bad = saved.iter().find(|p| p.external_id == "BAD").unwrap();
    assert_eq!(bad.media_url.as_deref(), Some("https://scontent.example/BAD.jpg"));
    let good = saved.iter().find(|p| p.external_id == "GOOD").unwrap();
    assert_eq!(
        good.media_url.as_deref(),
        Some("https://res.example/demo/image/upload/w_200,h_200,c_fill,f_auto,q_auto/creators/owner-1/thumbnails/thumb_GOOD")
    );
    assert_eq!(good.source_media_url.as_deref(), Some("https://scontent.example/GOOD.jpg"));
}

fn raw_stories() -> Vec<serde_json::Value> {
    vec![
        json!({
            "id": "3301",
            "media_type": 2,
            "video_url": "https://scontent.example/s1.mp4",
            "image_url": "https://scontent.example/s1.jpg",
            "taken_at": 1714560000,
            "video_duration": 7.5
        }),
        json!({
            "image_url": "https://scontent.example/s2.jpg",
            "taken_at": 1714560100
        }),
    ]
}

#[tokio::test]
async fn stories_without_owner_are_returned_not_saved() {
    let pool = setup_pool().await;
    let provider = FakeProvider::default();
    provider.state.lock().await.stories = raw_stories();
    let svc = service(pool.clone(), &provider, None, test_config());

    let stories = svc
        .download_stories("highlight:17934390166227766", Some("Tokyo"), None)
        .await
        .unwrap();
    assert_eq!(stories.len(), 2);
    assert_eq!(stories[0].external_id, "3301");
    assert_eq!(stories[0].media_type, MediaType::Video);
    assert_eq!(stories[0].media_url.as_deref(), Some("https://scontent.example/s1.mp4"));
    assert_eq!(stories[0].duration_seconds, Some(7.5));
    assert_eq!(stories[1].external_id, "story-1");
    assert_eq!(stories[1].highlight_id, "17934390166227766");

    let count = db::count_stories(&pool, "owner-1", "17934390166227766")
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn stories_with_owner_are_rehosted_and_saved() {
    let pool = setup_pool().await;
    let provider = FakeProvider::default();
    provider.state.lock().await.stories = raw_stories();
    let host = FakeHost::default();
    let svc = service(pool.clone(), &provider, Some(&host), test_config());

    let stories = svc
        .download_stories("17934390166227766", Some("Tokyo"), Some("owner-1"))
        .await
        .unwrap();
    assert_eq!(
        stories[0].media_url.as_deref(),
        Some("https://res.example/demo/video/upload/creators/owner-1/stories/story-3301")
    );
    let uploads = host.uploads.lock().await;
    assert_eq!(uploads.len(), 2);
    assert!(uploads.iter().any(|u| u.media_type == MediaType::Video));
    drop(uploads);

    // A second download upserts the same frames.
    svc.download_stories("17934390166227766", Some("Tokyo"), Some("owner-1"))
        .await
        .unwrap();
    let count = db::count_stories(&pool, "owner-1", "17934390166227766")
        .await
        .unwrap();
    assert_eq!(count, 2);
}
