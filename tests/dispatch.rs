// tests/dispatch.rs
//
// Reading window + dispatch controller against a recording transport.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{enable_auto_push, insert_item, temp_db, webhook_channel, RecordingTransport};
use news_intel::db::{Db, PushedFilter, ReadingFilter};
use news_intel::dispatch::{AutoPushOutcome, DispatchOutcome, Dispatcher, WindowChange};
use news_intel::models::{EmailTemplate, Enrichment, NewsItem, PushTask, ReadingState};

/// Insert `n` items and enter them into the window one second apart (oldest first).
async fn window_items(db: &Db, n: usize, category: &str) -> Vec<NewsItem> {
    let base = Utc::now() - Duration::hours(1);
    let mut out = Vec::new();
    for i in 0..n {
        let item = insert_item(db, &format!("{category} {i}"), category).await;
        let e = Enrichment {
            trans_title: format!("T:{}", item.title),
            trans_summary: "S".into(),
        };
        db.mark_enriched(&item.id, &e, base + Duration::seconds(i as i64))
            .await
            .unwrap();
        out.push(db.get_news(&item.id).await.unwrap().unwrap());
    }
    out
}

fn task(channel_id: &str, categories: &str) -> PushTask {
    PushTask {
        id: String::new(),
        name: "morning".into(),
        cron_expr: "0 8 * * *".into(),
        channel_id: channel_id.into(),
        template_id: String::new(),
        categories: categories.into(),
        enabled: true,
        last_run_at: None,
        created_at: None,
    }
}

#[tokio::test]
async fn auto_push_waits_below_threshold_and_fires_at_it() {
    let (_dir, db) = temp_db().await;
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(db.clone(), transport.clone());
    let ch = webhook_channel(&db, true).await;
    enable_auto_push(&db, &ch.id, 3).await;

    let items = window_items(&db, 2, "tech").await;
    let out = dispatcher.check_and_auto_push().await.unwrap();
    assert_eq!(out, AutoPushOutcome::Waiting { pending: 2, threshold: 3 });
    assert_eq!(transport.count(), 0);

    let more = window_items(&db, 2, "ai").await;
    let out = dispatcher.check_and_auto_push().await.unwrap();
    assert_eq!(out, AutoPushOutcome::Pushed { count: 3 });
    assert_eq!(transport.count(), 1);

    // oldest three went out; the newest stays pending
    for it in items.iter().chain(&more[..1]) {
        let got = db.get_news(&it.id).await.unwrap().unwrap();
        assert_eq!(got.reading_state(), ReadingState::InWindowPushed, "{}", it.title);
        assert!(got.pushed_at.is_some());
    }
    let last = db.get_news(&more[1].id).await.unwrap().unwrap();
    assert_eq!(last.reading_state(), ReadingState::InWindowUnpushed);
    assert_eq!(dispatcher.pending_count().await.unwrap(), 1);

    // below threshold again: no second delivery
    assert!(matches!(
        dispatcher.check_and_auto_push().await.unwrap(),
        AutoPushOutcome::Waiting { pending: 1, .. }
    ));
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn auto_push_without_policy_or_channel_is_a_no_op() {
    let (_dir, db) = temp_db().await;
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(db.clone(), transport.clone());
    window_items(&db, 8, "tech").await;

    assert_eq!(dispatcher.check_and_auto_push().await.unwrap(), AutoPushOutcome::Disabled);

    enable_auto_push(&db, "", 2).await;
    assert_eq!(dispatcher.check_and_auto_push().await.unwrap(), AutoPushOutcome::NoChannel);

    enable_auto_push(&db, "missing", 2).await;
    assert_eq!(dispatcher.check_and_auto_push().await.unwrap(), AutoPushOutcome::NoChannel);

    let off = webhook_channel(&db, false).await;
    enable_auto_push(&db, &off.id, 2).await;
    assert_eq!(dispatcher.check_and_auto_push().await.unwrap(), AutoPushOutcome::NoChannel);

    assert_eq!(transport.count(), 0);
    assert_eq!(dispatcher.pending_count().await.unwrap(), 8);
}

#[tokio::test]
async fn non_positive_threshold_falls_back_to_default() {
    let (_dir, db) = temp_db().await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(RecordingTransport::default()));
    let ch = webhook_channel(&db, true).await;
    enable_auto_push(&db, &ch.id, 0).await;
    window_items(&db, 5, "tech").await;

    assert_eq!(
        dispatcher.check_and_auto_push().await.unwrap(),
        AutoPushOutcome::Waiting { pending: 5, threshold: 6 }
    );
}

#[tokio::test]
async fn failed_delivery_leaves_every_item_unpushed() {
    let (_dir, db) = temp_db().await;
    let transport = Arc::new(RecordingTransport::failing());
    let dispatcher = Dispatcher::new(db.clone(), transport.clone());
    let ch = webhook_channel(&db, true).await;
    enable_auto_push(&db, &ch.id, 2).await;
    let items = window_items(&db, 3, "tech").await;

    assert!(dispatcher.check_and_auto_push().await.is_err());
    for it in &items {
        let got = db.get_news(&it.id).await.unwrap().unwrap();
        assert!(!got.pushed);
        assert!(got.pushed_at.is_none());
    }

    // once the channel recovers the same items go out
    *transport.fail.lock() = false;
    assert_eq!(
        dispatcher.check_and_auto_push().await.unwrap(),
        AutoPushOutcome::Pushed { count: 2 }
    );
}

#[tokio::test]
async fn push_task_sends_newest_first_within_categories() {
    let (_dir, db) = temp_db().await;
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(db.clone(), transport.clone());
    let ch = webhook_channel(&db, true).await;
    let tech = window_items(&db, 3, "tech").await;
    let sports = window_items(&db, 2, "sports").await;

    let out = dispatcher.execute_push_task(&task(&ch.id, "tech, ai")).await.unwrap();
    assert_eq!(out, DispatchOutcome::Delivered { count: 3 });

    let sent = transport.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    let (kind, msg) = &sent[0];
    assert_eq!(*kind, "webhook");
    // newest (tech 2) listed first
    assert!(msg.body.starts_with("**1. T:tech 2**"), "{}", msg.body);
    assert!(!msg.body.contains("sports"));

    for it in &sports {
        assert!(!db.get_news(&it.id).await.unwrap().unwrap().pushed);
    }
    for it in &tech {
        assert!(db.get_news(&it.id).await.unwrap().unwrap().pushed);
    }

    // nothing left for that filter: no delivery at all
    let out = dispatcher.execute_push_task(&task(&ch.id, "tech")).await.unwrap();
    assert_eq!(out, DispatchOutcome::Empty);
    assert_eq!(transport.count(), 1);
}

#[tokio::test]
async fn push_task_rejects_missing_or_disabled_channel() {
    let (_dir, db) = temp_db().await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(RecordingTransport::default()));
    window_items(&db, 1, "tech").await;

    assert!(dispatcher.execute_push_task(&task("nope", "")).await.is_err());
    let off = webhook_channel(&db, false).await;
    assert!(dispatcher.execute_push_task(&task(&off.id, "")).await.is_err());
    assert_eq!(dispatcher.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn email_channel_uses_stored_template() {
    let (_dir, db) = temp_db().await;
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(db.clone(), transport.clone());
    let ch = db
        .create_channel(&news_intel::models::PushChannel {
            id: String::new(),
            name: "mail".into(),
            kind: "email".into(),
            config: r#"{"smtp_host":"smtp.test","from_address":"a@b.test","to_addresses":"c@d.test"}"#.into(),
            enabled: true,
            created_at: None,
        })
        .await
        .unwrap();
    let tpl = db
        .create_template(&EmailTemplate {
            name: "plain".into(),
            subject: "{{count}} new".into(),
            content: "<ol>{{#each news}}<li>{{title}}</li>{{/each}}</ol>".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    window_items(&db, 2, "tech").await;

    let mut t = task(&ch.id, "");
    t.template_id = tpl.id.clone();
    dispatcher.execute_push_task(&t).await.unwrap();

    let sent = transport.sent.lock().clone();
    let (kind, msg) = &sent[0];
    assert_eq!(*kind, "email");
    assert_eq!(msg.title, "2 new");
    assert_eq!(msg.body, "<ol><li>T:tech 1</li><li>T:tech 0</li></ol>");
}

#[tokio::test]
async fn window_edits_follow_the_state_machine() {
    let (_dir, db) = temp_db().await;
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher = Dispatcher::new(db.clone(), transport.clone());
    let ch = webhook_channel(&db, true).await;

    let raw = insert_item(&db, "unprocessed", "tech").await;
    assert_eq!(
        dispatcher.add_to_reading(&raw.id).await.unwrap(),
        WindowChange::Rejected("news has not been processed yet")
    );
    assert_eq!(dispatcher.add_to_reading("missing").await.unwrap(), WindowChange::NotFound);

    let items = window_items(&db, 2, "tech").await;
    assert!(matches!(
        dispatcher.remove_from_reading(&items[0].id).await.unwrap(),
        WindowChange::Rejected(_)
    ));

    dispatcher.execute_push_task(&task(&ch.id, "")).await.unwrap();
    assert_eq!(dispatcher.remove_from_reading(&items[0].id).await.unwrap(), WindowChange::Updated);
    let gone = db.get_news(&items[0].id).await.unwrap().unwrap();
    assert_eq!(gone.reading_state(), ReadingState::Cleared);

    // re-adding a delivered item keeps it delivered
    assert_eq!(dispatcher.add_to_reading(&items[0].id).await.unwrap(), WindowChange::Updated);
    let back = db.get_news(&items[0].id).await.unwrap().unwrap();
    assert_eq!(back.reading_state(), ReadingState::InWindowPushed);
}

#[tokio::test]
async fn clear_pushed_sweeps_only_delivered_items() {
    let (_dir, db) = temp_db().await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(RecordingTransport::default()));
    let ch = webhook_channel(&db, true).await;
    window_items(&db, 2, "tech").await;
    dispatcher.execute_push_task(&task(&ch.id, "")).await.unwrap();
    let fresh = window_items(&db, 1, "ai").await;

    assert_eq!(dispatcher.clear_pushed().await.unwrap(), 2);
    assert_eq!(dispatcher.clear_pushed().await.unwrap(), 0);

    let page = dispatcher
        .list_reading(&ReadingFilter {
            limit: 50,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.unpushed_count, 1);
    assert_eq!(page.data[0].id, fresh[0].id);

    let pushed = dispatcher
        .list_reading(&ReadingFilter {
            pushed: PushedFilter::Yes,
            limit: 50,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(pushed.total, 0);
}

#[tokio::test]
async fn preview_uses_samples_when_window_is_empty() {
    let (_dir, db) = temp_db().await;
    let dispatcher = Dispatcher::new(db.clone(), Arc::new(RecordingTransport::default()));

    let p = dispatcher
        .preview_template("{{#each news}}[{{url}}]{{/each}}", true)
        .await
        .unwrap();
    assert_eq!(p.news_count, 2);
    assert!(p.html.contains("[https://example.com/news/1]"));

    window_items(&db, 1, "tech").await;
    let p = dispatcher.preview_template("{{count}}", true).await.unwrap();
    assert_eq!(p.news_count, 1);
    assert_eq!(p.html, "1");
    let p = dispatcher.preview_template("{{count}}", false).await.unwrap();
    assert_eq!(p.news_count, 2);
}
