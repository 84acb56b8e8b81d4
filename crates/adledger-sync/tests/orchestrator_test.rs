use adledger_core::{
    CampaignMetrics, ConnectionStatus, MetricValues, Platform, RankPlatform, SourceKind, SyncConfig,
    TaskStatus,
};
use adledger_db::connections::{self, Connection};
use adledger_db::{keywords, metric_records, rankings, sync_tasks, validation_results, Database};
use adledger_scraper::{RankedItem, RankingSource};
use adledger_sync::{
    backfill_dates, MetricSource, MetricSourceProvider, Notifier, RankingSources, RunSummary,
    ScrapeKey, SourceError, SyncError, SyncOrchestrator,
};
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

struct FakeRanking {
    platform: RankPlatform,
    names: Vec<&'static str>,
}

impl FakeRanking {
    fn new(platform: RankPlatform, names: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self { platform, names })
    }
}

#[async_trait::async_trait]
impl RankingSource for FakeRanking {
    fn platform(&self) -> RankPlatform {
        self.platform
    }

    async fn get_rankings(&self, _keyword: &str) -> Vec<RankedItem> {
        self.names
            .iter()
            .zip(1..)
            .map(|(name, rank)| RankedItem {
                rank,
                identity: format!("id-{rank}"),
                display_name: (*name).to_string(),
                attributes: BTreeMap::new(),
            })
            .collect()
    }
}

/// Named campaigns; the report keys its rows by name.
fn campaign_name(campaign: &str) -> Option<String> {
    match campaign {
        "cmp-a001" | "파워링크" => Some("파워링크".to_string()),
        _ => None,
    }
}

struct FakeSource {
    kind: SourceKind,
    result: Result<Vec<(&'static str, f64)>, SourceError>,
}

#[async_trait::async_trait]
impl MetricSource for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, date: NaiveDate) -> Result<Vec<CampaignMetrics>, SourceError> {
        self.result.clone().map(|rows| {
            rows.into_iter()
                .map(|(campaign, spend)| CampaignMetrics {
                    campaign_id: campaign.to_string(),
                    campaign_name: campaign_name(campaign),
                    date,
                    values: MetricValues {
                        spend,
                        impressions: 1000,
                        clicks: 20,
                        ..MetricValues::default()
                    },
                })
                .collect()
        })
    }
}

#[derive(Clone)]
struct FakeProvider {
    api: Result<Vec<(&'static str, f64)>, SourceError>,
    report: Option<Result<Vec<(&'static str, f64)>, SourceError>>,
}

impl MetricSourceProvider for FakeProvider {
    fn sources_for(&self, _connection: &Connection) -> Result<Vec<Box<dyn MetricSource>>, SourceError> {
        let mut sources: Vec<Box<dyn MetricSource>> = vec![Box::new(FakeSource {
            kind: SourceKind::Api,
            result: self.api.clone(),
        })];
        if let Some(report) = &self.report {
            sources.push(Box::new(FakeSource {
                kind: SourceKind::Scraper,
                result: report.clone(),
            }));
        }
        Ok(sources)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    summaries: Mutex<Vec<RunSummary>>,
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, summary: &RunSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}

const FIVE_CLINICS: [&str; 5] = ["하나치과", "두리치과", "세움치과", "네모치과", "다섯치과"];

fn empty_rankings() -> RankingSources {
    RankingSources {
        place: FakeRanking::new(RankPlatform::Place, vec![]),
        view: FakeRanking::new(RankPlatform::View, vec![]),
        ad: FakeRanking::new(RankPlatform::Ad, vec![]),
    }
}

async fn setup() -> (Database, Connection) {
    let db = Database::new(":memory:", 1).await.expect("create database");
    db.run_migrations().await.expect("run migrations");
    let connection = connections::create_connection(
        db.pool(),
        "client-1",
        Platform::NaverSearchAd,
        r#"{"apiKey": "lic", "secretKey": "s", "customerId": "1"}"#,
    )
    .await
    .expect("create connection");
    (db, connection)
}

fn orchestrator(db: &Database, rankings: RankingSources, provider: FakeProvider) -> SyncOrchestrator {
    SyncOrchestrator::new(db.clone(), rankings, Arc::new(provider), SyncConfig::default())
}

fn api_only(rows: Vec<(&'static str, f64)>) -> FakeProvider {
    FakeProvider {
        api: Ok(rows),
        report: None,
    }
}

#[tokio::test]
async fn test_place_batch_persists_five_observations() {
    let (db, connection) = setup().await;
    keywords::get_or_create(db.pool(), "client-1", "임플란트")
        .await
        .expect("keyword");
    let rankings = RankingSources {
        place: FakeRanking::new(RankPlatform::Place, FIVE_CLINICS.to_vec()),
        ..empty_rankings()
    };

    let summary = orchestrator(&db, rankings, api_only(vec![("cmp-1", 100.0)]))
        .run(Some(&connection.id), Some(1))
        .await
        .expect("run");

    assert_eq!(summary.rank_observations[&RankPlatform::Place], 5);
    assert_eq!(keywords::list_for_client(db.pool(), "client-1").await.unwrap().len(), 1);
    assert_eq!(rankings::count_targets(db.pool(), RankPlatform::Place).await.unwrap(), 5);

    let observations: Vec<(String, i64)> =
        sqlx::query_as("SELECT platform, rank FROM rank_observations ORDER BY rank")
            .fetch_all(db.pool())
            .await
            .unwrap();
    assert_eq!(observations.len(), 5);
    assert!(observations.iter().all(|(platform, _)| platform == "place"));
    let captures: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT captured_at) FROM rank_observations")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(captures, 1);
}

#[tokio::test]
async fn test_completed_run_reconciles_and_validates() {
    let (db, connection) = setup().await;
    let provider = FakeProvider {
        api: Ok(vec![("cmp-1", 100.0)]),
        report: Some(Ok(vec![("cmp-1", 85.0), ("cmp-2", 40.0)])),
    };

    let summary = orchestrator(&db, empty_rankings(), provider)
        .run(None, Some(1))
        .await
        .expect("run");

    assert_eq!(summary.tasks_created, 1);
    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(summary.reconciled, 2);
    assert_eq!(summary.validation_failures, 0);

    let task = &sync_tasks::list_for_connection(db.pool(), &connection.id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Completed);

    let reconciled = metric_records::list_for_date_by_source(
        db.pool(),
        &connection.id,
        task.target_date,
        SourceKind::Reconciled,
    )
    .await
    .unwrap();
    assert!((reconciled[0].metrics.values.spend - 100.0).abs() < f64::EPSILON);
    let provenance = reconciled[0].metadata.as_ref().unwrap();
    assert_eq!(provenance["primary"], "api");
    assert_eq!(provenance["needs_review"], true);
    assert_eq!(reconciled[1].metadata.as_ref().unwrap()["primary"], "scraper");

    let verdict = validation_results::get(db.pool(), &task.id).await.unwrap().unwrap();
    assert!(verdict.passed);
}

#[tokio::test]
async fn test_repeat_run_creates_no_duplicates() {
    let (db, connection) = setup().await;
    let orchestrator = orchestrator(&db, empty_rankings(), api_only(vec![("cmp-1", 10.0)]));

    let first = orchestrator.run(None, Some(3)).await.expect("first run");
    let second = orchestrator.run(None, Some(3)).await.expect("second run");

    assert_eq!(first.tasks_created, 3);
    assert_eq!(second.tasks_created, 0);
    assert_eq!(second.tasks_completed, 0);
    assert_eq!(
        sync_tasks::list_for_connection(db.pool(), &connection.id).await.unwrap().len(),
        3
    );
}

#[tokio::test]
async fn test_auth_rejection_flags_connection() {
    let (db, connection) = setup().await;
    let provider = FakeProvider {
        api: Err(SourceError::AuthRejected("HTTP 401".to_string())),
        report: None,
    };

    let summary = orchestrator(&db, empty_rankings(), provider)
        .run(None, Some(3))
        .await
        .expect("run");

    assert_eq!(summary.tasks_failed, 1);
    let stored = connections::get_connection(db.pool(), &connection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, ConnectionStatus::NeedsReauth);

    let tasks = sync_tasks::list_for_connection(db.pool(), &connection.id).await.unwrap();
    let failed: Vec<_> = tasks.iter().filter(|t| t.status == TaskStatus::Failed).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error_message.as_deref().unwrap().contains("HTTP 401"));
    assert_eq!(tasks.iter().filter(|t| t.status == TaskStatus::Pending).count(), 2);
}

#[tokio::test]
async fn test_partial_when_one_source_fails() {
    let (db, connection) = setup().await;
    let provider = FakeProvider {
        api: Ok(vec![("cmp-1", 100.0)]),
        report: Some(Err(SourceError::Failed("layout changed".to_string()))),
    };

    let summary = orchestrator(&db, empty_rankings(), provider)
        .run(None, Some(1))
        .await
        .expect("run");

    assert_eq!(summary.tasks_partial, 1);
    let task = &sync_tasks::list_for_connection(db.pool(), &connection.id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Partial);
    assert!(task.error_message.as_deref().unwrap().contains("layout changed"));
}

#[tokio::test]
async fn test_failed_task_is_retried_next_run() {
    let (db, connection) = setup().await;
    let failing = FakeProvider {
        api: Err(SourceError::Unavailable),
        report: None,
    };

    let first = orchestrator(&db, empty_rankings(), failing)
        .run(None, Some(1))
        .await
        .expect("first run");
    assert_eq!(first.tasks_failed, 1);

    let second = orchestrator(&db, empty_rankings(), api_only(vec![("cmp-1", 5.0)]))
        .run(None, Some(1))
        .await
        .expect("second run");
    assert_eq!(second.tasks_reset, 1);
    assert_eq!(second.tasks_completed, 1);

    let task = &sync_tasks::list_for_connection(db.pool(), &connection.id).await.unwrap()[0];
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 1);
    assert_eq!(task.total_failures, 1);
}

#[tokio::test]
async fn test_in_flight_scrape_is_rejected() {
    let (db, _connection) = setup().await;
    let place = FakeRanking::new(RankPlatform::Place, FIVE_CLINICS.to_vec());
    let orchestrator = orchestrator(
        &db,
        RankingSources {
            place: place.clone(),
            ..empty_rankings()
        },
        api_only(vec![]),
    );

    let _held = orchestrator
        .guard()
        .try_acquire(ScrapeKey::new("client-1", RankPlatform::Place, "임플란트"))
        .expect("hold key");

    let result = orchestrator
        .scrape_and_persist(place.as_ref(), "client-1", "임플란트", Utc::now())
        .await;

    assert!(matches!(result, Err(SyncError::AlreadyInFlight { .. })));
}

#[tokio::test]
async fn test_summary_reaches_notifier() {
    let (db, _connection) = setup().await;
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = orchestrator(&db, empty_rankings(), api_only(vec![("cmp-1", -5.0)]))
        .with_notifier(notifier.clone());

    orchestrator.run(None, Some(1)).await.expect("run");

    let summaries = notifier.summaries.lock().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].validation_failures, 1);
    assert_eq!(summaries[0].metric_records[&SourceKind::Api], 1);
}

#[tokio::test]
async fn test_unknown_connection_is_an_error() {
    let (db, _connection) = setup().await;

    let result = orchestrator(&db, empty_rankings(), api_only(vec![]))
        .run(Some("missing"), None)
        .await;

    assert!(matches!(result, Err(SyncError::ConnectionNotFound(_))));
}

#[tokio::test]
async fn test_report_keyed_by_name_reconciles_with_api() {
    let (db, connection) = setup().await;
    let provider = FakeProvider {
        api: Ok(vec![("cmp-a001", 100.0)]),
        report: Some(Ok(vec![("파워링크", 85.0)])),
    };

    let summary = orchestrator(&db, empty_rankings(), provider)
        .run(None, Some(1))
        .await
        .expect("run");

    assert_eq!(summary.reconciled, 1);
    let task = &sync_tasks::list_for_connection(db.pool(), &connection.id).await.unwrap()[0];
    let reconciled = metric_records::list_for_date_by_source(
        db.pool(),
        &connection.id,
        task.target_date,
        SourceKind::Reconciled,
    )
    .await
    .unwrap();
    assert_eq!(reconciled.len(), 1);
    assert_eq!(reconciled[0].metrics.campaign_id, "cmp-a001");
    assert!((reconciled[0].metrics.values.spend - 100.0).abs() < f64::EPSILON);
    let provenance = reconciled[0].metadata.as_ref().unwrap();
    assert_eq!(provenance["sources"], serde_json::json!(["api", "scraper"]));
    assert_eq!(provenance["needs_review"], true);
}

#[tokio::test]
async fn test_task_left_running_is_recovered() {
    let (db, connection) = setup().await;
    let date = backfill_dates(Utc::now().date_naive(), 1)[0];
    let (_, task) = sync_tasks::upsert_daily(db.pool(), &connection.id, date, 5)
        .await
        .expect("create");
    sync_tasks::mark_running(db.pool(), &task.id).await.expect("running");
    let long_ago = (Utc::now() - chrono::Duration::hours(6)).to_rfc3339();
    sqlx::query("UPDATE sync_tasks SET started_at = ? WHERE id = ?")
        .bind(long_ago)
        .bind(&task.id)
        .execute(db.pool())
        .await
        .unwrap();

    let summary = orchestrator(&db, empty_rankings(), api_only(vec![("cmp-1", 10.0)]))
        .run(None, Some(1))
        .await
        .expect("run");

    assert_eq!(summary.tasks_recovered, 1);
    assert_eq!(summary.tasks_reset, 1);
    assert_eq!(summary.tasks_completed, 1);
    let stored = sync_tasks::get_task(db.pool(), &task.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TaskStatus::Completed);
    assert_eq!(stored.total_failures, 1);
}
