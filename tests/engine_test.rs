//! Scheduling behavior tests on a paused tokio clock
//!
//! These tests drive the engine with `tokio::time::advance`, so timer
//! cadence, skip-if-running, and cancellation are checked deterministically
//! without real waiting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crawl_scheduler::client::{
    ClientError, CrawlApi, RetryPolicy, Space, TriggerResponse, Website,
};
use crawl_scheduler::config::{EngineSettings, SpaceConfig, UserConfig};
use crawl_scheduler::scheduler::{Engine, Phase, WebsiteSelector};

/// Fake remote API that records the clock reading of every trigger call.
/// The website listing can grow, and triggers can be made slow.
struct CountingApi {
    websites: Mutex<Vec<Website>>,
    trigger_delay: Mutex<Duration>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl CountingApi {
    fn new(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            websites: Mutex::new(ids.iter().map(|id| site(id)).collect()),
            trigger_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn add_website(&self, id: &str) {
        self.websites.lock().unwrap().push(site(id));
    }

    fn set_trigger_delay(&self, delay: Duration) {
        *self.trigger_delay.lock().unwrap() = delay;
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Offsets of every trigger call from `base`, in seconds
    fn call_offsets(&self, base: Instant) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| at.duration_since(base).as_secs())
            .collect()
    }
}

fn site(id: &str) -> Website {
    Website {
        id: id.to_string(),
        name: Some(format!("Site {id}")),
        url: None,
    }
}

#[async_trait]
impl CrawlApi for CountingApi {
    async fn list_spaces(&self) -> Result<Vec<Space>, ClientError> {
        Ok(vec![])
    }

    async fn get_space(&self, space_id: &str) -> Result<Space, ClientError> {
        Ok(Space {
            id: space_id.to_string(),
            name: None,
        })
    }

    async fn list_space_websites(&self, _space_id: &str) -> Result<Vec<Website>, ClientError> {
        Ok(self.websites.lock().unwrap().clone())
    }

    async fn trigger_crawl(
        &self,
        _space_id: &str,
        selector: &WebsiteSelector,
    ) -> Result<TriggerResponse, ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push((selector.to_string(), Instant::now()));

        let delay = *self.trigger_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(TriggerResponse::Started {
            run_id: Some("run-1".to_string()),
        })
    }
}

fn engine_with(api: Arc<CountingApi>) -> Engine {
    Engine::with_client_factory(
        EngineSettings::default(),
        RetryPolicy::default(),
        Box::new(move |_| Ok(Arc::clone(&api) as Arc<dyn CrawlApi>)),
    )
}

/// One space, five-minute schedule, crawling everything in the space
fn config() -> UserConfig {
    UserConfig {
        api_key: "inp_0123456789abcdef".to_string(),
        base_url: "https://backend.example.com/api/v1".to_string(),
        spaces: vec![SpaceConfig {
            space_id: Some("s-1".to_string()),
            space_name: None,
            schedule_minutes: 5,
            website_filter: vec![],
            crawl_all_space_websites: true,
        }],
    }
}

const INTERVAL: Duration = Duration::from_secs(300);

/// Let spawned tasks run after a clock change
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn first_fire_happens_after_one_full_interval() {
    let api = CountingApi::new(&["w-1"]);
    let engine = engine_with(Arc::clone(&api));

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    // no immediate fire on registration
    assert_eq!(api.call_count(), 0);

    advance(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(api.call_count(), 0);

    advance(Duration::from_secs(1)).await;
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn timers_fire_at_a_fixed_rate() {
    let api = CountingApi::new(&["w-1"]);
    let engine = engine_with(Arc::clone(&api));
    let base = Instant::now();

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    for _ in 0..3 {
        advance(INTERVAL).await;
    }

    assert_eq!(api.call_offsets(base), vec![300, 600, 900]);
}

#[tokio::test(start_paused = true)]
async fn slow_trigger_never_overlaps_and_keeps_cadence() {
    let api = CountingApi::new(&["w-1"]);
    api.set_trigger_delay(Duration::from_secs(700));
    let engine = engine_with(Arc::clone(&api));
    let base = Instant::now();

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    // t=300: first fire, attempt will run until t=1000
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 1);

    // t=600 and t=900: attempt still in flight, both cycles skipped
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 1);
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 1);

    let snapshot = engine.status_snapshot(Some("alice")).await;
    assert_eq!(snapshot[0].status.phase, Phase::Running);
    assert_eq!(snapshot[0].status.total_attempts, 1);

    // t=1000: attempt completes
    advance(Duration::from_secs(100)).await;
    let snapshot = engine.status_snapshot(Some("alice")).await;
    assert_eq!(snapshot[0].status.phase, Phase::Succeeded);

    // t=1200: next fire lands on the original 300s grid, not 1000+300
    advance(Duration::from_secs(200)).await;
    assert_eq!(api.call_offsets(base), vec![300, 1200]);
}

#[tokio::test(start_paused = true)]
async fn discovered_target_gets_full_first_fire_delay() {
    let api = CountingApi::new(&["w-a", "w-b"]);
    let engine = engine_with(Arc::clone(&api));

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    // t=300: both initial targets fire and succeed
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 2);

    api.add_website("w-c");
    engine.run_discovery_pass().await;
    settle().await;
    assert_eq!(engine.target_count().await, 3);

    // existing targets keep their state
    let snapshot = engine.status_snapshot(Some("alice")).await;
    for record in &snapshot {
        match &record.target.selector {
            WebsiteSelector::Website(id) if id == "w-c" => {
                assert_eq!(record.status.phase, Phase::Idle);
                assert_eq!(record.status.total_attempts, 0);
            }
            _ => {
                assert_eq!(record.status.phase, Phase::Succeeded);
                assert_eq!(record.status.total_attempts, 1);
            }
        }
    }

    // t=600: initial targets fire again, and the discovered target has
    // its own first fire a full interval after registration
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_timers_and_restart_waits_full_interval() {
    let api = CountingApi::new(&["w-1"]);
    let engine = engine_with(Arc::clone(&api));

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 1);

    engine.stop("alice").await.unwrap();
    settle().await;

    // long silence: no orphaned timer keeps firing
    advance(INTERVAL * 10).await;
    assert_eq!(api.call_count(), 1);

    engine.start("alice").await.unwrap();
    settle().await;

    advance(INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(api.call_count(), 1);
    advance(Duration::from_secs(1)).await;
    assert_eq!(api.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn run_once_fires_each_target_without_moving_timers() {
    let api = CountingApi::new(&["w-a", "w-b"]);
    let engine = engine_with(Arc::clone(&api));
    let base = Instant::now();

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    advance(Duration::from_secs(100)).await;
    let report = engine.run_once("alice").await.unwrap();
    settle().await;
    assert_eq!(report.fired, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(api.call_count(), 2);

    // the scheduled tick still happens at t=300, unaffected by the
    // manual run at t=100
    advance(Duration::from_secs(200)).await;
    assert_eq!(api.call_count(), 4);

    let mut offsets = api.call_offsets(base);
    offsets.sort_unstable();
    assert_eq!(offsets, vec![100, 100, 300, 300]);
}

#[tokio::test(start_paused = true)]
async fn run_once_skips_targets_with_attempt_in_flight() {
    let api = CountingApi::new(&["w-1"]);
    api.set_trigger_delay(Duration::from_secs(60));
    let engine = engine_with(Arc::clone(&api));

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    let first = engine.run_once("alice").await.unwrap();
    settle().await;
    assert_eq!(first.fired, 1);

    let second = engine.run_once("alice").await.unwrap();
    assert_eq!(second.fired, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn in_flight_result_is_discarded_after_stop() {
    let api = CountingApi::new(&["w-1"]);
    api.set_trigger_delay(Duration::from_secs(500));
    let engine = engine_with(Arc::clone(&api));

    engine.set_config("alice", config()).await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    // t=300: attempt starts, will complete at t=800
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 1);

    // t=400: stop destroys the target while the call is in flight,
    // then the user is started again with a fresh target
    advance(Duration::from_secs(100)).await;
    engine.stop("alice").await.unwrap();
    engine.start("alice").await.unwrap();
    settle().await;

    // t=700: the recreated target's own first fire (another slow attempt)
    advance(INTERVAL).await;
    assert_eq!(api.call_count(), 2);

    // t=800: the orphaned first attempt completes; its result must not
    // touch the recreated target's status
    advance(Duration::from_secs(100)).await;
    let snapshot = engine.status_snapshot(Some("alice")).await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].status.phase, Phase::Running);
    assert_eq!(snapshot[0].status.total_attempts, 1);
}
