//! Notification fan-out.
//!
//! One cycle:
//! 1. Load the latest price rows and the eligible subscribers
//! 2. Render the daily table once per distinct language
//! 3. Deliver to every subscriber concurrently, at most [`MAX_IN_FLIGHT`] at a time
//!
//! A failed delivery is logged and dropped. Only a failed load aborts the cycle.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use goldie_common::shutdown::Shutdown;
use goldie_common::types::{ChatId, Subscriber, ValueRow};

use crate::ports::{DeliverySink, SubscriptionStore, ValueStore};
use crate::render::ReportRenderer;

/// Upper bound on deliveries in flight against the sink.
pub const MAX_IN_FLIGHT: usize = 100;

/// Counters reported at the end of a cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    /// Subscribers loaded for the cycle
    pub recipients: usize,
    /// Messages accepted by the sink
    pub delivered: usize,
    /// Messages that could not be rendered or sent
    pub failed: usize,
    /// Subscribers never reached because shutdown was requested
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct UnitOutcome {
    delivered: usize,
    failed: usize,
}

/// Read-only view shared by every delivery unit of one cycle.
struct CycleContext {
    cycle_id: Uuid,
    rows: Vec<ValueRow>,
    /// language -> daily table, complete before the first unit starts
    tables: HashMap<String, String>,
    default_language: String,
    sink: Arc<dyn DeliverySink>,
    renderer: Arc<dyn ReportRenderer>,
}

pub struct FanOutDispatcher {
    values: Arc<dyn ValueStore>,
    subscribers: Arc<dyn SubscriptionStore>,
    sink: Arc<dyn DeliverySink>,
    renderer: Arc<dyn ReportRenderer>,
    default_language: String,
}

impl FanOutDispatcher {
    pub fn new(
        values: Arc<dyn ValueStore>,
        subscribers: Arc<dyn SubscriptionStore>,
        sink: Arc<dyn DeliverySink>,
        renderer: Arc<dyn ReportRenderer>,
        default_language: impl Into<String>,
    ) -> Self {
        Self {
            values,
            subscribers,
            sink,
            renderer,
            default_language: default_language.into(),
        }
    }

    /// Run one notification cycle and wait for every launched delivery.
    ///
    /// `ready` is the process readiness at tick time; a cycle started before the
    /// first price import finished is skipped. Once `shutdown` fires no further
    /// subscribers are started.
    pub async fn run_cycle(&self, ready: bool, mut shutdown: Shutdown) -> CycleSummary {
        let cycle_id = Uuid::new_v4();
        let mut summary = CycleSummary::default();

        if !ready {
            tracing::warn!(cycle_id = %cycle_id, "Service not ready, skipping notification cycle");
            return summary;
        }

        let rows = match self.values.get_latest_value_rows().await {
            Ok(rows) if rows.is_empty() => {
                tracing::info!(cycle_id = %cycle_id, "No prices stored, nothing to send");
                return summary;
            }
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(cycle_id = %cycle_id, error = %e, "Failed to load latest prices");
                return summary;
            }
        };

        let subscribers = match self.subscribers.list_eligible_subscribers().await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                tracing::error!(cycle_id = %cycle_id, error = %e, "Failed to load subscribers");
                return summary;
            }
        };
        summary.recipients = subscribers.len();

        let tables = self.render_tables(cycle_id, &rows, &subscribers);
        let context = Arc::new(CycleContext {
            cycle_id,
            rows,
            tables,
            default_language: self.default_language.clone(),
            sink: self.sink.clone(),
            renderer: self.renderer.clone(),
        });

        tracing::info!(
            cycle_id = %cycle_id,
            recipients = summary.recipients,
            languages = context.tables.len(),
            "Starting notification cycle"
        );

        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT));
        let mut units = JoinSet::new();
        let total = subscribers.len();

        for (launched, subscriber) in subscribers.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    summary.skipped = total - launched;
                    tracing::warn!(cycle_id = %cycle_id, skipped = summary.skipped, "Shutdown requested, stopping fan-out");
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let context = context.clone();
            units.spawn(async move {
                let _permit = permit;
                context.deliver(subscriber).await
            });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok(outcome) => {
                    summary.delivered += outcome.delivered;
                    summary.failed += outcome.failed;
                }
                Err(e) => {
                    tracing::error!(cycle_id = %cycle_id, error = %e, "Delivery task aborted");
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            cycle_id = %cycle_id,
            recipients = summary.recipients,
            delivered = summary.delivered,
            failed = summary.failed,
            skipped = summary.skipped,
            "Notification cycle finished"
        );

        summary
    }

    /// Daily table per distinct language of daily-alert subscribers, plus the default
    /// language as the fallback. A language that fails to render is left out.
    fn render_tables(
        &self,
        cycle_id: Uuid,
        rows: &[ValueRow],
        subscribers: &[Subscriber],
    ) -> HashMap<String, String> {
        let mut tables = HashMap::new();
        let languages = subscribers
            .iter()
            .filter(|s| s.daily_alert)
            .map(|s| s.language_or(&self.default_language))
            .chain(std::iter::once(self.default_language.as_str()));

        for language in languages {
            if tables.contains_key(language) {
                continue;
            }
            match self.renderer.prices_table(language, rows) {
                Ok(text) => {
                    tables.insert(language.to_string(), text);
                }
                Err(e) => {
                    tracing::error!(cycle_id = %cycle_id, language, error = %e, "Failed to render price table");
                }
            }
        }

        tables
    }
}

impl CycleContext {
    async fn deliver(&self, subscriber: Subscriber) -> UnitOutcome {
        let mut outcome = UnitOutcome::default();
        let chat_id = subscriber.chat_id;
        let language = subscriber.language_or(&self.default_language);

        if subscriber.daily_alert {
            let table = self
                .tables
                .get(language)
                .or_else(|| self.tables.get(&self.default_language));
            match table {
                Some(text) => self.send(chat_id, "daily", text, &mut outcome).await,
                None => {
                    tracing::error!(cycle_id = %self.cycle_id, chat_id, "No price table for subscriber");
                    outcome.failed += 1;
                }
            }
        }

        for selection in &subscriber.selections {
            // no prices stored for that date
            if selection.buying_prices.is_empty() {
                continue;
            }

            match self
                .renderer
                .gain_table(language, &self.rows, &selection.buying_prices)
            {
                Ok(text) => self.send(chat_id, "gain", &text, &mut outcome).await,
                Err(e) => {
                    tracing::error!(
                        cycle_id = %self.cycle_id,
                        chat_id,
                        selection_id = selection.id,
                        error = %e,
                        "Failed to render gain table"
                    );
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    async fn send(&self, chat_id: ChatId, kind: &str, text: &str, outcome: &mut UnitOutcome) {
        match self.sink.send_text(chat_id, text, None).await {
            Ok(_) => outcome.delivered += 1,
            Err(e) => {
                tracing::error!(cycle_id = %self.cycle_id, chat_id, kind, error = %e, "Failed to deliver notification");
                outcome.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use goldie_common::error::AppError;
    use goldie_common::shutdown;

    use super::*;
    use crate::i18n::Catalog;
    use crate::render::HtmlTableRenderer;
    use crate::testing::{MemoryStore, RecordingSink, row};

    /// Counts calls and records the languages of daily tables.
    struct CountingRenderer {
        inner: HtmlTableRenderer,
        prices_calls: AtomicUsize,
        gain_calls: AtomicUsize,
        languages: Mutex<Vec<String>>,
        broken_language: Option<&'static str>,
    }

    impl CountingRenderer {
        fn new() -> Self {
            Self {
                inner: HtmlTableRenderer::new(Arc::new(Catalog::embedded("en").unwrap())),
                prices_calls: AtomicUsize::new(0),
                gain_calls: AtomicUsize::new(0),
                languages: Mutex::new(Vec::new()),
                broken_language: None,
            }
        }

        fn broken_for(language: &'static str) -> Self {
            Self {
                broken_language: Some(language),
                ..Self::new()
            }
        }
    }

    impl ReportRenderer for CountingRenderer {
        fn prices_table(&self, language: &str, rows: &[ValueRow]) -> Result<String, AppError> {
            self.prices_calls.fetch_add(1, Ordering::SeqCst);
            self.languages.lock().unwrap().push(language.to_string());
            if self.broken_language == Some(language) {
                return Err(AppError::Localization(format!("broken {language}")));
            }
            self.inner.prices_table(language, rows)
        }

        fn gain_table(
            &self,
            language: &str,
            rows: &[ValueRow],
            buying_prices: &[ValueRow],
        ) -> Result<String, AppError> {
            self.gain_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.gain_table(language, rows, buying_prices)
        }
    }

    fn prices() -> Vec<ValueRow> {
        vec![
            row("2025-11-06", 1.0, 12526.0, 12588.5),
            row("2025-11-06", 2.0, 23775.0, 23870.0),
            row("2025-11-07", 1.0, 12577.0, 12640.0),
            row("2025-11-07", 2.0, 23877.5, 23973.0),
        ]
    }

    fn dispatcher(
        store: &Arc<MemoryStore>,
        sink: &Arc<RecordingSink>,
        renderer: &Arc<CountingRenderer>,
    ) -> FanOutDispatcher {
        FanOutDispatcher::new(
            store.clone(),
            store.clone(),
            sink.clone(),
            renderer.clone(),
            "en",
        )
    }

    #[tokio::test]
    async fn test_localizes_once_per_language() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        for chat_id in 0..50 {
            store.add_subscriber(chat_id, Some("en"), true);
            store.add_subscriber(1000 + chat_id, Some("ru"), true);
        }
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(renderer.prices_calls.load(Ordering::SeqCst), 2);
        assert_eq!(summary.recipients, 100);
        assert_eq!(summary.delivered, 100);
        assert_eq!(summary.failed, 0);
        assert!(sink.texts_for(1000)[0].contains("Цены на золото на 2025-11-07"));
        assert!(sink.texts_for(0)[0].contains("Gold prices for 2025-11-07"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_others() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        for chat_id in 1..=20 {
            store.add_subscriber(chat_id, None, true);
        }
        let sink = Arc::new(RecordingSink::failing_for([7]));
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(summary.delivered, 19);
        assert_eq!(summary.failed, 1);
        assert!(sink.texts_for(7).is_empty());
        assert_eq!(sink.texts_for(8).len(), 1);
    }

    #[tokio::test]
    async fn test_daily_and_gain_for_the_same_subscriber() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        store.add_subscriber(5, Some("en"), true);
        store.add_selection(5, "2025-11-06");
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        let texts = sink.texts_for(5);
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("<b>Gold prices for 2025-11-07</b>"));
        assert!(texts[1].contains("bought on 2025-11-06"));
        assert!(texts[1].contains("100.41"));
        assert_eq!(summary.delivered, 2);
    }

    #[tokio::test]
    async fn test_selection_without_stored_prices_is_skipped() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        store.add_subscriber(5, Some("en"), false);
        store.add_selection(5, "2019-01-01");
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(summary.recipients, 1);
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(renderer.gain_calls.load(Ordering::SeqCst), 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_broken_language_falls_back_to_default() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        store.add_subscriber(1, Some("ru"), true);
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::broken_for("ru"));

        dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        let texts = sink.texts_for(1);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("Gold prices for"));
    }

    #[tokio::test]
    async fn test_gain_only_subscriber_does_not_add_a_language() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        store.add_subscriber(1, Some("ru"), false);
        store.add_selection(1, "2025-11-06");
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(*renderer.languages.lock().unwrap(), vec!["en".to_string()]);
        let texts = sink.texts_for(1);
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("покупка 2025-11-06"));
    }

    #[tokio::test]
    async fn test_empty_prices_abort_the_cycle() {
        let store = Arc::new(MemoryStore::new());
        store.add_subscriber(1, None, true);
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(summary, CycleSummary::default());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_load_failure_aborts_the_cycle() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        store.add_subscriber(1, None, true);
        store.fail_loads.store(true, Ordering::SeqCst);
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(summary, CycleSummary::default());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_not_ready_skips_the_cycle() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        store.add_subscriber(1, None, true);
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(false, Shutdown::never())
            .await;

        assert_eq!(summary, CycleSummary::default());
        assert_eq!(renderer.prices_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_in_flight_deliveries_are_capped() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        for chat_id in 0..250 {
            store.add_subscriber(chat_id, None, true);
        }
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(20)));
        let renderer = Arc::new(CountingRenderer::new());

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, Shutdown::never())
            .await;

        assert_eq!(summary.delivered, 250);
        assert!(sink.max_in_flight() <= MAX_IN_FLIGHT);
        assert!(sink.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_launching_units() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        for chat_id in 0..10 {
            store.add_subscriber(chat_id, None, true);
        }
        let sink = Arc::new(RecordingSink::new());
        let renderer = Arc::new(CountingRenderer::new());
        let (trigger, listener) = shutdown::channel();
        trigger.trigger();

        let summary = dispatcher(&store, &sink, &renderer)
            .run_cycle(true, listener)
            .await;

        assert_eq!(summary.recipients, 10);
        assert_eq!(summary.skipped, 10);
        assert_eq!(summary.delivered, 0);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_mid_cycle_lets_in_flight_units_finish() {
        let store = Arc::new(MemoryStore::with_values(prices()));
        for chat_id in 0..250 {
            store.add_subscriber(chat_id, None, true);
        }
        let sink = Arc::new(RecordingSink::new().with_delay(Duration::from_millis(100)));
        let renderer = Arc::new(CountingRenderer::new());
        let dispatcher = dispatcher(&store, &sink, &renderer);
        let (trigger, listener) = shutdown::channel();

        let (summary, ()) = tokio::join!(dispatcher.run_cycle(true, listener), async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.trigger();
        });

        assert_eq!(summary.recipients, 250);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.delivered + summary.skipped, summary.recipients);
        assert_eq!(summary.delivered, sink.events().len());
        assert!(summary.delivered > 0);
        assert!(summary.skipped > 0);
    }
}
