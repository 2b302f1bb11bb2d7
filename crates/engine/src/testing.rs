//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};

use goldie_common::error::AppError;
use goldie_common::types::{ChatId, DateSelection, MessageId, Subscriber, ValueRow};

use crate::keyboard::Keyboard;
use crate::ports::{DeliverySink, SubscriptionStore, ValueStore};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn row(day: &str, weight: f64, buy: f64, sell: f64) -> ValueRow {
    ValueRow {
        price_date: date(day),
        weight,
        buy_price: buy,
        sell_price: sell,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Edit {
        chat_id: ChatId,
        message_id: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Ack {
        interaction_id: String,
        text: Option<String>,
    },
}

/// Records everything it is asked to deliver. Chats in `failing` get an error.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Sent>>,
    failing: HashSet<ChatId>,
    delay: Option<Duration>,
    next_message_id: AtomicI64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(chat_ids: impl IntoIterator<Item = ChatId>) -> Self {
        Self {
            failing: chat_ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn events(&self) -> Vec<Sent> {
        self.events.lock().unwrap().clone()
    }

    pub fn texts_for(&self, chat_id: ChatId) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Sent::Text { chat_id: id, text, .. } if id == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, chat_id: ChatId) -> Result<(), AppError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&chat_id) {
            return Err(AppError::Delivery(format!("chat {chat_id} blocked the bot")));
        }
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, AppError> {
        self.enter(chat_id).await?;
        self.events.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), AppError> {
        self.enter(chat_id).await?;
        self.events.lock().unwrap().push(Sent::Edit {
            chat_id,
            message_id,
            text: text.to_string(),
            keyboard: keyboard.cloned(),
        });
        Ok(())
    }

    async fn acknowledge(&self, interaction_id: &str, text: Option<&str>) -> Result<(), AppError> {
        self.events.lock().unwrap().push(Sent::Ack {
            interaction_id: interaction_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    subscribers: BTreeMap<ChatId, Subscriber>,
    selections: Vec<DateSelection>,
    values: Vec<ValueRow>,
    next_selection_id: i64,
}

/// Both stores over one mutex. `fail_loads` makes the cycle loaders return errors.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    pub fail_loads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(rows: Vec<ValueRow>) -> Self {
        let store = Self::new();
        store.state.lock().unwrap().values = rows;
        store
    }

    pub fn add_subscriber(&self, chat_id: ChatId, language: Option<&str>, daily_alert: bool) {
        let now = Utc::now();
        self.state.lock().unwrap().subscribers.insert(
            chat_id,
            Subscriber {
                chat_id,
                language: language.map(str::to_string),
                daily_alert,
                created_at: now,
                updated_at: now,
                selections: Vec::new(),
            },
        );
    }

    pub fn add_selection(&self, chat_id: ChatId, day: &str) -> i64 {
        let mut state = self.state.lock().unwrap();
        state.next_selection_id += 1;
        let id = state.next_selection_id;
        state.selections.push(DateSelection {
            id,
            chat_id,
            selection_date: date(day),
            created_at: Utc::now(),
            buying_prices: Vec::new(),
        });
        id
    }

    pub fn selection_count(&self, chat_id: ChatId) -> usize {
        let state = self.state.lock().unwrap();
        state.selections.iter().filter(|s| s.chat_id == chat_id).count()
    }

    fn check_loads(&self) -> Result<(), AppError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(AppError::Internal("store unavailable".to_string()));
        }
        Ok(())
    }

    fn ensure_subscriber(state: &mut MemoryState, chat_id: ChatId) -> &mut Subscriber {
        state.subscribers.entry(chat_id).or_insert_with(|| {
            let now = Utc::now();
            Subscriber {
                chat_id,
                language: None,
                daily_alert: false,
                created_at: now,
                updated_at: now,
                selections: Vec::new(),
            }
        })
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn get_subscriber(&self, chat_id: ChatId) -> Result<Option<Subscriber>, AppError> {
        Ok(self.state.lock().unwrap().subscribers.get(&chat_id).cloned())
    }

    async fn upsert_alert_flag(&self, chat_id: ChatId, enabled: bool) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_subscriber(&mut state, chat_id).daily_alert = enabled;
        if !enabled {
            state.selections.retain(|s| s.chat_id != chat_id);
        }
        Ok(())
    }

    async fn upsert_date_selection(
        &self,
        chat_id: ChatId,
        date: NaiveDate,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_subscriber(&mut state, chat_id);
        let exists = state
            .selections
            .iter()
            .any(|s| s.chat_id == chat_id && s.selection_date == date);
        if !exists {
            state.next_selection_id += 1;
            let id = state.next_selection_id;
            state.selections.push(DateSelection {
                id,
                chat_id,
                selection_date: date,
                created_at: Utc::now(),
                buying_prices: Vec::new(),
            });
        }
        Ok(())
    }

    async fn delete_date_selection(
        &self,
        chat_id: ChatId,
        selection_id: i64,
    ) -> Result<(), AppError> {
        self.state
            .lock()
            .unwrap()
            .selections
            .retain(|s| !(s.chat_id == chat_id && s.id == selection_id));
        Ok(())
    }

    async fn list_date_selections_page(
        &self,
        chat_id: ChatId,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<DateSelection>, i64), AppError> {
        let mut all = self.list_date_selections(chat_id).await?;
        all.reverse();
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_date_selections(&self, chat_id: ChatId) -> Result<Vec<DateSelection>, AppError> {
        let state = self.state.lock().unwrap();
        let mut selections: Vec<DateSelection> = state
            .selections
            .iter()
            .filter(|s| s.chat_id == chat_id)
            .cloned()
            .collect();
        selections.sort_by_key(|s| s.selection_date);
        Ok(selections)
    }

    async fn list_eligible_subscribers(&self) -> Result<Vec<Subscriber>, AppError> {
        self.check_loads()?;
        let state = self.state.lock().unwrap();
        let mut eligible = Vec::new();
        for subscriber in state.subscribers.values() {
            let mut selections: Vec<DateSelection> = state
                .selections
                .iter()
                .filter(|s| s.chat_id == subscriber.chat_id)
                .cloned()
                .collect();
            if !subscriber.daily_alert && selections.is_empty() {
                continue;
            }
            selections.sort_by_key(|s| s.selection_date);
            for selection in &mut selections {
                selection.buying_prices = state
                    .values
                    .iter()
                    .filter(|v| v.price_date == selection.selection_date)
                    .cloned()
                    .collect();
            }

            let mut subscriber = subscriber.clone();
            subscriber.selections = selections;
            eligible.push(subscriber);
        }
        Ok(eligible)
    }

    async fn set_language(&self, chat_id: ChatId, language: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        Self::ensure_subscriber(&mut state, chat_id).language = Some(language.to_string());
        Ok(())
    }

    async fn delete_subscriber(&self, chat_id: ChatId) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.subscribers.remove(&chat_id);
        state.selections.retain(|s| s.chat_id != chat_id);
        Ok(())
    }
}

#[async_trait]
impl ValueStore for MemoryStore {
    async fn get_latest_value_rows(&self) -> Result<Vec<ValueRow>, AppError> {
        self.check_loads()?;
        let state = self.state.lock().unwrap();
        let Some(latest) = state.values.iter().map(|v| v.price_date).max() else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<ValueRow> = state
            .values
            .iter()
            .filter(|v| v.price_date == latest)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.weight.total_cmp(&b.weight));
        Ok(rows)
    }

    async fn get_earliest_value_date(&self) -> Result<Option<NaiveDate>, AppError> {
        Ok(self.state.lock().unwrap().values.iter().map(|v| v.price_date).min())
    }

    async fn upsert_value_rows(&self, rows: &[ValueRow]) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            state
                .values
                .retain(|v| !(v.price_date == row.price_date && v.weight == row.weight));
            state.values.push(row.clone());
        }
        Ok(rows.len() as u64)
    }

    async fn exists_on(&self, date: NaiveDate) -> Result<bool, AppError> {
        Ok(self.state.lock().unwrap().values.iter().any(|v| v.price_date == date))
    }
}
