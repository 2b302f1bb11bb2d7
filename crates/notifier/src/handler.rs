//! Routes Telegram updates to the bot's commands and button protocols.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use tracing::{debug, info};

use goldie_common::error::AppError;
use goldie_common::types::ChatId;
use goldie_engine::calendar::{self, Calendar, DateBounds, DateSelectedHandler, SelectedDate};
use goldie_engine::i18n::{Localizer, resolve_language};
use goldie_engine::keyboard::{Button, Interaction, Keyboard};
use goldie_engine::pagination::{self, SettingsPaginator};
use goldie_engine::ports::{DeliverySink, SubscriptionStore, ValueStore};
use goldie_engine::render::ReportRenderer;

use crate::telegram::{CallbackQuery, Message, Update};

pub const LANGUAGE_PREFIX: &str = "lang:";

/// Languages offered by the `/start` keyboard.
const LANGUAGES: &[(&str, &str)] = &[("ru", "🇷🇺 Русский"), ("en", "🇬🇧 English")];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Alert,
    Alert2,
    Stop,
    Settings,
    Info,
    Delete,
    Price,
    Help,
}

impl Command {
    /// `/price`, `/price@goldie_bot` and `/price now` all parse as [`Command::Price`].
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?.split('@').next()?;

        let command = match name {
            "start" => Self::Start,
            "alert" => Self::Alert,
            "alert2" => Self::Alert2,
            "stop" => Self::Stop,
            "settings" => Self::Settings,
            "info" => Self::Info,
            "delete" => Self::Delete,
            "price" => Self::Price,
            "help" => Self::Help,
            _ => return None,
        };
        Some(command)
    }
}

/// Handler knobs taken from the application config.
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub default_language: String,
    pub offset: FixedOffset,
    pub alert_at: NaiveTime,
    pub disabled_weekdays: Vec<Weekday>,
}

pub struct BotHandler {
    sink: Arc<dyn DeliverySink>,
    subscriptions: Arc<dyn SubscriptionStore>,
    values: Arc<dyn ValueStore>,
    localizer: Arc<dyn Localizer>,
    renderer: Arc<dyn ReportRenderer>,
    calendar: Calendar,
    paginator: SettingsPaginator,
    settings: HandlerSettings,
}

impl BotHandler {
    pub fn new(
        sink: Arc<dyn DeliverySink>,
        subscriptions: Arc<dyn SubscriptionStore>,
        values: Arc<dyn ValueStore>,
        localizer: Arc<dyn Localizer>,
        renderer: Arc<dyn ReportRenderer>,
        settings: HandlerSettings,
    ) -> Self {
        Self {
            calendar: Calendar::new(settings.disabled_weekdays.clone(), localizer.clone()),
            paginator: SettingsPaginator::new(subscriptions.clone(), localizer.clone()),
            sink,
            subscriptions,
            values,
            localizer,
            renderer,
            settings,
        }
    }

    pub async fn handle_update(&self, update: Update) -> Result<(), AppError> {
        if let Some(query) = update.callback_query {
            return self.handle_callback(query).await;
        }
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }

        debug!(update_id = update.update_id, "Ignoring unsupported update");
        Ok(())
    }

    async fn handle_message(&self, message: Message) -> Result<(), AppError> {
        let chat_id = message.chat.id;
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            debug!(chat_id, "Ignoring non-command message");
            return Ok(());
        };

        let platform = message
            .from
            .as_ref()
            .and_then(|user| user.language_code.as_deref());
        let language = self.language(chat_id, platform).await?;
        info!(chat_id, command = ?command, language = %language, "Handling command");

        match command {
            Command::Start => {
                let text = self.localizer.render(&language, "startWelcomeMessage", &[])?;
                self.sink
                    .send_text(chat_id, &text, Some(&language_keyboard()))
                    .await?;
            }
            Command::Alert => {
                self.subscriptions.upsert_alert_flag(chat_id, true).await?;
                let time = self.settings.alert_at.format("%H:%M").to_string();
                let offset = self.settings.offset.to_string();
                let text = self.localizer.render(
                    &language,
                    "alert1Enabled",
                    &[("Time", &time), ("Offset", &offset)],
                )?;
                self.sink.send_text(chat_id, &text, None).await?;
            }
            Command::Alert2 => match self.values.get_earliest_value_date().await? {
                Some(earliest) => {
                    let bounds = DateBounds::new(earliest, self.today().max(earliest));
                    self.calendar
                        .send_calendar(self.sink.as_ref(), chat_id, &language, &bounds)
                        .await?;
                }
                None => self.reply(chat_id, &language, "noPrices").await?,
            },
            Command::Stop => {
                self.subscriptions.upsert_alert_flag(chat_id, false).await?;
                self.reply(chat_id, &language, "stopMessage").await?;
            }
            Command::Settings => {
                self.paginator
                    .show(self.sink.as_ref(), chat_id, &language)
                    .await?;
            }
            Command::Info => {
                let text = self.info_text(chat_id, &language).await?;
                self.sink.send_text(chat_id, &text, None).await?;
            }
            Command::Delete => {
                self.subscriptions.delete_subscriber(chat_id).await?;
                self.reply(chat_id, &language, "deleteMessage").await?;
            }
            Command::Price => {
                let rows = self.values.get_latest_value_rows().await?;
                if rows.is_empty() {
                    self.reply(chat_id, &language, "noPrices").await?;
                } else {
                    let text = self.renderer.prices_table(&language, &rows)?;
                    self.sink.send_text(chat_id, &text, None).await?;
                }
            }
            Command::Help => self.reply(chat_id, &language, "helpMessage").await?,
        }

        Ok(())
    }

    async fn handle_callback(&self, query: CallbackQuery) -> Result<(), AppError> {
        let (Some(data), Some(message)) = (query.data, query.message) else {
            debug!(callback_id = %query.id, "Ignoring callback without data or message");
            return Ok(());
        };

        let chat_id = message.chat.id;
        let language = self
            .language(chat_id, query.from.language_code.as_deref())
            .await?;
        let interaction = Interaction {
            id: query.id,
            chat_id,
            message_id: message.message_id,
            data,
        };

        if interaction.data.starts_with(calendar::CALLBACK_PREFIX) {
            let bounds = self.calendar_bounds().await?;
            self.calendar
                .handle_callback(self.sink.as_ref(), &interaction, &language, &bounds, self)
                .await
        } else if interaction.data.starts_with(pagination::CALLBACK_PREFIX) {
            self.paginator
                .handle_callback(self.sink.as_ref(), &interaction, &language)
                .await
        } else if let Some(code) = interaction.data.strip_prefix(LANGUAGE_PREFIX) {
            self.choose_language(&interaction, code).await
        } else {
            debug!(chat_id, data = %interaction.data, "Ignoring unknown callback");
            Ok(())
        }
    }

    async fn choose_language(&self, interaction: &Interaction, code: &str) -> Result<(), AppError> {
        if !self.localizer.supports(code) {
            debug!(chat_id = interaction.chat_id, language = code, "Ignoring unsupported language");
            return self.sink.acknowledge(&interaction.id, None).await;
        }

        self.subscriptions
            .set_language(interaction.chat_id, code)
            .await?;

        let text = self.localizer.render(code, "languageSaved", &[])?;
        self.sink
            .edit_text(interaction.chat_id, interaction.message_id, &text, None)
            .await?;
        self.sink.acknowledge(&interaction.id, None).await
    }

    async fn info_text(&self, chat_id: ChatId, language: &str) -> Result<String, AppError> {
        let selections = self.subscriptions.list_date_selections(chat_id).await?;
        let id = chat_id.to_string();

        let mut lines = vec![
            self.localizer.render(language, "infoTitle", &[])?,
            String::new(),
            self.localizer
                .render(language, "infoTelegramId", &[("ID", &id)])?,
            self.localizer
                .render(language, "infoLanguage", &[("Language", language)])?,
        ];
        for (index, selection) in selections.iter().enumerate() {
            let n = (index + 1).to_string();
            let date = selection.selection_date.format("%Y-%m-%d").to_string();
            lines.push(self.localizer.render(
                language,
                "infoPurchaseDate",
                &[("N", &n), ("Date", &date)],
            )?);
        }
        lines.push(String::new());
        lines.push(self.localizer.render(language, "infoFooter", &[])?);

        Ok(lines.join("\n"))
    }

    async fn reply(&self, chat_id: ChatId, language: &str, message_id: &str) -> Result<(), AppError> {
        let text = self.localizer.render(language, message_id, &[])?;
        self.sink.send_text(chat_id, &text, None).await?;
        Ok(())
    }

    async fn language(&self, chat_id: ChatId, platform: Option<&str>) -> Result<String, AppError> {
        let subscriber = self.subscriptions.get_subscriber(chat_id).await?;
        let stored = subscriber.as_ref().and_then(|s| s.language.as_deref());

        Ok(resolve_language(
            self.localizer.as_ref(),
            stored,
            platform,
            &self.settings.default_language,
        ))
    }

    /// `[earliest stored price, today]`; collapses to today while no prices exist.
    async fn calendar_bounds(&self) -> Result<DateBounds, AppError> {
        let today = self.today();
        let start = self
            .values
            .get_earliest_value_date()
            .await?
            .unwrap_or(today)
            .min(today);
        Ok(DateBounds::new(start, today))
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.settings.offset).date_naive()
    }
}

#[async_trait]
impl DateSelectedHandler for BotHandler {
    async fn date_selected(&self, selected: SelectedDate) -> Result<(), AppError> {
        self.subscriptions
            .upsert_date_selection(selected.chat_id, selected.date)
            .await?;
        info!(chat_id = selected.chat_id, date = %selected.date, "Purchase date saved");

        let date = selected.date.format("%Y-%m-%d").to_string();
        let text = self
            .localizer
            .render(&selected.language, "alert2Saved", &[("Date", &date)])?;
        self.sink
            .edit_text(selected.chat_id, selected.message_id, &text, None)
            .await?;
        self.sink.acknowledge(&selected.interaction_id, None).await
    }
}

fn language_keyboard() -> Keyboard {
    let buttons = LANGUAGES
        .iter()
        .map(|(code, label)| Button::new(*label, format!("{LANGUAGE_PREFIX}{code}")))
        .collect();
    Keyboard::new(vec![buttons])
}

#[cfg(test)]
mod tests {
    use goldie_engine::i18n::Catalog;
    use goldie_engine::render::HtmlTableRenderer;
    use goldie_engine::testing::{MemoryStore, RecordingSink, Sent, date, row};

    use crate::telegram::{Chat, User};

    use super::*;

    const CHAT: ChatId = 77;

    struct Fixture {
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
        catalog: Arc<Catalog>,
        handler: BotHandler,
    }

    fn fixture(store: MemoryStore) -> Fixture {
        let store = Arc::new(store);
        let sink = Arc::new(RecordingSink::new());
        let catalog = Arc::new(Catalog::embedded("en").unwrap());
        let handler = BotHandler::new(
            sink.clone(),
            store.clone(),
            store.clone(),
            catalog.clone(),
            Arc::new(HtmlTableRenderer::new(catalog.clone())),
            HandlerSettings {
                default_language: "en".to_string(),
                offset: FixedOffset::east_opt(6 * 3600).unwrap(),
                alert_at: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                disabled_weekdays: vec![Weekday::Sat, Weekday::Sun],
            },
        );
        Fixture {
            store,
            sink,
            catalog,
            handler,
        }
    }

    fn priced_store() -> MemoryStore {
        MemoryStore::with_values(vec![
            row("2024-01-03", 1.0, 8000.0, 8100.0),
            row("2025-11-07", 1.0, 12577.0, 12640.0),
        ])
    }

    fn command(text: &str, platform: Option<&str>) -> Update {
        Update {
            update_id: 1,
            message: Some(Message {
                message_id: 10,
                chat: Chat { id: CHAT },
                from: Some(User {
                    id: CHAT,
                    language_code: platform.map(str::to_string),
                }),
                text: Some(text.to_string()),
            }),
            callback_query: None,
        }
    }

    fn press(data: &str) -> Update {
        Update {
            update_id: 2,
            message: None,
            callback_query: Some(CallbackQuery {
                id: "cb-1".to_string(),
                from: User {
                    id: CHAT,
                    language_code: None,
                },
                message: Some(Message {
                    message_id: 55,
                    chat: Chat { id: CHAT },
                    from: None,
                    text: None,
                }),
                data: Some(data.to_string()),
            }),
        }
    }

    fn last_text(sink: &RecordingSink) -> String {
        sink.texts_for(CHAT).pop().unwrap()
    }

    // ============================================================
    // Command parsing
    // ============================================================

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/price@goldie_bot"), Some(Command::Price));
        assert_eq!(Command::parse("/alert2 please"), Some(Command::Alert2));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("price"), None);
        assert_eq!(Command::parse(""), None);
    }

    // ============================================================
    // Commands
    // ============================================================

    #[tokio::test]
    async fn test_start_offers_languages_in_platform_language() {
        let f = fixture(MemoryStore::new());

        f.handler
            .handle_update(command("/start", Some("ru")))
            .await
            .unwrap();

        let events = f.sink.events();
        let Sent::Text { text, keyboard, .. } = &events[0] else {
            panic!("expected a new message, got {events:?}");
        };
        assert_eq!(
            *text,
            f.catalog.render("ru", "startWelcomeMessage", &[]).unwrap()
        );
        let data: Vec<&str> = keyboard
            .as_ref()
            .unwrap()
            .buttons()
            .map(|b| b.callback_data.as_str())
            .collect();
        assert_eq!(data, vec!["lang:ru", "lang:en"]);
        // nothing is persisted by /start
        assert!(f.store.get_subscriber(CHAT).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_language_wins_over_platform() {
        let f = fixture(MemoryStore::new());
        f.store.add_subscriber(CHAT, Some("ru"), false);

        f.handler
            .handle_update(command("/help", Some("en")))
            .await
            .unwrap();

        assert_eq!(
            last_text(&f.sink),
            f.catalog.render("ru", "helpMessage", &[]).unwrap()
        );
    }

    #[tokio::test]
    async fn test_unsupported_platform_language_falls_back_to_default() {
        let f = fixture(MemoryStore::new());

        f.handler
            .handle_update(command("/help", Some("de")))
            .await
            .unwrap();

        assert_eq!(
            last_text(&f.sink),
            f.catalog.render("en", "helpMessage", &[]).unwrap()
        );
    }

    #[tokio::test]
    async fn test_alert_enables_daily_alert() {
        let f = fixture(MemoryStore::new());

        f.handler
            .handle_update(command("/alert", None))
            .await
            .unwrap();

        let subscriber = f.store.get_subscriber(CHAT).await.unwrap().unwrap();
        assert!(subscriber.daily_alert);
        assert_eq!(
            last_text(&f.sink),
            "Done. I'll send you an alert about the gold selling price every day at 10:00 (UTC +06:00)"
        );
    }

    #[tokio::test]
    async fn test_stop_disables_alert_and_drops_selections() {
        let f = fixture(MemoryStore::new());
        f.store.add_subscriber(CHAT, None, true);
        f.store.add_selection(CHAT, "2024-10-01");

        f.handler
            .handle_update(command("/stop", None))
            .await
            .unwrap();

        assert!(!f.store.get_subscriber(CHAT).await.unwrap().unwrap().daily_alert);
        assert_eq!(f.store.selection_count(CHAT), 0);
        assert!(last_text(&f.sink).starts_with("Bot stopped"));
    }

    #[tokio::test]
    async fn test_delete_forgets_subscriber() {
        let f = fixture(MemoryStore::new());
        f.store.add_subscriber(CHAT, Some("en"), true);
        f.store.add_selection(CHAT, "2024-10-01");

        f.handler
            .handle_update(command("/delete", None))
            .await
            .unwrap();

        assert!(f.store.get_subscriber(CHAT).await.unwrap().is_none());
        assert_eq!(f.store.selection_count(CHAT), 0);
        assert_eq!(last_text(&f.sink), "We forgot about you.");
    }

    #[tokio::test]
    async fn test_info_lists_dates_oldest_first() {
        let f = fixture(MemoryStore::new());
        f.store.add_subscriber(CHAT, Some("en"), false);
        f.store.add_selection(CHAT, "2024-10-01");
        f.store.add_selection(CHAT, "2023-01-15");

        f.handler
            .handle_update(command("/info", None))
            .await
            .unwrap();

        let text = last_text(&f.sink);
        assert!(text.contains("TelegramID: 77"));
        assert!(text.contains("Language: en"));
        let first = text.find("Purchase date #1: 2023-01-15").unwrap();
        let second = text.find("Purchase date #2: 2024-10-01").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_price_sends_latest_table() {
        let f = fixture(priced_store());

        f.handler
            .handle_update(command("/price", None))
            .await
            .unwrap();

        let text = last_text(&f.sink);
        assert!(text.starts_with("<b>Gold prices for 2025-11-07</b>"));
        assert!(text.contains("12577.00"));
    }

    #[tokio::test]
    async fn test_price_without_prices() {
        let f = fixture(MemoryStore::new());

        f.handler
            .handle_update(command("/price", None))
            .await
            .unwrap();

        assert_eq!(
            last_text(&f.sink),
            "I don't have any prices yet. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_alert2_sends_calendar_from_earliest_year() {
        let f = fixture(priced_store());

        f.handler
            .handle_update(command("/alert2", None))
            .await
            .unwrap();

        let events = f.sink.events();
        let Sent::Text { text, keyboard, .. } = &events[0] else {
            panic!("expected a new message, got {events:?}");
        };
        assert_eq!(text, "📅 Choose year:");
        let first = keyboard.as_ref().unwrap().buttons().next().unwrap();
        assert_eq!(first.callback_data, "cal:year:2024");
    }

    #[tokio::test]
    async fn test_non_command_text_is_ignored() {
        let f = fixture(MemoryStore::new());

        f.handler
            .handle_update(command("hello there", None))
            .await
            .unwrap();

        assert!(f.sink.events().is_empty());
    }

    // ============================================================
    // Callbacks
    // ============================================================

    #[tokio::test]
    async fn test_language_button_saves_and_confirms() {
        let f = fixture(MemoryStore::new());

        f.handler.handle_update(press("lang:ru")).await.unwrap();

        let subscriber = f.store.get_subscriber(CHAT).await.unwrap().unwrap();
        assert_eq!(subscriber.language.as_deref(), Some("ru"));
        assert_eq!(
            f.sink.events(),
            vec![
                Sent::Edit {
                    chat_id: CHAT,
                    message_id: 55,
                    text: f.catalog.render("ru", "languageSaved", &[]).unwrap(),
                    keyboard: None,
                },
                Sent::Ack {
                    interaction_id: "cb-1".to_string(),
                    text: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unsupported_language_button_is_only_acknowledged() {
        let f = fixture(MemoryStore::new());

        f.handler.handle_update(press("lang:xx")).await.unwrap();

        assert!(f.store.get_subscriber(CHAT).await.unwrap().is_none());
        assert_eq!(
            f.sink.events(),
            vec![Sent::Ack {
                interaction_id: "cb-1".to_string(),
                text: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_day_button_saves_purchase_date() {
        let f = fixture(priced_store());

        f.handler
            .handle_update(press("cal:day:2024-10-01"))
            .await
            .unwrap();

        let selections = f.store.list_date_selections(CHAT).await.unwrap();
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].selection_date, date("2024-10-01"));
        assert_eq!(
            f.sink.events(),
            vec![
                Sent::Edit {
                    chat_id: CHAT,
                    message_id: 55,
                    text: "Done. Every day I'll send you the gain for gold bought on 2024-10-01."
                        .to_string(),
                    keyboard: None,
                },
                Sent::Ack {
                    interaction_id: "cb-1".to_string(),
                    text: None,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_unselectable_day_button_saves_nothing() {
        let f = fixture(priced_store());

        // a Saturday, a Monday before the first price, a day in the future
        for data in ["cal:day:2024-10-05", "cal:day:2023-01-02", "cal:day:2099-01-05"] {
            f.handler.handle_update(press(data)).await.unwrap();
        }

        assert!(f.store.list_date_selections(CHAT).await.unwrap().is_empty());
        let ack = Sent::Ack {
            interaction_id: "cb-1".to_string(),
            text: None,
        };
        assert_eq!(f.sink.events(), vec![ack.clone(), ack.clone(), ack]);
    }

    #[tokio::test]
    async fn test_year_button_edits_calendar_in_place() {
        let f = fixture(priced_store());

        f.handler.handle_update(press("cal:year:2024")).await.unwrap();

        let events = f.sink.events();
        let Sent::Edit {
            message_id, text, ..
        } = &events[0]
        else {
            panic!("expected an edit, got {events:?}");
        };
        assert_eq!(*message_id, 55);
        assert_eq!(text, "📅 2024. Choose month:");
    }

    #[tokio::test]
    async fn test_settings_delete_button_repages() {
        let f = fixture(MemoryStore::new());
        f.store.add_subscriber(CHAT, Some("en"), false);
        let id = f.store.add_selection(CHAT, "2024-10-01");
        f.store.add_selection(CHAT, "2024-10-02");

        f.handler
            .handle_update(press(&format!("set:del:{id}:1")))
            .await
            .unwrap();

        assert_eq!(f.store.selection_count(CHAT), 1);
        let events = f.sink.events();
        assert!(matches!(&events[0], Sent::Edit { text, .. } if text.starts_with("Your alert2 subscriptions (1/1):")));
        assert_eq!(
            events[1],
            Sent::Ack {
                interaction_id: "cb-1".to_string(),
                text: Some("Subscription deleted.".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_settings_command_sends_first_page() {
        let f = fixture(MemoryStore::new());
        f.store.add_subscriber(CHAT, Some("en"), false);

        f.handler
            .handle_update(command("/settings", None))
            .await
            .unwrap();

        assert_eq!(
            f.sink.events(),
            vec![Sent::Text {
                chat_id: CHAT,
                text: "You don't have alert2 subscriptions yet.".to_string(),
                keyboard: None,
            }]
        );
    }

    #[tokio::test]
    async fn test_callback_without_message_is_ignored() {
        let f = fixture(MemoryStore::new());
        let mut update = press("cal:noop");
        if let Some(query) = update.callback_query.as_mut() {
            query.message = None;
        }

        f.handler.handle_update(update).await.unwrap();

        assert!(f.sink.events().is_empty());
    }
}
