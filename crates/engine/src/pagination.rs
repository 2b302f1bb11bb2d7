//! Paginated review of a subscriber's purchase dates with delete-in-place.
//!
//! Callback data: `set:page:<N>` and `set:del:<selection id>:<N>`, where `N` is the
//! page to show afterwards.

use std::sync::Arc;

use tracing::{debug, info};

use goldie_common::error::AppError;
use goldie_common::types::{ChatId, DateSelection};

use crate::i18n::Localizer;
use crate::keyboard::{Button, Interaction, Keyboard, Screen};
use crate::ports::{DeliverySink, SubscriptionStore};

pub const CALLBACK_PREFIX: &str = "set:";
pub const PAGE_SIZE: i64 = 10;

/// One page of selections, newest date first.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub selections: Vec<DateSelection>,
    /// 1-based, always within `1..=total_pages` when there is anything to show
    pub page: i64,
    pub total_pages: i64,
    pub total: i64,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub fn total_pages(total: i64, page_size: i64) -> i64 {
    if total <= 0 || page_size <= 0 {
        return 0;
    }
    (total + page_size - 1) / page_size
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsAction {
    Page(i64),
    Delete { selection_id: i64, page: i64 },
}

impl SettingsAction {
    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix(CALLBACK_PREFIX)?;
        let mut parts = rest.split(':');

        let action = match (parts.next()?, parts.next(), parts.next()) {
            ("page", Some(page), None) => Self::Page(page.parse().ok()?),
            ("del", Some(id), Some(page)) => Self::Delete {
                selection_id: id.parse().ok()?,
                page: page.parse().ok()?,
            },
            _ => return None,
        };

        if parts.next().is_some() {
            return None;
        }
        Some(action)
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Page(page) => format!("{CALLBACK_PREFIX}page:{page}"),
            Self::Delete { selection_id, page } => {
                format!("{CALLBACK_PREFIX}del:{selection_id}:{page}")
            }
        }
    }
}

pub struct SettingsPaginator {
    store: Arc<dyn SubscriptionStore>,
    localizer: Arc<dyn Localizer>,
    page_size: i64,
}

impl SettingsPaginator {
    pub fn new(store: Arc<dyn SubscriptionStore>, localizer: Arc<dyn Localizer>) -> Self {
        Self {
            store,
            localizer,
            page_size: PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fetch `requested`, clamped into the valid range. A page past the end (the list
    /// shrank) is replaced by the last page.
    pub async fn fetch_page(&self, chat_id: ChatId, requested: i64) -> Result<Page, AppError> {
        let mut page = requested.max(1);
        let (mut selections, total) = self
            .store
            .list_date_selections_page(chat_id, self.page_size, self.offset(page))
            .await?;

        let total_pages = total_pages(total, self.page_size);
        if total_pages > 0 && page > total_pages {
            page = total_pages;
            (selections, _) = self
                .store
                .list_date_selections_page(chat_id, self.page_size, self.offset(page))
                .await?;
        }

        Ok(Page {
            selections,
            page,
            total_pages,
            total,
        })
    }

    /// Delete one selection and return the page to show next.
    pub async fn delete_and_repage(
        &self,
        chat_id: ChatId,
        selection_id: i64,
        page: i64,
    ) -> Result<Page, AppError> {
        self.store
            .delete_date_selection(chat_id, selection_id)
            .await?;
        info!(chat_id, selection_id, "Deleted date selection");

        self.fetch_page(chat_id, page).await
    }

    pub fn render(&self, language: &str, page: &Page) -> Result<Screen, AppError> {
        if page.is_empty() {
            return Ok(Screen {
                text: self.localizer.render(language, "settingsEmpty", &[])?,
                keyboard: None,
            });
        }

        let mut lines = vec![self.localizer.render(
            language,
            "settingsTitle",
            &[
                ("Page", &page.page.to_string()),
                ("Total", &page.total_pages.to_string()),
            ],
        )?];

        let mut rows = Vec::with_capacity(page.selections.len() + 1);
        for selection in &page.selections {
            let date = selection.selection_date.format("%Y-%m-%d").to_string();
            lines.push(
                self.localizer
                    .render(language, "settingsItem", &[("Date", &date)])?,
            );

            let label = self
                .localizer
                .render(language, "settingsDeleteButton", &[("Date", &date)])
                .unwrap_or_else(|_| date.clone());
            rows.push(vec![Button::new(
                label,
                SettingsAction::Delete {
                    selection_id: selection.id,
                    page: page.page,
                }
                .encode(),
            )]);
        }

        let mut nav = Vec::with_capacity(2);
        if page.has_prev() {
            nav.push(Button::new(
                self.decoration(language, "settingsPrev"),
                SettingsAction::Page(page.page - 1).encode(),
            ));
        }
        if page.has_next() {
            nav.push(Button::new(
                self.decoration(language, "settingsNext"),
                SettingsAction::Page(page.page + 1).encode(),
            ));
        }
        if !nav.is_empty() {
            rows.push(nav);
        }

        Ok(Screen {
            text: lines.join("\n"),
            keyboard: Some(Keyboard::new(rows)),
        })
    }

    /// Send the first page as a new message.
    pub async fn show(
        &self,
        sink: &dyn DeliverySink,
        chat_id: ChatId,
        language: &str,
    ) -> Result<(), AppError> {
        let page = self.fetch_page(chat_id, 1).await?;
        let screen = self.render(language, &page)?;
        sink.send_text(chat_id, &screen.text, screen.keyboard.as_ref())
            .await?;
        Ok(())
    }

    /// Apply a page switch or a deletion to the list message it came from.
    pub async fn handle_callback(
        &self,
        sink: &dyn DeliverySink,
        interaction: &Interaction,
        language: &str,
    ) -> Result<(), AppError> {
        let Some(action) = SettingsAction::parse(&interaction.data) else {
            debug!(chat_id = interaction.chat_id, data = %interaction.data, "Ignoring malformed settings data");
            return Ok(());
        };

        let (page, toast) = match action {
            SettingsAction::Page(page) => (self.fetch_page(interaction.chat_id, page).await?, None),
            SettingsAction::Delete { selection_id, page } => {
                let page = self
                    .delete_and_repage(interaction.chat_id, selection_id, page)
                    .await?;
                let toast = self.localizer.render(language, "settingsDeleted", &[]).ok();
                (page, toast)
            }
        };

        let screen = self.render(language, &page)?;
        sink.edit_text(
            interaction.chat_id,
            interaction.message_id,
            &screen.text,
            screen.keyboard.as_ref(),
        )
        .await?;
        sink.acknowledge(&interaction.id, toast.as_deref()).await
    }

    fn offset(&self, page: i64) -> i64 {
        (page - 1).saturating_mul(self.page_size)
    }

    fn decoration(&self, language: &str, message_id: &str) -> String {
        self.localizer
            .render(language, message_id, &[])
            .unwrap_or_default()
    }
}
