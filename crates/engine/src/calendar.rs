//! Three-level date picker (year → month → day) driven entirely by callback data.
//!
//! No navigation state is kept between button presses. Every screen is rebuilt from
//! the token carried by the pressed button plus the caller-supplied [`DateBounds`].
//!
//! Token grammar, always prefixed with [`CALLBACK_PREFIX`]:
//!
//! | token                | next screen                          |
//! |----------------------|--------------------------------------|
//! | `year:<Y>`           | months of `Y`                        |
//! | `month:<YYYY>-<MM>`  | days of that month                   |
//! | `day:<YYYY>-<MM>-<DD>` | date selected                      |
//! | `back:year`          | years                                |
//! | `noop`               | nothing, the press is acknowledged   |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Month, NaiveDate, Weekday};
use tracing::debug;

use goldie_common::error::AppError;
use goldie_common::types::{ChatId, MessageId};

use crate::i18n::Localizer;
use crate::keyboard::{Button, Interaction, Keyboard, Screen};
use crate::ports::DeliverySink;

pub const CALLBACK_PREFIX: &str = "cal:";

const YEARS_PER_ROW: usize = 4;
const MONTHS_PER_ROW: usize = 3;
const DAYS_PER_ROW: usize = 7;

const BLANK: &str = " ";
const OUT_OF_RANGE: &str = "⛔";
const DISABLED_WEEKDAY: &str = "🚫";

const MONTH_KEYS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];
const WEEKDAY_KEYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// Selectable range, inclusive on both ends. Usually the earliest stored price date
/// and today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBounds {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateBounds {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// Parsed calendar callback data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarToken {
    Year(i32),
    Month(i32, u32),
    Day(NaiveDate),
    BackToYears,
    Noop,
}

impl CalendarToken {
    /// `None` for anything that is not a well-formed calendar token.
    pub fn parse(data: &str) -> Option<Self> {
        let rest = data.strip_prefix(CALLBACK_PREFIX)?;
        let (action, arg) = rest.split_once(':').unwrap_or((rest, ""));

        match action {
            "noop" => Some(Self::Noop),
            "back" if arg == "year" => Some(Self::BackToYears),
            "year" => arg.parse().ok().map(Self::Year),
            "month" => {
                let (year, month) = arg.split_once('-')?;
                let year: i32 = year.parse().ok()?;
                let month: u32 = month.parse().ok()?;
                NaiveDate::from_ymd_opt(year, month, 1)?;
                Some(Self::Month(year, month))
            }
            "day" => NaiveDate::parse_from_str(arg, "%Y-%m-%d").ok().map(Self::Day),
            _ => None,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::Year(year) => format!("{CALLBACK_PREFIX}year:{year}"),
            Self::Month(year, month) => format!("{CALLBACK_PREFIX}month:{year:04}-{month:02}"),
            Self::Day(date) => format!("{CALLBACK_PREFIX}day:{}", date.format("%Y-%m-%d")),
            Self::BackToYears => format!("{CALLBACK_PREFIX}back:year"),
            Self::Noop => format!("{CALLBACK_PREFIX}noop"),
        }
    }
}

/// Outcome of one button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarStep {
    /// Replace the picker message with this screen.
    Render(Screen),
    /// A concrete day was picked.
    Selected(NaiveDate),
    /// Inert button or an unselectable day: acknowledge without a payload.
    Acknowledge,
    /// Malformed data: do nothing at all.
    Ignore,
}

/// What the calendar hands over once a day is picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDate {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub interaction_id: String,
    pub language: String,
    pub date: NaiveDate,
}

/// Persists and confirms a picked date. The calendar itself stores nothing.
#[async_trait]
pub trait DateSelectedHandler: Send + Sync {
    async fn date_selected(&self, selected: SelectedDate) -> Result<(), AppError>;
}

pub struct Calendar {
    disabled_weekdays: Vec<Weekday>,
    localizer: Arc<dyn Localizer>,
}

impl Calendar {
    pub fn new(disabled_weekdays: Vec<Weekday>, localizer: Arc<dyn Localizer>) -> Self {
        Self {
            disabled_weekdays,
            localizer,
        }
    }

    /// Years from `bounds.start` to `bounds.end`.
    pub fn year_screen(&self, language: &str, bounds: &DateBounds) -> Result<Screen, AppError> {
        let text = self.localizer.render(language, "chooseYear", &[])?;

        let buttons = (bounds.start.year()..=bounds.end.year())
            .map(|year| Button::new(year.to_string(), CalendarToken::Year(year).encode()))
            .collect();

        Ok(Screen {
            text,
            keyboard: Some(Keyboard::new(chunk(buttons, YEARS_PER_ROW))),
        })
    }

    /// Twelve months of `year`. Months before the start month of the start year and
    /// after the end month of the end year are inert.
    pub fn month_screen(
        &self,
        language: &str,
        bounds: &DateBounds,
        year: i32,
    ) -> Result<Screen, AppError> {
        let text = self.localizer.render(
            language,
            "chooseMonth",
            &[("Year", &year.to_string())],
        )?;

        let first = if year == bounds.start.year() {
            bounds.start.month()
        } else {
            1
        };
        let last = if year == bounds.end.year() {
            bounds.end.month()
        } else {
            12
        };

        let buttons = (1..=12u32)
            .zip(MONTH_KEYS)
            .map(|(month, key)| {
                if (first..=last).contains(&month) {
                    Button::new(
                        self.decoration(language, &format!("month.{key}")),
                        CalendarToken::Month(year, month).encode(),
                    )
                } else {
                    inert(OUT_OF_RANGE)
                }
            })
            .collect();

        let mut rows = chunk(buttons, MONTHS_PER_ROW);
        rows.push(vec![Button::new(
            self.decoration(language, "chooseMonth.prev"),
            CalendarToken::BackToYears.encode(),
        )]);

        Ok(Screen {
            text,
            keyboard: Some(Keyboard::new(rows)),
        })
    }

    /// Monday-first grid of the month's days under a weekday header.
    pub fn day_screen(
        &self,
        language: &str,
        bounds: &DateBounds,
        year: i32,
        month: u32,
    ) -> Result<Screen, AppError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| AppError::Validation(format!("No such month {year}-{month}")))?;

        let month_name = self.month_name(language, month);
        let text = self.localizer.render(
            language,
            "chooseDay",
            &[("Month", &month_name), ("Year", &year.to_string())],
        )?;

        let header = WEEKDAY_KEYS
            .iter()
            .map(|key| inert(&self.decoration(language, &format!("day.{key}"))))
            .collect();
        let mut rows = vec![header];

        // Monday = 1 .. Sunday = 7
        let leading = first.weekday().number_from_monday() as usize - 1;
        let mut cells: Vec<Button> = (0..leading).map(|_| inert(BLANK)).collect();

        let days = (1..=31).map_while(|day| NaiveDate::from_ymd_opt(year, month, day));
        for date in days {
            let cell = if !bounds.contains(date) {
                inert(OUT_OF_RANGE)
            } else if self.disabled_weekdays.contains(&date.weekday()) {
                inert(DISABLED_WEEKDAY)
            } else {
                Button::new(
                    format!("{:2}", date.day()),
                    CalendarToken::Day(date).encode(),
                )
            };
            cells.push(cell);
        }

        let trailing = (DAYS_PER_ROW - cells.len() % DAYS_PER_ROW) % DAYS_PER_ROW;
        cells.extend((0..trailing).map(|_| inert(BLANK)));

        rows.extend(chunk(cells, DAYS_PER_ROW));
        rows.push(vec![Button::new(
            self.decoration(language, "chooseDay.prev"),
            CalendarToken::Year(year).encode(),
        )]);

        Ok(Screen {
            text,
            keyboard: Some(Keyboard::new(rows)),
        })
    }

    fn is_selectable(&self, date: NaiveDate, bounds: &DateBounds) -> bool {
        bounds.contains(date) && !self.disabled_weekdays.contains(&date.weekday())
    }

    /// Decide what a button press leads to. Pure apart from localization.
    /// A day outside `bounds` or on a disabled weekday is only acknowledged.
    pub fn advance(
        &self,
        data: &str,
        language: &str,
        bounds: &DateBounds,
    ) -> Result<CalendarStep, AppError> {
        let Some(token) = CalendarToken::parse(data) else {
            return Ok(CalendarStep::Ignore);
        };

        let step = match token {
            CalendarToken::BackToYears => CalendarStep::Render(self.year_screen(language, bounds)?),
            CalendarToken::Year(year) => {
                CalendarStep::Render(self.month_screen(language, bounds, year)?)
            }
            CalendarToken::Month(year, month) => {
                CalendarStep::Render(self.day_screen(language, bounds, year, month)?)
            }
            CalendarToken::Day(date) if self.is_selectable(date, bounds) => {
                CalendarStep::Selected(date)
            }
            // stale picker or hand-made data
            CalendarToken::Day(_) => CalendarStep::Acknowledge,
            CalendarToken::Noop => CalendarStep::Acknowledge,
        };

        Ok(step)
    }

    /// Send the year screen as a new message.
    pub async fn send_calendar(
        &self,
        sink: &dyn DeliverySink,
        chat_id: ChatId,
        language: &str,
        bounds: &DateBounds,
    ) -> Result<MessageId, AppError> {
        let screen = self.year_screen(language, bounds)?;
        sink.send_text(chat_id, &screen.text, screen.keyboard.as_ref())
            .await
    }

    /// Apply a button press to the picker message it came from.
    pub async fn handle_callback(
        &self,
        sink: &dyn DeliverySink,
        interaction: &Interaction,
        language: &str,
        bounds: &DateBounds,
        on_selected: &dyn DateSelectedHandler,
    ) -> Result<(), AppError> {
        match self.advance(&interaction.data, language, bounds)? {
            CalendarStep::Render(screen) => {
                sink.edit_text(
                    interaction.chat_id,
                    interaction.message_id,
                    &screen.text,
                    screen.keyboard.as_ref(),
                )
                .await?;
            }
            CalendarStep::Selected(date) => {
                on_selected
                    .date_selected(SelectedDate {
                        chat_id: interaction.chat_id,
                        message_id: interaction.message_id,
                        interaction_id: interaction.id.clone(),
                        language: language.to_string(),
                        date,
                    })
                    .await?;
            }
            CalendarStep::Acknowledge => sink.acknowledge(&interaction.id, None).await?,
            CalendarStep::Ignore => {
                debug!(chat_id = interaction.chat_id, data = %interaction.data, "Ignoring malformed calendar data");
            }
        }

        Ok(())
    }

    /// Button labels and headers: a missing translation leaves the label empty.
    fn decoration(&self, language: &str, message_id: &str) -> String {
        self.localizer
            .render(language, message_id, &[])
            .unwrap_or_default()
    }

    fn month_name(&self, language: &str, month: u32) -> String {
        let key = MONTH_KEYS[(month as usize - 1) % 12];
        self.localizer
            .render(language, &format!("month.{key}"), &[])
            .ok()
            .or_else(|| {
                Month::try_from(month as u8)
                    .ok()
                    .map(|m| m.name().to_string())
            })
            .unwrap_or_default()
    }
}

fn inert(text: &str) -> Button {
    Button::new(text, CalendarToken::Noop.encode())
}

fn chunk(buttons: Vec<Button>, per_row: usize) -> Vec<Vec<Button>> {
    buttons.chunks(per_row).map(<[Button]>::to_vec).collect()
}
