//! Calendar picker, settings pagination and notification fan-out for the gold
//! price bot, plus the PostgreSQL stores they run against.

pub mod calendar;
pub mod dispatcher;
pub mod i18n;
pub mod keyboard;
pub mod pagination;
pub mod ports;
pub mod prices;
pub mod render;
pub mod subscription;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
