//! Telegram binding: Bot API client, update routing and the long-poll loop.

pub mod handler;
pub mod poller;
pub mod telegram;
