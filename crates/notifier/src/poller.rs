use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use goldie_common::shutdown::Shutdown;

use crate::handler::BotHandler;
use crate::telegram::TelegramClient;

/// Pause after a failed `getUpdates` before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Long-polls the Bot API and hands every update to the [`BotHandler`] on its own task.
pub struct UpdatePoller {
    client: Arc<TelegramClient>,
    handler: Arc<BotHandler>,
    timeout_secs: u64,
}

impl UpdatePoller {
    pub fn new(client: Arc<TelegramClient>, handler: Arc<BotHandler>, timeout_secs: u64) -> Self {
        Self {
            client,
            handler,
            timeout_secs,
        }
    }

    /// Poll until `shutdown` fires. A pending long poll is abandoned on shutdown; updates
    /// already handed out are awaited before returning.
    pub async fn run(&self, mut shutdown: Shutdown) {
        let mut offset = 0i64;
        let mut handlers = JoinSet::new();
        tracing::info!(timeout_secs = self.timeout_secs, "Update poller started");

        loop {
            let updates = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                result = self.client.get_updates(offset, self.timeout_secs) => result,
            };

            // reap finished handlers
            while handlers.try_join_next().is_some() {}

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let handler = self.handler.clone();
                        handlers.spawn(async move {
                            let update_id = update.update_id;
                            if let Err(e) = handler.handle_update(update).await {
                                tracing::error!(update_id, error = %e, "Failed to handle update");
                            }
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch updates, retrying...");
                    tokio::select! {
                        _ = shutdown.triggered() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        if !handlers.is_empty() {
            tracing::info!(pending = handlers.len(), "Waiting for in-flight updates");
        }
        while let Some(joined) = handlers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Update handler aborted");
            }
        }

        tracing::info!("Update poller stopped");
    }
}
