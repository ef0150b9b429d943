use crate::db::{AccountDirectory, CredentialStore};
use crate::google_oauth::AuthorizationProvider;
use crate::service::lifecycle::TokenLifecycle;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::IntervalStream;
use tracing::{error, info};

/// Run `refresh_all_authorized` every `period`. Returns `None` when `period` is zero.
pub fn spawn<S, A, P>(
    lifecycle: Arc<TokenLifecycle<S, A, P>>,
    period: Duration,
) -> Option<JoinHandle<()>>
where
    S: CredentialStore,
    A: AccountDirectory,
    P: AuthorizationProvider,
{
    if period.is_zero() {
        info!("Scheduled token refresh disabled");
        return None;
    }

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    Some(tokio::spawn(async move {
        info!("Scheduled token refresh started: every {:?}", period);
        let mut ticks = IntervalStream::new(ticker);
        while ticks.next().await.is_some() {
            match lifecycle.refresh_all_authorized().await {
                Ok(summary) => info!(
                    refreshed = summary.refreshed,
                    failed = summary.failed,
                    total = summary.total,
                    "Scheduled token refresh finished"
                ),
                Err(e) => error!(error = %e, "Scheduled token refresh aborted"),
            }
        }
    }))
}
