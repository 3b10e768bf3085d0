use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Spawn the expiry sweeper.
///
/// Reads already hide expired snippets; this task reclaims their rows.
pub fn start(state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_loop(state, cancel).await;
    })
}

async fn run_loop(state: AppState, cancel: CancellationToken) {
    let interval = Duration::from_secs(state.config.expiry_sweep_secs.max(1));
    tracing::info!(?interval, "expiry sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {},
            _ = cancel.cancelled() => {
                tracing::info!("expiry sweeper shutting down");
                return;
            }
        }

        if let Err(e) = sweep_once(&state).await {
            tracing::error!(error = %e, "expiry sweep failed");
        }
        state.create_limiter.retain_recent();
    }
}

pub async fn sweep_once(state: &AppState) -> anyhow::Result<u64> {
    let purged = state.snippets.purge_expired(state.clock.now()).await?;
    if purged > 0 {
        tracing::info!(purged, "expired snippets removed");
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snippets::{dto::CreateSnippetRequest, services};

    #[tokio::test]
    async fn sweep_removes_only_expired_rows() {
        let (st, clock) = AppState::fake_with(AppState::test_config());
        let mk = |days| CreateSnippetRequest {
            code: Some("x".into()),
            expires_in_days: days,
            ..Default::default()
        };
        services::create(&st, None, mk(Some(1))).await.unwrap();
        services::create(&st, None, mk(Some(5))).await.unwrap();
        services::create(&st, None, mk(None)).await.unwrap();

        assert_eq!(sweep_once(&st).await.unwrap(), 0);
        clock.advance(time::Duration::days(2));
        assert_eq!(sweep_once(&st).await.unwrap(), 1);
        clock.advance(time::Duration::days(10));
        assert_eq!(sweep_once(&st).await.unwrap(), 1);
        assert_eq!(sweep_once(&st).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn loop_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = start(AppState::fake(), cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
