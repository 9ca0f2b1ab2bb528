//! Hub event loop.
//!
//! The loop's only suspension point is one `select!` over three sources:
//!
//! - a new connection on the listener
//! - the next [`HubEvent`](super::events::HubEvent) from a reader task
//! - the scheduler's next deadline, if any
//!
//! Whatever woke the loop is handled to completion, then the scheduler is
//! polled exactly once. The deadline arm bounds the wait so timed events fire
//! on time even when every socket is silent; it never sleeps past I/O.

use std::time::Instant;

use anyhow::Result;

use super::Hub;
use crate::config::Config;

impl Hub {
    /// Run the hub until the process is killed.
    ///
    /// # Errors
    ///
    /// Never returns under normal operation. Accept failures are logged and
    /// the loop continues.
    pub async fn run(mut self) -> Result<()> {
        log::info!("[Hub] Listening on {}", self.local_addr);

        loop {
            let deadline = self.scheduler.next_deadline();

            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.accept_connection(stream, peer),
                    Err(e) => log::warn!("[Hub] Accept failed: {e}"),
                },
                Some(event) = self.hub_event_rx.recv() => self.handle_hub_event(event),
                () = wait_until(deadline) => {}
            }

            self.poll_scheduler();
        }
    }
}

/// Resolve at `deadline`, or never when there is none.
async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

/// Bind a hub with `config` and run it forever.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn serve(config: Config) -> Result<()> {
    let hub = Hub::bind(config).await?;
    hub.run().await
}
