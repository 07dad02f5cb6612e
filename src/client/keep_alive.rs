use std::sync::Arc;

use super::client::ClientShared;

/// Idle keep-alive loop, one task per client.
///
/// Every successful outbound send re-arms the timer through the shared
/// `Notify`. When the interval elapses with no traffic, an `Error`-type
/// no-op packet is sent to the `keep-alive` topic. A failed keep-alive send
/// never surfaces anywhere; the timer simply stays un-armed until the next
/// successful send.
pub(crate) async fn run(shared: Arc<ClientShared>) {
    loop {
        let armed = tokio::select! {
            _ = shared.keep_alive_reset.notified() => true,
            _ = tokio::time::sleep(shared.keep_alive) => {
                shared.send_keep_alive().await.is_ok()
            }
        };
        if !armed {
            shared.keep_alive_reset.notified().await;
        }
    }
}
