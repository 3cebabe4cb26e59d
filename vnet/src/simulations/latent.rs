use crate::requests;
use std::{sync::Arc, time::Duration};
use vnet_core::{channel::Delayed, Internet, TcpServer};

/// Runs the basic exchange over a channel with heavy latency.
///
/// Every packet is held for up to six seconds against a five second reply
/// timeout, so individual waits regularly expire and late duplicates arrive
/// long after they were given up on. The sequence number checks and the
/// retry helper must still produce exactly one clean exchange.
pub async fn latent() {
    let internet = Internet::new();
    internet.set_channel(Arc::new(Delayed::new(Duration::from_secs(6))));
    let server = TcpServer::new(internet.clone(), 443).unwrap();

    let reply = requests::fetch(&internet, server.port(), "Hello Server").await;
    server.close();

    assert_eq!(reply.as_deref(), Some("Hello Client :)"));
}

#[cfg(test)]
mod tests {
    // Paused time: the simulated latency should not cost wall-clock time.
    #[tokio::test(start_paused = true)]
    async fn latent() {
        super::latent().await
    }
}
