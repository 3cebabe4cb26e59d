use crate::requests;
use std::sync::Arc;
use vnet_core::{channel::Lossy, Internet, TcpServer};

/// Runs the basic exchange over a channel that drops packets.
///
/// Identical to [`basic`](super::basic()) except that the fabric loses a
/// twentieth of the traffic. The retry helper absorbs the losses; the reply
/// must come back intact, with no chunk applied twice.
pub async fn lossy() {
    let internet = Internet::new();
    internet.set_channel(Arc::new(Lossy::new(0.05)));
    let server = TcpServer::new(internet.clone(), 443).unwrap();

    let reply = requests::fetch(&internet, server.port(), "Hello Server").await;
    server.close();

    assert_eq!(reply.as_deref(), Some("Hello Client :)"));
}
