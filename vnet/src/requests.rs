//! A convenience helper for one-shot request/response calls.

use std::sync::Arc;
use vnet_core::{Internet, Port, TcpClient, TransportError};

/// Sends `request` to the server on `server_port` with a fresh client and
/// returns the reply, or `None` if anything went wrong along the way. Every
/// failure kind becomes a single diagnostic line. The client is closed
/// whether the exchange succeeded or not.
pub async fn fetch(internet: &Arc<Internet>, server_port: Port, request: &str) -> Option<String> {
    let mut client = match TcpClient::new(internet.clone(), server_port) {
        Ok(client) => client,
        Err(error) => {
            report(&error);
            return None;
        }
    };
    let result = exchange(&mut client, request).await;
    client.close();
    match result {
        Ok(reply) => Some(reply),
        Err(error) => {
            report(&error);
            None
        }
    }
}

async fn exchange(client: &mut TcpClient, request: &str) -> Result<String, TransportError> {
    client.connect().await?;
    client.send(request).await?;
    client.receive().await
}

fn report(error: &TransportError) {
    match error {
        TransportError::FreePort(_) => {
            println!("Could not register a client, all ports are full!")
        }
        TransportError::Unstable => println!("Connection failed: {error}"),
        TransportError::Packet(error) => {
            println!("Something went wrong with the packets! {error}")
        }
        other => println!("Transport error: {other}"),
    }
}
