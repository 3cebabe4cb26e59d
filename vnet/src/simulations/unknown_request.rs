use crate::requests;
use vnet_core::{Internet, TcpServer};

/// Sends something the server does not recognize.
///
/// The exchange itself must still run cleanly; the server answers with its
/// fallback reply.
pub async fn unknown_request() {
    let internet = Internet::new();
    let server = TcpServer::new(internet.clone(), 443).unwrap();

    let reply = requests::fetch(&internet, server.port(), "make me a sandwich").await;
    server.close();

    assert_eq!(reply.as_deref(), Some("Sorry. I did not understand that."));
}

#[cfg(test)]
mod tests {
    #[tokio::test]
    async fn unknown_request() {
        super::unknown_request().await
    }
}
