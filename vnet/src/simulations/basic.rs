use vnet_core::{Internet, TcpClient, TcpServer};

/// Runs a basic exchange.
///
/// One server and one client on a perfectly reliable fabric. The client
/// introduces itself and must get the canned greeting back.
pub async fn basic() {
    let internet = Internet::new();
    let server = TcpServer::new(internet.clone(), 443).unwrap();

    let mut client = TcpClient::new(internet, 443).unwrap();
    client.connect().await.unwrap();
    client.send("Hello Server").await.unwrap();
    let reply = client.receive().await.unwrap();
    client.close();
    server.close();

    assert_eq!(reply, "Hello Client :)");
}
