use clap::Parser;
use vnet::{cli::Args, requests};
use vnet_core::{Internet, TcpServer};

/// Wires one server and one client together for a manual smoke run.
#[tokio::main]
async fn main() {
    let args = Args::parse();
    args.init_logging();

    let internet = Internet::new();
    args.install_channel(&internet);

    let server = TcpServer::new(internet.clone(), 443).expect("port 443 starts out free");
    match requests::fetch(&internet, server.port(), "Hello Server").await {
        Some(reply) => println!("{reply}"),
        None => println!("request failed"),
    }
    server.close();
}
