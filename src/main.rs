//! Secure Multi-Room Chat Server - Entry Point
//!
//! Binds the listener, loads the TLS certificate and key if given, and
//! runs the accept loop.
//!
//! Usage: secure_chat_server [addr] [cert.pem key.pem]
//! Without cert/key paths the server speaks plain TCP (local testing).

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;
use tracing_subscriber::EnvFilter;

use secure_chat_server::ChatServer;

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8444";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=secure_chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("secure_chat_server=info")),
        )
        .init();

    let mut args = env::args().skip(1);
    let addr = args.next().unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let cert_path = args.next();
    let key_path = args.next();

    let acceptor = match (cert_path, key_path) {
        (Some(cert), Some(key)) => {
            let acceptor = load_tls_acceptor(&cert, &key)?;
            info!("TLS enabled with certificate {}", cert);
            Some(acceptor)
        }
        _ => {
            info!("no certificate/key given, serving plain TCP");
            None
        }
    };

    let listener = TcpListener::bind(&addr).await?;
    info!("chat server listening on {}", addr);

    let server = ChatServer::new();
    server.serve(listener, acceptor).await?;

    Ok(())
}

/// Build a TLS acceptor from PEM-encoded certificate chain and private key
fn load_tls_acceptor(
    cert_path: &str,
    key_path: &str,
) -> Result<TlsAcceptor, Box<dyn std::error::Error>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
        .ok_or("no private key found in key file")?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
