//! Smoke test: a bare server can bind and pump a few ticks with no
//! connected clients without erroring.

use std::sync::Arc;

use engine_server::hybrid::HybridServer;
use engine_shared::net::default_registry;

#[tokio::test]
async fn server_pumps_with_no_clients() -> anyhow::Result<()> {
    let codec = Arc::new(default_registry());
    let mut server = HybridServer::new(
        "127.0.0.1:0".parse()?,
        "127.0.0.1:0".parse()?,
        || (),
        codec,
    )?;

    for _ in 0..3 {
        let result = server.pump()?;
        assert!(result.new_clients.is_empty());
        assert!(result.disconnected_clients.is_empty());
    }
    Ok(())
}
