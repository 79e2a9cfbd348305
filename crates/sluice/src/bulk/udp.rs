//! 📮 The UDP side door — throw the batch over the fence and walk away.
//!
//! One datagram, no answer, no outcomes, no failover, no idea whether anything
//! landed. At-most-once delivery with the emotional support of a paper airplane.
//! Errors here are plain `std::io::Error`: the only things that can fail are
//! resolving the address and handing bytes to the kernel.

use std::io;

use tokio::net::{UdpSocket, lookup_host};
use tracing::debug;

use super::BulkBatch;

/// 📏 Largest UDP payload over IPv4: 65,535 minus the 8-byte UDP and 20-byte IP headers.
pub const MAX_DATAGRAM_BYTES: usize = 65_507;

impl BulkBatch {
    /// 📮 Send the wire format as one datagram to the client's UDP endpoint.
    /// Returns the number of bytes handed to the socket.
    pub async fn send_udp(&self) -> io::Result<usize> {
        let body = self
            .to_wire_format()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if body.len() > MAX_DATAGRAM_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "bulk body is {} bytes, a single UDP datagram holds at most {MAX_DATAGRAM_BYTES}; split the batch",
                    body.len()
                ),
            ));
        }
        let udp = &self.client.config().udp;

        let target = lookup_host((udp.host.as_str(), udp.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{}:{} resolved to nothing", udp.host, udp.port),
                )
            })?;
        let local = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await?;

        let sent = socket.send_to(body.as_bytes(), target).await?;
        debug!(
            "📮 Fired {} bulk action(s) ({} bytes) at udp://{} and did not look back",
            self.len(),
            sent,
            target
        );
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::app_config::ClientConfig;
    use super::MAX_DATAGRAM_BYTES;
    use crate::bulk::{Action, BulkBatch};
    use crate::client::Client;
    use crate::transports::InMemoryTransport;

    #[tokio::test]
    async fn the_one_where_the_paper_airplane_lands() -> anyhow::Result<()> {
        let catcher = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
        let mut config = ClientConfig::default();
        config.udp.host = "127.0.0.1".to_string();
        config.udp.port = catcher.local_addr()?.port();

        let transport = InMemoryTransport::new();
        let client = Client::with_transport(config, Arc::new(transport.clone()))?;
        let mut batch = BulkBatch::new(client).with_index("idx");
        batch
            .add_action(Action::index(json!({"a": 1})).with_id("1"))
            .add_action(Action::delete().with_id("2"));

        let sent = batch.send_udp().await?;

        let mut buf = vec![0u8; 4096];
        let (received, _) = catcher.recv_from(&mut buf).await?;
        assert_eq!(sent, received);
        assert_eq!(
            std::str::from_utf8(&buf[..received])?,
            "{\"index\":{\"_index\":\"idx\",\"_id\":\"1\"}}\n{\"a\":1}\n{\"delete\":{\"_index\":\"idx\",\"_id\":\"2\"}}\n"
        );
        // 🕳️ nothing went through the correlated path
        assert_eq!(transport.call_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_airplane_is_too_heavy_to_fly() -> anyhow::Result<()> {
        let catcher = tokio::net::UdpSocket::bind("127.0.0.1:0").await?;
        let mut config = ClientConfig::default();
        config.udp.host = "127.0.0.1".to_string();
        config.udp.port = catcher.local_addr()?.port();
        let client = Client::with_transport(config, Arc::new(InMemoryTransport::new()))?;

        let mut batch = BulkBatch::new(client).with_index("idx");
        let filler = "x".repeat(1_024);
        for i in 0..70 {
            batch.add_action(Action::index(json!({"filler": filler})).with_id(i.to_string()));
        }
        assert!(batch.to_wire_format()?.len() > MAX_DATAGRAM_BYTES);

        let err = batch.send_udp().await.expect_err("70 KiB does not fit in one datagram");
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("65507"), "got {err}");
        Ok(())
    }
}
