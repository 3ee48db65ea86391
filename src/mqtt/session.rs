//! Broker session adapters.
//!
//! [`LoggerBroker`] exercises the wake cycle without a broker. [`MqttSession`]
//! (feature `mqtt`) runs one fresh MQTT v5 session per deliver call over an
//! embassy-net TCP socket, matching the engine's clean-slate retry contract:
//! session state never outlives an attempt, let alone a wake episode.

use defmt::info;

use crate::publish::{BrokerLink, DeliverError};

/// Log-only broker. Every deliver call "succeeds" after logging, which lets
/// the full scheduler path run on hardware without network credentials.
pub struct LoggerBroker;

impl BrokerLink for LoggerBroker {
    async fn deliver(
        &mut self,
        client_id: &str,
        topic: &str,
        payload: &[u8],
    ) -> Result<(), DeliverError> {
        info!(
            "mqtt(LOG): '{}' -> channel='{}' len={}",
            client_id,
            topic,
            payload.len()
        );
        Ok(())
    }
}

#[cfg(feature = "mqtt")]
mod net {
    use defmt::{error, info, warn};
    use embassy_futures::select::{Either, select};
    use embassy_net::Stack;
    use embassy_net::tcp::TcpSocket;
    use embassy_time::{Duration, Timer};
    use embedded_io_async::{ErrorType, Read, Write as IoWrite};
    use rust_mqtt::client::client::MqttClient;
    use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
    use rust_mqtt::packet::v5::publish_packet::QualityOfService;
    use rust_mqtt::packet::v5::reason_codes::ReasonCode;
    use rust_mqtt::utils::rng_generator::CountingRng;

    use crate::publish::{BrokerLink, DeliverError};

    /// TCP and MQTT packet buffers, sized for the small telemetry payloads
    /// this device sends. Stack-allocated per session attempt.
    const BUF_SIZE: usize = 1024;

    /// TCP connect timeout. Session-level retries are counted by the publish
    /// engine; this only stops a single connect from hanging.
    const TCP_TIMEOUT: Duration = Duration::from_secs(10);

    /// Transport adapter wrapping an embassy-net TCP socket for rust-mqtt.
    pub struct EmbassyNetTransport<'a> {
        socket: TcpSocket<'a>,
    }

    impl<'a> EmbassyNetTransport<'a> {
        pub fn new(socket: TcpSocket<'a>) -> Self {
            Self { socket }
        }
    }

    impl ErrorType for EmbassyNetTransport<'_> {
        type Error = embassy_net::tcp::Error;
    }

    impl Read for EmbassyNetTransport<'_> {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            self.socket.read(buf).await
        }
    }

    impl IoWrite for EmbassyNetTransport<'_> {
        async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.socket.write(buf).await
        }

        async fn flush(&mut self) -> Result<(), Self::Error> {
            self.socket.flush().await
        }
    }

    /// Broker endpoint and session parameters. Configuration only; the
    /// session itself is rebuilt from scratch on every deliver call.
    pub struct MqttSessionConfig<'a> {
        pub broker_host: &'a str,
        pub broker_port: u16,
        pub keep_alive_secs: u16,
        /// Post-publish window during which the session event loop keeps
        /// being serviced so the transport drains before power drops.
        pub flush_window: Duration,
    }

    /// One-session-per-deliver MQTT broker link.
    pub struct MqttSession<'a> {
        stack: Stack<'static>,
        config: MqttSessionConfig<'a>,
    }

    impl<'a> MqttSession<'a> {
        pub fn new(stack: Stack<'static>, config: MqttSessionConfig<'a>) -> Self {
            Self { stack, config }
        }

        async fn resolve(&self) -> Result<smoltcp::wire::Ipv4Address, DeliverError> {
            // A configured IP address skips DNS entirely.
            if let Ok(ip) = self.config.broker_host.parse::<smoltcp::wire::Ipv4Address>() {
                return Ok(ip);
            }

            match self
                .stack
                .dns_query(self.config.broker_host, embassy_net::dns::DnsQueryType::A)
                .await
            {
                Ok(addrs) => match addrs.first() {
                    Some(addr) => {
                        let smoltcp::wire::IpAddress::Ipv4(ipv4) = *addr;
                        info!("mqtt: resolved '{}' to {}", self.config.broker_host, ipv4);
                        Ok(ipv4)
                    }
                    None => {
                        error!("mqtt: DNS returned no addresses");
                        Err(DeliverError::Dns)
                    }
                },
                Err(e) => {
                    error!("mqtt: DNS resolution failed: {:?}", defmt::Debug2Format(&e));
                    Err(DeliverError::Dns)
                }
            }
        }
    }

    impl BrokerLink for MqttSession<'_> {
        async fn deliver(
            &mut self,
            client_id: &str,
            topic: &str,
            payload: &[u8],
        ) -> Result<(), DeliverError> {
            let broker_addr = self.resolve().await?;

            let mut tcp_rx_buffer = [0u8; BUF_SIZE];
            let mut tcp_tx_buffer = [0u8; BUF_SIZE];
            let mut socket = TcpSocket::new(self.stack, &mut tcp_rx_buffer, &mut tcp_tx_buffer);
            socket.set_timeout(Some(TCP_TIMEOUT));

            if let Err(e) = socket.connect((broker_addr, self.config.broker_port)).await {
                error!("mqtt: TCP connect failed: {:?}", defmt::Debug2Format(&e));
                return Err(DeliverError::Tcp);
            }

            let mut recv_buffer = [0u8; BUF_SIZE];
            let mut write_buffer = [0u8; BUF_SIZE];

            let mut client_config =
                ClientConfig::new(MqttVersion::MQTTv5, CountingRng(0));
            // Stable device-derived client id so the broker recognizes
            // reconnects from the same device.
            client_config.add_client_id(client_id);
            client_config.keep_alive = self.config.keep_alive_secs;

            let mut client = MqttClient::<_, 5, _>::new(
                EmbassyNetTransport::new(socket),
                &mut write_buffer,
                BUF_SIZE,
                &mut recv_buffer,
                BUF_SIZE,
                client_config,
            );

            if let Err(e) = client.connect_to_broker().await {
                error!(
                    "mqtt: CONNECT rejected: {:?}",
                    defmt::Debug2Format(&e)
                );
                return Err(DeliverError::Connect);
            }

            match client
                .send_message(topic, payload, QualityOfService::QoS0, false)
                .await
            {
                Ok(()) | Err(ReasonCode::NoMatchingSubscribers) => {}
                Err(ReasonCode::PacketTooLarge) | Err(ReasonCode::BuffError) => {
                    warn!(
                        "mqtt: payload of {} bytes exceeds the frame limit",
                        payload.len()
                    );
                    return Err(DeliverError::Oversized);
                }
                Err(e) => {
                    error!("mqtt: send failed: {:?}", defmt::Debug2Format(&e));
                    return Err(DeliverError::Send);
                }
            }

            // Flush wait: keep pumping the session until the window closes.
            match select(
                client.receive_message(),
                Timer::after(self.config.flush_window),
            )
            .await
            {
                Either::First(_) => {
                    // Unexpected inbound traffic on a publish-only session;
                    // nothing to do with it.
                }
                Either::Second(()) => {}
            }

            Ok(())
        }
    }
}

#[cfg(feature = "mqtt")]
pub use net::{EmbassyNetTransport, MqttSession, MqttSessionConfig};
