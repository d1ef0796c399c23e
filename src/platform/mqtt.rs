use crate::inbox::InboxSender;
use crate::session::{BrokerTransport, ConnectionLatch};
use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration, QoS};
use log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long one connect attempt waits for CONNACK
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_POLL_MS: u32 = 100;

#[derive(Clone, Default)]
struct ConnectionFlags {
    latch: ConnectionLatch,
    shutdown: Arc<AtomicBool>, // Signal to stop connection handler thread
}

/// ESP-IDF MQTT client. The event thread only drives the connection latch and
/// forwards received messages into the inbox; it never touches session state.
///
/// The ESP client reconnects on its own after a drop, without our
/// subscription. That reconnect is never reported as connected: the session
/// sees the drop, and `connect` builds a new client that subscribes again.
pub struct EspMqttTransport {
    broker_url: String,
    inbox: InboxSender,
    client: Option<EspMqttClient<'static>>,
    flags: ConnectionFlags,
}

impl EspMqttTransport {
    pub fn new(broker_url: &str, inbox: InboxSender) -> Self {
        info!("MQTT transport for broker {}", broker_url);
        Self {
            broker_url: broker_url.to_string(),
            inbox,
            client: None,
            flags: ConnectionFlags::default(),
        }
    }

    fn teardown(&mut self) {
        if let Some(client) = self.client.take() {
            info!("🔌 MQTT: Signaling connection handler to shutdown...");
            self.flags.shutdown.store(true, Ordering::Relaxed);
            self.flags.latch.on_disconnected();
            drop(client);
        }
    }

    fn spawn_connection_handler(
        &self,
        mut connection: esp_idf_svc::mqtt::client::EspMqttConnection,
        flags: ConnectionFlags,
    ) -> Result<()> {
        let inbox = self.inbox.clone();

        std::thread::Builder::new()
            .stack_size(8192)
            .name("mqtt_conn".to_string())
            .spawn(move || {
                info!("MQTT connection handler started");
                loop {
                    if flags.shutdown.load(Ordering::Relaxed) {
                        break;
                    }

                    match connection.next() {
                        Ok(event) => match event.payload() {
                            EventPayload::Connected(session_present) => {
                                info!(
                                    "✅ MQTT connected to broker (session_present: {})",
                                    session_present
                                );
                                flags.latch.on_connected();
                            }
                            EventPayload::Disconnected => {
                                info!("🔌 MQTT disconnected from broker");
                                flags.latch.on_disconnected();
                            }
                            EventPayload::Received {
                                topic: Some(topic),
                                data,
                                ..
                            } => {
                                info!("📩 MQTT received {} bytes on '{}'", data.len(), topic);
                                inbox.deliver(topic, data);
                            }
                            EventPayload::Error(e) => {
                                warn!("❌ MQTT error: {:?}", e);
                            }
                            _ => {}
                        },
                        Err(e) => {
                            flags.latch.on_disconnected();
                            if flags.shutdown.load(Ordering::Relaxed) {
                                break;
                            }
                            warn!("❌ MQTT connection error: {:?}", e);
                            std::thread::sleep(Duration::from_secs(1));
                        }
                    }
                }
                info!("🔌 MQTT connection handler exiting");
            })?;
        Ok(())
    }
}

impl BrokerTransport for EspMqttTransport {
    fn connect(&mut self, client_id: &str) -> Result<()> {
        self.teardown();

        let mqtt_config = MqttClientConfiguration {
            client_id: Some(client_id),
            keep_alive_interval: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let (client, connection) = EspMqttClient::new(&self.broker_url, &mqtt_config)?;
        // SAFETY: the configuration is copied by ESP-IDF; the client does not borrow it
        let client: EspMqttClient<'static> = unsafe { std::mem::transmute(client) };

        // fresh flags so a lingering handler from the previous client cannot flip them
        let flags = ConnectionFlags::default();
        self.spawn_connection_handler(connection, flags.clone())?;
        self.flags = flags;
        self.client = Some(client);

        let start = Instant::now();
        while start.elapsed() < CONNECT_TIMEOUT {
            if self.flags.latch.is_connected() {
                return Ok(());
            }
            FreeRtos::delay_ms(CONNECT_POLL_MS);
        }

        self.teardown();
        anyhow::bail!(
            "no CONNACK from {} within {}s",
            self.broker_url,
            CONNECT_TIMEOUT.as_secs()
        )
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("MQTT client not created"))?;
        client.subscribe(topic, QoS::AtMostOnce)?;
        info!("📥 MQTT subscribe requested for topic: '{}'", topic);
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("MQTT client not created"))?;
        client.enqueue(topic, QoS::AtMostOnce, false, payload)?;
        info!("📤 MQTT enqueued publish to '{}': {} bytes", topic, payload.len());
        Ok(())
    }

    fn disconnect(&mut self) {
        self.teardown();
    }

    fn is_connected(&self) -> bool {
        self.client.is_some() && self.flags.latch.is_connected()
    }
}

impl Drop for EspMqttTransport {
    fn drop(&mut self) {
        self.teardown();
    }
}
