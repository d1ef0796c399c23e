use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Period between telemetry publishes, measured from the end of the previous one
pub const TELEMETRY_CADENCE: Duration = Duration::from_secs(5);

/// Delay after a failed broker connect attempt
pub const SESSION_BACKOFF: Duration = Duration::from_secs(5);

/// Delay between WiFi association attempts while the link is down
pub const LINK_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Sleep between runner ticks so the main task yields to the MQTT thread
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Period of the bridge status line in the log
pub const STATUS_INTERVAL: Duration = Duration::from_secs(300);

/// Encoded telemetry payload must fit in this many bytes
pub const PAYLOAD_CAPACITY: usize = 192;

/// Inbound MQTT messages buffered between two runner ticks
pub const INBOX_CAPACITY: usize = 8;

/// PZEM-004T general (broadcast) slave address
pub const PZEM_DEFAULT_ADDRESS: u8 = 0xF8;

pub const PZEM_BAUD_RATE: u32 = 9600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WifiConfig {
    pub ssid: heapless::String<32>,
    pub password: heapless::String<64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_url: heapless::String<128>,
    pub client_id: heapless::String<32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Readings and reset acknowledgments are both published here
    pub telemetry: heapless::String<64>,
    pub command: heapless::String<64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PzemConfig {
    pub address: u8,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub topics: TopicConfig,
    pub pzem: PzemConfig,
}

fn bounded<const N: usize>(value: &str, field: &'static str) -> BridgeResult<heapless::String<N>> {
    let mut s = heapless::String::<N>::new();
    s.push_str(value).map_err(|_| BridgeError::Config {
        field,
        max_len: N,
    })?;
    Ok(s)
}

impl WifiConfig {
    pub fn new(ssid: &str, password: &str) -> BridgeResult<Self> {
        Ok(Self {
            ssid: bounded(ssid, "wifi.ssid")?,
            password: bounded(password, "wifi.password")?,
        })
    }
}

impl MqttConfig {
    pub fn new(broker_url: &str, client_id: &str) -> BridgeResult<Self> {
        Ok(Self {
            broker_url: bounded(broker_url, "mqtt.broker_url")?,
            client_id: bounded(client_id, "mqtt.client_id")?,
        })
    }
}

impl TopicConfig {
    pub fn new(telemetry: &str, command: &str) -> BridgeResult<Self> {
        Ok(Self {
            telemetry: bounded(telemetry, "topics.telemetry")?,
            command: bounded(command, "topics.command")?,
        })
    }
}

impl Default for WifiConfig {
    fn default() -> Self {
        let mut ssid = heapless::String::new();
        let mut password = heapless::String::new();
        let _ = ssid.push_str("YOUR_WIFI_SSID");
        let _ = password.push_str("YOUR_WIFI_PASSWORD");

        Self { ssid, password }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        let mut broker_url = heapless::String::new();
        let mut client_id = heapless::String::new();
        let _ = broker_url.push_str("mqtt://192.168.100.51:1883");
        let _ = client_id.push_str("ESP8266_PZEM");

        Self {
            broker_url,
            client_id,
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        let mut telemetry = heapless::String::new();
        let mut command = heapless::String::new();
        let _ = telemetry.push_str("testtopic/pzem004t");
        let _ = command.push_str("testtopic/pzem004t/cmd");

        Self { telemetry, command }
    }
}

impl Default for PzemConfig {
    fn default() -> Self {
        Self {
            address: PZEM_DEFAULT_ADDRESS,
            baud_rate: PZEM_BAUD_RATE,
        }
    }
}

impl BridgeConfig {
    /// Defaults overridden by `BRIDGE_*` variables present when the firmware was compiled
    pub fn from_build_env() -> BridgeResult<Self> {
        let defaults = MqttConfig::default();
        let wifi_defaults = WifiConfig::default();

        let wifi = WifiConfig::new(
            option_env!("BRIDGE_WIFI_SSID").unwrap_or(wifi_defaults.ssid.as_str()),
            option_env!("BRIDGE_WIFI_PASSWORD").unwrap_or(wifi_defaults.password.as_str()),
        )?;
        let mqtt = MqttConfig::new(
            option_env!("BRIDGE_MQTT_URL").unwrap_or(defaults.broker_url.as_str()),
            option_env!("BRIDGE_MQTT_CLIENT_ID").unwrap_or(defaults.client_id.as_str()),
        )?;

        Ok(Self {
            wifi,
            mqtt,
            topics: TopicConfig::default(),
            pzem: PzemConfig::default(),
        })
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wifi: WifiConfig::default(),
            mqtt: MqttConfig::default(),
            topics: TopicConfig::default(),
            pzem: PzemConfig::default(),
        }
    }
}
