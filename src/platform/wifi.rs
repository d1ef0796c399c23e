use crate::config::WifiConfig;
use crate::link::NetworkLink;
use anyhow::Result;
use esp_idf_hal::modem::Modem;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};
use log::info;

/// WiFi station. Association itself is driven by `LinkManager`.
pub struct WifiLink {
    wifi: Box<BlockingWifi<EspWifi<'static>>>,
    ssid: heapless::String<32>,
}

impl WifiLink {
    pub fn new(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: &WifiConfig,
    ) -> Result<Self> {
        info!("🌐 WiFi: Creating EspWifi instance...");
        let mut esp_wifi = EspWifi::new(modem, sysloop.clone(), Some(nvs))?;

        info!("🌐 WiFi: Configuring for SSID '{}'...", config.ssid);
        let wifi_configuration = Configuration::Client(ClientConfiguration {
            ssid: config.ssid.clone(),
            auth_method: AuthMethod::WPA2Personal,
            password: config.password.clone(),
            ..Default::default()
        });
        esp_wifi.set_configuration(&wifi_configuration)?;

        let mut wifi = BlockingWifi::wrap(esp_wifi, sysloop)?;
        wifi.start()?;
        info!("✅ WiFi: Started");

        Ok(Self {
            wifi: Box::new(wifi),
            ssid: config.ssid.clone(),
        })
    }
}

impl NetworkLink for WifiLink {
    fn is_up(&self) -> bool {
        self.wifi.is_up().unwrap_or(false)
    }

    fn establish(&mut self) -> Result<()> {
        if self.wifi.is_connected().unwrap_or(false) {
            info!("🌐 WiFi: Associated but no IP, reconnecting...");
            let _ = self.wifi.disconnect();
        }

        info!("🌐 WiFi: Connecting to '{}'...", self.ssid);
        if let Err(e) = self.wifi.connect() {
            let _ = self.wifi.disconnect();
            return Err(e.into());
        }

        info!("🌐 WiFi: Waiting for network interface...");
        self.wifi.wait_netif_up()?;

        let ip_info = self.wifi.wifi().sta_netif().get_ip_info()?;
        info!("📡 WiFi: DHCP info: {:?}", ip_info);
        info!("🌐 WiFi: IP address: {}", ip_info.ip);
        Ok(())
    }
}
