//! Bridge firmware with a simulated meter in place of the PZEM-004T, for
//! exercising the broker side on a bare dev board.

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp32_energy_bridge::config::INBOX_CAPACITY;
    use esp32_energy_bridge::platform::{BootClock, EspMqttTransport, FreeRtosDelay, WifiLink};
    use esp32_energy_bridge::{inbox, BridgeConfig, MeterProfile, Runner, SimulatedMeter};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys;
    use rand::SeedableRng;

    // Initialize ESP-IDF system services
    sys::link_patches();

    // Initialize logging
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("ESP32 Energy Bridge Simulator");
    log::info!("Initializing...");

    let config = BridgeConfig::from_build_env()?;
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = WifiLink::new(peripherals.modem, sysloop, nvs, &config.wifi)?;
    log::info!("✅ WiFi configured for '{}'", config.wifi.ssid);

    let meter = SimulatedMeter::new(
        MeterProfile::default(),
        BootClock::new(),
        rand::rngs::StdRng::from_entropy(),
    )?;
    log::info!("✅ Simulated meter ready (no PZEM attached)");

    let (inbox_tx, inbox_rx) = inbox(INBOX_CAPACITY);
    let transport = EspMqttTransport::new(&config.mqtt.broker_url, inbox_tx);

    let mut runner = Runner::new(
        &config,
        wifi,
        transport,
        meter,
        inbox_rx,
        FreeRtosDelay,
        BootClock::new(),
    );
    runner.run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("sim_app is ESP32 firmware; build it for an espidf target");
    std::process::exit(1);
}
