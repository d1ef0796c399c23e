#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp32_energy_bridge::config::INBOX_CAPACITY;
    use esp32_energy_bridge::platform::{
        BootClock, EspMqttTransport, FreeRtosDelay, UartPort, WifiLink,
    };
    use esp32_energy_bridge::{inbox, BridgeConfig, Pzem004t, Runner};
    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::sys;

    // Initialize ESP-IDF system services
    sys::link_patches();

    // Initialize logging
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("ESP32 PZEM-004T Energy Bridge");
    log::info!("Initializing...");

    let config = BridgeConfig::from_build_env()?;
    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let wifi = WifiLink::new(peripherals.modem, sysloop, nvs, &config.wifi)?;
    log::info!("✅ WiFi configured for '{}'", config.wifi.ssid);

    // PZEM on UART1: GPIO17 TX -> meter RX, GPIO16 RX <- meter TX
    let uart_config = UartConfig::new().baudrate(config.pzem.baud_rate.into());
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio16,
        Option::<esp_idf_hal::gpio::Gpio0>::None,
        Option::<esp_idf_hal::gpio::Gpio0>::None,
        &uart_config,
    )?;
    let pzem = Pzem004t::new(UartPort::new(uart), config.pzem.address);
    log::info!(
        "✅ PZEM-004T on UART1 ({} baud, address 0x{:02X})",
        config.pzem.baud_rate,
        config.pzem.address
    );

    let (inbox_tx, inbox_rx) = inbox(INBOX_CAPACITY);
    let transport = EspMqttTransport::new(&config.mqtt.broker_url, inbox_tx);

    let mut runner = Runner::new(
        &config,
        wifi,
        transport,
        pzem,
        inbox_rx,
        FreeRtosDelay,
        BootClock::new(),
    );
    runner.run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("energy_bridge is ESP32 firmware; build it for an espidf target");
    std::process::exit(1);
}
