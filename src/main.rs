//! LoRa P2P node firmware for ESP32.

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    log::info!("=== LoRa P2P node starting ===");

    if let Err(e) = firmware::run() {
        log::error!("Fatal: {}", e);
    }

    // Nothing left to do; keep the task alive so the log stays readable
    loop {
        esp_idf_hal::delay::FreeRtos::delay_ms(1000);
    }
}

#[cfg(feature = "esp32")]
mod firmware {
    use std::time::Instant;

    use esp_idf_hal::delay::FreeRtos;
    use esp_idf_hal::peripherals::Peripherals;
    use log::{info, warn};
    use lora_p2p_node::lora::{LedIndicator, Signals, Sx1262Radio};
    use lora_p2p_node::settings::{NvsFlash, UniqueId};
    use lora_p2p_node::Node;

    /// Hardware unique ID: the eFuse MAC expanded to EUI-64.
    fn unique_id() -> UniqueId {
        let mut mac = [0u8; 6];
        // SAFETY: `mac` is a valid 6-byte buffer as required by the API.
        unsafe {
            esp_idf_sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
        }
        [mac[0], mac[1], mac[2], 0xFF, 0xFE, mac[3], mac[4], mac[5]]
    }

    pub fn run() -> Result<(), Box<dyn std::error::Error>> {
        let peripherals = Peripherals::take()?;
        let pins = peripherals.pins;

        let radio = Sx1262Radio::new(
            peripherals.spi2,
            pins.gpio12,
            pins.gpio11,
            pins.gpio13,
            pins.gpio10,
            pins.gpio5,
            pins.gpio4,
            pins.gpio1,
        )?;
        let led = LedIndicator::new(pins.gpio37)?;
        let flash = NvsFlash::take()?;

        let mut node = Node::start(radio, led, flash, unique_id())?;
        let signals = node.signals();
        let period = node.periodic_interval();
        let mut last_periodic = Instant::now();
        let mut counter: u32 = 0;

        info!("Entering radio loop...");
        loop {
            match node.session_mut().radio_mut().poll() {
                Ok(Some(event)) => {
                    if let Err(e) = node.dispatch(event) {
                        warn!("Event dispatch failed: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Radio poll failed: {}", e),
            }

            if let Some(period) = period {
                if last_periodic.elapsed() >= period {
                    last_periodic = Instant::now();
                    signals.raise(Signals::PERIODIC_SEND);
                }
            }

            let pending = signals.take();
            if pending.contains(Signals::PERIODIC_SEND) {
                counter = counter.wrapping_add(1);
                if let Err(e) = node.send(&counter.to_le_bytes()) {
                    warn!("Periodic send skipped: {}", e);
                }
            }
            if pending.contains(Signals::PACKET_RECEIVED) {
                let session = node.session();
                info!(
                    "Received {} bytes, RSSI {} dBm, SNR {} dB",
                    session.rx_data().len(),
                    session.last_rssi(),
                    session.last_snr()
                );
            }

            FreeRtos::delay_ms(1);
        }
    }
}

#[cfg(not(feature = "esp32"))]
fn main() {
    println!("This binary requires the 'esp32' feature.");
    println!("Use 'cargo run --bin host-node' to run the node on the host.");
}
