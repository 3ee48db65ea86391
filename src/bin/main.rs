#![no_std]
#![no_main]

use core::fmt::Write;
use core::time::Duration as CoreDuration;

use defmt::{error, info, warn};
use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, Runner, Stack, StackResources};
use embassy_time::Duration;
use esp_hal::analog::adc::{Adc, AdcConfig, Attenuation};
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::rtc_cntl::{Rtc, sleep::TimerWakeupSource};
use esp_hal::timer::timg::TimerGroup;
use heapless::String;
use panic_rtt_target as _;
use static_cell::StaticCell;

use tempmon::cycle::{CadenceConfig, WakeReports, run_wake};
use tempmon::link::LinkState;
use tempmon::mqtt::{MqttSession, MqttSessionConfig};
use tempmon::publish::PublishBudget;
use tempmon::record::{CycleRecord, RecordSlot};
use tempmon::report;
use tempmon::sensor;

esp_bootloader_esp_idf::esp_app_desc!();

const SENSOR_ID: &str = "temp-1";

// Cadence: a primary report every wake, a status report once per day.
const PRIMARY_INTERVAL_MINS: u32 = 2;
const SECONDARY_PERIOD_MINS: u32 = 24 * 60;

// Retry budgets. These bound the whole wake episode:
// 20 * 500 ms link polling + 2 * 200 ms session retries + 100 ms flush.
const PUBLISH_BUDGET: PublishBudget = PublishBudget {
    link_attempts: 20,
    link_retry_delay: Duration::from_millis(500),
    session_attempts: 2,
    session_retry_delay: Duration::from_millis(200),
};
const FLUSH_WINDOW: Duration = Duration::from_millis(100);

const MQTT_KEEP_ALIVE_SECS: u16 = 60;

static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

/// The persistent cycle record lives in RTC fast memory: it survives deep
/// sleep but not a cold power cycle, which the sentinel byte detects.
#[esp_hal::ram(unstable(rtc_fast))]
static mut CYCLE_RECORD: CycleRecord = CycleRecord::empty();

/// Durable slot over the RTC fast memory static. Whole-record, aligned
/// access only; the single-threaded wake episode is the only accessor.
struct RtcSlot;

impl RecordSlot for RtcSlot {
    fn read(&mut self) -> CycleRecord {
        unsafe { *(&raw const CYCLE_RECORD) }
    }

    fn write(&mut self, record: CycleRecord) {
        unsafe { *(&raw mut CYCLE_RECORD) = record }
    }
}

/// Connectivity gate view of the network stack: "usable" means DHCP has
/// configured the interface.
struct NetLink {
    stack: Stack<'static>,
}

impl LinkState for NetLink {
    fn is_up(&mut self) -> bool {
        self.stack.is_config_up()
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, esp_radio::wifi::WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_defmt!();

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_interrupt =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_interrupt.software_interrupt0);

    // Reset-reason check: anything but a deep-sleep wake (cold boot, manual
    // reset, fresh flash) rewrites the record so a status report goes out on
    // the first cycle.
    let wake_cause = esp_hal::rtc_cntl::wakeup_cause();
    let mut slot = RtcSlot;
    if matches!(wake_cause, esp_hal::system::SleepSource::Timer) {
        info!("boot: woke from deep sleep");
    } else {
        info!(
            "boot: cold or manual boot ({:?}), resetting cycle record",
            defmt::Debug2Format(&wake_cause)
        );
        slot.write(CycleRecord::reset());
    }

    // --- Sensor sampling ----------------------------------------------------
    let mut adc1_cfg = AdcConfig::new();
    let mut temp_pin = adc1_cfg.enable_pin(peripherals.GPIO0, Attenuation::_11dB);
    let mut batt_pin = adc1_cfg.enable_pin(peripherals.GPIO1, Attenuation::_11dB);
    let mut adc1 = Adc::new(peripherals.ADC1, adc1_cfg);

    let temperature = match adc1.read_oneshot(&mut temp_pin) {
        Ok(raw) => sensor::raw_to_celsius(raw),
        Err(_) => {
            error!("sensor: temperature ADC read failed");
            0.0
        }
    };
    let battery_mv = match adc1.read_oneshot(&mut batt_pin) {
        Ok(raw) => sensor::raw_to_battery_millivolts(raw),
        Err(_) => {
            error!("sensor: battery ADC read failed");
            0
        }
    };
    info!(
        "sensor: temperature={} °C, battery={} mV",
        temperature, battery_mv
    );

    // Stable device identity from the efuse MAC tail; doubles as the MQTT
    // client id so the broker recognizes reconnects from the same device.
    let mac = esp_hal::efuse::Efuse::mac_address();
    let mut device_id: String<24> = String::new();
    write!(
        device_id,
        "tempmon-{:02x}{:02x}{:02x}",
        mac[3], mac[4], mac[5]
    )
    .ok();
    info!("boot: device id '{}'", device_id.as_str());

    // --- Wi-Fi bring-up (STA) ------------------------------------------------
    // Credentials and broker endpoint come from compile-time env vars.
    let ssid = option_env!("WIFI_SSID").unwrap_or("");
    let pass = option_env!("WIFI_PASS").unwrap_or("");
    let broker_host = option_env!("MQTT_BROKER_HOST").unwrap_or("192.168.0.245");
    let broker_port: u16 = 1883;

    if ssid.is_empty() {
        warn!("wifi: set WIFI_SSID/WIFI_PASS at build time to enable publishing");
    }

    let radio = RADIO.init(esp_radio::init().expect("radio init failed"));
    let (mut wifi, ifaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, esp_radio::wifi::Config::default())
            .expect("wifi init failed");

    let client_config = esp_radio::wifi::ClientConfig::default()
        .with_ssid(ssid.into())
        .with_password(pass.into());
    if let Err(e) = wifi.set_config(&esp_radio::wifi::ModeConfig::Client(client_config)) {
        error!("wifi: set_config failed: {:?}", e);
    }
    if let Err(e) = wifi.start() {
        error!("wifi: start failed: {:?}", e);
    }
    if let Err(e) = wifi.connect() {
        error!("wifi: connect failed: {:?}", e);
    }

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;
    let (stack, runner) = embassy_net::new(
        ifaces.sta,
        NetConfig::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::new()),
        seed,
    );
    spawner.spawn(net_task(runner)).ok();

    // Link quality goes into the status payload only; it never feeds
    // scheduling decisions.
    let rssi_dbm: i8 = wifi.rssi().map(|v| v as i8).unwrap_or(0);

    // --- One wake episode ----------------------------------------------------
    let content_topic = report::build_content_topic(device_id.as_str(), SENSOR_ID);
    let status_topic = report::build_status_topic(device_id.as_str());
    let content_payload = report::build_content_payload(device_id.as_str(), temperature);
    let status_payload = report::build_status_payload(
        device_id.as_str(),
        content_topic.as_str(),
        battery_mv,
        rssi_dbm,
    );

    let cadence = CadenceConfig {
        primary_interval_mins: PRIMARY_INTERVAL_MINS,
        secondary_period_mins: SECONDARY_PERIOD_MINS,
    };
    let reports = WakeReports {
        primary_topic: content_topic.as_str(),
        primary_payload: content_payload.as_bytes(),
        secondary_topic: status_topic.as_str(),
        secondary_payload: status_payload.as_bytes(),
    };

    let mut link = NetLink { stack };
    let mut broker = MqttSession::new(
        stack,
        MqttSessionConfig {
            broker_host,
            broker_port,
            keep_alive_secs: MQTT_KEEP_ALIVE_SECS,
            flush_window: FLUSH_WINDOW,
        },
    );

    let outcome = run_wake(
        &mut slot,
        &mut link,
        &mut broker,
        device_id.as_str(),
        &cadence,
        &PUBLISH_BUDGET,
        &reports,
    )
    .await;
    info!("cycle: {}", outcome);

    // --- Back to deep sleep ----------------------------------------------------
    if let Err(e) = wifi.disconnect() {
        warn!("wifi: disconnect failed (may already be down): {:?}", e);
    }
    if let Err(e) = wifi.stop() {
        warn!("wifi: stop failed: {:?}", e);
    }

    let mut rtc = Rtc::new(peripherals.LPWR);
    let timer = TimerWakeupSource::new(CoreDuration::from_secs(
        u64::from(PRIMARY_INTERVAL_MINS) * 60,
    ));
    info!(
        "boot: deep sleeping for {} minutes",
        PRIMARY_INTERVAL_MINS
    );
    rtc.sleep_deep(&[&timer])
}
