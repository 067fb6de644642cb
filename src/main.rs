pub mod config;
pub mod dispatch;
pub mod hardware;
pub mod mqtt;
pub mod streams;

use crate::config::AgentConfig;
use crate::hardware::{Joystick, LedMatrix, LedSettings, SensorArray, SensorSettings};
use crate::mqtt::{ClientIdentity, Inbox, MqttConnection, StreamKind, Subscriber, TopicFunction};
use crate::streams::{AppContext, StreamCoordinator};
use color_eyre::Result;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("agent.toml"));
    let config = AgentConfig::load(&config_path)?;

    let endpoint = config.endpoint()?;
    let credentials = config.credentials();
    let mqtt = &config.mqtt;

    // One connection per stream, all sharing the broker endpoint.
    let mut sensor_conn = MqttConnection::new(
        endpoint.clone(),
        ClientIdentity::new(&mqtt.zone, &mqtt.room, &mqtt.client_name, StreamKind::Sensor),
        credentials.clone(),
    );
    let mut joystick_conn = MqttConnection::new(
        endpoint.clone(),
        ClientIdentity::new(&mqtt.zone, &mqtt.room, &mqtt.client_name, StreamKind::Joystick),
        credentials.clone(),
    );
    let led_identity =
        ClientIdentity::new(&mqtt.zone, &mqtt.room, &mqtt.client_name, StreamKind::Led);
    let mut led_conn = MqttConnection::new(endpoint, led_identity.clone(), credentials);

    let inbox = Inbox::default();
    let command_topic = led_identity.topic().with_function(TopicFunction::Cmd);
    led_conn.set_inbox(inbox.clone(), command_topic);

    sensor_conn.connect()?;
    joystick_conn.connect()?;
    led_conn.connect()?;

    let mut led = LedMatrix::new(LedSettings {
        low_light: config.sensehat.low_light,
        rotation: config.sensehat.rotation,
    })?;
    if let Some(message) = &config.welcome_msg {
        led.show_message(message, 0.1, [255, 255, 255], [0, 0, 0]);
    }
    let sensors = SensorArray::new(SensorSettings {
        rounding: config.sensehat.rounding,
        acceleration_multiplier: config.sensehat.acceleration_multiplier,
        gyroscope_multiplier: config.sensehat.gyroscope_multiplier,
    });
    // The feed handle is where a physical stick backend would push
    // direction events; it has to outlive the loops.
    let (joystick, _joystick_feed) = Joystick::new();

    let shutdown = CancellationToken::new();
    let coordinator = StreamCoordinator::spawn(AppContext {
        resolution: Duration::from_secs(config.resolution),
        retain_status: mqtt.retain_status,
        sensors,
        led,
        joystick,
        sensor_conn,
        joystick_conn,
        led_conn,
        subscriber: Subscriber::new(inbox),
        shutdown: shutdown.clone(),
    })?;

    info!("agent running, waiting for termination signal");
    wait_for_shutdown().await;

    shutdown.cancel();
    coordinator.finish().await;
    info!("shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!("unable to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt");
    }
}
