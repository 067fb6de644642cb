//! Per-stream sampling and consuming loops, coordinated by one
//! cancellation token.
//!
//! Three independent tasks run for the lifetime of the agent: the
//! sensor loop (sample, publish, timed wait), the joystick loop (block
//! on the next direction event) and the command loop (poll the inbox,
//! dispatch batches). Every suspension point is a `select!` against the
//! shared shutdown token, so cancelling it ends all loops within one
//! poll interval. After the loops return, the coordinator disables each
//! connection and hardware wrapper exactly once.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch;
use crate::hardware::{Hardware, Joystick, JoystickReading, LedMatrix, SensorArray};
use crate::mqtt::{Inbound, MqttConnection, Publisher, StreamKind, Subscriber, TopicFunction};

/// Pause between inbox polls in the command loop.
const COMMAND_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("the {0} connection has no client handle; call connect() first")]
    NotConnected(StreamKind),
}

/// Everything the stream loops need, owned in one place instead of
/// module globals. Built by `main`, consumed by
/// [`StreamCoordinator::spawn`].
pub struct AppContext {
    pub resolution: Duration,
    pub retain_status: bool,
    pub sensors: SensorArray,
    pub led: LedMatrix,
    pub joystick: Joystick,
    pub sensor_conn: MqttConnection,
    pub joystick_conn: MqttConnection,
    pub led_conn: MqttConnection,
    pub subscriber: Subscriber,
    pub shutdown: CancellationToken,
}

/// Handle over the three running stream tasks. Each loop returns its
/// hardware wrapper on exit so teardown can disable it exactly once.
pub struct StreamCoordinator {
    sensor_task: JoinHandle<SensorArray>,
    joystick_task: JoinHandle<Joystick>,
    command_task: JoinHandle<LedMatrix>,
    connections: Vec<MqttConnection>,
}

impl StreamCoordinator {
    pub fn spawn(ctx: AppContext) -> Result<Self, CoordinatorError> {
        let AppContext {
            resolution,
            retain_status,
            sensors,
            led,
            joystick,
            sensor_conn,
            joystick_conn,
            led_conn,
            subscriber,
            shutdown,
        } = ctx;

        let sensor_publisher = publisher_for(&sensor_conn, retain_status)?;
        let joystick_publisher = publisher_for(&joystick_conn, retain_status)?;

        info!("starting stream loops");
        let sensor_task = tokio::spawn(sensor_stream(
            sensors,
            sensor_publisher,
            resolution,
            shutdown.clone(),
        ));
        let joystick_task = tokio::spawn(joystick_stream(
            joystick,
            joystick_publisher,
            shutdown.clone(),
        ));
        let command_task = tokio::spawn(command_stream(led, subscriber, shutdown));

        Ok(Self {
            sensor_task,
            joystick_task,
            command_task,
            connections: vec![sensor_conn, joystick_conn, led_conn],
        })
    }

    /// Joins the loops and tears everything down. Call after the
    /// shutdown token has been cancelled.
    pub async fn finish(mut self) {
        match self.sensor_task.await {
            Ok(mut sensors) => sensors.disable(),
            Err(e) => warn!("sensor loop task failed: {e}"),
        }
        match self.joystick_task.await {
            Ok(mut joystick) => joystick.disable(),
            Err(e) => warn!("joystick loop task failed: {e}"),
        }
        match self.command_task.await {
            Ok(mut led) => led.disable(),
            Err(e) => warn!("command loop task failed: {e}"),
        }
        for connection in &mut self.connections {
            connection.disable().await;
        }
        info!("all streams stopped");
    }
}

fn publisher_for(
    connection: &MqttConnection,
    retain_status: bool,
) -> Result<Publisher, CoordinatorError> {
    let client = connection
        .client()
        .cloned()
        .ok_or_else(|| CoordinatorError::NotConnected(connection.identity().kind))?;
    Ok(Publisher::new(
        client,
        connection.identity().topic(),
        retain_status,
    ))
}

/// Samples and publishes once per resolution period until shutdown.
async fn sensor_stream(
    mut sensors: SensorArray,
    publisher: Publisher,
    resolution: Duration,
    shutdown: CancellationToken,
) -> SensorArray {
    info!(period_secs = resolution.as_secs(), "sensor loop started");
    loop {
        let reading = sensors.sample();
        publisher.publish(&reading, Some(TopicFunction::Status));
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(resolution) => {}
        }
    }
    info!("sensor loop stopped");
    sensors
}

/// Publishes every captured stick direction until shutdown. The
/// blocking wait for an event is cancellable, which bounds shutdown
/// latency even when the stick is idle.
async fn joystick_stream(
    mut joystick: Joystick,
    publisher: Publisher,
    shutdown: CancellationToken,
) -> Joystick {
    info!("joystick loop started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            direction = joystick.next_direction() => match direction {
                Some(direction) => {
                    publisher.publish(&JoystickReading::from(direction), Some(TopicFunction::Status));
                }
                None => {
                    debug!("joystick event source closed, idling until shutdown");
                    shutdown.cancelled().await;
                    break;
                }
            }
        }
    }
    info!("joystick loop stopped");
    joystick
}

/// Polls the inbox and dispatches decoded command batches until
/// shutdown. Decode errors discard the message and the loop continues.
async fn command_stream(
    mut led: LedMatrix,
    subscriber: Subscriber,
    shutdown: CancellationToken,
) -> LedMatrix {
    info!("command loop started");
    loop {
        match subscriber.decode_next() {
            Inbound::Decoded(payload) => {
                let applied = dispatch::dispatch_batch(&mut led, &payload, &shutdown).await;
                debug!(applied, "command batch processed");
            }
            Inbound::Malformed(e) => warn!("could not decode inbound message, skipping it: {e}"),
            Inbound::Empty => {}
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(COMMAND_POLL_INTERVAL) => {}
        }
    }
    info!("command loop stopped");
    led
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{JoystickDirection, LedSettings, SensorSettings};
    use crate::mqtt::subscriber::{InboundMessage, Inbox};
    use crate::mqtt::topic::ClientIdentity;
    use rumqttc::{AsyncClient, MqttOptions};
    use std::time::Instant;

    fn test_publisher(kind: StreamKind) -> Publisher {
        let options = MqttOptions::new("test", "127.0.0.1", 1883);
        let (client, _event_loop) = AsyncClient::new(options, 32);
        let topic = ClientIdentity::new("zone1", "room1", "client1", kind).topic();
        Publisher::new(client, topic, false)
    }

    #[tokio::test]
    async fn sensor_loop_exits_well_before_the_next_tick() {
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sensor_stream(
            SensorArray::new(SensorSettings::default()),
            test_publisher(StreamKind::Sensor),
            Duration::from_secs(60),
            shutdown.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cancelled_at = Instant::now();
        shutdown.cancel();
        let sensors = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sensor loop must stop within the shutdown bound")
            .unwrap();
        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert!(sensors.enabled());
    }

    #[tokio::test(start_paused = true)]
    async fn sensor_loop_holds_the_resolution_cadence() {
        let resolution = Duration::from_secs(300);

        // just short of one period: only the startup sample exists
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sensor_stream(
            SensorArray::new(SensorSettings::default()),
            test_publisher(StreamKind::Sensor),
            resolution,
            shutdown.clone(),
        ));
        tokio::task::yield_now().await;
        tokio::time::advance(resolution - Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        shutdown.cancel();
        let sensors = task.await.unwrap();
        assert_eq!(sensors.samples_taken(), 1);

        // just past one period: exactly one more
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sensor_stream(
            SensorArray::new(SensorSettings::default()),
            test_publisher(StreamKind::Sensor),
            resolution,
            shutdown.clone(),
        ));
        tokio::task::yield_now().await;
        tokio::time::advance(resolution + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        shutdown.cancel();
        let sensors = task.await.unwrap();
        assert_eq!(sensors.samples_taken(), 2);
    }

    #[tokio::test]
    async fn joystick_loop_publishes_then_stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        let (joystick, feed) = Joystick::new();
        let task = tokio::spawn(joystick_stream(
            joystick,
            test_publisher(StreamKind::Joystick),
            shutdown.clone(),
        ));
        feed.send(JoystickDirection::Up).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("joystick loop must stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn command_loop_dispatches_and_survives_bad_payloads() {
        let inbox = Inbox::with_capacity(8);
        inbox.push(InboundMessage {
            topic: "zone1/room1/client1/led/cmd".to_string(),
            payload: b"not json".to_vec(),
        });
        inbox.push(InboundMessage {
            topic: "zone1/room1/client1/led/cmd".to_string(),
            payload: br#"[{"show_message":{"text_string":"hi"}}]"#.to_vec(),
        });
        let shutdown = CancellationToken::new();
        let led = LedMatrix::new(LedSettings::default()).unwrap();
        let task = tokio::spawn(command_stream(
            led,
            Subscriber::new(inbox),
            shutdown.clone(),
        ));
        // two poll rounds: one discards the bad payload, one dispatches
        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown.cancel();
        let led = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("command loop must stop on shutdown")
            .unwrap();
        assert_eq!(led.last_message(), Some("hi"));
    }
}
