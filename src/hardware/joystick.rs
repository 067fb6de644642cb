//! Joystick direction events.

use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;

use super::Hardware;

const EVENT_QUEUE_CAPACITY: usize = 16;

/// One captured stick movement. `Pressed` is the middle click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JoystickDirection {
    Up,
    Down,
    Left,
    Right,
    Pressed,
}

impl JoystickDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoystickDirection::Up => "up",
            JoystickDirection::Down => "down",
            JoystickDirection::Left => "left",
            JoystickDirection::Right => "right",
            JoystickDirection::Pressed => "pressed",
        }
    }
}

impl fmt::Display for JoystickDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire payload of the joystick status topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoystickReading {
    pub direction: String,
}

impl From<JoystickDirection> for JoystickReading {
    fn from(direction: JoystickDirection) -> Self {
        Self {
            direction: direction.as_str().to_string(),
        }
    }
}

/// Receiving end of the stick event stream. The paired sender is the
/// hook a hardware backend (or a test) pushes directions into; the
/// stream loop owns this side exclusively.
pub struct Joystick {
    directions: mpsc::Receiver<JoystickDirection>,
    enabled: bool,
}

impl Joystick {
    pub fn new() -> (Self, mpsc::Sender<JoystickDirection>) {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        (
            Self {
                directions: rx,
                enabled: true,
            },
            tx,
        )
    }

    /// Waits for the next direction event. Returns `None` once the
    /// event source is gone and the queue is drained.
    pub async fn next_direction(&mut self) -> Option<JoystickDirection> {
        let direction = self.directions.recv().await;
        if let Some(direction) = direction {
            debug!(%direction, "joystick direction captured");
        }
        direction
    }
}

impl Hardware for Joystick {
    fn enabled(&self) -> bool {
        self.enabled
    }

    // The stick itself has no state to undo; closing the channel just
    // stops event intake.
    fn disable(&mut self) {
        self.directions.close();
        self.enabled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directions_arrive_in_order() {
        let (mut joystick, feed) = Joystick::new();
        feed.send(JoystickDirection::Up).await.unwrap();
        feed.send(JoystickDirection::Pressed).await.unwrap();
        assert_eq!(
            joystick.next_direction().await,
            Some(JoystickDirection::Up)
        );
        assert_eq!(
            joystick.next_direction().await,
            Some(JoystickDirection::Pressed)
        );
    }

    #[tokio::test]
    async fn closed_source_yields_none() {
        let (mut joystick, feed) = Joystick::new();
        drop(feed);
        assert_eq!(joystick.next_direction().await, None);
    }

    #[test]
    fn reading_serializes_to_the_direction_schema() {
        let reading = JoystickReading::from(JoystickDirection::Left);
        let value = serde_json::to_value(&reading).unwrap();
        assert_eq!(value, serde_json::json!({"direction": "left"}));
    }
}
