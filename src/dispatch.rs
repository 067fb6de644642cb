//! Inbound command batch dispatcher for the LED matrix.
//!
//! A decoded payload must be a list of single-key objects mapping an
//! operation name to an argument bag:
//! `[{"clear": {}}, {"show_message": {"text_string": "hi"}}]`.
//! Operation names resolve against a closed allow-list of typed
//! handlers; anything else is skipped with a warning. One bad entry
//! never aborts the rest of the batch.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::hardware::led::{LedError, LedMatrix, Pixel};

/// Upper bound for a single `wait` entry. Large float values overflow
/// `Duration::from_secs_f64`, so anything past an hour is rejected.
const MAX_WAIT_SECS: f64 = 3600.0;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("operation '{0}' is not supported by the LED matrix")]
    UnsupportedOperation(String),

    #[error("invalid arguments for '{op}': {source}")]
    BadArguments {
        op: String,
        source: serde_json::Error,
    },

    #[error("wait seconds must be between 0 and {MAX_WAIT_SECS}, got {0}")]
    InvalidWait(f64),

    #[error(transparent)]
    Led(#[from] LedError),
}

fn default_true() -> bool {
    true
}

fn default_scroll_speed() -> f64 {
    0.1
}

fn default_text_colour() -> Pixel {
    [255, 255, 255]
}

fn default_back_colour() -> Pixel {
    [0, 0, 0]
}

#[derive(Debug, Deserialize)]
struct RotationArgs {
    r: u16,
    #[serde(default = "default_true")]
    redraw: bool,
}

#[derive(Debug, Default, Deserialize)]
struct FlipArgs {
    #[serde(default = "default_true")]
    redraw: bool,
}

#[derive(Debug, Deserialize)]
struct SetPixelsArgs {
    pixel_list: Vec<Pixel>,
}

#[derive(Debug, Deserialize)]
struct SetPixelArgs {
    x: usize,
    y: usize,
    pixel: Pixel,
}

#[derive(Debug, Deserialize)]
struct LoadImageArgs {
    file_path: String,
    #[serde(default = "default_true")]
    redraw: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ClearArgs {
    #[serde(default)]
    colour: Option<Pixel>,
}

#[derive(Debug, Deserialize)]
struct ShowMessageArgs {
    text_string: String,
    #[serde(default = "default_scroll_speed")]
    scroll_speed: f64,
    #[serde(default = "default_text_colour")]
    text_colour: Pixel,
    #[serde(default = "default_back_colour")]
    back_colour: Pixel,
}

#[derive(Debug, Deserialize)]
struct ShowLetterArgs {
    s: String,
    #[serde(default = "default_text_colour")]
    text_colour: Pixel,
    #[serde(default = "default_back_colour")]
    back_colour: Pixel,
}

#[derive(Debug, Deserialize)]
struct WaitArgs {
    seconds: f64,
}

/// Applies every well-formed entry of `payload` against the matrix, in
/// order. Returns the number of operations that succeeded; failures
/// are logged per entry and never propagate. A pending `wait` ends
/// early when `shutdown` is cancelled.
pub async fn dispatch_batch(
    led: &mut LedMatrix,
    payload: &Value,
    shutdown: &CancellationToken,
) -> usize {
    let Some(entries) = payload.as_array() else {
        warn!("command payload is not a list, skipping it");
        return 0;
    };
    info!(commands = entries.len(), "executing command batch");
    let mut applied = 0;
    for entry in entries {
        let Some(object) = entry.as_object() else {
            warn!(?entry, "command entry is not an object, skipping it");
            continue;
        };
        if object.len() != 1 {
            warn!(
                keys = object.len(),
                "command entry must map a single operation, skipping it"
            );
            continue;
        }
        if let Some((name, args)) = object.iter().next() {
            match apply(led, name, args, shutdown).await {
                Ok(()) => applied += 1,
                Err(e) => warn!(op = %name, "command skipped: {e}"),
            }
        }
    }
    applied
}

async fn apply(
    led: &mut LedMatrix,
    name: &str,
    args: &Value,
    shutdown: &CancellationToken,
) -> Result<(), DispatchError> {
    match name {
        "set_rotation" | "rotate" => {
            let args: RotationArgs = parse(name, args)?;
            led.set_rotation(args.r, args.redraw)?;
        }
        "flip_h" => {
            let args: FlipArgs = parse(name, args)?;
            led.flip_h(args.redraw);
        }
        "flip_v" => {
            let args: FlipArgs = parse(name, args)?;
            led.flip_v(args.redraw);
        }
        "set_pixels" => {
            let args: SetPixelsArgs = parse(name, args)?;
            led.set_pixels(&args.pixel_list)?;
        }
        "set_pixel" => {
            let args: SetPixelArgs = parse(name, args)?;
            led.set_pixel(args.x, args.y, args.pixel)?;
        }
        "load_image" => {
            let args: LoadImageArgs = parse(name, args)?;
            led.load_image(&args.file_path, args.redraw)?;
        }
        "clear" => {
            let args: ClearArgs = parse(name, args)?;
            led.clear(args.colour);
        }
        "show_message" => {
            let args: ShowMessageArgs = parse(name, args)?;
            led.show_message(
                &args.text_string,
                args.scroll_speed,
                args.text_colour,
                args.back_colour,
            );
        }
        "show_letter" => {
            let args: ShowLetterArgs = parse(name, args)?;
            led.show_letter(&args.s, args.text_colour, args.back_colour)?;
        }
        "wait" => {
            let args: WaitArgs = parse(name, args)?;
            // contains() also rejects NaN and the infinities
            if !(0.0..=MAX_WAIT_SECS).contains(&args.seconds) {
                return Err(DispatchError::InvalidWait(args.seconds));
            }
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_secs_f64(args.seconds)) => {}
            }
        }
        other => return Err(DispatchError::UnsupportedOperation(other.to_string())),
    }
    Ok(())
}

fn parse<T: DeserializeOwned>(op: &str, args: &Value) -> Result<T, DispatchError> {
    serde_json::from_value(args.clone()).map_err(|source| DispatchError::BadArguments {
        op: op.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::led::LedSettings;
    use serde_json::json;

    fn matrix() -> LedMatrix {
        LedMatrix::new(LedSettings::default()).unwrap()
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn clear_then_show_message_runs_in_order() {
        let mut led = matrix();
        let batch = json!([
            {"clear": {}},
            {"show_message": {"text_string": "hi"}}
        ]);
        let applied = dispatch_batch(&mut led, &batch, &token()).await;
        assert_eq!(applied, 2);
        // clear wipes any previous text, so a surviving message proves
        // show_message ran after it
        assert_eq!(led.last_message(), Some("hi"));
    }

    #[tokio::test]
    async fn unsupported_operation_does_not_block_the_rest() {
        let mut led = matrix();
        let batch = json!([
            {"self_destruct": {}},
            {"show_letter": {"s": "x"}}
        ]);
        let applied = dispatch_batch(&mut led, &batch, &token()).await;
        assert_eq!(applied, 1);
        assert_eq!(led.last_message(), Some("x"));
    }

    #[tokio::test]
    async fn bad_arguments_are_isolated_per_entry() {
        let mut led = matrix();
        let batch = json!([
            {"set_rotation": {"r": "ninety"}},
            {"set_pixel": {"x": 200, "y": 0, "pixel": [1, 2, 3]}},
            {"set_rotation": {"r": 90}}
        ]);
        let applied = dispatch_batch(&mut led, &batch, &token()).await;
        assert_eq!(applied, 1);
        assert_eq!(led.rotation(), 90);
    }

    #[tokio::test]
    async fn malformed_shapes_are_skipped() {
        let mut led = matrix();
        let stop = token();
        assert_eq!(dispatch_batch(&mut led, &json!({"clear": {}}), &stop).await, 0);
        let batch = json!([
            "clear",
            {"clear": {}, "flip_h": {}},
            {"flip_v": {}}
        ]);
        assert_eq!(dispatch_batch(&mut led, &batch, &stop).await, 1);
    }

    #[tokio::test]
    async fn set_pixels_and_flips_apply_state() {
        let mut led = matrix();
        let mut frame = vec![[0u8, 0, 0]; 64];
        frame[0] = [9, 9, 9];
        let batch = json!([
            {"set_pixels": {"pixel_list": frame}},
            {"flip_h": {}}
        ]);
        assert_eq!(dispatch_batch(&mut led, &batch, &token()).await, 2);
        assert_eq!(led.get_pixels()[7], [9, 9, 9]);
    }

    #[tokio::test]
    async fn out_of_range_wait_is_rejected_and_the_batch_continues() {
        let mut led = matrix();
        let batch = json!([
            {"wait": {"seconds": 1e300}},
            {"wait": {"seconds": -1.0}},
            {"clear": {}}
        ]);
        let applied = dispatch_batch(&mut led, &batch, &token()).await;
        assert_eq!(applied, 1);
        assert_eq!(led.last_message(), None);
    }

    #[tokio::test]
    async fn pending_wait_ends_on_shutdown() {
        let mut led = matrix();
        let stop = token();
        stop.cancel();
        let batch = json!([{"wait": {"seconds": 3600.0}}, {"show_letter": {"s": "x"}}]);
        let applied = tokio::time::timeout(
            Duration::from_secs(1),
            dispatch_batch(&mut led, &batch, &stop),
        )
        .await
        .expect("a cancelled wait must not block the batch");
        assert_eq!(applied, 2);
        assert_eq!(led.last_message(), Some("x"));
    }
}
