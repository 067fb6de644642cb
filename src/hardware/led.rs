//! 8x8 RGB LED matrix wrapper.
//!
//! Mirrors the setter surface of the SenseHAT LED API so inbound
//! command batches map one-to-one onto methods here. The emulated
//! backend keeps the full pixel state in memory; display-only calls
//! are logged instead of rendered.

use std::path::Path;
use tracing::{debug, info};

use super::Hardware;

pub const MATRIX_SIDE: usize = 8;
pub const MATRIX_PIXELS: usize = MATRIX_SIDE * MATRIX_SIDE;

pub type Pixel = [u8; 3];

const BLACK: Pixel = [0, 0, 0];

#[derive(Debug, thiserror::Error)]
pub enum LedError {
    #[error("rotation must be 0, 90, 180 or 270 degrees, got {0}")]
    InvalidRotation(u16),

    #[error("pixel coordinates ({x}, {y}) are outside the 8x8 matrix")]
    PixelOutOfRange { x: usize, y: usize },

    #[error("pixel list must contain exactly {MATRIX_PIXELS} entries, got {0}")]
    InvalidPixelCount(usize),

    #[error("show_letter expects a single character, got '{0}'")]
    NotALetter(String),

    #[error("image file '{0}' not found")]
    ImageNotFound(String),
}

#[derive(Debug, Clone)]
pub struct LedSettings {
    pub low_light: bool,
    pub rotation: u16,
}

impl Default for LedSettings {
    fn default() -> Self {
        Self {
            low_light: true,
            rotation: 0,
        }
    }
}

pub struct LedMatrix {
    pixels: [Pixel; MATRIX_PIXELS],
    rotation: u16,
    low_light: bool,
    last_message: Option<String>,
    enabled: bool,
}

impl LedMatrix {
    pub fn new(settings: LedSettings) -> Result<Self, LedError> {
        validate_rotation(settings.rotation)?;
        info!(
            rotation = settings.rotation,
            low_light = settings.low_light,
            "LED matrix initialized"
        );
        Ok(Self {
            pixels: [BLACK; MATRIX_PIXELS],
            rotation: settings.rotation,
            low_light: settings.low_light,
            last_message: None,
            enabled: true,
        })
    }

    pub fn set_rotation(&mut self, r: u16, redraw: bool) -> Result<(), LedError> {
        validate_rotation(r)?;
        self.rotation = r;
        debug!(rotation = r, redraw, "rotation updated");
        Ok(())
    }

    pub fn flip_h(&mut self, redraw: bool) {
        for row in self.pixels.chunks_mut(MATRIX_SIDE) {
            row.reverse();
        }
        debug!(redraw, "matrix flipped horizontally");
    }

    pub fn flip_v(&mut self, redraw: bool) {
        for x in 0..MATRIX_SIDE {
            for y in 0..MATRIX_SIDE / 2 {
                self.pixels
                    .swap(y * MATRIX_SIDE + x, (MATRIX_SIDE - 1 - y) * MATRIX_SIDE + x);
            }
        }
        debug!(redraw, "matrix flipped vertically");
    }

    pub fn set_pixels(&mut self, pixels: &[Pixel]) -> Result<(), LedError> {
        if pixels.len() != MATRIX_PIXELS {
            return Err(LedError::InvalidPixelCount(pixels.len()));
        }
        self.pixels.copy_from_slice(pixels);
        Ok(())
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, pixel: Pixel) -> Result<(), LedError> {
        if x >= MATRIX_SIDE || y >= MATRIX_SIDE {
            return Err(LedError::PixelOutOfRange { x, y });
        }
        self.pixels[y * MATRIX_SIDE + x] = pixel;
        Ok(())
    }

    pub fn get_pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn load_image(&mut self, file_path: &str, redraw: bool) -> Result<(), LedError> {
        if !Path::new(file_path).is_file() {
            return Err(LedError::ImageNotFound(file_path.to_string()));
        }
        info!(%file_path, redraw, "image loaded onto matrix");
        Ok(())
    }

    pub fn clear(&mut self, colour: Option<Pixel>) {
        self.pixels = [colour.unwrap_or(BLACK); MATRIX_PIXELS];
        self.last_message = None;
        debug!("matrix cleared");
    }

    pub fn show_message(
        &mut self,
        text: &str,
        scroll_speed: f64,
        text_colour: Pixel,
        back_colour: Pixel,
    ) {
        info!(%text, scroll_speed, ?text_colour, ?back_colour, "scrolling message");
        self.last_message = Some(text.to_string());
    }

    pub fn show_letter(
        &mut self,
        letter: &str,
        text_colour: Pixel,
        back_colour: Pixel,
    ) -> Result<(), LedError> {
        if letter.chars().count() != 1 {
            return Err(LedError::NotALetter(letter.to_string()));
        }
        info!(%letter, ?text_colour, ?back_colour, "showing letter");
        self.last_message = Some(letter.to_string());
        Ok(())
    }

    pub fn rotation(&self) -> u16 {
        self.rotation
    }

    pub fn low_light(&self) -> bool {
        self.low_light
    }

    /// Last text shown since the matrix was cleared. Display-only
    /// state, useful for the emulated backend and assertions.
    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }
}

impl Hardware for LedMatrix {
    fn enabled(&self) -> bool {
        self.enabled
    }

    // The matrix must go dark on teardown.
    fn disable(&mut self) {
        self.clear(None);
        self.enabled = false;
    }
}

fn validate_rotation(r: u16) -> Result<(), LedError> {
    match r {
        0 | 90 | 180 | 270 => Ok(()),
        other => Err(LedError::InvalidRotation(other)),
    }
}
