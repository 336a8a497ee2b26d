//! Output geometry and display modes

use serde::{Deserialize, Serialize};

use crate::error::{PacingError, Result};

/// Logical position in the global compositor space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Size in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rectangle for output positioning and sizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn from_loc_and_size(loc: Point, size: Size) -> Self {
        Self::new(loc.x, loc.y, size.width, size.height)
    }

    pub const fn loc(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// An immutable display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Mode {
    pub size: Size,
    /// Refresh rate in milli-hertz
    pub refresh_rate: u32,
}

impl Mode {
    pub const fn new(size: Size, refresh_rate: u32) -> Self {
        Self { size, refresh_rate }
    }

    pub fn validate(&self) -> Result<()> {
        if self.size.is_empty() {
            return Err(PacingError::Configuration(format!(
                "mode size {}x{} is empty",
                self.size.width, self.size.height
            )));
        }
        if self.refresh_rate == 0 {
            return Err(PacingError::Configuration(
                "mode refresh rate must be greater than 0 mHz".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@{}.{:03}Hz",
            self.size.width,
            self.size.height,
            self.refresh_rate / 1000,
            self.refresh_rate % 1000
        )
    }
}
