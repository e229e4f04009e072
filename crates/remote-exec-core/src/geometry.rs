//! Terminal viewport geometry.

use serde::{Deserialize, Serialize};

/// Character grid dimensions of a terminal viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewportGeometry {
    pub rows: u16,
    pub cols: u16,
}

impl Default for ViewportGeometry {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// Pixel size of one character cell, as reported by the renderer's font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub width_px: f32,
    pub height_px: f32,
}

impl CellMetrics {
    #[must_use]
    pub const fn new(width_px: f32, height_px: f32) -> Self {
        Self {
            width_px,
            height_px,
        }
    }
}

impl ViewportGeometry {
    #[must_use]
    pub const fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Largest grid that fits in the given pixel area.
    ///
    /// Never smaller than 1x1, even for degenerate metrics.
    #[must_use]
    pub fn fit(width_px: f32, height_px: f32, cell: CellMetrics) -> Self {
        Self {
            rows: cells_along(height_px, cell.height_px),
            cols: cells_along(width_px, cell.width_px),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cells_along(available_px: f32, cell_px: f32) -> u16 {
    if cell_px <= 0.0 || !cell_px.is_finite() || !available_px.is_finite() {
        return 1;
    }
    (available_px / cell_px)
        .floor()
        .clamp(1.0, f32::from(u16::MAX)) as u16
}
