use image::imageops::{self, FilterType};
use image::RgbImage;
use log::trace;

use crate::renderer::Rgb;

/// Assumed whole-window pixel aspect when the terminal does not report pixels
const FALLBACK_PIXEL_WIDTH: u16 = 16;
const FALLBACK_PIXEL_HEIGHT: u16 = 9;

/// Terminal geometry as reported by the terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub columns: u16,
    pub rows: u16,
    /// Window size in pixels (width, height), when the terminal reports it
    pub pixels: Option<(u16, u16)>,
}

impl Geometry {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            rows,
            pixels: None,
        }
    }

    pub fn with_pixels(mut self, width: u16, height: u16) -> Self {
        self.pixels = if width == 0 || height == 0 {
            None
        } else {
            Some((width, height))
        };
        self
    }

    /// Geometry the picture is fitted into: one row is kept free so the last
    /// line never scrolls the screen.
    pub fn drawable(&self) -> Self {
        Self {
            rows: self.rows.saturating_sub(1).max(1),
            columns: self.columns.max(1),
            pixels: self.pixels,
        }
    }

    /// Height of a cell relative to its width, scaled to the grid:
    /// `(columns * pixel_height) / (rows * pixel_width)`
    pub fn aspect_ratio_scale(&self) -> f64 {
        let (pixel_width, pixel_height) = self
            .pixels
            .unwrap_or((FALLBACK_PIXEL_WIDTH, FALLBACK_PIXEL_HEIGHT));
        let columns = self.columns.max(1) as f64;
        let rows = self.rows.max(1) as f64;
        (columns * pixel_height as f64) / (rows * pixel_width as f64)
    }
}

/// Cell grid size for an image of `image_width` x `image_height` on
/// `geometry`. The result never exceeds the terminal and keeps the visual
/// aspect ratio up to rounding.
pub fn cell_dimensions(image_width: u32, image_height: u32, geometry: &Geometry) -> (u16, u16) {
    if image_width == 0 || image_height == 0 {
        return (0, 0);
    }
    let columns = geometry.columns.max(1);
    let rows = geometry.rows.max(1);
    let aspect = geometry.aspect_ratio_scale();

    let width = image_width as f64;
    let height = image_height as f64;
    let scale = (width / columns as f64).max((height / rows as f64) / aspect);

    let cell_width = (width / scale).round().min(columns as f64).max(1.0) as u16;
    let cell_height = ((height / scale) / aspect).round().min(rows as f64).max(1.0) as u16;
    (cell_width, cell_height)
}

/// One solid color per terminal cell, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct CellGrid {
    pub width: u16,
    pub height: u16,
    pub cells: Vec<Rgb>,
    /// Aspect scale the grid was fitted with, kept for the status line
    pub aspect_ratio_scale: f64,
}

impl CellGrid {
    pub fn from_image(image: &RgbImage, aspect_ratio_scale: f64) -> Self {
        let cells = image
            .pixels()
            .map(|pixel| Rgb::new(pixel[0], pixel[1], pixel[2]))
            .collect();
        Self {
            width: image.width() as u16,
            height: image.height() as u16,
            cells,
            aspect_ratio_scale,
        }
    }

    pub fn filled(width: u16, height: u16, color: Rgb) -> Self {
        Self {
            width,
            height,
            cells: vec![color; width as usize * height as usize],
            aspect_ratio_scale: 1.0,
        }
    }

    /// Height as it appears on screen, in column-equivalent units
    pub fn visual_height(&self) -> u32 {
        (self.height as f64 * self.aspect_ratio_scale).round() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Decoded frame to terminal cell grid mapper
#[derive(Debug, Clone)]
pub struct FrameConverter {
    filter: FilterType,
}

impl FrameConverter {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Resample `frame` to one pixel per terminal cell
    pub fn convert_frame(&self, frame: &RgbImage, geometry: &Geometry) -> CellGrid {
        let (cell_width, cell_height) = cell_dimensions(frame.width(), frame.height(), geometry);
        let aspect = geometry.aspect_ratio_scale();
        trace!(
            "Mapping {}x{} frame to {}x{} cells on {}x{} terminal",
            frame.width(),
            frame.height(),
            cell_width,
            cell_height,
            geometry.columns,
            geometry.rows
        );

        if cell_width == 0 || cell_height == 0 {
            return CellGrid {
                width: 0,
                height: 0,
                cells: Vec::new(),
                aspect_ratio_scale: aspect,
            };
        }
        if frame.width() == cell_width as u32 && frame.height() == cell_height as u32 {
            return CellGrid::from_image(frame, aspect);
        }

        let resized = imageops::resize(frame, cell_width as u32, cell_height as u32, self.filter);
        CellGrid::from_image(&resized, aspect)
    }
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::new()
    }
}
