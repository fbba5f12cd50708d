use std::fmt;

use crossterm::{
    cursor::MoveTo,
    style::{Color, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
    Command,
};
use log::debug;

use crate::converter::{CellGrid, Geometry};

/// A packed 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn packed(self) -> u32 {
        (self.r as u32) << 16 | (self.g as u32) << 8 | self.b as u32
    }

    pub const fn from_packed(packed: u32) -> Self {
        Self::new((packed >> 16) as u8, (packed >> 8) as u8, packed as u8)
    }

    /// `0xFFFFFF ^ color`, legible on top of `self`
    pub const fn inverted(self) -> Self {
        Self::from_packed(0xFF_FFFF ^ self.packed())
    }

    /// Sum of per-channel absolute differences
    pub fn distance(self, other: Rgb) -> u32 {
        self.r.abs_diff(other.r) as u32
            + self.g.abs_diff(other.g) as u32
            + self.b.abs_diff(other.b) as u32
    }

    fn to_color(self) -> Color {
        Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Redraw thresholds, both per-channel Manhattan distances
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// A new background escape is only emitted when the cell differs from the
    /// last emitted background by more than this.
    pub color_threshold: u32,
    /// A cell closer than this to what is already on screen is not redrawn.
    pub skip_threshold: u32,
}

/// Everything needed to draw one frame
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub grid: &'a CellGrid,
    /// Full terminal geometry, used for centering and resize detection
    pub terminal: Geometry,
    pub center: bool,
    /// Overlaid on the leading cells; empty for none
    pub status: &'a str,
    /// Clear the screen and redraw every cell
    pub clear: bool,
}

/// Differential frame renderer.
///
/// Keeps what is on screen per cell and emits only the cursor moves, color
/// changes and cells needed to bring the terminal to the next frame.
#[derive(Debug)]
pub struct DiffRenderer {
    options: RenderOptions,
    screen: Vec<Option<Rgb>>,
    screen_size: (u16, u16),
    last_terminal: Option<Geometry>,
    last_background: Option<Rgb>,
    last_foreground: Option<Rgb>,
    overlay_cells: usize,
}

impl DiffRenderer {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            screen: Vec::new(),
            screen_size: (0, 0),
            last_terminal: None,
            last_background: None,
            last_foreground: None,
            overlay_cells: 0,
        }
    }

    fn invalidate(&mut self, width: u16, height: u16) {
        self.screen.clear();
        self.screen.resize(width as usize * height as usize, None);
        self.screen_size = (width, height);
        self.last_background = None;
        self.last_foreground = None;
        self.overlay_cells = 0;
    }

    /// Append the escape stream for `request` to `out`
    pub fn render(&mut self, request: &RenderRequest<'_>, out: &mut String) -> fmt::Result {
        let grid = request.grid;
        let (width, height) = (grid.width, grid.height);

        let full_redraw = request.clear
            || self.last_terminal != Some(request.terminal)
            || self.screen_size != (width, height);
        if full_redraw {
            debug!(
                "renderer: full redraw at {}x{} cells on {}x{} terminal",
                width, height, request.terminal.columns, request.terminal.rows
            );
            ResetColor.write_ansi(out)?;
            Clear(ClearType::Purge).write_ansi(out)?;
            Clear(ClearType::All).write_ansi(out)?;
            self.invalidate(width, height);
            self.last_terminal = Some(request.terminal);
        }
        MoveTo(0, 0).write_ansi(out)?;

        let (origin_col, origin_row) = if request.center {
            (
                request.terminal.columns.saturating_sub(width) / 2,
                request.terminal.rows.saturating_sub(height) / 2,
            )
        } else {
            (0, 0)
        };

        let overlay: Vec<char> = request.status.chars().take(grid.cells.len()).collect();
        let stale_overlay = self.overlay_cells;

        for y in 0..height {
            if request.center {
                MoveTo(origin_col, origin_row + y).write_ansi(out)?;
            } else if y > 0 {
                out.push_str("\r\n");
            }

            // set after skipped cells, the cursor is re-placed lazily
            let mut resync = false;
            for x in 0..width {
                let index = y as usize * width as usize + x as usize;
                let color = grid.cells[index];
                let glyph = overlay.get(index).copied();

                let forced = full_redraw || glyph.is_some() || index < stale_overlay;
                if !forced {
                    if let Some(on_screen) = self.screen[index] {
                        if on_screen.distance(color) < self.options.skip_threshold {
                            resync = true;
                            continue;
                        }
                    }
                }

                if resync {
                    MoveTo(origin_col + x, origin_row + y).write_ansi(out)?;
                    resync = false;
                }

                let threshold = self.options.color_threshold;
                let shown = match self.last_background {
                    Some(background) if background.distance(color) <= threshold => background,
                    _ => {
                        SetBackgroundColor(color.to_color()).write_ansi(out)?;
                        self.last_background = Some(color);
                        color
                    }
                };
                self.screen[index] = Some(shown);

                match glyph {
                    Some(ch) => {
                        let foreground = color.inverted();
                        if self.last_foreground != Some(foreground) {
                            SetForegroundColor(foreground.to_color()).write_ansi(out)?;
                            self.last_foreground = Some(foreground);
                        }
                        out.push(ch);
                    }
                    None => out.push(' '),
                }
            }
        }

        self.overlay_cells = overlay.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Number of background color escapes in a rendered frame
    fn count_background_changes(frame: &str) -> usize {
        frame.matches("\x1b[48;2;").count()
    }

    fn gradient(width: u16, height: u16) -> CellGrid {
        let cells = (0..width as usize * height as usize)
            .map(|i| Rgb::new((i * 7 % 256) as u8, (i * 13 % 256) as u8, (i * 29 % 256) as u8))
            .collect();
        CellGrid {
            width,
            height,
            cells,
            aspect_ratio_scale: 1.0,
        }
    }

    fn request<'a>(grid: &'a CellGrid, center: bool, status: &'a str) -> RenderRequest<'a> {
        RenderRequest {
            grid,
            terminal: Geometry::new(20, 10),
            center,
            status,
            clear: false,
        }
    }

    fn render(renderer: &mut DiffRenderer, request: &RenderRequest<'_>) -> String {
        let mut out = String::new();
        renderer.render(request, &mut out).unwrap();
        out
    }

    #[test]
    fn test_rgb_helpers() {
        let color = Rgb::new(0x12, 0x34, 0x56);
        assert_eq!(color.packed(), 0x123456);
        assert_eq!(Rgb::from_packed(0x123456), color);
        assert_eq!(color.inverted(), Rgb::new(0xED, 0xCB, 0xA9));
        assert_eq!(color.distance(Rgb::new(0x10, 0x36, 0x56)), 4);
    }

    #[test]
    fn test_first_frame_clears_screen() {
        let grid = gradient(4, 2);
        let mut renderer = DiffRenderer::new(RenderOptions::default());
        let out = render(&mut renderer, &request(&grid, false, ""));
        assert!(out.starts_with("\x1b[0m\x1b[3J\x1b[2J\x1b[1;1H"));
        assert_eq!(count_background_changes(&out), 8);
        assert_eq!(out.matches(' ').count(), 8);
    }

    #[test]
    fn test_solid_repeat_emits_no_color_changes() {
        let grid = CellGrid::filled(6, 3, Rgb::new(40, 80, 120));
        let mut renderer = DiffRenderer::new(RenderOptions::default());
        let first = render(&mut renderer, &request(&grid, true, ""));
        assert_eq!(count_background_changes(&first), 1);

        let second = render(&mut renderer, &request(&grid, true, ""));
        assert!(!second.is_empty());
        assert_eq!(count_background_changes(&second), 0);
        assert_eq!(second.matches(' ').count(), 18);
    }

    #[test]
    fn test_high_skip_threshold_only_positions_cursor() {
        let grid = gradient(5, 4);
        let mut renderer = DiffRenderer::new(RenderOptions {
            color_threshold: 0,
            skip_threshold: 1000,
        });
        render(&mut renderer, &request(&grid, true, ""));
        let second = render(&mut renderer, &request(&grid, true, ""));

        assert_eq!(count_background_changes(&second), 0);
        assert!(!second.contains(' '));
        // home + one position per centered row
        assert_eq!(second.matches('H').count(), 1 + 4);
    }

    #[test]
    fn test_skipped_run_resyncs_cursor_before_next_cell() {
        let first = CellGrid::filled(4, 1, Rgb::new(10, 10, 10));
        let mut second = first.clone();
        second.cells[3] = Rgb::new(250, 0, 0);

        let mut renderer = DiffRenderer::new(RenderOptions {
            color_threshold: 0,
            skip_threshold: 1,
        });
        render(&mut renderer, &request(&first, false, ""));
        let out = render(&mut renderer, &request(&second, false, ""));
        assert_eq!(out, "\x1b[1;1H\x1b[1;4H\x1b[48;2;250;0;0m ");
    }

    #[test]
    fn test_color_threshold_shares_escape() {
        let mut grid = CellGrid::filled(3, 1, Rgb::new(100, 100, 100));
        grid.cells[1] = Rgb::new(101, 100, 100);
        grid.cells[2] = Rgb::new(140, 100, 100);
        let mut renderer = DiffRenderer::new(RenderOptions {
            color_threshold: 5,
            skip_threshold: 0,
        });
        let out = render(&mut renderer, &request(&grid, false, ""));
        assert_eq!(count_background_changes(&out), 2);
    }

    #[test]
    fn test_status_overlay_uses_inverted_foreground() {
        let grid = CellGrid::filled(4, 2, Rgb::new(0, 0, 255));
        let mut renderer = DiffRenderer::new(RenderOptions {
            color_threshold: 0,
            skip_threshold: 1000,
        });
        let out = render(&mut renderer, &request(&grid, false, "ok"));
        assert!(out.contains("\x1b[38;2;255;255;0mok"));

        // overlay cells are redrawn even when the skip threshold would elide them
        let again = render(&mut renderer, &request(&grid, false, "ok"));
        assert!(again.contains("ok"));

        // dropping the overlay repaints the two cells it covered
        let cleared = render(&mut renderer, &request(&grid, false, ""));
        assert_eq!(cleared.matches(' ').count(), 2);
    }

    #[test]
    fn test_status_longer_than_grid_is_truncated() {
        let grid = CellGrid::filled(2, 1, Rgb::new(0, 0, 0));
        let mut renderer = DiffRenderer::new(RenderOptions::default());
        let out = render(&mut renderer, &request(&grid, false, "Res: 2x1"));
        assert!(out.ends_with("Re"));
    }

    #[test]
    fn test_resize_forces_full_redraw() {
        let grid = gradient(3, 3);
        let mut renderer = DiffRenderer::new(RenderOptions {
            color_threshold: 0,
            skip_threshold: 1000,
        });
        render(&mut renderer, &request(&grid, false, ""));

        let mut resized = request(&grid, false, "");
        resized.terminal = Geometry::new(30, 12);
        let out = render(&mut renderer, &resized);
        assert!(out.starts_with("\x1b[0m\x1b[3J\x1b[2J"));
        assert_eq!(out.matches(' ').count(), 9);
    }

    #[test]
    fn test_explicit_clear_forces_full_redraw() {
        let grid = gradient(2, 2);
        let mut renderer = DiffRenderer::new(RenderOptions {
            color_threshold: 0,
            skip_threshold: 1000,
        });
        render(&mut renderer, &request(&grid, true, ""));
        let mut cleared = request(&grid, true, "");
        cleared.clear = true;
        let out = render(&mut renderer, &cleared);
        assert_eq!(count_background_changes(&out), 4);
    }

    #[test]
    fn test_centering_positions_each_row() {
        let grid = gradient(4, 2);
        let mut renderer = DiffRenderer::new(RenderOptions::default());
        let out = render(&mut renderer, &request(&grid, true, ""));
        // 20x10 terminal, 4x2 grid: origin column 8, origin row 4 (zero-based)
        assert!(out.contains("\x1b[5;9H"));
        assert!(out.contains("\x1b[6;9H"));
        assert!(!out.contains("\r\n"));
    }

    #[test]
    fn test_left_aligned_rows_use_newlines() {
        let grid = gradient(4, 3);
        let mut renderer = DiffRenderer::new(RenderOptions::default());
        let out = render(&mut renderer, &request(&grid, false, ""));
        assert_eq!(out.matches("\r\n").count(), 2);
    }
}
