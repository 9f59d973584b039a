//! One-line colored level bars, redrawn in place.

use crossterm::cursor::{Hide, Show};
use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use crossterm::{queue, QueueableCommand};
use pulse_core::bands::Band;
use pulse_core::light::BulbTarget;
use pulse_core::pipeline::BandLevels;
use std::io::{self, Stdout, Write};

pub const BAR_WIDTH: usize = 20;

const GAP: &str = "   ";

pub fn band_color(band: Band) -> Color {
    match band {
        Band::Low => Color::Red,
        Band::Mid => Color::Green,
        Band::High => Color::Blue,
    }
}

/// Filled cells for a 0..=100 level.
pub fn bar_fill(level: f32, width: usize) -> usize {
    if !level.is_finite() || level <= 0.0 {
        return 0;
    }
    ((level / 100.0 * width as f32) as usize).min(width)
}

/// `L|█████     |` without color.
pub fn render_bar(band: Band, level: f32, width: usize) -> String {
    let filled = bar_fill(level, width);
    let initial = band.name().chars().next().unwrap_or('?');
    format!(
        "{}|{}{}|",
        initial,
        "█".repeat(filled),
        " ".repeat(width - filled)
    )
}

pub struct Visualizer {
    out: Stdout,
    width: usize,
    started: bool,
}

impl Visualizer {
    pub fn new() -> Self {
        Self {
            out: io::stdout(),
            width: BAR_WIDTH,
            started: false,
        }
    }

    pub fn draw(&mut self, levels: &BandLevels, light: Option<BulbTarget>) -> io::Result<()> {
        if !self.started {
            self.out.queue(Hide)?;
            self.started = true;
        }
        self.out.queue(Print("\r"))?;
        for (i, band) in Band::ALL.into_iter().enumerate() {
            if i > 0 {
                self.out.queue(Print(GAP))?;
            }
            queue!(
                self.out,
                SetForegroundColor(band_color(band)),
                Print(render_bar(band, levels.get(band), self.width)),
                ResetColor
            )?;
        }
        if let Some(target) = light {
            let c = target.color;
            queue!(
                self.out,
                Print(GAP),
                SetForegroundColor(Color::Rgb { r: c.r, g: c.g, b: c.b }),
                Print("●"),
                ResetColor,
                Print(format!(" {:>3}%", target.dimming))
            )?;
        }
        queue!(self.out, Clear(ClearType::UntilNewLine))?;
        self.out.flush()
    }

    /// Leave the cursor on a fresh line with default colors.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        queue!(self.out, ResetColor, Show, Print("\n"))?;
        self.out.flush()
    }
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Visualizer {
    fn drop(&mut self) {
        let _ = self.finish();
    }
}
