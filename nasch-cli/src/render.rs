//! Terminal visualization of the road.

use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use ansi_term::Colour;

use nasch_core::{Road, Velocity};

const CLEAR_SCREEN: &str = "\x1b[H\x1b[2J";

/// Prints one line per round, `T=<round> [<cells>]`, with vacant cells as
/// `.` and vehicles as their velocity.
pub struct Renderer {
    delay: Duration,
    clear: bool,
    color: bool,
    max_velocity: Velocity,
}

impl Renderer {
    pub fn new(delay: Duration, max_velocity: Velocity) -> Self {
        Self {
            delay,
            clear: true,
            color: true,
            max_velocity,
        }
    }

    /// Disables screen clearing and coloring, for piping into files.
    pub fn plain(mut self) -> Self {
        self.clear = false;
        self.color = false;
        self
    }

    pub fn line(&self, clock: usize, road: &Road) -> String {
        let cells = if self.color {
            road.cells()
                .iter()
                .map(|cell| match cell {
                    None => ".".to_string(),
                    Some(v) => self.paint(v.velocity),
                })
                .collect::<String>()
        } else {
            road.to_string()
        };
        format!("T={:03} [{}]", clock, cells)
    }

    fn paint(&self, velocity: Velocity) -> String {
        let digit = std::char::from_digit(velocity as u32, 36).unwrap_or('#');
        let colour = if velocity == 0 {
            Colour::Red
        } else if velocity < self.max_velocity {
            Colour::Yellow
        } else {
            Colour::Green
        };
        colour.paint(digit.to_string()).to_string()
    }

    /// Draws the road for the given round, then waits for the configured
    /// delay.
    pub fn draw(&self, clock: usize, road: &Road) {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let result = if self.clear {
            write!(out, "{}", CLEAR_SCREEN).and_then(|_| writeln!(out, "{}", self.line(clock, road)))
        } else {
            writeln!(out, "{}", self.line(clock, road))
        };
        if let Err(e) = result.and_then(|_| out.flush()) {
            warn!("failed drawing round {}: {}", clock, e);
        }
        if self.delay > Duration::from_millis(0) {
            thread::sleep(self.delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nasch_core::PositionedVehicle;

    #[test]
    fn plain_line_format() {
        let road = Road::from_vehicles(
            8,
            &[PositionedVehicle::new(1, 0), PositionedVehicle::new(5, 3)],
        )
        .unwrap();
        let renderer = Renderer::new(Duration::from_millis(0), 5).plain();
        assert_eq!(renderer.line(7, &road), "T=007 [.0...3..]");
        assert_eq!(renderer.line(1234, &road), "T=1234 [.0...3..]");
    }
}
