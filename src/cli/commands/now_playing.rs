//! The now-playing status line.
//!
//! Polls the player at the configured refresh rate and redraws one terminal
//! line: status, position, a progress bar (or listening time for radio) and
//! the visualizer bands. Line commands on stdin control playback:
//! `p` toggles pause, `s` stops, `q` quits.

use std::io::{self, BufRead, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};

use crate::player::{PlaybackStatus, Player, Stopwatch, format_duration};

const BAR_LEVELS: [char; 9] = [' ', '▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const PROGRESS_WIDTH: usize = 24;

/// What is on air, for display.
pub enum Showing {
    Track(String),
    Station(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    TogglePause,
    Stop,
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" => Some(Input::TogglePause),
        "s" | "stop" => Some(Input::Stop),
        "q" | "quit" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

/// Forward stdin lines as commands. The thread ends with stdin.
fn spawn_input_reader() -> io::Result<Receiver<Input>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-commands".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if let Some(input) = parse_input(&line)
                    && tx.send(input).is_err()
                {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Drive the status line until playback ends or the user quits.
pub fn run(player: &Player, showing: Showing, refresh_hz: u32) -> anyhow::Result<()> {
    let refresh = Duration::from_secs_f64(1.0 / f64::from(refresh_hz.clamp(1, 120)));
    let mut inputs = Some(spawn_input_reader()?);
    let mut listening = Stopwatch::started(Instant::now());
    let mut stdout = io::stdout();

    let (label, radio) = match &showing {
        Showing::Track(title) => (title.as_str(), false),
        Showing::Station(name) => (name.as_str(), true),
    };
    writeln!(stdout, "▶ {}  (p = pause, s = stop, q = quit)", label)?;

    loop {
        let input = match &inputs {
            Some(rx) => rx.recv_timeout(refresh),
            None => {
                thread::sleep(refresh);
                Err(RecvTimeoutError::Timeout)
            }
        };
        match input {
            Ok(Input::TogglePause) => {
                player.toggle_pause();
                let now = Instant::now();
                if player.is_playing() {
                    listening.resume(now);
                } else {
                    listening.pause(now);
                }
            }
            Ok(Input::Stop) | Ok(Input::Quit) => {
                player.stop();
                break;
            }
            // Stdin closed: keep playing, just stop listening for commands
            Err(RecvTimeoutError::Disconnected) => inputs = None,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let status = player.status();
        if matches!(status, PlaybackStatus::Finished | PlaybackStatus::Stopped) {
            break;
        }

        let timing = if radio {
            format!("listening {}", format_duration(listening.elapsed(Instant::now())))
        } else if player.duration().is_zero() {
            format_duration(player.position())
        } else {
            format!(
                "{} / {} {}",
                format_duration(player.position()),
                format_duration(player.duration()),
                progress_bar(player.progress(), PROGRESS_WIDTH)
            )
        };
        let hint = if player.is_paused() { "  (p = resume)" } else { "" };
        write!(
            stdout,
            "\r\x1b[2K{:<8} {}  {}{}",
            status.label(),
            timing,
            bars(&player.audio_samples()),
            hint
        )?;
        stdout.flush()?;
    }

    writeln!(stdout)?;
    writeln!(stdout, "{}", player.status().label())?;
    Ok(())
}

/// One block character per band, louder = taller.
pub fn bars(samples: &[f32]) -> String {
    samples
        .iter()
        .map(|&v| {
            let level = (v * 2.0).clamp(0.0, 1.0);
            BAR_LEVELS[(level * (BAR_LEVELS.len() - 1) as f32).round() as usize]
        })
        .collect()
}

/// A fixed-width `[####----]` bar for `fraction` in `0.0..=1.0`.
pub fn progress_bar(fraction: f64, width: usize) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::BANDS;

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("p\n"), Some(Input::TogglePause));
        assert_eq!(parse_input(" S "), Some(Input::Stop));
        assert_eq!(parse_input("quit"), Some(Input::Quit));
        assert_eq!(parse_input("x"), None);
    }

    #[test]
    fn test_bars_shape() {
        assert_eq!(bars(&vec![0.0; BANDS]), " ".repeat(BANDS));
        assert_eq!(bars(&[0.0, 0.25, 1.0]), " ▄█");
        assert_eq!(bars(&[]).chars().count(), 0);
    }

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0.0, 4), "[----]");
        assert_eq!(progress_bar(0.5, 4), "[##--]");
        assert_eq!(progress_bar(1.0, 4), "[####]");
        assert_eq!(progress_bar(7.0, 4), "[####]");
    }
}
