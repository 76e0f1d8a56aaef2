//! Decoding off the realtime thread.
//!
//! A [`Feed`] runs a source chain on its own `playback-feed` thread and
//! hands finished blocks to the output over a bounded channel. The output
//! side never waits: when no block is ready it plays silence and tries again
//! on the next callback, so a stalled network read only ever stalls the
//! feed thread.
//!
//! Dropping the feed closes the channel. The thread notices on its next
//! send and drops the chain, and with it any file or connection underneath.

use std::io;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded};

use super::source::{Frame, Source, fill};

/// Frames decoded per block.
const BLOCK_FRAMES: usize = 1024;

/// Blocks buffered ahead of the output, about 190 ms at 44.1 kHz.
const BLOCKS_AHEAD: usize = 8;

/// Non-blocking reader over a chain decoded on a `playback-feed` thread.
///
/// Pulls always fill the whole buffer while the chain is alive, padding
/// with silence when the feed thread has fallen behind. Once the chain has
/// ended and everything it produced has been played, pulls return 0.
pub struct Feed {
    rx: Receiver<Vec<Frame>>,
    block: Vec<Frame>,
    pos: usize,
    underruns: u64,
}

impl Feed {
    /// Start decoding `source` on a new thread.
    pub fn spawn(source: Box<dyn Source>, session: u64) -> io::Result<Self> {
        let (tx, rx) = bounded(BLOCKS_AHEAD);
        thread::Builder::new()
            .name("playback-feed".to_string())
            .spawn(move || produce(source, tx, session))?;
        Ok(Self {
            rx,
            block: Vec::new(),
            pos: 0,
            underruns: 0,
        })
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        if self.underruns > 0 {
            tracing::debug!(underruns = self.underruns, "Feed closed after underruns");
        }
    }
}

fn produce(mut source: Box<dyn Source>, tx: Sender<Vec<Frame>>, session: u64) {
    loop {
        let mut block = vec![[0.0; 2]; BLOCK_FRAMES];
        let n = fill(&mut source, &mut block);
        if n < BLOCK_FRAMES {
            match source.error() {
                Some(e) => tracing::warn!(session, error = %e, "Playback stopped on stream error"),
                None => tracing::debug!(session, "Source exhausted"),
            }
        }
        block.truncate(n);
        if n > 0 && tx.send(block).is_err() {
            tracing::debug!(session, "Feed detached");
            return;
        }
        if n < BLOCK_FRAMES {
            // Dropping `tx` tells the output the chain has ended
            return;
        }
    }
}

impl Source for Feed {
    fn pull(&mut self, frames: &mut [Frame]) -> usize {
        let mut written = 0;
        while written < frames.len() {
            if self.pos >= self.block.len() {
                match self.rx.try_recv() {
                    Ok(block) => {
                        self.block = block;
                        self.pos = 0;
                        continue;
                    }
                    Err(TryRecvError::Empty) => {
                        self.underruns += 1;
                        frames[written..].fill([0.0; 2]);
                        return frames.len();
                    }
                    Err(TryRecvError::Disconnected) => return written,
                }
            }
            let n = (frames.len() - written).min(self.block.len() - self.pos);
            frames[written..written + n].copy_from_slice(&self.block[self.pos..self.pos + n]);
            self.pos += n;
            written += n;
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ConstantSource;
    use std::time::{Duration, Instant};

    /// Pull until the feed reports the end, collecting everything played.
    fn drain(feed: &mut Feed) -> Vec<Frame> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut played = Vec::new();
        let mut buf = [[0.0; 2]; 300];
        loop {
            let n = feed.pull(&mut buf);
            played.extend_from_slice(&buf[..n]);
            if n < buf.len() {
                return played;
            }
            assert!(Instant::now() < deadline, "feed never ended");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_feed_delivers_every_frame_then_ends() {
        let mut feed = Feed::spawn(Box::new(ConstantSource::new(0.5, 5000)), 1).unwrap();
        let played = drain(&mut feed);

        let audible = played.iter().filter(|f| **f == [0.5, 0.5]).count();
        assert_eq!(audible, 5000);
        // Underrun padding is silence, never stale audio
        assert!(played.iter().all(|f| *f == [0.5, 0.5] || *f == [0.0, 0.0]));
    }

    #[test]
    fn test_empty_source_ends_immediately() {
        let mut feed = Feed::spawn(Box::new(ConstantSource::new(0.5, 0)), 1).unwrap();
        assert!(drain(&mut feed).iter().all(|f| *f == [0.0, 0.0]));
    }

    /// A source whose pull parks until released, like a stalled socket.
    struct Stalled(Receiver<()>);

    impl Source for Stalled {
        fn pull(&mut self, _frames: &mut [Frame]) -> usize {
            let _ = self.0.recv();
            0
        }
    }

    #[test]
    fn test_stalled_source_plays_silence_without_blocking() {
        let (release, stalled) = bounded(1);
        let mut feed = Feed::spawn(Box::new(Stalled(stalled)), 1).unwrap();

        let started = Instant::now();
        let mut buf = [[1.0; 2]; 512];
        for _ in 0..10 {
            assert_eq!(feed.pull(&mut buf), buf.len());
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(buf.iter().all(|f| *f == [0.0, 0.0]));
        assert_eq!(feed.underruns, 10);

        drop(release);
        drain(&mut feed);
    }
}
