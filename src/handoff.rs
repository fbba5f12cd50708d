//! Depth-2 single-producer / single-consumer handoff between the pacer and the
//! terminal writer.
//!
//! Each slot carries a sequence pair: `published` is bumped only by the
//! producer after it stored a frame, `acknowledged` only by the consumer after
//! it wrote that frame out. A slot is ready when `published > acknowledged`
//! and free when they are equal. The payload sits behind a mutex that is never
//! contended, because the sequence pair already hands ownership back and forth.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::{debug, trace};

use crate::control::ControlState;

const SLOT_COUNT: usize = 2;

#[derive(Debug, Default)]
struct Slot {
    frame: Mutex<String>,
    published: AtomicU64,
    acknowledged: AtomicU64,
}

/// The two frame slots
#[derive(Debug, Default)]
pub struct FrameSlots {
    slots: [Slot; SLOT_COUNT],
}

impl FrameSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frame stored and not yet written out
    pub fn is_ready(&self, index: usize) -> bool {
        let slot = &self.slots[index % SLOT_COUNT];
        slot.published.load(Ordering::Acquire) > slot.acknowledged.load(Ordering::Acquire)
    }

    /// Safe for the producer to overwrite
    pub fn is_free(&self, index: usize) -> bool {
        let slot = &self.slots[index % SLOT_COUNT];
        slot.published.load(Ordering::Acquire) == slot.acknowledged.load(Ordering::Acquire)
    }

    fn store(&self, index: usize, frame: &mut String) {
        let slot = &self.slots[index % SLOT_COUNT];
        {
            let mut payload = slot.frame.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::swap(&mut *payload, frame);
        }
        frame.clear();
        slot.published.fetch_add(1, Ordering::AcqRel);
    }

    fn drain<W: Write>(&self, index: usize, out: &mut W) -> io::Result<()> {
        let slot = &self.slots[index % SLOT_COUNT];
        {
            let payload = slot.frame.lock().unwrap_or_else(|e| e.into_inner());
            out.write_all(payload.as_bytes())?;
            out.flush()?;
        }
        slot.acknowledged.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Poll `ready` every `interval` until it holds. Returns false as soon as a
/// global stop is observed.
fn wait_for(control: &ControlState, interval: Duration, ready: impl Fn() -> bool) -> bool {
    loop {
        if control.stop_requested() {
            return false;
        }
        if !control.is_paused() && ready() {
            return true;
        }
        thread::sleep(interval);
    }
}

/// Producer side: the pacer's position in the ring
#[derive(Debug)]
pub struct ProducerCursor {
    next: usize,
    poll_interval: Duration,
}

impl ProducerCursor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            next: 0,
            poll_interval,
        }
    }

    /// Publish `frame` (left empty for reuse) into the current slot, advance,
    /// then block until the following slot has been written out. Returns false
    /// when stop was requested while waiting.
    pub fn submit(
        &mut self,
        slots: &FrameSlots,
        control: &ControlState,
        frame: &mut String,
    ) -> bool {
        slots.store(self.next, frame);
        trace!("handoff: published slot {}", self.next);
        self.next = (self.next + 1) % SLOT_COUNT;
        let upcoming = self.next;
        wait_for(control, self.poll_interval, || slots.is_free(upcoming))
    }
}

/// Consumer side: the terminal writer's position in the ring
#[derive(Debug)]
pub struct ConsumerCursor {
    next: usize,
    poll_interval: Duration,
}

impl ConsumerCursor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            next: 0,
            poll_interval,
        }
    }

    /// Wait for the next slot in order and write it with a single bulk write.
    /// Returns `Ok(false)` when stop was requested first.
    pub fn drain_next<W: Write>(
        &mut self,
        slots: &FrameSlots,
        control: &ControlState,
        out: &mut W,
    ) -> io::Result<bool> {
        let current = self.next;
        if !wait_for(control, self.poll_interval, || slots.is_ready(current)) {
            return Ok(false);
        }
        slots.drain(current, out)?;
        trace!("handoff: drained slot {}", current);
        self.next = (self.next + 1) % SLOT_COUNT;
        Ok(true)
    }
}

/// Terminal writer thread body: drain slots in strict alternation until stop
pub fn run_writer<W: Write>(
    slots: &FrameSlots,
    control: &ControlState,
    out: &mut W,
    poll_interval: Duration,
) -> io::Result<u64> {
    let mut cursor = ConsumerCursor::new(poll_interval);
    let mut written = 0u64;
    while cursor.drain_next(slots, control, out)? {
        written += 1;
    }
    debug!("writer: stopped after {} frames", written);
    Ok(written)
}
