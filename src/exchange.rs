//! Double-buffered hand-off of the latest frame between threads.
//!
//! The producer (capture thread) and a consumer (preview, screenshot) share
//! two [`CaptureFrame`] slots. One slot is written while the other holds the
//! most recent complete frame. Only the role swap is done under the state
//! lock; frame bytes are copied outside of it.
//!
//! At most one frame is pending. If the consumer does not take between two
//! pushes, the older frame is dropped.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::frame::CaptureFrame;

#[derive(Debug)]
struct SlotState {
    write_index: usize,
    read_index: usize,
    /// The read slot holds a frame the consumer has not taken yet
    fresh: bool,
    /// The consumer is copying out of `read_index`
    reading: bool,
    /// A push completed while the consumer was reading; swap when it is done
    swap_pending: bool,
}

impl SlotState {
    fn swap(&mut self) {
        std::mem::swap(&mut self.write_index, &mut self.read_index);
        self.fresh = true;
        self.swap_pending = false;
    }
}

/// Latest-frame exchange between one producer and one consumer.
#[derive(Debug)]
pub struct FrameExchange {
    width: u32,
    height: u32,
    slots: [Mutex<CaptureFrame>; 2],
    state: Mutex<SlotState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FrameExchange {
    /// Allocate both slots for frames of `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            slots: [
                Mutex::new(CaptureFrame::new(width, height)),
                Mutex::new(CaptureFrame::new(width, height)),
            ],
            state: Mutex::new(SlotState {
                write_index: 0,
                read_index: 1,
                fresh: false,
                reading: false,
                swap_pending: false,
            }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Publish a copy of `frame` as the latest frame.
    ///
    /// Returns false without copying if the geometry does not match.
    pub fn push(&self, frame: &CaptureFrame) -> bool {
        if frame.width() != self.width || frame.height() != self.height {
            return false;
        }

        let index = {
            let mut state = lock(&self.state);
            // A deferred swap from the previous push is superseded; the
            // write slot is about to be overwritten with a newer frame.
            state.swap_pending = false;
            state.write_index
        };

        lock(&self.slots[index]).copy_from(frame);

        let mut state = lock(&self.state);
        if state.reading {
            state.swap_pending = true;
        } else {
            state.swap();
        }
        true
    }

    /// Copy the latest frame into `out` if one arrived since the last take.
    ///
    /// Returns false and leaves `out` untouched when nothing new is pending.
    pub fn try_take_latest(&self, out: &mut CaptureFrame) -> bool {
        let index = {
            let mut state = lock(&self.state);
            if !state.fresh {
                return false;
            }
            state.fresh = false;
            state.reading = true;
            state.read_index
        };

        out.copy_from(&lock(&self.slots[index]));

        let mut state = lock(&self.state);
        state.reading = false;
        if state.swap_pending {
            state.swap();
        }
        true
    }

    /// Whether a frame is waiting to be taken.
    pub fn has_new_frame(&self) -> bool {
        lock(&self.state).fresh
    }
}
