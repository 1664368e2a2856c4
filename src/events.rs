//! Renderer-to-host event queue
//!
//! The renderer never calls back into the host. Anything it wants the host
//! to know lands in a shared queue the host drains at its own pace, from any
//! thread.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

/// Notification emitted by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderEvent {
    /// No skin is set; frames render as background-only clears.
    SkinMissing,
    /// The submitted skin bitmap could not be classified as any known layout.
    SkinUnsupported,
    /// A skin swap was reconciled and the avatar rebuilt.
    SkinReloaded,
    /// The submitted cape bitmap does not have the 2:1 cape proportions.
    CapeUnsupported,
    /// Frames rendered over the last whole second.
    Fps(u32),
}

/// Cloneable handle to the shared event queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<Mutex<VecDeque<RenderEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: RenderEvent) {
        self.inner.lock().push_back(event);
    }

    /// Pop the oldest pending event, if any.
    pub fn poll(&self) -> Option<RenderEvent> {
        self.inner.lock().pop_front()
    }

    /// Drain every pending event in arrival order.
    pub fn drain(&self) -> Vec<RenderEvent> {
        self.inner.lock().drain(..).collect()
    }
}

/// Frame counter that reports once per elapsed wall-clock second.
#[derive(Debug, Default)]
pub struct FpsCounter {
    frames: u32,
    elapsed: f64,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame; returns the frame count when a second has passed.
    /// The overshoot past the second carries into the next interval.
    pub fn tick(&mut self, delta_seconds: f64) -> Option<u32> {
        self.frames += 1;
        self.elapsed += delta_seconds;
        if self.elapsed < 1.0 {
            return None;
        }
        let frames = self.frames;
        self.frames = 0;
        self.elapsed -= 1.0;
        Some(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_arrive_in_order() {
        let queue = EventQueue::new();
        queue.push(RenderEvent::SkinMissing);
        queue.push(RenderEvent::Fps(60));
        assert_eq!(queue.poll(), Some(RenderEvent::SkinMissing));
        assert_eq!(queue.poll(), Some(RenderEvent::Fps(60)));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn fps_counter_carries_the_overshoot() {
        let mut counter = FpsCounter::new();
        // Three 0.4 s frames overshoot the second by 0.2 s.
        assert_eq!(counter.tick(0.4), None);
        assert_eq!(counter.tick(0.4), None);
        assert_eq!(counter.tick(0.4), Some(3));
        // The remainder counts toward the next interval: 0.2 + 2*0.4 >= 1.0.
        assert_eq!(counter.tick(0.4), None);
        assert_eq!(counter.tick(0.4), Some(2));
    }

    #[test]
    fn handles_share_one_queue() {
        let queue = EventQueue::new();
        let other = queue.clone();
        other.push(RenderEvent::SkinReloaded);
        assert_eq!(queue.drain(), vec![RenderEvent::SkinReloaded]);
        assert!(queue.drain().is_empty());
    }
}
