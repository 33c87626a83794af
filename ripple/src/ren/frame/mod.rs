//! Frame pacing independent of the graphics API.
//!
//! [`FrameRing`] rotates a fixed set of per-frame slots by a monotonically increasing
//! frame number. [`FrameScheduler`] drives one frame through a [`FrameBackend`]:
//! wait for the slot, recycle its transient resources, acquire a presentable image,
//! record, submit and present. Resize requests are only honoured between frames.

use crate::error::Result;

/// Outcome of asking the presentation engine for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Image(u32),
    /// Usable, but the chain no longer matches the surface exactly.
    Suboptimal(u32),
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Ok,
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotPhase {
    Idle,
    Recording,
    Submitted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The acquire came back stale; nothing was recorded and the frame number did not move.
    Aborted,
    /// Rendering is paused (minimized window).
    Skipped,
}

struct FrameSlot<T> {
    data: T,
    phase: SlotPhase,
    frame_number: Option<u64>,
}

pub struct FrameRing<T> {
    slots: Vec<FrameSlot<T>>,
    frame_number: u64,
}

impl<T> FrameRing<T> {
    pub fn new(slots: Vec<T>) -> Self {
        assert!(!slots.is_empty(), "ripple::ren::frame - a frame ring needs at least one slot");
        Self {
            slots: slots
                .into_iter()
                .map(|data| FrameSlot { data, phase: SlotPhase::Idle, frame_number: None })
                .collect(),
            frame_number: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn current_index(&self) -> usize {
        (self.frame_number % self.slots.len() as u64) as usize
    }

    pub fn current(&self) -> &T {
        &self.slots[self.current_index()].data
    }

    pub fn current_mut(&mut self) -> &mut T {
        let index = self.current_index();
        &mut self.slots[index].data
    }

    pub fn phase(&self, index: usize) -> SlotPhase {
        self.slots[index].phase
    }

    /// Frame number the slot last submitted, if any.
    pub fn last_submitted(&self, index: usize) -> Option<u64> {
        self.slots[index].frame_number
    }

    pub fn submitted_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.phase == SlotPhase::Submitted).count()
    }

    /// Marks the current slot's previous GPU work as complete.
    pub fn retire_current(&mut self) {
        let index = self.current_index();
        self.slots[index].phase = SlotPhase::Idle;
    }

    pub fn begin_recording(&mut self) {
        let index = self.current_index();
        debug_assert_eq!(self.slots[index].phase, SlotPhase::Idle, "slot reused before its fence was waited on");
        self.slots[index].phase = SlotPhase::Recording;
    }

    pub fn submit(&mut self) {
        let index = self.current_index();
        let slot = &mut self.slots[index];
        debug_assert_eq!(slot.phase, SlotPhase::Recording);
        slot.phase = SlotPhase::Submitted;
        slot.frame_number = Some(self.frame_number);
    }

    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots.iter_mut().map(|slot| &mut slot.data)
    }
}

/// The API-specific half of a frame. Every method receives the slot the ring
/// selected for the current frame number.
pub trait FrameBackend {
    type Slot;

    /// Blocks until the slot's previous submission has completed on the GPU.
    fn wait(&mut self, slot: &mut Self::Slot) -> Result<()>;
    /// Releases transient per-frame resources. Only called after [`FrameBackend::wait`].
    fn recycle(&mut self, slot: &mut Self::Slot) -> Result<()>;
    fn acquire(&mut self, slot: &mut Self::Slot) -> Result<Acquire>;
    fn record(&mut self, slot: &mut Self::Slot, image_index: u32) -> Result<()>;
    fn submit(&mut self, slot: &mut Self::Slot) -> Result<()>;
    fn present(&mut self, slot: &mut Self::Slot, image_index: u32) -> Result<Presented>;
    fn resize(&mut self) -> Result<()>;
}

pub struct FrameScheduler<T> {
    ring: FrameRing<T>,
    resize_requested: bool,
    paused: bool,
    /// Set while the surface is zero-sized; only a non-zero resize clears it.
    minimized: bool,
}

impl<T> FrameScheduler<T> {
    pub fn new(slots: Vec<T>) -> Self {
        Self { ring: FrameRing::new(slots), resize_requested: false, paused: false, minimized: false }
    }

    pub fn ring(&self) -> &FrameRing<T> {
        &self.ring
    }

    pub fn ring_mut(&mut self) -> &mut FrameRing<T> {
        &mut self.ring
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// Records a new surface size. A zero-sized surface halts rendering until a
    /// non-zero size arrives, which then schedules a resize.
    pub fn surface_resized(&mut self, zero_sized: bool) {
        self.minimized = zero_sized;
        if !zero_sized {
            self.resize_requested = true;
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn paused(&self) -> bool {
        self.paused || self.minimized
    }

    pub fn draw_frame<B>(&mut self, backend: &mut B) -> Result<FrameOutcome>
    where
        B: FrameBackend<Slot = T>,
    {
        if self.paused() {
            return Ok(FrameOutcome::Skipped);
        }

        if self.resize_requested {
            backend.resize()?;
            self.resize_requested = false;
        }

        backend.wait(self.ring.current_mut())?;
        self.ring.retire_current();
        backend.recycle(self.ring.current_mut())?;

        let image_index = match backend.acquire(self.ring.current_mut())? {
            Acquire::Image(index) => index,
            Acquire::Suboptimal(index) => {
                self.resize_requested = true;
                index
            }
            Acquire::Stale => {
                self.resize_requested = true;
                return Ok(FrameOutcome::Aborted);
            }
        };

        self.ring.begin_recording();
        backend.record(self.ring.current_mut(), image_index)?;
        backend.submit(self.ring.current_mut())?;
        self.ring.submit();

        if backend.present(self.ring.current_mut(), image_index)? == Presented::Stale {
            self.resize_requested = true;
        }

        self.ring.advance();
        Ok(FrameOutcome::Presented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Recycle(usize),
        Acquire(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        Resize,
    }

    #[derive(Default)]
    struct MockBackend {
        calls: Vec<Call>,
        acquires: VecDeque<Acquire>,
        presents: VecDeque<Presented>,
        // slot index -> frame it is still executing
        in_flight: Vec<Option<usize>>,
    }

    impl MockBackend {
        fn new(slots: usize) -> Self {
            Self { in_flight: vec![None; slots], ..Default::default() }
        }

        fn records(&self) -> usize {
            self.calls.iter().filter(|call| matches!(call, Call::Record(..))).count()
        }
    }

    impl FrameBackend for MockBackend {
        type Slot = usize;

        fn wait(&mut self, slot: &mut usize) -> Result<()> {
            self.in_flight[*slot] = None;
            self.calls.push(Call::Wait(*slot));
            Ok(())
        }

        fn recycle(&mut self, slot: &mut usize) -> Result<()> {
            assert!(self.in_flight[*slot].is_none(), "recycled a slot that is still in flight");
            self.calls.push(Call::Recycle(*slot));
            Ok(())
        }

        fn acquire(&mut self, slot: &mut usize) -> Result<Acquire> {
            self.calls.push(Call::Acquire(*slot));
            Ok(self.acquires.pop_front().unwrap_or(Acquire::Image(0)))
        }

        fn record(&mut self, slot: &mut usize, image_index: u32) -> Result<()> {
            self.calls.push(Call::Record(*slot, image_index));
            Ok(())
        }

        fn submit(&mut self, slot: &mut usize) -> Result<()> {
            self.in_flight[*slot] = Some(self.calls.len());
            self.calls.push(Call::Submit(*slot));
            Ok(())
        }

        fn present(&mut self, slot: &mut usize, image_index: u32) -> Result<Presented> {
            self.calls.push(Call::Present(*slot, image_index));
            Ok(self.presents.pop_front().unwrap_or(Presented::Ok))
        }

        fn resize(&mut self) -> Result<()> {
            self.calls.push(Call::Resize);
            Ok(())
        }
    }

    fn scheduler(slots: usize) -> FrameScheduler<usize> {
        FrameScheduler::new((0..slots).collect())
    }

    #[test]
    fn current_index_wraps_by_frame_number() {
        let mut ring = FrameRing::new(vec!['a', 'b']);
        let mut seen = vec![];
        for _ in 0..5 {
            seen.push((ring.frame_number(), ring.current_index(), *ring.current()));
            ring.advance();
        }
        assert_eq!(
            seen,
            vec![(0, 0, 'a'), (1, 1, 'b'), (2, 0, 'a'), (3, 1, 'b'), (4, 0, 'a')]
        );
    }

    #[test]
    fn slots_follow_idle_recording_submitted_cycle() {
        let mut ring = FrameRing::new(vec![(), ()]);
        assert_eq!(ring.phase(0), SlotPhase::Idle);

        ring.begin_recording();
        assert_eq!(ring.phase(0), SlotPhase::Recording);
        ring.submit();
        assert_eq!(ring.phase(0), SlotPhase::Submitted);
        assert_eq!(ring.last_submitted(0), Some(0));
        ring.advance();

        ring.begin_recording();
        ring.submit();
        ring.advance();
        assert_eq!(ring.submitted_count(), 2);

        ring.retire_current();
        assert_eq!(ring.phase(0), SlotPhase::Idle);
        assert_eq!(ring.submitted_count(), 1);
    }

    #[test]
    fn never_more_than_ring_size_in_flight() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);

        for _ in 0..7 {
            assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
            assert!(scheduler.ring().submitted_count() <= 2);
        }
        assert_eq!(scheduler.ring().frame_number(), 7);
    }

    #[test]
    fn slot_is_waited_on_before_reuse() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);

        for _ in 0..4 {
            scheduler.draw_frame(&mut backend).unwrap();
        }

        let slot_calls: Vec<_> = backend
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Wait(0) | Call::Submit(0)))
            .copied()
            .collect();
        assert_eq!(slot_calls, vec![Call::Wait(0), Call::Submit(0), Call::Wait(0), Call::Submit(0)]);
    }

    #[test]
    fn frame_order_within_a_slot() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(Acquire::Image(3));

        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Recycle(0),
                Call::Acquire(0),
                Call::Record(0, 3),
                Call::Submit(0),
                Call::Present(0, 3),
            ]
        );
    }

    #[test]
    fn stale_acquire_defers_resize_to_next_frame() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(Acquire::Stale);

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Aborted);
        assert!(scheduler.resize_requested());
        assert_eq!(backend.records(), 0);
        assert_eq!(scheduler.ring().frame_number(), 0);
        assert_eq!(scheduler.ring().phase(0), SlotPhase::Idle);

        let before = backend.calls.len();
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.calls[before], Call::Resize);
        assert!(!scheduler.resize_requested());
        // the aborted frame reuses slot 0
        assert_eq!(backend.calls[before + 1], Call::Wait(0));
        assert_eq!(scheduler.ring().frame_number(), 1);
    }

    #[test]
    fn suboptimal_and_stale_present_flag_resize() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);
        backend.acquires.push_back(Acquire::Suboptimal(1));

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert!(backend.calls.contains(&Call::Record(0, 1)));
        assert!(scheduler.resize_requested());

        scheduler.draw_frame(&mut backend).unwrap();
        assert!(!scheduler.resize_requested());

        backend.presents.push_back(Presented::Stale);
        scheduler.draw_frame(&mut backend).unwrap();
        assert!(scheduler.resize_requested());
        assert_eq!(scheduler.ring().frame_number(), 3);
    }

    #[test]
    fn paused_scheduler_touches_nothing() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);
        scheduler.set_paused(true);
        scheduler.request_resize();

        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert!(backend.calls.is_empty());

        scheduler.set_paused(false);
        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(backend.calls[0], Call::Resize);
    }

    #[test]
    fn zero_sized_surface_waits_for_a_real_size() {
        let mut scheduler = scheduler(2);
        let mut backend = MockBackend::new(2);
        scheduler.surface_resized(true);

        // regaining visibility is not enough while the surface has no area
        scheduler.set_paused(false);
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Skipped);
        assert!(backend.calls.is_empty());

        scheduler.surface_resized(false);
        assert!(!scheduler.paused());
        assert_eq!(scheduler.draw_frame(&mut backend).unwrap(), FrameOutcome::Presented);
        assert_eq!(backend.calls[0], Call::Resize);
    }
}
