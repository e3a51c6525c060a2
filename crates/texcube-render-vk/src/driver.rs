// SPDX-License-Identifier: CEPL-1.0
//! Steady-state frame loop as an explicit state machine.
//!
//! Out-of-date swapchains move the driver to `Resizing`, rebuild through the
//! backend and land back in `Prepared`; nothing recurses.

use anyhow::{bail, Result};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Uninitialized,
    Prepared,
    Rendering,
    Resizing,
    Destroyed,
}

#[derive(Debug)]
pub enum AcquireOutcome<T> {
    Ready {
        index: u32,
        suboptimal: bool,
        ticket: T,
    },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Optimal,
    Suboptimal,
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Image drawn and presented.
    Presented { index: u32, suboptimal: bool },
    /// Acquire reported out-of-date; rebuilt, nothing drawn.
    Rebuilt,
    /// Presented, then rebuilt because present reported out-of-date.
    PresentedThenRebuilt { index: u32 },
    /// Not prepared; nothing happened.
    Skipped,
}

/// The GPU side of a frame. `Ticket` carries per-frame sync objects from
/// acquire through present.
pub trait FrameBackend {
    type Ticket;

    fn update_uniform(&mut self, spin_angle: f32) -> Result<()>;
    fn acquire(&mut self) -> Result<AcquireOutcome<Self::Ticket>>;
    fn submit(&mut self, index: u32, ticket: &Self::Ticket) -> Result<()>;
    fn present(&mut self, index: u32, ticket: &Self::Ticket) -> Result<PresentOutcome>;
    fn wait_idle(&mut self) -> Result<()>;
    /// Tear down everything swapchain-dependent and build it again.
    fn rebuild(&mut self) -> Result<()>;
}

#[derive(Debug)]
pub struct FrameDriver {
    state: FrameState,
    current_image: u32,
    spin_angle: f32,
    spin_increment: f32,
    rebuilds: u32,
}

impl FrameDriver {
    pub fn new(spin_increment: f32) -> Self {
        FrameDriver {
            state: FrameState::Uninitialized,
            current_image: 0,
            spin_angle: 0.0,
            spin_increment,
            rebuilds: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn is_prepared(&self) -> bool {
        matches!(self.state, FrameState::Prepared | FrameState::Rendering)
    }

    pub fn current_image(&self) -> u32 {
        self.current_image
    }

    pub fn spin_angle(&self) -> f32 {
        self.spin_angle
    }

    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }

    /// First build. Same procedure as a resize.
    pub fn prepare<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        match self.state {
            FrameState::Uninitialized => self.rebuild(backend),
            FrameState::Destroyed => bail!("prepare after destroy"),
            _ => Ok(()),
        }
    }

    pub fn request_resize<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        if !self.is_prepared() {
            debug!("resize ignored in {:?}", self.state);
            return Ok(());
        }
        self.rebuild(backend)
    }

    fn rebuild<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        self.state = FrameState::Resizing;
        backend.rebuild()?;
        self.current_image = 0;
        self.rebuilds += 1;
        self.state = FrameState::Prepared;
        Ok(())
    }

    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> Result<FrameOutcome> {
        if !self.is_prepared() {
            return Ok(FrameOutcome::Skipped);
        }
        self.state = FrameState::Rendering;

        backend.update_uniform(self.spin_angle)?;
        self.spin_angle += self.spin_increment;

        let (index, suboptimal, ticket) = match backend.acquire()? {
            AcquireOutcome::Ready {
                index,
                suboptimal,
                ticket,
            } => (index, suboptimal, ticket),
            AcquireOutcome::OutOfDate => {
                info!("swapchain out of date on acquire; rebuilding");
                self.rebuild(backend)?;
                return Ok(FrameOutcome::Rebuilt);
            }
        };
        self.current_image = index;

        backend.submit(index, &ticket)?;
        let presented = backend.present(index, &ticket)?;
        backend.wait_idle()?;
        drop(ticket);

        match presented {
            PresentOutcome::OutOfDate => {
                info!("swapchain out of date on present; rebuilding");
                self.rebuild(backend)?;
                Ok(FrameOutcome::PresentedThenRebuilt { index })
            }
            PresentOutcome::Suboptimal => Ok(FrameOutcome::Presented {
                index,
                suboptimal: true,
            }),
            PresentOutcome::Optimal => Ok(FrameOutcome::Presented { index, suboptimal }),
        }
    }

    /// Drains the queue and marks the driver dead; resources go with the backend.
    pub fn destroy<B: FrameBackend>(&mut self, backend: &mut B) -> Result<()> {
        if self.state == FrameState::Destroyed {
            return Ok(());
        }
        self.state = FrameState::Destroyed;
        backend.wait_idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Uniform(f32),
        Acquire,
        Submit(u32),
        Present(u32),
        WaitIdle,
        Rebuild,
    }

    struct MockBackend {
        calls: Vec<Call>,
        acquires: VecDeque<AcquireOutcome<()>>,
        presents: VecDeque<PresentOutcome>,
        extent: (u32, u32),
        surface_extent: (u32, u32),
        image_count: u32,
        fail_rebuild: bool,
    }

    impl MockBackend {
        fn new() -> Self {
            MockBackend {
                calls: Vec::new(),
                acquires: VecDeque::new(),
                presents: VecDeque::new(),
                extent: (0, 0),
                surface_extent: (800, 600),
                image_count: 0,
                fail_rebuild: false,
            }
        }

        fn submits(&self) -> usize {
            self.calls
                .iter()
                .filter(|c| matches!(c, Call::Submit(_)))
                .count()
        }
    }

    impl FrameBackend for MockBackend {
        type Ticket = ();

        fn update_uniform(&mut self, spin_angle: f32) -> Result<()> {
            self.calls.push(Call::Uniform(spin_angle));
            Ok(())
        }

        fn acquire(&mut self) -> Result<AcquireOutcome<()>> {
            self.calls.push(Call::Acquire);
            Ok(self.acquires.pop_front().unwrap_or(AcquireOutcome::Ready {
                index: 0,
                suboptimal: false,
                ticket: (),
            }))
        }

        fn submit(&mut self, index: u32, _ticket: &()) -> Result<()> {
            self.calls.push(Call::Submit(index));
            Ok(())
        }

        fn present(&mut self, index: u32, _ticket: &()) -> Result<PresentOutcome> {
            self.calls.push(Call::Present(index));
            Ok(self.presents.pop_front().unwrap_or(PresentOutcome::Optimal))
        }

        fn wait_idle(&mut self) -> Result<()> {
            self.calls.push(Call::WaitIdle);
            Ok(())
        }

        fn rebuild(&mut self) -> Result<()> {
            self.calls.push(Call::Rebuild);
            if self.fail_rebuild {
                bail!("no memory type");
            }
            self.extent = self.surface_extent;
            self.image_count = 3;
            Ok(())
        }
    }

    fn prepared() -> (FrameDriver, MockBackend) {
        let mut d = FrameDriver::new(0.5);
        let mut b = MockBackend::new();
        d.prepare(&mut b).unwrap();
        b.calls.clear();
        (d, b)
    }

    #[test]
    fn starts_uninitialized_and_prepare_builds_once() {
        let mut d = FrameDriver::new(0.01);
        let mut b = MockBackend::new();
        assert_eq!(d.state(), FrameState::Uninitialized);
        assert_eq!(d.draw_frame(&mut b).unwrap(), FrameOutcome::Skipped);
        assert!(b.calls.is_empty());

        d.prepare(&mut b).unwrap();
        d.prepare(&mut b).unwrap();
        assert_eq!(d.state(), FrameState::Prepared);
        assert_eq!(b.calls, vec![Call::Rebuild]);
    }

    #[test]
    fn normal_frame_sequence() {
        let (mut d, mut b) = prepared();
        b.acquires.push_back(AcquireOutcome::Ready {
            index: 2,
            suboptimal: false,
            ticket: (),
        });
        let out = d.draw_frame(&mut b).unwrap();
        assert_eq!(
            out,
            FrameOutcome::Presented {
                index: 2,
                suboptimal: false
            }
        );
        assert_eq!(
            b.calls,
            vec![
                Call::Uniform(0.0),
                Call::Acquire,
                Call::Submit(2),
                Call::Present(2),
                Call::WaitIdle
            ]
        );
        assert_eq!(d.state(), FrameState::Rendering);
        assert_eq!(d.current_image(), 2);
    }

    #[test]
    fn spin_angle_advances_every_frame() {
        let (mut d, mut b) = prepared();
        for _ in 0..3 {
            d.draw_frame(&mut b).unwrap();
        }
        let angles: Vec<f32> = b
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Uniform(a) => Some(*a),
                _ => None,
            })
            .collect();
        assert_eq!(angles, vec![0.0, 0.5, 1.0]);
        assert_eq!(d.spin_angle(), 1.5);
    }

    #[test]
    fn out_of_date_acquire_rebuilds_without_drawing() {
        let (mut d, mut b) = prepared();
        b.surface_extent = (1024, 768);
        b.acquires.push_back(AcquireOutcome::OutOfDate);

        let out = d.draw_frame(&mut b).unwrap();
        assert_eq!(out, FrameOutcome::Rebuilt);
        assert_eq!(b.submits(), 0);
        assert!(b.calls.contains(&Call::Rebuild));
        assert!(d.is_prepared());
        assert_eq!(d.state(), FrameState::Prepared);
        assert_eq!(b.extent, (1024, 768));

        // next tick draws normally
        assert!(matches!(
            d.draw_frame(&mut b).unwrap(),
            FrameOutcome::Presented { .. }
        ));
        assert_eq!(b.submits(), 1);
    }

    #[test]
    fn suboptimal_acquire_still_draws() {
        let (mut d, mut b) = prepared();
        b.acquires.push_back(AcquireOutcome::Ready {
            index: 1,
            suboptimal: true,
            ticket: (),
        });
        assert_eq!(
            d.draw_frame(&mut b).unwrap(),
            FrameOutcome::Presented {
                index: 1,
                suboptimal: true
            }
        );
        assert_eq!(b.submits(), 1);
        assert!(!b.calls.contains(&Call::Rebuild));
    }

    #[test]
    fn out_of_date_present_rebuilds_after_waiting() {
        let (mut d, mut b) = prepared();
        b.presents.push_back(PresentOutcome::OutOfDate);
        let out = d.draw_frame(&mut b).unwrap();
        assert_eq!(out, FrameOutcome::PresentedThenRebuilt { index: 0 });
        let wait = b.calls.iter().position(|c| *c == Call::WaitIdle).unwrap();
        let rebuild = b.calls.iter().position(|c| *c == Call::Rebuild).unwrap();
        assert!(wait < rebuild);
        assert_eq!(d.state(), FrameState::Prepared);
    }

    #[test]
    fn suboptimal_present_is_not_a_rebuild() {
        let (mut d, mut b) = prepared();
        b.presents.push_back(PresentOutcome::Suboptimal);
        assert!(matches!(
            d.draw_frame(&mut b).unwrap(),
            FrameOutcome::Presented {
                suboptimal: true,
                ..
            }
        ));
        assert_eq!(d.rebuilds(), 1);
    }

    #[test]
    fn repeated_rebuild_is_structurally_stable() {
        let (mut d, mut b) = prepared();
        let before = (b.extent, b.image_count);
        d.request_resize(&mut b).unwrap();
        d.request_resize(&mut b).unwrap();
        assert_eq!((b.extent, b.image_count), before);
        assert_eq!(d.rebuilds(), 3);
    }

    #[test]
    fn failed_rebuild_leaves_driver_unprepared() {
        let (mut d, mut b) = prepared();
        b.fail_rebuild = true;
        assert!(d.request_resize(&mut b).is_err());
        assert_eq!(d.state(), FrameState::Resizing);
        assert_eq!(d.draw_frame(&mut b).unwrap(), FrameOutcome::Skipped);
    }

    #[test]
    fn destroyed_driver_stays_down() {
        let (mut d, mut b) = prepared();
        d.destroy(&mut b).unwrap();
        d.destroy(&mut b).unwrap();
        assert_eq!(b.calls, vec![Call::WaitIdle]);
        assert_eq!(d.state(), FrameState::Destroyed);
        assert_eq!(d.draw_frame(&mut b).unwrap(), FrameOutcome::Skipped);
        assert!(d.prepare(&mut b).is_err());
        d.request_resize(&mut b).unwrap();
        assert!(!b.calls.contains(&Call::Rebuild));
    }
}
