// SPDX-License-Identifier: CEPL-1.0
//! Host-window glue: re-exports `winit`, folds its callbacks into the
//! lifecycle events the renderer reacts to, and tracks what each event
//! means for the surface.

pub use winit;

use texcube_render::RenderSize;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    Created { size: RenderSize },
    /// The surface is gone but may come back with another `Created`.
    Destroyed,
    RedrawNeeded,
    Resized { size: RenderSize },
    /// The user closed the window; the app ends.
    Closed,
}

pub fn render_size(size: PhysicalSize<u32>) -> RenderSize {
    RenderSize {
        width: size.width,
        height: size.height,
    }
}

/// `resumed` with a freshly created window.
pub fn on_resumed(size: PhysicalSize<u32>) -> LifecycleEvent {
    LifecycleEvent::Created {
        size: render_size(size),
    }
}

/// `suspended` drops the surface; `resumed` brings a new one.
pub fn on_suspended() -> LifecycleEvent {
    LifecycleEvent::Destroyed
}

/// Window events that matter to the renderer; everything else is `None`.
pub fn map_window_event(event: &WindowEvent) -> Option<LifecycleEvent> {
    match event {
        WindowEvent::CloseRequested | WindowEvent::Destroyed => Some(LifecycleEvent::Closed),
        WindowEvent::RedrawRequested => Some(LifecycleEvent::RedrawNeeded),
        WindowEvent::Resized(size) => Some(LifecycleEvent::Resized {
            size: render_size(*size),
        }),
        _ => None,
    }
}

impl LifecycleEvent {
    /// Minimised windows report a zero extent; no swapchain can be built for it.
    pub fn is_zero_sized(&self) -> bool {
        match self {
            LifecycleEvent::Created { size } | LifecycleEvent::Resized { size } => {
                size.width == 0 || size.height == 0
            }
            _ => false,
        }
    }
}

/// What the app must do with its renderer in response to an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceAction {
    /// Create the renderer for a new surface. Zero-sized surfaces start paused.
    Build { size: RenderSize },
    /// Drop the renderer and window, keep the event loop running.
    Release,
    Resize { size: RenderSize },
    Draw,
    Idle,
    /// Drop everything and leave the event loop.
    Exit,
}

/// Surface presence and pause state across the lifecycle. A surface can be
/// destroyed and created again any number of times before `Closed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceLifecycle {
    live: bool,
    paused: bool,
}

impl SurfaceLifecycle {
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Live and not paused.
    pub fn can_draw(&self) -> bool {
        self.live && !self.paused
    }

    pub fn on_event(&mut self, ev: LifecycleEvent) -> SurfaceAction {
        match ev {
            LifecycleEvent::Created { size } => {
                self.live = true;
                self.paused = ev.is_zero_sized();
                SurfaceAction::Build { size }
            }
            LifecycleEvent::Destroyed => {
                let was_live = std::mem::replace(&mut self.live, false);
                if was_live {
                    SurfaceAction::Release
                } else {
                    SurfaceAction::Idle
                }
            }
            LifecycleEvent::Closed => {
                self.live = false;
                SurfaceAction::Exit
            }
            LifecycleEvent::Resized { size } => {
                if !self.live {
                    return SurfaceAction::Idle;
                }
                self.paused = ev.is_zero_sized();
                if self.paused {
                    SurfaceAction::Idle
                } else {
                    SurfaceAction::Resize { size }
                }
            }
            LifecycleEvent::RedrawNeeded if self.can_draw() => SurfaceAction::Draw,
            LifecycleEvent::RedrawNeeded => SurfaceAction::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumed_carries_pixel_size() {
        let ev = on_resumed(PhysicalSize::new(800, 600));
        assert_eq!(
            ev,
            LifecycleEvent::Created {
                size: RenderSize {
                    width: 800,
                    height: 600
                }
            }
        );
        assert!(!ev.is_zero_sized());
    }

    #[test]
    fn close_ends_the_app_but_suspend_only_drops_the_surface() {
        assert_eq!(
            map_window_event(&WindowEvent::CloseRequested),
            Some(LifecycleEvent::Closed)
        );
        assert_eq!(on_suspended(), LifecycleEvent::Destroyed);
    }

    #[test]
    fn redraw_and_resize_map_through() {
        assert_eq!(
            map_window_event(&WindowEvent::RedrawRequested),
            Some(LifecycleEvent::RedrawNeeded)
        );
        let ev = map_window_event(&WindowEvent::Resized(PhysicalSize::new(0, 480)));
        assert!(matches!(ev, Some(LifecycleEvent::Resized { .. })));
        assert!(ev.is_some_and(|e| e.is_zero_sized()));
    }

    #[test]
    fn unrelated_events_are_ignored() {
        assert_eq!(map_window_event(&WindowEvent::Focused(true)), None);
    }

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    #[test]
    fn suspend_then_resume_builds_again() {
        let mut lc = SurfaceLifecycle::default();
        let first = on_resumed(PhysicalSize::new(640, 480));
        assert_eq!(lc.on_event(first), SurfaceAction::Build { size: size(640, 480) });
        assert_eq!(lc.on_event(LifecycleEvent::RedrawNeeded), SurfaceAction::Draw);

        assert_eq!(lc.on_event(on_suspended()), SurfaceAction::Release);
        assert!(!lc.is_live());
        assert_eq!(lc.on_event(LifecycleEvent::RedrawNeeded), SurfaceAction::Idle);

        let again = on_resumed(PhysicalSize::new(800, 600));
        assert_eq!(lc.on_event(again), SurfaceAction::Build { size: size(800, 600) });
        assert_eq!(lc.on_event(LifecycleEvent::RedrawNeeded), SurfaceAction::Draw);
    }

    #[test]
    fn close_exits_from_any_state() {
        let mut lc = SurfaceLifecycle::default();
        assert_eq!(lc.on_event(LifecycleEvent::Closed), SurfaceAction::Exit);
        lc.on_event(on_resumed(PhysicalSize::new(10, 10)));
        assert_eq!(lc.on_event(LifecycleEvent::Closed), SurfaceAction::Exit);
    }

    #[test]
    fn zero_size_pauses_until_a_real_resize() {
        let mut lc = SurfaceLifecycle::default();
        lc.on_event(on_resumed(PhysicalSize::new(0, 0)));
        assert!(lc.is_paused());
        assert_eq!(lc.on_event(LifecycleEvent::RedrawNeeded), SurfaceAction::Idle);
        let grow = LifecycleEvent::Resized { size: size(320, 200) };
        assert_eq!(lc.on_event(grow), SurfaceAction::Resize { size: size(320, 200) });
        assert!(lc.can_draw());
        let shrink = LifecycleEvent::Resized { size: size(0, 200) };
        assert_eq!(lc.on_event(shrink), SurfaceAction::Idle);
        assert!(lc.is_paused());
    }

    #[test]
    fn events_without_a_surface_do_nothing() {
        let mut lc = SurfaceLifecycle::default();
        assert_eq!(lc.on_event(LifecycleEvent::Destroyed), SurfaceAction::Idle);
        let r = LifecycleEvent::Resized { size: size(5, 5) };
        assert_eq!(lc.on_event(r), SurfaceAction::Idle);
    }
}
