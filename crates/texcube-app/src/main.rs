// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod assets;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use texcube_core::{init_tracing, load_cfg, AppCfg};
use texcube_platform::winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};
use texcube_platform::{
    map_window_event, on_resumed, on_suspended, LifecycleEvent, SurfaceAction, SurfaceLifecycle,
};
use texcube_render::{CubeAssets, RenderOptions, RenderSize, Renderer};
use texcube_render_vk::VkRenderer;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file; missing means defaults
    #[arg(long, default_value = "texcube.toml")]
    config: PathBuf,
    /// Texture image (overrides `render.texture`)
    #[arg(long)]
    texture: Option<PathBuf>,
    /// Upload the texture through a device-local staging copy
    #[arg(long)]
    staging: bool,
    /// Log the device capability report and exit
    #[arg(long)]
    info: bool,
}

fn render_options(cfg: &AppCfg, args: &Args) -> RenderOptions {
    RenderOptions {
        clear_color: cfg.render.clear_color,
        use_staging: cfg.render.use_staging || args.staging,
        spin_increment: cfg.render.spin_increment,
        validation: cfg.render.validation,
    }
}

struct App {
    cfg: AppCfg,
    opts: RenderOptions,
    assets: CubeAssets,
    info_only: bool,

    // renderer before window: the surface must go before its window
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    lifecycle: SurfaceLifecycle,

    failure: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn new(cfg: AppCfg, args: &Args) -> Result<Self> {
        let texture = args.texture.clone().or_else(|| cfg.render.texture.clone());
        let assets = assets::cube_assets(texture.as_deref())?;
        Ok(App {
            opts: render_options(&cfg, args),
            cfg,
            assets,
            info_only: args.info,
            renderer: None,
            window: None,
            lifecycle: SurfaceLifecycle::default(),
            failure: None,
            frames: 0,
            last_fps_instant: Instant::now(),
        })
    }

    /// Fatal: stop the loop; `main` reports the error and exits non-zero.
    fn fail(&mut self, event_loop: &ActiveEventLoop, e: anyhow::Error) {
        self.failure = Some(e);
        self.renderer = None;
        event_loop.exit();
    }

    /// New window for a (re)started surface, then the renderer on top of it.
    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(PhysicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = event_loop.create_window(attrs).context("create_window")?;
        let created = on_resumed(window.inner_size());
        self.window = Some(window);
        self.handle(event_loop, created)
    }

    fn build_renderer(&mut self, event_loop: &ActiveEventLoop, size: RenderSize) -> Result<()> {
        let window = self
            .window
            .as_ref()
            .ok_or_else(|| anyhow!("surface created without a window"))?;
        let renderer = VkRenderer::new(
            window,
            window,
            RenderSize {
                width: size.width.max(1),
                height: size.height.max(1),
            },
            &self.assets,
            self.opts,
        )?;
        info!(
            "vk renderer ready (texture upload {:?}, paused={})",
            renderer.upload_path(),
            self.lifecycle.is_paused()
        );
        if self.info_only {
            info!("{}", renderer.device_report()?);
            event_loop.exit();
        }
        self.renderer = Some(renderer);
        Ok(())
    }

    fn handle(&mut self, event_loop: &ActiveEventLoop, ev: LifecycleEvent) -> Result<()> {
        match self.lifecycle.on_event(ev) {
            SurfaceAction::Build { size } => self.build_renderer(event_loop, size)?,
            SurfaceAction::Release => {
                info!("surface destroyed; releasing renderer");
                self.renderer = None;
                self.window = None;
            }
            SurfaceAction::Exit => {
                info!("window closed");
                self.renderer = None;
                self.window = None;
                event_loop.exit();
            }
            SurfaceAction::Resize { size } => {
                info!("resized to {}x{}", size.width, size.height);
                if let Some(r) = &mut self.renderer {
                    r.resize(size)?;
                }
            }
            SurfaceAction::Draw => {
                if let Some(r) = &mut self.renderer {
                    r.render()?;
                    self.frames = self.frames.saturating_add(1);
                }
            }
            SurfaceAction::Idle => {}
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.create_window(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn suspended(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.handle(event_loop, on_suspended()) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        let Some(ev) = map_window_event(&event) else {
            return;
        };
        if let Err(e) = self.handle(event_loop, ev) {
            self.fail(event_loop, e);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if !self.lifecycle.can_draw() || self.renderer.is_none() {
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let mut app = App::new(cfg, &args)?;

    let event_loop: EventLoop<()> = EventLoop::new()?;
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["texcube"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn cli_defaults() {
        let a = args(&[]);
        assert_eq!(a.config, PathBuf::from("texcube.toml"));
        assert!(a.texture.is_none());
        assert!(!a.staging && !a.info);
    }

    #[test]
    fn staging_flag_overrides_config() {
        let cfg = AppCfg::default();
        assert!(!render_options(&cfg, &args(&[])).use_staging);
        assert!(render_options(&cfg, &args(&["--staging"])).use_staging);
    }

    #[test]
    fn options_follow_config() {
        let mut cfg = AppCfg::default();
        cfg.render.clear_color = [1.0, 0.0, 0.0, 1.0];
        cfg.render.spin_increment = 2.5;
        let o = render_options(&cfg, &args(&["--texture", "x.png"]));
        assert_eq!(o.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(o.spin_increment, 2.5);
    }
}
