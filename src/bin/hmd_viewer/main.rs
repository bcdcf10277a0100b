//! Desktop viewer: the stereo pipeline around a small test room, head motion
//! from the simulated tracker and aim from the mouse.

mod scene;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use hmd_stereo::tracker::SimulatedTracker;
use hmd_stereo::{Angles, HmdSettings, HmdSystem, RenderState, WgpuBackend};

use scene::{RoomScene, PLAYER_ORIGIN, VIEW_HEIGHT};
use ui::{OptionsPanel, Status};

/// Degrees of aim per pixel of mouse motion.
const MOUSE_SENSITIVITY: f32 = 0.022 * 3.0;
/// Degrees per key press of simulated head turn.
const HEAD_STEP: f32 = 5.0;

struct Viewer {
    window: Option<Arc<Window>>,
    hmd: Option<HmdSystem<WgpuBackend, SimulatedTracker>>,
    scene: Option<RoomScene>,
    egui_state: Option<egui_winit::State>,
    panel: Option<OptionsPanel>,
    config_path: PathBuf,
    start: Instant,
    aim_delta: Angles,
    mouse_look: bool,
}

impl Viewer {
    fn new(config_path: PathBuf) -> Self {
        Self {
            window: None,
            hmd: None,
            scene: None,
            egui_state: None,
            panel: None,
            config_path,
            start: Instant::now(),
            aim_delta: Angles::ZERO,
            mouse_look: false,
        }
    }

    fn load_settings(&self) -> HmdSettings {
        let mut settings = HmdSettings::default();
        match std::fs::read_to_string(&self.config_path) {
            Ok(text) => {
                let skipped = settings.load_archive(&text);
                if skipped > 0 {
                    warn!("{}: {} settings ignored", self.config_path.display(), skipped);
                }
            }
            Err(_) => info!("No saved settings at {}", self.config_path.display()),
        }
        settings.enabled = true;
        settings
    }

    fn handle_key(&mut self, key: KeyCode) {
        let Some(hmd) = self.hmd.as_mut() else {
            return;
        };
        match key {
            KeyCode::KeyR => hmd.recenter(),
            KeyCode::KeyM => {
                let next = hmd.settings().aim_mode.index() % 6 + 1;
                if let Err(e) = hmd.set_cvar("vr_aimmode", &next.to_string()) {
                    warn!("{}", e);
                }
                info!("Aim mode: {}", hmd.settings().aim_mode.label());
            }
            KeyCode::Tab => {
                if let Some(panel) = self.panel.as_mut() {
                    panel.toggle();
                }
            }
            KeyCode::ArrowLeft => hmd.tracker_mut().manual.yaw += HEAD_STEP,
            KeyCode::ArrowRight => hmd.tracker_mut().manual.yaw -= HEAD_STEP,
            KeyCode::ArrowUp => hmd.tracker_mut().manual.pitch -= HEAD_STEP,
            KeyCode::ArrowDown => hmd.tracker_mut().manual.pitch += HEAD_STEP,
            _ => {}
        }
    }

    fn redraw(&mut self) {
        let (Some(window), Some(hmd), Some(scene), Some(egui_state), Some(panel)) = (
            self.window.as_ref(),
            self.hmd.as_mut(),
            self.scene.as_mut(),
            self.egui_state.as_mut(),
            self.panel.as_mut(),
        ) else {
            return;
        };

        let time = self.start.elapsed().as_secs_f64();
        let aim = hmd.angles();
        let status = Status {
            enabled: hmd.is_enabled(),
            per_eye: hmd.eyes().map(|e| (e[0].target_width, e[0].target_height)),
            fov: hmd.eyes().map(|e| (e[0].fov_x, e[0].fov_y)),
            view_yaw: aim.view.yaw,
            aim_yaw: aim.aim.yaw,
            error: hmd.last_error().map(str::to_owned),
        };

        let mut settings = hmd.settings().clone();
        let raw_input = egui_state.take_egui_input(window);
        let ctx = egui_state.egui_ctx().clone();
        let output = ctx.run(raw_input, |ctx| panel.show(ctx, &mut settings, &status));
        egui_state.handle_platform_output(window, output.platform_output.clone());

        if panel.take_save() {
            save_settings(&self.config_path, &settings);
        }
        hmd.apply_settings(settings);
        if panel.take_recenter() {
            hmd.recenter();
        }

        let (width, height) = hmd.backend().surface_size();
        scene.update_hud(hmd.settings(), width);
        hmd.backend_mut().queue_overlay(&ctx, output);

        let mut state = RenderState::new(width, height);
        state.view_origin = PLAYER_ORIGIN + glam::Vec3::Z * VIEW_HEIGHT;
        let delta = std::mem::replace(&mut self.aim_delta, Angles::ZERO);
        if let Err(e) = hmd.update_screen_content(delta, time, &mut state, scene) {
            warn!("Frame failed: {}", e);
        }

        window.request_redraw();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        info!("Viewer resumed - creating window");

        let window_attrs = Window::default_attributes()
            .with_title("HMD Viewer")
            .with_inner_size(LogicalSize::new(1280.0, 800.0));
        let window = Arc::new(event_loop.create_window(window_attrs).expect("Failed to create window"));
        self.window = Some(window.clone());

        let backend = pollster::block_on(WgpuBackend::new(window.clone())).expect("Failed to initialise wgpu");
        let scene = RoomScene::new(&backend);
        let size = window.inner_size();
        let mut tracker = SimulatedTracker::default();
        tracker.positional = true;
        self.hmd = Some(HmdSystem::new(backend, tracker, self.load_settings(), (size.width, size.height)));
        self.scene = Some(scene);

        let ctx = egui::Context::default();
        self.panel = Some(OptionsPanel::new(&ctx));
        self.egui_state = Some(egui_winit::State::new(
            ctx,
            egui::ViewportId::ROOT,
            event_loop,
            None,
            None,
            None,
        ));

        window.request_redraw();
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        info!("Viewer suspended - releasing GPU resources");
        self.scene = None;
        self.hmd = None;
        self.egui_state = None;
        self.panel = None;
        self.window = None;
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        let response = match (self.egui_state.as_mut(), self.window.as_ref()) {
            (Some(state), Some(window)) => state.on_window_event(window, &event),
            _ => Default::default(),
        };
        if response.consumed {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested");
                if let Some(hmd) = self.hmd.as_ref() {
                    save_settings(&self.config_path, hmd.settings());
                }
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(hmd) = self.hmd.as_mut() {
                    hmd.backend_mut().resize(size.width, size.height);
                    hmd.resize(size.width, size.height);
                }
            }
            WindowEvent::MouseInput { state, button: MouseButton::Right, .. } => {
                self.mouse_look = state == ElementState::Pressed;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state != ElementState::Pressed || event.repeat {
                    return;
                }
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    PhysicalKey::Code(key) => self.handle_key(key),
                    PhysicalKey::Unidentified(_) => {}
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            if self.mouse_look {
                self.aim_delta.yaw -= dx as f32 * MOUSE_SENSITIVITY;
                self.aim_delta.pitch += dy as f32 * MOUSE_SENSITIVITY;
            }
        }
    }
}

fn save_settings(path: &Path, settings: &HmdSettings) {
    let mut text = settings.archive_lines().join("\n");
    text.push('\n');
    match std::fs::write(path, text) {
        Ok(()) => info!("Settings saved to {}", path.display()),
        Err(e) => error!("Failed to save settings: {}", e),
    }
}

fn main() {
    hmd_stereo::init_logging();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("hmd_viewer.cfg"));

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    let mut viewer = Viewer::new(config_path);
    event_loop.run_app(&mut viewer).expect("Event loop failed");
}
