//! Options panel for the viewer, editing the same settings the console does.

use egui::{Color32, Context, FontFamily, FontId, Margin, Rounding, Stroke, Style, Visuals};

use hmd_stereo::distortion::DistortionMode;
use hmd_stereo::eye::EyeLayout;
use hmd_stereo::hud::CrosshairStyle;
use hmd_stereo::pose::{AimMode, DeadzoneAngle};
use hmd_stereo::HmdSettings;

/// Read-only facts shown at the top of the panel.
pub struct Status {
    pub enabled: bool,
    pub per_eye: Option<(u32, u32)>,
    pub fov: Option<(f32, f32)>,
    pub view_yaw: f32,
    pub aim_yaw: f32,
    pub error: Option<String>,
}

pub struct OptionsPanel {
    pub visible: bool,
    recenter_requested: bool,
    save_requested: bool,
}

impl OptionsPanel {
    pub fn new(ctx: &Context) -> Self {
        Self::apply_theme(ctx);
        Self {
            visible: true,
            recenter_requested: false,
            save_requested: false,
        }
    }

    fn apply_theme(ctx: &Context) {
        let mut style = Style::default();
        style.spacing.item_spacing = egui::vec2(8.0, 6.0);
        style.spacing.button_padding = egui::vec2(10.0, 6.0);
        style.spacing.slider_width = 160.0;

        let mut visuals = Visuals::dark();
        visuals.widgets.inactive.rounding = Rounding::same(8.0);
        visuals.widgets.hovered.rounding = Rounding::same(8.0);
        visuals.widgets.active.rounding = Rounding::same(8.0);
        visuals.window_rounding = Rounding::same(12.0);

        let primary = Color32::from_rgb(100, 180, 255);
        visuals.window_fill = Color32::from_rgba_unmultiplied(30, 30, 35, 235);
        visuals.widgets.inactive.bg_fill = Color32::from_rgb(45, 45, 50);
        visuals.widgets.active.bg_fill = primary;
        visuals.selection.bg_fill = primary;

        style.text_styles.insert(egui::TextStyle::Body, FontId::new(15.0, FontFamily::Proportional));
        style.text_styles.insert(egui::TextStyle::Button, FontId::new(15.0, FontFamily::Proportional));

        ctx.set_style(style);
        ctx.set_visuals(visuals);
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn take_recenter(&mut self) -> bool {
        std::mem::take(&mut self.recenter_requested)
    }

    pub fn take_save(&mut self) -> bool {
        std::mem::take(&mut self.save_requested)
    }

    pub fn show(&mut self, ctx: &Context, settings: &mut HmdSettings, status: &Status) {
        if !self.visible {
            return;
        }

        egui::Window::new("VR/HMD Options")
            .anchor(egui::Align2::LEFT_TOP, egui::vec2(16.0, 16.0))
            .resizable(false)
            .collapsible(true)
            .frame(
                egui::Frame::window(&ctx.style())
                    .inner_margin(Margin::same(12.0))
                    .stroke(Stroke::new(1.0, Color32::from_gray(60))),
            )
            .show(ctx, |ui| {
                match (status.enabled, status.per_eye, status.fov) {
                    (true, Some((w, h)), Some((fx, fy))) => {
                        ui.label(format!("{}x{} per eye, fov {:.0}x{:.0}", w, h, fx, fy));
                    }
                    _ => {
                        ui.label(egui::RichText::new("HMD off").color(Color32::from_rgb(255, 150, 100)));
                    }
                }
                if let Some(error) = &status.error {
                    ui.label(egui::RichText::new(error).size(12.0).color(Color32::from_rgb(255, 110, 110)));
                }
                ui.label(
                    egui::RichText::new(format!("view yaw {:.1}  aim yaw {:.1}", status.view_yaw, status.aim_yaw))
                        .weak(),
                );
                ui.separator();

                ui.checkbox(&mut settings.enabled, "VR Enabled");

                egui::ComboBox::from_label("Aim Mode")
                    .selected_text(settings.aim_mode.label())
                    .show_ui(ui, |ui| {
                        for mode in AimMode::ALL {
                            ui.selectable_value(&mut settings.aim_mode, mode, mode.label());
                        }
                    });

                let mut deadzone = settings.deadzone.degrees();
                if ui
                    .add(egui::Slider::new(&mut deadzone, 0.0..=DeadzoneAngle::MAX).suffix(" degrees"))
                    .on_hover_text("Blended modes only")
                    .changed()
                {
                    settings.deadzone = DeadzoneAngle::new(deadzone);
                }

                ui.add(egui::Slider::new(&mut settings.ipd_mm, 40.0..=90.0).text("IPD").suffix(" mm"));
                ui.add(
                    egui::Slider::new(
                        &mut settings.supersample,
                        HmdSettings::SUPERSAMPLE_MIN..=HmdSettings::SUPERSAMPLE_MAX,
                    )
                    .text("Supersample")
                    .fixed_decimals(2),
                );

                ui.horizontal(|ui| {
                    ui.label("Layout");
                    ui.selectable_value(&mut settings.layout, EyeLayout::Horizontal, "side by side");
                    ui.selectable_value(&mut settings.layout, EyeLayout::Vertical, "over/under");
                });
                ui.horizontal(|ui| {
                    ui.label("Distortion");
                    ui.selectable_value(&mut settings.distortion, DistortionMode::LensWarp, "lens warp");
                    ui.selectable_value(&mut settings.distortion, DistortionMode::Compositor, "compositor");
                });
                ui.checkbox(&mut settings.chromatic_aberration, "Chromatic aberration correction");

                ui.separator();
                egui::ComboBox::from_label("Crosshair")
                    .selected_text(crosshair_label(settings.crosshair))
                    .show_ui(ui, |ui| {
                        for style in [
                            CrosshairStyle::None,
                            CrosshairStyle::Point,
                            CrosshairStyle::Line,
                            CrosshairStyle::PointInfinity,
                        ] {
                            ui.selectable_value(&mut settings.crosshair, style, crosshair_label(style));
                        }
                    });
                ui.add(egui::Slider::new(&mut settings.crosshair_depth, 0.0..=4096.0).text("Depth"));
                ui.add(egui::Slider::new(&mut settings.crosshair_size, 0.0..=32.0).text("Size"));
                ui.add(egui::Slider::new(&mut settings.crosshair_alpha, 0.0..=1.0).text("Alpha"));

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Recenter").clicked() {
                        self.recenter_requested = true;
                    }
                    if ui.button("Save").clicked() {
                        self.save_requested = true;
                    }
                });
                ui.label(
                    egui::RichText::new("RMB drag: aim  arrows: head  R: recenter  M: aim mode  Tab: panel")
                        .size(12.0)
                        .weak(),
                );
            });
    }
}

fn crosshair_label(style: CrosshairStyle) -> &'static str {
    match style {
        CrosshairStyle::None => "off",
        CrosshairStyle::Point => "point",
        CrosshairStyle::Line => "line",
        CrosshairStyle::PointInfinity => "point at infinity",
    }
}
