use std::{collections::HashMap, path::Path};

use log::{info, warn};
use macroquad::prelude::*;

use crate::{
    geometry::gl_to_pixel,
    settings::{VIEWPORT_HEIGHT, VIEWPORT_WIDTH},
    widgets::{BufferId, Highlight, InstanceUploader, KnobKind, KnobSet, ScaleMatrix, Scissor, Slider, TextLine},
};

pub const AMBER: Color = Color {
    r: 0.98,
    g: 0.66,
    b: 0.12,
    a: 1.0,
};
const AMBER_DIM: Color = Color {
    r: 0.78,
    g: 0.52,
    b: 0.08,
    a: 0.4,
};
const PANEL: Color = Color {
    r: 0.06,
    g: 0.06,
    b: 0.07,
    a: 1.0,
};
const TEXT_SIZE: u16 = 16;
/// Glyph cell in pixels, used as the text batch's scale.
const GLYPH_WIDTH: f32 = 8.0;
const GLYPH_HEIGHT: f32 = 16.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Program {
    NonInteractive,
    Interactive,
}

/// Static part of the panel: one full-window texture plus captions. Never
/// changes after startup.
pub struct Background {
    texture: Option<Texture2D>,
    labels: Vec<(String, Vec2)>,
}

impl Background {
    pub fn plain() -> Self {
        Self {
            texture: None,
            labels: Vec::new(),
        }
    }

    /// Falls back to a plain fill when the image can't be loaded.
    pub async fn load(path: &Path) -> Self {
        let texture = match load_texture(&path.to_string_lossy()).await {
            Ok(texture) => {
                texture.set_filter(FilterMode::Linear);
                info!("background loaded from {}", path.display());
                Some(texture)
            }
            Err(err) => {
                warn!("background {}: {err}, drawing a plain panel", path.display());
                None
            }
        };
        Self {
            texture,
            labels: Vec::new(),
        }
    }

    pub fn add_label(&mut self, text: impl Into<String>, position: Vec2) {
        self.labels.push((text.into(), position));
    }

    pub fn labels(&self) -> &[(String, Vec2)] {
        &self.labels
    }
}

/// One instanced draw. Each carries the scale matrix bound right before it.
#[derive(Clone, Copy)]
pub enum Batch<'a> {
    Knobs(&'a KnobSet),
    Slider(&'a Slider),
    Highlight(&'a Highlight),
    Text(&'a [TextLine]),
}

impl Batch<'_> {
    pub fn scale_matrix(&self) -> ScaleMatrix {
        match self {
            Batch::Knobs(knobs) => *knobs.scale_matrix(),
            Batch::Slider(slider) => *slider.scale_matrix(),
            Batch::Highlight(highlight) => *highlight.scale_matrix(),
            Batch::Text(_) => [
                GLYPH_WIDTH / VIEWPORT_WIDTH as f32,
                0.0,
                0.0,
                GLYPH_HEIGHT / VIEWPORT_HEIGHT as f32,
            ],
        }
    }
}

pub trait RenderBackend: InstanceUploader {
    fn clear(&mut self);
    fn use_program(&mut self, program: Option<Program>);
    fn draw_background(&mut self, background: &Background);
    fn set_scale_matrix(&mut self, matrix: &ScaleMatrix);
    fn draw_batch(&mut self, batch: &Batch<'_>);
}

/// Draws one frame: clear, background under the non-interactive program,
/// then every interactive batch with its own scale matrix bound first.
pub fn render_frame(backend: &mut dyn RenderBackend, background: &Background, batches: &[Batch<'_>]) {
    backend.clear();
    backend.use_program(Some(Program::NonInteractive));
    backend.draw_background(background);
    backend.use_program(Some(Program::Interactive));
    for batch in batches {
        backend.set_scale_matrix(&batch.scale_matrix());
        backend.draw_batch(batch);
    }
    backend.use_program(None);
}

/// Draws through macroquad, reading instance data from its own mirrors of
/// the uploaded buffers rather than from the widgets.
#[derive(Default)]
pub struct MacroquadBackend {
    mirrors: HashMap<BufferId, Vec<f32>>,
    scale_matrix: ScaleMatrix,
    program: Option<Program>,
}

impl MacroquadBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn mirror(&self, buffer: BufferId) -> &[f32] {
        self.mirrors.get(&buffer).map(Vec::as_slice).unwrap_or(&[])
    }

    fn scaled_size(&self) -> Vec2 {
        vec2(
            self.scale_matrix[0] * VIEWPORT_WIDTH as f32,
            self.scale_matrix[3] * VIEWPORT_HEIGHT as f32,
        )
    }

    fn draw_knobs(&self, knobs: &KnobSet) {
        let offsets = self.mirror(knobs.offsets().id());
        let rotations = self.mirror(knobs.rotations().id());
        let radius = self.scaled_size().x * 0.4;
        for (offset, rotation) in offsets.chunks_exact(2).zip(rotations) {
            let center = gl_to_pixel(vec2(offset[0], offset[1]));
            draw_circle(center.x, center.y, radius + 4.0, Color::new(0.05, 0.03, 0.02, 1.0));
            draw_circle(center.x, center.y, radius, Color::new(0.12, 0.12, 0.12, 1.0));
            draw_circle_lines(center.x, center.y, radius + 4.0, 1.0, AMBER_DIM);
            let pointer = vec2(rotation.sin(), -rotation.cos()) * radius * 0.8;
            let thickness = match knobs.kind() {
                KnobKind::Large => 3.0,
                KnobKind::Small => 2.0,
            };
            draw_line(
                center.x,
                center.y,
                center.x + pointer.x,
                center.y + pointer.y,
                thickness,
                AMBER,
            );
        }
    }

    fn draw_slider(&self, slider: &Slider) {
        let track = slider.region();
        draw_rectangle_lines(track.min_x, track.min_y, track.width(), track.height(), 1.0, AMBER_DIM);
        if !slider.enabled() {
            return;
        }
        let Some(motion) = self.mirror(slider.motions().id()).first().copied() else {
            return;
        };
        let size = self.scaled_size();
        let center = gl_to_pixel(vec2(slider.x(), motion));
        let thumb = Rect::new(center.x - size.x * 0.5, center.y - size.y * 0.5, size.x, size.y);
        if let Some(visible) = clip(thumb, slider.scissor()) {
            draw_rectangle(visible.x, visible.y, visible.w, visible.h, AMBER);
        }
    }

    fn draw_highlight(&self, highlight: &Highlight) {
        let offsets = self.mirror(highlight.offsets().id());
        let alpha = self.mirror(highlight.alphas().id()).first().copied().unwrap_or(0.0);
        if offsets.len() < 2 || alpha <= 0.0 {
            return;
        }
        let size = self.scaled_size();
        let center = gl_to_pixel(vec2(offsets[0], offsets[1]));
        let rect = Rect::new(center.x - size.x * 0.5, center.y - size.y * 0.5, size.x, size.y);
        if let Some(visible) = clip(rect, highlight.scissor()) {
            draw_rectangle(
                visible.x,
                visible.y,
                visible.w,
                visible.h,
                Color::new(AMBER.r, AMBER.g, AMBER.b, 0.35 * alpha),
            );
        }
    }

    fn draw_text_lines(&self, lines: &[TextLine]) {
        let descent = (self.scaled_size().y * 0.25).round();
        for line in lines.iter().filter(|line| !line.text().is_empty()) {
            draw_text(
                line.text(),
                line.region.min_x + 4.0,
                line.region.max_y - descent,
                TEXT_SIZE as f32,
                WHITE,
            );
        }
    }
}

/// Intersects `rect` (top-left origin) with a bottom-left-origin scissor.
fn clip(rect: Rect, scissor: Scissor) -> Option<Rect> {
    let top = VIEWPORT_HEIGHT as f32 - (scissor.y + scissor.height);
    let bounds = Rect::new(scissor.x, top, scissor.width, scissor.height);
    rect.intersect(bounds)
}

impl InstanceUploader for MacroquadBackend {
    fn upload(&mut self, buffer: BufferId, offset: usize, data: &[f32]) {
        let mirror = self.mirrors.entry(buffer).or_default();
        let end = offset + data.len();
        if mirror.len() < end {
            mirror.resize(end, 0.0);
        }
        mirror[offset..end].copy_from_slice(data);
    }
}

impl RenderBackend for MacroquadBackend {
    fn clear(&mut self) {
        clear_background(PANEL);
    }

    fn use_program(&mut self, program: Option<Program>) {
        self.program = program;
    }

    fn draw_background(&mut self, background: &Background) {
        if let Some(texture) = &background.texture {
            draw_texture_ex(
                texture,
                0.0,
                0.0,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(VIEWPORT_WIDTH as f32, VIEWPORT_HEIGHT as f32)),
                    ..Default::default()
                },
            );
        }
        for (text, position) in &background.labels {
            let dims = measure_text(text, None, 14, 1.0);
            draw_text(text, position.x - dims.width * 0.5, position.y, 14.0, AMBER_DIM);
        }
    }

    fn set_scale_matrix(&mut self, matrix: &ScaleMatrix) {
        self.scale_matrix = *matrix;
    }

    fn draw_batch(&mut self, batch: &Batch<'_>) {
        if self.program != Some(Program::Interactive) {
            warn!("interactive batch drawn outside the interactive program");
            return;
        }
        match batch {
            Batch::Knobs(knobs) => self.draw_knobs(knobs),
            Batch::Slider(slider) => self.draw_slider(slider),
            Batch::Highlight(highlight) => self.draw_highlight(highlight),
            Batch::Text(lines) => self.draw_text_lines(lines),
        }
    }
}
