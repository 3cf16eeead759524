use std::{
    f32::consts::PI,
    ops::Range,
    sync::atomic::{AtomicU32, Ordering},
};

use macroquad::math::{Vec2, vec2};

use crate::{
    geometry::{Region, pixel_to_gl},
    settings::{VIEWPORT_HEIGHT, VIEWPORT_WIDTH},
};

/// Knobs stop at 150 degrees either side of 12 o'clock.
pub const KNOB_ROTATION_LIMIT: f32 = PI * 5.0 / 6.0;

/// 2x2 column-major matrix scaling the unit quad of an instanced batch.
pub type ScaleMatrix = [f32; 4];

static NEXT_BUFFER_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(u32);

impl BufferId {
    fn allocate() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Receiver of instance-buffer uploads. `offset` and `data` are counted in
/// floats; only the given sub-range is replaced.
pub trait InstanceUploader {
    fn upload(&mut self, buffer: BufferId, offset: usize, data: &[f32]);
}

/// CPU mirror of one GPU per-instance attribute array. Writes widen a dirty
/// range; `flush` sends only that range.
#[derive(Clone, Debug)]
pub struct InstanceBuffer {
    id: BufferId,
    components: usize,
    data: Vec<f32>,
    dirty: Option<Range<usize>>,
}

impl InstanceBuffer {
    pub fn new(components: usize) -> Self {
        Self {
            id: BufferId::allocate(),
            components: components.max(1),
            data: Vec::new(),
            dirty: None,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.components
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&[f32]> {
        let start = index * self.components;
        self.data.get(start..start + self.components)
    }

    pub fn push(&mut self, values: &[f32]) -> usize {
        let index = self.len();
        let mut instance = vec![0.0; self.components];
        for (slot, value) in instance.iter_mut().zip(values) {
            *slot = *value;
        }
        self.data.extend_from_slice(&instance);
        self.mark_dirty(index);
        index
    }

    pub fn set(&mut self, index: usize, values: &[f32]) -> bool {
        let components = self.components;
        let Some(slot) = self
            .data
            .get_mut(index * components..(index + 1) * components)
        else {
            return false;
        };
        let mut changed = false;
        for (current, value) in slot.iter_mut().zip(values) {
            if current.to_bits() != value.to_bits() {
                *current = *value;
                changed = true;
            }
        }
        if changed {
            self.mark_dirty(index);
        }
        changed
    }

    pub fn set_component(&mut self, index: usize, component: usize, value: f32) -> bool {
        if component >= self.components {
            return false;
        }
        let Some(current) = self.data.get_mut(index * self.components + component) else {
            return false;
        };
        if current.to_bits() == value.to_bits() {
            return false;
        }
        *current = value;
        self.mark_dirty(index);
        true
    }

    pub fn component(&self, index: usize, component: usize) -> Option<f32> {
        self.get(index).and_then(|values| values.get(component).copied())
    }

    pub fn dirty_range(&self) -> Option<Range<usize>> {
        self.dirty.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.is_some()
    }

    pub fn flush(&mut self, uploader: &mut dyn InstanceUploader) -> bool {
        let Some(range) = self.dirty.take() else {
            return false;
        };
        let start = range.start * self.components;
        let end = (range.end * self.components).min(self.data.len());
        if start < end {
            uploader.upload(self.id, start, &self.data[start..end]);
        }
        true
    }

    fn mark_dirty(&mut self, index: usize) {
        self.dirty = Some(match self.dirty.take() {
            Some(range) => range.start.min(index)..range.end.max(index + 1),
            None => index..index + 1,
        });
    }
}

/// Window-space clip rectangle, origin at the bottom-left like GL's scissor.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scissor {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Bottom edge in scissor pixels of a quad centered on `offset_y` whose half
/// height is `half_height` (both in GL units).
pub fn scissor_y(offset_y: f32, half_height: f32) -> f32 {
    (1.0 + offset_y - half_height) * (VIEWPORT_HEIGHT / 2) as f32
}

fn scale_matrix_for(width_px: f32, height_px: f32) -> ScaleMatrix {
    [
        width_px / VIEWPORT_WIDTH as f32,
        0.0,
        0.0,
        height_px / VIEWPORT_HEIGHT as f32,
    ]
}

pub fn rotation_to_value(rotation: f32) -> f32 {
    let clamped = rotation.clamp(-KNOB_ROTATION_LIMIT, KNOB_ROTATION_LIMIT);
    (clamped + KNOB_ROTATION_LIMIT) / (2.0 * KNOB_ROTATION_LIMIT)
}

pub fn value_to_rotation(value: f32) -> f32 {
    value.clamp(0.0, 1.0) * 2.0 * KNOB_ROTATION_LIMIT - KNOB_ROTATION_LIMIT
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnobKind {
    Large,
    Small,
}

/// One instanced batch of knobs sharing a texture size and scale matrix.
#[derive(Clone, Debug)]
pub struct KnobSet {
    kind: KnobKind,
    size_px: f32,
    scale_matrix: ScaleMatrix,
    offsets: InstanceBuffer,
    rotations: InstanceBuffer,
    centers: Vec<Vec2>,
}

impl KnobSet {
    pub fn new(kind: KnobKind, size_px: f32) -> Self {
        Self {
            kind,
            size_px,
            scale_matrix: scale_matrix_for(size_px, size_px),
            offsets: InstanceBuffer::new(2),
            rotations: InstanceBuffer::new(1),
            centers: Vec::new(),
        }
    }

    pub fn add(&mut self, center: Vec2, value: f32) -> usize {
        let gl = pixel_to_gl(center);
        self.offsets.push(&[gl.x, gl.y]);
        self.rotations.push(&[value_to_rotation(value)]);
        self.centers.push(center);
        self.centers.len() - 1
    }

    pub fn kind(&self) -> KnobKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn size_px(&self) -> f32 {
        self.size_px
    }

    pub fn scale_matrix(&self) -> &ScaleMatrix {
        &self.scale_matrix
    }

    pub fn center(&self, index: usize) -> Option<Vec2> {
        self.centers.get(index).copied()
    }

    pub fn region(&self, index: usize) -> Option<Region> {
        self.center(index)
            .map(|center| Region::around(center, self.size_px, self.size_px))
    }

    pub fn offsets(&self) -> &InstanceBuffer {
        &self.offsets
    }

    pub fn rotations(&self) -> &InstanceBuffer {
        &self.rotations
    }

    pub fn rotation(&self, index: usize) -> Option<f32> {
        self.rotations.component(index, 0)
    }

    pub fn value(&self, index: usize) -> Option<f32> {
        self.rotation(index).map(rotation_to_value)
    }

    /// Clamps `rotation` to the knob's travel, stores it, and returns the
    /// resulting normalized value.
    pub fn set_rotation(&mut self, index: usize, rotation: f32) -> Option<f32> {
        if index >= self.len() {
            return None;
        }
        let clamped = rotation.clamp(-KNOB_ROTATION_LIMIT, KNOB_ROTATION_LIMIT);
        self.rotations.set_component(index, 0, clamped);
        Some(rotation_to_value(clamped))
    }

    pub fn flush(&mut self, uploader: &mut dyn InstanceUploader) {
        self.offsets.flush(uploader);
        self.rotations.flush(uploader);
    }
}

/// Vertical slider thumb. Its motion is the thumb center in GL units, from
/// `max_offset` (top of the track) down to `min_offset`.
#[derive(Clone, Debug)]
pub struct Slider {
    region: Region,
    scale_matrix: ScaleMatrix,
    x: f32,
    max_offset: f32,
    min_offset: f32,
    motions: InstanceBuffer,
    scissor: Scissor,
    enabled: bool,
    request_render: bool,
}

impl Slider {
    pub fn new(region: Region, thumb_height_px: f32) -> Self {
        let thumb_height_px = thumb_height_px.min(region.height());
        let half = thumb_height_px * 0.5;
        let x = region.center().x;
        let top = pixel_to_gl(vec2(x, region.min_y + half));
        let bottom = pixel_to_gl(vec2(x, region.max_y - half));
        let mut motions = InstanceBuffer::new(1);
        motions.push(&[top.y]);
        let scale_matrix = scale_matrix_for(region.width(), thumb_height_px);
        let scissor = Scissor {
            x: region.min_x,
            y: scissor_y(top.y, scale_matrix[3]),
            width: region.width(),
            height: thumb_height_px,
        };
        Self {
            region,
            scale_matrix,
            x: top.x,
            max_offset: top.y,
            min_offset: bottom.y,
            motions,
            scissor,
            enabled: true,
            request_render: true,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn scale_matrix(&self) -> &ScaleMatrix {
        &self.scale_matrix
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn max_offset(&self) -> f32 {
        self.max_offset
    }

    pub fn min_offset(&self) -> f32 {
        self.min_offset
    }

    pub fn motion(&self) -> f32 {
        self.motions.component(0, 0).unwrap_or(self.max_offset)
    }

    pub fn motions(&self) -> &InstanceBuffer {
        &self.motions
    }

    pub fn scissor(&self) -> Scissor {
        self.scissor
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.request_render = true;
        }
    }

    pub fn render_requested(&self) -> bool {
        self.request_render
    }

    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.request_render)
    }

    /// Moves the thumb and its clip rectangle to `motion`.
    pub fn apply_motion(&mut self, motion: f32) {
        let motion = motion.clamp(self.min_offset, self.max_offset);
        self.scissor.y = scissor_y(motion, self.scale_matrix[3]);
        self.motions.set_component(0, 0, motion);
        self.request_render = true;
    }

    /// Follows an absolute pointer y and returns the normalized position,
    /// 1.0 at the top of the track.
    pub fn drag_to(&mut self, pointer_y: f32) -> f32 {
        let motion = pixel_to_gl(vec2(0.0, pointer_y)).y;
        self.apply_motion(motion);
        self.normalized()
    }

    pub fn normalized(&self) -> f32 {
        let travel = self.max_offset - self.min_offset;
        if travel <= f32::EPSILON {
            return 1.0;
        }
        ((self.motion() - self.min_offset) / travel).clamp(0.0, 1.0)
    }

    pub fn flush(&mut self, uploader: &mut dyn InstanceUploader) {
        self.motions.flush(uploader);
    }
}

/// Selection highlight drawn behind one list row.
#[derive(Clone, Debug)]
pub struct Highlight {
    scale_matrix: ScaleMatrix,
    offsets: InstanceBuffer,
    alphas: InstanceBuffer,
    scissor: Scissor,
    request_render: bool,
}

impl Highlight {
    pub fn new(first_row: Region) -> Self {
        let scale_matrix = scale_matrix_for(first_row.width(), first_row.height());
        let center = pixel_to_gl(first_row.center());
        let mut offsets = InstanceBuffer::new(2);
        offsets.push(&[center.x, center.y]);
        let mut alphas = InstanceBuffer::new(1);
        alphas.push(&[0.0]);
        let scissor = Scissor {
            x: first_row.min_x,
            y: scissor_y(center.y, scale_matrix[3]),
            width: first_row.width(),
            height: first_row.height(),
        };
        Self {
            scale_matrix,
            offsets,
            alphas,
            scissor,
            request_render: true,
        }
    }

    pub fn scale_matrix(&self) -> &ScaleMatrix {
        &self.scale_matrix
    }

    pub fn offsets(&self) -> &InstanceBuffer {
        &self.offsets
    }

    pub fn alphas(&self) -> &InstanceBuffer {
        &self.alphas
    }

    pub fn offset_y(&self) -> f32 {
        self.offsets.component(0, 1).unwrap_or_default()
    }

    pub fn set_offset_y(&mut self, y: f32) {
        self.offsets.set_component(0, 1, y);
    }

    pub fn alpha(&self) -> f32 {
        self.alphas.component(0, 0).unwrap_or_default()
    }

    pub fn set_alpha(&mut self, alpha: f32) {
        self.alphas.set_component(0, 0, alpha);
    }

    pub fn scissor(&self) -> Scissor {
        self.scissor
    }

    pub fn update_scissor(&mut self) {
        self.scissor.y = scissor_y(self.offset_y(), self.scale_matrix[3]);
    }

    pub fn request_render(&mut self) {
        self.request_render = true;
    }

    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.request_render)
    }

    pub fn flush(&mut self, uploader: &mut dyn InstanceUploader) {
        self.offsets.flush(uploader);
        self.alphas.flush(uploader);
    }
}

#[derive(Clone, Debug)]
pub struct TextLine {
    pub region: Region,
    text: String,
    request_render: bool,
}

impl TextLine {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            text: String::new(),
            request_render: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Keeps at most `string_size` characters.
    pub fn update_text(&mut self, text: &str, string_size: usize) {
        let truncated: String = text.chars().take(string_size).collect();
        if truncated != self.text {
            self.text = truncated;
            self.request_render = true;
        }
    }

    pub fn request_render(&mut self) {
        self.request_render = true;
    }

    pub fn render_requested(&self) -> bool {
        self.request_render
    }

    pub fn take_render_request(&mut self) -> bool {
        std::mem::take(&mut self.request_render)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every upload so tests can assert on partial updates.
    #[derive(Default)]
    pub(crate) struct RecordingUploader {
        pub uploads: Vec<(BufferId, usize, Vec<f32>)>,
    }

    impl InstanceUploader for RecordingUploader {
        fn upload(&mut self, buffer: BufferId, offset: usize, data: &[f32]) {
            self.uploads.push((buffer, offset, data.to_vec()));
        }
    }

    #[test]
    fn flush_uploads_only_the_dirty_sub_range() {
        let mut buffer = InstanceBuffer::new(2);
        for i in 0..5 {
            buffer.push(&[i as f32, 0.0]);
        }
        let mut uploader = RecordingUploader::default();
        assert!(buffer.flush(&mut uploader));
        assert_eq!(uploader.uploads[0].1, 0);
        assert_eq!(uploader.uploads[0].2.len(), 10);

        buffer.set(1, &[9.0, 9.0]);
        buffer.set_component(3, 1, 4.0);
        assert_eq!(buffer.dirty_range(), Some(1..4));
        buffer.flush(&mut uploader);
        let (id, offset, data) = &uploader.uploads[1];
        assert_eq!(*id, buffer.id());
        assert_eq!(*offset, 2);
        assert_eq!(data, &vec![9.0, 9.0, 2.0, 0.0, 3.0, 4.0]);
        assert!(!buffer.flush(&mut uploader));
    }

    #[test]
    fn unchanged_writes_stay_clean() {
        let mut buffer = InstanceBuffer::new(1);
        buffer.push(&[1.0]);
        buffer.flush(&mut RecordingUploader::default());
        assert!(!buffer.set(0, &[1.0]));
        assert!(!buffer.set(7, &[1.0]));
        assert!(!buffer.is_dirty());
    }

    #[test]
    fn knob_rotation_is_clamped_and_normalized() {
        let mut knobs = KnobSet::new(KnobKind::Large, 64.0);
        let index = knobs.add(vec2(100.0, 100.0), 0.5);
        assert_eq!(knobs.rotation(index), Some(0.0));
        assert_eq!(knobs.set_rotation(index, PI), Some(1.0));
        assert_eq!(knobs.rotation(index), Some(KNOB_ROTATION_LIMIT));
        assert_eq!(knobs.set_rotation(index, -PI), Some(0.0));
        assert_eq!(knobs.set_rotation(5, 0.0), None);
        let region = knobs.region(index).unwrap();
        assert_eq!(region.width(), 64.0);
        assert_eq!(region.center(), vec2(100.0, 100.0));
    }

    #[test]
    fn slider_drag_is_clamped_to_its_track() {
        let mut slider = Slider::new(Region::new(700.0, 716.0, 100.0, 300.0), 40.0);
        assert_eq!(slider.normalized(), 1.0);
        assert_eq!(slider.drag_to(0.0), 1.0);
        assert_eq!(slider.drag_to(1000.0), 0.0);
        assert_eq!(slider.motion(), slider.min_offset());
        let middle = slider.drag_to(200.0);
        assert!((middle - 0.5).abs() < 1e-4);
        assert!(slider.take_render_request());
        assert!(!slider.take_render_request());
    }

    #[test]
    fn slider_scissor_follows_the_thumb() {
        let mut slider = Slider::new(Region::new(700.0, 716.0, 100.0, 300.0), 40.0);
        // Thumb top at pixel 100 → its bottom edge is 140 px from the top.
        let expected_top = VIEWPORT_HEIGHT as f32 - 140.0;
        assert!((slider.scissor().y - expected_top).abs() < 1e-3);
        slider.drag_to(1000.0);
        let expected_bottom = VIEWPORT_HEIGHT as f32 - 300.0;
        assert!((slider.scissor().y - expected_bottom).abs() < 1e-3);
    }

    #[test]
    fn text_lines_truncate_and_track_renders() {
        let mut line = TextLine::new(Region::new(0.0, 10.0, 0.0, 10.0));
        line.take_render_request();
        line.update_text("granular", 5);
        assert_eq!(line.text(), "granu");
        assert!(line.take_render_request());
        line.update_text("granular", 5);
        assert!(!line.render_requested());
    }
}
