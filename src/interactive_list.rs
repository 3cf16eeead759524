use std::sync::{Arc, PoisonError, RwLock};

use log::debug;
use macroquad::math::{Vec2, vec2};

use crate::{
    geometry::{Region, pixel_to_gl},
    settings::VIEWPORT_HEIGHT,
    thread_control::{GateGuard, ThreadControl},
    widgets::{Highlight, InstanceUploader, Slider, TextLine},
};

const NO_SELECTION: isize = -1;

/// Externally owned rows displayed by an [`InteractiveList`]. The list only
/// reads through this view and never changes or drops the records.
///
/// Implementors must only change `count` while holding the gate of the
/// [`ThreadControl`] the list was bound with, or from the UI thread.
pub trait ListSource: Send + Sync {
    fn count(&self) -> usize;
    fn record(&self, index: usize) -> Option<String>;
}

/// Fixed-stride table of NUL-terminated names.
#[derive(Debug)]
pub struct RecordTable {
    stride: usize,
    bytes: RwLock<Vec<u8>>,
}

impl RecordTable {
    pub fn new(stride: usize) -> Arc<Self> {
        Arc::new(Self {
            stride: stride.max(2),
            bytes: RwLock::new(Vec::new()),
        })
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn push(&self, record: &str) {
        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        self.write_record(&mut bytes, record);
    }

    pub fn replace<I, S>(&self, records: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        bytes.clear();
        for record in records {
            self.write_record(&mut bytes, record.as_ref());
        }
    }

    pub fn truncate(&self, count: usize) {
        let mut bytes = self.bytes.write().unwrap_or_else(PoisonError::into_inner);
        bytes.truncate(count * self.stride);
    }

    fn write_record(&self, bytes: &mut Vec<u8>, record: &str) {
        let mut slot = vec![0u8; self.stride];
        let raw = record.as_bytes();
        let len = raw.len().min(self.stride - 1);
        slot[..len].copy_from_slice(&raw[..len]);
        bytes.extend_from_slice(&slot);
    }
}

impl ListSource for RecordTable {
    fn count(&self) -> usize {
        self.bytes.read().unwrap_or_else(PoisonError::into_inner).len() / self.stride
    }

    fn record(&self, index: usize) -> Option<String> {
        let bytes = self.bytes.read().unwrap_or_else(PoisonError::into_inner);
        let start = index.checked_mul(self.stride)?;
        let slot = bytes.get(start..start + self.stride)?;
        let end = slot.iter().position(|byte| *byte == 0).unwrap_or(slot.len());
        Some(String::from_utf8_lossy(&slot[..end]).into_owned())
    }
}

/// Veto hook run before a selection is committed. Receives the absolute
/// index into the source; returning `false` leaves the list untouched.
/// Must not block.
pub type SelectCallback = Box<dyn FnMut(usize) -> bool + Send>;

#[derive(Clone, Copy, Debug)]
pub struct ListLayout {
    pub first_row: Region,
    pub lines_number: usize,
    pub row_step_px: f32,
    pub string_size: usize,
}

impl ListLayout {
    pub fn row_region(&self, row: usize) -> Region {
        let shift = self.row_step_px * row as f32;
        Region::new(
            self.first_row.min_x,
            self.first_row.max_x,
            self.first_row.min_y + shift,
            self.first_row.max_y + shift,
        )
    }

    pub fn area(&self) -> Region {
        let last = self.row_region(self.lines_number.saturating_sub(1));
        Region::new(
            self.first_row.min_x,
            self.first_row.max_x,
            self.first_row.min_y,
            last.max_y,
        )
    }
}

/// Scrollable, selectable window over a [`ListSource`].
///
/// Every mutating entry point takes the bound [`ThreadControl`] gate for its
/// whole critical section, except [`InteractiveList::select_item_held`] whose
/// caller proves it already holds the gate.
pub struct InteractiveList {
    layout: ListLayout,
    lines: Vec<TextLine>,
    highlight: Highlight,
    scroll_bar: Option<Slider>,
    window_offset: usize,
    index: isize,
    previous_item_index: usize,
    source: Option<Arc<dyn ListSource>>,
    control: Arc<ThreadControl>,
    select_callback: SelectCallback,
    highlight_step: f32,
    highlight_offset_y: f32,
    max_scroll_bar_offset: f32,
    update_request: Option<usize>,
    update_highlight: bool,
}

impl InteractiveList {
    pub fn new(
        layout: ListLayout,
        source: Option<Arc<dyn ListSource>>,
        control: Arc<ThreadControl>,
        select_callback: SelectCallback,
    ) -> Self {
        let lines = (0..layout.lines_number)
            .map(|row| TextLine::new(layout.row_region(row)))
            .collect();
        let highlight = Highlight::new(layout.first_row);
        let highlight_offset_y = highlight.offset_y();
        let highlight_step = -layout.row_step_px / (VIEWPORT_HEIGHT / 2) as f32;
        Self {
            layout,
            lines,
            highlight,
            scroll_bar: None,
            window_offset: 0,
            index: NO_SELECTION,
            previous_item_index: 0,
            source,
            control,
            select_callback,
            highlight_step,
            highlight_offset_y,
            max_scroll_bar_offset: 0.0,
            update_request: Some(0),
            update_highlight: false,
        }
    }

    /// Couples `scroll_bar` to this list; its drag then scrolls the list.
    pub fn bind_scroll_bar(&mut self, mut scroll_bar: Slider) {
        self.max_scroll_bar_offset = scroll_bar.motion();
        if self.source.is_none() {
            scroll_bar.set_enabled(false);
        }
        self.scroll_bar = Some(scroll_bar);
    }

    /// Swaps the data source, resetting the window to the top.
    pub fn bind_source(&mut self, source: Option<Arc<dyn ListSource>>) {
        let control = Arc::clone(&self.control);
        let _held = control.lock();
        self.source = source;
        self.window_offset = 0;
        self.index = NO_SELECTION;
        self.highlight.set_alpha(0.0);
        self.update_highlight = true;
        self.update_request = Some(0);
        if let Some(scroll_bar) = self.scroll_bar.as_mut() {
            scroll_bar.set_enabled(self.source.is_some());
        }
        self.update_scroll_bar();
        control.request_update();
    }

    pub fn is_bound(&self) -> bool {
        self.source.is_some()
    }

    pub fn lines_number(&self) -> usize {
        self.layout.lines_number
    }

    pub fn layout(&self) -> &ListLayout {
        &self.layout
    }

    pub fn window_offset(&self) -> usize {
        self.window_offset
    }

    /// Highlighted row inside the visible window, if any.
    pub fn index(&self) -> Option<usize> {
        usize::try_from(self.index)
            .ok()
            .filter(|row| *row < self.layout.lines_number)
    }

    pub fn previous_item_index(&self) -> usize {
        self.previous_item_index
    }

    pub fn lines(&self) -> &[TextLine] {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut [TextLine] {
        &mut self.lines
    }

    pub fn highlight(&self) -> &Highlight {
        &self.highlight
    }

    pub fn highlight_mut(&mut self) -> &mut Highlight {
        &mut self.highlight
    }

    pub fn scroll_bar(&self) -> Option<&Slider> {
        self.scroll_bar.as_ref()
    }

    pub fn scroll_bar_mut(&mut self) -> Option<&mut Slider> {
        self.scroll_bar.as_mut()
    }

    pub fn thread_control(&self) -> Arc<ThreadControl> {
        Arc::clone(&self.control)
    }

    pub fn highlight_update_pending(&self) -> bool {
        self.update_highlight
    }

    pub fn update_request(&self) -> Option<usize> {
        self.update_request
    }

    pub fn source_count(&self) -> usize {
        self.source.as_ref().map_or(0, |source| source.count())
    }

    /// Moves the window one row. Returns whether it moved.
    pub fn scroll(&mut self, direction: i32) -> bool {
        let control = Arc::clone(&self.control);
        let _held = control.lock();
        if self.source.is_none() {
            return false;
        }
        let count = self.source_count();
        let step = direction.signum();
        let room = match step {
            1 => self.window_offset + self.layout.lines_number < count,
            -1 => self.window_offset > 0,
            _ => false,
        };
        if room {
            if step > 0 {
                self.window_offset += 1;
            } else {
                self.window_offset -= 1;
            }
            self.index -= step as isize;
            self.update_request = Some(0);
            control.request_update();
            self.follow_highlight();
        }
        if self.scroll_bar.is_some() {
            self.update_scroll_bar();
        }
        room
    }

    /// Positions the window from a scroll-bar value in `[0, 1]`, where 1.0 is
    /// the top of the list. Returns whether the window moved.
    pub fn scroll_by_slider(&mut self, normalized_value: f32) -> bool {
        let control = Arc::clone(&self.control);
        let _held = control.lock();
        let Some(source) = self.source.as_ref() else {
            return false;
        };
        let span = source.count().saturating_sub(self.layout.lines_number);
        let slider_value = 1.0 - normalized_value.clamp(0.0, 1.0);
        // f32::round rounds half away from zero.
        let target = (slider_value * span as f32).round() as usize;
        if target == self.window_offset {
            return false;
        }
        self.index += self.window_offset as isize - target as isize;
        self.window_offset = target;
        self.update_request = Some(0);
        control.request_update();
        self.follow_highlight();
        true
    }

    /// Drags the bound scroll bar to `pointer_y` and scrolls accordingly.
    pub fn drag_scroll_bar(&mut self, pointer_y: f32) -> bool {
        let value = match self.scroll_bar.as_mut() {
            Some(scroll_bar) if scroll_bar.enabled() => scroll_bar.drag_to(pointer_y),
            _ => return false,
        };
        self.scroll_by_slider(value)
    }

    /// Selects a visible row after the select callback agrees.
    pub fn select_item(&mut self, row: usize) -> bool {
        let control = Arc::clone(&self.control);
        let _held = control.lock();
        if row >= self.layout.lines_number || self.source.is_none() {
            return false;
        }
        let absolute = row + self.window_offset;
        if !(self.select_callback)(absolute) {
            debug!("selection of item {absolute} vetoed");
            return false;
        }
        self.commit_selection(row);
        true
    }

    /// Selects a visible row without consulting the select callback. The
    /// caller must hold this list's gate, obtained through
    /// [`InteractiveList::thread_control`].
    pub fn select_item_held(&mut self, row: usize, _held: &GateGuard<'_>) -> bool {
        if row >= self.layout.lines_number || self.source.is_none() {
            return false;
        }
        self.commit_selection(row);
        true
    }

    /// Runs the refresh queued by earlier mutations, if any.
    pub fn refresh_pending(&mut self, uploader: &mut dyn InstanceUploader) -> bool {
        match self.update_request.take() {
            Some(start) => {
                self.refresh(start, uploader);
                true
            }
            None => false,
        }
    }

    /// Rewrites rows `[requested_start_index, lines_number)` from the source,
    /// updates the scroll bar and uploads a pending highlight move.
    pub fn refresh(&mut self, requested_start_index: usize, uploader: &mut dyn InstanceUploader) {
        let control = Arc::clone(&self.control);
        let _held = control.lock();
        let count = self.source_count();
        let max_window_offset = count.saturating_sub(self.layout.lines_number);
        if self.window_offset > max_window_offset {
            self.index += (self.window_offset - max_window_offset) as isize;
            self.window_offset = max_window_offset;
            self.follow_highlight();
        }

        for row in requested_start_index..self.layout.lines_number {
            let absolute = row + self.window_offset;
            let text = match self.source.as_ref() {
                Some(source) if absolute < count => source.record(absolute).unwrap_or_default(),
                _ => String::new(),
            };
            self.lines[row].update_text(&text, self.layout.string_size);
        }

        let lines_number = self.layout.lines_number;
        if let Some(scroll_bar) = self.scroll_bar.as_mut() {
            scroll_bar.set_enabled(self.source.is_some() && count > lines_number);
            if !scroll_bar.render_requested() {
                self.update_scroll_bar();
            }
        }

        if self.update_highlight {
            self.highlight.update_scissor();
            self.highlight.flush(uploader);
            self.highlight.request_render();
            self.update_highlight = false;
        }
    }

    /// Uploads whatever the scroll bar changed since the last frame.
    pub fn flush(&mut self, uploader: &mut dyn InstanceUploader) {
        if let Some(scroll_bar) = self.scroll_bar.as_mut() {
            scroll_bar.flush(uploader);
        }
        self.highlight.flush(uploader);
    }

    fn follow_highlight(&mut self) {
        match self.index() {
            Some(row) => self.commit_selection(row),
            None => {
                self.update_highlight = true;
                self.highlight.set_alpha(0.0);
            }
        }
    }

    fn commit_selection(&mut self, row: usize) {
        if let Some(previous) = self.lines.get_mut(self.previous_item_index) {
            previous.request_render();
        }
        self.lines[row].request_render();
        self.control.request_update();
        self.highlight.set_alpha(1.0);
        self.update_highlight = true;
        self.highlight
            .set_offset_y(self.highlight_offset_y + self.highlight_step * row as f32);
        self.index = row as isize;
        self.previous_item_index = row;
    }

    fn update_scroll_bar(&mut self) {
        let count = self.source_count();
        let window_offset = self.window_offset;
        let lines_number = self.layout.lines_number;
        let max_offset = self.max_scroll_bar_offset;
        if let Some(scroll_bar) = self.scroll_bar.as_mut() {
            let motion = scroll_bar_motion(
                window_offset,
                count,
                lines_number,
                scroll_bar.region().height(),
                scroll_bar.scale_matrix()[3],
                max_offset,
            );
            scroll_bar.apply_motion(motion);
        }
    }
}

/// Thumb position in GL units for a window offset, snapped down to whole
/// device pixels.
pub fn scroll_bar_motion(
    window_offset: usize,
    count: usize,
    lines_number: usize,
    track_height_px: f32,
    thumb_half_height: f32,
    max_offset: f32,
) -> f32 {
    let half_viewport = (VIEWPORT_HEIGHT / 2) as f32;
    let pixel = 1.0 / half_viewport;
    let span = count.saturating_sub(lines_number);
    let mut relative = if span == 0 {
        0.0
    } else {
        window_offset.min(span) as f32 / span as f32
    };
    let travel_px = track_height_px - thumb_half_height * VIEWPORT_HEIGHT as f32;
    relative *= travel_px / half_viewport;
    let steps = (relative / pixel).floor().max(0.0);
    max_offset - steps * pixel
}

/// Center of the first row in GL units, as used for the highlight.
pub fn row_center_gl(layout: &ListLayout, row: usize) -> Vec2 {
    let region = layout.row_region(row);
    pixel_to_gl(vec2(region.center().x, region.center().y))
}
