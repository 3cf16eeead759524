use std::sync::{Arc, PoisonError, mpsc::Sender};

use macroquad::math::{Vec2, vec2};

use crate::{
    geometry::Region,
    input::{InputDispatch, WidgetCallback, WidgetKind, WidgetRecord, WidgetValue},
    instances::{InstanceCommand, InstanceTables, InstancesStatus},
    interactive_list::{InteractiveList, ListLayout, ListSource},
    parameters::{ParameterFamily, SharedParameters, write_parameter},
    render::{Background, Batch},
    settings::{VIEWPORT_HEIGHT, VIEWPORT_WIDTH},
    thread_control::ThreadControl,
    widgets::{InstanceUploader, KnobKind, KnobSet, Slider, TextLine},
};

const SAMPLE_KNOB_SIZE: f32 = 64.0;
const SAMPLE_SMALL_KNOB_SIZE: f32 = 36.0;
const VOICE_KNOB_SIZE: f32 = 56.0;
const LIST_LINES: usize = 8;
const LIST_ROW_HEIGHT: f32 = 20.0;
const LIST_STRING_SIZE: usize = 20;
const SCROLL_BAR_WIDTH: f32 = 12.0;
const SCROLL_THUMB_HEIGHT: f32 = 24.0;
const LABEL_GAP: f32 = 16.0;

#[derive(Clone, Debug)]
pub struct PanelLayout {
    pub sample_knobs: Vec<Vec2>,
    pub sample_small_knobs: Vec<Vec2>,
    pub voice_knobs: Vec<Vec2>,
    pub instances: ListLayout,
    pub voices: ListLayout,
    pub instances_scroll_bar: Region,
    pub voices_scroll_bar: Region,
    pub status_line: Region,
}

pub fn compute_panel_layout() -> PanelLayout {
    let width = VIEWPORT_WIDTH as f32;
    let height = VIEWPORT_HEIGHT as f32;
    let margin = 40.0;

    let sample_count = ParameterFamily::Sample.len();
    let sample_span = width * 0.7 - margin;
    let sample_step = sample_span / sample_count as f32;
    let sample_knobs = (0..sample_count)
        .map(|i| vec2(margin + sample_step * (i as f32 + 0.5), 110.0))
        .collect();

    let small_count = ParameterFamily::SampleSmall.len();
    let small_step = sample_step * 0.75;
    let sample_small_knobs = (0..small_count)
        .map(|i| vec2(margin + small_step * (i as f32 + 0.5), 210.0))
        .collect();

    let voice_count = ParameterFamily::Voice.len();
    let voice_left = width * 0.7 + margin * 0.5;
    let voice_step = (width - margin - voice_left) / voice_count as f32;
    let voice_knobs = (0..voice_count)
        .map(|i| vec2(voice_left + voice_step * (i as f32 + 0.5), 110.0))
        .collect();

    let list_top = 300.0;
    let list_width = 200.0;
    let list_height = LIST_ROW_HEIGHT * LIST_LINES as f32;
    let instances_left = margin;
    let voices_left = instances_left + list_width + SCROLL_BAR_WIDTH + margin;
    let list = |left: f32| ListLayout {
        first_row: Region::new(left, left + list_width, list_top, list_top + LIST_ROW_HEIGHT),
        lines_number: LIST_LINES,
        row_step_px: LIST_ROW_HEIGHT,
        string_size: LIST_STRING_SIZE,
    };
    let bar = |left: f32| {
        let x = left + list_width + 2.0;
        Region::new(x, x + SCROLL_BAR_WIDTH, list_top, list_top + list_height)
    };

    PanelLayout {
        sample_knobs,
        sample_small_knobs,
        voice_knobs,
        instances: list(instances_left),
        voices: list(voices_left),
        instances_scroll_bar: bar(instances_left),
        voices_scroll_bar: bar(voices_left),
        status_line: Region::new(margin, width - margin, height - 36.0, height - 16.0),
    }
}

/// Everything the pointer can reach. Passed to widget callbacks as their
/// context.
pub struct Panel {
    pub sample_knobs: KnobSet,
    pub sample_small_knobs: KnobSet,
    pub voice_knobs: KnobSet,
    pub instances: InteractiveList,
    pub voices: InteractiveList,
    status_line: [TextLine; 1],
    parameters: SharedParameters,
    layout: PanelLayout,
    voices_source: Option<Arc<dyn ListSource>>,
    voices_ready: Arc<ThreadControl>,
}

impl Panel {
    pub fn new(tables: &InstanceTables, commands: Sender<InstanceCommand>, parameters: SharedParameters) -> Self {
        let layout = compute_panel_layout();
        let defaults = {
            let state = parameters.lock().unwrap_or_else(PoisonError::into_inner);
            ParameterFamily::ALL.map(|family| state.values(family).to_vec())
        };
        let knob_set = |kind, size, centers: &[Vec2], values: &[f32]| {
            let mut set = KnobSet::new(kind, size);
            for (center, value) in centers.iter().zip(values) {
                set.add(*center, *value);
            }
            set
        };
        let sample_knobs = knob_set(KnobKind::Large, SAMPLE_KNOB_SIZE, &layout.sample_knobs, &defaults[0]);
        let sample_small_knobs = knob_set(
            KnobKind::Small,
            SAMPLE_SMALL_KNOB_SIZE,
            &layout.sample_small_knobs,
            &defaults[1],
        );
        let voice_knobs = knob_set(KnobKind::Large, VOICE_KNOB_SIZE, &layout.voice_knobs, &defaults[2]);

        let instance_commands = commands.clone();
        let instance_table = tables.instances.clone();
        let instances_source: Arc<dyn ListSource> = tables.instances.clone();
        let mut instances = InteractiveList::new(
            layout.instances,
            Some(instances_source),
            tables.instance_control.clone(),
            Box::new(move |absolute: usize| {
                absolute < instance_table.count()
                    && instance_commands
                        .send(InstanceCommand::SelectInstance(absolute))
                        .is_ok()
                    && instance_commands.send(InstanceCommand::SelectVoice(0)).is_ok()
            }),
        );
        instances.bind_scroll_bar(Slider::new(layout.instances_scroll_bar, SCROLL_THUMB_HEIGHT));

        let voice_table = tables.voices.clone();
        let voices_source: Arc<dyn ListSource> = tables.voices.clone();
        let mut voices = InteractiveList::new(
            layout.voices,
            None,
            tables.voice_control.clone(),
            Box::new(move |absolute: usize| {
                absolute < voice_table.count() && commands.send(InstanceCommand::SelectVoice(absolute)).is_ok()
            }),
        );
        voices.bind_scroll_bar(Slider::new(layout.voices_scroll_bar, SCROLL_THUMB_HEIGHT));

        Self {
            sample_knobs,
            sample_small_knobs,
            voice_knobs,
            instances,
            voices,
            status_line: [TextLine::new(layout.status_line)],
            parameters,
            layout,
            voices_source: Some(voices_source),
            voices_ready: tables.voice_control.clone(),
        }
    }

    pub fn layout(&self) -> &PanelLayout {
        &self.layout
    }

    pub fn knobs(&self, family: ParameterFamily) -> &KnobSet {
        match family {
            ParameterFamily::Sample => &self.sample_knobs,
            ParameterFamily::SampleSmall => &self.sample_small_knobs,
            ParameterFamily::Voice => &self.voice_knobs,
        }
    }

    fn knobs_mut(&mut self, family: ParameterFamily) -> &mut KnobSet {
        match family {
            ParameterFamily::Sample => &mut self.sample_knobs,
            ParameterFamily::SampleSmall => &mut self.sample_small_knobs,
            ParameterFamily::Voice => &mut self.voice_knobs,
        }
    }

    /// Widget records in hit-test order.
    pub fn build_dispatch(&self) -> InputDispatch<Panel> {
        let mut dispatch = InputDispatch::new();
        let families: [(ParameterFamily, WidgetKind, WidgetCallback<Panel>); 3] = [
            (ParameterFamily::Sample, WidgetKind::KnobTypeA, rotate_sample_knob),
            (ParameterFamily::SampleSmall, WidgetKind::KnobTypeB, rotate_sample_small_knob),
            (ParameterFamily::Voice, WidgetKind::KnobTypeA, rotate_voice_knob),
        ];
        for (family, kind, callback) in families {
            let knobs = self.knobs(family);
            for index in 0..knobs.len() {
                if let Some(region) = knobs.region(index) {
                    dispatch.register(WidgetRecord::new(region, kind, index, callback));
                }
            }
        }
        let lists: [(&InteractiveList, WidgetCallback<Panel>, WidgetCallback<Panel>); 2] = [
            (&self.instances, select_instance_row, drag_instances_bar),
            (&self.voices, select_voice_row, drag_voices_bar),
        ];
        for (list, row_callback, bar_callback) in lists {
            for (row, line) in list.lines().iter().enumerate() {
                dispatch.register(WidgetRecord::new(line.region, WidgetKind::ListRow, row, row_callback));
            }
            if let Some(bar) = list.scroll_bar() {
                dispatch.register(WidgetRecord::new(bar.region(), WidgetKind::ScrollBar, 0, bar_callback));
            }
        }
        dispatch
    }

    /// Static captions drawn with the background.
    pub fn decorate(&self, background: &mut Background) {
        for family in ParameterFamily::ALL {
            let knobs = self.knobs(family);
            for (index, label) in family.labels().iter().enumerate() {
                if let Some(center) = knobs.center(index) {
                    let below = center.y + knobs.size_px() * 0.5 + LABEL_GAP;
                    background.add_label(*label, vec2(center.x, below));
                }
            }
        }
        for (list, title) in [(&self.instances, "INSTANCES"), (&self.voices, "VOICES")] {
            let area = list.layout().area();
            background.add_label(title, vec2(area.center().x, area.min_y - 8.0));
        }
    }

    /// Wheel over a list scrolls it one row per notch; up shows earlier rows.
    pub fn handle_wheel(&mut self, notches: i32, point: Vec2) -> bool {
        let direction = -notches.signum();
        if self.instances.layout().area().contains(point) {
            return self.instances.scroll(direction);
        }
        if self.voices.layout().area().contains(point) {
            return self.voices.scroll(direction);
        }
        false
    }

    /// Mirrors selections made by the instances worker into the lists.
    pub fn follow_status(&mut self, status: &InstancesStatus) {
        follow_selection(&mut self.instances, status.active_instance);
        follow_selection(&mut self.voices, status.active_voice);
    }

    pub fn set_status(&mut self, text: &str) {
        self.status_line[0].update_text(text, usize::MAX);
    }

    pub fn status_text(&self) -> &str {
        self.status_line[0].text()
    }

    /// Refreshes lists the worker or the pointer touched and uploads every
    /// dirty buffer. Returns whether anything asked to be redrawn.
    pub fn update(&mut self, uploader: &mut dyn InstanceUploader) -> bool {
        // Voices only exist once the worker has loaded an instance.
        if !self.voices.is_bound() && self.voices_ready.is_ready() {
            self.voices.bind_source(self.voices_source.take());
        }
        refresh_list(&mut self.instances, uploader);
        refresh_list(&mut self.voices, uploader);
        for family in ParameterFamily::ALL {
            self.knobs_mut(family).flush(uploader);
        }
        self.instances.flush(uploader);
        self.voices.flush(uploader);

        let mut redraw = false;
        for list in [&mut self.instances, &mut self.voices] {
            redraw |= list.highlight_mut().take_render_request();
            if let Some(bar) = list.scroll_bar_mut() {
                redraw |= bar.take_render_request();
            }
            for line in list.lines_mut() {
                redraw |= line.take_render_request();
            }
        }
        redraw |= self.status_line[0].take_render_request();
        redraw
    }

    pub fn batches(&self) -> Vec<Batch<'_>> {
        let mut batches = vec![
            Batch::Knobs(&self.sample_knobs),
            Batch::Knobs(&self.sample_small_knobs),
            Batch::Knobs(&self.voice_knobs),
        ];
        for list in [&self.instances, &self.voices] {
            batches.push(Batch::Highlight(list.highlight()));
            batches.push(Batch::Text(list.lines()));
            if let Some(bar) = list.scroll_bar() {
                batches.push(Batch::Slider(bar));
            }
        }
        batches.push(Batch::Text(&self.status_line));
        batches
    }

    fn rotate(&mut self, family: ParameterFamily, index: usize, value: &WidgetValue) {
        let WidgetValue::Rotation(rotation) = value else {
            return;
        };
        if let Some(normalized) = self.knobs_mut(family).set_rotation(index, *rotation) {
            write_parameter(&self.parameters, family, index, normalized);
        }
    }
}

fn rotate_sample_knob(panel: &mut Panel, index: usize, value: &WidgetValue) {
    panel.rotate(ParameterFamily::Sample, index, value);
}

fn rotate_sample_small_knob(panel: &mut Panel, index: usize, value: &WidgetValue) {
    panel.rotate(ParameterFamily::SampleSmall, index, value);
}

fn rotate_voice_knob(panel: &mut Panel, index: usize, value: &WidgetValue) {
    panel.rotate(ParameterFamily::Voice, index, value);
}

fn select_instance_row(panel: &mut Panel, row: usize, _value: &WidgetValue) {
    panel.instances.select_item(row);
}

fn select_voice_row(panel: &mut Panel, row: usize, _value: &WidgetValue) {
    panel.voices.select_item(row);
}

fn drag_instances_bar(panel: &mut Panel, _index: usize, value: &WidgetValue) {
    if let WidgetValue::Pointer(point) = value {
        panel.instances.drag_scroll_bar(point.y);
    }
}

fn drag_voices_bar(panel: &mut Panel, _index: usize, value: &WidgetValue) {
    if let WidgetValue::Pointer(point) = value {
        panel.voices.drag_scroll_bar(point.y);
    }
}

fn refresh_list(list: &mut InteractiveList, uploader: &mut dyn InstanceUploader) {
    if list.thread_control().take_update() && !list.refresh_pending(uploader) {
        list.refresh(0, uploader);
    }
}

fn follow_selection(list: &mut InteractiveList, absolute: Option<usize>) {
    let Some(absolute) = absolute else {
        return;
    };
    let offset = list.window_offset();
    if list.index().map(|row| row + offset) == Some(absolute) {
        return;
    }
    let Some(row) = absolute
        .checked_sub(offset)
        .filter(|row| *row < list.lines_number())
    else {
        return;
    };
    if row >= list.source_count() {
        return;
    }
    let control = list.thread_control();
    let held = control.lock();
    list.select_item_held(row, &held);
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::{
        parameters::shared_parameters,
        render::{
            render_frame,
            tests::{Op, RecordingBackend},
        },
        widgets::tests::RecordingUploader,
    };

    fn panel() -> (Panel, InstanceTables, mpsc::Receiver<InstanceCommand>, SharedParameters) {
        let tables = InstanceTables::new();
        let (sender, receiver) = mpsc::channel();
        let parameters = shared_parameters();
        let panel = Panel::new(&tables, sender, parameters.clone());
        (panel, tables, receiver, parameters)
    }

    #[test]
    fn layout_fits_the_window() {
        let layout = compute_panel_layout();
        let window = Region::new(0.0, VIEWPORT_WIDTH as f32, 0.0, VIEWPORT_HEIGHT as f32);
        for center in layout
            .sample_knobs
            .iter()
            .chain(&layout.sample_small_knobs)
            .chain(&layout.voice_knobs)
        {
            assert!(window.contains(*center));
        }
        assert!(layout.instances.area().max_x < layout.instances_scroll_bar.min_x);
        assert!(layout.instances_scroll_bar.max_x < layout.voices.area().min_x);
        assert!(layout.status_line.max_y < VIEWPORT_HEIGHT as f32);
    }

    #[test]
    fn dragging_a_voice_knob_writes_the_parameter() {
        let (mut panel, _tables, _receiver, parameters) = panel();
        let mut dispatch = panel.build_dispatch();
        let center = panel.voice_knobs.center(0).unwrap();
        assert!(dispatch.on_press(center + vec2(1.0, 0.0), &mut panel));
        assert_eq!(dispatch.active(), Some((WidgetKind::KnobTypeA, 0)));
        // Pointing straight left is -90 degrees.
        dispatch.on_drag(center - vec2(100.0, 0.0), &mut panel);
        dispatch.on_release();
        let expected = crate::widgets::rotation_to_value(-std::f32::consts::FRAC_PI_2);
        let stored = parameters.lock().unwrap().get(ParameterFamily::Voice, 0).unwrap();
        assert!((stored - expected).abs() < 1e-6);
        assert_eq!(panel.voice_knobs.value(0), Some(stored));
    }

    #[test]
    fn every_widget_gets_a_record_and_every_knob_a_caption() {
        let (panel, _tables, _receiver, _parameters) = panel();
        let dispatch = panel.build_dispatch();
        let knobs: usize = ParameterFamily::ALL.iter().map(|family| family.len()).sum();
        assert_eq!(dispatch.widgets().len(), knobs + 2 * (LIST_LINES + 1));

        let mut background = Background::plain();
        panel.decorate(&mut background);
        assert_eq!(background.labels().len(), knobs + 2);
        assert!(background.labels().iter().any(|(text, _)| text == "DENSITY"));
    }

    #[test]
    fn small_knobs_dispatch_as_the_second_knob_type() {
        let (mut panel, _tables, _receiver, _parameters) = panel();
        let mut dispatch = panel.build_dispatch();
        let center = panel.sample_small_knobs.center(2).unwrap();
        dispatch.on_press(center, &mut panel);
        assert_eq!(dispatch.active(), Some((WidgetKind::KnobTypeB, 2)));
    }

    #[test]
    fn pressing_an_instance_row_asks_the_worker() {
        let (mut panel, tables, receiver, _parameters) = panel();
        tables.instances.replace(["1", "2", "3"]);
        let mut dispatch = panel.build_dispatch();
        let row = panel.instances.lines()[1].region.center();
        dispatch.on_press(row, &mut panel);
        assert_eq!(receiver.try_recv(), Ok(InstanceCommand::SelectInstance(1)));
        assert_eq!(receiver.try_recv(), Ok(InstanceCommand::SelectVoice(0)));
        assert_eq!(panel.instances.index(), Some(1));
    }

    #[test]
    fn pressing_a_blank_row_changes_nothing() {
        let (mut panel, tables, receiver, _parameters) = panel();
        tables.instances.replace(["1", "2"]);
        let mut dispatch = panel.build_dispatch();
        dispatch.on_press(panel.instances.lines()[1].region.center(), &mut panel);
        dispatch.on_release();
        assert_eq!(receiver.try_recv(), Ok(InstanceCommand::SelectInstance(1)));
        assert_eq!(receiver.try_recv(), Ok(InstanceCommand::SelectVoice(0)));

        dispatch.on_press(panel.instances.lines()[5].region.center(), &mut panel);
        dispatch.on_release();
        assert_eq!(panel.instances.index(), Some(1));
        assert_eq!(panel.instances.previous_item_index(), 1);
        assert!(receiver.try_recv().is_err());

        tables.voices.replace(["1"]);
        tables.voice_control.set_ready(true);
        panel.update(&mut RecordingUploader::default());
        assert!(!panel.voices.select_item(3));
        assert_eq!(panel.voices.index(), None);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn wheel_scrolls_the_list_under_the_pointer() {
        let (mut panel, tables, _receiver, _parameters) = panel();
        tables.voices.replace((1..=12).map(|i| i.to_string()));
        tables.voice_control.set_ready(true);
        panel.update(&mut RecordingUploader::default());
        let over_voices = panel.voices.layout().area().center();
        assert!(panel.handle_wheel(-1, over_voices));
        assert_eq!(panel.voices.window_offset(), 1);
        assert!(panel.handle_wheel(1, over_voices));
        assert_eq!(panel.voices.window_offset(), 0);
        assert!(!panel.handle_wheel(-1, vec2(1.0, 1.0)));
    }

    #[test]
    fn worker_selection_is_mirrored_without_a_callback_round_trip() {
        let (mut panel, tables, receiver, _parameters) = panel();
        tables.instances.replace(["1", "2"]);
        let status = InstancesStatus {
            active_instance: Some(1),
            ..InstancesStatus::default()
        };
        panel.follow_status(&status);
        assert_eq!(panel.instances.index(), Some(1));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn voice_list_stays_unbound_until_the_worker_is_ready() {
        let (mut panel, tables, receiver, _parameters) = panel();
        tables.voices.replace(["1", "2"]);
        let mut uploader = RecordingUploader::default();
        panel.update(&mut uploader);
        assert!(!panel.voices.is_bound());
        assert!(!panel.voices.scroll_bar().unwrap().enabled());
        assert!(!panel.voices.select_item(0));
        assert!(receiver.try_recv().is_err());

        tables.voice_control.set_ready(true);
        panel.update(&mut uploader);
        assert!(panel.voices.is_bound());
        assert_eq!(panel.voices.lines()[1].text(), "2");
        assert!(panel.voices.select_item(1));
        assert_eq!(receiver.try_recv(), Ok(InstanceCommand::SelectVoice(1)));
    }

    #[test]
    fn update_refreshes_rows_once_the_worker_signals() {
        let (mut panel, tables, _receiver, _parameters) = panel();
        let mut uploader = RecordingUploader::default();
        panel.update(&mut uploader);
        assert!(panel.instances.lines()[0].text().is_empty());

        {
            let _held = tables.instance_control.lock();
            tables.instances.replace(["1", "2"]);
            tables.instance_control.request_update();
        }
        panel.update(&mut uploader);
        assert_eq!(panel.instances.lines()[0].text(), "1");
        assert_eq!(panel.instances.lines()[1].text(), "2");
        assert!(!panel.instances.scroll_bar().unwrap().enabled());
    }

    #[test]
    fn frame_draws_knob_families_before_lists() {
        let (mut panel, _tables, _receiver, _parameters) = panel();
        let mut backend = RecordingBackend::default();
        panel.update(&mut backend);
        backend.ops.clear();
        let batches = panel.batches();
        render_frame(&mut backend, &Background::plain(), &batches);
        let draws: Vec<&Op> = backend
            .ops
            .iter()
            .filter(|op| matches!(op, Op::Draw(_)))
            .collect();
        assert_eq!(draws.len(), batches.len());
        assert_eq!(backend.ops[4], Op::Scale(*panel.sample_knobs.scale_matrix()));
        assert_eq!(backend.ops[6], Op::Scale(*panel.sample_small_knobs.scale_matrix()));
        assert_eq!(backend.ops[8], Op::Scale(*panel.voice_knobs.scale_matrix()));
    }

    #[test]
    fn knob_turns_upload_only_the_turned_instance() {
        let (mut panel, _tables, _receiver, _parameters) = panel();
        let mut uploader = RecordingUploader::default();
        panel.update(&mut uploader);
        uploader.uploads.clear();
        panel.rotate(ParameterFamily::Sample, 3, &WidgetValue::Rotation(0.5));
        panel.update(&mut uploader);
        let rotations = panel.sample_knobs.rotations().id();
        let knob_uploads: Vec<_> = uploader
            .uploads
            .iter()
            .filter(|(id, _, _)| *id == rotations)
            .collect();
        assert_eq!(knob_uploads.len(), 1);
        assert_eq!(knob_uploads[0].1, 3);
        assert_eq!(knob_uploads[0].2, vec![0.5]);
    }
}
