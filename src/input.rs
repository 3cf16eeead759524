use macroquad::{
    input::{
        MouseButton, is_mouse_button_down, is_mouse_button_pressed, is_mouse_button_released,
        mouse_position, mouse_wheel,
    },
    math::{Vec2, vec2},
};

use crate::geometry::{Region, compute_rotation};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WidgetKind {
    KnobTypeA,
    KnobTypeB,
    Slider,
    ListRow,
    ScrollBar,
}

impl WidgetKind {
    pub fn is_knob(self) -> bool {
        matches!(self, WidgetKind::KnobTypeA | WidgetKind::KnobTypeB)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WidgetValue {
    /// Knob angle from [`compute_rotation`], radians.
    Rotation(f32),
    /// Absolute pointer position for sliders doing their own drag math.
    Pointer(Vec2),
    /// A list row was pressed.
    Select,
}

/// Called with the widget's index inside its owning family. Must not block.
pub type WidgetCallback<Ctx> = fn(&mut Ctx, usize, &WidgetValue);

pub struct WidgetRecord<Ctx> {
    pub region: Region,
    pub kind: WidgetKind,
    pub index: usize,
    pub callback: WidgetCallback<Ctx>,
}

impl<Ctx> WidgetRecord<Ctx> {
    pub fn new(region: Region, kind: WidgetKind, index: usize, callback: WidgetCallback<Ctx>) -> Self {
        Self {
            region,
            kind,
            index,
            callback,
        }
    }
}

struct ActiveWidget<Ctx> {
    kind: WidgetKind,
    index: usize,
    callback: WidgetCallback<Ctx>,
    center: Option<Vec2>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointerEvent {
    Press(Vec2),
    Drag(Vec2),
    Release,
}

/// Routes pointer events to at most one captured widget.
///
/// Widgets are tested in registration order and the first region containing
/// the press wins; overlapping regions are not resolved any further.
pub struct InputDispatch<Ctx> {
    widgets: Vec<WidgetRecord<Ctx>>,
    active: Option<ActiveWidget<Ctx>>,
}

impl<Ctx> Default for InputDispatch<Ctx> {
    fn default() -> Self {
        Self {
            widgets: Vec::new(),
            active: None,
        }
    }
}

impl<Ctx> InputDispatch<Ctx> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, record: WidgetRecord<Ctx>) {
        self.widgets.push(record);
    }

    pub fn widgets(&self) -> &[WidgetRecord<Ctx>] {
        &self.widgets
    }

    pub fn is_captured(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<(WidgetKind, usize)> {
        self.active.as_ref().map(|active| (active.kind, active.index))
    }

    pub fn dispatch(&mut self, event: PointerEvent, ctx: &mut Ctx) {
        match event {
            PointerEvent::Press(point) => {
                self.on_press(point, ctx);
            }
            PointerEvent::Drag(point) => self.on_drag(point, ctx),
            PointerEvent::Release => self.on_release(),
        }
    }

    /// Captures the first widget under `point`. Returns whether one was
    /// captured by this press.
    pub fn on_press(&mut self, point: Vec2, ctx: &mut Ctx) -> bool {
        if self.active.is_some() {
            return false;
        }
        let Some(record) = self.widgets.iter().find(|record| record.region.contains(point)) else {
            return false;
        };
        let active = ActiveWidget {
            kind: record.kind,
            index: record.index,
            callback: record.callback,
            center: record.kind.is_knob().then(|| record.region.center()),
        };
        if active.kind == WidgetKind::ListRow {
            (active.callback)(ctx, active.index, &WidgetValue::Select);
        }
        self.active = Some(active);
        true
    }

    pub fn on_drag(&mut self, point: Vec2, ctx: &mut Ctx) {
        let Some(active) = self.active.as_ref() else {
            return;
        };
        let value = match (active.kind, active.center) {
            (kind, Some(center)) if kind.is_knob() => WidgetValue::Rotation(compute_rotation(point, center)),
            (WidgetKind::Slider | WidgetKind::ScrollBar, _) => WidgetValue::Pointer(point),
            _ => return,
        };
        (active.callback)(ctx, active.index, &value);
    }

    pub fn on_release(&mut self) {
        self.active = None;
    }
}

/// Left-button state for this frame as dispatcher events, press first.
pub fn poll_pointer_events() -> Vec<PointerEvent> {
    let (x, y) = mouse_position();
    let mouse = vec2(x, y);
    let mut events = Vec::with_capacity(2);
    if is_mouse_button_pressed(MouseButton::Left) {
        events.push(PointerEvent::Press(mouse));
    }
    if is_mouse_button_down(MouseButton::Left) {
        events.push(PointerEvent::Drag(mouse));
    }
    if is_mouse_button_released(MouseButton::Left) {
        events.push(PointerEvent::Release);
    }
    events
}

/// Wheel notches this frame, positive when scrolling up, with the pointer.
pub fn poll_wheel() -> Option<(i32, Vec2)> {
    let (_x, wheel) = mouse_wheel();
    if wheel.abs() <= f32::EPSILON {
        return None;
    }
    let (x, y) = mouse_position();
    Some((wheel.signum() as i32, vec2(x, y)))
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use proptest::prelude::*;

    use super::*;

    #[derive(Default)]
    struct Log {
        calls: Vec<(usize, WidgetValue)>,
    }

    fn record(ctx: &mut Log, index: usize, value: &WidgetValue) {
        ctx.calls.push((index, *value));
    }

    fn dispatch_with(kinds: &[(WidgetKind, Region)]) -> InputDispatch<Log> {
        let mut dispatch = InputDispatch::new();
        for (index, (kind, region)) in kinds.iter().enumerate() {
            dispatch.register(WidgetRecord::new(*region, *kind, index, record));
        }
        dispatch
    }

    #[test]
    fn knob_drag_reports_rotation_around_the_press_center() {
        let mut dispatch = dispatch_with(&[(WidgetKind::KnobTypeA, Region::new(0.0, 100.0, 0.0, 100.0))]);
        let mut log = Log::default();
        assert!(dispatch.on_press(vec2(60.0, 50.0), &mut log));
        assert!(log.calls.is_empty());
        dispatch.on_drag(vec2(90.0, 50.0), &mut log);
        let (index, value) = log.calls[0];
        assert_eq!(index, 0);
        let WidgetValue::Rotation(angle) = value else {
            panic!("expected a rotation, got {value:?}");
        };
        assert!((angle - FRAC_PI_2).abs() < 1e-6);
    }

    #[test]
    fn press_outside_every_region_stays_idle() {
        let mut dispatch = dispatch_with(&[(WidgetKind::Slider, Region::new(0.0, 10.0, 0.0, 10.0))]);
        let mut log = Log::default();
        assert!(!dispatch.on_press(vec2(10.0, 5.0), &mut log));
        assert!(!dispatch.is_captured());
        dispatch.on_drag(vec2(5.0, 5.0), &mut log);
        assert!(log.calls.is_empty());
    }

    #[test]
    fn list_rows_select_on_press_and_ignore_motion() {
        let mut dispatch = dispatch_with(&[
            (WidgetKind::ListRow, Region::new(0.0, 50.0, 0.0, 10.0)),
            (WidgetKind::ListRow, Region::new(0.0, 50.0, 10.0, 20.0)),
        ]);
        let mut log = Log::default();
        dispatch.on_press(vec2(5.0, 15.0), &mut log);
        dispatch.on_drag(vec2(5.0, 30.0), &mut log);
        assert_eq!(log.calls, vec![(1, WidgetValue::Select)]);
    }

    #[test]
    fn sliders_receive_absolute_pointer_positions() {
        let mut dispatch = dispatch_with(&[(WidgetKind::ScrollBar, Region::new(0.0, 10.0, 0.0, 100.0))]);
        let mut log = Log::default();
        dispatch.on_press(vec2(5.0, 50.0), &mut log);
        dispatch.on_drag(vec2(40.0, 200.0), &mut log);
        assert_eq!(log.calls, vec![(0, WidgetValue::Pointer(vec2(40.0, 200.0)))]);
    }

    #[test]
    fn capture_holds_until_release() {
        let mut dispatch = dispatch_with(&[
            (WidgetKind::KnobTypeB, Region::new(0.0, 10.0, 0.0, 10.0)),
            (WidgetKind::Slider, Region::new(20.0, 30.0, 0.0, 10.0)),
        ]);
        let mut log = Log::default();
        dispatch.on_press(vec2(5.0, 5.0), &mut log);
        assert!(!dispatch.on_press(vec2(25.0, 5.0), &mut log));
        assert_eq!(dispatch.active(), Some((WidgetKind::KnobTypeB, 0)));
        dispatch.dispatch(PointerEvent::Release, &mut log);
        dispatch.dispatch(PointerEvent::Press(vec2(25.0, 5.0)), &mut log);
        assert_eq!(dispatch.active(), Some((WidgetKind::Slider, 1)));
    }

    #[test]
    fn release_without_capture_is_harmless() {
        let mut dispatch: InputDispatch<Log> = InputDispatch::new();
        dispatch.on_release();
        assert!(!dispatch.is_captured());
    }

    fn region_strategy() -> impl Strategy<Value = Region> {
        (0.0f32..200.0, 1.0f32..100.0, 0.0f32..200.0, 1.0f32..100.0)
            .prop_map(|(x, w, y, h)| Region::new(x, x + w, y, y + h))
    }

    proptest! {
        #[test]
        fn press_captures_the_first_containing_region(
            regions in prop::collection::vec(region_strategy(), 0..12),
            x in 0.0f32..300.0,
            y in 0.0f32..300.0,
        ) {
            let kinds: Vec<(WidgetKind, Region)> =
                regions.iter().map(|region| (WidgetKind::Slider, *region)).collect();
            let mut dispatch = dispatch_with(&kinds);
            let mut log = Log::default();
            let point = vec2(x, y);
            dispatch.on_press(point, &mut log);
            let expected = regions.iter().position(|region| region.contains(point));
            prop_assert_eq!(dispatch.active().map(|(_, index)| index), expected);
        }

        #[test]
        fn release_always_returns_to_idle(
            regions in prop::collection::vec(region_strategy(), 0..6),
            events in prop::collection::vec((0u8..3, 0.0f32..300.0, 0.0f32..300.0), 0..20),
        ) {
            let kinds: Vec<(WidgetKind, Region)> = regions
                .iter()
                .enumerate()
                .map(|(i, region)| {
                    let kind = if i % 2 == 0 { WidgetKind::KnobTypeA } else { WidgetKind::ListRow };
                    (kind, *region)
                })
                .collect();
            let mut dispatch = dispatch_with(&kinds);
            let mut log = Log::default();
            for (kind, x, y) in events {
                let event = match kind {
                    0 => PointerEvent::Press(vec2(x, y)),
                    1 => PointerEvent::Drag(vec2(x, y)),
                    _ => PointerEvent::Release,
                };
                dispatch.dispatch(event, &mut log);
            }
            dispatch.on_release();
            prop_assert!(!dispatch.is_captured());
        }
    }
}
