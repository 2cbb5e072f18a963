use serde::{Deserialize, Serialize};

use crate::audio::AdsrOverride;
use crate::events::NoteEvent;

/// Beats per cycle when no base meter track is set.
pub const DEFAULT_METER: f64 = 4.0;
pub const DEFAULT_PITCH: u8 = 60;
pub const DEFAULT_VELOCITY: f32 = 1.0;

/// Recursive rhythm tree. Each node cuts its span into `division` equal
/// slots and hands them out to its children in order; a node without
/// children is a hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternNode {
    /// 0 means one slot per child.
    pub division: u32,
    pub children: Vec<PatternNode>,
    /// 0.0 -> 1.0, inherited when unset. 0.0 is a note-off.
    pub velocity: Option<f32>,
    /// MIDI note, inherited when unset.
    pub pitch: Option<u8>,
    /// Parent slots this node occupies.
    pub span: Option<u32>,
    pub choke: Option<bool>,
    pub adsr: Option<AdsrOverride>,
}

impl PatternNode {
    pub fn hit() -> Self {
        Self::default()
    }

    pub fn split(division: u32, children: Vec<PatternNode>) -> Self {
        Self {
            division,
            children,
            ..Default::default()
        }
    }

    pub fn with_pitch(mut self, pitch: u8) -> Self {
        self.pitch = Some(pitch);
        self
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = Some(velocity);
        self
    }

    pub fn with_span(mut self, span: u32) -> Self {
        self.span = Some(span);
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn slots(&self) -> u32 {
        if self.division == 0 {
            self.children.len() as u32
        } else {
            self.division
        }
    }

    /// Cycle length in beats when this tree is the base meter.
    pub fn meter(&self) -> f64 {
        match self.slots() {
            0 => DEFAULT_METER,
            slots => slots as f64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Inherited {
    pitch: u8,
    velocity: f32,
    choke: bool,
    adsr: Option<AdsrOverride>,
}

impl Inherited {
    fn apply(self, node: &PatternNode) -> Self {
        Self {
            pitch: node.pitch.map_or(self.pitch, |p| p.min(127)),
            velocity: node
                .velocity
                .filter(|v| v.is_finite())
                .map_or(self.velocity, |v| v.clamp(0.0, 1.0)),
            choke: node.choke.unwrap_or(self.choke),
            adsr: node.adsr.or(self.adsr),
        }
    }
}

struct Flattener<'a> {
    instrument_id: &'a str,
    pattern_id: Option<&'a str>,
    events: Vec<NoteEvent>,
}

impl Flattener<'_> {
    fn walk(&mut self, node: &PatternNode, start: f64, span: f64, inherited: Inherited) {
        let resolved = inherited.apply(node);
        if node.is_leaf() {
            let mut event =
                NoteEvent::new(start, resolved.pitch, resolved.velocity, self.instrument_id);
            event.pattern_id = self.pattern_id.map(str::to_string);
            event.choke = resolved.choke;
            event.adsr = resolved.adsr;
            self.events.push(event);
            return;
        }

        let slots = node.slots().max(1);
        let slot = span / slots as f64;
        let mut cursor = 0;
        // Children that do not fit in the remaining slots are outside the span.
        for child in &node.children {
            if cursor >= slots {
                break;
            }
            let width = child.span.unwrap_or(1).clamp(1, slots - cursor);
            self.walk(child, start + cursor as f64 * slot, width as f64 * slot, resolved);
            cursor += width;
        }
    }
}

/// Flattens one cycle of `root` over `meter` beats into time-sorted events.
pub fn flatten(
    root: &PatternNode,
    meter: f64,
    instrument_id: &str,
    pattern_id: Option<&str>,
) -> Vec<NoteEvent> {
    let meter = if meter.is_finite() && meter > 0.0 {
        meter
    } else {
        DEFAULT_METER
    };
    let mut flattener = Flattener {
        instrument_id,
        pattern_id,
        events: Vec::new(),
    };
    let defaults = Inherited {
        pitch: DEFAULT_PITCH,
        velocity: DEFAULT_VELOCITY,
        choke: false,
        adsr: None,
    };
    flattener.walk(root, 0.0, meter, defaults);

    let mut events = flattener.events;
    events.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.pitch.cmp(&b.pitch)));
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn times(events: &[NoteEvent]) -> Vec<f64> {
        events.iter().map(|e| e.time).collect()
    }

    #[test]
    fn four_on_the_floor() {
        let root = PatternNode::split(4, vec![PatternNode::hit(); 4]);
        let events = flatten(&root, 4.0, "kick", None);
        assert_eq!(times(&events), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(events.iter().all(|e| e.pitch == 60 && e.velocity == 1.0));
        assert!(events.iter().all(|e| e.instrument_id == "kick"));
    }

    #[test]
    fn nested_subdivision() {
        let root = PatternNode::split(
            2,
            vec![
                PatternNode::hit(),
                PatternNode::split(2, vec![PatternNode::hit(), PatternNode::hit()]),
            ],
        );
        assert_eq!(times(&flatten(&root, 4.0, "hat", None)), vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn triplets_over_four_beats() {
        let root = PatternNode::split(3, vec![PatternNode::hit(); 3]);
        let events = flatten(&root, 4.0, "tom", None);
        assert_eq!(events.len(), 3);
        assert!((events[1].time - 4.0 / 3.0).abs() < 1e-12);
        assert!(events.iter().all(|e| e.time < 4.0));
    }

    #[test]
    fn pitch_and_velocity_inherit_down_the_tree() {
        let root = PatternNode::split(
            2,
            vec![
                PatternNode::hit().with_pitch(48),
                PatternNode::split(
                    2,
                    vec![PatternNode::hit(), PatternNode::hit().with_velocity(0.25)],
                )
                .with_velocity(0.5),
            ],
        )
        .with_pitch(36);
        let events = flatten(&root, 4.0, "bass", None);
        assert_eq!(events[0].pitch, 48);
        assert_eq!((events[1].pitch, events[1].velocity), (36, 0.5));
        assert_eq!((events[2].pitch, events[2].velocity), (36, 0.25));
    }

    #[test]
    fn zero_velocity_is_kept_as_note_off() {
        let root = PatternNode::split(
            2,
            vec![PatternNode::hit(), PatternNode::hit().with_velocity(0.0)],
        );
        let events = flatten(&root, 4.0, "pad", None);
        assert_eq!(events.len(), 2);
        assert!(events[1].is_note_off());
    }

    #[test]
    fn span_ties_slots_together() {
        let root = PatternNode::split(
            4,
            vec![
                PatternNode::hit().with_span(3),
                PatternNode::hit(),
                PatternNode::hit(),
            ],
        );
        // The third child no longer fits.
        assert_eq!(times(&flatten(&root, 4.0, "lead", None)), vec![0.0, 3.0]);
    }

    #[test]
    fn division_zero_uses_child_count() {
        let root = PatternNode::split(0, vec![PatternNode::hit(); 5]);
        assert_eq!(root.meter(), 5.0);
        assert_eq!(flatten(&root, 5.0, "x", None).len(), 5);
        assert_eq!(PatternNode::hit().meter(), DEFAULT_METER);
    }

    #[test]
    fn choke_and_adsr_are_carried_to_events() {
        let release = AdsrOverride {
            release: Some(0.5),
            ..Default::default()
        };
        let mut root = PatternNode::split(2, vec![PatternNode::hit(), PatternNode::hit()]);
        root.choke = Some(true);
        root.children[1].adsr = Some(release);
        let events = flatten(&root, 4.0, "hat", Some("verse"));
        assert!(events.iter().all(|e| e.choke));
        assert_eq!(events[0].adsr, None);
        assert_eq!(events[1].adsr, Some(release));
        assert!(events.iter().all(|e| e.pattern_id.as_deref() == Some("verse")));
    }

    #[test]
    fn invalid_values_fall_back() {
        let root = PatternNode::hit().with_velocity(f32::NAN).with_pitch(200);
        let events = flatten(&root, f64::NAN, "x", None);
        assert_eq!(events[0].velocity, DEFAULT_VELOCITY);
        assert_eq!(events[0].pitch, 127);
        assert_eq!(events[0].time, 0.0);
    }

    #[test]
    fn tree_parses_from_ron() {
        let tree: PatternNode =
            ron::from_str("(division: 2, children: [(division: 0), (pitch: Some(64))])").unwrap();
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[1].pitch, Some(64));
    }
}
