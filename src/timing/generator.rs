use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{NoteEvent, sequence::DEFAULT_DURATION};

pub const DEFAULT_PITCH: u8 = 60;
pub const MIN_VELOCITY: u8 = 24;
pub const MAX_VELOCITY: u8 = 127;
pub const MIN_CC_VALUE: u8 = 12;
pub const MAX_CC_VALUE: u8 = 112;

pub type Steps = Vec<Option<NoteEvent>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GeneratorKind {
    Euclid,
    Quadrant,
    Quarter,
    Half,
    Eighth,
    Accel,
    Ritard,
}

impl GeneratorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorKind::Euclid => "euclid",
            GeneratorKind::Quadrant => "quadrant",
            GeneratorKind::Quarter => "quarter",
            GeneratorKind::Half => "half",
            GeneratorKind::Eighth => "eighth",
            GeneratorKind::Accel => "accel",
            GeneratorKind::Ritard => "ritard",
        }
    }
}

/// Unknown names fall back to [`GeneratorKind::Euclid`].
impl From<&str> for GeneratorKind {
    fn from(name: &str) -> Self {
        match name {
            "quadrant" => GeneratorKind::Quadrant,
            "quarter" => GeneratorKind::Quarter,
            "half" => GeneratorKind::Half,
            "eighth" => GeneratorKind::Eighth,
            "accel" => GeneratorKind::Accel,
            "ritard" => GeneratorKind::Ritard,
            _ => GeneratorKind::Euclid,
        }
    }
}

impl From<String> for GeneratorKind {
    fn from(name: String) -> Self {
        GeneratorKind::from(name.as_str())
    }
}

impl From<GeneratorKind> for String {
    fn from(kind: GeneratorKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Missing fields take their value from [`GeneratorSpec::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSpec {
    pub length: usize,
    pub steps: usize,
    #[serde(alias = "type")]
    pub kind: GeneratorKind,
    /// Pitches to draw from. Empty means [`DEFAULT_PITCH`].
    pub notes: Vec<u8>,
}

impl Default for GeneratorSpec {
    fn default() -> Self {
        Self {
            length: 16,
            steps: 4,
            kind: GeneratorKind::Quadrant,
            notes: vec![36, 42, 48],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("{kind} pattern asks for {steps} steps in a length of {length}")]
    TooManySteps {
        kind: GeneratorKind,
        steps: usize,
        length: usize,
    },
    #[error("quadrant window at {start} holds {width} slots but was assigned {count} steps")]
    QuadrantOverflow {
        start: usize,
        width: usize,
        count: usize,
    },
}

/// Builds one sequence worth of steps for `spec`.
pub fn generate<R: Rng + ?Sized>(
    spec: &GeneratorSpec,
    rng: &mut R,
) -> Result<Steps, GenerationError> {
    let GeneratorSpec {
        length, steps, kind, ..
    } = *spec;

    let bounded = matches!(kind, GeneratorKind::Euclid | GeneratorKind::Quadrant);
    if bounded && steps > length {
        return Err(GenerationError::TooManySteps {
            kind,
            steps,
            length,
        });
    }

    let notes = &spec.notes;
    let pattern = match kind {
        GeneratorKind::Quadrant => return quadrant_pattern(length, steps, rng, notes),
        GeneratorKind::Euclid => euclid_pattern(length, steps, &mut || random_note(notes, rng)),
        GeneratorKind::Quarter => quarter_pattern(length, &mut || random_note(notes, rng)),
        GeneratorKind::Half => half_pattern(length, &mut || random_note(notes, rng)),
        GeneratorKind::Eighth => eighth_pattern(length, &mut || random_note(notes, rng)),
        GeneratorKind::Accel => accel_pattern(length, steps, &mut || random_note(notes, rng)),
        GeneratorKind::Ritard => {
            let mut pattern = accel_pattern(length, steps, &mut || random_note(notes, rng));
            pattern.reverse();
            pattern
        }
    };

    Ok(pattern)
}

pub fn random_note<R: Rng + ?Sized>(notes: &[u8], rng: &mut R) -> NoteEvent {
    let pitch = notes.choose(rng).copied().unwrap_or(DEFAULT_PITCH);
    NoteEvent {
        pitch,
        velocity: rng.gen_range(MIN_VELOCITY..=MAX_VELOCITY),
        duration: DEFAULT_DURATION.to_string(),
        mod1: Some(rng.gen_range(MIN_CC_VALUE..=MAX_CC_VALUE)),
        mod2: Some(rng.gen_range(MIN_CC_VALUE..=MAX_CC_VALUE)),
    }
}

/// `round(n / d)` with halves rounded up.
fn round_div(n: usize, d: usize) -> usize {
    (2 * n + d) / (2 * d)
}

/// A zero unit never divides anything.
fn is_multiple(i: usize, unit: usize) -> bool {
    unit != 0 && i % unit == 0
}

fn euclid_pattern(length: usize, steps: usize, next_note: &mut impl FnMut() -> NoteEvent) -> Steps {
    if steps == 0 {
        return vec![None; length];
    }

    let mut pattern: Vec<Steps> = (0..steps).map(|_| vec![Some(next_note())]).collect();
    let mut remainder: Vec<Steps> = (0..length - steps).map(|_| vec![None]).collect();

    while remainder.len() >= 2 {
        let paired = pattern.len().min(remainder.len());

        let leftover = if pattern.len() > paired {
            pattern.split_off(paired)
        } else {
            remainder.split_off(paired)
        };

        for (group, tail) in pattern.iter_mut().zip(remainder.drain(..paired)) {
            group.extend(tail);
        }

        remainder = leftover;
    }

    pattern.into_iter().chain(remainder).flatten().collect()
}

fn random_split<R: Rng + ?Sized>(n: usize, rng: &mut R) -> (usize, usize) {
    let a = if rng.gen_bool(0.5) { n / 2 } else { n.div_ceil(2) };
    (a, n - a)
}

fn quadrants<R: Rng + ?Sized>(n: usize, rng: &mut R) -> [usize; 4] {
    let (left, right) = random_split(n, rng);
    let (q1, q2) = random_split(left, rng);
    let (q3, q4) = random_split(right, rng);
    [q1, q2, q3, q4]
}

fn quadrant_pattern<R: Rng + ?Sized>(
    length: usize,
    steps: usize,
    rng: &mut R,
    notes: &[u8],
) -> Result<Steps, GenerationError> {
    let widths = quadrants(length, rng);
    let counts = quadrants(steps, rng);

    let mut pattern = vec![None; length];
    let mut start = 0;

    for (width, count) in widths.into_iter().zip(counts) {
        if count > width {
            return Err(GenerationError::QuadrantOverflow {
                start,
                width,
                count,
            });
        }

        for offset in rand::seq::index::sample(rng, width, count).into_iter() {
            pattern[start + offset] = Some(random_note(notes, rng));
        }

        start += width;
    }

    Ok(pattern)
}

fn quarter_pattern(length: usize, next_note: &mut impl FnMut() -> NoteEvent) -> Steps {
    let quarter = round_div(length, 4);
    (0..length)
        .map(|i| is_multiple(i, quarter).then(&mut *next_note))
        .collect()
}

fn half_pattern(length: usize, next_note: &mut impl FnMut() -> NoteEvent) -> Steps {
    let quarter = round_div(length, 4);
    let half = round_div(length, 2);
    (0..length)
        .map(|i| (is_multiple(i, quarter) && !is_multiple(i, half)).then(&mut *next_note))
        .collect()
}

fn eighth_pattern(length: usize, next_note: &mut impl FnMut() -> NoteEvent) -> Steps {
    let eighth = round_div(length, 8);
    (0..length)
        .map(|i| (!is_multiple(i, eighth)).then(&mut *next_note))
        .collect()
}

/// Gaps shrink towards the end of the sequence. The first slot always
/// holds a note; with no steps it is the only one.
fn accel_pattern(length: usize, steps: usize, next_note: &mut impl FnMut() -> NoteEvent) -> Steps {
    let mut pattern = vec![None; length];

    let mut i = 0;
    while i < length {
        pattern[i] = Some(next_note());
        if steps == 0 {
            break;
        }
        i += (length - i).div_ceil(steps);
    }

    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn spec(kind: GeneratorKind, length: usize, steps: usize) -> GeneratorSpec {
        GeneratorSpec {
            length,
            steps,
            kind,
            notes: vec![36, 38, 42],
        }
    }

    fn active_indices(steps: &Steps) -> Vec<usize> {
        steps
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| i))
            .collect()
    }

    #[test]
    fn euclid_keeps_length_and_density() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 0..=24 {
            for k in 0..=n {
                let steps = generate(&spec(GeneratorKind::Euclid, n, k), &mut rng).unwrap();
                assert_eq!(steps.len(), n, "length for n={n} k={k}");
                assert_eq!(
                    steps.iter().filter(|s| s.is_some()).count(),
                    k,
                    "density for n={n} k={k}"
                );
            }
        }
    }

    #[test]
    fn euclid_five_in_sixteen_spreads_rests() {
        let mut rng = StdRng::seed_from_u64(1);
        let steps = generate(&spec(GeneratorKind::Euclid, 16, 5), &mut rng).unwrap();

        let mut run = 0;
        let mut longest = 0;
        for step in &steps {
            if step.is_some() {
                run = 0;
            } else {
                run += 1;
                longest = longest.max(run);
            }
        }
        assert!(longest <= 16usize.div_ceil(5), "longest rest run {longest}");
        assert!(steps[0].is_some());
    }

    #[test]
    fn euclid_rejects_more_steps_than_slots() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = generate(&spec(GeneratorKind::Euclid, 4, 5), &mut rng).unwrap_err();
        assert!(matches!(err, GenerationError::TooManySteps { steps: 5, length: 4, .. }));
    }

    #[test]
    fn quarter_half_eighth_masks_at_sixteen() {
        let mut rng = StdRng::seed_from_u64(3);

        let quarter = generate(&spec(GeneratorKind::Quarter, 16, 0), &mut rng).unwrap();
        assert_eq!(active_indices(&quarter), vec![0, 4, 8, 12]);

        let half = generate(&spec(GeneratorKind::Half, 16, 0), &mut rng).unwrap();
        assert_eq!(active_indices(&half), vec![4, 12]);

        let eighth = generate(&spec(GeneratorKind::Eighth, 16, 0), &mut rng).unwrap();
        let rests: Vec<usize> = (0..16).filter(|i| eighth[*i].is_none()).collect();
        assert_eq!(rests, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn accel_and_ritard_at_eight() {
        let mut rng = StdRng::seed_from_u64(5);
        let accel = generate(&spec(GeneratorKind::Accel, 8, 4), &mut rng).unwrap();
        assert_eq!(active_indices(&accel), vec![0, 2, 4, 5, 6, 7]);

        let ritard = generate(&spec(GeneratorKind::Ritard, 8, 4), &mut rng).unwrap();
        assert_eq!(active_indices(&ritard), vec![0, 1, 2, 3, 5, 7]);
    }

    #[test]
    fn ritard_is_reverse_of_accel_for_same_draws() {
        let accel =
            generate(&spec(GeneratorKind::Accel, 12, 3), &mut StdRng::seed_from_u64(9)).unwrap();
        let mut ritard =
            generate(&spec(GeneratorKind::Ritard, 12, 3), &mut StdRng::seed_from_u64(9)).unwrap();
        ritard.reverse();
        assert_eq!(accel, ritard);
    }

    #[test]
    fn accel_without_steps_places_only_the_first_note() {
        let mut rng = StdRng::seed_from_u64(5);
        let accel = generate(&spec(GeneratorKind::Accel, 8, 0), &mut rng).unwrap();
        assert_eq!(active_indices(&accel), vec![0]);

        let ritard = generate(&spec(GeneratorKind::Ritard, 8, 0), &mut rng).unwrap();
        assert_eq!(active_indices(&ritard), vec![7]);
    }

    #[test]
    fn accel_with_more_steps_than_slots_fills_every_slot() {
        let mut rng = StdRng::seed_from_u64(5);
        let accel = generate(&spec(GeneratorKind::Accel, 4, 8), &mut rng).unwrap();
        assert_eq!(active_indices(&accel), vec![0, 1, 2, 3]);

        let ritard = generate(&spec(GeneratorKind::Ritard, 4, 8), &mut rng).unwrap();
        assert_eq!(active_indices(&ritard), vec![0, 1, 2, 3]);
    }

    #[test]
    fn quadrant_rejects_more_steps_than_slots() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = generate(&spec(GeneratorKind::Quadrant, 4, 5), &mut rng).unwrap_err();
        assert!(matches!(err, GenerationError::TooManySteps { steps: 5, length: 4, .. }));
    }

    #[test]
    fn quadrant_places_requested_steps_or_fails() {
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            match generate(&spec(GeneratorKind::Quadrant, 16, 6), &mut rng) {
                Ok(steps) => {
                    assert_eq!(steps.len(), 16);
                    assert_eq!(steps.iter().filter(|s| s.is_some()).count(), 6);
                }
                Err(err) => panic!("16/6 always fits its windows, got {err}"),
            }
        }
    }

    #[test]
    fn quadrant_overflow_is_an_error() {
        // Five slots split into windows of one or two; five steps cannot
        // always line up with them.
        let mut failures = 0;
        for seed in 0..64 {
            let mut rng = StdRng::seed_from_u64(seed);
            if let Err(err) = generate(&spec(GeneratorKind::Quadrant, 5, 5), &mut rng) {
                assert!(matches!(err, GenerationError::QuadrantOverflow { .. }));
                failures += 1;
            }
        }
        assert!(failures > 0);
    }

    #[test]
    fn notes_come_from_the_note_set_with_bounded_values() {
        let mut rng = StdRng::seed_from_u64(11);
        let steps = generate(&spec(GeneratorKind::Eighth, 32, 0), &mut rng).unwrap();
        for note in steps.iter().flatten() {
            assert!([36, 38, 42].contains(&note.pitch));
            assert!((MIN_VELOCITY..=MAX_VELOCITY).contains(&note.velocity));
            let mod1 = note.mod1.unwrap();
            assert!((MIN_CC_VALUE..=MAX_CC_VALUE).contains(&mod1));
            assert_eq!(note.duration, "8n");
        }
    }

    #[test]
    fn empty_note_set_uses_default_pitch() {
        let mut rng = StdRng::seed_from_u64(2);
        let note = random_note(&[], &mut rng);
        assert_eq!(note.pitch, DEFAULT_PITCH);
    }

    #[test]
    fn unknown_kind_falls_back_to_euclid() {
        assert_eq!(GeneratorKind::from("shuffle"), GeneratorKind::Euclid);
        assert_eq!(GeneratorKind::from("ritard"), GeneratorKind::Ritard);

        let spec: GeneratorSpec = ron::from_str(r#"(length: 8, steps: 3, kind: "nope")"#).unwrap();
        assert_eq!(spec.kind, GeneratorKind::Euclid);
    }

    #[test]
    fn missing_generator_fields_take_defaults() {
        let spec: GeneratorSpec = ron::from_str("(steps: 6)").unwrap();
        assert_eq!(spec.length, 16);
        assert_eq!(spec.steps, 6);
        assert_eq!(spec.kind, GeneratorKind::Quadrant);
        assert_eq!(spec.notes, vec![36, 42, 48]);
    }
}
