//! Keyboard model: typing bursts, typos with backspace correction, key
//! rollover, and shift timing.
//!
//! `plan_typing` turns a string into an ordered list of keystrokes the
//! executor replays. Characters go out in bursts; each burst shares one
//! per-key delay and one rollover overlap. A run of shifted characters is
//! its own segment with a shift hold in front of it.

use tactus_contracts::{execution::ModifierHold, profile::HumanizationProfile};

use crate::{
    rng::SessionRng,
    timing::{sample_delay, sample_typing_burst, Delay},
};

const SHIFT: &str = "shift";
const SHIFTED_SYMBOLS: &str = "~!@#$%^&*()_+{}|:\"<>?";
const QWERTY_ROWS: [&str; 4] = ["1234567890", "qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// One step of a typing plan.
#[derive(Debug, Clone, PartialEq)]
pub enum Keystroke {
    Chars {
        text: String,
        per_char_delay_ms: f64,
        overlap_ms: f64,
        modifier: Option<ModifierHold>,
    },
    /// Erase the previous character.
    Backspace { hold_ms: f64 },
    /// Hesitation before the next step, keyed by purpose.
    Pause { key: &'static str, ms: f64 },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypingPlan {
    pub strokes: Vec<Keystroke>,
    pub bursts: u32,
    pub typos: u32,
}

impl TypingPlan {
    /// The text left on screen once every stroke has been replayed.
    pub fn typed_text(&self) -> String {
        let mut out = String::new();
        for stroke in &self.strokes {
            match stroke {
                Keystroke::Chars { text, .. } => out.push_str(text),
                Keystroke::Backspace { .. } => {
                    out.pop();
                }
                Keystroke::Pause { .. } => {}
            }
        }
        out
    }
}

/// Whether typing `c` needs shift held.
pub fn needs_shift(c: char) -> bool {
    c.is_ascii_uppercase() || SHIFTED_SYMBOLS.contains(c)
}

/// A key next to `c` on a QWERTY layout, keeping its case. `None` for keys
/// outside the letter and digit rows.
pub fn neighbour_key(c: char, rng: &mut SessionRng) -> Option<char> {
    let lower = c.to_ascii_lowercase();
    let row = QWERTY_ROWS.iter().find(|row| row.contains(lower))?;
    let keys: Vec<char> = row.chars().collect();
    let idx = keys.iter().position(|&k| k == lower)?;
    let pick = if idx == 0 {
        keys[1]
    } else if idx == keys.len() - 1 {
        keys[idx - 1]
    } else if rng.chance(0.5) {
        keys[idx - 1]
    } else {
        keys[idx + 1]
    };
    Some(if c.is_ascii_uppercase() { pick.to_ascii_uppercase() } else { pick })
}

/// Accumulates characters that share timing and shift state.
struct Segment {
    text: String,
    shifted: bool,
}

fn flush(
    segment: &mut Option<Segment>,
    per_char_delay_ms: f64,
    overlap_ms: f64,
    profile: &HumanizationProfile,
    rng: &mut SessionRng,
    strokes: &mut Vec<Keystroke>,
) {
    let Some(seg) = segment.take() else {
        return;
    };
    let modifier = seg.shifted.then(|| ModifierHold {
        key: SHIFT.to_string(),
        lead_ms: sample_delay(profile, Delay::ModifierLead, rng),
    });
    strokes.push(Keystroke::Chars {
        text: seg.text,
        per_char_delay_ms,
        overlap_ms,
        modifier,
    });
}

fn push_char(segment: &mut Option<Segment>, c: char) -> bool {
    let shifted = needs_shift(c);
    match segment {
        Some(seg) if seg.shifted == shifted => {
            seg.text.push(c);
            true
        }
        Some(_) => false,
        None => {
            *segment = Some(Segment {
                text: c.to_string(),
                shifted,
            });
            true
        }
    }
}

/// Plan the keystrokes that type `text`.
///
/// Bursts are separated by a pause of twice a key delay. Each character has
/// `typing.typo_rate` chance of being preceded by a neighbouring key, a
/// correction pause, and a backspace.
pub fn plan_typing(text: &str, profile: &HumanizationProfile, rng: &mut SessionRng) -> TypingPlan {
    let chars: Vec<char> = text.chars().collect();
    let mut plan = TypingPlan::default();
    let mut typed = 0;

    while typed < chars.len() {
        if typed > 0 {
            let ms = sample_delay(profile, Delay::KeyDelay, rng) * 2.0;
            plan.strokes.push(Keystroke::Pause { key: "typing_pause", ms });
        }
        let burst = sample_typing_burst(profile, rng).min(chars.len() - typed);
        let per_char_delay_ms = sample_delay(profile, Delay::KeyDelay, rng);
        let overlap_ms = sample_delay(profile, Delay::KeyOverlap, rng).min(per_char_delay_ms);

        let mut segment: Option<Segment> = None;
        for &c in &chars[typed..typed + burst] {
            let typo = if rng.chance(profile.typing.typo_rate) {
                neighbour_key(c, rng)
            } else {
                None
            };
            if let Some(wrong) = typo {
                if !push_char(&mut segment, wrong) {
                    flush(&mut segment, per_char_delay_ms, overlap_ms, profile, rng, &mut plan.strokes);
                    push_char(&mut segment, wrong);
                }
                flush(&mut segment, per_char_delay_ms, overlap_ms, profile, rng, &mut plan.strokes);
                let ms = sample_delay(profile, Delay::CorrectionDelay, rng);
                plan.strokes.push(Keystroke::Pause {
                    key: Delay::CorrectionDelay.key(),
                    ms,
                });
                let hold_ms = sample_delay(profile, Delay::Backspace, rng);
                plan.strokes.push(Keystroke::Backspace { hold_ms });
                plan.typos += 1;
            }
            if !push_char(&mut segment, c) {
                flush(&mut segment, per_char_delay_ms, overlap_ms, profile, rng, &mut plan.strokes);
                push_char(&mut segment, c);
            }
        }
        flush(&mut segment, per_char_delay_ms, overlap_ms, profile, rng, &mut plan.strokes);

        typed += burst;
        plan.bursts += 1;
    }
    plan
}

#[cfg(test)]
mod tests {
    use tactus_contracts::profile::Distribution;

    use super::*;

    fn profile(typo_rate: f64) -> HumanizationProfile {
        let mut p = HumanizationProfile::named("keys");
        p.typing.typo_rate = typo_rate;
        p
    }

    fn chars_segments(plan: &TypingPlan) -> Vec<(&str, Option<&ModifierHold>)> {
        plan.strokes
            .iter()
            .filter_map(|s| match s {
                Keystroke::Chars { text, modifier, .. } => Some((text.as_str(), modifier.as_ref())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn clean_typing_reproduces_text() {
        let p = profile(0.0);
        let mut rng = SessionRng::seeded(1);
        let text = "bank the logs please";
        let plan = plan_typing(text, &p, &mut rng);

        assert_eq!(plan.typed_text(), text);
        assert_eq!(plan.typos, 0);
        assert!(plan.bursts >= 2);
        assert!(!plan.strokes.iter().any(|s| matches!(s, Keystroke::Backspace { .. })));
    }

    #[test]
    fn every_typo_is_erased() {
        let p = profile(1.0);
        let mut rng = SessionRng::seeded(2);
        let text = "yew logs";
        let plan = plan_typing(text, &p, &mut rng);

        // The space has no neighbour, so only the seven letters are mistyped.
        assert_eq!(plan.typos, 7);
        assert_eq!(plan.typed_text(), text);
        let backspaces: Vec<f64> = plan
            .strokes
            .iter()
            .filter_map(|s| match s {
                Keystroke::Backspace { hold_ms } => Some(*hold_ms),
                _ => None,
            })
            .collect();
        assert_eq!(backspaces.len(), 7);
        for ms in backspaces {
            assert!((30.0..=200.0).contains(&ms));
        }
    }

    #[test]
    fn shifted_runs_carry_a_modifier_hold() {
        let mut p = profile(0.0);
        p.session.typing_burst_chars = Distribution::fixed(20.0);
        let mut rng = SessionRng::seeded(3);
        let plan = plan_typing("Hi THERE!", &p, &mut rng);

        let segments = chars_segments(&plan);
        let texts: Vec<&str> = segments.iter().map(|(t, _)| *t).collect();
        assert_eq!(texts, vec!["H", "i ", "THERE!"]);
        assert!(segments[0].1.is_some());
        assert!(segments[1].1.is_none());
        let hold = segments[2].1.unwrap();
        assert_eq!(hold.key, "shift");
        assert!((10.0..=90.0).contains(&hold.lead_ms));
    }

    #[test]
    fn overlap_never_exceeds_key_delay() {
        let mut p = profile(0.0);
        p.typing.key_overlap = Distribution::fixed(500.0);
        let mut rng = SessionRng::seeded(4);
        let plan = plan_typing("overlapping", &p, &mut rng);
        for stroke in &plan.strokes {
            if let Keystroke::Chars {
                per_char_delay_ms,
                overlap_ms,
                ..
            } = stroke
            {
                assert!(overlap_ms <= per_char_delay_ms);
            }
        }
    }

    #[test]
    fn neighbours_stay_on_the_row_and_keep_case() {
        let mut rng = SessionRng::seeded(5);
        assert_eq!(neighbour_key('q', &mut rng), Some('w'));
        assert_eq!(neighbour_key('M', &mut rng), Some('N'));
        for _ in 0..50 {
            let n = neighbour_key('g', &mut rng).unwrap();
            assert!(n == 'f' || n == 'h');
        }
        assert_eq!(neighbour_key(' ', &mut rng), None);
    }

    #[test]
    fn same_seed_same_plan() {
        let p = profile(0.2);
        let a = plan_typing("Reproducible Text 42", &p, &mut SessionRng::seeded(9));
        let b = plan_typing("Reproducible Text 42", &p, &mut SessionRng::seeded(9));
        assert_eq!(a, b);
    }
}
