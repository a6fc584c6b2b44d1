use std::fmt::Display;

use unicode_segmentation::UnicodeSegmentation;

use super::{PlaceId, TransitionId};
use crate::expr::Binding;

/// Token count of one place before and after a firing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceChange {
    pub place: PlaceId,
    pub name: String,
    pub before: usize,
    pub after: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Fired(Vec<PlaceChange>),
    /// The veto hook declined the chosen pair; the marking is unchanged.
    Skipped,
    /// Firing failed (e.g. a produced token violated its color set); the
    /// marking is unchanged.
    Aborted(String),
}

impl StepOutcome {
    pub fn fired(&self) -> bool {
        matches!(self, StepOutcome::Fired(_))
    }
}

/// Structured record of one simulation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepEvent {
    pub step: usize,
    pub transition: TransitionId,
    pub transition_name: String,
    pub binding: Binding,
    pub outcome: StepOutcome,
}

fn truncated(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        // Note: length in bytes, but each grapheme must have one byte at least.
        return s.into();
    }
    let mut graphemes = s.graphemes(true).take(max_len + 1).collect::<Vec<_>>();
    if graphemes.len() > max_len {
        graphemes.truncate(max_len);
        graphemes[max_len - 1] = ".";
        graphemes[max_len - 2] = ".";
        graphemes[max_len - 3] = ".";
    }
    graphemes.concat()
}

impl Display for PlaceChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.name, self.before, self.after)
    }
}

impl Display for StepEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let binding = truncated(&self.binding.to_string(), 100);
        match &self.outcome {
            StepOutcome::Fired(changes) => {
                write!(f, "step={} Fired({} {}, [", self.step, self.transition_name, binding)?;
                for (idx, change) in changes.iter().enumerate() {
                    if idx == 0 {
                        write!(f, "{}", change)?;
                    } else {
                        write!(f, ", {}", change)?;
                    }
                }
                write!(f, "])")
            }
            StepOutcome::Skipped => {
                write!(f, "step={} Skipped({} {})", self.step, self.transition_name, binding)
            }
            StepOutcome::Aborted(reason) => write!(
                f,
                "step={} Aborted({} {}: {})",
                self.step,
                self.transition_name,
                binding,
                truncated(reason, 100)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Token;

    #[test]
    fn long_payloads_are_truncated_by_grapheme() {
        let text = "é".repeat(150);
        let short = truncated(&text, 10);
        assert_eq!(short, format!("{}...", "é".repeat(7)));
        assert_eq!(truncated("abc", 10), "abc");
    }

    #[test]
    fn display() {
        let evt = StepEvent {
            step: 1,
            transition: TransitionId(0),
            transition_name: "T".into(),
            binding: [("x", Token::Int(1))].into_iter().collect(),
            outcome: StepOutcome::Fired(vec![
                PlaceChange { place: PlaceId(0), name: "A".into(), before: 3, after: 2 },
                PlaceChange { place: PlaceId(1), name: "B".into(), before: 0, after: 1 },
            ]),
        };
        assert_eq!(evt.to_string(), "step=1 Fired(T {x=1}, [A: 3 -> 2, B: 0 -> 1])");
    }
}
