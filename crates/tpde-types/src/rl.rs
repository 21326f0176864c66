use serde::{Deserialize, Serialize};

/// Dimensionality of the RL state encoding (§3): 6 parameter dims + 8 metric
/// dims + 5 data-characteristic dims + 1 historical-reward EMA = 20. Fixed at
/// 20 per the §9 resolution of the 19-vs-20-dim open question.
pub const STATE_DIM: usize = 20;

/// Dimensionality of the RL action space (§3).
pub const ACTION_DIM: usize = 5;

/// A 20-dimensional RL state, every component clamped to `[0,1]` (§3, §8
/// invariant 4). Stored as a plain array rather than a struct-of-fields so it
/// can be fed directly into the agent's MLPs without a conversion step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State(pub [f32; STATE_DIM]);

impl State {
    pub fn zero() -> Self {
        Self([0.0; STATE_DIM])
    }

    /// Clamp every component into `[0,1]`, as required by the state-encoding
    /// invariant.
    pub fn clamped(mut values: [f32; STATE_DIM]) -> Self {
        for v in values.iter_mut() {
            *v = v.clamp(0.0, 1.0);
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn all_in_unit_interval(&self) -> bool {
        self.0.iter().all(|v| (0.0..=1.0).contains(v))
    }
}

/// A 5-dimensional RL action, every component in `[0,1]` before decoding
/// (§3). Decoding into [`crate::Parameters`] deltas is the adaptive learning
/// engine's responsibility (§4.9), kept out of this shared type so the
/// ranges can evolve independently of the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action(pub [f32; ACTION_DIM]);

impl Action {
    pub fn clamped(mut values: [f32; ACTION_DIM]) -> Self {
        for v in values.iter_mut() {
            *v = v.clamp(0.0, 1.0);
        }
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Absolute delta ranges an [`Action`]'s first four components decode to
/// (§3): Δwindow ∈ [−50,+50], Δslide ∈ [−25,+25], Δthreshold ∈ [−0.5,+0.5],
/// Δsensitivity ∈ [−0.2,+0.2]. The fifth component encodes the
/// method/adaptive-toggle and has no linear delta range.
pub struct ActionRanges;

impl ActionRanges {
    pub const WINDOW_DELTA: (f32, f32) = (-50.0, 50.0);
    pub const SLIDE_DELTA: (f32, f32) = (-25.0, 25.0);
    pub const THRESHOLD_DELTA: (f32, f32) = (-0.5, 0.5);
    pub const SENSITIVITY_DELTA: (f32, f32) = (-0.2, 0.2);

    /// Linearly map a `[0,1]` action component to its declared delta range.
    pub fn decode(component: f32, range: (f32, f32)) -> f32 {
        range.0 + component.clamp(0.0, 1.0) * (range.1 - range.0)
    }
}

/// `(state, action, reward, next_state, done)` (§3), stored in the bounded
/// experience ring buffer (C7).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: State,
    pub action: Action,
    pub reward: f32,
    pub next_state: State,
    pub done: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_state_stays_in_unit_interval() {
        let mut raw = [0.0f32; STATE_DIM];
        raw[0] = 5.0;
        raw[1] = -3.0;
        let s = State::clamped(raw);
        assert!(s.all_in_unit_interval());
    }

    #[test]
    fn action_range_decode_is_linear() {
        let lo = ActionRanges::decode(0.0, ActionRanges::WINDOW_DELTA);
        let hi = ActionRanges::decode(1.0, ActionRanges::WINDOW_DELTA);
        let mid = ActionRanges::decode(0.5, ActionRanges::WINDOW_DELTA);
        assert_eq!(lo, -50.0);
        assert_eq!(hi, 50.0);
        assert!((mid - 0.0).abs() < 1e-5);
    }
}
