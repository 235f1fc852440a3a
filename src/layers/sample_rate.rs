//! Shadow-state delay line backing sample-rate correction in the
//! recurrent layers.
//!
//! A recurrent layer trained at one sample rate and run at
//! `ratio` times that rate is corrected by routing its freshly computed
//! state through this delay line: the recurrence then reads a state from
//! `ratio` steps back. Whole-number ratios replay a stored step exactly;
//! fractional ratios linearly interpolate between the two adjacent
//! stored steps.

use crate::maths::Scalar;

#[derive(Debug, Clone, Copy, PartialEq)]
enum DelayMode<T> {
    /// No correction; the layer updates its state in place.
    Bypass,
    /// Whole-step delay: read the oldest stored step verbatim.
    Whole,
    /// Fractional delay: blend the two oldest stored steps.
    Interp { older_mult: T, newer_mult: T },
}

/// Delay line of state vectors with a configurable (possibly fractional)
/// delay length. Inactive until [`StateDelay::prepare`] is called.
#[derive(Debug, Clone)]
pub(crate) struct StateDelay<T: Scalar> {
    mode: DelayMode<T>,
    /// Oldest step at index 0; new steps are written at `write_idx`.
    buf: Vec<Vec<T>>,
    write_idx: usize,
}

impl<T: Scalar> StateDelay<T> {
    pub fn bypass() -> Self {
        Self {
            mode: DelayMode::Bypass,
            buf: Vec::new(),
            write_idx: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.mode != DelayMode::Bypass
    }

    /// Configures the delay for the given sample-rate ratio (>= 1).
    ///
    /// Allocates; call during setup, never from the audio thread.
    pub fn prepare(&mut self, delay_samples: T, width: usize) {
        assert!(
            delay_samples >= T::one(),
            "sample-rate delay must be at least one step"
        );
        let floor = delay_samples.floor();
        let frac = delay_samples - floor;
        self.mode = if frac == T::zero() {
            DelayMode::Whole
        } else {
            DelayMode::Interp {
                older_mult: frac,
                newer_mult: T::one() - frac,
            }
        };
        self.write_idx = delay_samples
            .ceil()
            .to_usize()
            .expect("delay length fits in usize")
            - 1;
        self.buf = vec![vec![T::zero(); width]; self.write_idx + 1];
    }

    pub fn reset(&mut self) {
        for step in &mut self.buf {
            step.fill(T::zero());
        }
    }

    /// The slot the current step's freshly computed state is written to.
    pub fn write_slot(&mut self) -> &mut [T] {
        &mut self.buf[self.write_idx]
    }

    /// Reads the delayed state into `out` and shifts the line by one.
    pub fn advance_into(&mut self, out: &mut [T]) {
        match self.mode {
            DelayMode::Bypass => unreachable!("advance_into on a bypassed delay"),
            DelayMode::Whole => out.copy_from_slice(&self.buf[0]),
            DelayMode::Interp {
                older_mult,
                newer_mult,
            } => {
                for (y, (&older, &newer)) in out
                    .iter_mut()
                    .zip(self.buf[0].iter().zip(self.buf[1].iter()))
                {
                    *y = older_mult * older + newer_mult * newer;
                }
            }
        }

        for j in 0..self.write_idx {
            let (front, back) = self.buf.split_at_mut(j + 1);
            front[j].copy_from_slice(&back[0]);
        }
    }
}
