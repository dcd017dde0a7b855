// Copyright 2023 Enphase Energy, Inc.
//
//    Licensed under the Apache License, Version 2.0 (the "License");
//    you may not use this file except in compliance with the License.
//    You may obtain a copy of the License at
//
//        http://www.apache.org/licenses/LICENSE-2.0
//
//    Unless required by applicable law or agreed to in writing, software
//    distributed under the License is distributed on an "AS IS" BASIS,
//    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//    See the License for the specific language governing permissions and
//    limitations under the License.

use crate::error::CoefficientError;
use crate::sample::Sample;

/// Values per row in the short `b0 b1 b2 a1 a2` layout
pub const SHORT_ROW: usize = 5;

/// Values per row in the SOS `b0 b1 b2 a0 a1 a2` layout
pub const SOS_ROW: usize = 6;

/// Coefficients of one second-order section.
///
/// The transfer function is
/// `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients<T> {
    b0: T,
    b1: T,
    b2: T,
    // stored as negative so we don't need to negate in update
    a1: T,
    a2: T,
}

impl<T: Sample> Coefficients<T> {
    /// Create section coefficients from a normalized (`a0 == 1`) transfer function.
    ///
    /// No validation happens here; [`Cascade::new`](crate::Cascade::new)
    /// rejects sections that are not finite.
    pub fn new(b0: T, b1: T, b2: T, a1: T, a2: T) -> Self {
        Self {
            b0,
            b1,
            b2,
            a1: -a1,
            a2: -a2,
        }
    }

    /// A section that passes its input through unchanged
    pub fn identity() -> Self {
        Self::new(T::one(), T::zero(), T::zero(), T::zero(), T::zero())
    }

    /// Parse one row of a coefficient table.
    ///
    /// Accepts the 5-value `b0 b1 b2 a1 a2` layout or the 6-value SOS layout
    /// `b0 b1 b2 a0 a1 a2` produced by common design tools. In the 6-value
    /// layout `a0` must be exactly 1.
    pub fn from_row(row: &[T]) -> Result<Self, CoefficientError> {
        Self::parse(0, row)
    }

    pub(crate) fn parse(index: usize, row: &[T]) -> Result<Self, CoefficientError> {
        let (b, a) = match row.len() {
            SHORT_ROW => (&row[..3], &row[3..]),
            SOS_ROW => (&row[..3], &row[4..]),
            width => return Err(CoefficientError::RowWidth { row: index, width }),
        };
        if row.iter().any(|c| !c.is_finite()) {
            return Err(CoefficientError::NonFinite { row: index });
        }
        if row.len() == SOS_ROW && row[3] != T::one() {
            return Err(CoefficientError::Normalization { row: index });
        }
        Ok(Self::new(b[0], b[1], b[2], a[0], a[1]))
    }

    /// Whether all five coefficients are finite
    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Feed-forward coefficients `[b0, b1, b2]`
    pub fn b(&self) -> [T; 3] {
        [self.b0, self.b1, self.b2]
    }

    /// Feedback coefficients `[a1, a2]`
    pub fn a(&self) -> [T; 2] {
        [-self.a1, -self.a2]
    }
}

/// A floating-point [Biquad filter](https://en.wikipedia.org/wiki/Digital_biquad_filter)
/// section in Direct Form 2 Transposed.
///
/// Holds the section coefficients together with its two delay registers so a
/// cascade of sections is a single contiguous allocation.
///
/// # Examples
///
/// ```
/// use sos_cascade::{Biquad, Coefficients};
///
/// // two-tap moving average
/// let mut stage = Biquad::new(Coefficients::new(0.5, 0.5, 0.0, 0.0, 0.0));
///
/// assert_eq!(stage.update(1.0), 0.5);
/// assert_eq!(stage.update(0.0), 0.5);
/// assert_eq!(stage.update(0.0), 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Biquad<T> {
    coefficients: Coefficients<T>,

    // delay registers
    d1: T,
    d2: T,
}

impl<T: Sample> Biquad<T> {
    /// Create a section with cleared state
    pub fn new(coefficients: Coefficients<T>) -> Self {
        Self {
            coefficients,
            d1: T::zero(),
            d2: T::zero(),
        }
    }

    /// Add a new input sample and get the resulting output
    #[inline(always)]
    pub fn update(&mut self, x: T) -> T {
        let c = &self.coefficients;
        // the output must be formed before the registers that depend on it
        let y = c.b0 * x + self.d1;
        self.d1 = c.b1 * x + c.a1 * y + self.d2;
        self.d2 = c.b2 * x + c.a2 * y;
        y
    }

    /// Filter a block in place.
    ///
    /// Same arithmetic as [`update`](Self::update), with the registers kept in
    /// locals for the duration of the block.
    pub(crate) fn run(&mut self, block: &mut [T]) {
        let Coefficients { b0, b1, b2, a1, a2 } = self.coefficients;
        let mut d1 = self.d1;
        let mut d2 = self.d2;
        for s in block.iter_mut() {
            let x = *s;
            let y = b0 * x + d1;
            d1 = b1 * x + a1 * y + d2;
            d2 = b2 * x + a2 * y;
            *s = y;
        }
        self.d1 = d1;
        self.d2 = d2;
    }

    /// Reset the filter
    ///
    /// This will clear the delay registers of the section
    pub fn reset(&mut self) {
        self.d1 = T::zero();
        self.d2 = T::zero();
    }

    /// Current delay registers `(d1, d2)`
    pub fn state(&self) -> (T, T) {
        (self.d1, self.d2)
    }

    pub fn coefficients(&self) -> &Coefficients<T> {
        &self.coefficients
    }
}
