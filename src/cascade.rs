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

use alloc::vec::Vec;

use crate::biquad::{Biquad, Coefficients};
use crate::error::{CoefficientError, Error, Result};
use crate::sample::{Precision, Sample};

/// A chain of biquad sections applied in series.
///
/// The output of section `i` feeds section `i + 1`. State persists between
/// calls, so filtering a signal in consecutive blocks gives exactly the same
/// samples as filtering it in one go.
///
/// # Examples
///
/// ```
/// use sos_cascade::Cascade;
///
/// // second-order-sections as exported by a design tool: b0 b1 b2 a0 a1 a2
/// let sos = [
///     [0.5, 0.5, 0.0, 1.0, 0.0, 0.0],
///     [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
/// ];
/// let mut filter = Cascade::<f64>::from_rows(&sos).unwrap();
///
/// let mut y = filter.apply(&[1.0, 0.0]);
/// y.extend(filter.apply(&[0.0, 0.0]));
/// assert_eq!(y, [0.5, 0.5, 0.0, 0.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade<T> {
    stages: Vec<Biquad<T>>,
}

impl<T: Sample> Cascade<T> {
    /// Create a cascade from section coefficients, in cascade order.
    ///
    /// Fails on an empty iterator or on a section with a NaN or infinite
    /// coefficient.
    pub fn new<I>(sections: I) -> Result<Self>
    where
        I: IntoIterator<Item = Coefficients<T>>,
    {
        let mut stages = Vec::new();
        for (row, coefficients) in sections.into_iter().enumerate() {
            if !coefficients.is_finite() {
                return Err(CoefficientError::NonFinite { row }.into());
            }
            stages.push(Biquad::new(coefficients));
        }
        if stages.is_empty() {
            return Err(CoefficientError::Empty.into());
        }
        Ok(Self { stages })
    }

    /// Create a cascade from a coefficient table, one row per section.
    ///
    /// Rows are either all 5 wide (`b0 b1 b2 a1 a2`) or all 6 wide
    /// (`b0 b1 b2 a0 a1 a2`, with `a0 == 1`).
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let expected = rows.first().ok_or(CoefficientError::Empty)?.as_ref().len();
        let mut stages = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != expected {
                return Err(CoefficientError::RaggedTable {
                    row: i,
                    width: row.len(),
                    expected,
                }
                .into());
            }
            stages.push(Biquad::new(Coefficients::parse(i, row)?));
        }
        Ok(Self { stages })
    }

    /// Create a cascade from a flat row-major table with `columns` values per row
    pub fn from_flat(data: &[T], columns: usize) -> Result<Self> {
        if columns == 0 || data.len() % columns != 0 {
            return Err(CoefficientError::RowWidth {
                row: data.len() / columns.max(1),
                width: if columns == 0 { 0 } else { data.len() % columns },
            }
            .into());
        }
        let rows: Vec<&[T]> = data.chunks(columns).collect();
        Self::from_rows(&rows)
    }

    pub fn num_stages(&self) -> usize {
        self.stages.len()
    }

    pub fn precision(&self) -> Precision {
        T::PRECISION
    }

    /// The sections in cascade order
    pub fn stages(&self) -> &[Biquad<T>] {
        &self.stages
    }

    /// Run one sample through every section
    #[inline]
    pub fn update(&mut self, x: T) -> T {
        self.stages.iter_mut().fold(x, |x, stage| stage.update(x))
    }

    /// Filter `block` in place, carrying state to the next call
    pub fn process_in_place(&mut self, block: &mut [T]) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::EmptyCascade);
        }
        // Each section only ever sees the previous section's output, so
        // running the sections one block at a time gives the same samples
        // as running the samples one section at a time.
        for stage in self.stages.iter_mut() {
            stage.run(block);
        }
        Ok(())
    }

    /// Filter `input` into `output`, which must be the same length
    pub fn process(&mut self, input: &[T], output: &mut [T]) -> Result<()> {
        if input.len() != output.len() {
            return Err(Error::LengthMismatch {
                input: input.len(),
                output: output.len(),
            });
        }
        output.copy_from_slice(input);
        self.process_in_place(output)
    }

    /// Filter `input` into a freshly allocated block
    pub fn apply(&mut self, input: &[T]) -> Vec<T> {
        let mut output = input.to_vec();
        for stage in self.stages.iter_mut() {
            stage.run(&mut output);
        }
        output
    }

    /// Clear the state of every section, keeping the coefficients
    pub fn reset(&mut self) {
        self.stages.iter_mut().for_each(Biquad::reset);
    }
}

/// A cascade of either precision, tagged by its width.
///
/// This is what a registry slot owns; the typed cascade is recovered with
/// [`Sample::downcast_mut`].
#[derive(Debug, Clone, PartialEq)]
pub enum AnyCascade {
    Single(Cascade<f32>),
    Double(Cascade<f64>),
}

impl AnyCascade {
    pub fn precision(&self) -> Precision {
        match self {
            AnyCascade::Single(_) => Precision::Single,
            AnyCascade::Double(_) => Precision::Double,
        }
    }

    pub fn num_stages(&self) -> usize {
        match self {
            AnyCascade::Single(c) => c.num_stages(),
            AnyCascade::Double(c) => c.num_stages(),
        }
    }

    pub fn reset(&mut self) {
        match self {
            AnyCascade::Single(c) => c.reset(),
            AnyCascade::Double(c) => c.reset(),
        }
    }
}

impl From<Cascade<f32>> for AnyCascade {
    fn from(cascade: Cascade<f32>) -> Self {
        AnyCascade::Single(cascade)
    }
}

impl From<Cascade<f64>> for AnyCascade {
    fn from(cascade: Cascade<f64>) -> Self {
        AnyCascade::Double(cascade)
    }
}
