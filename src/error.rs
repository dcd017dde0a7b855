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

use thiserror::Error;

use crate::handle::Handle;
use crate::sample::Precision;

/// Result alias used throughout the crate
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors reported by cascade construction, the engine and the registry.
///
/// Every variant is a caller error. A failed call has no effect on any
/// registered instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The coefficient table could not be turned into a cascade
    #[error("invalid coefficients: {0}")]
    InvalidCoefficients(#[from] CoefficientError),

    /// The handle is unknown or has been released
    #[error("invalid filter handle {0}")]
    InvalidHandle(Handle),

    /// The handle was created at a different precision than the one requested
    #[error("precision mismatch: filter is {expected}, request is {found}")]
    PrecisionMismatch {
        expected: Precision,
        found: Precision,
    },

    /// The cascade has no stages
    #[error("cascade has no stages")]
    EmptyCascade,

    /// Input and output buffers differ in length
    #[error("input has {input} samples but output has room for {output}")]
    LengthMismatch { input: usize, output: usize },

    /// The registry already holds its maximum number of live instances
    #[error("registry is full ({capacity} live filters)")]
    CapacityExceeded { capacity: usize },
}

/// Reason a coefficient table was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CoefficientError {
    /// No rows were supplied
    #[error("coefficient table is empty")]
    Empty,

    /// A row is neither 5 (`b0 b1 b2 a1 a2`) nor 6 (`b0 b1 b2 a0 a1 a2`) wide
    #[error("row {row} has {width} values, expected 5 or 6")]
    RowWidth { row: usize, width: usize },

    /// Rows of one table differ in width
    #[error("row {row} has {width} values but row 0 has {expected}")]
    RaggedTable {
        row: usize,
        width: usize,
        expected: usize,
    },

    /// The `a0` column of a 6-wide row is not 1
    #[error("row {row} is not normalized (a0 != 1)")]
    Normalization { row: usize },

    /// A coefficient is NaN or infinite
    #[error("row {row} contains a non-finite coefficient")]
    NonFinite { row: usize },

    /// More stages than the registry allows per cascade
    #[error("{stages} stages exceeds the maximum of {max}")]
    TooManyStages { stages: usize, max: usize },
}
