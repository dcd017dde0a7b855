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

use core::fmt;
use num_traits::Float;

use crate::cascade::{AnyCascade, Cascade};

/// Numeric width of a filter instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    /// `f32` samples, coefficients and state
    Single,
    /// `f64` samples, coefficients and state
    Double,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Single => f.write_str("float32"),
            Precision::Double => f.write_str("float64"),
        }
    }
}

mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Floating-point sample type a cascade can run on.
///
/// Implemented for `f32` and `f64` only. The filter arithmetic is written once
/// against this trait and monomorphized for each width, so there is no runtime
/// dispatch on the sample path.
pub trait Sample: Float + fmt::Debug + Send + Sync + 'static + private::Sealed {
    /// Precision tag stored alongside registered instances
    const PRECISION: Precision;

    /// Convert from `f32`, used for test signals
    fn from_f32(x: f32) -> Self;

    /// Wrap a typed cascade into the precision-tagged form the registry stores
    fn into_any(cascade: Cascade<Self>) -> AnyCascade;

    /// Borrow the typed cascade back out, or `None` if the widths differ
    fn downcast_mut(any: &mut AnyCascade) -> Option<&mut Cascade<Self>>;
}

impl Sample for f32 {
    const PRECISION: Precision = Precision::Single;

    #[inline(always)]
    fn from_f32(x: f32) -> Self {
        x
    }

    fn into_any(cascade: Cascade<Self>) -> AnyCascade {
        AnyCascade::Single(cascade)
    }

    fn downcast_mut(any: &mut AnyCascade) -> Option<&mut Cascade<Self>> {
        match any {
            AnyCascade::Single(c) => Some(c),
            AnyCascade::Double(_) => None,
        }
    }
}

impl Sample for f64 {
    const PRECISION: Precision = Precision::Double;

    #[inline(always)]
    fn from_f32(x: f32) -> Self {
        x as f64
    }

    fn into_any(cascade: Cascade<Self>) -> AnyCascade {
        AnyCascade::Double(cascade)
    }

    fn downcast_mut(any: &mut AnyCascade) -> Option<&mut Cascade<Self>> {
        match any {
            AnyCascade::Double(c) => Some(c),
            AnyCascade::Single(_) => None,
        }
    }
}
