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

//! Measured magnitude response of a cascade.
//!
//! Drives a filter with a unit sine and records the peak of the output once
//! the filter has settled. Handy for checking a designed table on the target
//! itself, where there is no frequency-response tooling.

use alloc::vec::Vec;
use core::f32::consts::PI;

#[allow(unused_imports)]
use micromath::F32Ext; // enable floating point sin/cos approximations in microcontrollers

use crate::cascade::Cascade;
use crate::sample::Sample;

/// Peak output amplitude for a unit sine input at `freq`.
///
/// The cascade is reset, driven for `duration` seconds at `sample_rate`, and
/// the peak is taken over the second half of the run. The cascade is left
/// holding the state of the measurement run.
///
/// # Examples
///
/// ```
/// use sos_cascade::{response, Cascade};
///
/// let mut passthrough = Cascade::<f32>::from_rows(&[[1.0, 0.0, 0.0, 0.0, 0.0]]).unwrap();
/// let peak = response::sine_amplitude(&mut passthrough, 50.0, 1000.0, 1.0);
/// assert!((peak - 1.0).abs() < 0.01);
/// ```
pub fn sine_amplitude<T: Sample>(
    cascade: &mut Cascade<T>,
    freq: f32,
    sample_rate: f32,
    duration: f32,
) -> T {
    cascade.reset();

    let n = (duration * sample_rate) as usize;
    let step = freq / sample_rate;
    let mut phase = 0.0f32;
    let mut peak = T::zero();
    for i in 0..n {
        let x = (2.0 * PI * phase).sin();
        let y = cascade.update(T::from_f32(x));

        // allow the filter to converge before we record the amplitude
        if i >= n / 2 {
            peak = peak.max(y.abs());
        }

        phase += step;
        if phase >= 1.0 {
            phase -= 1.0;
        }
    }
    peak
}

/// [`sine_amplitude`] at each of `freqs`
pub fn sweep<T: Sample>(
    cascade: &mut Cascade<T>,
    freqs: &[f32],
    sample_rate: f32,
    duration: f32,
) -> Vec<T> {
    freqs
        .iter()
        .map(|&f| sine_amplitude(cascade, f, sample_rate, duration))
        .collect()
}
