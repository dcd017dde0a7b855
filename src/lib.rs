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

/*!
# `sos-cascade`

Streaming cascaded biquad filters for floating-point signals.

`sos-cascade` runs higher-order IIR filters expressed as a chain of [biquad](https://en.wikipedia.org/wiki/Digital_biquad_filter) sections, the "second-order sections" (SOS) table that filter design tools such as `scipy.signal.iirdesign(..., output='sos')` produce.  Each section is realized in Direct Form 2 Transposed, and every filter keeps its delay registers between calls, so a signal can be filtered block by block with exactly the same output as filtering it in one piece.  The arithmetic is generic over `f32` and `f64` and the core is `#![no_std]` (with `alloc`) for use on microcontrollers.

Designing the coefficients is left to the design tool; this crate only applies them.

# How to use

The main data structure for this crate is [Cascade<T>](crate::cascade::Cascade) where `T` is `f32` or `f64`.  Construct it from the rows of an SOS table, either 6 wide (`b0 b1 b2 a0 a1 a2`, with `a0 == 1`) or 5 wide (`b0 b1 b2 a1 a2`).

```rust
use sos_cascade::Cascade;

// two-tap moving average followed by a pass-through section
let sos = [
    [0.5, 0.5, 0.0, 1.0, 0.0, 0.0],
    [1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
];
let mut filter = Cascade::<f64>::from_rows(&sos).unwrap();

// the second block continues where the first one stopped
let mut y = filter.apply(&[1.0, 0.0]);
y.extend(filter.apply(&[0.0, 0.0]));
assert_eq!(y, [0.5, 0.5, 0.0, 0.0]);
```

When the caller can only pass integers around, for example from a host language binding, filters are owned by a [Registry](crate::registry::Registry) and addressed through an opaque [Handle].  A handle keeps the precision it was created with and becomes invalid once released.

```rust
use sos_cascade::{Error, Registry};

let registry = Registry::default();
let h = registry.create::<f32, _>(&[[1.0, 0.0, 0.0, 0.0, 0.0]]).unwrap();

assert_eq!(registry.apply(h, &[1.0f32, 2.0, 3.0]).unwrap(), [1.0, 2.0, 3.0]);
assert!(matches!(registry.apply(h, &[1.0f64]), Err(Error::PrecisionMismatch { .. })));

registry.release(h).unwrap();
assert_eq!(registry.apply(h, &[1.0f32]), Err(Error::InvalidHandle(h)));
```

The [global] module wraps one process-wide registry behind free functions.

# Features

| Feature | Default | Enables                                                        |
| :------ |:-------:| :------------------------------------------------------------- |
| `std`   | yes     | [Registry](crate::registry::Registry) and the [global] registry |

Without `std` the crate is `#![no_std]` and provides the sections, cascades and the [response] measurement.
*/
#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod biquad;
pub mod cascade;
pub mod error;
#[cfg(feature = "std")]
pub mod global;
pub mod handle;
#[cfg(feature = "std")]
pub mod registry;
pub mod response;
pub mod sample;

pub use biquad::{Biquad, Coefficients};
pub use cascade::{AnyCascade, Cascade};
pub use error::{CoefficientError, Error, Result};
pub use handle::Handle;
#[cfg(feature = "std")]
pub use registry::{Registry, RegistryConfig};
pub use sample::{Precision, Sample};
