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

//! Process-wide filter registry.
//!
//! Host bindings that can only pass integers around use these functions
//! instead of owning a [`Registry`]. Handles are exchanged as raw `u64`s via
//! [`Handle::into_raw`] and [`Handle::from_raw`].
//!
//! ```
//! use sos_cascade::global;
//!
//! let h = global::create::<f64, _>(&[[1.0, 0.0, 0.0, 1.0, 0.0, 0.0]]).unwrap();
//! assert_eq!(global::apply(h, &[1.0, 2.0, 3.0]).unwrap(), [1.0, 2.0, 3.0]);
//! global::release(h).unwrap();
//! ```

use lazy_static::lazy_static;

use crate::error::Result;
use crate::handle::Handle;
use crate::registry::Registry;
use crate::sample::Sample;

lazy_static! {
    static ref REGISTRY: Registry = Registry::default();
}

/// The process-wide registry, with default limits
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Create a filter in the process-wide registry
pub fn create<T: Sample, R: AsRef<[T]>>(rows: &[R]) -> Result<Handle> {
    REGISTRY.create(rows)
}

/// Filter a block through a filter of the process-wide registry
pub fn apply<T: Sample>(handle: Handle, input: &[T]) -> Result<Vec<T>> {
    REGISTRY.apply(handle, input)
}

/// Filter a block in place through a filter of the process-wide registry
pub fn apply_in_place<T: Sample>(handle: Handle, block: &mut [T]) -> Result<()> {
    REGISTRY.apply_in_place(handle, block)
}

/// Replace coefficients and clear state, keeping the handle
pub fn reinit<T: Sample, R: AsRef<[T]>>(handle: Handle, rows: &[R]) -> Result<()> {
    REGISTRY.reinit(handle, rows)
}

/// Clear the state of a filter
pub fn reset(handle: Handle) -> Result<()> {
    REGISTRY.reset(handle)
}

/// Release a filter of the process-wide registry
pub fn release(handle: Handle) -> Result<()> {
    REGISTRY.release(handle)
}
