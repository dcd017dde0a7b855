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

//! Handle-based ownership of filter instances.
//!
//! A [`Registry`] owns every cascade it creates and hands out [`Handle`]s in
//! exchange. Handles are plain integers so they can cross a host boundary,
//! and they carry a slot generation so a released handle can never reach an
//! instance created later in the same slot.
//!
//! # Locking
//!
//! The slot table sits behind a [`RwLock`] and every live slot behind its own
//! [`Mutex`]. Filtering takes the table read lock and the slot lock, so
//! different handles can be filtered from different threads at the same time
//! while calls on one handle are serialized. Creating, re-initializing and
//! releasing take the table write lock and wait for in-flight filtering to
//! finish.

use parking_lot::{Mutex, RwLock};

use crate::cascade::{AnyCascade, Cascade};
use crate::error::{CoefficientError, Error, Result};
use crate::handle::Handle;
use crate::sample::{Precision, Sample};

/// Default number of filters that may be live at once
pub const DEFAULT_CAPACITY: usize = 500;

/// Default maximum number of sections per cascade
pub const DEFAULT_MAX_STAGES: usize = 16;

/// Limits applied by a [`Registry`]
///
/// ```
/// use sos_cascade::{Registry, RegistryConfig};
///
/// let registry = Registry::new(RegistryConfig::default().with_capacity(8).with_max_stages(4));
/// assert_eq!(registry.capacity(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of live filters
    pub capacity: usize,
    /// Maximum number of sections in one cascade
    pub max_stages: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_stages: DEFAULT_MAX_STAGES,
        }
    }
}

impl RegistryConfig {
    /// Consume config and return new config with a set number of live filters
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Consume config and return new config with a set maximum cascade length
    pub fn with_max_stages(mut self, max_stages: usize) -> Self {
        self.max_stages = max_stages;
        self
    }
}

struct Slot {
    generation: u32,
    filter: Option<Mutex<AnyCascade>>,
}

#[derive(Default)]
struct Table {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

fn live_filter(slots: &[Slot], handle: Handle) -> Result<&Mutex<AnyCascade>> {
    slots
        .get(handle.index())
        .filter(|slot| slot.generation == handle.generation())
        .and_then(|slot| slot.filter.as_ref())
        .ok_or(Error::InvalidHandle(handle))
}

fn live_slot_mut(slots: &mut [Slot], handle: Handle) -> Result<&mut Slot> {
    match slots.get_mut(handle.index()) {
        Some(slot) if slot.generation == handle.generation() && slot.filter.is_some() => Ok(slot),
        _ => Err(Error::InvalidHandle(handle)),
    }
}

/// Owner of filter instances, addressed by [`Handle`]
///
/// # Examples
///
/// ```
/// use sos_cascade::{Error, Registry};
///
/// let registry = Registry::default();
/// let h = registry.create::<f32, _>(&[[0.5, 0.5, 0.0, 1.0, 0.0, 0.0]]).unwrap();
///
/// assert_eq!(registry.apply(h, &[1.0f32, 0.0]).unwrap(), [0.5, 0.5]);
/// assert_eq!(registry.apply(h, &[0.0f32, 0.0]).unwrap(), [0.0, 0.0]);
///
/// registry.release(h).unwrap();
/// assert_eq!(registry.apply(h, &[1.0f32]), Err(Error::InvalidHandle(h)));
/// ```
pub struct Registry {
    config: RegistryConfig,
    table: RwLock<Table>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            table: RwLock::new(Table::default()),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Maximum number of live filters
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Number of live filters
    pub fn len(&self) -> usize {
        self.table.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `handle` refers to a live filter
    pub fn contains(&self, handle: Handle) -> bool {
        live_filter(&self.table.read().slots, handle).is_ok()
    }

    /// Create a filter from a coefficient table and return its handle.
    ///
    /// See [`Cascade::from_rows`] for the accepted row layouts. The filter
    /// starts with cleared state and its precision is that of `T`.
    pub fn create<T: Sample, R: AsRef<[T]>>(&self, rows: &[R]) -> Result<Handle> {
        self.register(Cascade::from_rows(rows)?)
    }

    /// Take ownership of an already built cascade and return its handle
    pub fn register<T: Sample>(&self, cascade: Cascade<T>) -> Result<Handle> {
        self.check_stages(cascade.num_stages())?;

        let mut guard = self.table.write();
        let table = &mut *guard;
        if table.live >= self.config.capacity {
            return Err(Error::CapacityExceeded {
                capacity: self.config.capacity,
            });
        }

        let index = match table.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(table.slots.len()).map_err(|_| {
                    Error::CapacityExceeded {
                        capacity: self.config.capacity,
                    }
                })?;
                table.slots.push(Slot {
                    generation: 0,
                    filter: None,
                });
                index
            }
        };

        let slot = &mut table.slots[index as usize];
        slot.filter = Some(Mutex::new(T::into_any(cascade)));
        table.live += 1;
        Ok(Handle::new(index, slot.generation))
    }

    /// Release a filter and invalidate its handle.
    ///
    /// Releasing a handle twice is a programmer error; the second call fails
    /// with [`Error::InvalidHandle`] and changes nothing.
    pub fn release(&self, handle: Handle) -> Result<()> {
        let mut guard = self.table.write();
        let table = &mut *guard;
        let slot = live_slot_mut(&mut table.slots, handle)?;
        slot.filter = None;

        // a slot whose generation would wrap is retired rather than recycled
        if let Some(generation) = slot.generation.checked_add(1) {
            slot.generation = generation;
            table.free.push(handle.index() as u32);
        }
        table.live -= 1;
        Ok(())
    }

    /// Replace the coefficients of a live filter and clear its state.
    ///
    /// The handle stays valid. The new table must have the filter's precision.
    pub fn reinit<T: Sample, R: AsRef<[T]>>(&self, handle: Handle, rows: &[R]) -> Result<()> {
        let cascade = Cascade::from_rows(rows)?;
        self.check_stages(cascade.num_stages())?;

        let mut table = self.table.write();
        let slot = live_slot_mut(&mut table.slots, handle)?;
        let filter = slot
            .filter
            .as_mut()
            .ok_or(Error::InvalidHandle(handle))?
            .get_mut();
        check_precision::<T>(filter.precision())?;
        *filter = T::into_any(cascade);
        Ok(())
    }

    /// Copy of the cascade behind `handle`, coefficients and state.
    ///
    /// The copy is detached from the registry: filtering it leaves the
    /// registered filter untouched, and the registry stays free for other
    /// calls while the copy is in use.
    pub fn snapshot<T: Sample>(&self, handle: Handle) -> Result<Cascade<T>> {
        self.lookup(handle, |cascade: &mut Cascade<T>| cascade.clone())
    }

    /// Run `f` with exclusive access to the cascade behind `handle`.
    ///
    /// Other handles stay usable from other threads while `f` runs. `f` runs
    /// under the table read lock and the slot mutex, neither of which is
    /// re-entrant, so it must not call back into the registry.
    pub(crate) fn lookup<T, F, O>(&self, handle: Handle, f: F) -> Result<O>
    where
        T: Sample,
        F: FnOnce(&mut Cascade<T>) -> O,
    {
        let table = self.table.read();
        let mut filter = live_filter(&table.slots, handle)?.lock();
        let stored = filter.precision();
        let cascade = T::downcast_mut(&mut filter).ok_or(Error::PrecisionMismatch {
            expected: stored,
            found: T::PRECISION,
        })?;
        Ok(f(cascade))
    }

    /// Filter a block through the filter behind `handle`
    pub fn apply<T: Sample>(&self, handle: Handle, input: &[T]) -> Result<Vec<T>> {
        self.lookup(handle, |cascade: &mut Cascade<T>| {
            let mut output = input.to_vec();
            cascade.process_in_place(&mut output).map(|_| output)
        })?
    }

    /// Filter `input` into `output`, which must be the same length
    pub fn apply_into<T: Sample>(&self, handle: Handle, input: &[T], output: &mut [T]) -> Result<()> {
        self.lookup(handle, |cascade: &mut Cascade<T>| {
            cascade.process(input, output)
        })?
    }

    /// Filter a block in place
    pub fn apply_in_place<T: Sample>(&self, handle: Handle, block: &mut [T]) -> Result<()> {
        self.lookup(handle, |cascade: &mut Cascade<T>| {
            cascade.process_in_place(block)
        })?
    }

    /// Clear the state of a live filter, keeping its coefficients
    pub fn reset(&self, handle: Handle) -> Result<()> {
        let table = self.table.read();
        live_filter(&table.slots, handle)?.lock().reset();
        Ok(())
    }

    /// Precision the filter was created with
    pub fn precision(&self, handle: Handle) -> Result<Precision> {
        let table = self.table.read();
        let precision = live_filter(&table.slots, handle)?.lock().precision();
        Ok(precision)
    }

    /// Number of sections in the filter
    pub fn num_stages(&self, handle: Handle) -> Result<usize> {
        let table = self.table.read();
        let stages = live_filter(&table.slots, handle)?.lock().num_stages();
        Ok(stages)
    }

    fn check_stages(&self, stages: usize) -> Result<()> {
        if stages > self.config.max_stages {
            return Err(CoefficientError::TooManyStages {
                stages,
                max: self.config.max_stages,
            }
            .into());
        }
        Ok(())
    }
}

fn check_precision<T: Sample>(stored: Precision) -> Result<()> {
    if stored != T::PRECISION {
        return Err(Error::PrecisionMismatch {
            expected: stored,
            found: T::PRECISION,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;
    use approx::assert_abs_diff_eq;

    const AVERAGE: [[f64; 6]; 1] = [[0.5, 0.5, 0.0, 1.0, 0.0, 0.0]];
    const RESONATOR: [[f64; 5]; 2] = [[0.2, 0.3, 0.1, -0.9, 0.4], [1.0, 0.5, 0.25, 0.1, 0.05]];

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn registry_is_shareable() {
        assert_send_sync::<Registry>();
    }

    #[test]
    fn lifecycle() {
        let registry = Registry::default();
        assert!(registry.is_empty());

        let h = registry.create::<f64, _>(&AVERAGE).unwrap();
        assert!(registry.contains(h));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.precision(h), Ok(Precision::Double));
        assert_eq!(registry.num_stages(h), Ok(1));

        let mut y = registry.apply(h, &[1.0, 0.0]).unwrap();
        y.extend(registry.apply(h, &[0.0, 0.0]).unwrap());
        assert_eq!(y, [0.5, 0.5, 0.0, 0.0]);

        registry.release(h).unwrap();
        assert!(!registry.contains(h));
        assert!(registry.is_empty());
        assert_eq!(registry.apply(h, &[1.0f64]), Err(Error::InvalidHandle(h)));
        assert_eq!(registry.reset(h), Err(Error::InvalidHandle(h)));
        assert_eq!(registry.release(h), Err(Error::InvalidHandle(h)));
    }

    #[test]
    fn unknown_handle() {
        let registry = Registry::default();
        let h = Handle::from_raw(42);
        assert_eq!(registry.apply(h, &[1.0f32]), Err(Error::InvalidHandle(h)));
        assert_eq!(registry.precision(h), Err(Error::InvalidHandle(h)));
    }

    #[test]
    fn recycled_slot_does_not_resurrect() {
        let registry = Registry::default();
        let old = registry.create::<f64, _>(&AVERAGE).unwrap();
        registry.apply(old, &[1.0]).unwrap();
        registry.release(old).unwrap();

        let new = registry.create::<f64, _>(&AVERAGE).unwrap();
        assert_eq!(new.index(), old.index());
        assert_ne!(new, old);

        // fresh state: no leftover 0.5 from the old instance
        assert_eq!(registry.apply(new, &[0.0, 0.0]).unwrap(), [0.0, 0.0]);
        assert_eq!(registry.apply(old, &[0.0f64]), Err(Error::InvalidHandle(old)));
        assert_eq!(registry.release(old), Err(Error::InvalidHandle(old)));
        assert!(registry.contains(new));
    }

    #[test]
    fn exhausted_generation_retires_slot() {
        let registry = Registry::default();
        let h = registry.create::<f64, _>(&AVERAGE).unwrap();
        registry.table.write().slots[h.index()].generation = u32::MAX;
        let h = Handle::new(h.index() as u32, u32::MAX);

        registry.release(h).unwrap();
        let next = registry.create::<f64, _>(&AVERAGE).unwrap();
        assert_ne!(next.index(), h.index());
        assert_eq!(registry.apply(h, &[1.0f64]), Err(Error::InvalidHandle(h)));
    }

    #[test]
    fn precision_isolation() {
        let registry = Registry::default();
        let single = registry
            .create::<f32, _>(&[[1.0, 0.0, 0.0, 0.0, 0.0]])
            .unwrap();
        let double = registry.create::<f64, _>(&AVERAGE).unwrap();

        assert_eq!(
            registry.apply(single, &[1.0f64]),
            Err(Error::PrecisionMismatch {
                expected: Precision::Single,
                found: Precision::Double
            })
        );
        assert_eq!(
            registry.apply(double, &[1.0f32]),
            Err(Error::PrecisionMismatch {
                expected: Precision::Double,
                found: Precision::Single
            })
        );

        // failed calls leave both filters untouched
        assert_eq!(registry.apply(single, &[1.0f32, 2.0, 3.0]).unwrap(), [1.0, 2.0, 3.0]);
        assert_eq!(registry.apply(double, &[1.0, 0.0]).unwrap(), [0.5, 0.5]);
    }

    #[test]
    fn invalid_coefficients_create_nothing() {
        let registry = Registry::default();
        let empty: [[f64; 6]; 0] = [];
        assert_eq!(
            registry.create::<f64, _>(&empty),
            Err(Error::InvalidCoefficients(CoefficientError::Empty))
        );
        assert_eq!(
            registry.create::<f64, _>(&[[1.0f64, 0.0, 0.0, 0.0]]),
            Err(Error::InvalidCoefficients(CoefficientError::RowWidth {
                row: 0,
                width: 4
            }))
        );
        assert_eq!(
            registry.create::<f64, _>(&[[1.0f64, 0.0, 0.0, 0.9, 0.0, 0.0]]),
            Err(Error::InvalidCoefficients(CoefficientError::Normalization {
                row: 0
            }))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn limits() {
        let registry = Registry::new(RegistryConfig::default().with_capacity(2).with_max_stages(1));

        assert_eq!(
            registry.create::<f64, _>(&RESONATOR),
            Err(Error::InvalidCoefficients(CoefficientError::TooManyStages {
                stages: 2,
                max: 1
            }))
        );

        let a = registry.create::<f64, _>(&AVERAGE).unwrap();
        let _b = registry.create::<f64, _>(&AVERAGE).unwrap();
        assert_eq!(
            registry.create::<f64, _>(&AVERAGE),
            Err(Error::CapacityExceeded { capacity: 2 })
        );

        registry.release(a).unwrap();
        assert!(registry.create::<f64, _>(&AVERAGE).is_ok());
    }

    #[test]
    fn reset_and_reinit() {
        let registry = Registry::default();
        let x = [1.0, -0.5, 0.25, 0.75];
        let h = registry.create::<f64, _>(&RESONATOR).unwrap();
        let first = registry.apply(h, &x).unwrap();

        registry.reset(h).unwrap();
        assert_eq!(registry.apply(h, &x).unwrap(), first);

        registry.reinit::<f64, _>(h, &AVERAGE).unwrap();
        assert!(registry.contains(h));
        assert_eq!(registry.num_stages(h), Ok(1));
        assert_eq!(registry.apply(h, &[1.0, 0.0, 0.0]).unwrap(), [0.5, 0.5, 0.0]);

        assert_eq!(
            registry.reinit::<f32, _>(h, &[[1.0, 0.0, 0.0, 0.0, 0.0]]),
            Err(Error::PrecisionMismatch {
                expected: Precision::Double,
                found: Precision::Single
            })
        );
        let empty: [[f64; 5]; 0] = [];
        assert!(registry.reinit::<f64, _>(h, &empty).is_err());
        assert_eq!(registry.num_stages(h), Ok(1));

        registry.release(h).unwrap();
        assert_eq!(registry.reinit::<f64, _>(h, &AVERAGE), Err(Error::InvalidHandle(h)));
    }

    #[test]
    fn buffer_forms() {
        let registry = Registry::default();
        let x = [0.3, -0.2, 0.9, 0.0, 1.0];
        let a = registry.create::<f64, _>(&RESONATOR).unwrap();
        let b = registry.create::<f64, _>(&RESONATOR).unwrap();
        let c = registry.create::<f64, _>(&RESONATOR).unwrap();

        let expected = registry.apply(a, &x).unwrap();

        let mut out = [0.0; 5];
        registry.apply_into(b, &x, &mut out).unwrap();
        assert_eq!(out, expected[..]);

        let mut block = x;
        registry.apply_in_place(c, &mut block).unwrap();
        assert_eq!(block, expected[..]);

        let mut short = [0.0; 2];
        assert_eq!(
            registry.apply_into(b, &x, &mut short),
            Err(Error::LengthMismatch {
                input: 5,
                output: 2
            })
        );
        assert!(registry.apply(a, &[] as &[f64]).unwrap().is_empty());
    }

    #[test]
    fn lookup_borrows_the_cascade() {
        let registry = Registry::default();
        let h = registry.create::<f64, _>(&RESONATOR).unwrap();
        registry.apply(h, &[1.0]).unwrap();

        let (d1, _) = registry
            .lookup(h, |c: &mut Cascade<f64>| c.stages()[0].state())
            .unwrap();
        // d1 after one unit sample: b1 - a1*b0
        assert_abs_diff_eq!(d1, 0.3 + 0.9 * 0.2, epsilon = 1e-12);
    }

    #[test]
    fn snapshot_is_detached() {
        let registry = Registry::default();
        let h = registry.create::<f64, _>(&RESONATOR).unwrap();
        registry.apply(h, &[1.0]).unwrap();

        let mut copy = registry.snapshot::<f64>(h).unwrap();
        assert_eq!(copy.stages()[0].state(), registry.snapshot::<f64>(h).unwrap().stages()[0].state());

        copy.reset();
        copy.apply(&[5.0, 5.0]);
        let (d1, _) = registry.snapshot::<f64>(h).unwrap().stages()[0].state();
        assert_abs_diff_eq!(d1, 0.3 + 0.9 * 0.2, epsilon = 1e-12);

        assert!(matches!(
            registry.snapshot::<f32>(h),
            Err(Error::PrecisionMismatch { .. })
        ));
        registry.release(h).unwrap();
        assert_eq!(registry.snapshot::<f64>(h), Err(Error::InvalidHandle(h)));
    }

    #[test]
    fn registry_calls_while_a_copy_is_in_use() {
        use std::sync::{mpsc, Arc};
        use std::time::Duration;

        let registry = Arc::new(Registry::default());
        let h = registry.create::<f64, _>(&RESONATOR).unwrap();

        let (tx, rx) = mpsc::channel();
        let worker = Arc::clone(&registry);
        std::thread::spawn(move || {
            let mut copy = worker.snapshot::<f64>(h).unwrap();
            let mut y = Vec::new();
            for x in [1.0, 0.0, 0.0] {
                // same handle, then a table write, while the copy is still live
                y.push(copy.update(x));
                worker.apply(h, &[x]).unwrap();
            }
            worker.reset(h).unwrap();
            worker.release(h).unwrap();
            let other = worker.create::<f64, _>(&AVERAGE).unwrap();
            tx.send((y, copy.apply(&[0.0]), worker.contains(other))).unwrap();
        });

        let (y, _, created) = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("registry calls blocked while a copy was in use");
        assert_eq!(y[0], 0.2);
        assert!(created);
        assert!(!registry.contains(h));
    }

    #[test]
    fn register_only_sees_finite_cascades() {
        use crate::biquad::Coefficients;

        let registry = Registry::default();
        let cascade = Cascade::new([Coefficients::new(0.2, 0.3, 0.0, f64::NAN, 0.0)])
            .and_then(|c| registry.register(c));
        assert_eq!(
            cascade,
            Err(Error::InvalidCoefficients(CoefficientError::NonFinite {
                row: 0
            }))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn handles_are_independent_across_threads() {
        let registry = Registry::default();
        let x: Vec<f64> = (0..256).map(|i| ((i * 37) % 17) as f64 / 17.0 - 0.5).collect();
        let expected = Cascade::<f64>::from_rows(&RESONATOR).unwrap().apply(&x);

        let handles: Vec<Handle> = (0..4).map(|_| registry.create::<f64, _>(&RESONATOR).unwrap()).collect();
        let outputs: Vec<Vec<f64>> = std::thread::scope(|s| {
            let workers: Vec<_> = handles
                .iter()
                .map(|&h| {
                    let registry = &registry;
                    let x = &x;
                    s.spawn(move || {
                        let mut y = Vec::new();
                        for chunk in x.chunks(13) {
                            y.extend(registry.apply(h, chunk).unwrap());
                        }
                        y
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        for y in outputs {
            assert_eq!(y, expected);
        }
    }
}
