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

/// Opaque token identifying one registered filter instance.
///
/// The low 32 bits select a registry slot and the high 32 bits carry the slot
/// generation at the time the instance was registered. Releasing an instance
/// bumps the generation of its slot, so a stale handle never matches whatever
/// is registered in that slot later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    #[cfg(any(test, feature = "std"))]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | index as u64)
    }

    /// Rebuild a handle from the value returned by [`Handle::into_raw`]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw integer form for passing across a host boundary
    pub fn into_raw(self) -> u64 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        (self.0 & 0xFFFF_FFFF) as usize
    }

    pub(crate) fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index(), self.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        let h = Handle::new(7, 3);
        assert_eq!(h.index(), 7);
        assert_eq!(h.generation(), 3);
        assert_eq!(Handle::from_raw(h.into_raw()), h);
        assert_eq!(h.to_string(), "#7.3");
    }

    #[test]
    fn generation_distinguishes_same_slot() {
        assert_ne!(Handle::new(0, 0), Handle::new(0, 1));
        assert_ne!(Handle::new(0, 1).into_raw(), Handle::new(1, 0).into_raw());
    }
}
