// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Ready-made sinks with fixed-capacity storage, usable before any allocator
//! exists.

use crate::walk::MatchedProperty;
use crate::walk::PropertySink;
use crate::walk::Region;
use crate::walk::ValueError;
use arrayvec::ArrayVec;

/// A sink that copies the raw bytes of the first matched property, along with
/// its cell context. Values longer than `N` are truncated, and the truncation
/// recorded.
#[derive(Debug)]
pub struct BytesSink<const N: usize> {
    value: ArrayVec<u8, N>,
    address_cells: u32,
    size_cells: u32,
    matched: bool,
    truncated: bool,
}

impl<const N: usize> BytesSink<N> {
    /// Creates an empty sink.
    pub const fn new() -> Self {
        Self {
            value: ArrayVec::new_const(),
            address_cells: 0,
            size_cells: 0,
            matched: false,
            truncated: false,
        }
    }

    /// The captured value bytes, if a property matched.
    pub fn value(&self) -> Option<&[u8]> {
        self.matched.then(|| self.value.as_slice())
    }

    /// The `(#address-cells, #size-cells)` context of the captured property.
    pub fn cells(&self) -> Option<(u32, u32)> {
        self.matched
            .then_some((self.address_cells, self.size_cells))
    }

    /// Whether the captured value was cut off at `N` bytes.
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> Default for BytesSink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PropertySink for BytesSink<N> {
    fn property(&mut self, prop: &MatchedProperty<'_>) {
        if self.matched {
            return;
        }
        self.matched = true;
        self.address_cells = prop.address_cells;
        self.size_cells = prop.size_cells;
        let take = usize::min(prop.value.len(), N);
        self.truncated = take < prop.value.len();
        self.value = ArrayVec::try_from(&prop.value[..take]).unwrap();
    }
}

/// A sink that decodes every matched property as a `reg`-style list of
/// `(address, size)` pairs and accumulates them, up to `N` regions.
#[derive(Debug)]
pub struct RegionSink<const N: usize> {
    regions: ArrayVec<Region, N>,
    overflow: bool,
    error: Option<ValueError>,
}

impl<const N: usize> RegionSink<N> {
    /// Creates an empty sink.
    pub const fn new() -> Self {
        Self {
            regions: ArrayVec::new_const(),
            overflow: false,
            error: None,
        }
    }

    /// The regions accumulated so far, in traversal order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Whether more than `N` regions matched.
    pub fn overflowed(&self) -> bool {
        self.overflow
    }

    /// The first decode failure, if any matched value was not a valid
    /// `reg`-style list.
    pub fn error(&self) -> Option<&ValueError> {
        self.error.as_ref()
    }
}

impl<const N: usize> Default for RegionSink<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PropertySink for RegionSink<N> {
    fn property(&mut self, prop: &MatchedProperty<'_>) {
        match prop.reg_regions() {
            Ok(regions) => {
                for region in regions {
                    if self.regions.try_push(region).is_err() {
                        self.overflow = true;
                        break;
                    }
                }
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
    }
}
