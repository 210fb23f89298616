// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A single-pass property scanner for Flattened DeviceTree (FDT) binary
//! blobs.
//!
//! Rather than building a tree, the scanner walks the structure block once
//! and delivers the properties selected by a fixed set of slash-delimited
//! paths to caller-supplied sinks, together with the `#address-cells` /
//! `#size-cells` context inherited at the match site. Subtrees no path
//! continues into are skipped without resolving names. The scan also returns
//! the blob's reserved-memory table. Nothing is allocated; every value is a
//! span borrowed from the blob, so the scanner is usable in early boot,
//! before any heap exists.
//!
//! ```
//! use fdt_scan::sink::RegionSink;
//! use fdt_scan::PathInterest;
//!
//! fn probe(blob: &[u8]) -> Result<(), fdt_scan::Error<'_>> {
//!     let mut memory = RegionSink::<8>::new();
//!     let mut interests = [PathInterest {
//!         path: "memory/reg",
//!         sink: &mut memory,
//!     }];
//!     let parsed = fdt_scan::scan(blob, 16, &mut interests)?;
//!     for region in parsed.reserved {
//!         // The firmware forbids handing these ranges to the allocator.
//!         let _ = region;
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod parser;
pub mod sink;
mod spec;
mod structure;
#[cfg(test)]
mod testblob;
mod walk;

pub use parser::read_total_size;
pub use parser::scan;
pub use parser::Error;
pub use parser::ReservedMemory;
pub use parser::Scan;
pub use structure::StringError;
pub use walk::MatchedProperty;
pub use walk::PathInterest;
pub use walk::PropertySink;
pub use walk::Region;
pub use walk::Regions;
pub use walk::ValueError;
