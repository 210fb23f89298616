// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wire format definitions from the Devicetree Specification. All multi-byte
//! scalars are big-endian.

#![allow(dead_code)]

use zerocopy::BigEndian;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

pub type U32b = zerocopy::U32<BigEndian>;
pub type U64b = zerocopy::U64<BigEndian>;

/// The fixed 40-byte header at the start of every FDT blob.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct Header {
    pub magic: U32b,
    pub totalsize: U32b,
    pub off_dt_struct: U32b,
    pub off_dt_strings: U32b,
    pub off_mem_rsvmap: U32b,
    pub version: U32b,
    pub last_comp_version: U32b,
    pub boot_cpuid_phys: U32b,
    pub size_dt_strings: U32b,
    pub size_dt_struct: U32b,
}

/// A single entry in the memory reservation table. The table is terminated by
/// an entry with both fields zero.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout, FromBytes, PartialEq, Eq, Clone, Copy)]
pub struct ReserveEntry {
    pub address: U64b,
    pub size: U64b,
}

/// The record following a `PROP` token. `len` bytes of value data follow it,
/// padded out to the next 4-byte boundary.
#[repr(C)]
#[derive(Debug, IntoBytes, Immutable, KnownLayout, FromBytes)]
pub struct PropHeader {
    pub len: U32b,
    pub nameoff: U32b,
}

pub const BEGIN_NODE: u32 = 1;
pub const END_NODE: u32 = 2;
pub const PROP: u32 = 3;
pub const NOP: u32 = 4;
pub const END: u32 = 9;

pub const MAGIC: u32 = 0xd00dfeed;

/// The format version current blobs carry, and the oldest version they remain
/// compatible with. Callers typically assert the latter.
pub const VERSION: u32 = 17;
pub const LAST_COMP_VERSION: u32 = 16;
