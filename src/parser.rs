// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Header validation, reserved-memory extraction and the scan driver.

use crate::spec;
use crate::structure::Cursor;
use crate::structure::Token;
use crate::walk::PathInterest;
use crate::walk::Region;
use crate::walk::WalkError;
use crate::walk::Walker;
use core::fmt::Display;
use core::mem::size_of;
use zerocopy::FromBytes;

/// Errors returned when scanning a FDT.
#[derive(Debug)]
pub struct Error<'a>(ErrorKind<'a>);

impl Display for Error<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl core::error::Error for Error<'_> {}

/// Types of errors when scanning a FDT.
#[derive(Debug)]
enum ErrorKind<'a> {
    /// Buffer is not aligned to u32.
    BufferAlignment,
    /// Buffer too small for the fixed header.
    NoHeader,
    /// Fixed header magic invalid.
    HeaderMagic,
    /// Blob's last compatible version is not the one the caller supports.
    HeaderVersion { blob: u32, required: u32 },
    /// Total size described in the fixed header is greater than the buffer
    /// provided.
    HeaderTotalSize,
    /// Memory reservation table not contained within the buffer, or not
    /// terminated by an empty entry.
    ReservationTable,
    /// Structure block not aligned to u32.
    StructureBlockAlignment,
    /// Structure block not contained within the buffer.
    StructureBlock,
    /// Strings block not contained within the buffer.
    StringsBlock,
    /// Structure block does not open with the root node.
    RootNode,
    /// Malformed token stream while walking nodes.
    Structure(WalkError<'a>),
}

impl Display for ErrorKind<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ErrorKind::BufferAlignment => f.write_str("buffer is not aligned to u32"),
            ErrorKind::NoHeader => f.write_str("buffer too small for fixed FDT header"),
            ErrorKind::HeaderMagic => f.write_str("FDT header magic field invalid"),
            ErrorKind::HeaderVersion { blob, required } => f.write_fmt(format_args!(
                "FDT last compatible version {} does not match the required version {}",
                blob, required
            )),
            ErrorKind::HeaderTotalSize => {
                f.write_str("FDT header total size greater than provided buffer")
            }
            ErrorKind::ReservationTable => {
                f.write_str("memory reservation table did not end with an empty entry")
            }
            ErrorKind::StructureBlockAlignment => {
                f.write_str("structure block offset is not aligned to u32")
            }
            ErrorKind::StructureBlock => f.write_str("structure block not contained within buffer"),
            ErrorKind::StringsBlock => f.write_str("strings block not contained within buffer"),
            ErrorKind::RootNode => f.write_str("structure block does not open with the root node"),
            ErrorKind::Structure(e) => f.write_fmt(format_args!("malformed structure block: {}", e)),
        }
    }
}

/// An iterator over the reserved-memory table, excluding its terminating
/// empty entry. The table is validated before this is handed out, so the
/// iterator itself is infallible.
#[derive(Debug, Clone)]
pub struct ReservedMemory<'a> {
    entries: &'a [u8],
}

impl Iterator for ReservedMemory<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        let (entry, rest) = spec::ReserveEntry::read_from_prefix(self.entries).ok()?;
        self.entries = rest;
        Some(Region {
            address: entry.address.into(),
            size: entry.size.into(),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.entries.len() / size_of::<spec::ReserveEntry>();
        (n, Some(n))
    }
}

impl ExactSizeIterator for ReservedMemory<'_> {}

/// The results of a scan that are not delivered through sinks.
#[derive(Debug)]
pub struct Scan<'a> {
    /// The reserved-memory regions the OS must not overwrite.
    pub reserved: ReservedMemory<'a>,
    /// The physical ID of the boot CPU, from the header.
    pub boot_cpuid_phys: u32,
    /// Total size of the blob described by the header, in bytes.
    pub total_size: usize,
}

/// Reads just the `totalsize` field of a FDT header. This is useful when
/// attempting to determine the overall size of a device tree before scanning
/// it.
pub fn read_total_size(buf: &[u8]) -> Result<usize, Error<'_>> {
    let header = spec::Header::read_from_prefix(buf)
        .map_err(|_| Error(ErrorKind::NoHeader))?
        .0;

    if u32::from(header.magic) != spec::MAGIC {
        Err(Error(ErrorKind::HeaderMagic))
    } else {
        Ok(u32::from(header.totalsize) as usize)
    }
}

/// Scans a FDT blob in one pass.
///
/// Validates the header, requiring its `last_comp_version` to equal
/// `required_version`, then walks the structure block once, delivering every
/// property selected by `interests` to its sink in traversal order. An empty
/// `interests` slice is permitted; the header is still validated and the
/// reserved-memory table still returned.
pub fn scan<'a>(
    buf: &'a [u8],
    required_version: u32,
    interests: &mut [PathInterest<'_>],
) -> Result<Scan<'a>, Error<'a>> {
    if buf.as_ptr() as usize % size_of::<u32>() != 0 {
        return Err(Error(ErrorKind::BufferAlignment));
    }

    let header = spec::Header::read_from_prefix(buf)
        .map_err(|_| Error(ErrorKind::NoHeader))?
        .0;

    if u32::from(header.magic) != spec::MAGIC {
        return Err(Error(ErrorKind::HeaderMagic));
    }

    let last_comp_version = u32::from(header.last_comp_version);
    if last_comp_version != required_version {
        return Err(Error(ErrorKind::HeaderVersion {
            blob: last_comp_version,
            required: required_version,
        }));
    }

    let total_size = u32::from(header.totalsize) as usize;
    if total_size > buf.len() {
        return Err(Error(ErrorKind::HeaderTotalSize));
    }

    // Find the terminating empty entry of the reservation table so the
    // returned iterator covers exactly the entries before it.
    let rsvmap_offset = u32::from(header.off_mem_rsvmap) as usize;
    let mut rsvmap = buf
        .get(rsvmap_offset..)
        .ok_or(Error(ErrorKind::ReservationTable))?;
    let mut reservations_len = 0;
    loop {
        let (entry, rest) = spec::ReserveEntry::read_from_prefix(rsvmap)
            .map_err(|_| Error(ErrorKind::ReservationTable))?;
        if u64::from(entry.address) == 0 && u64::from(entry.size) == 0 {
            break;
        }
        rsvmap = rest;
        reservations_len += size_of::<spec::ReserveEntry>();
    }
    let reservations = &buf[rsvmap_offset..rsvmap_offset + reservations_len];

    let struct_offset = u32::from(header.off_dt_struct) as usize;
    let struct_len = u32::from(header.size_dt_struct) as usize;
    if struct_offset % size_of::<u32>() != 0 {
        return Err(Error(ErrorKind::StructureBlockAlignment));
    }
    let structure_block = buf
        .get(struct_offset..struct_offset.wrapping_add(struct_len))
        .ok_or(Error(ErrorKind::StructureBlock))?;

    let strings_offset = u32::from(header.off_dt_strings) as usize;
    let strings_len = u32::from(header.size_dt_strings) as usize;
    let strings_block = buf
        .get(strings_offset..strings_offset.wrapping_add(strings_len))
        .ok_or(Error(ErrorKind::StringsBlock))?;

    let mut cursor = Cursor::new(structure_block);
    loop {
        match cursor
            .read_token()
            .map_err(|e| Error(ErrorKind::Structure(WalkError::Token(e))))?
        {
            Token::BeginNode { .. } => break,
            Token::Nop => {}
            _ => return Err(Error(ErrorKind::RootNode)),
        }
    }

    let mut walker = Walker::new(cursor, strings_block, interests);
    walker.walk("").map_err(|e| Error(ErrorKind::Structure(e)))?;

    Ok(Scan {
        reserved: ReservedMemory {
            entries: reservations,
        },
        boot_cpuid_phys: header.boot_cpuid_phys.into(),
        total_size,
    })
}
