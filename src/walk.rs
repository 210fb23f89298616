// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Path matching and the single-pass node walker.
//!
//! The walker descends the structure block once. A child node is entered only
//! if some configured path continues through it; everything else is consumed
//! by a depth-counting skip that resolves no names and fires no sinks.
//! `#address-cells` and `#size-cells` declarations are tracked down the
//! interesting spine and restored when each child returns, so a subtree can
//! never leak its context to a sibling.

use crate::spec::U32b;
use crate::spec::U64b;
use crate::structure::extract_str;
use crate::structure::prop_name;
use crate::structure::Cursor;
use crate::structure::StringError;
use crate::structure::Token;
use crate::structure::TokenError;
use core::mem::size_of;
use thiserror::Error;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::KnownLayout;

/// Cell counts in effect when no ancestor has declared them.
const DEFAULT_ADDRESS_CELLS: u32 = 2;
const DEFAULT_SIZE_CELLS: u32 = 1;

/// Errors encountered while walking the structure block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum WalkError<'a> {
    #[error("{0}")]
    Token(TokenError),
    #[error("end token inside an open node")]
    UnexpectedEnd,
    #[error("invalid property name: {0}")]
    PropertyName(StringError),
    #[error("truncated {name} value")]
    Cells { name: &'a str },
}

/// A property selected by one of the configured paths, as delivered to its
/// sink.
#[derive(Debug, Clone)]
pub struct MatchedProperty<'a> {
    /// The configured path that selected this property.
    pub path: &'a str,
    /// The property name from the strings block.
    pub name: &'a str,
    /// The raw value bytes, borrowed from the blob. May be empty.
    pub value: &'a [u8],
    /// `#address-cells` inherited from the nearest ancestor that declared it,
    /// `2` if none did.
    pub address_cells: u32,
    /// `#size-cells` inherited from the nearest ancestor that declared it,
    /// `1` if none did.
    pub size_cells: u32,
}

/// Errors decoding a matched property's value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// The value length is not a multiple of the requested type size.
    #[error("value length is not a multiple of the requested type size")]
    Length,
    /// The requested index is past the end of the value.
    #[error("index past the end of the value")]
    Index,
    /// The value is not a NUL-terminated string.
    #[error("value is not a null-terminated string: {0}")]
    Str(StringError),
    /// A cell count other than 0, 1 or 2 is in effect.
    #[error("unsupported cell count {0}")]
    CellCount(u32),
}

impl<'a> MatchedProperty<'a> {
    /// Reads a value at a given offset, indexed by `size_of::<T>() * index`.
    /// T must be big-endian.
    fn read_val<T: FromBytes + Copy + zerocopy::Unaligned + Immutable + KnownLayout>(
        &self,
        index: usize,
    ) -> Result<T, ValueError> {
        // The unaligned bound is required because property values sit on a
        // 4-byte boundary at best, so 8-byte reads must not assume alignment.
        <[T]>::ref_from_bytes(self.value)
            .map_err(|_| ValueError::Length)?
            .get(index)
            .copied()
            .ok_or(ValueError::Index)
    }

    /// Reads a big-endian u32 from the value, at a given u32 index.
    pub fn read_u32(&self, index: usize) -> Result<u32, ValueError> {
        Ok(self.read_val::<U32b>(index)?.into())
    }

    /// Reads a big-endian u64 from the value, at a given u64 index.
    pub fn read_u64(&self, index: usize) -> Result<u64, ValueError> {
        Ok(self.read_val::<U64b>(index)?.into())
    }

    /// Reads the value as a NUL-terminated string.
    pub fn read_str(&self) -> Result<&'a str, ValueError> {
        extract_str(self.value).map_err(ValueError::Str)
    }

    /// Decodes the value as a `reg`-style sequence of `(address, size)` pairs
    /// using the inherited cell counts.
    pub fn reg_regions(&self) -> Result<Regions<'a>, ValueError> {
        for cells in [self.address_cells, self.size_cells] {
            if cells > 2 {
                return Err(ValueError::CellCount(cells));
            }
        }
        let pair = (self.address_cells + self.size_cells) as usize * size_of::<u32>();
        if pair == 0 {
            if !self.value.is_empty() {
                return Err(ValueError::Length);
            }
        } else if self.value.len() % pair != 0 {
            return Err(ValueError::Length);
        }
        Ok(Regions {
            data: self.value,
            address_cells: self.address_cells,
            size_cells: self.size_cells,
        })
    }
}

/// A decoded `(address, size)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// The first address of the region.
    pub address: u64,
    /// The region length in bytes.
    pub size: u64,
}

/// An iterator over the `(address, size)` pairs of a `reg`-style value.
/// Produced by [`MatchedProperty::reg_regions`], which validates the value
/// length up front.
#[derive(Debug, Clone)]
pub struct Regions<'a> {
    data: &'a [u8],
    address_cells: u32,
    size_cells: u32,
}

fn take_cell(data: &mut &[u8], cells: u32) -> Option<u64> {
    match cells {
        0 => Some(0),
        1 => {
            let (v, rest) = U32b::read_from_prefix(data).ok()?;
            *data = rest;
            Some(u64::from(v.get()))
        }
        2 => {
            let (v, rest) = U64b::read_from_prefix(data).ok()?;
            *data = rest;
            Some(v.get())
        }
        _ => None,
    }
}

impl Iterator for Regions<'_> {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        if self.data.is_empty() {
            return None;
        }
        let address = take_cell(&mut self.data, self.address_cells)?;
        let size = take_cell(&mut self.data, self.size_cells)?;
        Some(Region { address, size })
    }
}

/// The delivery contract for matched properties.
///
/// A sink is a pure effect: it cannot fail the parse and cannot retain the
/// borrowed value past the call. Failures a sink encounters are its own state
/// to record.
pub trait PropertySink {
    /// Called once per property selected by this sink's configured path, in
    /// traversal order.
    fn property(&mut self, prop: &MatchedProperty<'_>);
}

/// Closures can stand in for a sink.
impl<F> PropertySink for F
where
    F: FnMut(&MatchedProperty<'_>),
{
    fn property(&mut self, prop: &MatchedProperty<'_>) {
        self(prop)
    }
}

/// One configured path of interest and the sink its matches go to.
///
/// Paths are slash-delimited with no leading or trailing slash and no unit
/// address (`@...`) on any segment, e.g. `"cpus/cpu/reg"`. When two entries
/// would select the same property, the first in the slice wins.
pub struct PathInterest<'t> {
    /// The path, relative to the root node.
    pub path: &'t str,
    /// The sink invoked for each property the path selects.
    pub sink: &'t mut dyn PropertySink,
}

/// How a configured path continues through a child name, if it does.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Continuation<'p> {
    /// The path continues below this child. Carries the new parent prefix,
    /// including its trailing slash.
    Descend(&'p str),
    /// The path ends exactly at this name; a property with it is a target.
    Deliver(&'p str),
}

/// Decides whether `candidate` continues through the child `name` under
/// `parent`. `parent` is `""` at the root and otherwise ends with a slash.
pub(crate) fn continuation<'p>(
    parent: &str,
    candidate: &'p str,
    name: &str,
) -> Option<Continuation<'p>> {
    let bytes = candidate.as_bytes();
    let split = parent.len() + name.len();
    if split > bytes.len() {
        return None;
    }
    if &bytes[..parent.len()] != parent.as_bytes() {
        return None;
    }
    if &bytes[parent.len()..split] != name.as_bytes() {
        return None;
    }
    if split < bytes.len() {
        Some(Continuation::Descend(candidate.get(..split + 1)?))
    } else {
        Some(Continuation::Deliver(candidate))
    }
}

/// Strips the unit address from a node name. Unit addresses distinguish
/// sibling instances and do not take part in path matching.
pub(crate) fn strip_unit_address(name: &str) -> &str {
    name.split_once('@').map_or(name, |(base, _)| base)
}

/// Single-pass recursive descent over the structure block.
pub(crate) struct Walker<'a, 'i, 't> {
    cursor: Cursor<'a>,
    strings_block: &'a [u8],
    interests: &'i mut [PathInterest<'t>],
    address_cells: u32,
    size_cells: u32,
}

impl<'a, 'i, 't> Walker<'a, 'i, 't> {
    /// Creates a walker positioned just past the root node's name.
    pub fn new(
        cursor: Cursor<'a>,
        strings_block: &'a [u8],
        interests: &'i mut [PathInterest<'t>],
    ) -> Self {
        Self {
            cursor,
            strings_block,
            interests,
            address_cells: DEFAULT_ADDRESS_CELLS,
            size_cells: DEFAULT_SIZE_CELLS,
        }
    }

    /// Walks the children and properties of the node whose canonical prefix
    /// is `parent`, until its `END_NODE`. Entered with the cursor just past
    /// the node's name.
    pub fn walk(&mut self, parent: &str) -> Result<(), WalkError<'a>> {
        loop {
            match self.cursor.read_token().map_err(WalkError::Token)? {
                Token::BeginNode { name } => {
                    let base = strip_unit_address(name);
                    let descend = self.interests.iter().find_map(|interest| {
                        match continuation(parent, interest.path, base) {
                            Some(Continuation::Descend(prefix)) => Some(prefix),
                            _ => None,
                        }
                    });
                    match descend {
                        Some(prefix) => {
                            let address_cells = self.address_cells;
                            let size_cells = self.size_cells;
                            self.walk(prefix)?;
                            self.address_cells = address_cells;
                            self.size_cells = size_cells;
                        }
                        None => self.skip_node()?,
                    }
                }
                Token::Prop { nameoff, value } => {
                    let name =
                        prop_name(self.strings_block, nameoff).map_err(WalkError::PropertyName)?;

                    // Cell declarations apply from here on, whether or not
                    // anyone is interested in the property itself.
                    if name == "#address-cells" {
                        self.address_cells = decode_cells(name, value)?;
                    } else if name == "#size-cells" {
                        self.size_cells = decode_cells(name, value)?;
                    }

                    let mut matched = None;
                    for (index, interest) in self.interests.iter().enumerate() {
                        if let Some(Continuation::Deliver(path)) =
                            continuation(parent, interest.path, name)
                        {
                            matched = Some((index, path));
                            break;
                        }
                    }
                    if let Some((index, path)) = matched {
                        let prop = MatchedProperty {
                            path,
                            name,
                            value,
                            address_cells: self.address_cells,
                            size_cells: self.size_cells,
                        };
                        self.interests[index].sink.property(&prop);
                    }
                }
                Token::Nop => {}
                Token::EndNode => return Ok(()),
                Token::End => {
                    // Closes the whole structure block; valid at the root
                    // only.
                    return if parent.is_empty() {
                        Ok(())
                    } else {
                        Err(WalkError::UnexpectedEnd)
                    };
                }
            }
        }
    }

    /// Consumes a node no configured path continues into, through its
    /// matching `END_NODE`. Resolves no names and fires no sinks; the cell
    /// context is left untouched.
    fn skip_node(&mut self) -> Result<(), WalkError<'a>> {
        let mut depth = 0usize;
        loop {
            match self.cursor.read_token().map_err(WalkError::Token)? {
                Token::BeginNode { .. } => depth += 1,
                Token::EndNode => {
                    if depth == 0 {
                        return Ok(());
                    }
                    depth -= 1;
                }
                Token::Prop { .. } | Token::Nop => {}
                Token::End => return Err(WalkError::UnexpectedEnd),
            }
        }
    }
}

fn decode_cells<'a>(name: &'a str, value: &[u8]) -> Result<u32, WalkError<'a>> {
    let (cells, _) = U32b::read_from_prefix(value).map_err(|_| WalkError::Cells { name })?;
    Ok(cells.into())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn continuation_rules() {
        // Too short.
        assert_eq!(continuation("cpus/", "cpus/cpu", "status"), None);
        // Parent prefix mismatch.
        assert_eq!(continuation("soc/", "cpus/cpu/reg", "cpu"), None);
        // Name mismatch.
        assert_eq!(continuation("cpus/", "cpus/cpu/reg", "timer"), None);
        // Interior continuation carries the trailing slash.
        assert_eq!(
            continuation("", "cpus/cpu/reg", "cpus"),
            Some(Continuation::Descend("cpus/"))
        );
        assert_eq!(
            continuation("cpus/", "cpus/cpu/reg", "cpu"),
            Some(Continuation::Descend("cpus/cpu/"))
        );
        // Exact match is a leaf target.
        assert_eq!(
            continuation("cpus/cpu/", "cpus/cpu/reg", "reg"),
            Some(Continuation::Deliver("cpus/cpu/reg"))
        );
        // Single-segment path on the root.
        assert_eq!(
            continuation("", "model", "model"),
            Some(Continuation::Deliver("model"))
        );
    }

    #[test]
    fn unit_addresses() {
        assert_eq!(strip_unit_address("uart@1000"), "uart");
        assert_eq!(strip_unit_address("uart"), "uart");
        assert_eq!(strip_unit_address("pci@0@weird"), "pci");
        assert_eq!(strip_unit_address("@1000"), "");
    }

    fn prop(value: &[u8], address_cells: u32, size_cells: u32) -> MatchedProperty<'_> {
        MatchedProperty {
            path: "node/reg",
            name: "reg",
            value,
            address_cells,
            size_cells,
        }
    }

    #[test]
    fn scalar_reads() {
        let value = 0x1122_3344_5566_7788u64.to_be_bytes();
        let prop = prop(&value, 2, 1);
        assert_eq!(prop.read_u32(0), Ok(0x1122_3344));
        assert_eq!(prop.read_u32(1), Ok(0x5566_7788));
        assert_eq!(prop.read_u32(2), Err(ValueError::Index));
        assert_eq!(prop.read_u64(0), Ok(0x1122_3344_5566_7788));
        assert_eq!(prop.read_u64(1), Err(ValueError::Index));
    }

    #[test]
    fn misaligned_scalar_reads() {
        let value = [0u8; 6];
        let prop = prop(&value, 2, 1);
        assert_eq!(prop.read_u32(0), Err(ValueError::Length));
        assert_eq!(prop.read_u64(0), Err(ValueError::Length));
    }

    #[test]
    fn string_reads() {
        let prop = MatchedProperty {
            path: "chosen/bootargs",
            name: "bootargs",
            value: b"console=ttyS0\0",
            address_cells: 2,
            size_cells: 1,
        };
        assert_eq!(prop.read_str(), Ok("console=ttyS0"));

        let unterminated = MatchedProperty {
            value: b"console",
            ..prop
        };
        assert_eq!(unterminated.read_str(), Err(ValueError::Str(StringError::Null)));
    }

    #[test]
    fn reg_decoding() {
        let mut value = Vec::new();
        value.extend_from_slice(&0x8000_0000u64.to_be_bytes());
        value.extend_from_slice(&0x1_0000u32.to_be_bytes());
        let prop = prop(&value, 2, 1);
        assert_eq!(
            prop.reg_regions().unwrap().collect::<Vec<_>>(),
            [Region {
                address: 0x8000_0000,
                size: 0x1_0000
            }]
        );
    }

    #[test]
    fn reg_decoding_narrow_cells() {
        let mut value = Vec::new();
        value.extend_from_slice(&0x3f00_0000u32.to_be_bytes());
        value.extend_from_slice(&0x4000_0000u32.to_be_bytes());
        let prop = prop(&value, 1, 0);
        assert_eq!(
            prop.reg_regions().unwrap().collect::<Vec<_>>(),
            [
                Region {
                    address: 0x3f00_0000,
                    size: 0
                },
                Region {
                    address: 0x4000_0000,
                    size: 0
                }
            ]
        );
    }

    #[test]
    fn reg_decoding_rejects_bad_shapes() {
        let value = [0u8; 12];
        assert_eq!(
            prop(&value, 3, 1).reg_regions().unwrap_err(),
            ValueError::CellCount(3)
        );
        assert_eq!(
            prop(&value, 2, 2).reg_regions().unwrap_err(),
            ValueError::Length
        );
        assert_eq!(
            prop(&value, 0, 0).reg_regions().unwrap_err(),
            ValueError::Length
        );
        assert!(prop(&[], 0, 0).reg_regions().unwrap().next().is_none());
    }
}
