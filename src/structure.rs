// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tokenizer for the FDT structure block.
//!
//! The structure block is a stream of 32-bit big-endian tokens at 4-byte
//! aligned offsets. Variable-length payloads (node names, property values)
//! are followed by padding up to the next boundary; the cursor computes that
//! padding from the consumed length so every token read starts aligned.

use crate::spec;
use crate::spec::U32b;
use thiserror::Error;
use zerocopy::FromBytes;

/// Errors extracting a NUL-terminated string from the blob.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StringError {
    /// Offset does not land inside the strings block.
    #[error("string offset out of range")]
    Offset,
    /// No NUL terminator before the end of the block.
    #[error("missing null terminator")]
    Null,
    /// The bytes before the terminator are not UTF-8.
    #[error("string is not utf-8: {0}")]
    Utf8(core::str::Utf8Error),
}

/// Errors reading a token from the structure block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// A token value outside the set the format defines.
    #[error("unknown structure token {0:#010x}")]
    Unknown(u32),
    /// The block ended in the middle of a token word.
    #[error("structure block too small to read token")]
    Truncated,
    /// The block ended in the middle of a property header.
    #[error("structure block too small to read property header")]
    PropHeader,
    /// The property header describes more value bytes than remain.
    #[error("structure block too small for property value")]
    PropValue,
    /// The node name is unterminated or not UTF-8.
    #[error("node name is not valid: {0}")]
    NodeName(StringError),
    /// The block ended inside the node name padding.
    #[error("structure block too small for node name padding")]
    NameAlignment,
}

/// One token from the structure block, with its payload already consumed.
#[derive(Debug, PartialEq, Eq)]
pub enum Token<'a> {
    BeginNode { name: &'a str },
    Prop { nameoff: u32, value: &'a [u8] },
    EndNode,
    Nop,
    End,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// A cursor over the structure block. Reads consume the underlying slice, so
/// the walker never revisits a byte.
pub struct Cursor<'a> {
    rest: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(block: &'a [u8]) -> Self {
        Self { rest: block }
    }

    /// Reads the next token, advancing past its payload and padding.
    pub fn read_token(&mut self) -> Result<Token<'a>, TokenError> {
        let (word, rest) =
            U32b::read_from_prefix(self.rest).map_err(|_| TokenError::Truncated)?;
        match u32::from(word) {
            spec::BEGIN_NODE => {
                let name = extract_str(rest).map_err(TokenError::NodeName)?;
                // The extracted string excludes its NUL terminator; the next
                // token starts at the following 4-byte boundary.
                let advance = align4(name.len() + 1);
                self.rest = rest.get(advance..).ok_or(TokenError::NameAlignment)?;
                Ok(Token::BeginNode { name })
            }
            spec::PROP => {
                let (header, rest) =
                    spec::PropHeader::read_from_prefix(rest).map_err(|_| TokenError::PropHeader)?;
                let len = u32::from(header.len) as usize;
                let padded = align4(len);
                if padded > rest.len() {
                    return Err(TokenError::PropValue);
                }
                let value = &rest[..len];
                self.rest = &rest[padded..];
                Ok(Token::Prop {
                    nameoff: u32::from(header.nameoff),
                    value,
                })
            }
            spec::END_NODE => {
                self.rest = rest;
                Ok(Token::EndNode)
            }
            spec::NOP => {
                self.rest = rest;
                Ok(Token::Nop)
            }
            spec::END => {
                self.rest = rest;
                Ok(Token::End)
            }
            other => Err(TokenError::Unknown(other)),
        }
    }
}

/// Resolves a property name offset within the strings block.
pub fn prop_name(strings_block: &[u8], nameoff: u32) -> Result<&str, StringError> {
    let tail = strings_block
        .get(nameoff as usize..)
        .ok_or(StringError::Offset)?;
    extract_str(tail)
}

/// Extracts a string from bytes treated as a C string, stopping at the first
/// NUL terminator.
pub fn extract_str(bytes: &[u8]) -> Result<&str, StringError> {
    let null_index = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(StringError::Null)?;
    core::str::from_utf8(&bytes[..null_index]).map_err(StringError::Utf8)
}
