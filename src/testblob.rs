// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A minimal FDT blob assembler for the unit tests. Produces well-formed
//! blobs by default, with the header fields and raw token stream exposed so
//! tests can also produce malformed ones.

extern crate alloc;

use crate::spec;
use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use zerocopy::IntoBytes;

pub struct TestBlob {
    pub magic: u32,
    pub version: u32,
    pub last_comp_version: u32,
    pub boot_cpuid_phys: u32,
    reservations: Vec<(u64, u64)>,
    structure: Vec<u8>,
    names: Vec<(String, u32)>,
    strings: Vec<u8>,
}

impl TestBlob {
    pub fn new() -> Self {
        Self {
            magic: spec::MAGIC,
            version: spec::VERSION,
            last_comp_version: spec::LAST_COMP_VERSION,
            boot_cpuid_phys: 0,
            reservations: Vec::new(),
            structure: Vec::new(),
            names: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub fn reserve(&mut self, address: u64, size: u64) {
        self.reservations.push((address, size));
    }

    pub fn raw(&mut self, word: u32) {
        self.structure.extend_from_slice(&word.to_be_bytes());
    }

    pub fn begin_node(&mut self, name: &str) {
        self.raw(spec::BEGIN_NODE);
        self.structure.extend_from_slice(name.as_bytes());
        self.structure.push(0);
        self.pad();
    }

    pub fn end_node(&mut self) {
        self.raw(spec::END_NODE);
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) {
        let nameoff = self.intern(name);
        self.raw(spec::PROP);
        self.raw(value.len() as u32);
        self.raw(nameoff);
        self.structure.extend_from_slice(value);
        self.pad();
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) {
        self.prop(name, &value.to_be_bytes());
    }

    pub fn prop_u64(&mut self, name: &str, value: u64) {
        self.prop(name, &value.to_be_bytes());
    }

    pub fn prop_str(&mut self, name: &str, value: &str) {
        let mut bytes = Vec::from(value.as_bytes());
        bytes.push(0);
        self.prop(name, &bytes);
    }

    fn pad(&mut self) {
        while self.structure.len() % 4 != 0 {
            self.structure.push(0);
        }
    }

    fn intern(&mut self, name: &str) -> u32 {
        if let Some((_, off)) = self.names.iter().find(|(n, _)| n == name) {
            return *off;
        }
        let off = self.strings.len() as u32;
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        self.names.push((name.to_string(), off));
        off
    }

    pub fn build(&self) -> Vec<u8> {
        let rsvmap_offset = core::mem::size_of::<spec::Header>();
        let rsvmap_size = (self.reservations.len() + 1) * core::mem::size_of::<spec::ReserveEntry>();
        let struct_offset = rsvmap_offset + rsvmap_size;
        let struct_size = self.structure.len() + 4;
        let strings_offset = struct_offset + struct_size;
        let total_size = strings_offset + self.strings.len();

        let header = spec::Header {
            magic: self.magic.into(),
            totalsize: (total_size as u32).into(),
            off_dt_struct: (struct_offset as u32).into(),
            off_dt_strings: (strings_offset as u32).into(),
            off_mem_rsvmap: (rsvmap_offset as u32).into(),
            version: self.version.into(),
            last_comp_version: self.last_comp_version.into(),
            boot_cpuid_phys: self.boot_cpuid_phys.into(),
            size_dt_strings: (self.strings.len() as u32).into(),
            size_dt_struct: (struct_size as u32).into(),
        };

        let mut buf = Vec::with_capacity(total_size);
        buf.extend_from_slice(header.as_bytes());
        for &(address, size) in &self.reservations {
            buf.extend_from_slice(&address.to_be_bytes());
            buf.extend_from_slice(&size.to_be_bytes());
        }
        buf.extend_from_slice(&[0; 16]);
        buf.extend_from_slice(&self.structure);
        buf.extend_from_slice(&spec::END.to_be_bytes());
        buf.extend_from_slice(&self.strings);
        assert_eq!(buf.len(), total_size);
        buf
    }
}
