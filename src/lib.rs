//! A multi-pass parser for AML (ACPI Machine Language), the bytecode
//! carried by DSDT and SSDT tables.
//!
//! The parser turns a table's raw bytes into a fully-resolved
//! [`ObjectTree`](tree::ObjectTree): an arena of index-linked objects with
//! ACPI's scoping rules applied, scope directives merged away, deferred
//! bodies expanded and method call sites disambiguated. Multiple tables
//! parse into the same tree sequentially, so an SSDT sees every name the
//! DSDT declared.
//!
//! ```ignore
//! let mut parser = AmlParser::new();
//! parser.parse_sdt(0, dsdt_bytes)?;
//! parser.parse_sdt(1, ssdt_bytes)?;
//! let tree = parser.tree();
//! ```
//!
//! The crate is `no_std` + `alloc`: it runs during kernel ACPI bring-up
//! with nothing but an allocator, and the tree it builds lives for the
//! rest of the ACPI subsystem's lifetime.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod opcode;
mod parser;
pub mod resolver;
pub mod stream;
pub mod tree;

use byteorder::{ByteOrder, LittleEndian};
use tracing::{error, info};

use tree::{NameSeg, ObjectTree, TableHandle};

pub use parser::MAX_RESOLVE_PASSES;

/// Why a parse was abandoned. Every cause is fatal to the whole parse;
/// partial trees are never exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmlParseError {
    UnexpectedEndOfCode,
    InvalidPkgLengthLead,
    RemainingBytes(usize),
    InvalidStringChar(u8),
    InvalidNameSegChar(u8),
    UnknownOpcode(u16),
    InvalidTarget(u8),
    InvalidTermArg(u16),
    ObjectAlreadyAttached,
    NamedObjectArgsMismatch,
    UnresolvedPath,
    MissingOperands,
    MalformedMethodFlags,
    TooManyResolvePasses,
    InvalidTableLength,
}

/// The header every system description table starts with; the AML payload
/// follows it.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct SdtHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

/// Size of [`SdtHeader`] on the wire.
pub const SDT_HEADER_LEN: usize = core::mem::size_of::<SdtHeader>();

/// Table id predefined objects (`\`, `_SB_`, `_OSI`, ...) are tagged with.
pub const PREDEFINED_TABLE: TableHandle = 0xFF;

/// Parses one or more AML tables into a shared [`ObjectTree`].
pub struct AmlParser {
    tree: ObjectTree,
}

impl AmlParser {
    /// Creates a parser whose tree already contains the root and the
    /// predefined scopes and names, tagged with [`PREDEFINED_TABLE`].
    pub fn new() -> Self {
        let mut tree = ObjectTree::new();
        tree.create_default_scopes(PREDEFINED_TABLE);
        Self { tree }
    }

    /// Parses a whole table image (SDT header followed by AML bytes).
    pub fn parse_sdt(&mut self, handle: TableHandle, raw: &[u8]) -> Result<(), AmlParseError> {
        if raw.len() < SDT_HEADER_LEN {
            return Err(AmlParseError::InvalidTableLength);
        }
        let length = LittleEndian::read_u32(&raw[4..8]) as usize;
        if length < SDT_HEADER_LEN || length > raw.len() {
            return Err(AmlParseError::InvalidTableLength);
        }
        let mut signature = [0u8; 4];
        signature.copy_from_slice(&raw[..4]);
        self.parse_table(handle, signature, &raw[SDT_HEADER_LEN..length])
    }

    /// Parses a table's AML payload (everything after the SDT header).
    pub fn parse_table(
        &mut self,
        handle: TableHandle,
        name: [u8; 4],
        payload: &[u8],
    ) -> Result<(), AmlParseError> {
        info!(
            "parsing AML table {} (handle {}, {} bytes)",
            NameSeg(name),
            handle,
            payload.len()
        );
        match parser::parse_table(&mut self.tree, handle, payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("parsing AML table {} failed: {:?}", NameSeg(name), e);
                Err(e)
            }
        }
    }

    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    pub fn into_tree(self) -> ObjectTree {
        self.tree
    }
}

impl Default for AmlParser {
    fn default() -> Self {
        Self::new()
    }
}
