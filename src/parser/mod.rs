//! The stream parser: turns one table's AML bytes into a partial object
//! tree.
//!
//! Parsing is schema-driven: each opcode read from the stream is looked up
//! in the opcode table and its arguments are dispatched one by one. Blocks
//! of terms become `IntScopeBlock` children, name paths are captured in
//! their raw encoded form, and deferred opcodes (method bodies, field
//! lists) only record their byte range here; the resolver passes re-enter
//! those ranges once the namespace is populated.

mod passes;

use alloc::vec::Vec;

use tracing::trace;

use crate::opcode::{self, ArgType, Opcode, OpcodeFlags, OpcodeInfo, EXT_OP_PREFIX};
use crate::resolver;
use crate::stream::ByteStream;
use crate::tree::{NameSeg, ObjectId, ObjectTree, TableHandle, Value, NO_OBJECT, ROOT_ID};
use crate::AmlParseError;

pub use passes::MAX_RESOLVE_PASSES;

/// Parses `data` (one table's AML payload) into `tree` and resolves it to
/// fixed point.
pub(crate) fn parse_table(
    tree: &mut ObjectTree,
    table: TableHandle,
    data: &[u8],
) -> Result<(), AmlParseError> {
    let mut parser = TableParser::new(tree, table, data);
    parser.parse_root()?;
    parser.run_resolver_passes()
}

pub(crate) struct TableParser<'t, 'd> {
    tree: &'t mut ObjectTree,
    stream: ByteStream<'d>,
    table: TableHandle,
    scope_stack: Vec<ObjectId>,
    resolve_passes: u32,
}

impl<'t, 'd> TableParser<'t, 'd> {
    pub(crate) fn new(tree: &'t mut ObjectTree, table: TableHandle, data: &'d [u8]) -> Self {
        Self {
            tree,
            stream: ByteStream::new(data),
            table,
            scope_stack: Vec::new(),
            resolve_passes: 0,
        }
    }

    pub(crate) fn parse_root(&mut self) -> Result<(), AmlParseError> {
        self.scope_stack.push(ROOT_ID);
        let result = self.parse_object_list(ROOT_ID);
        self.scope_stack.pop();
        result
    }

    fn parse_object_list(&mut self, parent: ObjectId) -> Result<(), AmlParseError> {
        while !self.stream.is_empty() {
            self.parse_statement(parent)?;
        }
        Ok(())
    }

    fn current_scope(&self) -> ObjectId {
        *self.scope_stack.last().unwrap_or(&ROOT_ID)
    }

    /// Parses one object in an argument slot, dispatching its full schema.
    fn parse_object_into(&mut self, parent: ObjectId) -> Result<ObjectId, AmlParseError> {
        self.parse_object(parent, false)
    }

    /// Parses one term in statement position. Executable opcodes whose
    /// operands are all implicit stay childless here: the encoding is a
    /// prefix with the operands following as independent terms, and the
    /// arg-connection pass pulls them in. This keeps a forward method
    /// call (whose arity is unknown until resolution) from shifting the
    /// operands that lexically follow it.
    fn parse_statement(&mut self, parent: ObjectId) -> Result<ObjectId, AmlParseError> {
        self.parse_object(parent, true)
    }

    fn parse_object(
        &mut self,
        parent: ObjectId,
        statement: bool,
    ) -> Result<ObjectId, AmlParseError> {
        let lead = self.stream.peek_u8()?;
        if is_name_lead(lead) {
            return self.parse_name_path_or_method_call(parent);
        }

        let pkg_start = self.stream.position();
        let info = self.read_opcode()?;
        trace!("opcode {} at {:#x}", info.mnemonic, pkg_start);

        let obj = self.tree.new_object(info.opcode, self.table);
        self.tree.node_mut(obj).pkg_start = pkg_start as u32;
        self.tree.append(parent, obj)?;
        if statement && info.implicit_operands() {
            return Ok(obj);
        }
        self.parse_args(obj, info)?;
        Ok(obj)
    }

    fn read_opcode(&mut self) -> Result<&'static OpcodeInfo, AmlParseError> {
        let primary = self.stream.read_u8()?;
        match primary {
            EXT_OP_PREFIX => {
                let ext = self.stream.read_u8()?;
                opcode::lookup_extended(ext)
                    .ok_or(AmlParseError::UnknownOpcode(0x5B00 | ext as u16))
            }
            // LNot followed by LEqual/LGreater/LLess fuses into the
            // composite logical opcode.
            0x92 => match self.stream.peek_u8() {
                Ok(second @ (0x93 | 0x94 | 0x95)) => {
                    self.stream.skip(1)?;
                    Ok(match second {
                        0x93 => Opcode::LNotEqual.info(),
                        0x94 => Opcode::LLessEqual.info(),
                        _ => Opcode::LGreaterEqual.info(),
                    })
                }
                _ => Ok(Opcode::LNot.info()),
            },
            _ => opcode::lookup(primary).ok_or(AmlParseError::UnknownOpcode(primary as u16)),
        }
    }

    fn parse_args(&mut self, obj: ObjectId, info: &'static OpcodeInfo) -> Result<(), AmlParseError> {
        let deferred = info.is(OpcodeFlags::DEFERRED);
        let mut bounded = false;

        for &arg in info.args {
            if deferred && is_deferrable(arg) {
                // Body bytes are re-entered by the deferred pass once the
                // namespace is populated.
                let end = self.tree.node(obj).pkg_end as usize;
                self.tree.node_mut(obj).pending_body = true;
                self.stream.set_position(end)?;
                break;
            }
            if matches!(arg, ArgType::PkgLen) {
                self.parse_pkg_length_arg(obj)?;
                bounded = true;
                continue;
            }
            self.parse_arg(obj, arg)?;
        }

        if bounded {
            let end = self.tree.node(obj).pkg_end as usize;
            if self.stream.position() != end {
                return Err(AmlParseError::RemainingBytes(end - self.stream.position()));
            }
            self.stream.pop_end();
        }
        Ok(())
    }

    fn parse_arg(&mut self, obj: ObjectId, arg: ArgType) -> Result<(), AmlParseError> {
        match arg {
            ArgType::ByteData => {
                let value = self.stream.read_u8()?;
                self.attach_data(obj, Opcode::BytePrefix, Value::Integer(value as u64))?;
            }
            ArgType::WordData => {
                let value = self.stream.read_u16()?;
                self.attach_data(obj, Opcode::WordPrefix, Value::Integer(value as u64))?;
            }
            ArgType::DwordData => {
                let value = self.stream.read_u32()?;
                self.attach_data(obj, Opcode::DwordPrefix, Value::Integer(value as u64))?;
            }
            ArgType::QwordData => {
                let value = self.stream.read_u64()?;
                self.attach_data(obj, Opcode::QwordPrefix, Value::Integer(value))?;
            }
            ArgType::String => {
                let bytes = self.parse_string()?;
                self.attach_data(obj, Opcode::StringPrefix, Value::Bytes(bytes))?;
            }
            ArgType::NameString => {
                let path = self.parse_name_string()?;
                self.append_value_child(obj, Opcode::IntNamePath, Value::Bytes(path.clone()))?;
                let info = self.tree.node(obj).opcode.info();
                let child_pos = self.tree.child_count(obj) - 1;
                if info.naming_arg_position() == Some(child_pos) {
                    self.tree.node_mut(obj).name = NameSeg::from_path(&path);
                }
            }
            ArgType::PkgLen => {
                // handled in parse_args so the bound can be popped
                self.parse_pkg_length_arg(obj)?;
            }
            ArgType::TermArg => {
                self.parse_term_arg(obj, false)?;
            }
            ArgType::StrictTermArg | ArgType::DataRefObj => {
                self.parse_term_arg(obj, true)?;
            }
            ArgType::Target => {
                self.parse_target(obj)?;
            }
            ArgType::SuperName | ArgType::SimpleName => {
                self.parse_super_name(obj)?;
            }
            ArgType::TermList => {
                let block = self.tree.new_object(Opcode::IntScopeBlock, self.table);
                self.tree.append(obj, block)?;
                self.scope_stack.push(block);
                let result = self.parse_object_list(block);
                self.scope_stack.pop();
                result?;
            }
            ArgType::ByteList => {
                let rest = self.stream.read_exact(self.stream.remaining())?;
                self.append_value_child(obj, Opcode::IntByteList, Value::Bytes(rest.to_vec()))?;
            }
            ArgType::FieldList => {
                self.parse_field_elements(obj)?;
            }
        }
        Ok(())
    }

    fn parse_pkg_length_arg(&mut self, obj: ObjectId) -> Result<(), AmlParseError> {
        let field_start = self.stream.position();
        let length = self.parse_pkg_length()? as usize;
        let end = field_start + length;
        if end > self.stream.end() {
            return Err(AmlParseError::UnexpectedEndOfCode);
        }
        self.tree.node_mut(obj).pkg_end = end as u32;
        self.stream.push_end(end)?;
        Ok(())
    }

    /// Decodes a PkgLength field and returns the raw encoded length, which
    /// counts from the first byte of the field itself.
    fn parse_pkg_length(&mut self) -> Result<u32, AmlParseError> {
        let lead = self.stream.read_u8()?;
        let follow_bytes = lead >> 6;
        if follow_bytes == 0 {
            return Ok((lead & 0x3F) as u32);
        }
        // bits 4:5 must be zero in the multi-byte form
        if lead & 0x30 != 0 {
            return Err(AmlParseError::InvalidPkgLengthLead);
        }
        let mut length = (lead & 0x0F) as u32;
        for i in 0..follow_bytes {
            let byte = self.stream.read_u8()?;
            length |= (byte as u32) << (8 * i + 4);
        }
        Ok(length)
    }

    fn parse_string(&mut self) -> Result<Vec<u8>, AmlParseError> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.stream.read_u8()?;
            if byte == 0x00 {
                return Ok(bytes);
            }
            if !(0x01..=0x7F).contains(&byte) {
                return Err(AmlParseError::InvalidStringChar(byte));
            }
            bytes.push(byte);
        }
    }

    /// Captures an encoded name path verbatim, validating its shape.
    fn parse_name_string(&mut self) -> Result<Vec<u8>, AmlParseError> {
        let start = self.stream.position();

        match self.stream.peek_u8()? {
            b'\\' => {
                self.stream.skip(1)?;
            }
            b'^' => {
                while self.stream.peek_u8()? == b'^' {
                    self.stream.skip(1)?;
                }
            }
            _ => {}
        }

        match self.stream.read_u8()? {
            0x00 => {}
            0x2E => {
                let lead = self.stream.read_u8()?;
                self.read_name_seg_rest(lead)?;
                let lead = self.stream.read_u8()?;
                self.read_name_seg_rest(lead)?;
            }
            0x2F => {
                let count = self.stream.read_u8()?;
                for _ in 0..count {
                    let lead = self.stream.read_u8()?;
                    self.read_name_seg_rest(lead)?;
                }
            }
            lead if is_lead_name_char(lead) => {
                self.read_name_seg_rest(lead)?;
            }
            bad => return Err(AmlParseError::InvalidNameSegChar(bad)),
        }

        let end = self.stream.position();
        Ok(self.stream.slice(start, end)?.to_vec())
    }

    /// Validates the three trailing characters of a NameSeg whose lead
    /// character has already been consumed.
    fn read_name_seg_rest(&mut self, lead: u8) -> Result<(), AmlParseError> {
        if !is_lead_name_char(lead) {
            return Err(AmlParseError::InvalidNameSegChar(lead));
        }
        for _ in 0..3 {
            let c = self.stream.read_u8()?;
            if !is_name_char(c) {
                return Err(AmlParseError::InvalidNameSegChar(c));
            }
        }
        Ok(())
    }

    /// Reads and validates one full 4-character NameSeg.
    fn read_name_seg(&mut self) -> Result<[u8; 4], AmlParseError> {
        let start = self.stream.position();
        let lead = self.stream.read_u8()?;
        self.read_name_seg_rest(lead)?;
        let bytes = self.stream.slice(start, start + 4)?;
        Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// One expression-producing object. Strict positions must yield a
    /// value and reject named objects and scope openers, a leading
    /// Method opcode included; lenient positions tolerate any term.
    fn parse_term_arg(
        &mut self,
        parent: ObjectId,
        strict: bool,
    ) -> Result<ObjectId, AmlParseError> {
        let lead = self.stream.peek_u8()?;
        if is_name_lead(lead) {
            return self.parse_name_path_or_method_call(parent);
        }
        let obj = self.parse_object_into(parent)?;
        if strict {
            let info = self.tree.node(obj).opcode.info();
            if info.is(OpcodeFlags::NAMED) || info.is(OpcodeFlags::SCOPE_BLOCK) {
                return Err(AmlParseError::InvalidTermArg(info.opcode as u16));
            }
        }
        Ok(obj)
    }

    fn parse_target(&mut self, parent: ObjectId) -> Result<ObjectId, AmlParseError> {
        if self.stream.peek_u8()? == 0x00 {
            // NullName: no target
            self.stream.skip(1)?;
            return self.append_value_child(parent, Opcode::IntNamePath, Value::Bytes(Vec::new()));
        }
        self.parse_super_name(parent)
    }

    fn parse_super_name(&mut self, parent: ObjectId) -> Result<ObjectId, AmlParseError> {
        let lead = self.stream.peek_u8()?;
        if is_name_lead(lead) {
            return self.parse_name_path_or_method_call(parent);
        }
        match lead {
            // Local0-Local7, Arg0-Arg6
            0x60..=0x6E => self.parse_object_into(parent),
            // RefOf, DerefOf, Index
            0x71 | 0x83 | 0x88 => self.parse_object_into(parent),
            EXT_OP_PREFIX => {
                let obj = self.parse_object_into(parent)?;
                if self.tree.node(obj).opcode != Opcode::Debug {
                    return Err(AmlParseError::InvalidTarget(lead));
                }
                Ok(obj)
            }
            bad => Err(AmlParseError::InvalidTarget(bad)),
        }
    }

    /// A NameString in an expression or statement position: either a
    /// reference to a known object, an immediately-resolvable method call,
    /// or a sentinel left for the method-call resolution pass.
    fn parse_name_path_or_method_call(
        &mut self,
        parent: ObjectId,
    ) -> Result<ObjectId, AmlParseError> {
        let pkg_start = self.stream.position();
        let path = self.parse_name_string()?;
        let target = resolver::resolve(self.tree, self.current_scope(), &path);

        match target {
            Some(t) if self.tree.node(t).opcode == Opcode::Method => {
                let arity = self.method_arity(t)?;
                trace!("method call with {} args at {:#x}", arity, pkg_start);
                let call = self.tree.new_object(Opcode::IntMethodCall, self.table);
                {
                    let node = self.tree.node_mut(call);
                    node.pkg_start = pkg_start as u32;
                    node.value = Value::Reference(t);
                }
                self.tree.append(parent, call)?;
                for _ in 0..arity {
                    self.parse_term_arg(call, false)?;
                }
                Ok(call)
            }
            Some(_) => {
                let obj = self.append_value_child(parent, Opcode::IntNamePath, Value::Bytes(path))?;
                self.tree.node_mut(obj).pkg_start = pkg_start as u32;
                Ok(obj)
            }
            None => {
                // the callee may be declared later; disambiguated by the
                // resolver passes
                let obj = self.append_value_child(
                    parent,
                    Opcode::IntNamePathOrMethodCall,
                    Value::Bytes(path),
                )?;
                self.tree.node_mut(obj).pkg_start = pkg_start as u32;
                Ok(obj)
            }
        }
    }

    fn method_arity(&self, method: ObjectId) -> Result<u64, AmlParseError> {
        let flags = self
            .tree
            .nth_child(method, 1)
            .and_then(|c| self.tree.node(c).value.as_integer())
            .ok_or(AmlParseError::MalformedMethodFlags)?;
        Ok(flags & 0x7)
    }

    /// Field/BankField/IndexField bodies: a sequence of field elements
    /// selected by their lead byte, appended as children of the field.
    fn parse_field_elements(&mut self, field: ObjectId) -> Result<(), AmlParseError> {
        while !self.stream.is_empty() {
            match self.stream.peek_u8()? {
                // ReservedField
                0x00 => {
                    self.stream.skip(1)?;
                    let width = self.parse_pkg_length()?;
                    self.append_value_child(
                        field,
                        Opcode::IntReservedField,
                        Value::Integer(width as u64),
                    )?;
                }
                // AccessField
                0x01 => {
                    self.stream.skip(1)?;
                    let access_type = self.stream.read_u8()? as u64;
                    let access_attrib = self.stream.read_u8()? as u64;
                    self.append_value_child(
                        field,
                        Opcode::IntAccessField,
                        Value::Integer(access_type | access_attrib << 8),
                    )?;
                }
                // Connection: either a Buffer or a NameString
                0x02 => {
                    self.stream.skip(1)?;
                    let conn = self.tree.new_object(Opcode::IntConnection, self.table);
                    self.tree.append(field, conn)?;
                    if self.stream.peek_u8()? == 0x11 {
                        self.parse_object_into(conn)?;
                    } else {
                        let path = self.parse_name_string()?;
                        self.append_value_child(conn, Opcode::IntNamePath, Value::Bytes(path))?;
                    }
                }
                // ExtendedAccessField
                0x03 => {
                    self.stream.skip(1)?;
                    let access_type = self.stream.read_u8()? as u64;
                    let access_attrib = self.stream.read_u8()? as u64;
                    let access_length = self.stream.read_u8()? as u64;
                    self.append_value_child(
                        field,
                        Opcode::IntAccessField,
                        Value::Integer(access_type | access_attrib << 8 | access_length << 16),
                    )?;
                }
                // NamedField: NameSeg followed by its bit width
                _ => {
                    let seg = self.read_name_seg()?;
                    let width = self.parse_pkg_length()?;
                    let named =
                        self.tree
                            .new_named_object(Opcode::IntNamedField, self.table, NameSeg(seg));
                    self.tree.node_mut(named).value = Value::Integer(width as u64);
                    self.tree.append(field, named)?;
                }
            }
        }
        Ok(())
    }

    /// Re-enters the byte range of a deferred object and parses its body.
    ///
    /// Arguments before the deferral point were materialized during the
    /// first pass and are skipped without creating nodes.
    pub(crate) fn parse_deferred_body(&mut self, obj: ObjectId) -> Result<(), AmlParseError> {
        let (opcode, pkg_start, pkg_end) = {
            let node = self.tree.node(obj);
            (node.opcode, node.pkg_start as usize, node.pkg_end as usize)
        };
        let info = opcode.info();
        trace!("deferred {} body at {:#x}..{:#x}", info.mnemonic, pkg_start, pkg_end);

        self.stream.set_position(pkg_start)?;
        let opcode_len = if (opcode as u16) >> 8 == EXT_OP_PREFIX as u16 { 2 } else { 1 };
        self.stream.skip(opcode_len)?;

        let scope = match self.tree.enclosing_scope_block(obj) {
            NO_OBJECT => ROOT_ID,
            block => block,
        };
        self.scope_stack.push(scope);
        let result = self.parse_deferred_args(obj, info, pkg_end);
        self.scope_stack.pop();
        result?;

        self.tree.node_mut(obj).pending_body = false;
        Ok(())
    }

    fn parse_deferred_args(
        &mut self,
        obj: ObjectId,
        info: &'static OpcodeInfo,
        pkg_end: usize,
    ) -> Result<(), AmlParseError> {
        let mut bounded = false;
        let mut reached_body = false;

        for &arg in info.args {
            if matches!(arg, ArgType::PkgLen) {
                let field_start = self.stream.position();
                let length = self.parse_pkg_length()? as usize;
                if field_start + length != pkg_end {
                    return Err(AmlParseError::InvalidPkgLengthLead);
                }
                self.stream.push_end(pkg_end)?;
                bounded = true;
                continue;
            }
            if !reached_body && is_deferrable(arg) {
                reached_body = true;
            }
            if reached_body {
                self.parse_arg(obj, arg)?;
            } else {
                self.skip_arg(arg)?;
            }
        }

        if bounded {
            if self.stream.position() != pkg_end {
                return Err(AmlParseError::RemainingBytes(pkg_end - self.stream.position()));
            }
            self.stream.pop_end();
        }
        Ok(())
    }

    /// Re-decodes an argument that was already materialized, without
    /// creating nodes.
    fn skip_arg(&mut self, arg: ArgType) -> Result<(), AmlParseError> {
        match arg {
            ArgType::ByteData => self.stream.skip(1),
            ArgType::WordData => self.stream.skip(2),
            ArgType::DwordData => self.stream.skip(4),
            ArgType::QwordData => self.stream.skip(8),
            ArgType::String => self.parse_string().map(|_| ()),
            ArgType::NameString => self.parse_name_string().map(|_| ()),
            // only fixed-size leading args can precede a deferral point
            _ => Err(AmlParseError::UnexpectedEndOfCode),
        }
    }

    fn append_value_child(
        &mut self,
        parent: ObjectId,
        opcode: Opcode,
        value: Value,
    ) -> Result<ObjectId, AmlParseError> {
        let obj = self.tree.new_object(opcode, self.table);
        self.tree.node_mut(obj).value = value;
        self.tree.append(parent, obj)?;
        Ok(obj)
    }

    /// A data argument is the payload of a constant-prefix opcode itself
    /// (a bare `0x0C 11 22 33 44` stream object), but a child node when a
    /// composite opcode's schema requests it (method flags, field flags).
    fn attach_data(
        &mut self,
        obj: ObjectId,
        opcode: Opcode,
        value: Value,
    ) -> Result<(), AmlParseError> {
        if self.tree.node(obj).opcode.is(OpcodeFlags::CONSTANT) {
            self.tree.node_mut(obj).value = value;
            Ok(())
        } else {
            self.append_value_child(obj, opcode, value).map(|_| ())
        }
    }
}

fn is_name_lead(byte: u8) -> bool {
    matches!(byte, b'\\' | b'^' | 0x2E | 0x2F | b'_' | b'A'..=b'Z')
}

/// Argument kinds a deferred opcode leaves for the deferred pass; the
/// first of these in a schema is where first-pass parsing stops.
fn is_deferrable(arg: ArgType) -> bool {
    matches!(
        arg,
        ArgType::TermArg | ArgType::StrictTermArg | ArgType::TermList | ArgType::FieldList
    )
}

fn is_lead_name_char(byte: u8) -> bool {
    matches!(byte, b'_' | b'A'..=b'Z')
}

fn is_name_char(byte: u8) -> bool {
    matches!(byte, b'_' | b'A'..=b'Z' | b'0'..=b'9')
}
