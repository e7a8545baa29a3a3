//! Multi-pass fixups over the partial tree produced by the stream parser.
//!
//! The passes run in a fixed order and walk the tree depth-first. A pass
//! may report that it needs another round (a forward reference it could
//! not resolve yet); the driver then reruns the whole pipeline, bounded by
//! [`MAX_RESOLVE_PASSES`]. Conformant firmware converges in two or three
//! rounds.

use alloc::vec;
use alloc::vec::Vec;

use tracing::{trace, warn};

use crate::opcode::{Opcode, OpcodeFlags};
use crate::resolver::{self, NamePath};
use crate::tree::{NameSeg, ObjectId, Value, NO_OBJECT, ROOT_ID};
use crate::AmlParseError;

use super::TableParser;

/// Upper bound on resolver pipeline reruns; exceeding it fails the parse.
pub const MAX_RESOLVE_PASSES: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassResult {
    Stable,
    RequiresExtraPass,
}

impl TableParser<'_, '_> {
    /// Runs resolver passes 1-6 until the tree is stable.
    pub(crate) fn run_resolver_passes(&mut self) -> Result<(), AmlParseError> {
        self.resolve_passes = 1;
        loop {
            trace!("resolver pipeline round {}", self.resolve_passes);
            let results = [
                self.connect_named_obj_args()?,
                self.merge_scope_directives()?,
                self.relocate_named_objects()?,
                self.parse_deferred_blocks()?,
                self.connect_non_named_obj_args()?,
                self.resolve_method_calls()?,
            ];
            if results.iter().all(|r| *r == PassResult::Stable) {
                return Ok(());
            }
            self.resolve_passes += 1;
            if self.resolve_passes > MAX_RESOLVE_PASSES {
                warn!("tree did not stabilize after {} rounds", MAX_RESOLVE_PASSES);
                return Err(AmlParseError::TooManyResolvePasses);
            }
        }
    }

    /// Pre-order walk of the whole tree, snapshotted so passes can
    /// re-parent nodes while iterating.
    fn walk(&self) -> Vec<ObjectId> {
        let mut order = Vec::with_capacity(self.tree.len());
        let mut stack = vec![ROOT_ID];
        while let Some(id) = stack.pop() {
            order.push(id);
            let mut children: Vec<ObjectId> = self.tree.children(id).collect();
            children.reverse();
            stack.append(&mut children);
        }
        order
    }

    /// Pass 1: verify every named object's first arguments and make sure
    /// its name matches the captured name path.
    fn connect_named_obj_args(&mut self) -> Result<PassResult, AmlParseError> {
        for id in self.walk() {
            let node = self.tree.node(id);
            if node.table != self.table || node.pending_body {
                continue;
            }
            let info = node.opcode.info();
            if !info.is(OpcodeFlags::NAMED) {
                continue;
            }
            // field elements carry their name directly, with no namepath child
            let Some(naming_pos) = info.naming_arg_position() else {
                continue;
            };

            let name = self
                .tree
                .nth_child(id, naming_pos)
                .map(|c| self.tree.node(c))
                .filter(|n| n.opcode == Opcode::IntNamePath)
                .and_then(|n| n.value.as_bytes())
                .and_then(NameSeg::from_path);
            let Some(name) = name else {
                warn!("named object missing its name path argument");
                return Err(AmlParseError::NamedObjectArgsMismatch);
            };

            let (fixed, variable) = info.fixed_arg_count();
            let count = self.tree.child_count(id);
            if count < fixed || (!variable && count != fixed) {
                warn!(
                    "named object {} has {} args, schema wants {}",
                    info.mnemonic, count, fixed
                );
                return Err(AmlParseError::NamedObjectArgsMismatch);
            }

            if self.tree.node(id).name.is_none() {
                self.tree.node_mut(id).name = Some(name);
            }
        }
        Ok(PassResult::Stable)
    }

    /// Pass 2: resolve every `Scope(path) { ... }` directive, re-parent its
    /// contents into the target's scope block and drop the directive.
    fn merge_scope_directives(&mut self) -> Result<PassResult, AmlParseError> {
        let mut result = PassResult::Stable;
        for id in self.walk() {
            let node = self.tree.node(id);
            if node.table != self.table || node.opcode != Opcode::Scope {
                continue;
            }

            let path = self
                .tree
                .children(id)
                .next()
                .map(|c| self.tree.node(c))
                .filter(|n| n.opcode == Opcode::IntNamePath)
                .and_then(|n| n.value.as_bytes())
                .map(|b| b.to_vec());
            let Some(path) = path else {
                warn!("scope directive without a name path");
                return Err(AmlParseError::NamedObjectArgsMismatch);
            };

            let target_block = resolver::resolve(self.tree, id, &path)
                .and_then(|target| self.tree.scope_block_of(target));
            let Some(target_block) = target_block else {
                // the target may be declared by a later portion of the
                // table (or a directive not merged yet)
                if self.resolve_passes == 1 {
                    result = PassResult::RequiresExtraPass;
                    continue;
                }
                warn!("scope directive target did not resolve to a scope");
                return Err(AmlParseError::UnresolvedPath);
            };

            if let Some(block) = self.tree.nth_child(id, 1) {
                if self.tree.node(block).opcode != Opcode::IntScopeBlock {
                    return Err(AmlParseError::NamedObjectArgsMismatch);
                }
                let contents: Vec<ObjectId> = self.tree.children(block).collect();
                for child in contents {
                    self.tree.detach(child);
                    self.tree.append(target_block, child)?;
                }
            }
            self.tree.detach(id);
        }
        Ok(result)
    }

    /// Pass 3: named objects declared with a multi-segment or prefixed
    /// path move under the scope the path's leading segments identify.
    fn relocate_named_objects(&mut self) -> Result<PassResult, AmlParseError> {
        let mut result = PassResult::Stable;
        for id in self.walk() {
            let node = self.tree.node(id);
            if node.table != self.table || node.pending_body {
                continue;
            }
            let info = node.opcode.info();
            if !info.is(OpcodeFlags::NAMED) {
                continue;
            }
            let Some(naming_pos) = info.naming_arg_position() else {
                continue;
            };
            let Some(path_child) = self.tree.nth_child(id, naming_pos) else {
                continue;
            };
            if self.tree.node(path_child).opcode != Opcode::IntNamePath {
                warn!("named object's name argument is not a name path");
                return Err(AmlParseError::NamedObjectArgsMismatch);
            }
            let path = match self.tree.node(path_child).value.as_bytes() {
                Some(bytes) => bytes.to_vec(),
                None => return Err(AmlParseError::NamedObjectArgsMismatch),
            };
            let Some(decoded) = NamePath::decode(&path) else {
                return Err(AmlParseError::UnresolvedPath);
            };
            if decoded.is_bare_seg() || decoded.segs.is_empty() {
                continue;
            }

            let target = resolver::resolve_parent_scope(self.tree, id, &path);
            let Some((target_block, seg)) = target else {
                if self.resolve_passes == 1 {
                    result = PassResult::RequiresExtraPass;
                    continue;
                }
                warn!("relocation target did not resolve");
                return Err(AmlParseError::UnresolvedPath);
            };

            // once relocated the declared name collapses to its final
            // segment, which keeps this pass idempotent
            self.tree.node_mut(path_child).value = Value::Bytes(seg.0.to_vec());
            self.tree.node_mut(id).name = Some(seg);
            if self.tree.node(id).parent() != target_block {
                self.tree.detach(id);
                self.tree.append(target_block, id)?;
            }
        }
        Ok(result)
    }

    /// Pass 4: parse the byte ranges captured for deferred opcodes, now
    /// that the namespace is populated.
    fn parse_deferred_blocks(&mut self) -> Result<PassResult, AmlParseError> {
        let mut expanded = false;
        for id in self.walk() {
            let node = self.tree.node(id);
            if node.table != self.table || !node.pending_body {
                continue;
            }
            self.parse_deferred_body(id)?;
            expanded = true;
        }
        // bodies can nest further deferred objects, and freshly parsed
        // named objects still need pass 1-3 treatment
        Ok(if expanded {
            PassResult::RequiresExtraPass
        } else {
            PassResult::Stable
        })
    }

    /// Pass 5: executable opcodes whose operands are still flat siblings
    /// (the prefix encoding's implicit operands) pull them in as children.
    ///
    /// An enclosing expression may grab nodes that belong to a nested
    /// operator before that operator has pulled its own operands in; the
    /// nested one then reclaims them from its new sibling chain on the
    /// next round, so any movement requests a rerun.
    fn connect_non_named_obj_args(&mut self) -> Result<PassResult, AmlParseError> {
        let mut result = PassResult::Stable;
        for id in self.walk() {
            let node = self.tree.node(id);
            if node.table != self.table {
                continue;
            }
            let info = node.opcode.info();
            if !info.is(OpcodeFlags::EXECUTABLE) || info.is(OpcodeFlags::NAMED) {
                continue;
            }
            let needed = info.operand_count();
            let mut have = self.tree.child_count(id);
            while have < needed {
                let Some(sibling) = self.take_following_operand(id) else {
                    warn!("{} is missing operands", info.mnemonic);
                    return Err(AmlParseError::MissingOperands);
                };
                self.tree.detach(sibling);
                self.tree.append(id, sibling)?;
                have += 1;
                result = PassResult::RequiresExtraPass;
            }
        }
        Ok(result)
    }

    /// The next operand in stream order for a node whose operands were
    /// left flat: its own following sibling, or, once the chain it was
    /// pulled into runs out, the following sibling of the nearest
    /// enclosing executable. Never crosses out of an expression into a
    /// scope block.
    fn take_following_operand(&self, node: ObjectId) -> Option<ObjectId> {
        let mut cursor = node;
        loop {
            let sibling = self.tree.node(cursor).next_sibling();
            if sibling != NO_OBJECT {
                return Some(sibling);
            }
            let parent = self.tree.node(cursor).parent();
            if parent == NO_OBJECT {
                return None;
            }
            let info = self.tree.node(parent).opcode.info();
            if !info.is(OpcodeFlags::EXECUTABLE) || info.is(OpcodeFlags::NAMED) {
                return None;
            }
            cursor = parent;
        }
    }

    /// Pass 6: disambiguate the name-or-method-call sentinels left by the
    /// stream parser.
    fn resolve_method_calls(&mut self) -> Result<PassResult, AmlParseError> {
        let mut result = PassResult::Stable;
        for id in self.walk() {
            let node = self.tree.node(id);
            if node.table != self.table || node.opcode != Opcode::IntNamePathOrMethodCall {
                continue;
            }
            let path = match node.value.as_bytes() {
                Some(bytes) => bytes.to_vec(),
                None => return Err(AmlParseError::UnresolvedPath),
            };

            let Some(target) = resolver::resolve(self.tree, id, &path) else {
                if self.resolve_passes == 1 {
                    result = PassResult::RequiresExtraPass;
                    continue;
                }
                warn!("name path did not resolve");
                return Err(AmlParseError::UnresolvedPath);
            };

            if self.tree.node(target).opcode == Opcode::Method {
                let arity = self.method_arity(target)? as usize;
                for _ in 0..arity {
                    let Some(sibling) = self.take_following_operand(id) else {
                        warn!("method call with fewer args than the callee declares");
                        return Err(AmlParseError::MissingOperands);
                    };
                    self.tree.detach(sibling);
                    self.tree.append(id, sibling)?;
                }
                let node = self.tree.node_mut(id);
                node.opcode = Opcode::IntMethodCall;
                node.value = Value::Reference(target);
                // the sibling list changed shape; re-verify connections
                result = PassResult::RequiresExtraPass;
            } else {
                self.tree.node_mut(id).opcode = Opcode::IntNamePath;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use super::*;
    use crate::parser::parse_table;
    use crate::tree::ObjectTree;

    const SCOPES_TABLE: u8 = 0xFF;

    fn fresh_tree() -> ObjectTree {
        let mut tree = ObjectTree::new();
        tree.create_default_scopes(SCOPES_TABLE);
        tree
    }

    #[test]
    fn scope_directive_merges_into_existing_scope() {
        // Scope(\_SB_) { Device(DEV0) {} }
        let payload = [
            0x10, 0x0D, b'\\', b'_', b'S', b'B', b'_', // Scope(\_SB_)
            0x5B, 0x82, 0x05, b'D', b'E', b'V', b'0', // Device(DEV0) {}
        ];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let sb = tree.find_in_scope(ROOT_ID, NameSeg(*b"_SB_")).unwrap();
        let dev = tree.find_in_scope(sb, NameSeg(*b"DEV0")).unwrap();
        assert_eq!(tree.node(dev).opcode, Opcode::Device);

        // the directive itself is gone
        let no_scope_left = tree
            .children(ROOT_ID)
            .all(|c| tree.node(c).opcode != Opcode::Scope);
        assert!(no_scope_left);
    }

    #[test]
    fn forward_method_call_is_rewritten_with_its_args() {
        // MTHD(One) precedes Method(MTHD, 1) {}
        let payload = [
            b'M', b'T', b'H', b'D', 0x01, // call site + one arg
            0x14, 0x06, b'M', b'T', b'H', b'D', 0x01, // Method(MTHD, 1) {}
        ];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let call = tree
            .children(ROOT_ID)
            .find(|&c| tree.node(c).opcode == Opcode::IntMethodCall)
            .expect("call site was not rewritten");
        let method = tree.find_in_scope(ROOT_ID, NameSeg(*b"MTHD")).unwrap();
        assert_eq!(tree.node(call).value, Value::Reference(method));

        let args: Vec<ObjectId> = tree.children(call).collect();
        assert_eq!(args.len(), 1);
        assert_eq!(tree.node(args[0]).opcode, Opcode::One);
    }

    #[test]
    fn forward_call_as_operand_inside_a_method_body() {
        // Method(MTH1, 0) { Add(FOOC(Local1), 5, Local0) } precedes
        // Method(FOOC, 1) {}
        let payload = [
            0x14, 0x0F, b'M', b'T', b'H', b'1', 0x00, // Method(MTH1, 0)
            0x72, b'F', b'O', b'O', b'C', 0x61, 0x0A, 0x05, 0x60, // body
            0x14, 0x06, b'F', b'O', b'O', b'C', 0x01, // Method(FOOC, 1)
        ];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let mth1 = tree.find_in_scope(ROOT_ID, NameSeg(*b"MTH1")).unwrap();
        let fooc = tree.find_in_scope(ROOT_ID, NameSeg(*b"FOOC")).unwrap();
        let body = tree.scope_block_of(mth1).unwrap();

        let statements: Vec<ObjectId> = tree.children(body).collect();
        assert_eq!(statements.len(), 1);
        let add = statements[0];
        assert_eq!(tree.node(add).opcode, Opcode::Add);

        let operands: Vec<ObjectId> = tree.children(add).collect();
        assert_eq!(operands.len(), 3);
        assert_eq!(tree.node(operands[0]).opcode, Opcode::IntMethodCall);
        assert_eq!(tree.node(operands[0]).value, Value::Reference(fooc));
        assert_eq!(tree.node(operands[1]).value, Value::Integer(5));
        assert_eq!(tree.node(operands[2]).opcode, Opcode::Local0);

        let call_args: Vec<ObjectId> = tree.children(operands[0]).collect();
        assert_eq!(call_args.len(), 1);
        assert_eq!(tree.node(call_args[0]).opcode, Opcode::Local1);
    }

    #[test]
    fn forward_call_nested_under_an_operator_keeps_stream_order() {
        // Add(MTHD(One), Zero, Local0) precedes Method(MTHD, 1) {}; the
        // call site resolves through the sentinel and must take One, not
        // one of Add's own operands
        let payload = [
            0x72, b'M', b'T', b'H', b'D', 0x01, 0x00, 0x60,
            0x14, 0x06, b'M', b'T', b'H', b'D', 0x01,
        ];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let method = tree.find_in_scope(ROOT_ID, NameSeg(*b"MTHD")).unwrap();
        let add = tree
            .children(ROOT_ID)
            .find(|&c| tree.node(c).opcode == Opcode::Add)
            .unwrap();

        let operands: Vec<ObjectId> = tree.children(add).collect();
        assert_eq!(operands.len(), 3);
        assert_eq!(tree.node(operands[0]).opcode, Opcode::IntMethodCall);
        assert_eq!(tree.node(operands[0]).value, Value::Reference(method));
        assert_eq!(tree.node(operands[1]).opcode, Opcode::Zero);
        assert_eq!(tree.node(operands[2]).opcode, Opcode::Local0);

        let call_args: Vec<ObjectId> = tree.children(operands[0]).collect();
        assert_eq!(call_args.len(), 1);
        assert_eq!(tree.node(call_args[0]).opcode, Opcode::One);

        // nothing leaked back to the root statement list
        assert!(tree
            .children(ROOT_ID)
            .all(|c| !matches!(tree.node(c).opcode, Opcode::One | Opcode::Zero | Opcode::Local0)));
    }

    #[test]
    fn nested_operators_reclaim_their_operands() {
        // Store(Add(One, Zero, Local1), Local0)
        let payload = [0x70, 0x72, 0x01, 0x00, 0x61, 0x60];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let store = tree
            .children(ROOT_ID)
            .find(|&c| tree.node(c).opcode == Opcode::Store)
            .unwrap();
        let store_ops: Vec<ObjectId> = tree.children(store).collect();
        assert_eq!(store_ops.len(), 2);
        assert_eq!(tree.node(store_ops[0]).opcode, Opcode::Add);
        assert_eq!(tree.node(store_ops[1]).opcode, Opcode::Local0);

        let add_ops: Vec<Opcode> = tree
            .children(store_ops[0])
            .map(|c| tree.node(c).opcode)
            .collect();
        assert_eq!(add_ops, [Opcode::One, Opcode::Zero, Opcode::Local1]);
    }

    #[test]
    fn method_declared_with_scoped_name_is_relocated() {
        // Method(\_SB_.MTH0, 0) {}
        let payload = [
            0x14, 0x0C, b'\\', 0x2E, b'_', b'S', b'B', b'_', b'M', b'T', b'H', b'0', 0x00,
        ];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let sb = tree.find_in_scope(ROOT_ID, NameSeg(*b"_SB_")).unwrap();
        let method = tree.find_in_scope(sb, NameSeg(*b"MTH0")).unwrap();
        assert_eq!(tree.node(method).opcode, Opcode::Method);
        assert!(tree.find_in_scope(ROOT_ID, NameSeg(*b"MTH0")).is_none());
    }

    #[test]
    fn resolved_trees_are_a_fixed_point() {
        let payload = [
            b'M', b'T', b'H', b'D', 0x01, // forward call
            0x14, 0x06, b'M', b'T', b'H', b'D', 0x01, // Method(MTHD, 1)
            0x10, 0x0D, b'\\', b'_', b'S', b'B', b'_', // Scope(\_SB_)
            0x5B, 0x82, 0x05, b'D', b'E', b'V', b'0', // Device(DEV0)
        ];
        let mut tree = fresh_tree();
        parse_table(&mut tree, 0, &payload).unwrap();

        let mut before = String::new();
        tree.pretty_print(&mut before).unwrap();

        // rerunning the pipeline on the resolved tree changes nothing
        let mut parser = TableParser::new(&mut tree, 0, &payload);
        parser.run_resolver_passes().unwrap();

        let mut after = String::new();
        tree.pretty_print(&mut after).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn named_object_with_bad_name_argument_fails() {
        let mut tree = fresh_tree();
        let named = tree.new_named_object(Opcode::Name, 0, NameSeg(*b"FOOF"));
        let not_a_path = tree.new_object(Opcode::DwordPrefix, 0);
        tree.append(named, not_a_path).unwrap();
        let first_scope = tree.children(ROOT_ID).next().unwrap();
        tree.append(first_scope, named).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        assert_eq!(
            parser.connect_named_obj_args().unwrap_err(),
            AmlParseError::NamedObjectArgsMismatch
        );
    }

    #[test]
    fn named_object_arg_count_mismatch_fails() {
        let mut tree = fresh_tree();
        // a BankField with only its name path attached
        let named = tree.new_named_object(Opcode::BankField, 0, NameSeg(*b"FOOF"));
        let path = tree.new_object(Opcode::IntNamePath, 0);
        tree.node_mut(path).value = Value::Bytes(b"FOOF".to_vec());
        tree.append(named, path).unwrap();
        tree.append(ROOT_ID, named).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        assert_eq!(
            parser.connect_named_obj_args().unwrap_err(),
            AmlParseError::NamedObjectArgsMismatch
        );
    }

    #[test]
    fn malformed_scope_directive_fails() {
        let mut tree = fresh_tree();
        let directive = tree.new_object(Opcode::Scope, 0);
        tree.append(ROOT_ID, directive).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        assert!(parser.merge_scope_directives().is_err());
    }

    #[test]
    fn unresolved_scope_target_needs_extra_pass_then_fails() {
        let mut tree = fresh_tree();
        let directive = tree.new_object(Opcode::Scope, 0);
        let path = tree.new_object(Opcode::IntNamePath, 0);
        tree.node_mut(path).value = Value::Bytes(b"FOOF".to_vec());
        tree.append(directive, path).unwrap();
        tree.append(ROOT_ID, directive).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        parser.resolve_passes = 1;
        assert_eq!(
            parser.merge_scope_directives().unwrap(),
            PassResult::RequiresExtraPass
        );

        parser.resolve_passes = 2;
        assert_eq!(
            parser.merge_scope_directives().unwrap_err(),
            AmlParseError::UnresolvedPath
        );
    }

    #[test]
    fn scope_target_without_scope_block_fails_on_second_pass() {
        let mut tree = fresh_tree();
        let directive = tree.new_object(Opcode::Scope, 0);
        let path = tree.new_object(Opcode::IntNamePath, 0);
        tree.node_mut(path).value = Value::Bytes(b"DEV0".to_vec());
        tree.append(directive, path).unwrap();
        tree.append(ROOT_ID, directive).unwrap();
        // a Device with no scope block child cannot be a merge target
        let dev = tree.new_named_object(Opcode::Device, 0, NameSeg(*b"DEV0"));
        tree.append(ROOT_ID, dev).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        parser.resolve_passes = 2;
        assert_eq!(
            parser.merge_scope_directives().unwrap_err(),
            AmlParseError::UnresolvedPath
        );
    }

    #[test]
    fn unresolved_relocation_needs_extra_pass_then_fails() {
        let mut tree = fresh_tree();
        let named = tree.new_named_object(Opcode::Name, 0, NameSeg(*b"FOOF"));
        let path = tree.new_object(Opcode::IntNamePath, 0);
        // more carets than there are enclosing scopes
        tree.node_mut(path).value = Value::Bytes(b"^^^^FOOF".to_vec());
        tree.append(named, path).unwrap();
        let value = tree.new_object(Opcode::BytePrefix, 0);
        tree.node_mut(value).value = Value::Integer(1);
        tree.append(named, value).unwrap();
        let first_scope = tree.children(ROOT_ID).next().unwrap();
        tree.append(first_scope, named).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        parser.resolve_passes = 1;
        assert_eq!(
            parser.relocate_named_objects().unwrap(),
            PassResult::RequiresExtraPass
        );

        parser.resolve_passes = 2;
        assert_eq!(
            parser.relocate_named_objects().unwrap_err(),
            AmlParseError::UnresolvedPath
        );
    }

    #[test]
    fn truncated_deferred_body_fails() {
        let payload = [0x5B];
        let mut tree = fresh_tree();
        let deferred = tree.new_object(Opcode::BankField, 0);
        tree.node_mut(deferred).pkg_end = 1;
        tree.node_mut(deferred).pending_body = true;
        let first_scope = tree.children(ROOT_ID).next().unwrap();
        tree.append(first_scope, deferred).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &payload);
        assert!(parser.parse_deferred_blocks().is_err());
    }

    #[test]
    fn executable_without_operands_fails() {
        let mut tree = ObjectTree::new();
        let scope = tree.new_object(Opcode::IntScopeBlock, 0);
        tree.append(ROOT_ID, scope).unwrap();
        let add = tree.new_object(Opcode::Add, 0);
        tree.append(scope, add).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        assert_eq!(
            parser.connect_non_named_obj_args().unwrap_err(),
            AmlParseError::MissingOperands
        );
    }

    #[test]
    fn method_call_on_method_without_flags_fails() {
        let mut tree = fresh_tree();
        let method = tree.new_named_object(Opcode::Method, 0, NameSeg(*b"MTHD"));
        let path = tree.new_object(Opcode::IntNamePath, 0);
        tree.node_mut(path).value = Value::Bytes(b"MTHD".to_vec());
        tree.append(method, path).unwrap();
        tree.append(ROOT_ID, method).unwrap();

        let call = tree.new_object(Opcode::IntNamePathOrMethodCall, 0);
        tree.node_mut(call).value = Value::Bytes(b"MTHD".to_vec());
        tree.append(ROOT_ID, call).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        assert_eq!(
            parser.resolve_method_calls().unwrap_err(),
            AmlParseError::MalformedMethodFlags
        );
    }

    #[test]
    fn method_call_arity_mismatch_fails() {
        let mut tree = fresh_tree();
        let method = tree.new_named_object(Opcode::Method, 0, NameSeg(*b"MTHD"));
        let path = tree.new_object(Opcode::IntNamePath, 0);
        tree.node_mut(path).value = Value::Bytes(b"MTHD".to_vec());
        tree.append(method, path).unwrap();
        let flags = tree.new_object(Opcode::BytePrefix, 0);
        tree.node_mut(flags).value = Value::Integer(6);
        tree.append(method, flags).unwrap();
        tree.append(ROOT_ID, method).unwrap();

        // the call site has no following siblings to consume
        let call = tree.new_object(Opcode::IntNamePathOrMethodCall, 0);
        tree.node_mut(call).value = Value::Bytes(b"MTHD".to_vec());
        tree.append(ROOT_ID, call).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        assert_eq!(
            parser.resolve_method_calls().unwrap_err(),
            AmlParseError::MissingOperands
        );
    }

    #[test]
    fn unresolved_sentinel_needs_extra_pass_then_fails() {
        let mut tree = fresh_tree();
        let call = tree.new_object(Opcode::IntNamePathOrMethodCall, 0);
        tree.node_mut(call).value = Value::Bytes(b"MISS".to_vec());
        tree.append(ROOT_ID, call).unwrap();

        let mut parser = TableParser::new(&mut tree, 0, &[]);
        parser.resolve_passes = 1;
        assert_eq!(
            parser.resolve_method_calls().unwrap(),
            PassResult::RequiresExtraPass
        );
        parser.resolve_passes = 2;
        assert_eq!(
            parser.resolve_method_calls().unwrap_err(),
            AmlParseError::UnresolvedPath
        );
    }

    #[test]
    fn unresolvable_tree_fails_before_the_round_cap() {
        let mut tree = fresh_tree();
        let call = tree.new_object(Opcode::IntNamePathOrMethodCall, SCOPES_TABLE);
        tree.node_mut(call).value = Value::Bytes(b"MISS".to_vec());
        tree.append(ROOT_ID, call).unwrap();

        let mut parser = TableParser::new(&mut tree, SCOPES_TABLE, &[]);
        // second resolution attempt is fatal, well before the round cap
        assert!(parser.run_resolver_passes().is_err());
    }
}
