//! Resolution of encoded AML name paths against the object tree.
//!
//! A path is kept in its raw encoded form (prefix bytes plus 4-byte
//! segments) until it is looked up. Bare single segments follow ACPI's
//! search rules (try the current scope block, then each enclosing block up
//! to the root); any prefixed, dual or multi path is matched level by
//! level with no upward search.

use alloc::vec::Vec;

use crate::opcode::Opcode;
use crate::tree::{NameSeg, ObjectId, ObjectTree, NO_OBJECT, ROOT_ID};

/// A decoded name path.
#[derive(Debug)]
pub struct NamePath {
    pub absolute: bool,
    pub carets: usize,
    pub segs: Vec<NameSeg>,
}

impl NamePath {
    /// Decodes the raw encoded form. Returns `None` when the encoding is
    /// malformed (the stream parser validates paths before storing them,
    /// so this only rejects hand-built garbage).
    pub fn decode(mut path: &[u8]) -> Option<Self> {
        let absolute = path.first() == Some(&b'\\');
        if absolute {
            path = &path[1..];
        }
        let mut carets = 0;
        while path.first() == Some(&b'^') {
            carets += 1;
            path = &path[1..];
        }
        if absolute && carets > 0 {
            return None;
        }

        let mut segs = Vec::new();
        match path.first() {
            None | Some(&0x00) => {}
            Some(&0x2E) => {
                if path.len() != 9 {
                    return None;
                }
                segs.push(NameSeg(path[1..5].try_into().ok()?));
                segs.push(NameSeg(path[5..9].try_into().ok()?));
            }
            Some(&0x2F) => {
                let count = *path.get(1)? as usize;
                if path.len() != 2 + count * 4 {
                    return None;
                }
                for i in 0..count {
                    let at = 2 + i * 4;
                    segs.push(NameSeg(path[at..at + 4].try_into().ok()?));
                }
            }
            Some(_) => {
                if path.len() != 4 {
                    return None;
                }
                segs.push(NameSeg(path.try_into().ok()?));
            }
        }
        Some(Self { absolute, carets, segs })
    }

    /// Bare single segments are the only paths subject to upward search.
    pub fn is_bare_seg(&self) -> bool {
        !self.absolute && self.carets == 0 && self.segs.len() == 1
    }
}

/// Resolves `path` starting from `start` (an object id; resolution begins
/// at its nearest scope block). Returns the target object or `None` when
/// any segment does not exist at the required level.
pub fn resolve(tree: &ObjectTree, start: ObjectId, path: &[u8]) -> Option<ObjectId> {
    let decoded = NamePath::decode(path)?;
    let cursor = initial_cursor(tree, start, &decoded)?;

    let Some((last, intermediate)) = decoded.segs.split_last() else {
        // null path: the starting scope itself
        return Some(cursor);
    };

    if decoded.is_bare_seg() {
        return search_upward(tree, cursor, *last);
    }

    let mut block = cursor;
    for seg in intermediate {
        let obj = tree.find_in_scope(block, *seg)?;
        block = tree.scope_block_of(obj)?;
    }
    tree.find_in_scope(block, *last)
}

/// Resolves everything but the final segment, yielding the scope block the
/// final segment belongs in plus that segment. Used for relocating named
/// objects declared with a path.
pub fn resolve_parent_scope(
    tree: &ObjectTree,
    start: ObjectId,
    path: &[u8],
) -> Option<(ObjectId, NameSeg)> {
    let decoded = NamePath::decode(path)?;
    let cursor = initial_cursor(tree, start, &decoded)?;
    let (last, intermediate) = decoded.segs.split_last()?;

    let mut block = cursor;
    for seg in intermediate {
        let obj = tree.find_in_scope(block, *seg)?;
        block = tree.scope_block_of(obj)?;
    }
    Some((block, *last))
}

fn initial_cursor(tree: &ObjectTree, start: ObjectId, path: &NamePath) -> Option<ObjectId> {
    if path.absolute {
        return Some(ROOT_ID);
    }

    let mut cursor = nearest_scope_block(tree, start)?;
    for _ in 0..path.carets {
        cursor = tree.enclosing_scope_block(cursor);
        if cursor == NO_OBJECT {
            return None;
        }
    }
    Some(cursor)
}

fn nearest_scope_block(tree: &ObjectTree, start: ObjectId) -> Option<ObjectId> {
    let obj = tree.object_at(start)?;
    if obj.opcode == Opcode::IntScopeBlock {
        return Some(start);
    }
    match tree.enclosing_scope_block(start) {
        NO_OBJECT => None,
        block => Some(block),
    }
}

fn search_upward(tree: &ObjectTree, start: ObjectId, seg: NameSeg) -> Option<ObjectId> {
    let mut block = start;
    loop {
        if let Some(found) = tree.find_in_scope(block, seg) {
            return Some(found);
        }
        match tree.enclosing_scope_block(block) {
            NO_OBJECT => return None,
            parent => block = parent,
        }
    }
}
