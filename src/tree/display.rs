//! Deterministic textual dump of the object tree.
//!
//! The format is a golden-file contract: one line per object, two spaces of
//! indentation per depth level, depth-first in insertion order. Each line
//! carries the opcode mnemonic, the object's name when it has one, and a
//! rendering of its value.

use core::fmt;

use crate::opcode::Opcode;
use crate::tree::{ObjectId, ObjectTree, Value, ROOT_ID};

impl ObjectTree {
    /// Writes the tree dump rooted at `\` into `w`.
    pub fn pretty_print(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        self.print_object(w, ROOT_ID, 0)
    }

    fn print_object(&self, w: &mut dyn fmt::Write, id: ObjectId, depth: usize) -> fmt::Result {
        let Some(obj) = self.object_at(id) else {
            return Ok(());
        };

        display_depth(w, depth)?;
        w.write_str(obj.opcode.info().mnemonic)?;
        if let Some(name) = obj.name {
            write!(w, " {name}")?;
        }

        match &obj.value {
            Value::None => {}
            Value::Integer(value) => write!(w, " = {:#X}", value)?,
            Value::Bytes(bytes) => match obj.opcode {
                Opcode::IntNamePath
                | Opcode::IntNamePathOrMethodCall
                | Opcode::StringPrefix => {
                    w.write_str(" = \"")?;
                    display_bytes(w, bytes)?;
                    w.write_str("\"")?;
                }
                _ => write!(w, " = [{} bytes]", bytes.len())?,
            },
            Value::Reference(target) => {
                match self.object_at(*target).and_then(|t| t.name) {
                    Some(name) => write!(w, " -> {name}")?,
                    None => write!(w, " -> {:#X}", target)?,
                }
            }
        }
        w.write_str("\n")?;

        for child in self.children(id) {
            self.print_object(w, child, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ObjectTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.pretty_print(f)
    }
}

fn display_depth(w: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        w.write_str("  ")?;
    }
    Ok(())
}

fn display_bytes(w: &mut dyn fmt::Write, bytes: &[u8]) -> fmt::Result {
    for &b in bytes {
        if (0x20..=0x7E).contains(&b) {
            write!(w, "{}", b as char)?;
        } else {
            write!(w, "\\x{:02X}", b)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloc::string::String;

    use crate::tree::{NameSeg, ObjectTree, Value, ROOT_ID};
    use crate::opcode::Opcode;

    #[test]
    fn dump_is_depth_first_in_insertion_order() {
        let mut tree = ObjectTree::new();
        let dev = tree.new_named_object(Opcode::Device, 0, NameSeg(*b"DEV0"));
        tree.append(ROOT_ID, dev).unwrap();
        let block = tree.new_object(Opcode::IntScopeBlock, 0);
        tree.append(dev, block).unwrap();
        let hid = tree.new_named_object(Opcode::Name, 0, NameSeg(*b"_HID"));
        tree.append(block, hid).unwrap();
        let value = tree.new_object(Opcode::DwordPrefix, 0);
        tree.object_at_mut(value).unwrap().value = Value::Integer(0x10CD_0041);
        tree.append(hid, value).unwrap();

        let mut out = String::new();
        tree.pretty_print(&mut out).unwrap();
        assert_eq!(
            out,
            "ScopeBlock \\\n\
             \x20 Device DEV0\n\
             \x20   ScopeBlock\n\
             \x20     Name _HID\n\
             \x20       Dword = 0x10CD0041\n"
        );
    }

    #[test]
    fn repeated_dumps_are_identical() {
        let mut tree = ObjectTree::new();
        tree.create_default_scopes(0);

        let mut first = String::new();
        tree.pretty_print(&mut first).unwrap();
        let mut second = String::new();
        tree.pretty_print(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn path_values_render_as_strings() {
        let mut tree = ObjectTree::new();
        let path = tree.new_object(Opcode::IntNamePath, 0);
        tree.object_at_mut(path).unwrap().value = Value::Bytes(b"^^_SB_".to_vec());
        tree.append(ROOT_ID, path).unwrap();

        let mut out = String::new();
        tree.pretty_print(&mut out).unwrap();
        assert!(out.contains("NamePath = \"^^_SB_\""));
    }
}
