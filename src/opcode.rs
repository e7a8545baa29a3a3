//! Static description of the AML opcode set.
//!
//! Every opcode the stream parser can encounter is described by one
//! [`OpcodeInfo`] entry: its argument schema, whether it declares a name,
//! whether its body is parsed in the deferred pass, and whether it opens a
//! scope block. Adding an opcode is a table entry; only genuinely irregular
//! opcodes (method flags, field elements) have custom handling in the
//! parser itself.

use bitflags::bitflags;

/// The extension prefix byte introducing the two-byte opcode family.
pub const EXT_OP_PREFIX: u8 = 0x5B;

/// AML opcodes, including the extended `0x5B` family and the internal
/// opcodes the parser materializes for tree structure.
///
/// Single-byte opcodes use their encoding as the discriminant, extended
/// opcodes use `0x5B00 | ext`, the composite logical forms use the two
/// bytes of their encoding, and internal opcodes live at `0xFF00+` where
/// no stream encoding can reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum Opcode {
    Zero = 0x00,
    One = 0x01,
    Alias = 0x06,
    Name = 0x08,
    BytePrefix = 0x0A,
    WordPrefix = 0x0B,
    DwordPrefix = 0x0C,
    StringPrefix = 0x0D,
    QwordPrefix = 0x0E,
    Scope = 0x10,
    Buffer = 0x11,
    Package = 0x12,
    VarPackage = 0x13,
    Method = 0x14,
    External = 0x15,
    Local0 = 0x60,
    Local1 = 0x61,
    Local2 = 0x62,
    Local3 = 0x63,
    Local4 = 0x64,
    Local5 = 0x65,
    Local6 = 0x66,
    Local7 = 0x67,
    Arg0 = 0x68,
    Arg1 = 0x69,
    Arg2 = 0x6A,
    Arg3 = 0x6B,
    Arg4 = 0x6C,
    Arg5 = 0x6D,
    Arg6 = 0x6E,
    Store = 0x70,
    RefOf = 0x71,
    Add = 0x72,
    Concat = 0x73,
    Subtract = 0x74,
    Increment = 0x75,
    Decrement = 0x76,
    Multiply = 0x77,
    Divide = 0x78,
    ShiftLeft = 0x79,
    ShiftRight = 0x7A,
    And = 0x7B,
    Nand = 0x7C,
    Or = 0x7D,
    Nor = 0x7E,
    Xor = 0x7F,
    Not = 0x80,
    FindSetLeftBit = 0x81,
    FindSetRightBit = 0x82,
    DerefOf = 0x83,
    ConcatRes = 0x84,
    Mod = 0x85,
    Notify = 0x86,
    SizeOf = 0x87,
    Index = 0x88,
    Match = 0x89,
    CreateDWordField = 0x8A,
    CreateWordField = 0x8B,
    CreateByteField = 0x8C,
    CreateBitField = 0x8D,
    ObjectType = 0x8E,
    CreateQWordField = 0x8F,
    LAnd = 0x90,
    LOr = 0x91,
    LNot = 0x92,
    LEqual = 0x93,
    LGreater = 0x94,
    LLess = 0x95,
    ToBuffer = 0x96,
    ToDecimalString = 0x97,
    ToHexString = 0x98,
    ToInteger = 0x99,
    ToString = 0x9C,
    CopyObject = 0x9D,
    Mid = 0x9E,
    Continue = 0x9F,
    If = 0xA0,
    Else = 0xA1,
    While = 0xA2,
    Noop = 0xA3,
    Return = 0xA4,
    Break = 0xA5,
    BreakPoint = 0xCC,
    Ones = 0xFF,

    // Composite logical forms (0x92 followed by 0x93/0x94/0x95).
    LNotEqual = 0x9293,
    LLessEqual = 0x9294,
    LGreaterEqual = 0x9295,

    // Extended (0x5B-prefixed) opcodes.
    Mutex = 0x5B01,
    Event = 0x5B02,
    CondRefOf = 0x5B12,
    CreateField = 0x5B13,
    LoadTable = 0x5B1F,
    Load = 0x5B20,
    Stall = 0x5B21,
    Sleep = 0x5B22,
    Acquire = 0x5B23,
    Signal = 0x5B24,
    Wait = 0x5B25,
    Reset = 0x5B26,
    Release = 0x5B27,
    FromBcd = 0x5B28,
    ToBcd = 0x5B29,
    Unload = 0x5B2A,
    Revision = 0x5B30,
    Debug = 0x5B31,
    Fatal = 0x5B32,
    Timer = 0x5B33,
    OpRegion = 0x5B80,
    Field = 0x5B81,
    Device = 0x5B82,
    Processor = 0x5B83,
    PowerResource = 0x5B84,
    ThermalZone = 0x5B85,
    IndexField = 0x5B86,
    BankField = 0x5B87,
    DataRegion = 0x5B88,

    // Internal opcodes, never present in a stream.
    IntScopeBlock = 0xFF00,
    IntNamePath = 0xFF01,
    IntNamePathOrMethodCall = 0xFF02,
    IntMethodCall = 0xFF03,
    IntByteList = 0xFF04,
    IntReservedField = 0xFF05,
    IntAccessField = 0xFF06,
    IntConnection = 0xFF07,
    IntNamedField = 0xFF08,
}

/// Argument types an opcode schema can request, in stream order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    ByteData,
    WordData,
    DwordData,
    QwordData,
    String,
    NameString,
    PkgLen,
    TermArg,
    /// A TermArg position that must produce a value: named and
    /// scope-opening opcodes, a leading Method included, are rejected.
    StrictTermArg,
    TermList,
    FieldList,
    Target,
    ByteList,
    SuperName,
    SimpleName,
    DataRefObj,
}

impl ArgType {
    /// Operand-class args are consumed from following siblings during the
    /// arg-connection pass when they could not be attached at stream time.
    pub fn is_operand(self) -> bool {
        matches!(
            self,
            ArgType::TermArg
                | ArgType::StrictTermArg
                | ArgType::Target
                | ArgType::SuperName
                | ArgType::SimpleName
                | ArgType::DataRefObj
        )
    }
}

bitflags! {
    /// Per-opcode behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpcodeFlags: u8 {
        /// Declares a name in the enclosing scope.
        const NAMED = 1 << 0;
        /// Body bytes are captured and parsed in the deferred pass.
        const DEFERRED = 1 << 1;
        /// Owns a scope block; participates in enclosing-scope walks.
        const SCOPE_BLOCK = 1 << 2;
        /// Executable opcode whose operands the arg-connection pass may
        /// pull from its following siblings.
        const EXECUTABLE = 1 << 3;
        /// Leaf constant (integer constants, Local/Arg objects, Debug).
        const CONSTANT = 1 << 4;
    }
}

/// One opcode-table entry.
#[derive(Debug)]
pub struct OpcodeInfo {
    pub opcode: Opcode,
    pub mnemonic: &'static str,
    pub flags: OpcodeFlags,
    pub args: &'static [ArgType],
}

impl OpcodeInfo {
    pub fn is(&self, flags: OpcodeFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Number of operand-class arguments (consumed as siblings when the
    /// encoding left them flat).
    pub fn operand_count(&self) -> usize {
        self.args.iter().filter(|a| a.is_operand()).count()
    }

    /// True for executable opcodes encoded as a bare prefix byte: every
    /// argument is an operand that follows as an independent term. In
    /// statement position such opcodes stay childless at stream time and
    /// the arg-connection pass pulls their operands in, so an operand
    /// whose arity is not yet known (a forward method call) cannot shift
    /// the operands that follow it.
    pub fn implicit_operands(&self) -> bool {
        self.is(OpcodeFlags::EXECUTABLE)
            && !self.is(OpcodeFlags::NAMED)
            && !self.args.is_empty()
            && self.args.iter().all(|a| a.is_operand())
    }

    /// Fixed child count produced by the schema (everything except the
    /// package length, which bounds the stream rather than producing a
    /// node) and whether a variable-length tail (field elements) follows.
    pub fn fixed_arg_count(&self) -> (usize, bool) {
        let mut fixed = 0;
        let mut variable = false;
        for arg in self.args {
            match arg {
                ArgType::PkgLen => {}
                ArgType::FieldList => variable = true,
                _ => fixed += 1,
            }
        }
        (fixed, variable)
    }

    /// Schema position (in child order) of the NameString that names this
    /// object. `Alias` is named by its second NameString, the
    /// `Create*Field` family by its last argument; everything else by the
    /// first NameString.
    pub fn naming_arg_position(&self) -> Option<usize> {
        if !self.is(OpcodeFlags::NAMED) {
            return None;
        }
        let take_last = matches!(
            self.opcode,
            Opcode::CreateBitField
                | Opcode::CreateByteField
                | Opcode::CreateWordField
                | Opcode::CreateDWordField
                | Opcode::CreateQWordField
                | Opcode::CreateField
        );
        let wanted = if matches!(self.opcode, Opcode::Alias) { 1 } else { 0 };

        let mut found = None;
        let mut seen = 0;
        for (pos, arg) in self
            .args
            .iter()
            .filter(|a| !matches!(a, ArgType::PkgLen))
            .enumerate()
        {
            if matches!(arg, ArgType::NameString) {
                if take_last || seen == wanted {
                    found = Some(pos);
                }
                seen += 1;
            }
        }
        found
    }
}

const NONE: OpcodeFlags = OpcodeFlags::empty();
const EXEC: OpcodeFlags = OpcodeFlags::EXECUTABLE;
const CONST: OpcodeFlags = OpcodeFlags::CONSTANT;
const NAMED: OpcodeFlags = OpcodeFlags::NAMED;
const NAMED_EXEC: OpcodeFlags = NAMED.union(EXEC);
const NAMED_SCOPE: OpcodeFlags = NAMED.union(OpcodeFlags::SCOPE_BLOCK);
const NAMED_SCOPE_DEFER: OpcodeFlags = NAMED_SCOPE.union(OpcodeFlags::DEFERRED);
const NAMED_DEFER: OpcodeFlags = NAMED.union(OpcodeFlags::DEFERRED);
const SCOPE: OpcodeFlags = OpcodeFlags::SCOPE_BLOCK;

macro_rules! op {
    ($opcode:ident, $mnemonic:literal, $flags:expr, [$($arg:ident),* $(,)?]) => {
        OpcodeInfo {
            opcode: Opcode::$opcode,
            mnemonic: $mnemonic,
            flags: $flags,
            args: &[$(ArgType::$arg),*],
        }
    };
}

/// The opcode table. This is the compatibility surface for the ACPI 6.x
/// AML opcode set.
pub const OPCODE_TABLE: &[OpcodeInfo] = &[
    op!(Zero, "Zero", CONST, []),
    op!(One, "One", CONST, []),
    op!(Alias, "Alias", NAMED, [NameString, NameString]),
    op!(Name, "Name", NAMED, [NameString, DataRefObj]),
    op!(BytePrefix, "Byte", CONST, [ByteData]),
    op!(WordPrefix, "Word", CONST, [WordData]),
    op!(DwordPrefix, "Dword", CONST, [DwordData]),
    op!(StringPrefix, "String", CONST, [String]),
    op!(QwordPrefix, "Qword", CONST, [QwordData]),
    op!(Scope, "Scope", SCOPE, [PkgLen, NameString, TermList]),
    op!(Buffer, "Buffer", NONE, [PkgLen, StrictTermArg, ByteList]),
    op!(Package, "Package", NONE, [PkgLen, ByteData, TermList]),
    op!(VarPackage, "VarPackage", NONE, [PkgLen, StrictTermArg, TermList]),
    op!(Method, "Method", NAMED_SCOPE_DEFER, [PkgLen, NameString, ByteData, TermList]),
    op!(External, "External", NAMED, [NameString, ByteData, ByteData]),
    op!(Local0, "Local0", CONST, []),
    op!(Local1, "Local1", CONST, []),
    op!(Local2, "Local2", CONST, []),
    op!(Local3, "Local3", CONST, []),
    op!(Local4, "Local4", CONST, []),
    op!(Local5, "Local5", CONST, []),
    op!(Local6, "Local6", CONST, []),
    op!(Local7, "Local7", CONST, []),
    op!(Arg0, "Arg0", CONST, []),
    op!(Arg1, "Arg1", CONST, []),
    op!(Arg2, "Arg2", CONST, []),
    op!(Arg3, "Arg3", CONST, []),
    op!(Arg4, "Arg4", CONST, []),
    op!(Arg5, "Arg5", CONST, []),
    op!(Arg6, "Arg6", CONST, []),
    op!(Store, "Store", EXEC, [TermArg, SuperName]),
    op!(RefOf, "RefOf", EXEC, [SuperName]),
    op!(Add, "Add", EXEC, [TermArg, TermArg, Target]),
    op!(Concat, "Concatenate", EXEC, [TermArg, TermArg, Target]),
    op!(Subtract, "Subtract", EXEC, [TermArg, TermArg, Target]),
    op!(Increment, "Increment", EXEC, [SuperName]),
    op!(Decrement, "Decrement", EXEC, [SuperName]),
    op!(Multiply, "Multiply", EXEC, [TermArg, TermArg, Target]),
    op!(Divide, "Divide", EXEC, [TermArg, TermArg, Target, Target]),
    op!(ShiftLeft, "ShiftLeft", EXEC, [TermArg, TermArg, Target]),
    op!(ShiftRight, "ShiftRight", EXEC, [TermArg, TermArg, Target]),
    op!(And, "And", EXEC, [TermArg, TermArg, Target]),
    op!(Nand, "Nand", EXEC, [TermArg, TermArg, Target]),
    op!(Or, "Or", EXEC, [TermArg, TermArg, Target]),
    op!(Nor, "Nor", EXEC, [TermArg, TermArg, Target]),
    op!(Xor, "Xor", EXEC, [TermArg, TermArg, Target]),
    op!(Not, "Not", EXEC, [TermArg, Target]),
    op!(FindSetLeftBit, "FindSetLeftBit", EXEC, [TermArg, Target]),
    op!(FindSetRightBit, "FindSetRightBit", EXEC, [TermArg, Target]),
    op!(DerefOf, "DerefOf", EXEC, [StrictTermArg]),
    op!(ConcatRes, "ConcatenateResTemplate", EXEC, [TermArg, TermArg, Target]),
    op!(Mod, "Mod", EXEC, [TermArg, TermArg, Target]),
    op!(Notify, "Notify", EXEC, [SuperName, TermArg]),
    op!(SizeOf, "SizeOf", EXEC, [SuperName]),
    op!(Index, "Index", EXEC, [StrictTermArg, TermArg, Target]),
    op!(Match, "Match", EXEC, [TermArg, ByteData, TermArg, ByteData, TermArg, TermArg]),
    op!(CreateDWordField, "CreateDWordField", NAMED_EXEC, [TermArg, TermArg, NameString]),
    op!(CreateWordField, "CreateWordField", NAMED_EXEC, [TermArg, TermArg, NameString]),
    op!(CreateByteField, "CreateByteField", NAMED_EXEC, [TermArg, TermArg, NameString]),
    op!(CreateBitField, "CreateBitField", NAMED_EXEC, [TermArg, TermArg, NameString]),
    op!(ObjectType, "ObjectType", EXEC, [SuperName]),
    op!(CreateQWordField, "CreateQWordField", NAMED_EXEC, [TermArg, TermArg, NameString]),
    op!(LAnd, "LAnd", EXEC, [TermArg, TermArg]),
    op!(LOr, "LOr", EXEC, [TermArg, TermArg]),
    op!(LNot, "LNot", EXEC, [TermArg]),
    op!(LEqual, "LEqual", EXEC, [TermArg, TermArg]),
    op!(LGreater, "LGreater", EXEC, [TermArg, TermArg]),
    op!(LLess, "LLess", EXEC, [TermArg, TermArg]),
    op!(ToBuffer, "ToBuffer", EXEC, [TermArg, Target]),
    op!(ToDecimalString, "ToDecimalString", EXEC, [TermArg, Target]),
    op!(ToHexString, "ToHexString", EXEC, [TermArg, Target]),
    op!(ToInteger, "ToInteger", EXEC, [TermArg, Target]),
    op!(ToString, "ToString", EXEC, [TermArg, TermArg, Target]),
    op!(CopyObject, "CopyObject", EXEC, [TermArg, SimpleName]),
    op!(Mid, "Mid", EXEC, [TermArg, TermArg, TermArg, Target]),
    op!(Continue, "Continue", NONE, []),
    op!(If, "If", NONE, [PkgLen, StrictTermArg, TermList]),
    op!(Else, "Else", NONE, [PkgLen, TermList]),
    op!(While, "While", NONE, [PkgLen, StrictTermArg, TermList]),
    op!(Noop, "Noop", NONE, []),
    op!(Return, "Return", EXEC, [TermArg]),
    op!(Break, "Break", NONE, []),
    op!(BreakPoint, "BreakPoint", NONE, []),
    op!(Ones, "Ones", CONST, []),
    op!(LNotEqual, "LNotEqual", EXEC, [TermArg, TermArg]),
    op!(LLessEqual, "LLessEqual", EXEC, [TermArg, TermArg]),
    op!(LGreaterEqual, "LGreaterEqual", EXEC, [TermArg, TermArg]),
    op!(Mutex, "Mutex", NAMED, [NameString, ByteData]),
    op!(Event, "Event", NAMED, [NameString]),
    op!(CondRefOf, "CondRefOf", EXEC, [SuperName, Target]),
    op!(CreateField, "CreateField", NAMED_EXEC, [TermArg, TermArg, TermArg, NameString]),
    op!(LoadTable, "LoadTable", EXEC, [TermArg, TermArg, TermArg, TermArg, TermArg, TermArg]),
    op!(Load, "Load", EXEC, [NameString, SuperName]),
    op!(Stall, "Stall", EXEC, [TermArg]),
    op!(Sleep, "Sleep", EXEC, [TermArg]),
    op!(Acquire, "Acquire", EXEC, [SuperName, WordData]),
    op!(Signal, "Signal", EXEC, [SuperName]),
    op!(Wait, "Wait", EXEC, [SuperName, TermArg]),
    op!(Reset, "Reset", EXEC, [SuperName]),
    op!(Release, "Release", EXEC, [SuperName]),
    op!(FromBcd, "FromBCD", EXEC, [TermArg, Target]),
    op!(ToBcd, "ToBCD", EXEC, [TermArg, Target]),
    op!(Unload, "Unload", EXEC, [SuperName]),
    op!(Revision, "Revision", CONST, []),
    op!(Debug, "Debug", CONST, []),
    op!(Fatal, "Fatal", EXEC, [ByteData, DwordData, StrictTermArg]),
    op!(Timer, "Timer", CONST, []),
    op!(OpRegion, "OperationRegion", NAMED_EXEC, [NameString, ByteData, StrictTermArg, StrictTermArg]),
    op!(Field, "Field", NAMED_DEFER, [PkgLen, NameString, ByteData, FieldList]),
    op!(Device, "Device", NAMED_SCOPE, [PkgLen, NameString, TermList]),
    op!(Processor, "Processor", NAMED_SCOPE, [PkgLen, NameString, ByteData, DwordData, ByteData, TermList]),
    op!(PowerResource, "PowerResource", NAMED_SCOPE, [PkgLen, NameString, ByteData, WordData, TermList]),
    op!(ThermalZone, "ThermalZone", NAMED_SCOPE, [PkgLen, NameString, TermList]),
    op!(IndexField, "IndexField", NAMED_DEFER, [PkgLen, NameString, NameString, ByteData, FieldList]),
    op!(BankField, "BankField", NAMED_DEFER, [PkgLen, NameString, NameString, StrictTermArg, ByteData, FieldList]),
    op!(DataRegion, "DataTableRegion", NAMED_EXEC, [NameString, StrictTermArg, StrictTermArg, StrictTermArg]),
    op!(IntScopeBlock, "ScopeBlock", SCOPE, []),
    op!(IntNamePath, "NamePath", NONE, []),
    op!(IntNamePathOrMethodCall, "NamePathOrMethodCall", NONE, []),
    op!(IntMethodCall, "MethodCall", EXEC, []),
    op!(IntByteList, "ByteList", NONE, []),
    op!(IntReservedField, "ReservedField", NONE, []),
    op!(IntAccessField, "AccessField", NONE, []),
    op!(IntConnection, "Connection", NONE, []),
    op!(IntNamedField, "NamedField", NAMED, []),
];

const fn build_index(extended: bool) -> [u8; 256] {
    let mut index = [0u8; 256];
    let mut i = 0;
    while i < OPCODE_TABLE.len() {
        let code = OPCODE_TABLE[i].opcode as u16;
        if !extended && code <= 0xFF {
            index[code as usize] = (i + 1) as u8;
        } else if extended && (code >> 8) == EXT_OP_PREFIX as u16 {
            index[(code & 0xFF) as usize] = (i + 1) as u8;
        }
        i += 1;
    }
    index
}

static BASIC_INDEX: [u8; 256] = build_index(false);
static EXT_INDEX: [u8; 256] = build_index(true);

/// Look up a single-byte opcode read from the stream.
pub fn lookup(primary: u8) -> Option<&'static OpcodeInfo> {
    match BASIC_INDEX[primary as usize] {
        0 => None,
        slot => Some(&OPCODE_TABLE[slot as usize - 1]),
    }
}

/// Look up the second byte of a `0x5B`-prefixed opcode.
pub fn lookup_extended(ext: u8) -> Option<&'static OpcodeInfo> {
    match EXT_INDEX[ext as usize] {
        0 => None,
        slot => Some(&OPCODE_TABLE[slot as usize - 1]),
    }
}

impl Opcode {
    /// The table entry for this opcode.
    pub fn info(self) -> &'static OpcodeInfo {
        match OPCODE_TABLE.iter().find(|info| info.opcode == self) {
            Some(info) => info,
            // Every variant has a table entry; a miss is a table bug.
            None => unreachable!(),
        }
    }

    pub fn is(self, flags: OpcodeFlags) -> bool {
        self.info().is(flags)
    }
}
