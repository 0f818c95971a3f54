//! 32-bit instruction words.
//!
//! Layout (most significant bit first):
//!
//! ```text
//!  31      26 25      18 17       9 8        0
//! [  opcode  ][    A    ][    B    ][    C    ]
//!                       [         Bx          ]
//! ```
//!
//! `B` and `C` are 9 bits wide; bit 8 set means "constant index" rather than
//! register. `sBx` is `Bx` biased by [`SBX_MAX`].

use core::fmt;

const IOP_POS: u32 = 26;
const IRA_POS: u32 = 18;
const IRKB_POS: u32 = 9;
const IRKC_POS: u32 = 0;

const IOP_MASK: u32 = 0x3F;
const IRA_MASK: u32 = 0xFF;
const IRK_MASK: u32 = 0x1FF;
const IBX_MASK: u32 = 0x3_FFFF;

/// Constant flag in a `B`/`C` operand.
pub const K_FLAG: u32 = 0x100;
/// Index bits of a `B`/`C` operand.
pub const KR_MASK: u32 = 0xFF;
/// Bias of the signed `sBx` operand.
pub const SBX_MAX: i32 = (1 << 17) - 1;

macro_rules! opcodes {
    ($($name:ident = $text:literal),* $(,)?) => {
        /// Opcodes, in runtime order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum Opcode { $($name),* }

        const ALL: &[Opcode] = &[$(Opcode::$name),*];

        impl Opcode {
            /// Mnemonic as printed by the disassembler.
            pub const fn name(self) -> &'static str {
                match self { $(Opcode::$name => $text),* }
            }
        }
    };
}

opcodes! {
    Add = "ADD", Sub = "SUB", Mul = "MUL", Div = "DIV", Mod = "MOD",
    Lt = "LT", Le = "LE", Eq = "EQ", Ne = "NE", Gt = "GT", Ge = "GE",
    And = "AND", Or = "OR", Xor = "XOR", Shl = "SHL", Shr = "SHR",
    Connect = "CONNECT", Neg = "NEG", Flip = "FLIP",
    LdNil = "LDNIL", LdBool = "LDBOOL", LdInt = "LDINT", LdConst = "LDCONST",
    Move = "MOVE", GetGbl = "GETGBL", SetGbl = "SETGBL", GetUpv = "GETUPV", SetUpv = "SETUPV",
    Jmp = "JMP", JmpT = "JMPT", JmpF = "JMPF", Call = "CALL", Ret = "RET", Closure = "CLOSURE",
    GetMbr = "GETMBR", GetMet = "GETMET", SetMbr = "SETMBR", GetIdx = "GETIDX", SetIdx = "SETIDX",
    SetSuper = "SETSUPER", Close = "CLOSE", Import = "IMPORT", ExBlk = "EXBLK", Catch = "CATCH",
    Raise = "RAISE", Class = "CLASS", GetNGbl = "GETNGBL", SetNGbl = "SETNGBL",
}

impl Opcode {
    /// Decodes a 6-bit opcode field.
    pub fn from_u8(v: u8) -> Option<Self> { ALL.get(usize::from(v)).copied() }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

/// One instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    /// `op A B C`
    pub const fn abc(op: Opcode, a: u32, b: u32, c: u32) -> Self {
        Self(
            ((op as u32 & IOP_MASK) << IOP_POS)
                | ((a & IRA_MASK) << IRA_POS)
                | ((b & IRK_MASK) << IRKB_POS)
                | ((c & IRK_MASK) << IRKC_POS),
        )
    }

    /// `op A Bx`
    pub const fn abx(op: Opcode, a: u32, bx: u32) -> Self {
        Self(((op as u32 & IOP_MASK) << IOP_POS) | ((a & IRA_MASK) << IRA_POS) | (bx & IBX_MASK))
    }

    /// `op A sBx`
    pub const fn asbx(op: Opcode, a: u32, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + SBX_MAX) as u32)
    }

    /// Raw word.
    pub const fn raw(self) -> u32 { self.0 }

    /// Raw opcode field.
    pub const fn op_bits(self) -> u8 { ((self.0 >> IOP_POS) & IOP_MASK) as u8 }

    /// Decoded opcode, `None` if out of range.
    pub fn op(self) -> Option<Opcode> { Opcode::from_u8(self.op_bits()) }

    /// `A` operand.
    pub const fn a(self) -> u32 { (self.0 >> IRA_POS) & IRA_MASK }

    /// `B` operand (with constant flag).
    pub const fn b(self) -> u32 { (self.0 >> IRKB_POS) & IRK_MASK }

    /// `C` operand (with constant flag).
    pub const fn c(self) -> u32 { (self.0 >> IRKC_POS) & IRK_MASK }

    /// `Bx` operand.
    pub const fn bx(self) -> u32 { self.0 & IBX_MASK }

    /// `sBx` operand.
    pub const fn sbx(self) -> i32 { self.bx() as i32 - SBX_MAX }

    /// Global slot read or written by `GETGBL`/`SETGBL`.
    pub fn global_slot(self) -> Option<u32> {
        matches!(self.op(), Some(Opcode::GetGbl | Opcode::SetGbl)).then(|| self.bx())
    }
}

/// True if a `B`/`C` operand designates a constant.
pub const fn is_k(v: u32) -> bool { v & K_FLAG != 0 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_numbering() {
        assert_eq!(Opcode::Add as u8, 0);
        assert_eq!(Opcode::GetGbl as u8, 24);
        assert_eq!(Opcode::SetGbl as u8, 25);
        assert_eq!(Opcode::SetNGbl as u8, 47);
        assert_eq!(Opcode::from_u8(47), Some(Opcode::SetNGbl));
        assert_eq!(Opcode::from_u8(48), None);
    }

    #[test]
    fn fields_decode() {
        let i = Instruction::abc(Opcode::Add, 3, K_FLAG | 7, 2);
        assert_eq!(i.op(), Some(Opcode::Add));
        assert_eq!((i.a(), i.b(), i.c()), (3, 0x107, 2));
        assert!(is_k(i.b()) && !is_k(i.c()));

        let g = Instruction::abx(Opcode::GetGbl, 1, 42);
        assert_eq!(g.raw(), 0x6004_002A);
        assert_eq!(g.global_slot(), Some(42));
        assert_eq!(Instruction::abx(Opcode::LdConst, 1, 42).global_slot(), None);
    }

    #[test]
    fn signed_offsets() {
        let j = Instruction::asbx(Opcode::Jmp, 0, -3);
        assert_eq!(j.sbx(), -3);
        assert_eq!(Instruction::asbx(Opcode::LdInt, 2, 100).sbx(), 100);
    }
}
