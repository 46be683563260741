//! RISC-V Compressed (C) Extension Constants, RV32FC quadrant layout.
//!
//! Compressed instructions are divided into three quadrants based on the low two bits of the
//! 16-bit word. Several `funct3` slots carry different mnemonics on RV32 than on RV64C/RV128C
//! (the D-extension-only and `*w`-suffixed forms do not exist in RV32 at all); the names here
//! reflect what RV32FC actually assigns each slot.

/// Quadrant 0 (bits 1:0 = 00).
pub const QUADRANT_0: u16 = 0b00;
/// Quadrant 1 (bits 1:0 = 01).
pub const QUADRANT_1: u16 = 0b01;
/// Quadrant 2 (bits 1:0 = 10).
pub const QUADRANT_2: u16 = 0b10;

/// `funct3` (bits 15:13) values within quadrant 0.
pub mod q0 {
    /// `addi rd', x2, nzuimm` (C.ADDI4SPN).
    pub const C_ADDI4SPN: u16 = 0b000;
    /// Reserved in RV32FC (C.FLD is a D-extension-only form).
    pub const RESERVED_FLD: u16 = 0b001;
    /// `lw rd', offset(rs1')` (C.LW).
    pub const C_LW: u16 = 0b010;
    /// `flw rd', offset(rs1')` (C.FLW) — the RV32FC use of the slot RV64C spends on C.LD.
    pub const C_FLW: u16 = 0b011;
    /// Reserved in RV32FC (C.FSD is a D-extension-only form).
    pub const RESERVED_FSD: u16 = 0b101;
    /// `sw rs2', offset(rs1')` (C.SW).
    pub const C_SW: u16 = 0b110;
    /// `fsw rs2', offset(rs1')` (C.FSW) — the RV32FC use of the slot RV64C spends on C.SD.
    pub const C_FSW: u16 = 0b111;
}

/// `funct3` values within quadrant 1.
pub mod q1 {
    /// `addi rd, rd, nzimm` / `c.nop` when `rd = x0, imm = 0` (C.ADDI).
    pub const C_ADDI: u16 = 0b000;
    /// `jal x1, offset` (C.JAL) — RV32-only; RV64C uses this slot for C.ADDIW, which does not
    /// exist on RV32 since there is no `addiw`/32-bit-register-width concept to narrow from.
    pub const C_JAL: u16 = 0b001;
    /// `addi rd, x0, imm` (C.LI).
    pub const C_LI: u16 = 0b010;
    /// `lui rd, nzimm` or, when `rd = x2`, `addi x2, x2, nzimm` (C.LUI / C.ADDI16SP).
    pub const C_LUI_ADDI16SP: u16 = 0b011;
    /// Miscellaneous ALU operations (C.SRLI, C.SRAI, C.ANDI, C.SUB, C.XOR, C.OR, C.AND).
    pub const C_MISC_ALU: u16 = 0b100;
    /// `jal x0, offset` (C.J).
    pub const C_J: u16 = 0b101;
    /// `beq rs1', x0, offset` (C.BEQZ).
    pub const C_BEQZ: u16 = 0b110;
    /// `bne rs1', x0, offset` (C.BNEZ).
    pub const C_BNEZ: u16 = 0b111;
}

/// `funct3` values within quadrant 2.
pub mod q2 {
    /// `slli rd, rd, shamt` (C.SLLI).
    pub const C_SLLI: u16 = 0b000;
    /// Reserved in RV32FC (C.FLDSP is a D-extension-only form).
    pub const RESERVED_FLDSP: u16 = 0b001;
    /// `lw rd, offset(x2)` (C.LWSP).
    pub const C_LWSP: u16 = 0b010;
    /// `flw rd, offset(x2)` (C.FLWSP) — the RV32FC use of the slot RV64C spends on C.LDSP.
    pub const C_FLWSP: u16 = 0b011;
    /// C.JR / C.MV / C.EBREAK / C.JALR / C.ADD, disambiguated by bit 12 and the `rs2` field.
    pub const C_MISC_ALU: u16 = 0b100;
    /// Reserved in RV32FC (C.FSDSP is a D-extension-only form).
    pub const RESERVED_FSDSP: u16 = 0b101;
    /// `sw rs2, offset(x2)` (C.SWSP).
    pub const C_SWSP: u16 = 0b110;
    /// `fsw rs2, offset(x2)` (C.FSWSP) — the RV32FC use of the slot RV64C spends on C.SDSP.
    pub const C_FSWSP: u16 = 0b111;
}
