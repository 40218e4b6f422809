//! The memory map: device selectors, register word offsets and CSR bits.
//!
//! Everything the firmware touches by number lives here.  Image-buffer
//! devices carry one byte per 16-bit word (the low octet), so a 4-KiB
//! byte window is exactly one selector window.  The HyperRAM window and
//! the two cartridge BRAMs pack two bytes per word, little-endian within
//! the word.

#![allow(dead_code)]

use crate::param;
use bitflags::bitflags;
use static_assertions::const_assert;

// Device selectors on the shared RAM/ROM window bus.
pub const DEV_DRIVE_BASE: u16 = 0x0100; // + drive number: request register file
pub const DEV_IMAGE_BASE: u16 = 0x0200; // + drive number: linear image buffer
pub const DEV_DRAM: u16 = 0x0300; // HyperRAM window (CRT container)
pub const DEV_BRAM_LO: u16 = 0x0310; // 8 KiB cartridge LO bank
pub const DEV_BRAM_HI: u16 = 0x0311; // 8 KiB cartridge HI bank
pub const DEV_CART: u16 = 0x0320; // cartridge status/control register file
pub const DEV_CONFIG: u16 = 0x0330; // configuration bits the core samples

pub const fn drive_regs(n: usize) -> u16 {
    DEV_DRIVE_BASE + n as u16
}

pub const fn drive_image(n: usize) -> u16 {
    DEV_IMAGE_BASE + n as u16
}

// An 8 KiB bank fits one packed window.
const_assert!(param::BANK_BYTES / 2 == param::WIN_WORDS);

/// Per-drive request register file, word offsets within window 0.
pub mod drive {
    pub const SD_RD: u16 = 0x00; // core read request pending
    pub const SD_WR: u16 = 0x01; // core write request pending
    pub const ACK: u16 = 0x02;
    pub const LBA_LO: u16 = 0x03;
    pub const LBA_HI: u16 = 0x04;
    pub const BLKCNT: u16 = 0x05;
    pub const BYTES_LO: u16 = 0x06; // byte-granular start in the image buffer
    pub const BYTES_HI: u16 = 0x07;
    pub const SIZE_BYTES: u16 = 0x08;
    pub const WIN4K: u16 = 0x09; // same start, decomposed
    pub const OFF4K: u16 = 0x0A;
    pub const BUF_ADDR: u16 = 0x0B; // internal-buffer port
    pub const BUF_DOUT: u16 = 0x0C;
    pub const BUF_DIN: u16 = 0x0D;
    pub const BUF_WREN: u16 = 0x0E;
    pub const MOUNT: u16 = 0x10; // core latches the auxiliaries on the rising edge
    pub const IMG_SIZE_LO: u16 = 0x11;
    pub const IMG_SIZE_HI: u16 = 0x12;
    pub const RO: u16 = 0x13;
    pub const TYPE: u16 = 0x14;
    pub const CACHE_READY: u16 = 0x15; // quiet period elapsed since the last write
}

/// Cartridge status/control register file, word offsets within window 0.
pub mod cart {
    pub const STATUS: u16 = 0x00;
    pub const FSIZE_LO: u16 = 0x01;
    pub const FSIZE_HI: u16 = 0x02;
    pub const ADDR_LO: u16 = 0x03; // DRAM start address in 16-word units
    pub const ADDR_HI: u16 = 0x04;
    pub const HW_ERR: u16 = 0x05; // 0xFFFF = busy, 0 = none
    pub const DIAG0: u16 = 0x06;
    pub const DIAG1: u16 = 0x07;
    pub const ID: u16 = 0x08;
    pub const EXROM: u16 = 0x09;
    pub const GAME: u16 = 0x0A;
    pub const BANK_ADDR: u16 = 0x0B; // bank-table write port
    pub const BANK_SIZE: u16 = 0x0C;
    pub const BANK_NUM: u16 = 0x0D;
    pub const BANK_OFF_LO: u16 = 0x0E;
    pub const BANK_OFF_HI: u16 = 0x0F;
    pub const BANK_STROBE: u16 = 0x10;
    pub const BANK_LO_REQ: u16 = 0x11; // driven by the core
    pub const BANK_HI_REQ: u16 = 0x12;
    pub const ERR_CODE: u16 = 0x13; // firmware-reported error code

    pub const ST_IDLE: u16 = 0;
    pub const ST_LOADING: u16 = 1;
    pub const ST_ERROR: u16 = 2;
    pub const ST_OK: u16 = 3;

    pub const HW_BUSY: u16 = 0xFFFF;
}

/// Configuration bits register file: `NMENU` bits packed 16 per word,
/// lowest item in bit 0 of the first word.
pub mod config {
    pub const BITS0: u16 = 0x00;
}

bitflags! {
    /// The control/status register at a fixed address outside the
    /// windowed bus.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Csr: u16 {
        const RESET = 1;
        const KBD_ATTACH = 1 << 1;
        const JOY_ATTACH = 1 << 2;
        const UNPAUSE = 1 << 3;
        /// Which SD slot the controller is currently using.
        const SD_ACTIVE = 1 << 4;
    }
}

/// Fixed peripheral addresses for the memory-mapped façade.
pub mod mmio {
    pub const CSR: usize = 0xF000_0000;
    pub const DEV_SEL: usize = 0xF000_0002;
    pub const WIN_SEL: usize = 0xF000_0004;
    pub const CYC_MID: usize = 0xF000_0006;
    pub const CYC_HI: usize = 0xF000_0008;
    pub const KBD: usize = 0xF000_000A;
    pub const TRACE: usize = 0xF000_000C;
    pub const DATA_WIN: usize = 0xF001_0000; // 4096 words
}
