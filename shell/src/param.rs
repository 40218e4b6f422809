#![allow(dead_code)]

/// Number of virtual drives the hardware exposes.
pub const NDRIVES: usize = 4;

/// Words per selector window.  One window covers 4 KiB of image data
/// (byte-per-word devices) or 8 KiB of packed DRAM/BRAM data.
pub const WIN_WORDS: usize = 4096;

/// Bytes written back to the SD card per flush-engine iteration.
/// One value for all drives for now.
pub const ITER_SIZE: usize = 100;

/// Quiet period after the last core write before a flush may begin.
/// Enforced by hardware; kept here because tests and documentation
/// reference it.  One value for all drives for now.
pub const ANTI_THRASH_MS: u32 = 2000;

/// Upper bound on a single drive request, and the size of the bounce
/// buffer used while moving bytes between the image buffer and the
/// drive's internal buffer.
pub const XFER_MAX: usize = 4096;
pub const XFER_CHUNK: usize = 512;

/// Cycle-counter rate of the soft CPU clock.
pub const CYCLES_PER_MS: u32 = 50_000;

/// Keypress debounce.
pub const DEBOUNCE_MS: u32 = 333;

/// Settle time after releasing the SD controller from reset.
pub const SD_SETTLE_MS: u32 = 50;

/// Partition the FAT32 driver mounts.
pub const SD_PARTITION: u8 = 1;

/// Longest image pathname the registry stores.
pub const MAXPATH: usize = 256;

/// Menu items persisted to the config file, one byte each.
pub const NMENU: usize = 32;

/// Pathname of the configuration persistence file.
pub const CONFIG_PATH: &[u8] = b"/core.cfg";

/// CRT container geometry.  Banks are fixed 8 KiB; a CHIP packet is a
/// 16-byte header plus one bank, so consecutive banks sit 0x1008 words
/// apart in DRAM.
pub const CRT_SIGNATURE: [u8; 16] = *b"C64 CARTRIDGE   ";
pub const CHIP_SIGNATURE: [u8; 4] = *b"CHIP";
pub const CRT_MIN_LEN: u32 = 0x40;
pub const BANK_BYTES: usize = 8192;
pub const BANK_WORDS: u32 = 4096;
pub const BANK_STRIDE_WORDS: u32 = 0x1008;
pub const BANK_BURST_BYTES: usize = 256;

/// Deadline for the cartridge hardware to leave its busy state.
pub const CRT_HW_TIMEOUT_MS: u32 = 1000;
