//! Mediation firmware for an FPGA-emulated retro computer.
//!
//! The soft-processor running this code sits between the emulated core,
//! the user and the SD card: it mounts disk images into memory-mapped
//! image buffers, services the core's read/write requests against those
//! buffers with a deferred write-back cache, parses CRT cartridge
//! containers out of HyperRAM, and persists configuration bits.  There is
//! exactly one control flow; every operation returns to the main loop
//! promptly and all cross-component state lives in the [`shell::Shell`]
//! context.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(test, allow(dead_code))]
#![forbid(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod console;
pub mod crt;
pub mod dispatch;
pub mod flush;
pub mod hif;
pub mod mmap;
pub mod param;
pub mod sdcard;
pub mod shell;
pub mod vdrive;

use core::result;

use crate::sdcard::DiskError;

pub type Result<T> = result::Result<T, Error>;

/// Unrecoverable failures.  The code is published to the cartridge
/// status register on the way down so the hardware side can display it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fatal {
    FlushSeek,
    FlushWrite,
    FlushSync,
    ConfigCorrupt,
    BufferOverrun,
}

impl Fatal {
    pub fn code(self) -> u16 {
        let low = match self {
            Fatal::FlushSeek => 1,
            Fatal::FlushWrite => 2,
            Fatal::FlushSync => 3,
            Fatal::ConfigCorrupt => 4,
            Fatal::BufferOverrun => 5,
        };
        0xEE00 | low
    }
}

/// Firmware-level errors.
///
/// `Mount` and `ImageLoad` are recoverable: the user is prompted to retry
/// the card, or returned to the file browser with the drive unmounted.
/// `Fatal` is routed through the main loop's single halt path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Error {
    /// SD card not present or the card-level mount failed.
    Mount(DiskError),
    /// The image file could not be opened or read during a drive mount.
    ImageLoad(DiskError),
    Fatal(Fatal),
}

impl From<Fatal> for Error {
    fn from(f: Fatal) -> Error {
        Error::Fatal(f)
    }
}

#[cfg(all(target_os = "none", not(test)))]
mod runtime {
    use core::panic::PanicInfo;

    #[panic_handler]
    fn panic(_info: &PanicInfo) -> ! {
        #[allow(clippy::empty_loop)]
        loop {}
    }
}
