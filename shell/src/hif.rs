//! Hardware I/O façade.
//!
//! A thin, synchronous layer over the four memory-mapped peripherals:
//! the CSR, the paged RAM/ROM window, the 32-bit cycle counter and the
//! keyboard matrix.  The selector bus is shared by every component, so
//! callers must treat [`Hif::select`] as a prelude to each access group
//! and never assume a previous selection survived a call into another
//! component.

use crate::mmap::Csr;
use crate::param;

pub trait Hif {
    /// Latch the device and 4-KiB-window selectors.  All subsequent
    /// window accesses address the selected device until the next call.
    fn select(&mut self, dev: u16, window: u16);

    /// Read one word from the active window.  `offset` is 0..4095.
    fn peek(&mut self, offset: u16) -> u16;

    /// Write one word into the active window.
    fn poke(&mut self, offset: u16, word: u16);

    fn csr(&mut self) -> Csr;
    fn set_csr(&mut self, csr: Csr);

    /// Monotonic cycle counter, wrapping at 2^32.
    fn cycles(&mut self) -> u32;

    /// Snapshot of the keyboard matrix.
    fn keys(&mut self) -> u16;

    /// Emit one byte on the trace/debug serial port.
    fn trace_byte(&mut self, b: u8);
}

/// Run `f` with the given device/window selected.  The selector is not
/// restored afterwards; the next access group re-selects.
pub fn with_device<H: Hif, T>(hif: &mut H, dev: u16, window: u16, f: impl FnOnce(&mut H) -> T) -> T {
    hif.select(dev, window);
    f(hif)
}

/// A point on the wrapping cycle counter.  Comparison is by wrapping
/// subtraction, never signed arithmetic, so deadlines survive the 2^32
/// rollover.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    target: u32,
}

impl Deadline {
    pub fn after_ms<H: Hif>(hif: &mut H, ms: u32) -> Deadline {
        let now = hif.cycles();
        Deadline {
            target: now.wrapping_add(ms.saturating_mul(param::CYCLES_PER_MS)),
        }
    }

    pub fn is_elapsed(&self, now: u32) -> bool {
        // `now` at or past `target`, modulo wrap.
        now.wrapping_sub(self.target) < 0x8000_0000
    }
}

/// Coarse busy wait on the cycle counter.
pub fn wait_ms<H: Hif>(hif: &mut H, ms: u32) {
    let deadline = Deadline::after_ms(hif, ms);
    loop {
        let now = hif.cycles();
        if deadline.is_elapsed(now) {
            return;
        }
    }
}

/// The memory-mapped implementation used on the soft CPU.
pub mod mmio {
    use super::Hif;
    use crate::mmap::{self, Csr};

    // Private helper functions.
    mod volatile {
        use core::ptr;

        pub fn write(addr: usize, v: u16) {
            unsafe {
                ptr::write_volatile(addr as *mut u16, v);
            }
        }

        pub fn read(addr: usize) -> u16 {
            unsafe { ptr::read_volatile(addr as *const u16) }
        }
    }

    pub struct Mmio {
        _private: (),
    }

    impl Mmio {
        /// # Safety
        ///
        /// The caller asserts that the peripherals of `mmap::mmio` are
        /// present at their documented addresses and that no other owner
        /// of the selector bus exists.
        pub const unsafe fn new() -> Mmio {
            Mmio { _private: () }
        }
    }

    impl Hif for Mmio {
        fn select(&mut self, dev: u16, window: u16) {
            volatile::write(mmap::mmio::DEV_SEL, dev);
            volatile::write(mmap::mmio::WIN_SEL, window);
        }

        fn peek(&mut self, offset: u16) -> u16 {
            debug_assert!((offset as usize) < crate::param::WIN_WORDS);
            volatile::read(mmap::mmio::DATA_WIN + offset as usize * 2)
        }

        fn poke(&mut self, offset: u16, word: u16) {
            debug_assert!((offset as usize) < crate::param::WIN_WORDS);
            volatile::write(mmap::mmio::DATA_WIN + offset as usize * 2, word);
        }

        fn csr(&mut self) -> Csr {
            Csr::from_bits_truncate(volatile::read(mmap::mmio::CSR))
        }

        fn set_csr(&mut self, csr: Csr) {
            volatile::write(mmap::mmio::CSR, csr.bits());
        }

        fn cycles(&mut self) -> u32 {
            // The mid word must be read first; the counter latches the
            // high half on that access.
            let mid = volatile::read(mmap::mmio::CYC_MID) as u32;
            let hi = volatile::read(mmap::mmio::CYC_HI) as u32;
            (hi << 16).wrapping_add(mid)
        }

        fn keys(&mut self) -> u16 {
            volatile::read(mmap::mmio::KBD)
        }

        fn trace_byte(&mut self, b: u8) {
            volatile::write(mmap::mmio::TRACE, b as u16);
        }
    }
}
