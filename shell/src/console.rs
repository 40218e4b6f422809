//! Trace console over the debug serial port.
//!
//! Diagnostics only; the user-facing overlay is the frontend's problem.
//! There is a single control flow in the firmware, so the writer simply
//! borrows the façade.  No statics, no locking.

use crate::hif::Hif;
use core::fmt;

pub struct Writer<'a, H: Hif> {
    hif: &'a mut H,
}

impl<'a, H: Hif> Writer<'a, H> {
    pub fn new(hif: &'a mut H) -> Writer<'a, H> {
        Writer { hif }
    }
}

impl<H: Hif> fmt::Write for Writer<'_, H> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            if b == b'\n' {
                self.hif.trace_byte(b'\r');
            }
            self.hif.trace_byte(b);
        }
        Ok(())
    }
}

pub fn write<H: Hif>(hif: &mut H, args: fmt::Arguments) {
    use core::fmt::Write;
    // The trace port cannot fail.
    let _ = Writer::new(hif).write_fmt(args);
}

#[macro_export]
macro_rules! trace {
    ($hif:expr, $($arg:tt)*) => {
        $crate::console::write($hif, core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! traceln {
    ($hif:expr) => ($crate::trace!($hif, "\n"));
    ($hif:expr, $($arg:tt)*) => {
        $crate::console::write($hif, core::format_args!("{}\n", core::format_args!($($arg)*)))
    };
}
