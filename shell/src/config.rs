//! Configuration persistence.
//!
//! The menu's option bits live in two places: a hardware register file
//! the core samples continuously, and a small file on the SD card, one
//! byte per menu item.  A first byte of 0xFF marks an unprogrammed
//! file: defaults apply and the file is rewritten on the first save.
//! Any other byte outside {0, 1} means the file is corrupt, which is
//! fatal rather than guessed around.

use crate::hif::Hif;
use crate::mmap::{self, config as reg};
use crate::param;
use crate::sdcard::{DiskError, Fat32};
use crate::{Fatal, Result};

pub struct Config {
    bits: [bool; param::NMENU],
    /// Cleared when the active SD slot no longer matches the one the
    /// settings were read from, or when no config file exists.
    persist: bool,
    /// The file was unprogrammed; write defaults out on first save.
    rewrite: bool,
}

impl Config {
    pub const fn new() -> Config {
        Config {
            bits: [false; param::NMENU],
            persist: true,
            rewrite: false,
        }
    }

    pub fn bit(&self, item: usize) -> bool {
        self.bits[item]
    }

    pub fn set_bit(&mut self, item: usize, value: bool) {
        self.bits[item] = value;
    }

    pub fn persist(&self) -> bool {
        self.persist
    }

    pub fn set_persist(&mut self, on: bool) {
        self.persist = on;
    }

    /// The file was found unprogrammed; the frontend may want to save
    /// early to stamp the defaults in.
    pub fn needs_rewrite(&self) -> bool {
        self.rewrite
    }

    /// Read the config file.  A missing file or an unreadable card is
    /// not an error: defaults apply and persistence is disabled for
    /// the session.  A present-but-corrupt file is fatal.
    pub fn load<F: Fat32>(&mut self, fs: &mut F) -> Result<()> {
        self.bits = [false; param::NMENU];
        let handle = match fs.open(param::CONFIG_PATH) {
            Ok(h) => h,
            Err(_) => {
                self.persist = false;
                return Ok(());
            }
        };

        let first = fs.read_byte(handle).unwrap_or(None);
        match first {
            Some(0xFF) => {
                // Unprogrammed: keep defaults, rewrite on first save.
                self.rewrite = true;
                fs.close(handle);
                return Ok(());
            }
            Some(b) => {
                if let Err(e) = self.accept(0, b) {
                    fs.close(handle);
                    return Err(e);
                }
            }
            None => {
                fs.close(handle);
                return Err(Fatal::ConfigCorrupt.into());
            }
        }

        for item in 1..param::NMENU {
            match fs.read_byte(handle).unwrap_or(None) {
                Some(b) => {
                    if let Err(e) = self.accept(item, b) {
                        fs.close(handle);
                        return Err(e);
                    }
                }
                None => {
                    fs.close(handle);
                    return Err(Fatal::ConfigCorrupt.into());
                }
            }
        }
        fs.close(handle);
        Ok(())
    }

    fn accept(&mut self, item: usize, byte: u8) -> Result<()> {
        match byte {
            0 => self.bits[item] = false,
            1 => self.bits[item] = true,
            _ => return Err(Fatal::ConfigCorrupt.into()),
        }
        Ok(())
    }

    /// Write all menu bytes back, lowest bit first.  A no-op while
    /// persistence is disabled.
    pub fn save<F: Fat32>(&mut self, fs: &mut F) -> core::result::Result<(), DiskError> {
        if !self.persist {
            return Ok(());
        }
        let handle = fs.open(param::CONFIG_PATH)?;
        let r = self.save_to(fs, handle);
        fs.close(handle);
        if r.is_ok() {
            self.rewrite = false;
        }
        r
    }

    fn save_to<F: Fat32>(
        &self,
        fs: &mut F,
        handle: crate::sdcard::Handle,
    ) -> core::result::Result<(), DiskError> {
        fs.seek(handle, 0, 0)?;
        for &bit in self.bits.iter() {
            fs.write_byte(handle, bit as u8)?;
        }
        fs.flush(handle)
    }

    /// Latch the current bits into the register file the core samples.
    pub fn publish<H: Hif>(&self, hif: &mut H) {
        hif.select(mmap::DEV_CONFIG, 0);
        for (word, bits) in self.bits.chunks(16).enumerate() {
            let mut value = 0u16;
            for (i, &b) in bits.iter().enumerate() {
                if b {
                    value |= 1 << i;
                }
            }
            hif.poke(reg::BITS0 + word as u16, value);
        }
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}
