//! The owning context and the cooperative main loop.
//!
//! `Shell` owns every piece of firmware state: the hardware façade, the
//! FAT32 client, the drive registry, the cartridge loader and the
//! configuration bits.  Component operations borrow the fields they
//! need; nothing is global, nothing is locked.

use crate::config::Config;
use crate::crt::Loader;
use crate::dispatch::{self, SdState};
use crate::hif::{self, Hif};
use crate::mmap::{self, cart, Csr};
use crate::param;
use crate::sdcard::{DiskError, Fat32};
use crate::vdrive::{self, Drive};
use crate::{traceln, Error, Fatal, Result};
use core::array;

/// The out-of-scope collaborator driving menus, the file browser and
/// key handling.  Called once per loop pass, after the dispatcher.
pub trait Frontend<H: Hif, F: Fat32> {
    fn tick(&mut self, shell: &mut Shell<H, F>);
}

pub struct Shell<H: Hif, F: Fat32> {
    pub hif: H,
    pub fs: F,
    pub drives: [Drive; param::NDRIVES],
    pub crt: Loader,
    pub config: Config,
    pub sd: SdState,
}

impl<H: Hif, F: Fat32> Shell<H, F> {
    pub fn new(hif: H, fs: F) -> Shell<H, F> {
        Shell {
            hif,
            fs,
            drives: array::from_fn(Drive::new),
            crt: Loader::new(),
            config: Config::new(),
            sd: SdState::new(false),
        }
    }

    /// Bring the card and the settings up.  Called once before the
    /// loop; `run` retries the card-level mount until it succeeds.
    pub fn init(&mut self) -> Result<()> {
        hif::wait_ms(&mut self.hif, param::SD_SETTLE_MS);
        self.fs
            .card_mount(param::SD_PARTITION)
            .map_err(Error::Mount)?;
        let slot = self.hif.csr().contains(Csr::SD_ACTIVE);
        self.sd = SdState::new(slot);
        self.config.load(&mut self.fs)?;
        self.config.publish(&mut self.hif);
        Ok(())
    }

    /// One cooperative pass: dispatcher sweeps, then cartridge
    /// housekeeping.
    pub fn poll(&mut self) -> Result<()> {
        dispatch::poll(
            &mut self.hif,
            &mut self.fs,
            &mut self.sd,
            &mut self.config,
            &mut self.drives,
        )?;
        self.crt.service(&mut self.hif);
        Ok(())
    }

    pub fn drive(&self, n: usize) -> &Drive {
        &self.drives[n]
    }

    pub fn drive_mut(&mut self, n: usize) -> &mut Drive {
        &mut self.drives[n]
    }

    pub fn mount(&mut self, n: usize, path: &[u8], read_only: bool) -> Result<()> {
        vdrive::mount(
            &mut self.hif,
            &mut self.fs,
            &mut self.sd,
            &mut self.drives[n],
            path,
            read_only,
        )
    }

    pub fn unmount(&mut self, n: usize) -> Result<()> {
        vdrive::unmount(&mut self.hif, &mut self.fs, &mut self.drives[n])
    }

    /// Hand a cartridge container that has been streamed to DRAM over
    /// to the loader.
    pub fn start_cartridge(&mut self, dram_addr_16w: u32, file_len: u32) {
        self.crt.start(&mut self.hif, dram_addr_16w, file_len);
    }

    pub fn set_menu_bit(&mut self, item: usize, value: bool) {
        self.config.set_bit(item, value);
        self.config.publish(&mut self.hif);
    }

    pub fn save_config(&mut self) -> core::result::Result<(), DiskError> {
        if self.sd.changed {
            // Never write settings across a hot-swap.
            return Ok(());
        }
        self.config.save(&mut self.fs)
    }

    /// Reset path for the cartridge loader.
    pub fn reset_cartridge(&mut self) {
        self.crt.reset(&mut self.hif);
    }

    /// The main loop: dispatcher pass, frontend tick (key scan, menu),
    /// cartridge housekeeping.  Never returns; fatal errors funnel into
    /// the single halt path.
    pub fn run(mut self, frontend: &mut dyn Frontend<H, F>) -> ! {
        loop {
            match self.init() {
                Ok(()) => break,
                Err(Error::Fatal(f)) => self.halt(f),
                Err(_) => {
                    traceln!(&mut self.hif, "sd card not ready, retrying");
                    hif::wait_ms(&mut self.hif, param::SD_SETTLE_MS);
                }
            }
        }
        loop {
            if let Err(Error::Fatal(f)) = dispatch::poll(
                &mut self.hif,
                &mut self.fs,
                &mut self.sd,
                &mut self.config,
                &mut self.drives,
            ) {
                self.halt(f);
            }
            frontend.tick(&mut self);
            self.crt.service(&mut self.hif);
        }
    }

    /// Publish the fatal code for the hardware side to display, then
    /// stop.  Presentation belongs to the frontend; all that is left
    /// here is to be loud and inert.
    fn halt(&mut self, fatal: Fatal) -> ! {
        self.hif.select(mmap::DEV_CART, 0);
        self.hif.poke(cart::ERR_CODE, fatal.code());
        self.hif.poke(cart::STATUS, cart::ST_ERROR);
        traceln!(&mut self.hif, "fatal: {:?} ({:#06x})", fatal, fatal.code());
        #[allow(clippy::empty_loop)]
        loop {}
    }
}
