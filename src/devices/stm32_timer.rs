//! STM32F4 general-purpose timer (the TIM2..TIM5 class)
//!
//! Nineteen word-sized registers in a 0x2000 MMIO window, an update
//! interrupt driven by a deadline on the virtual clock, and one
//! recognized PWM configuration that only produces a diagnostic line.
//! Reads and writes are serialised with the update handler by the
//! machine lock; nothing here needs its own locking, but the re-arm
//! after an update must use the register values the handler sees, not
//! a snapshot from arming time.
//!
//! The counter is synthesized, not stored: `tick_offset` holds the
//! wrapping-negated tick reading at the last counter re-init, so a CNT
//! read is `tick_offset + now_ticks`, the elapsed ticks since re-init.
//! A guest write to CNT lands in the register (and in snapshots) but
//! the next read synthesizes again.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guest_error;

use super::clock::{AlarmTimer, VirtualClock};
use super::irq::IrqLine;

/// Size of the MMIO window
pub const MMIO_SIZE: u64 = 0x2000;

pub const TIM_CR1: u64 = 0x00;
pub const TIM_CR2: u64 = 0x04;
pub const TIM_SMCR: u64 = 0x08;
pub const TIM_DIER: u64 = 0x0c;
pub const TIM_SR: u64 = 0x10;
pub const TIM_EGR: u64 = 0x14;
pub const TIM_CCMR1: u64 = 0x18;
pub const TIM_CCMR2: u64 = 0x1c;
pub const TIM_CCER: u64 = 0x20;
pub const TIM_CNT: u64 = 0x24;
pub const TIM_PSC: u64 = 0x28;
pub const TIM_ARR: u64 = 0x2c;
pub const TIM_CCR1: u64 = 0x34;
pub const TIM_CCR2: u64 = 0x38;
pub const TIM_CCR3: u64 = 0x3c;
pub const TIM_CCR4: u64 = 0x40;
pub const TIM_DCR: u64 = 0x48;
pub const TIM_DMAR: u64 = 0x4c;
pub const TIM_OR: u64 = 0x50;

/// TIM_CR1 counter enable
pub const TIM_CR1_CEN: u32 = 1;
/// TIM_DIER update interrupt enable
pub const TIM_DIER_UIE: u32 = 1;
/// TIM_SR update interrupt flag
pub const TIM_SR_UIF: u32 = 1;
/// TIM_EGR update generation
pub const TIM_EGR_UG: u32 = 1;

// Channel-2 output-compare configuration bits
pub const TIM_CCMR1_OC2M2: u32 = 0x4000;
pub const TIM_CCMR1_OC2M1: u32 = 0x2000;
pub const TIM_CCMR1_OC2M0: u32 = 0x1000;
pub const TIM_CCMR1_OC2PE: u32 = 0x800;
pub const TIM_CCER_CC2E: u32 = 0x10;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Default)]
pub struct Stm32Timer {
    cr1: u32,
    cr2: u32,
    smcr: u32,
    dier: u32,
    sr: u32,
    egr: u32,
    ccmr1: u32,
    ccmr2: u32,
    ccer: u32,
    cnt: u32,
    psc: u32,
    arr: u32,
    ccr1: u32,
    ccr2: u32,
    ccr3: u32,
    ccr4: u32,
    dcr: u32,
    dmar: u32,
    or_reg: u32,
    tick_offset: u32,
    timer: AlarmTimer,
    pub irq: IrqLine,
}

impl Stm32Timer {
    pub fn new(clock: &VirtualClock) -> Self {
        let mut timer = Self::default();
        timer.reinit_counter(clock);
        timer
    }

    /// Re-seed the counter base so CNT counts from zero at the current
    /// virtual time
    fn reinit_counter(&mut self, clock: &VirtualClock) {
        self.tick_offset = (clock.now_ticks() as u32).wrapping_neg();
    }

    /// Elapsed ticks since the last counter re-init
    fn counter(&self, clock: &VirtualClock) -> u32 {
        self.tick_offset.wrapping_add(clock.now_ticks() as u32)
    }

    /// Device reset: registers clear and the counter re-inits. Runs at
    /// machine reset and on a TIM_EGR.UG write.
    pub fn reset(&mut self, clock: &VirtualClock) {
        self.cr1 = 0;
        self.cr2 = 0;
        self.smcr = 0;
        self.dier = 0;
        self.sr = 0;
        self.egr = 0;
        self.ccmr1 = 0;
        self.ccmr2 = 0;
        self.ccer = 0;
        self.cnt = 0;
        self.psc = 0;
        self.arr = 0;
        self.ccr1 = 0;
        self.ccr2 = 0;
        self.ccr3 = 0;
        self.ccr4 = 0;
        self.dcr = 0;
        self.dmar = 0;
        self.or_reg = 0;
        self.reinit_counter(clock);
    }

    /// MMIO read; bad offsets warn and read as zero
    pub fn read(&mut self, clock: &VirtualClock, offset: u64) -> u32 {
        match offset {
            TIM_CR1 => self.cr1,
            TIM_CR2 => self.cr2,
            TIM_SMCR => self.smcr,
            TIM_DIER => self.dier,
            TIM_SR => self.sr,
            TIM_EGR => self.egr,
            TIM_CCMR1 => self.ccmr1,
            TIM_CCMR2 => self.ccmr2,
            TIM_CCER => self.ccer,
            TIM_CNT => {
                self.cnt = self.counter(clock);
                self.cnt
            }
            TIM_PSC => self.psc,
            TIM_ARR => self.arr,
            TIM_CCR1 => self.ccr1,
            TIM_CCR2 => self.ccr2,
            TIM_CCR3 => self.ccr3,
            TIM_CCR4 => self.ccr4,
            TIM_DCR => self.dcr,
            TIM_DMAR => self.dmar,
            TIM_OR => self.or_reg,
            _ => {
                guest_error!("stm32 timer: bad read offset 0x{offset:x}");
                0
            }
        }
    }

    /// MMIO write; bad offsets warn and are discarded
    pub fn write(&mut self, clock: &VirtualClock, offset: u64, value: u32) {
        match offset {
            TIM_CR1 => {
                self.cr1 = value;
                if value & TIM_CR1_CEN != 0 {
                    self.set_alarm(clock);
                }
            }
            TIM_CR2 => self.cr2 = value,
            TIM_SMCR => self.smcr = value,
            TIM_DIER => self.dier = value,
            TIM_SR => {
                // Set by hardware, cleared by software
                self.sr &= value;
            }
            TIM_EGR => {
                self.egr = value;
                if value & TIM_EGR_UG != 0 {
                    // Re-init the counter
                    self.reset(clock);
                    self.set_alarm(clock);
                }
            }
            TIM_CCMR1 => self.ccmr1 = value,
            TIM_CCMR2 => self.ccmr2 = value,
            TIM_CCER => self.ccer = value,
            TIM_CNT => {
                self.cnt = value;
                self.set_alarm(clock);
            }
            TIM_PSC => self.psc = value,
            TIM_ARR => {
                self.arr = value;
                self.set_alarm(clock);
            }
            TIM_CCR1 => self.ccr1 = value,
            TIM_CCR2 => self.ccr2 = value,
            TIM_CCR3 => self.ccr3 = value,
            TIM_CCR4 => self.ccr4 = value,
            TIM_DCR => self.dcr = value,
            TIM_DMAR => self.dmar = value,
            TIM_OR => self.or_reg = value,
            _ => guest_error!("stm32 timer: bad write offset 0x{offset:x}"),
        }
    }

    /// Recompute the update deadline. A deadline of right now fires the
    /// handler synchronously.
    fn set_alarm(&mut self, clock: &VirtualClock) {
        let elapsed = self.counter(clock) as i64;
        let ticks = (self.arr as i64 - elapsed * (self.psc as i64 + 1)) as u32;
        if ticks == 0 {
            self.timer.cancel();
            self.interrupt(clock);
        } else {
            self.timer.modify(clock.now_ns() + ticks as i64);
        }
    }

    /// Update handler, run when the armed deadline is reached
    fn interrupt(&mut self, clock: &VirtualClock) {
        if self.dier & TIM_DIER_UIE != 0 && self.cr1 & TIM_CR1_CEN != 0 {
            self.sr |= TIM_SR_UIF;
            self.irq.pulse();
            // The counter restarts at the update event; with an empty
            // period there is nothing to re-arm
            self.reinit_counter(clock);
            if self.arr != 0 {
                self.set_alarm(clock);
            }
        }

        if let Some(duty) = self.pwm_duty_percent() {
            // PWM 2 - Mode 1
            eprintln!("stm32 timer: duty cycle: {duty}%");
        }
    }

    /// Run the update handler if the armed deadline has been reached.
    /// The machine calls this after advancing virtual time; returns
    /// whether the handler ran.
    pub fn poll(&mut self, clock: &VirtualClock) -> bool {
        if self.timer.expired(clock.now_ns()) {
            self.timer.cancel();
            self.interrupt(clock);
            true
        } else {
            false
        }
    }

    /// The armed update deadline, if any
    pub fn deadline_ns(&self) -> Option<i64> {
        self.timer.deadline_ns()
    }

    /// Duty cycle of the one recognized PWM configuration: channel 2
    /// in PWM mode 1 with preload enabled and the channel-2 output on
    pub fn pwm_duty_percent(&self) -> Option<u32> {
        if self.ccmr1 & (TIM_CCMR1_OC2M2 + TIM_CCMR1_OC2M1) != 0
            && self.ccmr1 & TIM_CCMR1_OC2M0 == 0
            && self.ccmr1 & TIM_CCMR1_OC2PE != 0
            && self.ccer & TIM_CCER_CC2E != 0
        {
            Some(self.ccr2 / (100 * (self.psc + 1)))
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            version: SNAPSHOT_VERSION,
            tick_offset: self.tick_offset,
            cr1: self.cr1,
            cr2: self.cr2,
            smcr: self.smcr,
            dier: self.dier,
            sr: self.sr,
            egr: self.egr,
            ccmr1: self.ccmr1,
            ccmr2: self.ccmr2,
            ccer: self.ccer,
            cnt: self.cnt,
            psc: self.psc,
            arr: self.arr,
            ccr1: self.ccr1,
            ccr2: self.ccr2,
            ccr3: self.ccr3,
            ccr4: self.ccr4,
            dcr: self.dcr,
            dmar: self.dmar,
            or_reg: self.or_reg,
        }
    }

    pub fn restore(&mut self, snapshot: &TimerSnapshot) -> Result<(), RestoreError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RestoreError::UnsupportedVersion(snapshot.version));
        }
        self.tick_offset = snapshot.tick_offset;
        self.cr1 = snapshot.cr1;
        self.cr2 = snapshot.cr2;
        self.smcr = snapshot.smcr;
        self.dier = snapshot.dier;
        self.sr = snapshot.sr;
        self.egr = snapshot.egr;
        self.ccmr1 = snapshot.ccmr1;
        self.ccmr2 = snapshot.ccmr2;
        self.ccer = snapshot.ccer;
        self.cnt = snapshot.cnt;
        self.psc = snapshot.psc;
        self.arr = snapshot.arr;
        self.ccr1 = snapshot.ccr1;
        self.ccr2 = snapshot.ccr2;
        self.ccr3 = snapshot.ccr3;
        self.ccr4 = snapshot.ccr4;
        self.dcr = snapshot.dcr;
        self.dmar = snapshot.dmar;
        self.or_reg = snapshot.or_reg;
        Ok(())
    }
}

/// Persisted device state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub version: u32,
    pub tick_offset: u32,
    pub cr1: u32,
    pub cr2: u32,
    pub smcr: u32,
    pub dier: u32,
    pub sr: u32,
    pub egr: u32,
    pub ccmr1: u32,
    pub ccmr2: u32,
    pub ccer: u32,
    pub cnt: u32,
    pub psc: u32,
    pub arr: u32,
    pub ccr1: u32,
    pub ccr2: u32,
    pub ccr3: u32,
    pub ccr4: u32,
    pub dcr: u32,
    pub dmar: u32,
    pub or_reg: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("unsupported timer snapshot version {0}")]
    UnsupportedVersion(u32),
}
