//! The injection engine.
//!
//! One injection is a full stop → select → flip → resume cycle:
//!
//! 1. parse the request and locate the process
//! 2. stop it and wait (bounded) for the stop to be confirmed
//! 3. pick register and bit, falling back to random values
//! 4. attach, flip the bit, detach, and record the injection
//! 5. resume the process, even when the flip failed
//!
//! ## Example
//!
//! ```ignore
//! use kfi_core::{Injector, InjectorConfig, LinuxProcessControl};
//!
//! let injector = Injector::new(LinuxProcessControl::new()?, InjectorConfig::default());
//! injector.inject("4321 5 3")?;
//! println!("{}", injector.report());
//! ```

use std::sync::{Mutex, PoisonError};

use rand::RngCore;
use rand::rngs::OsRng;
use tracing::{debug, error, info};

use crate::config::InjectorConfig;
use crate::error::{Error, Result};
use crate::mutator;
use crate::process::ProcessControl;
use crate::record::{InjectionRecord, LastInjection};
use crate::registers::RegisterTable;
use crate::request::{InjectionRequest, MAX_REQUEST_LEN};
use crate::resume;
use crate::selector::FaultSelector;
use crate::suspend::SuspensionController;

pub struct Injector<C, R = OsRng> {
    control: C,
    table: &'static RegisterTable,
    suspension: SuspensionController,
    selector: Mutex<FaultSelector<R>>,
    last: LastInjection,
    /// Held for a whole injection; concurrent callers queue.
    in_flight: Mutex<()>,
}

impl<C: ProcessControl> Injector<C, OsRng> {
    pub fn new(control: C, config: InjectorConfig) -> Self {
        Self::with_selector(control, config, FaultSelector::new())
    }
}

impl<C: ProcessControl, R: RngCore> Injector<C, R> {
    /// Create an injector drawing random selections from `rng`.
    pub fn with_rng(control: C, config: InjectorConfig, rng: R) -> Self {
        Self::with_selector(control, config, FaultSelector::with_rng(rng))
    }

    fn with_selector(control: C, config: InjectorConfig, selector: FaultSelector<R>) -> Self {
        let table = RegisterTable::for_arch(control.arch());
        debug!(
            "Injector for {} ({} registers, {}-bit words), stop timeout {:?}",
            table.arch(),
            table.reg_count(),
            table.word_bits(),
            config.stop_timeout()
        );
        Self {
            control,
            table,
            suspension: SuspensionController::from_config(&config),
            selector: Mutex::new(selector),
            last: LastInjection::new(table),
            in_flight: Mutex::new(()),
        }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn table(&self) -> &'static RegisterTable {
        self.table
    }

    /// Inject from a raw text request. Returns the number of bytes consumed.
    pub fn inject(&self, raw: &str) -> Result<usize> {
        if raw.len() > MAX_REQUEST_LEN {
            error!(
                "Request of {} bytes exceeds the {} byte limit",
                raw.len(),
                MAX_REQUEST_LEN
            );
            return Err(Error::MalformedInput(format!(
                "request longer than {MAX_REQUEST_LEN} bytes"
            )));
        }
        let request = InjectionRequest::parse(raw).inspect_err(|e| error!("{}", e))?;
        self.inject_request(&request)?;
        Ok(raw.len())
    }

    /// Run one injection for an already parsed request.
    pub fn inject_request(&self, request: &InjectionRequest) -> Result<InjectionRecord> {
        let _guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let pid = request.pid;

        self.control
            .locate(pid)
            .inspect_err(|e| error!("Cannot inject into process {}: {}", pid, e))?;

        let suspended = self.suspension.suspend(&self.control, pid)?;
        debug!("Process {} stopped after {:?}", pid, suspended.waited());

        let selection = self
            .selector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .select(self.table, request.register, request.bit);
        let target = selection.target;
        debug!(
            "Selected register {}{} bit {}{}",
            target.register,
            if selection.random_register { " (random)" } else { "" },
            target.bit,
            if selection.random_bit { " (random)" } else { "" },
        );

        let mutation = match mutator::flip_bit(&self.control, &suspended, target) {
            Ok(m) => m,
            Err(e) => {
                error!("Failed to flip bit in process {}: {}", pid, e);
                return Err(resume::resume_after_failure(&self.control, suspended, e));
            }
        };

        let record = InjectionRecord {
            pid,
            register: mutation.target.register,
            register_name: self.table.name(mutation.target.register).unwrap_or("?"),
            bit: mutation.target.bit,
        };
        self.last.store(record);
        info!(
            "pid {} reg {} bit {}",
            record.pid, record.register_name, record.bit
        );

        resume::resume(&self.control, suspended, Some(record))?;
        Ok(record)
    }

    /// The last injection as `Injected process <pid>, register <name>, bit <bit>`.
    pub fn report(&self) -> String {
        self.last.load().to_string()
    }

    pub fn last_injection(&self) -> InjectionRecord {
        self.last.load()
    }
}
