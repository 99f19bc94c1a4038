//! Single injection command.

use std::borrow::Cow;

use anyhow::Result;
use kfi_core::{InjectorConfig, RegisterTable};

/// Translate a register name such as `rax` to its table index.
///
/// Anything that is not a known name is passed through for the parser.
#[cfg_attr(
    not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86"))),
    allow(dead_code)
)]
fn resolve_register<'a>(table: &RegisterTable, field: &'a str) -> Cow<'a, str> {
    match table.index_of(field) {
        Some(index) => Cow::Owned(index.to_string()),
        None => Cow::Borrowed(field),
    }
}

/// Join the positional fields back into a request line.
///
/// The engine's parser handles bases and out-of-range values, so the CLI
/// passes the fields through untouched.
fn request_line(pid: &str, register: Option<&str>, bit: Option<&str>) -> String {
    [Some(pid), register, bit]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86")))]
pub fn run(
    config: &InjectorConfig,
    pid: &str,
    register: Option<&str>,
    bit: Option<&str>,
) -> Result<()> {
    use anyhow::Context;
    use kfi_core::{Error, Injector, LinuxProcessControl};
    use tracing::debug;

    let injector = Injector::new(LinuxProcessControl::new()?, config.clone());
    let register = register.map(|r| resolve_register(injector.table(), r));
    let raw = request_line(pid, register.as_deref(), bit);
    debug!("Request line: {:?}", raw);

    match injector.inject(&raw) {
        Ok(_) => {
            println!("{}", injector.report());
            Ok(())
        }
        Err(e @ Error::ResumeFailed { pid, injected, .. }) => {
            if let Some(record) = injected {
                eprintln!("{record}");
            }
            eprintln!("WARNING: process {pid} is left stopped, resume it with `kill -CONT {pid}`");
            Err(e.into())
        }
        Err(e) => Err(e).context("Injection failed"),
    }
}

#[cfg(not(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "x86"))))]
pub fn run(
    _config: &InjectorConfig,
    pid: &str,
    register: Option<&str>,
    bit: Option<&str>,
) -> Result<()> {
    anyhow::bail!(
        "Injection ('{}') is only supported on Linux x86 and x86_64",
        request_line(pid, register, bit)
    )
}
