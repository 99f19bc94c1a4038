//! Print the register table.

use anyhow::{Result, bail};
use kfi_core::{Arch, RegisterTable};

pub fn run(arch: Option<Arch>) -> Result<()> {
    let Some(arch) = arch.or_else(Arch::host) else {
        bail!(
            "No register table for {}, pass --arch",
            std::env::consts::ARCH
        );
    };
    print!("{}", format_table(RegisterTable::for_arch(arch)));
    Ok(())
}

fn format_table(table: &RegisterTable) -> String {
    let mut out = format!(
        "{} registers ({}, {}-bit words)\n",
        table.reg_count(),
        table.arch(),
        table.word_bits()
    );
    for (index, name) in table.names() {
        out.push_str(&format!("{index:>3}  {name}\n"));
    }
    out
}
