//! Printing of rendered outcomes.

use std::io::{self, Write};

use anyhow::Result;

use crate::command::Rendered;

/// Pretty-print the outcome document followed by a newline.
pub(crate) fn write_rendered<W: Write>(out: &mut W, rendered: &Rendered) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, &rendered.body)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

pub(crate) fn print(rendered: &Rendered) -> Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    write_rendered(&mut lock, rendered)
}
