// Text output for the command line: one key per line, indented one space per level.
use std::io::Write;

use chrono::DateTime;

use crate::reg::{ByteSource, Filetime, KeyNode, Result, TreeWalker};

/// `Last modification time: ...` in ctime layout, UTC.
pub fn modification_line(modified: Filetime) -> String {
    match DateTime::from_timestamp(modified.to_unix(), 0) {
        Some(dt) => format!(
            "Last modification time: {}",
            dt.format("%a %b %e %H:%M:%S %Y")
        ),
        None => format!("Last modification time: unrepresentable ({:#x})", modified.0),
    }
}

/// Writes `root` and everything below it in pre-order, returning the number of keys written.
///
/// With `verbose`, every line carries the full key node description instead of the name.
pub fn write_tree<S: ByteSource, W: Write>(
    walker: &mut TreeWalker<S>,
    root: KeyNode,
    out: &mut W,
    verbose: bool,
) -> Result<usize> {
    let mut written = 0;
    for item in walker.walk(root) {
        let (depth, node) = item?;
        if verbose {
            writeln!(out, "{:depth$}{node}", "")?;
        } else {
            writeln!(out, "{:depth$}{}", "", node.name)?;
        }
        written += 1;
    }
    Ok(written)
}
