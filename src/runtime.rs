//! Host functions that compiled code can reach through `extern`.

use std::io::{self, Write};

pub type NativeFn = extern "C" fn(f64) -> f64;

/// Writes the byte `x` to stderr.
pub extern "C" fn putchard(x: f64) -> f64 {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    let _ = out.write_all(&[x as u8]);
    let _ = out.flush();
    0.0
}

/// Writes `x` and a newline to stderr.
pub extern "C" fn printd(x: f64) -> f64 {
    eprintln!("{}", x);
    0.0
}

const BUILTINS: &[(&str, NativeFn)] = &[("putchard", putchard), ("printd", printd)];

pub fn builtins() -> &'static [(&'static str, NativeFn)] {
    BUILTINS
}
