//! User-facing status lines.
//!
//! All status output goes to stderr; stdout carries only the JSON document.

use console::{Emoji, StyledObject, style};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

static QUIET: AtomicBool = AtomicBool::new(false);
static VERBOSITY: AtomicU8 = AtomicU8::new(0);

pub static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "OK ");
pub static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "!! ");
pub static ERROR: Emoji<'_, '_> = Emoji("❌ ", "ERR ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");

/// Suppress everything except errors.
pub fn set_quiet(quiet: bool) {
    QUIET.store(quiet, Ordering::SeqCst);
}

pub fn is_quiet() -> bool {
    QUIET.load(Ordering::SeqCst)
}

/// 0 is normal output; 1 and above also print [`verbose`] lines.
pub fn set_verbosity(level: u8) {
    VERBOSITY.store(level, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSITY.load(Ordering::SeqCst) >= 1
}

pub fn success(msg: &str) {
    status(Some(&SUCCESS), style(msg).green());
}

pub fn warning(msg: &str) {
    status(Some(&WARNING), style(msg).yellow());
}

pub fn info(msg: &str) {
    status(Some(&INFO), style(msg).cyan());
}

/// Shown only with `--verbose`.
pub fn verbose(msg: &str) {
    if is_verbose() {
        status(None, style(msg).dim());
    }
}

/// Never suppressed, even in quiet mode.
pub fn error(msg: &str) {
    eprintln!("{} {}", ERROR, style(msg).red().bold());
}

fn status(prefix: Option<&Emoji<'_, '_>>, msg: StyledObject<&str>) {
    if is_quiet() {
        return;
    }
    match prefix {
        Some(prefix) => eprintln!("{} {}", prefix, msg),
        None => eprintln!("{}", msg),
    }
}
