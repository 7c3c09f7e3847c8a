//! One-line status output

use super::context::UiContext;
use console::style;

pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("✓").green(), message);
    } else {
        println!("[OK] {}", message);
    }
}

pub fn step_info(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("•").cyan(), message);
    } else {
        println!("[INFO] {}", message);
    }
}

/// Warning followed by what to do about it
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_fancy_output() {
        println!("{} {} - {}", style("!").yellow(), message, style(hint).dim());
    } else {
        println!("[WARN] {} - {}", message, hint);
    }
}

pub fn step_error(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}", style("✗").red(), message);
    } else {
        println!("[FAIL] {}", message);
    }
}

pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_fancy_output() {
        println!("{} {}: {}", style("✗").red(), message, style(detail).red());
    } else {
        println!("[FAIL] {}: {}", message, detail);
    }
}
