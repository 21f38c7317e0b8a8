//! Terminal output helpers

use colored::Colorize;

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a `label: value` pair with the label highlighted
pub fn print_field(label: &str, value: &str) {
    println!("{} {}", format!("{:<12}", format!("{label}:")).bold(), value);
}

/// Turn colouring off for everything printed through `colored`
pub fn disable_color() {
    colored::control::set_override(false);
}
