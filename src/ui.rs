use anyhow::{Context, Result};
use colored::Colorize;
use declarative::ToDo;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Ask a yes/no question on the terminal
pub fn confirm(prompt: &str, default: bool) -> Result<bool> {
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .context("Failed to read confirmation")
}

/// Marker shown in front of a planned change
pub fn todo_marker(todo: ToDo) -> String {
    match todo {
        ToDo::Install => "+".green().to_string(),
        ToDo::Uninstall => "-".red().to_string(),
        ToDo::Reinstall => "~".yellow().to_string(),
        ToDo::Noop => " ".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_todo_markers_differ() {
        colored::control::set_override(false);
        assert_eq!(todo_marker(ToDo::Install), "+");
        assert_eq!(todo_marker(ToDo::Uninstall), "-");
        assert_eq!(todo_marker(ToDo::Reinstall), "~");
    }
}
