use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Console step reporting for the setup and teardown phases.
pub struct ProgressTracker {
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn step(&mut self, message: &str) {
        println!("{} {}", "•".blue(), message.bold());
    }

    pub fn substep(&mut self, message: &str) {
        println!("  {} {}", "◦".cyan(), message);
    }

    pub fn success(&mut self, message: &str) {
        println!("{} {}", "✓".green(), message.green().bold());
    }

    pub fn warning(&mut self, message: &str) {
        println!("{} {}", "⚠".yellow(), message.yellow());
    }

    pub fn print_elapsed(&self) {
        println!(
            "{} Completed in {:.2}s",
            "⏱".blue(),
            self.start_time.elapsed().as_secs_f64()
        );
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub fn print_header(title: &str) {
    println!("\n{}", "=".repeat(60).blue());
    println!("{}", format!("  {}", title).blue().bold());
    println!("{}", "=".repeat(60).blue());
}

/// Spinner ticking over streamed records.
pub fn records_spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.blue} {prefix:<12} {msg:>10} {elapsed_precise}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    bar.set_prefix("Processing:");
    bar
}
