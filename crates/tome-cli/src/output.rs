//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use tome_core::{Annotation, Book};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Check if output is JSON
    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single book with full details
    pub fn print_book(&self, book: &Book) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", book.id);
                println!("Title:   {}", book.title);
                println!("Author:  {}", book.author);
                println!("Format:  {}", book.format.as_str());
                println!("Status:  {}", book.status.as_str());
                println!("Page:    {}", format_position(book));
                println!("Added:   {}", book.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated: {}", book.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(book).unwrap());
            }
            OutputFormat::Quiet => {
                println!("{}", book.id);
            }
        }
    }

    /// Print a list of books
    pub fn print_books(&self, books: &[Book]) {
        match self.format {
            OutputFormat::Human => {
                if books.is_empty() {
                    println!("No books in the library.");
                    return;
                }
                for book in books {
                    println!(
                        "{} | {} | {} | {} | {}",
                        &book.id[..8.min(book.id.len())],
                        truncate(&book.title, 35),
                        truncate(&book.author, 25),
                        book.status.as_str(),
                        format_position(book)
                    );
                }
                println!("\n{} book(s)", books.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(books).unwrap());
            }
            OutputFormat::Quiet => {
                for book in books {
                    println!("{}", book.id);
                }
            }
        }
    }

    /// Print annotations of a book
    pub fn print_annotations(&self, book: &Book, annotations: &[Annotation]) {
        match self.format {
            OutputFormat::Human => {
                println!(
                    "Annotations for: {} - {}",
                    &book.id[..8.min(book.id.len())],
                    book.title
                );
                println!();

                if annotations.is_empty() {
                    println!("No annotations on this book.");
                    return;
                }

                for annotation in annotations {
                    println!("────────────────────────────────────────");
                    println!(
                        "ID: {}  Kind: {}  Created: {}",
                        &annotation.id.to_string()[..8],
                        annotation.kind.as_str(),
                        annotation.created_at.format("%Y-%m-%d %H:%M")
                    );
                    println!();
                    println!("{}", annotation.text);
                    if let Some(ref note) = annotation.note {
                        println!();
                        println!("Note: {}", note);
                    }
                    println!();
                }
                println!("{} annotation(s)", annotations.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(annotations).unwrap());
            }
            OutputFormat::Quiet => {
                for annotation in annotations {
                    println!("{}", annotation.id);
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Render the reading position of a book
fn format_position(book: &Book) -> String {
    match (book.current_page, book.total_pages) {
        (0, _) => "-".to_string(),
        (page, 0) => page.to_string(),
        (page, total) => format!("{}/{}", page, total),
    }
}

/// Truncate a string to max length in characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
