//! Dialect-independent SQL utilities.
//!
//! Engine-specific syntax lives with each driver (`drivers/*/dialect.rs`);
//! this module holds what every dialect shares.
//!
//! - [`lexer`]: literal and comment boundaries
//! - [`placeholder`]: canonical `?` marker translation
//! - [`statement`]: result-set classification

pub mod lexer;
pub mod placeholder;
pub mod statement;

pub use placeholder::translate;
pub use statement::returns_rows;
