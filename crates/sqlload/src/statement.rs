//! Statement and phase types for the partitioned loader.
//!
//! A dump is executed in three strictly ordered phases. Each classified
//! statement carries the phase it belongs to; statements whose leading
//! keyword matches none of the three kinds never enter the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution phase, which doubles as the statement kind.
///
/// Variant order is execution order: all DROPs commit before any CREATE
/// runs, and all CREATEs before any INSERT.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Drop,
    Create,
    Insert,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 3] = [Phase::Drop, Phase::Create, Phase::Insert];

    /// Positional index of this phase (0-based, execution order).
    pub fn index(self) -> usize {
        match self {
            Phase::Drop => 0,
            Phase::Create => 1,
            Phase::Insert => 2,
        }
    }

    /// Classify a statement by its leading keyword, case-insensitively.
    ///
    /// Returns `None` for anything that is not a DROP/CREATE/INSERT
    /// statement; such statements are discarded by the classifier.
    pub fn of_statement(text: &str) -> Option<Phase> {
        let token: &str = {
            let trimmed = text.trim_start();
            let end = trimmed
                .char_indices()
                .find(|(_, c)| !c.is_ascii_alphabetic())
                .map(|(i, _)| i)
                .unwrap_or(trimmed.len());
            &trimmed[..end]
        };
        if token.eq_ignore_ascii_case("drop") {
            Some(Phase::Drop)
        } else if token.eq_ignore_ascii_case("create") {
            Some(Phase::Create)
        } else if token.eq_ignore_ascii_case("insert") {
            Some(Phase::Insert)
        } else {
            None
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Drop => write!(f, "drop"),
            Phase::Create => write!(f, "create"),
            Phase::Insert => write!(f, "insert"),
        }
    }
}

/// One classified SQL statement. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub phase: Phase,
    pub text: String,
}

impl Statement {
    pub fn new(phase: Phase, text: String) -> Self {
        Self { phase, text }
    }

    /// Statement text truncated for log lines.
    pub fn preview(&self) -> &str {
        let mut end = self.text.len().min(256);
        while !self.text.is_char_boundary(end) {
            end -= 1;
        }
        &self.text[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_leading_keyword_case_insensitively() {
        assert_eq!(Phase::of_statement("DROP TABLE foo;"), Some(Phase::Drop));
        assert_eq!(Phase::of_statement("drop table foo;"), Some(Phase::Drop));
        assert_eq!(
            Phase::of_statement("Create Table foo(id int);"),
            Some(Phase::Create)
        );
        assert_eq!(
            Phase::of_statement("iNsErT INTO foo VALUES(1);"),
            Some(Phase::Insert)
        );
    }

    #[test]
    fn ignores_leading_whitespace() {
        assert_eq!(
            Phase::of_statement("  \tINSERT INTO t VALUES(1);"),
            Some(Phase::Insert)
        );
    }

    #[test]
    fn rejects_other_keywords() {
        assert_eq!(Phase::of_statement("SELECT * FROM foo;"), None);
        assert_eq!(Phase::of_statement("ALTER TABLE foo ADD c int;"), None);
        assert_eq!(Phase::of_statement("-- comment"), None);
        assert_eq!(Phase::of_statement(";"), None);
        assert_eq!(Phase::of_statement(""), None);
    }

    #[test]
    fn rejects_keyword_prefixes_of_longer_words() {
        assert_eq!(Phase::of_statement("DROPPED TABLE foo;"), None);
        assert_eq!(Phase::of_statement("INSERTED INTO foo;"), None);
    }

    #[test]
    fn phase_order_is_drop_create_insert() {
        assert!(Phase::Drop < Phase::Create);
        assert!(Phase::Create < Phase::Insert);
        assert_eq!(Phase::ALL.map(Phase::index), [0, 1, 2]);
    }

    #[test]
    fn preview_clamps_long_statements_on_char_boundaries() {
        let text = format!("INSERT INTO t VALUES('{}');", "é".repeat(300));
        let stmt = Statement::new(Phase::Insert, text);
        assert!(stmt.preview().len() <= 256);
        assert!(stmt.text.starts_with(stmt.preview()));
    }
}
