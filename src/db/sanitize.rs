//! SQL sanitization for names that cannot be bound as statement parameters.
//!
//! Database and collection names and index paths end up inside DDL
//! (`CREATE INDEX ... WHERE collection = '...'`), so they are checked here
//! before any statement is built.

use thiserror::Error;

/// Maximum length for identifiers (collection names, field names)
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Maximum length for string literals embedded in DDL
pub const MAX_STRING_VALUE_LENGTH: usize = 65535;

/// SQL sanitization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlSanitizeError {
  #[error("Identifier cannot be empty")]
  EmptyIdentifier,
  #[error("Identifier too long: {0} > {max}", max = MAX_IDENTIFIER_LENGTH)]
  IdentifierTooLong(usize),
  #[error("Identifier must start with letter or underscore, got '{0}'")]
  InvalidIdentifierStart(char),
  #[error("Invalid character in identifier: '{0}'")]
  InvalidIdentifierChar(char),
  #[error("Collection names must be lowercase alphanumeric, got '{0}'")]
  InvalidCollectionChar(char),
  #[error("Invalid field path: {0}")]
  InvalidFieldPath(String),
  #[error("'{0}' is a reserved SQL keyword")]
  ReservedKeyword(String),
  #[error("String too long: {0} > {max}", max = MAX_STRING_VALUE_LENGTH)]
  StringTooLong(usize),
  #[error("Null bytes not allowed in strings")]
  NullByteInString,
}

/// Validates that a string is a safe SQL identifier or dotted field path.
/// Only allows alphanumeric characters, underscores, and dots (for nested fields).
pub fn validate_identifier(s: &str) -> Result<(), SqlSanitizeError> {
  check_start(s)?;

  for c in s.chars() {
    if !c.is_ascii_alphanumeric() && c != '_' && c != '.' {
      return Err(SqlSanitizeError::InvalidIdentifierChar(c));
    }
  }

  check_keyword(s)?;

  // Prevent double dots or leading/trailing dots
  if s.starts_with('.') || s.ends_with('.') || s.contains("..") {
    return Err(SqlSanitizeError::InvalidFieldPath(s.to_string()));
  }

  Ok(())
}

/// Validates a database or collection name. No dots, lowercase alphanumeric + underscore.
pub fn validate_collection_name(s: &str) -> Result<(), SqlSanitizeError> {
  check_start(s)?;

  for c in s.chars() {
    if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '_' {
      return Err(SqlSanitizeError::InvalidCollectionChar(c));
    }
  }

  check_keyword(s)
}

/// Escapes a string value for inclusion in a single-quoted SQL literal.
pub fn escape_string(s: &str) -> Result<String, SqlSanitizeError> {
  if s.len() > MAX_STRING_VALUE_LENGTH {
    return Err(SqlSanitizeError::StringTooLong(s.len()));
  }

  let mut escaped = String::with_capacity(s.len() + 10);
  for c in s.chars() {
    match c {
      '\'' => escaped.push_str("''"),
      '\0' => return Err(SqlSanitizeError::NullByteInString),
      _ => escaped.push(c),
    }
  }
  Ok(escaped)
}

/// Turns an index name into something usable as a SQL object name
pub fn index_object_name(parts: &[&str]) -> Result<String, SqlSanitizeError> {
  let name = parts.join("_").replace('.', "_");
  validate_identifier(&name)?;
  Ok(name)
}

fn check_start(s: &str) -> Result<(), SqlSanitizeError> {
  let Some(first) = s.chars().next() else {
    return Err(SqlSanitizeError::EmptyIdentifier);
  };

  if s.len() > MAX_IDENTIFIER_LENGTH {
    return Err(SqlSanitizeError::IdentifierTooLong(s.len()));
  }

  if !first.is_ascii_alphabetic() && first != '_' {
    return Err(SqlSanitizeError::InvalidIdentifierStart(first));
  }
  Ok(())
}

fn check_keyword(s: &str) -> Result<(), SqlSanitizeError> {
  let upper = s.to_uppercase();
  if SQL_KEYWORDS.contains(&upper.as_str()) {
    return Err(SqlSanitizeError::ReservedKeyword(s.to_string()));
  }
  Ok(())
}

/// Common SQL keywords that cannot be used as identifiers
const SQL_KEYWORDS: &[&str] = &[
  "SELECT",
  "INSERT",
  "UPDATE",
  "DELETE",
  "DROP",
  "CREATE",
  "ALTER",
  "TABLE",
  "INDEX",
  "FROM",
  "WHERE",
  "AND",
  "OR",
  "NOT",
  "NULL",
  "TRUE",
  "FALSE",
  "ORDER",
  "BY",
  "ASC",
  "DESC",
  "LIMIT",
  "OFFSET",
  "JOIN",
  "ON",
  "AS",
  "IN",
  "LIKE",
  "IS",
  "UNION",
  "ALL",
  "GROUP",
  "HAVING",
  "INTO",
  "VALUES",
  "SET",
  "PRIMARY",
  "KEY",
  "UNIQUE",
  "DEFAULT",
  "TRIGGER",
  "VIEW",
  "DATABASE",
  "SCHEMA",
  "BEGIN",
  "END",
  "TRANSACTION",
];
