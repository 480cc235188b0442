//! Crate-wide error types.
//!
//! Each variant corresponds to one of the error kinds named in the
//! error-handling design: conversion failures, store corruption, spatial
//! index corruption, format parsing, stylesheet parsing, configuration and
//! underlying I/O failures.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
  #[error("point ({x}, {y}) lies outside the valid domain of the conversion")]
  OutOfDomain { x: f64, y: f64 },
  #[error("conversion produced a non-finite result")]
  NonFinite,
  #[error("failed to initialize projection {proj}: {reason}")]
  ProjInit { proj: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("object {0} not found")]
  MissingId(u32),
  #[error("record for id {0} is corrupt: {1}")]
  CorruptRecord(u32, String),
  #[error("writer conflict on id {0}")]
  WriterConflict(u32),
  #[error("object has no geometry")]
  EmptyObject,
  #[error("id {0} is reserved for metadata (0..=99)")]
  ReservedId(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
  #[error("corrupt geohash entry for prefix {0:?}")]
  CorruptEntry(String),
}

#[derive(Debug, thiserror::Error)]
#[error("{file}:{line}: {message}")]
pub struct FormatError {
  pub file: PathBuf,
  pub line: usize,
  pub message: String,
}

impl FormatError {
  #[must_use]
  pub fn new(file: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
    Self { file: file.into(), line, message: message.into() }
  }
}

#[derive(Debug, thiserror::Error)]
pub enum StylesheetError {
  #[error("{file}:{line}: unknown command {command:?}")]
  UnknownCommand { file: PathBuf, line: usize, command: String },
  #[error("{file}:{line}: unknown feature {feature:?}")]
  UnknownFeature { file: PathBuf, line: usize, feature: String },
  #[error("{file}:{line}: wrong number of arguments for {command:?}: expected {expected}, got {got}")]
  WrongArgCount { file: PathBuf, line: usize, command: String, expected: usize, got: usize },
  #[error("{file}:{line}: unmatched 'endif'")]
  UnmatchedEndif { file: PathBuf, line: usize },
  #[error("{file}: unmatched 'if' (missing endif)")]
  UnmatchedIf { file: PathBuf },
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("unknown value {value:?} for option {option}")]
  UnknownEnumValue { option: String, value: String },
  #[error("missing required option {0}")]
  MissingOption(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EditError {
  #[error("{file}:{line}: {message}")]
  Syntax { file: PathBuf, line: usize, message: String },
  #[error("command failed on object {id}: {message}")]
  CommandFailed { id: u32, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum GeorefError {
  #[error("can't parse nomenclature name {name:?}: {reason}")]
  BadNomenclature { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error(transparent)]
  Conversion(#[from] ConversionError),
  #[error(transparent)]
  Store(#[from] StoreError),
  #[error(transparent)]
  Index(#[from] IndexError),
  #[error(transparent)]
  Format(#[from] FormatError),
  #[error(transparent)]
  Stylesheet(#[from] StylesheetError),
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Edit(#[from] EditError),
  #[error(transparent)]
  Georef(#[from] GeorefError),
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
