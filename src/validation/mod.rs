//! Path safety validation
//!
//! Narrowed from the teacher's broader `validation` module (which also
//! covered cache freshness and chunking-parameter bounds) to the one
//! use this crate has for it: keeping graft and working-tree paths
//! from escaping the directory they're supposed to be confined to.

use std::error::Error;
use std::fmt;

pub mod path;

pub use path::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
	PathError(String),
}

impl fmt::Display for ValidationError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ValidationError::PathError(msg) => write!(f, "path validation error: {}", msg),
		}
	}
}

impl Error for ValidationError {}

impl From<ValidationError> for crate::error::RepoError {
	fn from(e: ValidationError) -> Self {
		crate::error::RepoError::InvalidArgs { message: e.to_string() }
	}
}
