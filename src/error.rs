use std::fmt;

use thiserror::Error;

/// A structured build failure pointing at the file, and optionally the line,
/// that caused it
#[derive(Debug, Clone, Error)]
pub enum BuildError {
	#[error("Syntax error: {0}")]
	Syntax(ErrorContext),
	#[error("Validation error: {0}")]
	Validation(ErrorContext),
	#[error("Format error: {0}")]
	Format(ErrorContext),
	#[error("Execution error: {0}")]
	Execution(ErrorContext),
}

impl BuildError {
	pub fn syntax(path: impl Into<String>, details: impl fmt::Display) -> Self {
		Self::Syntax(ErrorContext::new(path, details))
	}

	pub fn validation(path: impl Into<String>, details: impl fmt::Display) -> Self {
		Self::Validation(ErrorContext::new(path, details))
	}

	pub fn format(path: impl Into<String>, details: impl fmt::Display) -> Self {
		Self::Format(ErrorContext::new(path, details))
	}

	pub fn execution(path: impl Into<String>, details: impl fmt::Display) -> Self {
		Self::Execution(ErrorContext::new(path, details))
	}

	/// Attaches the source line that triggered the error
	pub fn with_line(mut self, line: SourceLine) -> Self {
		self.context_mut().line = Some(line);
		self
	}

	pub fn context(&self) -> &ErrorContext {
		match self {
			Self::Syntax(cx) | Self::Validation(cx) | Self::Format(cx) | Self::Execution(cx) => cx,
		}
	}

	fn context_mut(&mut self) -> &mut ErrorContext {
		match self {
			Self::Syntax(cx) | Self::Validation(cx) | Self::Format(cx) | Self::Execution(cx) => cx,
		}
	}
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
	pub path: String,
	pub line: Option<SourceLine>,
	pub details: String,
}

impl ErrorContext {
	fn new(path: impl Into<String>, details: impl fmt::Display) -> Self {
		Self {
			path: path.into(),
			line: None,
			details: details.to_string(),
		}
	}
}

impl fmt::Display for ErrorContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.line {
			Some(line) => {
				write!(f, "{}:{}: {}", self.path, line.number, self.details)?;
				if let Some(previous) = &line.previous {
					write!(f, "\n  | {previous}")?;
				}
				write!(f, "\n> | {}", line.text)
			}
			None => write!(f, "{}: {}", self.path, self.details),
		}
	}
}

/// A 1-based source line with the preceding line kept for display
#[derive(Debug, Clone)]
pub struct SourceLine {
	pub number: usize,
	pub text: String,
	pub previous: Option<String>,
}

impl SourceLine {
	pub fn new(number: usize, text: impl Into<String>) -> Self {
		Self {
			number,
			text: text.into(),
			previous: None,
		}
	}

	pub fn with_previous(mut self, previous: impl Into<String>) -> Self {
		self.previous = Some(previous.into());
		self
	}
}
