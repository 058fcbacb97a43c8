pub mod cursor;

pub use cursor::{LineBuffer, LineCursor};

/// Width of a line's leading whitespace. A tab counts as four columns
pub fn indent_of(line: &str) -> usize {
	let mut indent = 0;
	for c in line.chars() {
		match c {
			' ' => indent += 1,
			'\t' => indent += 4,
			_ => break,
		}
	}
	indent
}

/// Renders an indent width back into whitespace. Multiples of four become
/// tabs, everything else spaces
pub fn indent_string(indent: usize) -> String {
	if indent % 4 == 0 {
		"\t".repeat(indent / 4)
	} else {
		" ".repeat(indent)
	}
}

/// Collects every `%[...]` token found in the text, without the brackets.
/// An unterminated token is dropped
pub fn extract_placeholders(text: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut chars = text.chars().peekable();

	while let Some(c) = chars.next() {
		if c != '%' || chars.peek() != Some(&'[') {
			continue;
		}
		chars.next();
		let mut token = String::new();
		let mut closed = false;
		for inner in chars.by_ref() {
			if inner == ']' {
				closed = true;
				break;
			}
			token.push(inner);
		}
		if !closed {
			return out;
		}
		out.push(token);
	}

	out
}

/// Splits call-site arguments on spaces, keeping quoted segments together.
/// Back-quotes are stripped from the token, other quote characters are kept
pub fn extract_args(text: &str) -> Vec<String> {
	let mut out = Vec::new();
	let mut current = String::new();
	let mut chars = text.chars();

	while let Some(c) = chars.next() {
		match c {
			' ' => {
				if !current.is_empty() {
					out.push(std::mem::take(&mut current));
				}
			}
			'"' | '\'' | '`' => {
				if c != '`' {
					current.push(c);
				}
				for inner in chars.by_ref() {
					if inner == c {
						if c != '`' {
							current.push(inner);
						}
						break;
					}
					current.push(inner);
				}
			}
			_ => current.push(c),
		}
	}

	if !current.is_empty() {
		out.push(current);
	}
	out
}

/// Extracts the resource identifier of the last `function <resource>` token
/// pair in the line, if any
pub fn extract_resource(line: &str) -> Option<&str> {
	let fields: Vec<&str> = line.split_whitespace().collect();
	for i in (0..fields.len()).rev() {
		if fields[i] == "function" {
			return fields.get(i + 1).copied();
		}
	}
	None
}
