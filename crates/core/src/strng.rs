//! A small wrapper around `arcstr::ArcStr` giving us cheap clones and
//! cheap equality for the strings that flow through the gateway hot path
//! (endpoint names, model ids, header values).
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

pub type Strng = arcstr::ArcStr;

/// Build a `Strng` from anything that can be turned into a `&str`.
pub fn new(s: impl AsRef<str>) -> Strng {
	arcstr::ArcStr::from(s.as_ref())
}

/// Build a `Strng` from a `'static` string literal without allocating.
pub use arcstr::literal;

/// A case-insensitive, interned string used for header names.
#[derive(Clone, Eq)]
pub struct CaseInsensitive(pub Strng);

impl PartialEq for CaseInsensitive {
	fn eq(&self, other: &Self) -> bool {
		self.0.eq_ignore_ascii_case(other.0.as_str())
	}
}

impl fmt::Debug for CaseInsensitive {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.0, f)
	}
}

impl Deref for CaseInsensitive {
	type Target = str;
	fn deref(&self) -> &str {
		self.0.as_str()
	}
}

impl Borrow<str> for CaseInsensitive {
	fn borrow(&self) -> &str {
		self.0.as_str()
	}
}
