//! Glob-importable surface, mirroring the narrow prelude most modules in
//! this workspace pull in with `use agent_core::prelude::*;`.
pub use std::fmt::{Debug, Display};
pub use std::sync::Arc;

pub use crate::strng::Strng;
