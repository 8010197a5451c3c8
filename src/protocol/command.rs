//! Tokenized Client Commands

use bytes::Bytes;
use std::ops::Deref;

/// A non-empty argument vector; the first element is the command name.
///
/// Indexing and slicing go through `Deref<Target = [Bytes]>`, so
/// `args[1]` and `args.len()` read like the underlying vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandArgs(Vec<Bytes>);

impl CommandArgs {
    /// Wraps `args`, or returns `None` when it is empty.
    pub fn new(args: Vec<Bytes>) -> Option<Self> {
        if args.is_empty() {
            None
        } else {
            Some(Self(args))
        }
    }

    /// Convenience constructor from string parts.
    pub fn from_strs(parts: &[&str]) -> Option<Self> {
        Self::new(
            parts
                .iter()
                .map(|p| Bytes::copy_from_slice(p.as_bytes()))
                .collect(),
        )
    }

    /// The command token as sent by the client.
    pub fn name(&self) -> &Bytes {
        &self.0[0]
    }

    /// The command token, lower-cased, for registry lookup.
    pub fn name_lowercase(&self) -> String {
        String::from_utf8_lossy(self.name()).to_ascii_lowercase()
    }

    pub fn into_inner(self) -> Vec<Bytes> {
        self.0
    }
}

impl Deref for CommandArgs {
    type Target = [Bytes];

    fn deref(&self) -> &[Bytes] {
        &self.0
    }
}
