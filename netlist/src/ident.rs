use std::fmt::{Debug, Display};
use std::sync::{Mutex, OnceLock};

use indexmap::IndexSet;

static INTERNER: OnceLock<Mutex<IndexSet<&'static str>>> = OnceLock::new();

fn interner() -> &'static Mutex<IndexSet<&'static str>> {
    INTERNER.get_or_init(|| Mutex::new(IndexSet::new()))
}

/// An interned identifier, used for cell types, cell and wire names, parameter
/// keys, and attribute keys.
///
/// Identifiers are cheap to copy, compare, and hash; the backing strings live
/// for the lifetime of the process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdString(u32);

impl IdString {
    pub fn intern(name: &str) -> IdString {
        let mut interner = interner().lock().unwrap();
        if let Some(index) = interner.get_index_of(name) {
            return IdString(index as u32);
        }
        let name: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let (index, _) = interner.insert_full(name);
        IdString(index as u32)
    }

    pub fn as_str(self) -> &'static str {
        interner().lock().unwrap().get_index(self.0 as usize).unwrap()
    }

    pub fn is_empty(self) -> bool {
        self.as_str().is_empty()
    }
}

impl Display for IdString {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Debug for IdString {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "id!({:?})", self.as_str())
    }
}

impl From<&str> for IdString {
    fn from(name: &str) -> Self {
        IdString::intern(name)
    }
}

impl From<String> for IdString {
    fn from(name: String) -> Self {
        IdString::intern(&name)
    }
}

/// Interns an identifier literal.
#[macro_export]
macro_rules! id {
    ($name:expr) => {
        $crate::IdString::intern($name)
    };
}
