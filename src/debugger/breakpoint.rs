use crate::debugger::error::Error;
use crate::script::{normalize_filename, LineCache};
use indexmap::{Equivalent, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

/// Source position where execution must stop.
///
/// Filename is kept normalized, deserialized breakpoints are normalized too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBreakpoint")]
pub struct Breakpoint {
    pub filename: String,
    pub lineno: u32,
}

impl Breakpoint {
    pub fn new(filename: &str, lineno: u32) -> Self {
        Self {
            filename: normalize_filename(filename).to_string(),
            lineno,
        }
    }

    fn normalized(self) -> Self {
        if normalize_filename(&self.filename) == self.filename {
            self
        } else {
            Self::new(&self.filename, self.lineno)
        }
    }
}

#[derive(Deserialize)]
struct RawBreakpoint {
    filename: String,
    lineno: u32,
}

impl From<RawBreakpoint> for Breakpoint {
    fn from(raw: RawBreakpoint) -> Self {
        Breakpoint::new(&raw.filename, raw.lineno)
    }
}

impl Hash for Breakpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.filename.as_str(), self.lineno).hash(state)
    }
}

/// Borrowed breakpoint key, avoids allocations on table lookup.
#[derive(Hash)]
struct Position<'a>(&'a str, u32);

impl Equivalent<Breakpoint> for Position<'_> {
    fn equivalent(&self, key: &Breakpoint) -> bool {
        self.0 == key.filename && self.1 == key.lineno
    }
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.filename, self.lineno)
    }
}

/// Ordered set of session breakpoints.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    breakpoints: IndexSet<Breakpoint>,
}

impl BreakpointTable {
    fn validate(breakpoint: &Breakpoint, cache: &LineCache) -> Result<(), Error> {
        if !cache.contains(&breakpoint.filename) {
            return Err(Error::UnknownSource(breakpoint.filename.clone()));
        }
        if !cache.is_executable(&breakpoint.filename, breakpoint.lineno) {
            return Err(Error::NotExecutable(breakpoint.clone()));
        }
        Ok(())
    }

    /// Add a breakpoint at an executable line, adding an existing breakpoint is a no-op.
    pub fn add(&mut self, breakpoint: Breakpoint, cache: &LineCache) -> Result<(), Error> {
        let breakpoint = breakpoint.normalized();
        Self::validate(&breakpoint, cache)?;
        self.breakpoints.insert(breakpoint);
        Ok(())
    }

    pub fn remove(&mut self, breakpoint: &Breakpoint) -> Result<(), Error> {
        let key = Position(normalize_filename(&breakpoint.filename), breakpoint.lineno);
        if !self.breakpoints.shift_remove(&key) {
            return Err(Error::BreakpointNotFound(breakpoint.clone()));
        }
        Ok(())
    }

    /// Replace whole set, the table is untouched if any of new breakpoints is invalid.
    pub fn replace(
        &mut self,
        breakpoints: Vec<Breakpoint>,
        cache: &LineCache,
    ) -> Result<(), Error> {
        let breakpoints: Vec<_> = breakpoints.into_iter().map(Breakpoint::normalized).collect();
        breakpoints
            .iter()
            .try_for_each(|bp| Self::validate(bp, cache))?;
        self.breakpoints = breakpoints.into_iter().collect();
        Ok(())
    }

    /// Drop breakpoints that are not valid against a new line cache, return dropped ones.
    pub fn retain_valid(&mut self, cache: &LineCache) -> Vec<Breakpoint> {
        let mut dropped = vec![];
        self.breakpoints.retain(|bp| {
            let valid = Self::validate(bp, cache).is_ok();
            if !valid {
                dropped.push(bp.clone());
            }
            valid
        });
        dropped
    }

    pub fn contains(&self, filename: &str, lineno: u32) -> bool {
        self.breakpoints
            .contains(&Position(normalize_filename(filename), lineno))
    }

    pub fn snapshot(&self) -> Vec<Breakpoint> {
        self.breakpoints.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
