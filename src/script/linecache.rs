use crate::script::Program;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
struct CachedSource {
    lines: Vec<String>,
    executable: BTreeSet<u32>,
}

/// Source lines and executable positions of registered files.
///
/// Each debug session owns its own cache, there is no process wide instance.
#[derive(Debug, Default)]
pub struct LineCache {
    sources: HashMap<String, CachedSource>,
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(ToString::to_string).collect()
}

/// Lexical filename normalization, `./a.py` and `a.py` name the same file.
pub fn normalize_filename(filename: &str) -> &str {
    let mut name = filename.trim();
    while let Some(rest) = name.strip_prefix("./") {
        name = rest;
    }
    name
}

impl LineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a source file.
    ///
    /// Executable lines come from compilation, if the text does not compile
    /// every non blank, non comment line is considered executable.
    pub fn register(&mut self, filename: &str, text: &str) {
        match Program::compile(text, filename) {
            Ok(program) => self.register_program(&program),
            Err(e) => {
                log::debug!(target: "debugger", "{filename} does not compile ({e}), fallback to plain line scan");
                self.register_plain(filename, text);
            }
        }
    }

    /// Register an already compiled program.
    pub fn register_program(&mut self, program: &Program) {
        let source = CachedSource {
            lines: split_lines(program.source()),
            executable: program.executable_lines(),
        };
        self.sources
            .insert(normalize_filename(program.filename()).to_string(), source);
    }

    /// Register a text that does not compile, every non blank, non comment line is executable.
    pub fn register_plain(&mut self, filename: &str, text: &str) {
        let lines = split_lines(text);
        let executable = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with('#')
            })
            .map(|(idx, _)| idx as u32 + 1)
            .collect();
        self.sources.insert(
            normalize_filename(filename).to_string(),
            CachedSource { lines, executable },
        );
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.sources.contains_key(normalize_filename(filename))
    }

    /// Return a line by its 1-based number.
    pub fn getline(&self, filename: &str, lineno: u32) -> Option<&str> {
        let source = self.sources.get(normalize_filename(filename))?;
        let idx = (lineno as usize).checked_sub(1)?;
        source.lines.get(idx).map(String::as_str)
    }

    pub fn is_executable(&self, filename: &str, lineno: u32) -> bool {
        self.sources
            .get(normalize_filename(filename))
            .is_some_and(|source| source.executable.contains(&lineno))
    }

    pub fn clear(&mut self) {
        self.sources.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut cache = LineCache::new();
        cache.register("./main.py", "x = 1\n\n# note\nif x:\n    print(x)\n");

        assert!(cache.contains("main.py"));
        assert!(!cache.contains("other.py"));
        assert_eq!(cache.getline("main.py", 1), Some("x = 1"));
        assert_eq!(cache.getline("main.py", 0), None);
        assert_eq!(cache.getline("main.py", 9), None);

        let executable: Vec<u32> = (1..=5)
            .filter(|l| cache.is_executable("./main.py", *l))
            .collect();
        assert_eq!(executable, vec![1, 4, 5]);
    }

    #[test]
    fn test_fallback_on_syntax_error() {
        let mut cache = LineCache::new();
        cache.register("bad.py", "x = (\n\n# c\ny = 2\n");
        assert!(cache.is_executable("bad.py", 1));
        assert!(!cache.is_executable("bad.py", 2));
        assert!(!cache.is_executable("bad.py", 3));
        assert!(cache.is_executable("bad.py", 4));
    }

    #[test]
    fn test_register_program() {
        let program = Program::compile("x = 1\n\nif x:\n    y = 2\n", "./prog.py").unwrap();
        let mut cache = LineCache::new();
        cache.register_program(&program);

        assert!(cache.contains("prog.py"));
        assert_eq!(cache.getline("prog.py", 4), Some("    y = 2"));
        let executable: Vec<u32> = (1..=4)
            .filter(|l| cache.is_executable("prog.py", *l))
            .collect();
        assert_eq!(executable, vec![1, 3, 4]);
    }

    #[test]
    fn test_register_replaces() {
        let mut cache = LineCache::new();
        cache.register("a.py", "x = 1\ny = 2\n");
        cache.register("a.py", "z = 3\n");
        assert_eq!(cache.getline("a.py", 1), Some("z = 3"));
        assert!(!cache.is_executable("a.py", 2));
    }
}
