//! Filesystem processes: the host is a directory tree.
//!
//! Every process accepts `root` and `extensions` construction keyword
//! arguments. `root` defaults to the CLI root directory; `extensions`
//! limits text checks to those file extensions.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use athena_core::{
    Arguments, Context, Feedback, Operations, Process, ProcessRegistry, ProcessType, Status,
    Thread, ToolHandle,
};
use serde_json::json;

pub const TRAILING_WHITESPACE: &str = "athena.fs.TrailingWhitespace";
pub const MISSING_FINAL_NEWLINE: &str = "athena.fs.MissingFinalNewline";
pub const EMPTY_FILES: &str = "athena.fs.EmptyFiles";
pub const FILE_NAMES_WITH_SPACES: &str = "athena.fs.FileNamesWithSpaces";

const DEFAULT_EXTENSIONS: [&str; 7] = ["rs", "py", "toml", "json", "md", "txt", "yaml"];

/// Registry holding every filesystem process, rooted at `root`.
pub fn registry(root: &Path) -> athena_core::Result<ProcessRegistry> {
    let mut registry = ProcessRegistry::new();

    let base = root.to_path_buf();
    registry.register_with::<TrailingWhitespace, _>(TRAILING_WHITESPACE, move |args| {
        Ok(TrailingWhitespace(Tree::new(&base, args)?))
    })?;
    let base = root.to_path_buf();
    registry.register_with::<MissingFinalNewline, _>(MISSING_FINAL_NEWLINE, move |args| {
        Ok(MissingFinalNewline(Tree::new(&base, args)?))
    })?;
    let base = root.to_path_buf();
    registry.register_with::<EmptyFiles, _>(EMPTY_FILES, move |args| {
        Ok(EmptyFiles(Tree::new(&base, args)?))
    })?;
    let base = root.to_path_buf();
    registry.register_with::<FileNamesWithSpaces, _>(FILE_NAMES_WITH_SPACES, move |args| {
        Ok(FileNamesWithSpaces(Tree::new(&base, args)?))
    })?;

    Ok(registry)
}

/// The directory tree a process inspects.
#[derive(Debug, Clone)]
pub struct Tree {
    root: PathBuf,
    extensions: Vec<String>,
}

impl Tree {
    fn new(default_root: &Path, arguments: &Arguments) -> Result<Self> {
        let root = arguments
            .kwarg_as::<PathBuf>("root")?
            .unwrap_or_else(|| default_root.to_path_buf());
        let extensions = arguments
            .kwarg_as::<Vec<String>>("extensions")?
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());
        Ok(Self { root, extensions })
    }

    /// Every file under the root, sorted. Hidden entries and `target` are skipped.
    fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files)
            .with_context(|| format!("failed to walk {}", self.root.display()))?;
        files.sort();
        Ok(files)
    }

    fn text_files(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext))
            })
            .collect())
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn doc_format(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("root".to_string(), self.root.display().to_string()),
            ("extensions".to_string(), self.extensions.join(", ")),
        ])
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with('.') || name == "target" {
            continue;
        }

        if path.is_file() {
            files.push(path);
        } else if path.is_dir() {
            collect_files(&path, files)?;
        }
    }
    Ok(())
}

/// File content as text, or `None` for binary files.
fn read_text(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Split a line from `split_inclusive('\n')` into its body and its `\n` or
/// `\r\n` terminator.
fn split_line_ending(segment: &str) -> (&str, &str) {
    let body = segment
        .strip_suffix("\r\n")
        .or_else(|| segment.strip_suffix('\n'))
        .unwrap_or(segment);
    (body, &segment[body.len()..])
}

/// Only spaces and tabs count as trailing whitespace.
fn strip_trailing(line: &str) -> &str {
    line.trim_end_matches(|c| c == ' ' || c == '\t')
}

pub struct TrailingWhitespace(Tree);

impl TrailingWhitespace {
    const LINES: &'static str = "LINES";
}

impl Process for TrailingWhitespace {
    fn check(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let mut feedback = Feedback::default();
        for path in self.0.text_files()? {
            let Some(content) = read_text(&path)? else {
                continue;
            };
            let relative = self.0.relative(&path);
            for (number, segment) in content.split_inclusive('\n').enumerate() {
                let (line, _) = split_line_ending(segment);
                if line.len() != strip_trailing(line).len() {
                    feedback.push(
                        format!("{relative}:{}", number + 1),
                        json!({"path": relative, "line": number + 1}),
                    );
                }
            }
        }
        if !feedback.is_empty() {
            let feedback = feedback.with_help("Strip the whitespace at the end of each line.");
            ctx.fail(Self::LINES, feedback)?;
        }
        Ok(())
    }

    fn fix(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        for path in self.0.text_files()? {
            let Some(content) = read_text(&path)? else {
                continue;
            };
            let mut fixed = String::with_capacity(content.len());
            for segment in content.split_inclusive('\n') {
                let (line, ending) = split_line_ending(segment);
                fixed.push_str(strip_trailing(line));
                fixed.push_str(ending);
            }
            if fixed != content {
                std::fs::write(&path, fixed)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                tracing::debug!(path = %path.display(), "trailing whitespace stripped");
            }
        }
        ctx.succeed(Self::LINES)?;
        Ok(())
    }

    fn doc_format(&self) -> BTreeMap<String, String> {
        self.0.doc_format()
    }
}

impl ProcessType for TrailingWhitespace {
    const NAME: &'static str = "TrailingWhitespace";

    fn operations() -> Operations {
        Operations::NONE.with_check().with_fix()
    }

    fn threads() -> athena_core::Result<Vec<Thread>> {
        Ok(vec![Thread::new(Self::LINES, "Lines ending with whitespace")
            .with_fail_status(Status::WARNING)?])
    }

    fn documentation() -> Option<&'static str> {
        Some("Lines ending with spaces or tabs in {extensions} files under {root}.")
    }

    fn construct(arguments: &Arguments) -> Result<Self> {
        Ok(Self(Tree::new(Path::new("."), arguments)?))
    }
}

pub struct MissingFinalNewline(Tree);

impl MissingFinalNewline {
    fn offenders(&self) -> Result<Vec<PathBuf>> {
        let mut offenders = Vec::new();
        for path in self.0.text_files()? {
            if let Some(content) = read_text(&path)? {
                if !content.is_empty() && !content.ends_with('\n') {
                    offenders.push(path);
                }
            }
        }
        Ok(offenders)
    }
}

impl Process for MissingFinalNewline {
    fn check(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let offenders = self.offenders()?;
        if !offenders.is_empty() {
            let display: Vec<String> = offenders.iter().map(|p| self.0.relative(p)).collect();
            ctx.fail("FILES", Feedback::new(display))?;
        }
        Ok(())
    }

    fn fix(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        for path in self.offenders()? {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            file.write_all(b"\n")?;
        }
        ctx.succeed("FILES")?;
        Ok(())
    }

    fn doc_format(&self) -> BTreeMap<String, String> {
        self.0.doc_format()
    }
}

impl ProcessType for MissingFinalNewline {
    const NAME: &'static str = "MissingFinalNewline";

    fn operations() -> Operations {
        Operations::NONE.with_check().with_fix()
    }

    fn threads() -> athena_core::Result<Vec<Thread>> {
        Ok(vec![Thread::new("FILES", "Files without a final newline")])
    }

    fn construct(arguments: &Arguments) -> Result<Self> {
        Ok(Self(Tree::new(Path::new("."), arguments)?))
    }
}

pub struct EmptyFiles(Tree);

impl Process for EmptyFiles {
    fn check(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let mut feedback = Feedback::default();
        for path in self.0.files()? {
            let metadata = std::fs::metadata(&path)?;
            if metadata.len() == 0 {
                let relative = self.0.relative(&path);
                feedback.push(relative.clone(), json!(relative));
            }
        }
        if !feedback.is_empty() {
            ctx.fail("EMPTY", feedback)?;
        }
        Ok(())
    }
}

impl ProcessType for EmptyFiles {
    const NAME: &'static str = "EmptyFiles";

    fn operations() -> Operations {
        Operations::NONE.with_check()
    }

    fn threads() -> athena_core::Result<Vec<Thread>> {
        let empty = Thread::new("EMPTY", "Empty files")
            .with_fail_status(Status::WARNING)?
            .with_documentation("Zero-length files are usually left by an interrupted export.");
        Ok(vec![empty])
    }

    fn construct(arguments: &Arguments) -> Result<Self> {
        Ok(Self(Tree::new(Path::new("."), arguments)?))
    }
}

pub struct FileNamesWithSpaces(Tree);

impl FileNamesWithSpaces {
    fn offenders(&self) -> Result<Vec<PathBuf>> {
        Ok(self
            .0
            .files()?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .is_some_and(|name| name.to_string_lossy().chars().any(char::is_whitespace))
            })
            .collect())
    }
}

impl Process for FileNamesWithSpaces {
    fn check(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let offenders = self.offenders()?;
        if !offenders.is_empty() {
            let display: Vec<String> = offenders.iter().map(|p| self.0.relative(p)).collect();
            ctx.fail("NAMES", Feedback::new(display))?;
        }
        Ok(())
    }

    /// Hands the offending paths to the caller.
    fn tool(&mut self, _ctx: &mut Context<'_>) -> Result<Option<ToolHandle>> {
        Ok(Some(Box::new(self.offenders()?)))
    }
}

impl ProcessType for FileNamesWithSpaces {
    const NAME: &'static str = "FileNamesWithSpaces";

    fn operations() -> Operations {
        Operations::NONE.with_check().with_tool()
    }

    fn threads() -> athena_core::Result<Vec<Thread>> {
        Ok(vec![Thread::new("NAMES", "File names containing whitespace")
            .with_fail_status(Status::CRITICAL)?])
    }

    fn documentation() -> Option<&'static str> {
        Some("File names containing whitespace break most pipeline tools.")
    }

    fn construct(arguments: &Arguments) -> Result<Self> {
        Ok(Self(Tree::new(Path::new("."), arguments)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use athena_core::{
        Blueprint, BlueprintDeclaration, ExecutionMode, Operation, Outcome, ProcessDescription,
        StatusRegistry,
    };

    fn blueprint(root: &Path, path: &str) -> Blueprint {
        let registry = registry(root).unwrap();
        let declaration =
            BlueprintDeclaration::new("fs").with_process("Rule", ProcessDescription::new(path));
        Blueprint::build(declaration, &registry, &StatusRegistry::new(), ExecutionMode::Batch)
            .unwrap()
    }

    fn check(blueprint: &Blueprint) -> athena_core::CheckReport {
        blueprint.invoke(0, Operation::Check, true).unwrap().into_report().unwrap()
    }

    #[test]
    fn test_trailing_whitespace_check_and_fix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "x = 1  \ny = 2\nz = 3\t\n").unwrap();
        std::fs::write(dir.path().join("b.bin"), "ignored   \n").unwrap();

        let bp = blueprint(dir.path(), TRAILING_WHITESPACE);
        let report = check(&bp);
        assert_eq!(report.status, Status::WARNING);
        assert_eq!(report.feedbacks[0].feedback.to_display(), &["a.py:1", "a.py:3"]);

        bp.invoke(0, Operation::Fix, true).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.py")).unwrap(),
            "x = 1\ny = 2\nz = 3\n"
        );
        assert!(!check(&bp).is_failed());
    }

    #[test]
    fn test_trailing_whitespace_keeps_crlf_endings() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("clean.txt"), "a\r\nb\r\n").unwrap();
        std::fs::write(dir.path().join("dirty.txt"), "a \r\nb\t\r\nc").unwrap();

        let bp = blueprint(dir.path(), TRAILING_WHITESPACE);
        let report = check(&bp);
        assert_eq!(report.feedbacks[0].feedback.to_display(), &["dirty.txt:1", "dirty.txt:2"]);

        bp.invoke(0, Operation::Fix, true).unwrap();
        assert_eq!(std::fs::read(dir.path().join("clean.txt")).unwrap(), b"a\r\nb\r\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("dirty.txt")).unwrap(), "a\r\nb\r\nc");
        assert!(!check(&bp).is_failed());
    }

    #[test]
    fn test_split_line_ending() {
        assert_eq!(split_line_ending("a \r\n"), ("a ", "\r\n"));
        assert_eq!(split_line_ending("a\n"), ("a", "\n"));
        assert_eq!(split_line_ending("tail"), ("tail", ""));
        assert_eq!(strip_trailing("x\u{a0} \t"), "x\u{a0}");
    }

    #[test]
    fn test_missing_final_newline_check_and_fix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("ok.md"), "# ok\n").unwrap();
        std::fs::write(dir.path().join("empty.md"), "").unwrap();

        let bp = blueprint(dir.path(), MISSING_FINAL_NEWLINE);
        let report = check(&bp);
        assert_eq!(report.status, Status::ERROR);
        assert_eq!(report.feedbacks[0].feedback.len(), 1);

        bp.invoke(0, Operation::Fix, true).unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/lib.rs")).unwrap(),
            "fn main() {}\n"
        );
        assert!(!check(&bp).is_failed());
    }

    #[test]
    fn test_empty_files_skips_hidden_and_cannot_fix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        std::fs::write(dir.path().join(".git/HEAD"), "").unwrap();

        let bp = blueprint(dir.path(), EMPTY_FILES);
        let report = check(&bp);
        assert_eq!(report.feedbacks[0].feedback.to_display(), &["empty.txt"]);
        assert!(bp.invoke(0, Operation::Fix, true).unwrap().is_skipped());
    }

    #[test]
    fn test_file_names_with_spaces_tool_returns_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("final render.exr"), "data").unwrap();
        std::fs::write(dir.path().join("ok.exr"), "data").unwrap();

        let bp = blueprint(dir.path(), FILE_NAMES_WITH_SPACES);
        assert_eq!(check(&bp).status, Status::CRITICAL);

        match bp.invoke(0, Operation::Tool, true).unwrap() {
            Outcome::Tool(Some(handle)) => {
                let paths = handle.downcast_ref::<Vec<PathBuf>>().unwrap();
                assert_eq!(paths.len(), 1);
                assert!(paths[0].ends_with("final render.exr"));
            }
            other => panic!("expected a tool handle, got {other:?}"),
        }
    }

    #[test]
    fn test_root_and_extensions_from_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("assets");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("notes.usda"), "#usda 1.0  \n").unwrap();

        let args: Arguments = serde_json::from_value(json!({
            "kwargs": {"root": nested, "extensions": ["usda"]}
        }))
        .unwrap();
        let tree = Tree::new(Path::new("/unused"), &args).unwrap();
        assert_eq!(tree.text_files().unwrap().len(), 1);
        assert_eq!(tree.doc_format()["extensions"], "usda");
    }
}
