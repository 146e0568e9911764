//! Stand-in parser for the command line: it only checks that a script can be
//! read as text. Embedders plug in the real compiler instead.

use std::fs;
use std::path::Path;

use scroll_loader::{
    CompileError, LogEntry, LogLevel, ScriptCompiler, ScriptLogger, TriggerRegistry,
};

#[derive(Debug, Default)]
pub struct SourceCheckCompiler;

impl ScriptCompiler for SourceCheckCompiler {
    fn compile(
        &self,
        path: &Path,
        _debug: bool,
        logger: &mut ScriptLogger,
    ) -> Result<Vec<LogEntry>, CompileError> {
        let bytes = fs::read(path).map_err(|e| CompileError::Read(e.to_string()))?;
        let source = String::from_utf8(bytes).map_err(|e| CompileError::Syntax {
            message: format!("not valid UTF-8 after byte {}", e.utf8_error().valid_up_to()),
            line: None,
        })?;

        if source.trim().is_empty() {
            logger.warn("script is empty");
            return Ok(Vec::new());
        }
        let lines = source.lines().count();
        logger.debug(format!("read {lines} line(s)"));

        let mut entries = Vec::new();
        for (index, line) in source.lines().enumerate() {
            if line.contains('\t') && line.starts_with(' ') {
                entries.push(
                    LogEntry::new(LogLevel::Warning, "mixed tabs and spaces in indentation")
                        .at_line(index + 1),
                );
            }
        }
        Ok(entries)
    }
}

/// The command line registers no triggers, so there is nothing to clear.
#[derive(Debug, Default)]
pub struct NoopTriggers;

impl TriggerRegistry for NoopTriggers {
    fn clear_triggers(&self, key: &str) {
        tracing::trace!(target: "scripting", "No triggers to clear for {}", key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll_loader::Script;
    use tempfile::TempDir;

    fn check(content: &[u8]) -> (Result<Vec<LogEntry>, CompileError>, Vec<LogEntry>) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("greet.scroll");
        fs::write(&path, content).unwrap();

        let mut logger = ScriptLogger::new(Script::new(&path).unwrap(), true);
        let result = SourceCheckCompiler.compile(&path, true, &mut logger);
        (result, logger.close())
    }

    #[test]
    fn test_readable_script_passes() {
        let (result, logged) = check(b"on load:\n    broadcast \"hi\"\n");
        assert!(result.unwrap().is_empty());
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].message, "read 2 line(s)");
    }

    #[test]
    fn test_empty_script_warns() {
        let (result, logged) = check(b"  \n");
        assert!(result.is_ok());
        assert_eq!(logged[0].level, LogLevel::Warning);
    }

    #[test]
    fn test_mixed_indentation_warns_with_line() {
        let (result, _) = check(b"on load:\n \tbroadcast \"hi\"\n");
        let entries = result.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].line, Some(2));
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let (result, _) = check(&[0x66, 0x6f, 0xff]);
        assert!(matches!(result, Err(CompileError::Syntax { .. })));
    }
}
