//! Line-oriented interactive resolver
//!
//! Prompts once per unresolved conflict. Input is read line by line so the
//! resolver works against stdin/stdout as well as in-memory buffers.

use std::io::{BufRead, BufReader, Stdin, Stdout, Write};
use std::sync::Mutex;

use tracing::info;

use super::{merge_values, parse_literal, ConflictResolver, ResolutionChoice, ResolutionSession};
use crate::conflict::Conflict;
use crate::error::{ConfigError, ConfigResult};

const MENU: &str =
    "Choose: [1] source 1, [2] source 2, [m] merge, [c] custom value, [s] skip, [a] apply to all remaining, [q] abort";

/// Interactive resolver over any line reader and writer
pub struct CliResolver<R, W> {
    io: Mutex<(R, W)>,
    auto_rules: Vec<(String, ResolutionChoice)>,
}

impl CliResolver<BufReader<Stdin>, Stdout> {
    /// Resolver prompting on the process terminal
    pub fn stdio() -> Self {
        Self::new(BufReader::new(std::io::stdin()), std::io::stdout())
    }
}

enum Answer {
    Choice(ResolutionChoice),
    ApplyAll(ResolutionChoice),
    Abort,
}

impl<R: BufRead + Send, W: Write + Send> CliResolver<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Mutex::new((reader, writer)),
            auto_rules: Vec::new(),
        }
    }

    /// Pre-answer conflicts whose path matches `pattern`
    pub fn with_auto_rule(mut self, pattern: impl Into<String>, choice: ResolutionChoice) -> Self {
        self.auto_rules.push((pattern.into(), choice));
        self
    }

    /// Recover the reader and writer, e.g. to inspect captured output
    pub fn into_inner(self) -> (R, W) {
        match self.io.into_inner() {
            Ok(io) => io,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn read_line(reader: &mut R) -> ConfigResult<Option<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask(
        reader: &mut R,
        writer: &mut W,
        conflict: &Conflict,
        index: usize,
        total: usize,
    ) -> ConfigResult<Answer> {
        writeln!(
            writer,
            "\nConflict {}/{} [{}] at {}",
            index + 1,
            total,
            conflict.conflict_type,
            conflict.path
        )?;
        writeln!(
            writer,
            "  [1] {} (priority {}): {}",
            conflict.source1, conflict.priority1, conflict.value1
        )?;
        writeln!(
            writer,
            "  [2] {} (priority {}): {}",
            conflict.source2, conflict.priority2, conflict.value2
        )?;

        loop {
            writeln!(writer, "{}", MENU)?;
            write!(writer, "> ")?;
            writer.flush()?;

            let Some(input) = Self::read_line(reader)? else {
                return Ok(Answer::Abort);
            };

            match input.to_lowercase().as_str() {
                "1" => return Ok(Answer::Choice(ResolutionChoice::Source1)),
                "2" => return Ok(Answer::Choice(ResolutionChoice::Source2)),
                "m" => {
                    if merge_values(&conflict.value1, &conflict.value2).is_none() {
                        writeln!(
                            writer,
                            "Only lists or maps can be merged; keeping the higher priority value."
                        )?;
                        return Ok(Answer::Choice(ResolutionChoice::HigherPriority));
                    }
                    return Ok(Answer::Choice(ResolutionChoice::Merge));
                }
                "c" => {
                    write!(writer, "Enter value: ")?;
                    writer.flush()?;
                    let Some(raw) = Self::read_line(reader)? else {
                        return Ok(Answer::Abort);
                    };
                    return Ok(Answer::Choice(ResolutionChoice::Custom(parse_literal(&raw))));
                }
                "s" => return Ok(Answer::Choice(ResolutionChoice::HigherPriority)),
                "a" => loop {
                    write!(writer, "Apply which source to all remaining conflicts? [1/2]: ")?;
                    writer.flush()?;
                    match Self::read_line(reader)?.as_deref() {
                        Some("1") => return Ok(Answer::ApplyAll(ResolutionChoice::Source1)),
                        Some("2") => return Ok(Answer::ApplyAll(ResolutionChoice::Source2)),
                        Some(_) => writeln!(writer, "Please enter 1 or 2.")?,
                        None => return Ok(Answer::Abort),
                    }
                },
                "q" => return Ok(Answer::Abort),
                other => writeln!(writer, "Invalid choice '{}'", other)?,
            }
        }
    }
}

impl<R: BufRead + Send, W: Write + Send> ConflictResolver for CliResolver<R, W> {
    fn resolve(&self, conflicts: &[Conflict]) -> ConfigResult<ResolutionSession> {
        let mut session = ResolutionSession::new(conflicts.to_vec());
        session.auto_rules = self.auto_rules.clone();

        let mut guard = self
            .io
            .lock()
            .map_err(|_| ConfigError::internal("resolver IO lock poisoned"))?;
        let (reader, writer) = &mut *guard;

        let total = conflicts.len();
        for (index, conflict) in conflicts.iter().enumerate() {
            if let Some(choice) = session.preselected_choice(conflict) {
                session.resolve(conflict, &choice);
                continue;
            }

            match Self::ask(reader, writer, conflict, index, total)? {
                Answer::Choice(choice) => session.resolve(conflict, &choice),
                Answer::ApplyAll(choice) => {
                    session.resolve(conflict, &choice);
                    session.global_choice = Some(choice);
                }
                Answer::Abort => {
                    writeln!(writer, "Resolution aborted.")?;
                    session.aborted = true;
                    break;
                }
            }
        }

        info!(
            resolved = session.resolutions.len(),
            remaining = session.unresolved().len(),
            aborted = session.aborted,
            "Interactive resolution finished"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::tests::sample_conflict;
    use serde_json::json;
    use std::io::Cursor;

    fn resolver(input: &str) -> CliResolver<Cursor<Vec<u8>>, Vec<u8>> {
        CliResolver::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn conflicts() -> Vec<Conflict> {
        vec![
            sample_conflict("settings.a", json!(1), json!(2)),
            sample_conflict("settings.b", json!(["x"]), json!(["y"])),
            sample_conflict("settings.c", json!("old"), json!("new")),
        ]
    }

    #[test]
    fn test_basic_choices() {
        let r = resolver("2\nm\nc\n{\"k\": true}\n");
        let session = r.resolve(&conflicts()).unwrap();
        assert!(session.is_complete());
        assert_eq!(session.resolutions["settings.a"], json!(2));
        assert_eq!(session.resolutions["settings.b"], json!(["x", "y"]));
        assert_eq!(session.resolutions["settings.c"], json!({"k": true}));
    }

    #[test]
    fn test_custom_value_falls_back_to_text() {
        let r = resolver("c\nnot json\ns\ns\n");
        let session = r.resolve(&conflicts()).unwrap();
        assert_eq!(session.resolutions["settings.a"], json!("not json"));
        // skip keeps the higher priority (enterprise, source 1)
        assert_eq!(session.resolutions["settings.c"], json!("old"));
    }

    #[test]
    fn test_apply_to_all_remaining() {
        let r = resolver("1\na\n2\n");
        let session = r.resolve(&conflicts()).unwrap();
        assert_eq!(session.resolutions["settings.a"], json!(1));
        assert_eq!(session.resolutions["settings.b"], json!(["y"]));
        assert_eq!(session.resolutions["settings.c"], json!("new"));
        assert_eq!(session.global_choice, Some(ResolutionChoice::Source2));
    }

    #[test]
    fn test_abort_keeps_progress() {
        let r = resolver("2\nq\n");
        let session = r.resolve(&conflicts()).unwrap();
        assert!(session.aborted);
        assert_eq!(session.resolutions.len(), 1);
        assert_eq!(session.unresolved().len(), 2);
    }

    #[test]
    fn test_invalid_input_reprompts_and_eof_aborts() {
        let r = resolver("zzz\n1\n");
        let session = r.resolve(&conflicts()).unwrap();
        assert!(session.aborted);
        assert_eq!(session.resolutions["settings.a"], json!(1));
        let (_, out) = r.into_inner();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Invalid choice 'zzz'"));
    }

    #[test]
    fn test_merge_on_scalars_notifies() {
        let r = resolver("m\nq\n");
        let session = r.resolve(&conflicts()).unwrap();
        assert_eq!(session.resolutions["settings.a"], json!(1));
        let (_, out) = r.into_inner();
        assert!(String::from_utf8(out).unwrap().contains("Only lists or maps can be merged"));
    }

    #[test]
    fn test_auto_rule_skips_prompt() {
        let r = resolver("").with_auto_rule("settings.*", ResolutionChoice::Source2);
        let session = r.resolve(&conflicts()).unwrap();
        assert!(!session.aborted);
        assert!(session.is_complete());
        assert_eq!(session.resolutions["settings.c"], json!("new"));
    }
}
