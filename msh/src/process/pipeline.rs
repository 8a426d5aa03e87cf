use msh_types::{ShellError, ShellResult};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::redirect::Redirect;
use crate::parser::{ParsedLine, Token};

/// One command of a pipeline with its redirections already opened.
#[derive(Debug)]
pub struct PipelineStage {
    argv: Vec<String>,
    input: Option<Redirect>,
    output: Option<Redirect>,
}

impl PipelineStage {
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_ref().map(|r| r.path())
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_ref().map(|r| r.path())
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Option<File>, Option<File>) {
        (
            self.argv,
            self.input.map(Redirect::into_file),
            self.output.map(Redirect::into_file),
        )
    }

    fn expand_alias(&mut self, aliases: &HashMap<String, String>) -> ShellResult<()> {
        let Some(value) = aliases.get(&self.argv[0]) else {
            return Ok(());
        };
        let mut words = shell_words::split(value)
            .map_err(|e| ShellError::Parse(format!("alias {}: {}", self.argv[0], e)))?;
        if words.is_empty() {
            return Err(ShellError::EmptyCommand);
        }
        debug!("alias: {} -> {:?}", self.argv[0], words);
        words.extend(self.argv.drain(1..));
        self.argv = words;
        Ok(())
    }
}

/// Splits argv from redirection operators and opens every target.
///
/// A later redirection in the same direction replaces the earlier one.
pub fn compile_stage(tokens: Vec<Token>) -> ShellResult<PipelineStage> {
    let mut argv = Vec::new();
    let mut input: Option<Redirect> = None;
    let mut output: Option<Redirect> = None;

    let mut tokens = tokens.into_iter();
    while let Some(token) = tokens.next() {
        match token {
            Token::Word(word) => argv.push(word),
            Token::Redirect(op) => {
                let Some(Token::Word(target)) = tokens.next() else {
                    return Err(ShellError::MissingRedirectTarget(op.as_str()));
                };
                let redirect = Redirect::open(op, &target)?;
                if redirect.is_input() {
                    input = Some(redirect);
                } else {
                    output = Some(redirect);
                }
            }
        }
    }

    if argv.is_empty() {
        return Err(ShellError::EmptyCommand);
    }
    Ok(PipelineStage {
        argv,
        input,
        output,
    })
}

/// A compiled command line, ready for the launcher.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<PipelineStage>,
    background: bool,
    command: String,
}

impl Pipeline {
    pub fn compile(parsed: ParsedLine, aliases: &HashMap<String, String>) -> ShellResult<Self> {
        let command = parsed.command_text().to_string();
        let background = parsed.background;
        if parsed.stages.is_empty() {
            return Err(ShellError::EmptyCommand);
        }

        let mut stages = Vec::with_capacity(parsed.stages.len());
        for tokens in parsed.stages {
            let mut stage = compile_stage(tokens)?;
            stage.expand_alias(aliases)?;
            stages.push(stage);
        }
        debug!(
            "compiled {:?}: {} stage(s), background: {}",
            command,
            stages.len(),
            background
        );
        Ok(Pipeline {
            stages,
            background,
            command,
        })
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn background(&self) -> bool {
        self.background
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub(crate) fn into_stages(self) -> Vec<PipelineStage> {
        self.stages
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Inherited,
    Pipe,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    Inherited,
    Pipe,
    File(PathBuf),
    /// Last stage of a foreground pipeline whose output the shell forwards.
    Capture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWiring {
    pub input: InputSource,
    pub output: OutputSink,
}

/// Where each stage's stdin comes from and its stdout goes to.
///
/// A redirection wins over the pipe. The pipe is still created by the
/// launcher in that case; the next stage just sees it closed.
pub fn plan_io(stages: &[PipelineStage], capture: bool) -> Vec<StageWiring> {
    let last = stages.len().saturating_sub(1);
    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            let input = match stage.input_path() {
                Some(path) => InputSource::File(path.to_path_buf()),
                None if i > 0 => InputSource::Pipe,
                None => InputSource::Inherited,
            };
            let output = match stage.output_path() {
                Some(path) => OutputSink::File(path.to_path_buf()),
                None if i < last => OutputSink::Pipe,
                None if capture => OutputSink::Capture,
                None => OutputSink::Inherited,
            };
            StageWiring { input, output }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn compile(line: &str) -> ShellResult<Pipeline> {
        Pipeline::compile(parse_line(line).unwrap(), &HashMap::new())
    }

    #[test]
    fn argv_and_redirections_are_split() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        std::fs::write(&input, "b\na\n").unwrap();

        let line = format!("sort -r < {} > {}", input.display(), output.display());
        let pipeline = compile(&line).unwrap();
        let stage = &pipeline.stages()[0];
        assert_eq!(vec!["sort", "-r"], stage.argv());
        assert_eq!(Some(input.as_path()), stage.input_path());
        assert_eq!(Some(output.as_path()), stage.output_path());
        assert!(output.exists());
    }

    #[test]
    fn later_redirection_replaces_earlier() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let line = format!("echo x > {} >> {}", first.display(), second.display());
        let pipeline = compile(&line).unwrap();
        assert_eq!(Some(second.as_path()), pipeline.stages()[0].output_path());
    }

    #[test]
    fn compile_errors() {
        init();
        assert!(matches!(compile("ls >"), Err(ShellError::MissingRedirectTarget(">"))));
        assert!(matches!(
            compile("ls < | wc"),
            Err(ShellError::MissingRedirectTarget("<"))
        ));
        assert!(matches!(compile("ls |"), Err(ShellError::EmptyCommand)));
        assert!(matches!(compile("| ls"), Err(ShellError::EmptyCommand)));
        match compile("cat < /no/such/file") {
            Err(ShellError::Redirection { path, .. }) => assert_eq!("/no/such/file", path),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn background_and_command_text() {
        init();
        let pipeline = compile("sleep 5 | cat &").unwrap();
        assert!(pipeline.background());
        assert_eq!("sleep 5 | cat", pipeline.command());
        assert_eq!(2, pipeline.stages().len());
    }

    #[test]
    fn aliases_expand_first_word_once() {
        init();
        let aliases = HashMap::from([
            ("ll".to_string(), "ls -l".to_string()),
            ("ls".to_string(), "ls --color".to_string()),
            ("loop".to_string(), "loop again".to_string()),
        ]);
        let pipeline =
            Pipeline::compile(parse_line("ll /tmp | grep ll").unwrap(), &aliases).unwrap();
        assert_eq!(vec!["ls", "-l", "/tmp"], pipeline.stages()[0].argv());
        assert_eq!(vec!["grep", "ll"], pipeline.stages()[1].argv());

        let pipeline = Pipeline::compile(parse_line("loop").unwrap(), &aliases).unwrap();
        assert_eq!(vec!["loop", "again"], pipeline.stages()[0].argv());
    }

    #[test]
    fn wiring_plan() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mid.txt");
        let line = format!("echo hi > {} | cat | wc -l", out.display());
        let pipeline = compile(&line).unwrap();

        let plan = plan_io(pipeline.stages(), true);
        assert_eq!(
            vec![
                StageWiring {
                    input: InputSource::Inherited,
                    output: OutputSink::File(out.clone()),
                },
                StageWiring {
                    input: InputSource::Pipe,
                    output: OutputSink::Pipe,
                },
                StageWiring {
                    input: InputSource::Pipe,
                    output: OutputSink::Capture,
                },
            ],
            plan
        );

        let plan = plan_io(pipeline.stages(), false);
        assert_eq!(OutputSink::Inherited, plan[2].output);
    }

    #[test]
    fn every_stage_has_exactly_one_source_and_sink() {
        init();
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::write(&input, "x").unwrap();
        let lines = [
            "true".to_string(),
            "true | true".to_string(),
            format!("cat < {} | cat | cat", input.display()),
            format!("cat | cat < {}", input.display()),
        ];
        for line in &lines {
            let pipeline = compile(line).unwrap();
            let n = pipeline.stages().len();
            for capture in [true, false] {
                for (i, wiring) in plan_io(pipeline.stages(), capture).iter().enumerate() {
                    if wiring.input == InputSource::Inherited {
                        assert_eq!(0, i, "{line}");
                    }
                    if wiring.output == OutputSink::Capture {
                        assert_eq!(n - 1, i, "{line}");
                    }
                    if i + 1 < n {
                        assert_ne!(OutputSink::Inherited, wiring.output, "{line}");
                    }
                }
            }
        }
    }
}
