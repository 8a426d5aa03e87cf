use msh_types::ShellError;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use tracing::debug;

#[derive(Parser, Debug, Clone)]
#[grammar = "shell.pest"]
pub struct ShellParser;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RedirectOp {
    /// `<`
    Read,
    /// `>`
    Write,
    /// `>>`
    Append,
}

impl RedirectOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectOp::Read => "<",
            RedirectOp::Write => ">",
            RedirectOp::Append => ">>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Redirect(RedirectOp),
}

/// A line split into stage token groups. Stages may be empty (`ls |`); that is
/// reported when the stage is compiled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedLine {
    pub stages: Vec<Vec<Token>>,
    pub background: bool,
    command_text: String,
}

impl ParsedLine {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Source text of the line without the trailing `&`.
    pub fn command_text(&self) -> &str {
        &self.command_text
    }

    /// First word of a single-stage line, used for builtin lookup.
    pub fn single_command_name(&self) -> Option<&str> {
        match self.stages.as_slice() {
            [stage] => {
                let mut skip_target = false;
                for token in stage {
                    match token {
                        Token::Redirect(_) => skip_target = true,
                        Token::Word(_) if skip_target => skip_target = false,
                        Token::Word(w) => return Some(w.as_str()),
                    }
                }
                None
            }
            _ => None,
        }
    }
}

enum Lexeme {
    Token(Token),
    Pipe,
    Background,
}

pub fn parse_line(input: &str) -> Result<ParsedLine, ShellError> {
    let pairs = ShellParser::parse(Rule::line, input)
        .map_err(|e| ShellError::Parse(e.to_string()))?;

    let mut lexemes: Vec<(Lexeme, usize, usize)> = Vec::new();
    for pair in pairs.flat_map(|p| p.into_inner()) {
        let span = pair.as_span();
        let lexeme = match pair.as_rule() {
            Rule::append => Lexeme::Token(Token::Redirect(RedirectOp::Append)),
            Rule::write => Lexeme::Token(Token::Redirect(RedirectOp::Write)),
            Rule::read => Lexeme::Token(Token::Redirect(RedirectOp::Read)),
            Rule::pipe => Lexeme::Pipe,
            Rule::background => Lexeme::Background,
            Rule::word => Lexeme::Token(Token::Word(word_value(pair))),
            _ => continue,
        };
        lexemes.push((lexeme, span.start(), span.end()));
    }

    let mut background = false;
    if let Some((Lexeme::Background, _, _)) = lexemes.last() {
        background = true;
        lexemes.pop();
    }

    let command_text = match (lexemes.first(), lexemes.last()) {
        (Some((_, start, _)), Some((_, _, end))) => input[*start..*end].to_string(),
        _ => String::new(),
    };

    let mut stages: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let count = lexemes.len();
    for (lexeme, start, _) in lexemes {
        match lexeme {
            Lexeme::Token(token) => current.push(token),
            Lexeme::Pipe => stages.push(std::mem::take(&mut current)),
            Lexeme::Background => {
                return Err(ShellError::Parse(format!(
                    "unexpected '&' at column {}",
                    start + 1
                )));
            }
        }
    }
    if count > 0 {
        stages.push(current);
    }

    debug!(
        "parse_line: {} stage(s) background:{} text:{:?}",
        stages.len(),
        background,
        command_text
    );

    Ok(ParsedLine {
        stages,
        background,
        command_text,
    })
}

fn word_value(pair: Pair<Rule>) -> String {
    let mut value = String::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::bare => value.push_str(part.as_str()),
            Rule::escaped => value.push_str(&part.as_str()[1..]),
            Rule::s_quoted => {
                if let Some(inner) = part.into_inner().next() {
                    value.push_str(inner.as_str());
                }
            }
            Rule::d_quoted => {
                for inner in part.into_inner().flat_map(|p| p.into_inner()) {
                    match inner.as_rule() {
                        Rule::d_escape => {
                            let escaped = &inner.as_str()[1..];
                            if escaped == "\"" || escaped == "\\" {
                                value.push_str(escaped);
                            } else {
                                value.push_str(inner.as_str());
                            }
                        }
                        _ => value.push_str(inner.as_str()),
                    }
                }
            }
            _ => value.push_str(part.as_str()),
        }
    }
    value
}
