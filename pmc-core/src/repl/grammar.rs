//! Console line grammar.
//!
//! `regal` turns a line into a bounded token list; a small set of `winnow`
//! parsers then walks the static catalog in [`super::catalog`] over those
//! tokens, so the help text and the accepted syntax cannot drift apart.

use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::{IncrementalError, TokenCache};
use regal_macros::RegalLexer;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;

use super::catalog::{
    self, ChoiceBranch, ChoiceTag, CommandTag, DefaultChoice, HelpTopics, Node, ValueSpec,
};
use crate::power::FullPowerReason;

/// Tokens accepted on one console line.
pub const TOKEN_CAPACITY: usize = 24;
const LEXER_RECORDS: usize = TOKEN_CAPACITY * 2;

#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// `250ms`, `2s`, `40us`.
    #[regex(r"[0-9]+(?:us|ms|s)", priority = 2)]
    Duration,
    #[regex(r"[0-9]+")]
    Integer,
    /// Command names, keywords and help topics. Matched case-insensitively.
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Word,
    #[token("=")]
    Assign,
    #[regex(r"[ \t]+", skip)]
    Blank,
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    LineEnd,
    #[default]
    #[regex(r".", priority = 1024)]
    Unknown,
}

/// One lexeme and where it sits in the line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub span: Range<usize>,
}

pub type Tokens<'a> = HeaplessVec<Token<'a>, TOKEN_CAPACITY>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// The line holds more than [`TOKEN_CAPACITY`] tokens.
    Overflow,
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::Overflow => write!(f, "more than {TOKEN_CAPACITY} tokens on one line"),
            LexError::Engine => f.write_str("lexer failure"),
        }
    }
}

/// Why a well-lexed line is not a valid command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyntaxError<'a> {
    Expected {
        wanted: &'static str,
        /// `None` when the line ended first.
        found: Option<&'a str>,
        at: usize,
    },
    /// Numeric argument outside `0..=255`.
    Number { text: &'a str, at: usize },
    Unrecognized { text: &'a str, at: usize },
}

impl<'a> SyntaxError<'a> {
    fn expected(wanted: &'static str, token: Option<&Token<'a>>) -> Self {
        SyntaxError::Expected {
            wanted,
            found: token.map(|token| token.text),
            at: token.map_or(0, |token| token.span.start),
        }
    }
}

impl fmt::Display for SyntaxError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::Expected {
                wanted,
                found: Some(found),
                at,
            } => write!(f, "expected {wanted} but got `{found}` (column {at})"),
            SyntaxError::Expected {
                wanted,
                found: None,
                ..
            } => write!(f, "expected {wanted} before end of line"),
            SyntaxError::Number { text, at } => {
                write!(f, "`{text}` is not a number in 0-255 (column {at})")
            }
            SyntaxError::Unrecognized { text, at } => {
                write!(f, "unrecognized input `{text}` (column {at})")
            }
        }
    }
}

type TokenStream<'src, 'slice> = &'slice [Token<'src>];
type Step<'a, T> = Result<T, ErrMode<SyntaxError<'a>>>;

impl<'src, 'slice> ParserError<TokenStream<'src, 'slice>> for SyntaxError<'src>
where
    'src: 'slice,
{
    type Inner = Self;

    fn from_input(input: &TokenStream<'src, 'slice>) -> Self {
        SyntaxError::expected("token", input.first())
    }

    fn into_inner(self) -> Result<Self::Inner, Self> {
        Ok(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Syntax(SyntaxError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(error) => fmt::Display::fmt(error, f),
            ParseError::Syntax(error) => fmt::Display::fmt(error, f),
        }
    }
}

/// A parsed console command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    FullPower(FullPowerReason),
    Imps,
    Bmps,
    Uapsd(UapsdCommand),
    Standby,
    Wowl(WowlCommand),
    LowPower(LowPowerCommand),
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UapsdCommand {
    Start,
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WowlCommand {
    /// Magic packet plus `patterns` demo wake patterns.
    Enter { patterns: Option<u8> },
    Exit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LowPowerCommand {
    Enter,
    Exit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

/// Splits `line` into tokens. Unlexable input becomes [`TokenKind::Unknown`].
pub fn lex(line: &str) -> Result<Tokens<'_>, LexError> {
    let mut cache: TokenCache<TokenKind, LEXER_RECORDS> = TokenCache::new();
    let tail = cache
        .rebuild(TokenKind::lexer(), line)
        .map_err(|error| match error {
            IncrementalError::TokenOverflow => LexError::Overflow,
            _ => LexError::Engine,
        })?;

    let mut tokens = Tokens::new();
    let lexed = cache
        .tokens()
        .filter(|record| !record.skipped)
        .map(|record| (record.token, record.start..record.end));
    for (kind, span) in lexed {
        let text = &line[span.clone()];
        tokens
            .push(Token { kind, text, span })
            .map_err(|_| LexError::Overflow)?;
    }

    if let Some(tail) = tail.filter(|tail| !tail.fragment.is_empty()) {
        let span = tail.start..tail.start + tail.fragment.len();
        tokens
            .push(Token {
                kind: TokenKind::Unknown,
                text: tail.fragment,
                span,
            })
            .map_err(|_| LexError::Overflow)?;
    }

    Ok(tokens)
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Unknown) {
        return Err(ParseError::Syntax(SyntaxError::Unrecognized {
            text: token.text,
            at: token.span.start,
        }));
    }

    let mut rest = tokens.as_slice();
    let command = command
        .parse_next(&mut rest)
        .map_err(|error| match error {
            ErrMode::Backtrack(error) | ErrMode::Cut(error) => error,
            ErrMode::Incomplete(_) => SyntaxError::expected("token", rest.first()),
        })
        .map_err(ParseError::Syntax)?;

    match rest.iter().find(|token| token.kind != TokenKind::LineEnd) {
        Some(extra) => Err(ParseError::Syntax(SyntaxError::expected(
            "end of command",
            Some(extra),
        ))),
        None => Ok(command),
    }
}

/// Parses a duration literal such as `250ms`, `2s` or `40us`.
#[must_use]
pub fn parse_duration_literal(text: &str) -> Option<Duration> {
    let (digits, scale): (&str, fn(u64) -> Duration) = if let Some(digits) =
        text.strip_suffix("us")
    {
        (digits, Duration::from_micros)
    } else if let Some(digits) = text.strip_suffix("ms") {
        (digits, Duration::from_millis)
    } else {
        (text.strip_suffix('s')?, Duration::from_secs)
    };
    digits.parse::<u64>().ok().map(scale)
}

fn command<'src>(input: &mut TokenStream<'src, '_>) -> Step<'src, Command<'src>> {
    let name = token_of(TokenKind::Word, "command name").parse_next(input)?;
    let Some(spec) = catalog::find(name.text) else {
        return Err(ErrMode::Cut(SyntaxError::expected(
            "command name",
            Some(&name),
        )));
    };

    let mut builder = Builder::new(spec.tag);
    walk(spec.grammar, input, &mut builder)?;
    builder.finish().map_err(ErrMode::Cut)
}

fn walk<'src>(
    node: &'static Node,
    input: &mut TokenStream<'src, '_>,
    builder: &mut Builder<'src>,
) -> Step<'src, ()> {
    match node {
        Node::End => Ok(()),
        Node::OptionalChoice { choices, default } => {
            walk_choice(choices, *default, input, builder)
        }
        Node::Topic { topics, next } => {
            take_topic(*topics, input, builder)?;
            walk(next, input, builder)
        }
    }
}

fn walk_choice<'src>(
    choices: &'static [ChoiceBranch],
    default: Option<DefaultChoice>,
    input: &mut TokenStream<'src, '_>,
    builder: &mut Builder<'src>,
) -> Step<'src, ()> {
    let wanted = choices.first().map_or("keyword", |choice| choice.keyword);
    let Some((token, rest)) = input.split_first() else {
        return take_default(default, input, builder);
    };

    match token.kind {
        TokenKind::LineEnd => take_default(default, input, builder),
        TokenKind::Word => {
            let Some(branch) = choices
                .iter()
                .find(|choice| choice.keyword.eq_ignore_ascii_case(token.text))
            else {
                return Err(ErrMode::Cut(SyntaxError::expected(wanted, Some(token))));
            };
            *input = rest;
            let value = take_value(branch.value, input)?;
            builder.choose(branch.tag, value)?;
            walk(branch.next, input, builder)
        }
        _ => Err(ErrMode::Cut(SyntaxError::expected(wanted, Some(token)))),
    }
}

fn take_default<'src>(
    default: Option<DefaultChoice>,
    input: &mut TokenStream<'src, '_>,
    builder: &mut Builder<'src>,
) -> Step<'src, ()> {
    let Some(default) = default else {
        return Ok(());
    };
    builder.choose(default.tag, None)?;
    walk(default.next, input, builder)
}

fn take_topic<'src>(
    topics: HelpTopics,
    input: &mut TokenStream<'src, '_>,
    builder: &mut Builder<'src>,
) -> Step<'src, ()> {
    if topics == HelpTopics::None {
        return Ok(());
    }

    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Word => {
            builder.topic(token.text);
            *input = rest;
            Ok(())
        }
        Some((token, _)) if token.kind != TokenKind::LineEnd => Err(ErrMode::Cut(
            SyntaxError::expected("help topic", Some(token)),
        )),
        _ => Ok(()),
    }
}

fn take_value<'src>(spec: ValueSpec, input: &mut TokenStream<'src, '_>) -> Step<'src, Option<u8>> {
    match spec {
        ValueSpec::None => Ok(None),
        ValueSpec::IntegerAssignment { .. } => {
            token_of(TokenKind::Assign, "`=`").parse_next(input)?;
            let number = token_of(TokenKind::Integer, "number").parse_next(input)?;
            number
                .text
                .parse::<u8>()
                .map(Some)
                .map_err(|_| {
                    ErrMode::Cut(SyntaxError::Number {
                        text: number.text,
                        at: number.span.start,
                    })
                })
        }
    }
}

/// Consumes one token of `kind`.
fn token_of<'src, 'slice>(
    kind: TokenKind,
    wanted: &'static str,
) -> impl Parser<TokenStream<'src, 'slice>, Token<'src>, ErrMode<SyntaxError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut TokenStream<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        other => Err(ErrMode::Backtrack(SyntaxError::expected(
            wanted,
            other.map(|(token, _)| token),
        ))),
    }
}

/// Accumulates choices for one command, then checks it is complete.
enum Builder<'a> {
    FullPower(Option<FullPowerReason>),
    Imps,
    Bmps,
    Uapsd(Option<UapsdCommand>),
    Standby,
    Wowl(Option<WowlCommand>),
    LowPower(Option<LowPowerCommand>),
    Status,
    Help(Option<&'a str>),
}

impl<'a> Builder<'a> {
    fn new(tag: CommandTag) -> Self {
        match tag {
            CommandTag::FullPower => Builder::FullPower(None),
            CommandTag::Imps => Builder::Imps,
            CommandTag::Bmps => Builder::Bmps,
            CommandTag::Uapsd => Builder::Uapsd(None),
            CommandTag::Standby => Builder::Standby,
            CommandTag::Wowl => Builder::Wowl(None),
            CommandTag::LowPower => Builder::LowPower(None),
            CommandTag::Status => Builder::Status,
            CommandTag::Help => Builder::Help(None),
        }
    }

    fn choose(&mut self, tag: ChoiceTag, value: Option<u8>) -> Step<'a, ()> {
        match (self, tag) {
            (Builder::FullPower(reason), tag) => {
                *reason = Some(match tag {
                    ChoiceTag::ReasonHost => FullPowerReason::Host,
                    ChoiceTag::ReasonQos => FullPowerReason::Qos,
                    ChoiceTag::ReasonRoam => FullPowerReason::Roam,
                    _ => FullPowerReason::Other,
                });
            }
            (Builder::Uapsd(action), ChoiceTag::UapsdStart) => *action = Some(UapsdCommand::Start),
            (Builder::Uapsd(action), ChoiceTag::UapsdStop) => *action = Some(UapsdCommand::Stop),
            (Builder::Wowl(action), ChoiceTag::WowlEnter) => {
                *action = Some(WowlCommand::Enter { patterns: None });
            }
            (Builder::Wowl(action), ChoiceTag::WowlExit) => *action = Some(WowlCommand::Exit),
            (Builder::Wowl(Some(WowlCommand::Enter { patterns })), ChoiceTag::WowlPatterns) => {
                *patterns = value;
            }
            (Builder::LowPower(action), ChoiceTag::LowPowerEnter) => {
                *action = Some(LowPowerCommand::Enter);
            }
            (Builder::LowPower(action), ChoiceTag::LowPowerExit) => {
                *action = Some(LowPowerCommand::Exit);
            }
            _ => return Err(ErrMode::Cut(SyntaxError::expected("valid keyword", None))),
        }
        Ok(())
    }

    fn topic(&mut self, topic: &'a str) {
        if let Builder::Help(slot) = self {
            *slot = Some(topic);
        }
    }

    fn finish(self) -> Result<Command<'a>, SyntaxError<'a>> {
        let missing = |wanted| SyntaxError::expected(wanted, None);
        match self {
            Builder::FullPower(reason) => Ok(Command::FullPower(
                reason.unwrap_or(FullPowerReason::Other),
            )),
            Builder::Imps => Ok(Command::Imps),
            Builder::Bmps => Ok(Command::Bmps),
            Builder::Standby => Ok(Command::Standby),
            Builder::Status => Ok(Command::Status),
            Builder::Help(topic) => Ok(Command::Help(HelpCommand { topic })),
            Builder::Uapsd(action) => action.map(Command::Uapsd).ok_or(missing("start or stop")),
            Builder::Wowl(action) => action.map(Command::Wowl).ok_or(missing("enter or exit")),
            Builder::LowPower(action) => action
                .map(Command::LowPower)
                .ok_or(missing("enter or exit")),
        }
    }
}
