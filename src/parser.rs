//! `WWW-Authenticate: Digest ...` parameter parser.
//!
//! Devices may send values such as `realm=","` or `realm="nonce="kaboom""`,
//! so the header is walked one character at a time by an explicit state
//! machine instead of being split on `,` or matched with a regex.
//!
//! A full entry is `<token>=<token | quoted-string>`. For a quoted value the
//! states run
//!
//! ```text
//! Token(key) -> Delimiter('=') -> Branch -> QuotedValue -> Delimiter(',') -> Token(key) ...
//! ```
//!
//! and for a bare value
//!
//! ```text
//! Token(key) -> Delimiter('=') -> Branch -> Token(value) -> Delimiter(',') -> Token(key) ...
//! ```

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::error::ParseError;

/// Challenge parameters keyed by their verbatim (case-sensitive) name.
pub type ChallengeParams = HashMap<String, String>;

/// Scheme token every accepted challenge starts with.
pub const DIGEST_SCHEME: &str = "Digest";

/// Longest accepted header, in characters.
pub const MAX_HEADER_LEN: usize = 512;

const RFC2616_SEPARATORS: &str = "()<>@,;:\\\"/[]?={} \t";

fn is_rfc2616_separator(c: char) -> bool {
    RFC2616_SEPARATORS.contains(c)
}

fn ends_token(c: char) -> bool {
    c.is_ascii_control() || is_rfc2616_separator(c)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenRole {
    Key,
    Value { key: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Delimiter {
    /// `=` between a key and its value
    Equals { key: String },
    /// `,` between a committed value and the next key
    Comma,
}

impl Delimiter {
    fn ch(&self) -> char {
        match self {
            Delimiter::Equals { .. } => '=',
            Delimiter::Comma => ',',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ParserState {
    /// Unquoted token. Leading spaces are skipped; the first separator or
    /// control character ends it and is re-examined by the next state.
    Token {
        role: TokenRole,
        buf: String,
        start: Option<usize>,
    },
    /// Skips spaces, then requires exactly the expected character.
    Delimiter(Delimiter),
    /// Looks at the next non-space character, without consuming it, to pick
    /// between a quoted-string and a bare token.
    Branch { key: String },
    /// Quoted-string. `\` takes the following character verbatim.
    QuotedValue {
        key: String,
        buf: String,
        opened: bool,
        escape: bool,
    },
}

impl ParserState {
    fn expect_key() -> Self {
        ParserState::Token {
            role: TokenRole::Key,
            buf: String::new(),
            start: None,
        }
    }
}

impl Display for ParserState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParserState::Token { role, start, .. } => {
                let role = match role {
                    TokenRole::Key => "key",
                    TokenRole::Value { .. } => "value",
                };
                match start {
                    Some(start) => write!(f, "Token[{role},start={start}]"),
                    None => write!(f, "Token[{role},pending]"),
                }
            }
            ParserState::Delimiter(d) => write!(f, "Delimiter[{}]", d.ch()),
            ParserState::Branch { key } => write!(f, "Branch[key={key}]"),
            ParserState::QuotedValue {
                key, opened, escape, ..
            } => write!(f, "QuotedValue[key={key},opened={opened},escape={escape}]"),
        }
    }
}

/// Outcome of feeding one character to the machine.
#[derive(Debug)]
struct Transition {
    next: ParserState,
    /// `false` re-examines the same character against `next`.
    advance: bool,
    /// A finished `key -> value` pair.
    emit: Option<(String, String)>,
}

impl Transition {
    fn consume(next: ParserState) -> Self {
        Transition {
            next,
            advance: true,
            emit: None,
        }
    }

    fn reexamine(next: ParserState) -> Self {
        Transition {
            next,
            advance: false,
            emit: None,
        }
    }

    fn commit(key: String, value: String, advance: bool) -> Self {
        Transition {
            next: ParserState::Delimiter(Delimiter::Comma),
            advance,
            emit: Some((key, value)),
        }
    }
}

fn unexpected(c: char, pos: usize, state: &ParserState) -> ParseError {
    ParseError::UnexpectedChar {
        ch: c,
        pos,
        state: state.to_string(),
    }
}

/// Single step of the machine. `seen` is only consulted for duplicate keys.
fn step(
    state: ParserState,
    c: char,
    pos: usize,
    seen: &ChallengeParams,
) -> Result<Transition, ParseError> {
    match state {
        ParserState::Token {
            role,
            mut buf,
            start,
        } => {
            if start.is_none() && c == ' ' {
                // leading whitespace only, not in the middle of a token
                return Ok(Transition::consume(ParserState::Token { role, buf, start }));
            }

            if !ends_token(c) {
                buf.push(c);
                return Ok(Transition::consume(ParserState::Token {
                    role,
                    buf,
                    start: start.or(Some(pos)),
                }));
            }

            if buf.is_empty() {
                return Err(unexpected(c, pos, &ParserState::Token { role, buf, start }));
            }

            match role {
                TokenRole::Key => {
                    if seen.contains_key(&buf) {
                        return Err(ParseError::DuplicateKey { key: buf, pos });
                    }
                    Ok(Transition::reexamine(ParserState::Delimiter(
                        Delimiter::Equals { key: buf },
                    )))
                }
                TokenRole::Value { key } => Ok(Transition::commit(key, buf, false)),
            }
        }
        ParserState::Delimiter(delim) => {
            if c == ' ' {
                return Ok(Transition::consume(ParserState::Delimiter(delim)));
            }
            if c != delim.ch() {
                return Err(unexpected(c, pos, &ParserState::Delimiter(delim)));
            }
            Ok(Transition::consume(match delim {
                Delimiter::Equals { key } => ParserState::Branch { key },
                Delimiter::Comma => ParserState::expect_key(),
            }))
        }
        ParserState::Branch { key } => {
            if c == ' ' {
                return Ok(Transition::consume(ParserState::Branch { key }));
            }
            if c == '"' {
                Ok(Transition::reexamine(ParserState::QuotedValue {
                    key,
                    buf: String::new(),
                    opened: false,
                    escape: false,
                }))
            } else if !is_rfc2616_separator(c) {
                Ok(Transition::reexamine(ParserState::Token {
                    role: TokenRole::Value { key },
                    buf: String::new(),
                    start: None,
                }))
            } else {
                Err(unexpected(c, pos, &ParserState::Branch { key }))
            }
        }
        ParserState::QuotedValue {
            key,
            mut buf,
            opened,
            escape,
        } => {
            if !opened {
                if c != '"' {
                    return Err(unexpected(
                        c,
                        pos,
                        &ParserState::QuotedValue {
                            key,
                            buf,
                            opened,
                            escape,
                        },
                    ));
                }
                return Ok(Transition::consume(ParserState::QuotedValue {
                    key,
                    buf,
                    opened: true,
                    escape: false,
                }));
            }

            if escape {
                buf.push(c);
                return Ok(Transition::consume(ParserState::QuotedValue {
                    key,
                    buf,
                    opened,
                    escape: false,
                }));
            }

            match c {
                '\\' => Ok(Transition::consume(ParserState::QuotedValue {
                    key,
                    buf,
                    opened,
                    escape: true,
                })),
                '"' => Ok(Transition::commit(key, buf, true)),
                _ => {
                    buf.push(c);
                    Ok(Transition::consume(ParserState::QuotedValue {
                        key,
                        buf,
                        opened,
                        escape,
                    }))
                }
            }
        }
    }
}

/// Parse a `WWW-Authenticate` challenge into its parameters.
///
/// # Errors
///
/// Fails if the header does not start with `Digest`, is longer than
/// [`MAX_HEADER_LEN`] characters, repeats a key, contains a character that
/// is not allowed where it appears, or ends anywhere but right after a
/// complete value.
pub fn parse_challenge(header: &str) -> Result<ChallengeParams, ParseError> {
    let Some(rest) = header.strip_prefix(DIGEST_SCHEME) else {
        return Err(ParseError::BadPrefix);
    };

    let len = header.chars().count();
    if len > MAX_HEADER_LEN {
        return Err(ParseError::TooLong { len });
    }

    let raw_params: Vec<char> = rest.trim_start_matches(' ').chars().collect();

    let mut out = ChallengeParams::new();
    let mut state = ParserState::expect_key();
    let mut pos = 0;

    while let Some(&c) = raw_params.get(pos) {
        let transition = step(state, c, pos, &out)?;
        if let Some((key, value)) = transition.emit {
            out.insert(key, value);
        }
        state = transition.next;
        if transition.advance {
            pos += 1;
        }
    }

    match state {
        // only a just-committed value may end the input
        ParserState::Delimiter(Delimiter::Comma) => Ok(out),
        state => Err(ParseError::UnexpectedEnd {
            state: state.to_string(),
        }),
    }
}
