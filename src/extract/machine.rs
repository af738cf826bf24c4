//! Character-level state machine locating one top-level string field.
//!
//! The scanner consumes one decoded character at a time and reports whether
//! the caller should keep feeding input. Structural characters only maintain
//! depth/expect-key bookkeeping; only keys at nesting depth exactly 1 are
//! candidates, so a same-named key inside a nested object never matches.

use super::ExtractError;

/// Where emitted value content goes. Bytes rather than `String` because an
/// unpaired surrogate from `\uXXXX` is emitted verbatim in its WTF-8 form,
/// which no Rust string can hold.
pub(crate) trait ValueSink {
    fn push_char(&mut self, ch: char) -> Result<(), ExtractError>;
    fn push_surrogate(&mut self, unit: u16) -> Result<(), ExtractError>;
    /// Called once, when the closing quote of the target value is seen.
    fn finish(&mut self) -> Result<(), ExtractError>;
}

/// What the driver should do after feeding one character.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Continue,
    /// The target value is complete and the sink finalized; stop reading.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Between tokens; structural characters adjust depth.
    Scan,
    /// Inside a string that is neither a depth-1 key nor the target value.
    SkipString,
    /// Inside a depth-1 key, accumulating its name.
    ReadKey,
    /// Past the closing quote of a depth-1 key, expecting `:`.
    AfterKey,
    /// Past `:` of the target key, expecting the opening quote of the value.
    SeekValue,
    /// Streaming the target value to the sink.
    ReadValue,
}

#[derive(Debug, Clone, Copy)]
enum Escape {
    None,
    /// A backslash was consumed; the escape selector comes next.
    Pending,
    /// Inside `\uXXXX`, with this many hex digits still owed.
    Unicode { left: u8, acc: u16 },
}

pub(crate) struct FieldScanner<'a> {
    field: &'a str,
    state: State,
    escape: Escape,
    depth: u32,
    expecting_key: bool,
    key: String,
    key_matches: bool,
    /// High surrogate from `\uXXXX` awaiting its pair, inside the value.
    pending_high: Option<u16>,
    /// Same, while accumulating a key name.
    key_pending_high: Option<u16>,
}

impl<'a> FieldScanner<'a> {
    pub fn new(field: &'a str) -> Self {
        Self {
            field,
            state: State::Scan,
            escape: Escape::None,
            depth: 0,
            expecting_key: false,
            key: String::new(),
            key_matches: false,
            pending_high: None,
            key_pending_high: None,
        }
    }

    /// Consumes one decoded character and returns whether to keep feeding.
    pub fn step(
        &mut self,
        ch: char,
        sink: &mut impl ValueSink,
    ) -> Result<Step, ExtractError> {
        match self.state {
            State::ReadValue => self.step_value(ch, sink),
            State::ReadKey => {
                self.step_key(ch)?;
                Ok(Step::Continue)
            }
            State::SkipString => {
                self.step_skip(ch)?;
                Ok(Step::Continue)
            }
            State::AfterKey => {
                self.step_after_key(ch)?;
                Ok(Step::Continue)
            }
            State::SeekValue => {
                self.step_seek_value(ch)?;
                Ok(Step::Continue)
            }
            State::Scan => {
                self.step_scan(ch);
                Ok(Step::Continue)
            }
        }
    }

    fn step_value(
        &mut self,
        ch: char,
        sink: &mut impl ValueSink,
    ) -> Result<Step, ExtractError> {
        match self.escape {
            Escape::Unicode { left, acc } => {
                let digit = hex_digit(ch).ok_or(ExtractError::InvalidUnicodeEscape)?;
                let acc = (acc << 4) | u16::from(digit);
                if left == 1 {
                    self.escape = Escape::None;
                    self.emit_unit(acc, sink)?;
                } else {
                    self.escape = Escape::Unicode { left: left - 1, acc };
                }
                return Ok(Step::Continue);
            }
            Escape::Pending => {
                self.escape = Escape::None;
                match ch {
                    '"' | '\\' | '/' => self.emit_char(ch, sink)?,
                    'b' => self.emit_char('\u{0008}', sink)?,
                    'f' => self.emit_char('\u{000C}', sink)?,
                    'n' => self.emit_char('\n', sink)?,
                    'r' => self.emit_char('\r', sink)?,
                    't' => self.emit_char('\t', sink)?,
                    'u' => self.escape = Escape::Unicode { left: 4, acc: 0 },
                    _ => return Err(ExtractError::MalformedEscape),
                }
                return Ok(Step::Continue);
            }
            Escape::None => {}
        }

        match ch {
            '\\' => {
                self.escape = Escape::Pending;
                Ok(Step::Continue)
            }
            '"' => {
                if let Some(high) = self.pending_high.take() {
                    sink.push_surrogate(high)?;
                }
                sink.finish()?;
                self.state = State::Scan;
                Ok(Step::Finished)
            }
            other => {
                self.emit_char(other, sink)?;
                Ok(Step::Continue)
            }
        }
    }

    fn step_key(&mut self, ch: char) -> Result<(), ExtractError> {
        match self.escape {
            Escape::Unicode { left, acc } => {
                let digit = hex_digit(ch).ok_or(ExtractError::InvalidUnicodeEscape)?;
                let acc = (acc << 4) | u16::from(digit);
                if left == 1 {
                    self.escape = Escape::None;
                    self.push_key_unit(acc);
                } else {
                    self.escape = Escape::Unicode { left: left - 1, acc };
                }
                return Ok(());
            }
            Escape::Pending => {
                self.escape = Escape::None;
                match ch {
                    '"' | '\\' | '/' => self.push_key_char(ch),
                    'b' => self.push_key_char('\u{0008}'),
                    'f' => self.push_key_char('\u{000C}'),
                    'n' => self.push_key_char('\n'),
                    'r' => self.push_key_char('\r'),
                    't' => self.push_key_char('\t'),
                    'u' => self.escape = Escape::Unicode { left: 4, acc: 0 },
                    _ => return Err(ExtractError::MalformedEscape),
                }
                return Ok(());
            }
            Escape::None => {}
        }

        match ch {
            '\\' => self.escape = Escape::Pending,
            '"' => {
                if self.key_pending_high.take().is_some() {
                    self.key.push(char::REPLACEMENT_CHARACTER);
                }
                self.key_matches = self.key == self.field;
                self.key.clear();
                self.escape = Escape::None;
                self.state = State::AfterKey;
            }
            other => self.push_key_char(other),
        }
        Ok(())
    }

    fn step_skip(&mut self, ch: char) -> Result<(), ExtractError> {
        match self.escape {
            Escape::Unicode { left, acc: _ } => {
                if hex_digit(ch).is_none() {
                    return Err(ExtractError::InvalidUnicodeEscape);
                }
                self.escape = if left == 1 {
                    Escape::None
                } else {
                    Escape::Unicode {
                        left: left - 1,
                        acc: 0,
                    }
                };
                return Ok(());
            }
            Escape::Pending => {
                // Any selector is tolerated in skipped strings; only \u needs
                // follow-up digits consumed.
                self.escape = if ch == 'u' {
                    Escape::Unicode { left: 4, acc: 0 }
                } else {
                    Escape::None
                };
                return Ok(());
            }
            Escape::None => {}
        }

        match ch {
            '\\' => self.escape = Escape::Pending,
            '"' => {
                self.escape = Escape::None;
                self.state = State::Scan;
            }
            _ => {}
        }
        Ok(())
    }

    fn step_after_key(&mut self, ch: char) -> Result<(), ExtractError> {
        if ch.is_whitespace() {
            return Ok(());
        }
        if ch != ':' {
            return Err(ExtractError::MalformedDocument("expected `:` after key"));
        }
        self.state = if self.depth == 1 && self.key_matches {
            State::SeekValue
        } else {
            State::Scan
        };
        Ok(())
    }

    fn step_seek_value(&mut self, ch: char) -> Result<(), ExtractError> {
        if ch.is_whitespace() {
            return Ok(());
        }
        if ch != '"' {
            return Err(ExtractError::NotAString(self.field.to_string()));
        }
        self.escape = Escape::None;
        self.pending_high = None;
        self.state = State::ReadValue;
        Ok(())
    }

    fn step_scan(&mut self, ch: char) {
        match ch {
            '"' => {
                self.escape = Escape::None;
                if self.depth == 1 && self.expecting_key {
                    self.expecting_key = false;
                    self.key.clear();
                    self.key_pending_high = None;
                    self.state = State::ReadKey;
                } else {
                    self.state = State::SkipString;
                }
            }
            '{' | '[' => {
                self.depth += 1;
                if ch == '{' && self.depth == 1 {
                    self.expecting_key = true;
                }
            }
            '}' | ']' => {
                // Clamped at zero, never negative.
                self.depth = self.depth.saturating_sub(1);
            }
            ',' if self.depth == 1 => {
                self.expecting_key = true;
            }
            _ => {}
        }
    }

    /// Emits one decoded UTF-16 unit from `\uXXXX`, recombining surrogate
    /// pairs. A high surrogate not followed by a low one is flushed verbatim,
    /// without error.
    fn emit_unit(&mut self, unit: u16, sink: &mut impl ValueSink) -> Result<(), ExtractError> {
        if let Some(high) = self.pending_high.take() {
            if (0xDC00..=0xDFFF).contains(&unit) {
                let code =
                    0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                let ch = char::from_u32(code).ok_or(ExtractError::InvalidUnicodeEscape)?;
                return sink.push_char(ch);
            }
            sink.push_surrogate(high)?;
        }
        if (0xD800..=0xDBFF).contains(&unit) {
            self.pending_high = Some(unit);
            return Ok(());
        }
        match char::from_u32(u32::from(unit)) {
            Some(ch) => sink.push_char(ch),
            // Lone low surrogate: emitted verbatim like an unpaired high one.
            None => sink.push_surrogate(unit),
        }
    }

    fn emit_char(&mut self, ch: char, sink: &mut impl ValueSink) -> Result<(), ExtractError> {
        if let Some(high) = self.pending_high.take() {
            sink.push_surrogate(high)?;
        }
        sink.push_char(ch)
    }

    fn push_key_unit(&mut self, unit: u16) {
        if let Some(high) = self.key_pending_high.take() {
            if (0xDC00..=0xDFFF).contains(&unit) {
                let code =
                    0x10000 + ((u32::from(high) - 0xD800) << 10) + (u32::from(unit) - 0xDC00);
                if let Some(ch) = char::from_u32(code) {
                    self.key.push(ch);
                    return;
                }
            }
            self.key.push(char::REPLACEMENT_CHARACTER);
        }
        if (0xD800..=0xDBFF).contains(&unit) {
            self.key_pending_high = Some(unit);
            return;
        }
        self.key
            .push(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    fn push_key_char(&mut self, ch: char) {
        if self.key_pending_high.take().is_some() {
            self.key.push(char::REPLACEMENT_CHARACTER);
        }
        self.key.push(ch);
    }
}

fn hex_digit(ch: char) -> Option<u8> {
    ch.to_digit(16).map(|d| d as u8)
}
