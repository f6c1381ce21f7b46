//! Byte-class tokenizers for ingestion and querying.
//!
//! Input is split into maximal runs of one byte class, the *base tokens*:
//!
//! | Class              | Bytes                      |
//! |--------------------|----------------------------|
//! | `AsciiAlphaNum`    | `[a-zA-Z0-9]`              |
//! | `AsciiOther`       | every other byte `< 0x80`  |
//! | `Unicode`          | bytes `>= 0x80`            |
//!
//! Each base token is pushed into a five-slot [`TokenWindow`] and every
//! configured [`DerivedTokenizer`] inspects the window to emit further
//! tokens (combos, n-grams).  The tokenizer only reports spans; it never
//! copies bytes.
//!
//! [`WindowTokenizer::full`] is used at ingestion.  [`WindowTokenizer::ngram`]
//! derives the sub-tokens of a query term so that every substring query
//! maps onto tokens the full tokenizer stored.

#[cfg(test)]
mod tests;

use std::collections::HashSet;

// ------------------------------------------------------------------------------------------------
// Lowercase
// ------------------------------------------------------------------------------------------------

const fn build_lowercase() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = if i >= b'A' as usize && i <= b'Z' as usize {
            (i as u8) + (b'a' - b'A')
        } else {
            i as u8
        };
        i += 1;
    }
    table
}

/// Maps `A-Z` to `a-z`; every other byte maps to itself.
pub const LOWERCASE: [u8; 256] = build_lowercase();

#[inline]
pub fn to_lowercase_byte(byte: u8) -> u8 {
    LOWERCASE[byte as usize]
}

/// Lowercases `source` into `target`, replacing its contents.
pub fn to_lowercase_into(source: &[u8], target: &mut Vec<u8>) {
    target.clear();
    target.extend(source.iter().map(|&byte| to_lowercase_byte(byte)));
}

pub fn to_lowercase(source: &[u8]) -> Vec<u8> {
    let mut target = Vec::with_capacity(source.len());
    to_lowercase_into(source, &mut target);
    target
}

// ------------------------------------------------------------------------------------------------
// Token types
// ------------------------------------------------------------------------------------------------

/// Kind of an emitted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TokenType {
    AsciiAlphaNum = 1,
    AsciiOther = 2,
    Unicode = 3,
    /// `alnum` + one of `.:-_/\@` + `alnum`, e.g. `host:93`.
    Combo = 4,
    /// `alnum.alnum.alnum`, e.g. `www.example.com`.
    DotCombo = 5,
    AsciiAlphaNumTriGram = 6,
    UnicodeTwoGram = 7,
    AsciiOtherNGram = 8,
}

impl TokenType {
    /// Base class of a single byte.
    #[inline]
    pub fn of_byte(byte: u8) -> TokenType {
        if byte.is_ascii_alphanumeric() {
            TokenType::AsciiAlphaNum
        } else if byte.is_ascii() {
            TokenType::AsciiOther
        } else {
            TokenType::Unicode
        }
    }
}

const fn is_combo_separator(byte: u8) -> bool {
    matches!(byte, b'.' | b':' | b'-' | b'_' | b'/' | b'\\' | b'@')
}

// ------------------------------------------------------------------------------------------------
// Token window
// ------------------------------------------------------------------------------------------------

/// A base token span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenType,
    pub offset: usize,
    pub length: usize,
}

const WINDOW: usize = 5;

/// The most recent base tokens of the current input, newest at tail index 0.
#[derive(Debug, Default)]
pub struct TokenWindow {
    slots: [Option<Token>; WINDOW],
    next: usize,
}

impl TokenWindow {
    pub fn push(&mut self, token: Token) {
        self.slots[self.next] = Some(token);
        self.next = (self.next + 1) % WINDOW;
    }

    /// The token `tail_index` steps back (0 = latest).
    pub fn tail(&self, tail_index: usize) -> Option<Token> {
        if tail_index >= WINDOW {
            return None;
        }
        self.slots[(self.next + WINDOW - 1 - tail_index) % WINDOW]
    }

    /// Whether the latest `expected.len()` tokens have these types, oldest first.
    pub fn matches(&self, expected: &[TokenType]) -> bool {
        let count = expected.len();
        count <= WINDOW
            && expected
                .iter()
                .enumerate()
                .all(|(i, kind)| self.tail(count - 1 - i).is_some_and(|t| t.kind == *kind))
    }
}

// ------------------------------------------------------------------------------------------------
// Tokenizer
// ------------------------------------------------------------------------------------------------

/// Receives `(type, offset, length)` for every token found.
pub type TokenConsumer<'a> = dyn FnMut(TokenType, usize, usize) + 'a;

/// Emits derived tokens from the window after each base token.
pub type DerivedTokenizer = fn(&[u8], &TokenWindow, &mut TokenConsumer<'_>);

/// Splits bytes into token spans.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, bytes: &[u8], consumer: &mut TokenConsumer<'_>);
}

/// Base-token splitter with a sliding window of derived tokenizers.
#[derive(Debug, Clone)]
pub struct WindowTokenizer {
    forward_base_tokens: bool,
    derived: Vec<DerivedTokenizer>,
}

impl WindowTokenizer {
    pub fn builder() -> TokenizerBuilder {
        TokenizerBuilder::default()
    }

    /// All base tokens plus combos, dot-combos, trigrams of long alphanumeric
    /// runs, n-grams of punctuation runs, and 2-grams of long non-ASCII runs.
    pub fn full() -> Self {
        Self::builder()
            .forward_base_tokens()
            .derive(combo_terms)
            .derive(dot_combo_terms)
            .derive(alpha_num_tri_grams)
            .derive(other_n_grams)
            .derive(unicode_two_grams)
            .build()
    }

    /// Only n-grams, with no minimum run length.
    pub fn ngram() -> Self {
        Self::builder()
            .derive(query_alpha_num_tri_grams)
            .derive(query_other_n_grams)
            .derive(query_unicode_two_grams)
            .build()
    }

    fn emit(&self, bytes: &[u8], window: &mut TokenWindow, token: Token, consumer: &mut TokenConsumer<'_>) {
        if self.forward_base_tokens {
            consumer(token.kind, token.offset, token.length);
        }
        window.push(token);
        for derived in &self.derived {
            derived(bytes, window, consumer);
        }
    }
}

impl Tokenizer for WindowTokenizer {
    fn tokenize(&self, bytes: &[u8], consumer: &mut TokenConsumer<'_>) {
        let mut window = TokenWindow::default();
        let mut start = 0;
        let mut current: Option<TokenType> = None;

        for (index, &byte) in bytes.iter().enumerate() {
            let kind = TokenType::of_byte(byte);
            match current {
                Some(run) if run != kind => {
                    let token = Token {
                        kind: run,
                        offset: start,
                        length: index - start,
                    };
                    self.emit(bytes, &mut window, token, consumer);
                    start = index;
                    current = Some(kind);
                }
                Some(_) => {}
                None => current = Some(kind),
            }
        }

        if let Some(run) = current {
            let token = Token {
                kind: run,
                offset: start,
                length: bytes.len() - start,
            };
            self.emit(bytes, &mut window, token, consumer);
        }
    }
}

/// Assembles a [`WindowTokenizer`].
#[derive(Debug, Default)]
pub struct TokenizerBuilder {
    forward_base_tokens: bool,
    derived: Vec<DerivedTokenizer>,
}

impl TokenizerBuilder {
    /// Report every base token, not only derived ones.
    pub fn forward_base_tokens(mut self) -> Self {
        self.forward_base_tokens = true;
        self
    }

    pub fn derive(mut self, derived: DerivedTokenizer) -> Self {
        self.derived.push(derived);
        self
    }

    pub fn build(self) -> WindowTokenizer {
        WindowTokenizer {
            forward_base_tokens: self.forward_base_tokens,
            derived: self.derived,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Derived tokenizers: ingestion
// ------------------------------------------------------------------------------------------------

/// `alnum sep alnum` with a single-byte separator from `.:-_/\@`.
pub fn combo_terms(bytes: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    use TokenType::*;
    if !window.matches(&[AsciiAlphaNum, AsciiOther, AsciiAlphaNum]) {
        return;
    }
    let (Some(first), Some(separator), Some(last)) = (window.tail(2), window.tail(1), window.tail(0))
    else {
        return;
    };
    if separator.length == 1 && is_combo_separator(bytes[separator.offset]) {
        consumer(Combo, first.offset, first.length + separator.length + last.length);
    }
}

/// `alnum.alnum.alnum`.
pub fn dot_combo_terms(bytes: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    use TokenType::*;
    if !window.matches(&[AsciiAlphaNum, AsciiOther, AsciiAlphaNum, AsciiOther, AsciiAlphaNum]) {
        return;
    }
    let (Some(first), Some(dot1), Some(dot2), Some(last)) =
        (window.tail(4), window.tail(3), window.tail(1), window.tail(0))
    else {
        return;
    };
    let is_dot = |t: Token| t.length == 1 && bytes[t.offset] == b'.';
    if is_dot(dot1) && is_dot(dot2) {
        consumer(DotCombo, first.offset, last.offset - first.offset + last.length);
    }
}

/// All 3-grams of an alphanumeric run longer than 3.
pub fn alpha_num_tri_grams(_: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    if let Some(token) = latest(window, TokenType::AsciiAlphaNum).filter(|t| t.length > 3) {
        n_grams(token, 3, TokenType::AsciiAlphaNumTriGram, consumer);
    }
}

/// 1-grams of punctuation runs of at least 2, 2-grams from 3, 3-grams from 4.
pub fn other_n_grams(_: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    let Some(token) = latest(window, TokenType::AsciiOther) else {
        return;
    };
    for n in 1..=3 {
        if token.length <= n {
            return;
        }
        n_grams(token, n, TokenType::AsciiOtherNGram, consumer);
    }
}

/// All 2-grams of a non-ASCII run longer than 2.
pub fn unicode_two_grams(_: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    if let Some(token) = latest(window, TokenType::Unicode).filter(|t| t.length > 2) {
        n_grams(token, 2, TokenType::UnicodeTwoGram, consumer);
    }
}

// ------------------------------------------------------------------------------------------------
// Derived tokenizers: query
// ------------------------------------------------------------------------------------------------

fn query_alpha_num_tri_grams(_: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    if let Some(token) = latest(window, TokenType::AsciiAlphaNum) {
        n_grams(token, 3, TokenType::AsciiAlphaNumTriGram, consumer);
    }
}

fn query_other_n_grams(_: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    if let Some(token) = latest(window, TokenType::AsciiOther) {
        for n in 1..=3 {
            n_grams(token, n, TokenType::AsciiOtherNGram, consumer);
        }
    }
}

fn query_unicode_two_grams(_: &[u8], window: &TokenWindow, consumer: &mut TokenConsumer<'_>) {
    if let Some(token) = latest(window, TokenType::Unicode) {
        n_grams(token, 2, TokenType::UnicodeTwoGram, consumer);
    }
}

fn latest(window: &TokenWindow, kind: TokenType) -> Option<Token> {
    window.tail(0).filter(|t| t.kind == kind)
}

fn n_grams(token: Token, n: usize, kind: TokenType, consumer: &mut TokenConsumer<'_>) {
    for start in 0..token.length.saturating_sub(n - 1) {
        consumer(kind, token.offset + start, n);
    }
}

// ------------------------------------------------------------------------------------------------
// Query token sampling
// ------------------------------------------------------------------------------------------------

/// Tokens longer than this are selective enough to make useful queries.
const MIN_QUERY_TOKEN_LEN: usize = 9;

/// Collects up to `limit` distinct long tokens from tokenized records, for
/// building query workloads out of real data.
#[derive(Debug)]
pub struct QueryTokenCollector {
    limit: usize,
    tokens: HashSet<Vec<u8>>,
}

impl QueryTokenCollector {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            tokens: HashSet::with_capacity(limit),
        }
    }

    /// Offers the token `record[offset..offset + length]`.
    pub fn offer(&mut self, record: &[u8], offset: usize, length: usize) {
        if length >= MIN_QUERY_TOKEN_LEN && self.tokens.len() < self.limit {
            self.tokens.insert(record[offset..offset + length].to_vec());
        }
    }

    /// Tokenizes `record` and offers every token.
    pub fn collect(&mut self, tokenizer: &dyn Tokenizer, record: &[u8]) {
        tokenizer.tokenize(record, &mut |_, offset, length| self.offer(record, offset, length));
    }

    pub fn tokens(&self) -> &HashSet<Vec<u8>> {
        &self.tokens
    }

    pub fn into_tokens(self) -> HashSet<Vec<u8>> {
        self.tokens
    }
}
