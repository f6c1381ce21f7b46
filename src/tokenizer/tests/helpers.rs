use crate::tokenizer::{DerivedTokenizer, Token, TokenType, TokenWindow, Tokenizer};

pub type Emitted = Vec<(TokenType, usize, usize)>;

/// Pushes `tokens` into a fresh window and runs `derived` once.
pub fn run_derived(derived: DerivedTokenizer, bytes: &[u8], tokens: &[(TokenType, usize, usize)]) -> Emitted {
    let mut window = TokenWindow::default();
    for &(kind, offset, length) in tokens {
        window.push(Token { kind, offset, length });
    }
    let mut out = Vec::new();
    derived(bytes, &window, &mut |kind, offset, length| out.push((kind, offset, length)));
    out
}

pub fn tokenize(tokenizer: &dyn Tokenizer, bytes: &[u8]) -> Emitted {
    let mut out = Vec::new();
    tokenizer.tokenize(bytes, &mut |kind, offset, length| out.push((kind, offset, length)));
    out
}

pub fn texts<'a>(bytes: &'a [u8], emitted: &Emitted, kind: TokenType) -> Vec<&'a [u8]> {
    emitted
        .iter()
        .filter(|(k, _, _)| *k == kind)
        .map(|&(_, offset, length)| &bytes[offset..offset + length])
        .collect()
}
