//! Derived tokenizers against hand-built windows.

use super::helpers::*;
use crate::tokenizer::TokenType::*;
use crate::tokenizer::{
    alpha_num_tri_grams, combo_terms, dot_combo_terms, other_n_grams, unicode_two_grams,
};

#[test]
fn combo_with_single_separator() {
    let out = run_derived(
        combo_terms,
        b"aa.bb",
        &[(AsciiAlphaNum, 0, 2), (AsciiOther, 2, 1), (AsciiAlphaNum, 3, 2)],
    );
    assert_eq!(out, vec![(Combo, 0, 5)]);
}

/// # Scenario
/// Combos require exactly one separator byte from the allowed set and a
/// full `alnum other alnum` signature.
///
/// # Actions
/// Run the combo tokenizer on `aa=bb`, `aa..bb` and `aa.`.
///
/// # Expected behavior
/// Nothing is emitted for any of them.
#[test]
fn combo_rejects_bad_separators_and_signatures() {
    let wrong_separator = run_derived(
        combo_terms,
        b"aa=bb",
        &[(AsciiAlphaNum, 0, 2), (AsciiOther, 2, 1), (AsciiAlphaNum, 3, 2)],
    );
    assert!(wrong_separator.is_empty());

    let long_separator = run_derived(
        combo_terms,
        b"aa..bb",
        &[(AsciiAlphaNum, 0, 2), (AsciiOther, 2, 2), (AsciiAlphaNum, 4, 2)],
    );
    assert!(long_separator.is_empty());

    let short = run_derived(combo_terms, b"aa.", &[(AsciiAlphaNum, 0, 2), (AsciiOther, 2, 1)]);
    assert!(short.is_empty());
}

#[test]
fn combo_accepts_every_separator() {
    for separator in [b'.', b':', b'-', b'_', b'/', b'\\', b'@'] {
        let bytes = [b'a', b'a', separator, b'b', b'b'];
        let out = run_derived(
            combo_terms,
            &bytes,
            &[(AsciiAlphaNum, 0, 2), (AsciiOther, 2, 1), (AsciiAlphaNum, 3, 2)],
        );
        assert_eq!(out, vec![(Combo, 0, 5)], "separator {}", separator as char);
    }
}

#[test]
fn dot_combo() {
    let window = [
        (AsciiAlphaNum, 0, 2),
        (AsciiOther, 2, 1),
        (AsciiAlphaNum, 3, 2),
        (AsciiOther, 5, 1),
        (AsciiAlphaNum, 6, 2),
    ];
    assert_eq!(run_derived(dot_combo_terms, b"aa.bb.cc", &window), vec![(DotCombo, 0, 8)]);
    assert!(run_derived(dot_combo_terms, b"aa=bb=cc", &window).is_empty());

    let long = [
        (AsciiAlphaNum, 0, 2),
        (AsciiOther, 2, 2),
        (AsciiAlphaNum, 4, 2),
        (AsciiOther, 6, 2),
        (AsciiAlphaNum, 8, 2),
    ];
    assert!(run_derived(dot_combo_terms, b"aa..bb..cc", &long).is_empty());
    assert!(run_derived(dot_combo_terms, b"aa.bb.", &window[..4]).is_empty());
}

#[test]
fn alpha_num_tri_grams_need_more_than_three_bytes() {
    assert_eq!(
        run_derived(alpha_num_tri_grams, b"abcd", &[(AsciiAlphaNum, 0, 4)]),
        vec![(AsciiAlphaNumTriGram, 0, 3), (AsciiAlphaNumTriGram, 1, 3)]
    );
    assert!(run_derived(alpha_num_tri_grams, b"abc", &[(AsciiAlphaNum, 0, 3)]).is_empty());
    assert!(run_derived(alpha_num_tri_grams, b"//::", &[(AsciiOther, 0, 4)]).is_empty());
}

#[test]
fn unicode_two_grams_need_more_than_two_bytes() {
    assert_eq!(
        run_derived(unicode_two_grams, b"abc", &[(Unicode, 0, 3)]),
        vec![(UnicodeTwoGram, 0, 2), (UnicodeTwoGram, 1, 2)]
    );
    assert!(run_derived(unicode_two_grams, b"ab", &[(Unicode, 0, 2)]).is_empty());
    assert!(run_derived(unicode_two_grams, b"//:", &[(AsciiOther, 0, 3)]).is_empty());
}

/// # Scenario
/// Punctuation runs produce 1-grams from length 2, 2-grams from length 3
/// and 3-grams from length 4.
///
/// # Actions
/// Run the other-n-gram tokenizer on runs of length 1 to 4.
///
/// # Expected behavior
/// Emitted counts are 0, 2, 3 + 2, and 4 + 3 + 2.
#[test]
fn other_n_grams_grow_with_run_length() {
    assert!(run_derived(other_n_grams, b".", &[(AsciiOther, 0, 1)]).is_empty());
    assert_eq!(
        run_derived(other_n_grams, b"..", &[(AsciiOther, 0, 2)]),
        vec![(AsciiOtherNGram, 0, 1), (AsciiOtherNGram, 1, 1)]
    );
    assert_eq!(run_derived(other_n_grams, b"../", &[(AsciiOther, 0, 3)]).len(), 5);

    let out = run_derived(other_n_grams, b"../.", &[(AsciiOther, 0, 4)]);
    assert_eq!(out.len(), 9);
    assert!(out.contains(&(AsciiOtherNGram, 3, 1)));
    assert!(out.contains(&(AsciiOtherNGram, 2, 2)));
    assert!(out.contains(&(AsciiOtherNGram, 1, 3)));
    assert!(run_derived(other_n_grams, b"abcd", &[(AsciiAlphaNum, 0, 4)]).is_empty());
}
