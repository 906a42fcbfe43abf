// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;

#[test]
fn ascii_picks_width_1() {
    let s = IdioString::from_str("hello");
    assert_eq!(s.width(), Width::W1);
    assert_eq!(s.len(), 5);
}

#[test]
fn bmp_code_point_picks_width_2() {
    let s = IdioString::from_str("h\u{1000}llo");
    assert_eq!(s.width(), Width::W2);
}

#[test]
fn astral_code_point_picks_width_4() {
    let s = IdioString::from_str("h\u{1F600}llo");
    assert_eq!(s.width(), Width::W4);
}

#[test]
fn byte_length_is_code_point_length_times_width() {
    let s = IdioString::from_str("h\u{1000}llo");
    assert_eq!(s.byte_length(), s.len() * 2);
}

#[test]
fn decode_utf8_lossy_round_trips_valid_input() {
    let original = "idio \u{1F600} shell";
    let decoded = IdioString::decode_utf8_lossy(original.as_bytes());
    assert_eq!(decoded.to_string(), original);
}

#[test]
fn decode_utf8_lossy_replaces_invalid_bytes() {
    let bytes = [b'a', 0xFF, b'b'];
    let decoded = IdioString::decode_utf8_lossy(&bytes);
    assert_eq!(decoded.code_points(), vec![u32::from(b'a'), REPLACEMENT, u32::from(b'b')]);
}

#[test]
fn decode_utf8_lossy_replaces_truncated_multibyte_sequence() {
    let bytes = [0xE2, 0x82]; // truncated 3-byte sequence
    let decoded = IdioString::decode_utf8_lossy(&bytes);
    assert!(decoded.code_points().iter().all(|&cp| cp == REPLACEMENT));
}

#[test]
fn split_collapses_delimiter_runs_by_default() {
    let s = IdioString::from_str(",a,,b,");
    let parts = s.split(&[u32::from(b',')], false);
    let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["a", "b"]);
}

#[test]
fn split_exact_keeps_empty_segments() {
    let s = IdioString::from_str(",a,,b,");
    let parts = s.split(&[u32::from(b',')], true);
    let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["", "a", "", "b", ""]);
}

#[test]
fn split_treats_every_delimiter_in_the_set_as_a_boundary() {
    let s = IdioString::from_str("a,b;c");
    let parts = s.split(&[u32::from(b','), u32::from(b';')], false);
    let rendered: Vec<String> = parts.iter().map(ToString::to_string).collect();
    assert_eq!(rendered, vec!["a", "b", "c"]);
}

#[test]
fn string_set_overwrites_within_the_existing_width() {
    let mut s = IdioString::from_str("hello");
    s.set(0, u32::from(b'H')).unwrap();
    assert_eq!(s.to_string(), "Hello");
}

#[test]
fn string_set_rejects_a_code_point_wider_than_storage() {
    let mut s = IdioString::from_str("hello");
    let err = s.set(0, 0x1F600).unwrap_err();
    assert_eq!(err.width, Width::W1);
    assert_eq!(s.to_string(), "hello", "a rejected set! leaves the string untouched");
}

#[test]
fn negative_width_cases_never_panic_on_empty_string() {
    let s = IdioString::from_code_points(Vec::new());
    assert_eq!(s.width(), Width::W1);
    assert!(s.is_empty());
}
