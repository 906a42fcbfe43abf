// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;

fn round_trip(op: Opcode) {
    let mut bytes = Vec::new();
    encode(op, &mut bytes);
    let mut pos = 0;
    let decoded = decode(&bytes, &mut pos).unwrap();
    assert_eq!(decoded, op);
    assert_eq!(pos, bytes.len());
}

#[test]
fn every_opcode_shape_round_trips() {
    round_trip(Opcode::ShallowArgumentRef { depth: 3 });
    round_trip(Opcode::DeepArgumentRef { depth: 2, index: 9 });
    round_trip(Opcode::GlobalRef { index: 300_000 });
    round_trip(Opcode::Alternative { consequent: 4, alternative: 9000 });
    round_trip(Opcode::Return);
    round_trip(Opcode::FixClosure { arity: 2, code: 128 });
    round_trip(Opcode::PushTrap { handler_index: 5 });
    round_trip(Opcode::RestoreAllState);
}

#[test]
fn large_operands_use_multiple_leb128_bytes() {
    let mut bytes = Vec::new();
    encode(Opcode::GlobalRef { index: u32::MAX }, &mut bytes);
    assert!(bytes.len() > 2);
    let mut pos = 0;
    assert_eq!(decode(&bytes, &mut pos).unwrap(), Opcode::GlobalRef { index: u32::MAX });
}

#[test]
fn truncated_stream_is_an_error() {
    let bytes = [Opcode::GlobalRef { index: 1 }.tag()];
    let mut pos = 0;
    assert!(matches!(decode(&bytes, &mut pos), Err(DecodeError::Truncated { .. })));
}

#[test]
fn unknown_tag_is_an_error() {
    let bytes = [0xFF];
    let mut pos = 0;
    assert!(matches!(decode(&bytes, &mut pos), Err(DecodeError::UnknownTag { tag: 0xFF, .. })));
}

#[test]
fn decoding_a_sequence_advances_across_instructions() {
    let mut bytes = Vec::new();
    encode(Opcode::Constant { index: 1 }, &mut bytes);
    encode(Opcode::Call1, &mut bytes);
    encode(Opcode::Return, &mut bytes);
    let mut pos = 0;
    let mut ops = Vec::new();
    while pos < bytes.len() {
        ops.push(decode(&bytes, &mut pos).unwrap());
    }
    assert_eq!(ops, vec![Opcode::Constant { index: 1 }, Opcode::Call1, Opcode::Return]);
}
