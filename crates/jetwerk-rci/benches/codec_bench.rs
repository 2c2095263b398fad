// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for RCI frame building, reply validation and
// terminator scanning in the jetwerk-rci crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use jetwerk_rci::codec::{self, Command, ESC, ETX, SOH, STX};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Payload where every fourth byte needs escaping.
fn escape_heavy_payload(len: usize) -> Vec<u8> {
    let specials = [ESC, ETX, SOH, STX];
    (0..len)
        .map(|i| if i % 4 == 0 { specials[(i / 4) % 4] } else { (i % 200) as u8 + 0x20 })
        .collect()
}

/// A status acknowledgement with full telemetry.
fn status_reply() -> Vec<u8> {
    let mut body = vec![0x00, 0x00, Command::RequestStatus.id(), 0x01, 0x04];
    body.extend_from_slice(&0u32.to_be_bytes());
    codec::build_reply(true, &body)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Building frames: empty status request and a LoadMessage-sized payload.
fn bench_build_frame(c: &mut Criterion) {
    c.bench_function("build_frame (status)", |b| {
        b.iter(|| black_box(codec::build_frame(black_box(0x14), &[], false, true)));
    });

    let payload = escape_heavy_payload(1024);
    c.bench_function("build_frame (1 KiB, escape heavy)", |b| {
        b.iter(|| {
            black_box(codec::build_frame(
                black_box(Command::DownloadMessageData.id()),
                black_box(&payload),
                false,
                true,
            ))
        });
    });
}

/// Validating acknowledgements, the hot path of every command.
fn bench_parse_ack(c: &mut Criterion) {
    let reply = status_reply();
    c.bench_function("parse_ack (status telemetry)", |b| {
        b.iter(|| {
            let ack = codec::parse_ack(black_box(&reply), 0x14);
            assert!(ack.is_ok());
        });
    });
}

/// Decoding a large escaped command frame, as a device simulator would.
fn bench_decode_frame(c: &mut Criterion) {
    let frame = codec::build_frame(0x19, &escape_heavy_payload(4096), false, true);
    c.bench_function("decode_frame (4 KiB, escape heavy)", |b| {
        b.iter(|| {
            let decoded = codec::decode_frame(black_box(&frame));
            assert!(decoded.is_ok());
        });
    });
}

criterion_group!(benches, bench_build_frame, bench_parse_ack, bench_decode_frame);
criterion_main!(benches);
