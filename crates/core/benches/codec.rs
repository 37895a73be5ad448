use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fakenet_core::wire::icmpv6::{Message, NdOption};
use fakenet_core::wire::ipv6::{NextHeader, Packet};
use fakenet_core::wire::{EtherType, Frame};
use fakenet_core::{Ipv6AddrExt, MacAddress};
use std::net::Ipv6Addr;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const SRC: Ipv6Addr = Ipv6Addr::new(0xfe80, 0, 0, 0, 0x209e, 0xfeff, 0xfe57, 0x11e5);
const DEST: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 1, 0xff00, 0x12);

fn make_frame(payload_len: usize) -> Vec<u8> {
    let solicitation = Message::NeighborSolicitation {
        target: Ipv6Addr::new(0xf4, 0x44, 0, 0, 0, 0, 0, 0x12),
        options: vec![NdOption::SourceLinkLayerAddress(MacAddress([
            0x56, 0x0d, 0x4f, 0x21, 0x64, 0xf3,
        ]))],
    };
    let mut payload = solicitation.encode(&SRC, &DEST);
    payload.resize(payload_len.max(payload.len()), 0);

    let packet = Packet::new(SRC, DEST, NextHeader::Icmpv6, payload).with_hop_limit(255);

    Frame {
        dest: DEST.multicast_mac(),
        src: MacAddress([0x56, 0x0d, 0x4f, 0x21, 0x64, 0xf3]),
        ethertype: EtherType::Ipv6,
        payload: packet.encode(),
    }
    .encode()
}

// ---------------------------------------------------------------------------
// Benchmark: frame -> packet -> message
// ---------------------------------------------------------------------------

fn bench_parse_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_stack");
    for payload_len in [32, 512, 1400] {
        let bytes = make_frame(payload_len);
        group.bench_with_input(BenchmarkId::from_parameter(payload_len), &bytes, |b, bytes| {
            b.iter(|| {
                let frame = Frame::parse(black_box(bytes)).unwrap();
                let packet = Packet::parse(&frame.payload).unwrap();
                black_box(packet)
            });
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark: ICMPv6 checksum + encode
// ---------------------------------------------------------------------------

fn bench_icmpv6_roundtrip(c: &mut Criterion) {
    let solicitation = Message::NeighborSolicitation {
        target: Ipv6Addr::new(0xf4, 0x44, 0, 0, 0, 0, 0, 0x12),
        options: vec![NdOption::SourceLinkLayerAddress(MacAddress([
            0x56, 0x0d, 0x4f, 0x21, 0x64, 0xf3,
        ]))],
    };
    let bytes = solicitation.encode(&SRC, &DEST);

    c.bench_function("icmpv6_encode", |b| {
        b.iter(|| black_box(solicitation.encode(black_box(&SRC), black_box(&DEST))))
    });
    c.bench_function("icmpv6_parse", |b| {
        b.iter(|| black_box(Message::parse(black_box(&bytes), &SRC, &DEST).unwrap()))
    });
}

criterion_group!(benches, bench_parse_stack, bench_icmpv6_roundtrip);
criterion_main!(benches);
