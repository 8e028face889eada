use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use hamarc::hamming::{HammingCodec, HammingConfig};

const MIB: usize = 1024 * 1024;

fn sample(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect()
}

fn bench_encode(c: &mut Criterion) {
    let data = sample(MIB);
    let mut group = c.benchmark_group("encode_1mb");
    group.throughput(Throughput::Bytes(MIB as u64));

    for (k, r) in [(4, 3), (8, 4), (11, 4), (16, 5)] {
        let codec = HammingCodec::new(HammingConfig::new(k, r).unwrap());
        group.bench_function(format!("k{k}_r{r}"), |b| {
            b.iter(|| {
                let mut out = Vec::with_capacity(MIB * 2);
                codec.encode_stream(black_box(&data[..]), &mut out).unwrap();
                out
            })
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let data = sample(MIB);
    let codec = HammingCodec::new(HammingConfig::default());
    let mut encoded = Vec::new();
    let encoded_len = codec.encode_stream(&data[..], &mut encoded).unwrap();

    let mut group = c.benchmark_group("decode_1mb");
    group.throughput(Throughput::Bytes(MIB as u64));

    group.bench_function("clean", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(MIB);
            codec.decode_stream(black_box(&encoded[..]), &mut out, MIB as u64, encoded_len).unwrap();
            out
        })
    });

    // One flipped bit in every codeword.
    let mut damaged = encoded.clone();
    let n = codec.config().codeword_bits() as u64;
    for cw in 0..codec.config().codeword_count(MIB as u64) {
        let bit = cw * n + cw % n;
        damaged[(bit / 8) as usize] ^= 1 << (bit % 8);
    }
    group.bench_function("every_codeword_damaged", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(MIB);
            codec.decode_stream(black_box(&damaged[..]), &mut out, MIB as u64, encoded_len).unwrap();
            out
        })
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
