use mphf_core::{BuildConfig, Builder, ValidationMode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::time::Instant;

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() {
    println!("--- mphf_core bucketed displacement build ---");
    println!("n = {N_KEYS}");

    let t0 = Instant::now();
    let keys = gen_unique_keys(N_KEYS, GEN_SEED);
    let key_refs: Vec<&str> = keys.iter().map(|s| s.as_str()).collect();
    let gen_s = t0.elapsed().as_secs_f64();
    println!(
        "gen:    {:>8.3} s   ({:.1} M keys/s)",
        gen_s,
        N_KEYS as f64 / gen_s / 1e6
    );

    let cfg = BuildConfig {
        level: 5,
        validation_mode: ValidationMode::Bits8,
        parallel_bucketing: cfg!(feature = "parallel"),
        ..Default::default()
    };

    let t1 = Instant::now();
    let dict = Builder::new()
        .with_config(cfg)
        .build(&key_refs)
        .expect("build should succeed for a uniformly random key set at this level");
    let build_s = t1.elapsed().as_secs_f64();
    println!(
        "build:  {:>8.3} s   ({:.1} M keys/s)",
        build_s,
        N_KEYS as f64 / build_s / 1e6
    );

    let t2 = Instant::now();
    let mut acc: u64 = 0;
    for chunk in key_refs.chunks(32_768) {
        for k in chunk {
            acc ^= dict.hash(k) as u64;
        }
    }
    let lookup_s = t2.elapsed().as_secs_f64();
    println!(
        "lookup: {:>8.3} s   ({:.1} M lookups/s)   (acc={acc})",
        lookup_s,
        N_KEYS as f64 / lookup_s / 1e6
    );

    println!("----------------------------------------------");
    println!("Total (gen + build + lookup): {:.3} s", gen_s + build_s + lookup_s);
}

/// Generates `n` unique alphanumeric 16-character keys, deterministically.
fn gen_unique_keys(n: usize, seed: u64) -> Vec<String> {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(n * 2);
    let mut keys = Vec::with_capacity(n);
    while keys.len() < n {
        let key: String = (0..16)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}
