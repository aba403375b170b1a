//! Criterion benchmarks for the per-frame hot path of the capture loop.
//!
//! Every captured frame is converted for display and pushed through the frame ring, so
//! these costs bound the achievable frame rate independently of the camera.
//!
//! Run with: cargo bench --bench frame_pipeline

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use miniscope::frame::{Frame, DROPPED_FRAME_HEIGHT, DROPPED_FRAME_WIDTH};
use miniscope::ring::FrameRing;
use miniscope::visualize::{self, ChannelMask};
use std::sync::Arc;
use std::thread;

fn sensor_frame() -> Frame {
    let (w, h) = (DROPPED_FRAME_WIDTH, DROPPED_FRAME_HEIGHT);
    let data = (0..w as usize * h as usize * 3)
        .map(|i| (i % 251) as u8)
        .collect();
    Frame::from_bytes(w, h, 3, data)
}

/// Grayscale path: conversion, min/max and display rescale.
fn grayscale_display(c: &mut Criterion) {
    let frame = sensor_frame();
    let mut group = c.benchmark_group("grayscale_display");
    group.throughput(Throughput::Bytes(frame.data.len() as u64));

    group.bench_function("to_grayscale", |b| {
        b.iter(|| visualize::to_grayscale(black_box(&frame)));
    });

    let gray = visualize::to_grayscale(&frame);
    group.bench_function("min_max", |b| {
        b.iter(|| visualize::min_max(black_box(&gray)));
    });

    for (name, (min, max)) in [("identity", (0u8, 255u8)), ("narrow", (40, 120))] {
        group.bench_with_input(BenchmarkId::new("rescale", name), &(min, max), |b, &(lo, hi)| {
            b.iter(|| visualize::rescale(black_box(&gray), lo, hi));
        });
    }

    group.finish();
}

/// Color path: plane masking.
fn color_display(c: &mut Criterion) {
    let frame = sensor_frame();
    let mut group = c.benchmark_group("color_display");
    group.throughput(Throughput::Bytes(frame.data.len() as u64));

    let masks = [
        ("all", ChannelMask::ALL),
        (
            "green_only",
            ChannelMask {
                red: false,
                green: true,
                blue: false,
            },
        ),
    ];
    for (name, mask) in masks {
        group.bench_with_input(BenchmarkId::new("mask_channels", name), &mask, |b, &mask| {
            b.iter(|| visualize::mask_channels(black_box(&frame), mask));
        });
    }

    group.finish();
}

/// Ring push with eviction, and concurrent push/pop.
fn frame_ring(c: &mut Criterion) {
    let frame = visualize::to_grayscale(&sensor_frame());
    let mut group = c.benchmark_group("frame_ring");

    let ring = FrameRing::default();
    for _ in 0..ring.capacity() {
        ring.push(frame.clone());
    }
    group.bench_function("push_full", |b| {
        b.iter(|| ring.push(black_box(frame.clone())));
    });

    group.bench_function("push_pop_contended", |b| {
        b.iter_custom(|iters| {
            let ring = Arc::new(FrameRing::default());
            let consumer_ring = Arc::clone(&ring);
            let consumer = thread::spawn(move || {
                let mut taken = 0u64;
                while taken < iters {
                    if consumer_ring.pop_oldest().is_some() {
                        taken += 1;
                    } else if consumer_ring.is_empty() {
                        thread::yield_now();
                    }
                }
            });

            let start = std::time::Instant::now();
            for _ in 0..iters {
                ring.push(frame.clone());
            }
            let elapsed = start.elapsed();
            // Evicted frames are never popped, so stop waiting on them
            while !consumer.is_finished() {
                ring.push(frame.clone());
            }
            consumer.join().unwrap();
            elapsed
        });
    });

    group.finish();
}

criterion_group!(benches, grayscale_display, color_display, frame_ring);
criterion_main!(benches);
