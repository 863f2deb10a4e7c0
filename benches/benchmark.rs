use std::{
    hint::black_box,
    pin::pin,
    sync::{Arc, Weak},
    thread,
};

use criterion::{criterion_group, criterion_main, Criterion};
use resource_handle::Resource;

//cargo bench

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("Create reference", |b| b.iter(create_reference));
    c.bench_function("Downgrade Arc", |b| b.iter(downgrade_arc));
    c.bench_function("Multiple clone Handle", |b| b.iter(multi_clone_handle));
    c.bench_function("Multiple clone Weak", |b| b.iter(multi_clone_weak));
    c.bench_function("Multiple exists Handle", |b| b.iter(multi_exists_handle));
    c.bench_function("Multiple upgrade Weak", |b| b.iter(multi_upgrade_weak));
    c.bench_function("Multiple threads Handle", |b| b.iter(multi_thread_handle));
    c.bench_function("Multiple threads Weak", |b| b.iter(multi_thread_weak));
}

fn create_reference() {
    let resource = pin!(Resource::new(100));
    let _ = black_box(Resource::create_reference(resource.as_ref()));
}

fn downgrade_arc() {
    let arc = Arc::new(100);
    let _ = black_box(Arc::downgrade(&arc));
}

fn multi_clone_handle() {
    let resource = pin!(Resource::new(100));
    let handle = Resource::create_reference(resource.as_ref());
    for _ in 0..100 {
        let _ = black_box(handle.clone());
    }
}

fn multi_clone_weak() {
    let arc = Arc::new(100);
    let weak = Arc::downgrade(&arc);
    for _ in 0..100 {
        let _ = black_box(Weak::clone(&weak));
    }
}

fn multi_exists_handle() {
    let resource = pin!(Resource::new(100));
    let handle = Resource::create_reference(resource.as_ref());
    for _ in 0..100 {
        black_box(handle.exists());
    }
}

fn multi_upgrade_weak() {
    let arc = Arc::new(100);
    let weak = Arc::downgrade(&arc);
    for _ in 0..100 {
        let _ = black_box(weak.upgrade());
    }
}

fn multi_thread_handle() {
    let resource = Resource::pin(100);
    let handle = Resource::create_reference(resource.as_ref());
    for _ in 0..10 {
        let local = handle.clone();
        thread::spawn(move || {
            let mut sum = 0;
            for _ in 0..1000 {
                let h = local.clone();
                if let Some(value) = unsafe { h.get() } {
                    sum += *value;
                }
            }
            sum
        })
        .join()
        .unwrap();
    }
}

fn multi_thread_weak() {
    let arc = Arc::new(100);
    let weak = Arc::downgrade(&arc);
    for _ in 0..10 {
        let local = weak.clone();
        thread::spawn(move || {
            let mut sum = 0;
            for _ in 0..1000 {
                if let Some(a) = local.upgrade() {
                    sum += *a;
                }
            }
            sum
        })
        .join()
        .unwrap();
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
