use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mill_frame::net::frame::{read_frame, write_frame};
use mill_frame::prelude::*;
use std::{net::TcpStream, sync::Arc, thread, time::Duration};

struct ServerHandle {
    handle: LoopHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl ServerHandle {
    fn start(mut server: TcpServer) -> Self {
        let handle = server.handle();
        let thread = thread::spawn(move || {
            let _ = server.start();
        });
        Self {
            handle,
            thread: Some(thread),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.handle.unloop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn config() -> TcpServerConfig {
    TcpServerConfig::builder()
        .address("127.0.0.1:0".parse().unwrap())
        .poll_timeout(Duration::from_millis(100))
        .logger(Arc::new(NoOpLogger))
        .build()
}

fn bench_reactor_echo(c: &mut Criterion) {
    let mut group = c.benchmark_group("reactor_echo");

    for msg_size in [0usize, 128, 4096] {
        group.throughput(Throughput::Bytes((msg_size * 100) as u64));
        group.bench_with_input(
            BenchmarkId::new("message_size", msg_size),
            &msg_size,
            |b, &size| {
                let mut server = TcpServer::new(config()).unwrap();
                server.set_message_callback(|conn| {
                    if let Ok(payload) = conn.recv() {
                        conn.send(&payload);
                    }
                });
                let addr = server.local_addr();
                let _server = ServerHandle::start(server);

                let mut stream = TcpStream::connect(addr).unwrap();
                stream.set_nodelay(true).unwrap();
                let data = vec![42u8; size];

                b.iter(|| {
                    for _ in 0..100 {
                        write_frame(&mut stream, &data).unwrap();
                        black_box(read_frame(&mut stream).unwrap());
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_worker_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_round_trip");

    for workers in [1usize, 4] {
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &n| {
            let mut server = TcpServer::new(config()).unwrap();
            let pool = Arc::new(ThreadPool::new(n).unwrap());
            server.serve(Arc::new(|request: Vec<u8>| request), pool);
            let addr = server.local_addr();
            let _server = ServerHandle::start(server);

            let mut stream = TcpStream::connect(addr).unwrap();
            stream.set_nodelay(true).unwrap();
            let data = vec![7u8; 256];

            b.iter(|| {
                write_frame(&mut stream, &data).unwrap();
                black_box(read_frame(&mut stream).unwrap());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reactor_echo, bench_worker_round_trip);
criterion_main!(benches);
