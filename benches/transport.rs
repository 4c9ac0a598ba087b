use std::io;
use std::time::Duration;

use udpzc::{Endpoint, Submission, Transport, TransportOptions};

use criterion::{criterion_group, criterion_main, Criterion};

const NO_WAIT: Duration = Duration::from_secs(0);

/// Endpoint that always has a datagram ready and completes sends immediately.
struct Always;

impl Endpoint for Always {
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        Ok(Some(buf.len()))
    }

    fn wait_readable(&self, _timeout: Duration) -> io::Result<bool> {
        Ok(true)
    }

    fn send_async(&self, submission: Submission) {
        submission.complete();
    }
}

fn test(c: &mut Criterion) {
    let transport = Transport::new(Always, TransportOptions::default()).unwrap();

    c.bench_function("recv_release", |b| {
        b.iter(|| {
            let buf = transport.get_recv_buf(NO_WAIT).unwrap();
            buf.release();
        })
    });

    c.bench_function("send_commit", |b| {
        b.iter(|| {
            let mut buf = transport.get_send_buf(NO_WAIT).unwrap();
            buf[0] = 1;
            buf.commit(64);
        })
    });
}

criterion_group!(benches, test);
criterion_main!(benches);
