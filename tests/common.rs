//
// Test infrastructure: an in-memory endpoint standing in for a connected socket. Datagrams are
// delivered into an inbox by the test, sends are recorded and can be held back to simulate a
// transmission that has not completed yet.
//
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use udpzc::{Endpoint, Submission, Transport, TransportOptions};

#[derive(Default)]
pub struct MockEndpoint {
    inbox: Mutex<VecDeque<Vec<u8>>>,
    readable: Condvar,

    sent: Mutex<Vec<Vec<u8>>>,
    hold_sends: AtomicBool,
    held: Mutex<Vec<Submission>>,

    pub try_recv_calls: AtomicUsize,
    pub wait_calls: AtomicUsize,
}

impl MockEndpoint {
    pub fn new() -> MockEndpoint {
        MockEndpoint::default()
    }

    pub fn deliver(&self, datagram: &[u8]) {
        self.inbox.lock().push_back(datagram.to_vec());
        self.readable.notify_all();
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// While set, submissions are kept instead of completing straight away.
    pub fn hold_sends(&self, hold: bool) {
        self.hold_sends.store(hold, Ordering::SeqCst);
    }

    pub fn num_held(&self) -> usize {
        self.held.lock().len()
    }

    /// Complete every held submission, returning how many there were.
    pub fn complete_held(&self) -> usize {
        let held: Vec<Submission> = self.held.lock().drain(..).collect();
        let n = held.len();
        for submission in held {
            submission.complete();
        }
        n
    }
}

impl Endpoint for MockEndpoint {
    fn try_recv(&self, buf: &mut [u8]) -> io::Result<Option<usize>> {
        self.try_recv_calls.fetch_add(1, Ordering::SeqCst);

        let datagram = match self.inbox.lock().pop_front() {
            Some(datagram) => datagram,
            None => return Ok(None),
        };

        // Like a datagram socket, anything past the buffer is discarded.
        let n = datagram.len().min(buf.len());
        buf[..n].copy_from_slice(&datagram[..n]);
        Ok(Some(n))
    }

    fn wait_readable(&self, timeout: Duration) -> io::Result<bool> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);

        let mut inbox = self.inbox.lock();
        if inbox.is_empty() {
            self.readable
                .wait_while_for(&mut inbox, |inbox| inbox.is_empty(), timeout);
        }
        Ok(!inbox.is_empty())
    }

    fn send_async(&self, submission: Submission) {
        self.sent.lock().push(submission.payload().to_vec());

        if self.hold_sends.load(Ordering::SeqCst) {
            self.held.lock().push(submission);
        }
    }
}

pub fn transport(
    recv_frame_size: usize,
    num_recv_frames: usize,
    send_frame_size: usize,
    num_send_frames: usize,
) -> Transport<MockEndpoint> {
    let options = TransportOptions {
        recv_frame_size,
        num_recv_frames,
        send_frame_size,
        num_send_frames,
        ..Default::default()
    };

    match Transport::new(MockEndpoint::new(), options) {
        Ok(t) => t,
        Err(err) => panic!("Failed to create transport: {:?}", err),
    }
}
