#![allow(dead_code)]

use std::io::{self, Read};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use phonecam::error::Result;
use phonecam::{AudioCapture, AudioSource, StreamError};

pub const LOCALHOST: Ipv4Addr = Ipv4Addr::LOCALHOST;
pub const TIMEOUT: Duration = Duration::from_secs(3);

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect_timeout(&addr, TIMEOUT).expect("connect to server");
    stream.set_read_timeout(Some(TIMEOUT)).unwrap();
    stream.set_write_timeout(Some(TIMEOUT)).unwrap();
    stream
}

/// Poll `cond` until it holds or the deadline passes.
pub fn wait_for(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

pub fn read_u32(stream: &mut TcpStream) -> u32 {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).expect("read u32");
    u32::from_be_bytes(buf)
}

pub fn read_i32(stream: &mut TcpStream) -> i32 {
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).expect("read i32");
    i32::from_be_bytes(buf)
}

/// True once the peer has closed: EOF or a reset.
pub fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => return true,
            Err(e) if e.kind() == io::ErrorKind::ConnectionAborted => return true,
            Err(_) => return false,
        }
    }
}

/// Audio source that counts open and released captures. Every byte of
/// the n-th capture is `n`.
#[derive(Default)]
pub struct CountingSource {
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl AudioSource for CountingSource {
    fn open(&self) -> Result<Box<dyn AudioCapture>> {
        let n = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(CountingCapture {
            fill: n as u8,
            released: self.released.clone(),
        }))
    }
}

struct CountingCapture {
    fill: u8,
    released: Arc<AtomicUsize>,
}

impl AudioCapture for CountingCapture {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        thread::sleep(Duration::from_millis(5));
        buf.fill(self.fill);
        Ok(buf.len())
    }
}

impl Drop for CountingCapture {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Audio source whose device can never be opened.
pub struct UnavailableSource {
    pub attempts: Arc<AtomicUsize>,
}

impl AudioSource for UnavailableSource {
    fn open(&self) -> Result<Box<dyn AudioCapture>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StreamError::DeviceUnavailable("microphone permission denied".into()))
    }
}
