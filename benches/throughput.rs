//! Throughput Benchmark for DistrIRC
//!
//! This benchmark measures line reassembly and command parsing/rendering
//! on traffic shaped like a real server session.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use distrirc::connection::{LineConfig, LineConnection};
use distrirc::mux::{Registrar, Waitable};
use distrirc::net::{NetStream, SocketResult};
use distrirc::protocol::{Command, CommandKind, CommandParser, ParsePolicy};

const SESSION: &[&str] = &[
    ":irc.inp-net.rezosup.org NOTICE AUTH :*** Looking up your hostname...",
    ":irc.inp-net.rezosup.org 001 Test :Welcome to the RezoSup IRC Network Test!distrirc@ool-18ba5d00.dyn.optonline.net",
    ":irc.inp-net.rezosup.org 005 Test CHANTYPES=# CHANLIMIT=#:20 PREFIX=(ohv)@%+ STATUSMSG=@+ :are available on this server",
    ":irc.inp-net.rezosup.org 372 Test :-       ____                _____",
    ":Test!distrirc@RZ-77dd3605.dyn.optonline.net JOIN :#rezo",
    ":irc.inp-net.rezosup.org 353 Test @ #rezo :Test @guitou ttdx BuLi @Remram",
    ":irc.inp-net.rezosup.org 352 Test #rezo quassel RZ-c8308929.rez-gif.supelec.fr irc.supelec.rezosup.org _Lily_ G :3 Marc Delorme",
    ":Remram!distrirc@remram44.github.com PRIVMSG #rezo :hello there, how is everyone doing?",
    "PING :this is sparta",
];

/// Serves the same payload forever.
struct LoopStream {
    payload: Vec<u8>,
    offset: usize,
}

impl NetStream for LoopStream {
    fn send(&mut self, _data: &[u8]) -> SocketResult<()> {
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _wait: bool) -> SocketResult<usize> {
        let n = buf.len().min(self.payload.len() - self.offset);
        buf[..n].copy_from_slice(&self.payload[self.offset..self.offset + n]);
        self.offset = (self.offset + n) % self.payload.len();
        Ok(n)
    }
}

impl Waitable for LoopStream {
    fn register_sources(&self, _registrar: &mut Registrar) {}
}

fn session_bytes() -> Vec<u8> {
    SESSION.iter().flat_map(|line| [line.as_bytes(), &b"\r\n"[..]].concat()).collect()
}

/// Benchmark line reassembly at several chunk sizes
fn bench_read_lines(c: &mut Criterion) {
    let payload = session_bytes();

    let mut group = c.benchmark_group("read_lines");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    for chunk_size in [16, 128, 4096] {
        group.bench_function(format!("chunk_{chunk_size}"), |b| {
            let stream = LoopStream {
                payload: payload.clone(),
                offset: 0,
            };
            let config = LineConfig {
                chunk_size,
                ..LineConfig::default()
            };
            let mut conn = LineConnection::with_config(stream, config);
            b.iter(|| {
                let mut received = 0;
                while received < payload.len() {
                    let before = conn.stats().bytes_received;
                    black_box(conn.read_lines(false).unwrap());
                    received += (conn.stats().bytes_received - before) as usize;
                }
            });
        });
    }

    group.finish();
}

/// Benchmark parsing under both policies
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(SESSION.len() as u64));

    let observed = CommandParser::new();
    group.bench_function("session_observed", |b| {
        b.iter(|| {
            for line in SESSION {
                black_box(observed.parse(black_box(line)).unwrap());
            }
        });
    });

    let strict = CommandParser::with_policy(ParsePolicy::strict());
    group.bench_function("session_strict", |b| {
        b.iter(|| {
            for line in SESSION {
                black_box(strict.parse(black_box(line)).unwrap());
            }
        });
    });

    group.bench_function("who_reply", |b| {
        let line = SESSION[6];
        b.iter(|| black_box(observed.parse(black_box(line)).unwrap()));
    });

    group.finish();
}

/// Benchmark rendering
fn bench_render(c: &mut Criterion) {
    let commands: Vec<Command> = SESSION
        .iter()
        .map(|line| Command::parse(line).unwrap())
        .collect();

    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(commands.len() as u64));

    group.bench_function("session", |b| {
        b.iter(|| {
            for command in &commands {
                black_box(command.render());
            }
        });
    });

    group.bench_function("privmsg_build", |b| {
        b.iter(|| {
            let command = Command::new(
                CommandKind::Privmsg,
                [black_box("#rezo"), black_box("hello there, how is everyone doing?")],
            );
            black_box(command.render())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_read_lines, bench_parse, bench_render);
criterion_main!(benches);
