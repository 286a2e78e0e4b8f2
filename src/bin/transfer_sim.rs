//! 单连接文件传输仿真
//!
//! 在拓扑文件描述的网络（或内置 dumbbell）上，从一个节点向另一个节点可靠传输一个文件。

use clap::Parser;
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tcpsim_rs::net::{NetWorld, Network, NodeId};
use tcpsim_rs::proto::{HEADER_LEN, MAX_MTU, TcpConfig, TcpOpen, TcpReceiver, TcpSender};
use tcpsim_rs::sim::{SimTime, Simulator};
use tcpsim_rs::topo::{DumbbellOpts, build_dumbbell, load_topology};

#[derive(Debug, Parser)]
#[command(name = "transfer-sim", about = "离散事件仿真：单条 TCP 连接的文件传输")]
struct Args {
    /// 拓扑文件（文本格式，`.json` 后缀按 JSON 解析）；不填则使用 dumbbell
    #[arg(long)]
    topology: Option<PathBuf>,

    /// 发送端节点 ID
    #[arg(long, default_value_t = 0)]
    src: u16,

    /// 接收端节点 ID
    #[arg(long, default_value_t = 1)]
    dst: u16,

    /// 要发送的文件；不填则发送 `--gen-bytes` 字节的生成数据
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long, default_value_t = 100_000)]
    gen_bytes: usize,

    /// 接收数据写到哪里；不填则丢弃
    #[arg(long)]
    output: Option<PathBuf>,

    /// 段头之外至少容纳 1 字节，且段加信封头不超过 16 位长度字段
    #[arg(
        long,
        default_value_t = 1500,
        value_parser = clap::value_parser!(u32).range(HEADER_LEN as i64 + 1..=MAX_MTU as i64)
    )]
    mtu: u32,

    /// 接收窗口（段数）
    #[arg(long, default_value_t = 10)]
    window: u32,

    /// 初始 RTO（毫秒）
    #[arg(long, default_value_t = 1000)]
    rto_ms: u64,

    /// dumbbell 瓶颈缓冲（字节）
    #[arg(long, default_value_t = 64 * 1024)]
    bottleneck_buffer_bytes: u64,

    /// 仿真运行上限（毫秒）；0 表示一直运行到事件队列为空
    #[arg(long, default_value_t = 0)]
    until_ms: u64,

    /// 以 JSON 输出统计
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    let args = Args::parse();

    let net = match &args.topology {
        Some(path) => match load_topology(path) {
            Ok(spec) => spec.build_network(),
            Err(e) => {
                eprintln!("error: {}: {e}", path.display());
                return ExitCode::from(2);
            }
        },
        None => {
            let mut net = Network::default();
            let opts = DumbbellOpts {
                bottleneck_buffer_bytes: args.bottleneck_buffer_bytes,
                ..DumbbellOpts::default()
            };
            build_dumbbell(&mut net, &opts);
            net
        }
    };

    let (src, dst) = (NodeId(args.src), NodeId(args.dst));
    for id in [src, dst] {
        if net.node(id).is_none() {
            eprintln!("error: node {} is not in the topology", id.0);
            return ExitCode::from(2);
        }
    }

    let data = match &args.input {
        Some(path) => match fs::read(path) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("error: cannot read {}: {e}", path.display());
                return ExitCode::from(2);
            }
        },
        None => (0..args.gen_bytes).map(|i| (i % 251) as u8).collect(),
    };

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => match File::create(path) {
            Ok(f) => Box::new(f),
            Err(e) => {
                eprintln!("error: cannot create {}: {e}", path.display());
                return ExitCode::from(2);
            }
        },
        None => Box::new(io::sink()),
    };

    let cfg = TcpConfig {
        mtu: args.mtu,
        window_segments: args.window,
        init_rto: SimTime::from_millis(args.rto_ms),
        ..TcpConfig::default()
    };

    let mut sim = Simulator::default();
    let mut world = NetWorld::new(net);
    let total = data.len();
    let conn = world.tcp.insert_sender(TcpSender::new(
        src,
        dst,
        Box::new(Cursor::new(data)),
        cfg.clone(),
    ));
    world
        .tcp
        .insert_receiver(TcpReceiver::listen(dst, src, sink, cfg));
    sim.schedule(SimTime::ZERO, TcpOpen { conn });

    if args.until_ms > 0 {
        sim.run_until(SimTime::from_millis(args.until_ms), &mut world);
    } else {
        sim.run(&mut world);
    }

    let rkey = conn.peer();
    let (Some(s), Some(r)) = (world.tcp.sender(conn), world.tcp.receiver(rkey)) else {
        eprintln!("error: endpoints disappeared");
        return ExitCode::FAILURE;
    };

    if args.json {
        let report = json!({
            "now_ns": sim.now().0,
            "input_bytes": total,
            "sender_done": s.is_done(),
            "receiver_closed": r.is_closed(),
            "sender": s.stats(),
            "receiver": r.stats(),
            "net": world.net.stats,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        let ss = s.stats();
        let rs = r.stats();
        println!(
            "done @ {:?}\n  sender: state={:?}, bytes_sent={}, pkts_sent={}, retrans={}, dup_acks={}\n  receiver: state={:?}, bytes_received={}, pkts_received={}, ooo_discards={}, checksum_failures={}\n  net: delivered_pkts={}, delivered_bytes={}, dropped_pkts={}, dropped_bytes={}",
            sim.now(),
            s.state(),
            ss.bytes_sent,
            ss.packets_sent,
            ss.retransmissions,
            ss.duplicate_acks,
            r.state(),
            rs.bytes_received,
            rs.packets_received,
            rs.out_of_order_discards,
            rs.checksum_failures,
            world.net.stats.delivered_pkts,
            world.net.stats.delivered_bytes,
            world.net.stats.dropped_pkts,
            world.net.stats.dropped_bytes
        );
    }

    if s.is_done() && r.is_closed() && !r.has_failed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
