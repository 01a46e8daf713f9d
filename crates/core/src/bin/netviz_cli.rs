//! CLI client for the `netvizd` daemon, plus offline model tools.
//!
//! Examples:
//!   netviz-cli status
//!   netviz-cli start
//!   netviz-cli stop
//!   netviz-cli level 2
//!   netviz-cli publish ai/activation '[[...], [...], [...]]'
//!   netviz-cli fps 60
//!   netviz-cli save-frame /tmp/frame.ppm
//!   netviz-cli inspect model.json
//!   netviz-cli convert model.json model.nvz
//!
//! By default it talks to 127.0.0.1:9877; override with `--addr host:port`.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::path::Path;
use std::process;
use std::time::Duration;

use netviz::config::VisualizerConfig;
use netviz::significance::compute_mask;
use netviz::storage;
use netviz::wire::topics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetStatus,
    Start,
    Stop,
    Publish { topic: String, payload: String },
    SetFramerate { fps: u32 },
    Resize { width: usize, height: usize },
    SaveFrame { path: Option<String> },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    Status(Box<StatusSnapshot>),
    Published {
        #[serde(default)]
        event: Option<serde_json::Value>,
    },
    FrameSaved {
        path: String,
        #[serde(default)]
        stats: Option<RenderStats>,
    },
    Success {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RenderStats {
    #[serde(default)]
    edges: usize,
    #[serde(default)]
    active_edges: usize,
    #[serde(default)]
    neurons: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct SchedulerStats {
    #[serde(default)]
    ticks: u64,
    #[serde(default)]
    renders: u64,
    #[serde(default)]
    skipped: u64,
    #[serde(default)]
    coalesced: u64,
    #[serde(default)]
    dropped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionStatus {
    #[serde(default)]
    level: Option<u32>,
    running: bool,
    #[serde(default)]
    pending_level: Option<u32>,
    #[serde(default)]
    mailbox_version: u64,
    #[serde(default)]
    scheduler: SchedulerStats,
    #[serde(default)]
    human_score: Option<u32>,
    #[serde(default)]
    agent_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatusSnapshot {
    session: SessionStatus,
    #[serde(default)]
    target_fps: u32,
    #[serde(default)]
    frames_rendered: u64,
    #[serde(default)]
    canvas: (usize, usize),
    #[serde(default)]
    model_source: String,
    #[serde(default)]
    last_render: Option<RenderStats>,
    #[serde(default)]
    last_tick_micros: u64,
}

fn usage() -> ! {
    eprintln!(
        "Usage: netviz-cli [--addr host:port] <command>\n\
         \n\
         Daemon commands:\n\
         \x20 status                     session, scheduler and render stats\n\
         \x20 start | stop               resume or pause rendering\n\
         \x20 level <n>                  publish a level change\n\
         \x20 score <1|2> <n>            publish a score for player 1 or 2\n\
         \x20 publish <topic> <payload>  publish a raw topic message\n\
         \x20 fps <n>                    set the render rate (1-240)\n\
         \x20 resize <width> <height>    resize the daemon's canvas\n\
         \x20 save-frame [path]          write the latest frame as PPM\n\
         \x20 shutdown                   stop the daemon\n\
         \n\
         Offline commands:\n\
         \x20 inspect <model>            layer sizes and significant edge counts\n\
         \x20 convert <in> <out.nvz>     write a model as a compact binary image"
    );
    process::exit(2);
}

fn fail(msg: &str) -> ! {
    eprintln!("{}", msg);
    process::exit(1);
}

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let mut addr = "127.0.0.1:9877".to_string();
    if args.len() >= 2 && args[0] == "--addr" {
        addr = args[1].clone();
        args.drain(0..2);
    }
    if args.is_empty() {
        usage();
    }
    (addr, args)
}

fn send_request(addr: &str, req: &Request) -> Result<Response, String> {
    let mut stream = TcpStream::connect(addr).map_err(|e| format!("connect: {e}"))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| format!("set_read_timeout: {e}"))?;
    let mut reader = BufReader::new(stream.try_clone().map_err(|e| format!("clone: {e}"))?);

    let line = serde_json::to_string(req).map_err(|e| format!("serialize: {e}"))?;
    stream
        .write_all(line.as_bytes())
        .and_then(|_| stream.write_all(b"\n"))
        .map_err(|e| format!("send: {e}"))?;

    let mut resp_line = String::new();
    reader
        .read_line(&mut resp_line)
        .map_err(|e| format!("recv: {e}"))?;
    serde_json::from_str(&resp_line).map_err(|e| format!("parse response: {e}"))
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn print_status(s: StatusSnapshot) {
    let ss = &s.session;
    println!(
        "running={} level={} pending={} fps={} canvas={}x{} model={}",
        ss.running,
        opt(ss.level),
        opt(ss.pending_level),
        s.target_fps,
        s.canvas.0,
        s.canvas.1,
        s.model_source,
    );
    println!(
        "scheduler: ticks={} renders={} skipped={} coalesced={} dropped={} mailbox_version={}",
        ss.scheduler.ticks,
        ss.scheduler.renders,
        ss.scheduler.skipped,
        ss.scheduler.coalesced,
        ss.scheduler.dropped,
        ss.mailbox_version,
    );
    if let Some(r) = &s.last_render {
        println!(
            "last frame: edges={} active={} neurons={} tick={}us",
            r.edges, r.active_edges, r.neurons, s.last_tick_micros
        );
    }
    println!(
        "scores: human={} agent={}",
        opt(ss.human_score),
        opt(ss.agent_score)
    );
}

fn inspect(path: &Path) {
    let structure = storage::load_structure_file(path).unwrap_or_else(|e| fail(&format!("load: {e}")));
    let cfg = VisualizerConfig::default();
    println!("{}: neurons {:?}", path.display(), structure.neuron_counts());
    for (k, layer) in structure.layers().iter().enumerate() {
        let f = cfg.layers.get(k).map_or(1.0, |l| l.retain_fraction);
        let mask = compute_mask(&layer.weights, f);
        println!(
            "  layer {}: {}x{} weights, max|w|={:.4}, {} drawn at {:.0}%",
            k,
            layer.weights.rows(),
            layer.weights.cols(),
            layer.weights.max_abs(),
            mask.len(),
            f * 100.0
        );
    }
    let pixels = cfg.frame_width * cfg.frame_height;
    if structure.input_count() != pixels {
        println!(
            "  note: input width {} does not match the default {}x{} frame",
            structure.input_count(),
            cfg.frame_width,
            cfg.frame_height
        );
    }
}

fn convert(input: &Path, output: &Path) {
    let structure = storage::load_structure_file(input).unwrap_or_else(|e| fail(&format!("load: {e}")));
    storage::save_structure_file(output, &structure).unwrap_or_else(|e| fail(&format!("save: {e}")));
    let before = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
    let after = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    println!(
        "wrote {} ({} -> {} bytes)",
        output.display(),
        before,
        after
    );
}

fn arg(args: &[String], i: usize) -> &str {
    args.get(i).map(String::as_str).unwrap_or_else(|| usage())
}

fn main() {
    let (addr, args) = parse_args();
    let cmd = args[0].as_str();

    let req = match cmd {
        "status" => Request::GetStatus,
        "start" => Request::Start,
        "stop" => Request::Stop,
        "level" => {
            let level: u32 = arg(&args, 1).parse().unwrap_or_else(|_| fail("level must be a number"));
            Request::Publish {
                topic: topics::LEVEL.to_string(),
                payload: format!("{{\"level\": {}}}", level),
            }
        }
        "score" => {
            let topic = match arg(&args, 1) {
                "1" => topics::PLAYER1_SCORE,
                "2" => topics::PLAYER2_SCORE,
                _ => fail("player must be 1 or 2"),
            };
            let score: u32 = arg(&args, 2).parse().unwrap_or_else(|_| fail("score must be a number"));
            Request::Publish {
                topic: topic.to_string(),
                payload: format!("{{\"score\": {}}}", score),
            }
        }
        "publish" => Request::Publish {
            topic: arg(&args, 1).to_string(),
            payload: arg(&args, 2).to_string(),
        },
        "fps" => {
            let fps: u32 = arg(&args, 1)
                .parse()
                .unwrap_or_else(|_| fail("fps must be a number (1-240)"));
            Request::SetFramerate { fps }
        }
        "resize" => {
            let width: usize = arg(&args, 1).parse().unwrap_or_else(|_| fail("width must be a number"));
            let height: usize = arg(&args, 2).parse().unwrap_or_else(|_| fail("height must be a number"));
            Request::Resize { width, height }
        }
        "save-frame" => Request::SaveFrame {
            path: args.get(1).cloned(),
        },
        "shutdown" => Request::Shutdown,
        "inspect" => {
            inspect(Path::new(arg(&args, 1)));
            return;
        }
        "convert" => {
            convert(Path::new(arg(&args, 1)), Path::new(arg(&args, 2)));
            return;
        }
        _ => usage(),
    };

    match send_request(&addr, &req) {
        Ok(Response::Status(s)) => print_status(*s),
        Ok(Response::Published { event }) => match event {
            Some(ev) => println!("published; event: {}", ev),
            None => println!("published"),
        },
        Ok(Response::FrameSaved { path, stats }) => {
            let stats = stats.unwrap_or_default();
            println!(
                "saved {} (edges={} active={} neurons={})",
                path, stats.edges, stats.active_edges, stats.neurons
            );
        }
        Ok(Response::Success { message }) => println!("{message}"),
        Ok(Response::Error { message }) => {
            eprintln!("Error: {message}");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("Failed: {e}");
            process::exit(1);
        }
    }
}
