//! netviz daemon - headless network visualizer
//!
//! Accepts the visualizer's topic messages over a local line protocol (so a
//! message-bus bridge can forward them), drives a visualizer session at a
//! target frame rate, and renders into an in-memory RGBA raster that can be
//! written out as a PPM file.
//!
//! Storage locations follow the OS conventions (via `dirs`):
//! - config: `<config dir>/netviz/config.json`
//! - models: `<data dir>/netviz/models/{default,level_<n>}.{json,nvz}`

use std::sync::Arc;

use netviz::mailbox::Mailbox;
use netviz::render::RenderStats;
use netviz::session::SessionEvent;
use netviz::wire::topics;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod paths;
mod state;

use paths::AppPaths;
use state::{DaemonState, StatusSnapshot};

const LISTEN_ADDR: &str = "127.0.0.1:9877";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Request {
    GetStatus,
    Start,
    Stop,
    Publish { topic: String, payload: String },
    SetFramerate { fps: u32 },
    Resize { width: usize, height: usize },
    SaveFrame {
        #[serde(default)]
        path: Option<String>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Response {
    Status(Box<StatusSnapshot>),
    Published {
        #[serde(default)]
        event: Option<SessionEvent>,
    },
    FrameSaved {
        path: String,
        #[serde(default)]
        stats: Option<RenderStats>,
    },
    Success { message: String },
    Error { message: String },
}

/// Activation publishes go to `mailbox` directly and never take the state lock,
/// which the render task holds for a whole tick.
async fn handle_request(request: Request, state: &Arc<RwLock<DaemonState>>, mailbox: &Mailbox) -> Response {
    match request {
        Request::GetStatus => Response::Status(Box::new(state.read().await.snapshot())),
        Request::Start => {
            state.write().await.session.start();
            Response::Success {
                message: "Rendering started".to_string(),
            }
        }
        Request::Stop => {
            state.write().await.session.stop();
            Response::Success {
                message: "Rendering stopped".to_string(),
            }
        }
        Request::Publish { topic, payload } if topic == topics::ACTIVATION => {
            mailbox.publish(payload);
            Response::Published { event: None }
        }
        Request::Publish { topic, payload } => match state.write().await.publish(&topic, &payload) {
            Ok(event) => Response::Published { event },
            Err(e) => {
                warn!("Rejected {} message: {}", topic, e);
                Response::Error {
                    message: e.to_string(),
                }
            }
        },
        Request::SetFramerate { fps } => match state.write().await.set_framerate(fps) {
            Ok(()) => Response::Success {
                message: format!("Target framerate set to {} fps", fps),
            },
            Err(message) => Response::Error { message },
        },
        Request::Resize { width, height } => match state.write().await.resize(width, height) {
            Ok(()) => Response::Success {
                message: format!("Canvas resized to {}x{}", width, height),
            },
            Err(e) => Response::Error {
                message: e.to_string(),
            },
        },
        Request::SaveFrame { path } => {
            let s = state.read().await;
            match s.save_frame(path.as_deref().map(std::path::Path::new)) {
                Ok(p) => Response::FrameSaved {
                    path: p.display().to_string(),
                    stats: s.session.last_render(),
                },
                Err(e) => Response::Error {
                    message: format!("Failed to save frame: {}", e),
                },
            }
        }
        Request::Shutdown => {
            info!("Shutdown requested");
            tokio::spawn(async {
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                std::process::exit(0);
            });
            Response::Success {
                message: "Shutting down".to_string(),
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    state: Arc<RwLock<DaemonState>>,
    mailbox: Arc<Mailbox>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(request, &state, &mailbox).await,
            Err(e) => Response::Error {
                message: format!("Invalid request: {}", e),
            },
        };

        writer
            .write_all(serde_json::to_string(&response)?.as_bytes())
            .await?;
        writer.write_all(b"\n").await?;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let paths = AppPaths::new()?;
    info!("Data directory: {}", paths.data_dir().display());

    let state = DaemonState::new(paths)?;
    let mailbox = state.mailbox();
    let state = Arc::new(RwLock::new(state));

    // Exit cleanly on Ctrl-C, reporting how much was drawn.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let s = state.read().await;
                info!(
                    "Ctrl-C: exiting after {} frames ({:?})",
                    s.frames_rendered,
                    s.session.scheduler().stats()
                );
                std::process::exit(0);
            }
        });
    }

    let listener = TcpListener::bind(LISTEN_ADDR).await?;
    info!("netviz daemon listening on {}", LISTEN_ADDR);

    // Render loop task
    let state_clone = Arc::clone(&state);
    tokio::spawn(async move {
        loop {
            let target_fps = state_clone.read().await.target_fps;
            let frame_millis = (1000 / target_fps.max(1)).max(1) as u64;
            tokio::time::sleep(tokio::time::Duration::from_millis(frame_millis)).await;

            state_clone.write().await.tick();
        }
    });

    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Client connected: {}", addr);
        let state_clone = Arc::clone(&state);
        let mailbox = Arc::clone(&mailbox);

        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, state_clone, mailbox).await {
                error!("Client handler error: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn activation_publish_does_not_wait_for_render_tick() {
        let root = std::env::temp_dir().join(format!("netvizd-publish-{}", std::process::id()));
        let paths = AppPaths::at(root.join("data"), root.join("config")).unwrap();
        let state = DaemonState::new(paths).unwrap();
        let mailbox = state.mailbox();
        let state = Arc::new(RwLock::new(state));

        // Held the way the render task holds it during a tick.
        let render = state.write().await;
        let request = Request::Publish {
            topic: topics::ACTIVATION.to_string(),
            payload: "[[], [], []]".to_string(),
        };
        let response = tokio::time::timeout(
            tokio::time::Duration::from_secs(1),
            handle_request(request, &state, &mailbox),
        )
        .await
        .expect("activation publish blocked on the state lock");
        drop(render);

        assert!(matches!(response, Response::Published { event: None }));
        assert_eq!(mailbox.version(), 1);
        std::fs::remove_dir_all(&root).ok();
    }
}
