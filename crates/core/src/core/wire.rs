//! Topic payload schemas.
//!
//! Every inbound message is routed by topic and validated against its schema.
//! Activation payloads are the exception to eager parsing: they are kept as raw
//! text until a render tick actually consumes them, because most of them are
//! superseded before that happens.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VizError};

pub mod topics {
    pub const LEVEL: &str = "game/level";
    pub const ACTIVATION: &str = "ai/activation";
    /// The human player.
    pub const PLAYER1_SCORE: &str = "player1/score";
    /// The agent.
    pub const PLAYER2_SCORE: &str = "player2/score";

    pub const ALL: [&str; 4] = [LEVEL, ACTIVATION, PLAYER1_SCORE, PLAYER2_SCORE];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelChange {
    pub level: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    Human,
    Agent,
}

impl Player {
    pub fn topic(self) -> &'static str {
        match self {
            Player::Human => topics::PLAYER1_SCORE,
            Player::Agent => topics::PLAYER2_SCORE,
        }
    }
}

/// A routed, validated inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Level(LevelChange),
    /// Raw activation payload, decoded when rendered.
    Activation(String),
    Score { player: Player, score: u32 },
}

pub fn parse_inbound(topic: &str, payload: &str) -> Result<Inbound> {
    match topic {
        topics::LEVEL => {
            let msg: LevelChange =
                serde_json::from_str(payload).map_err(|e| VizError::malformed(topic, e.to_string()))?;
            Ok(Inbound::Level(msg))
        }
        topics::ACTIVATION => Ok(Inbound::Activation(payload.to_string())),
        topics::PLAYER1_SCORE | topics::PLAYER2_SCORE => {
            let msg: ScoreUpdate =
                serde_json::from_str(payload).map_err(|e| VizError::malformed(topic, e.to_string()))?;
            let player = if topic == topics::PLAYER1_SCORE {
                Player::Human
            } else {
                Player::Agent
            };
            Ok(Inbound::Score {
                player,
                score: msg.score,
            })
        }
        other => Err(VizError::UnknownTopic(other.to_string())),
    }
}

/// Grayscale game frame, row-major, values nominally in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GameFrame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl GameFrame {
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(VizError::mismatch("frame pixels", width * height, pixels.len()));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0.0; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.pixels[y * self.width + x]
    }

    fn rows(&self) -> Vec<Vec<f32>> {
        if self.width == 0 {
            return vec![Vec::new(); self.height];
        }
        self.pixels.chunks(self.width).map(<[f32]>::to_vec).collect()
    }
}

/// Frames arrive either as rows or flattened; either way they must have the configured size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum FramePayload {
    Grid(Vec<Vec<f32>>),
    Flat(Vec<f32>),
}

/// One inference step: the frame the agent saw plus both layers' activations.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationSnapshot {
    pub frame: GameFrame,
    pub hidden: Vec<f32>,
    pub output: Vec<f32>,
}

impl ActivationSnapshot {
    /// Parse `[stateFrame, hiddenActivations, outputActivations]`.
    ///
    /// `dims` is the expected `(width, height)` of the frame. A frame of any
    /// other shape is malformed, even with the right pixel count.
    pub fn from_payload(payload: &str, dims: (usize, usize)) -> Result<Self> {
        let (frame, hidden, output): (FramePayload, Vec<f32>, Vec<f32>) =
            serde_json::from_str(payload)
                .map_err(|e| VizError::malformed(topics::ACTIVATION, e.to_string()))?;

        let frame = match frame {
            FramePayload::Grid(rows) => {
                let height = rows.len();
                let width = rows.first().map_or(0, Vec::len);
                if let Some(bad) = rows.iter().find(|r| r.len() != width) {
                    return Err(VizError::malformed(
                        topics::ACTIVATION,
                        format!("ragged frame row: expected {} pixels, got {}", width, bad.len()),
                    ));
                }
                if (width, height) != dims {
                    return Err(VizError::malformed(
                        topics::ACTIVATION,
                        format!("frame is {}x{}, expected {}x{}", width, height, dims.0, dims.1),
                    ));
                }
                GameFrame::new(width, height, rows.concat())?
            }
            FramePayload::Flat(pixels) => {
                let (w, h) = dims;
                GameFrame::new(w, h, pixels).map_err(|e| VizError::malformed(topics::ACTIVATION, e.to_string()))?
            }
        };

        Ok(Self {
            frame,
            hidden,
            output,
        })
    }

    /// Encode in row form.
    pub fn to_payload(&self) -> Result<String> {
        let body = (
            FramePayload::Grid(self.frame.rows()),
            &self.hidden,
            &self.output,
        );
        Ok(serde_json::to_string(&body)?)
    }
}
