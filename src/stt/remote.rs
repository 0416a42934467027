//! TCP client for a remote streaming recognition service.
//!
//! Speaks a small length-prefixed framing protocol over one connection per
//! exchange:
//!
//! - client → server: `[0x02][u32 BE len][JSON config]` once, then
//!   `[0x01][u32 BE len][PCM bytes]` per audio block, then `[0x00]` when the
//!   outbound sequence is exhausted;
//! - server → client: `[tag][u32 BE len][UTF-8 text]` per event, where tag
//!   `0x00` is an interim transcript, `0x01` a final one and `0x02` an
//!   error; closing the connection ends the exchange.
//!
//! The outbound sequence is pulled by a dedicated sender thread so the
//! caller can block on inbound events while audio keeps flowing.

use crate::error::{LivesubError, Result};
use crate::stt::backend::{AudioBlocks, SpeechBackend, TranscriptEvent, TranscriptEvents};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on a single inbound event payload; anything larger is a
/// protocol violation, not a transcript.
const MAX_EVENT_LEN: usize = 1 << 20;

const FRAME_END: u8 = 0x00;
const FRAME_AUDIO: u8 = 0x01;
const FRAME_CONFIG: u8 = 0x02;

const EVENT_INTERIM: u8 = 0x00;
const EVENT_FINAL: u8 = 0x01;
const EVENT_ERROR: u8 = 0x02;

#[derive(Serialize)]
struct ExchangeConfig<'a> {
    language: &'a str,
    sample_rate: u32,
}

/// Streaming recognition over TCP.
pub struct TcpBackend {
    addr: String,
    language: String,
    sample_rate: u32,
}

impl TcpBackend {
    pub fn new(addr: String, language: String, sample_rate: u32) -> Self {
        Self {
            addr,
            language,
            sample_rate,
        }
    }

    fn connect(&self) -> Result<TcpStream> {
        let addr = self
            .addr
            .parse()
            .map_err(|_| LivesubError::Backend {
                message: format!("invalid backend address: {}", self.addr),
            })?;
        let stream =
            TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT).map_err(|e| {
                LivesubError::Backend {
                    message: format!("cannot connect to {}: {}", self.addr, e),
                }
            })?;
        stream.set_read_timeout(Some(IO_TIMEOUT)).map_err(backend_io)?;
        stream.set_write_timeout(Some(IO_TIMEOUT)).map_err(backend_io)?;
        stream.set_nodelay(true).ok();
        Ok(stream)
    }
}

impl SpeechBackend for TcpBackend {
    fn streaming_recognize(&self, audio: AudioBlocks) -> Result<TranscriptEvents> {
        let stream = self.connect()?;
        let mut writer = stream.try_clone().map_err(backend_io)?;

        let config = serde_json::to_vec(&ExchangeConfig {
            language: &self.language,
            sample_rate: self.sample_rate,
        })
        .map_err(|e| LivesubError::Backend {
            message: format!("cannot encode exchange config: {}", e),
        })?;
        write_frame(&mut writer, FRAME_CONFIG, &config).map_err(backend_io)?;

        debug!(addr = %self.addr, "streaming exchange opened");

        // Sender loop: pulls the lazily assembled audio sequence. A write
        // failure just stops the loop; the reader side surfaces the error.
        thread::spawn(move || {
            for block in audio {
                trace!(len = block.len(), "sending audio block");
                if write_frame(&mut writer, FRAME_AUDIO, &block).is_err() {
                    return;
                }
            }
            let _ = writer.write_all(&[FRAME_END]);
            let _ = writer.flush();
        });

        Ok(Box::new(EventReader {
            stream,
            done: false,
        }))
    }
}

struct EventReader {
    stream: TcpStream,
    done: bool,
}

impl Iterator for EventReader {
    type Item = Result<TranscriptEvent>;

    fn next(&mut self) -> Option<Result<TranscriptEvent>> {
        if self.done {
            return None;
        }
        match self.read_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl EventReader {
    /// Reads one event frame; `Ok(None)` on clean connection close.
    fn read_event(&mut self) -> Result<Option<TranscriptEvent>> {
        let mut tag = [0u8; 1];
        match self.stream.read_exact(&mut tag) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(backend_io(e)),
        }

        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).map_err(backend_io)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_EVENT_LEN {
            return Err(LivesubError::Backend {
                message: format!("event frame too large: {} bytes", len),
            });
        }

        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).map_err(backend_io)?;
        let text = String::from_utf8(payload).map_err(|_| LivesubError::Backend {
            message: "event payload is not valid UTF-8".to_string(),
        })?;

        match tag[0] {
            EVENT_INTERIM => Ok(Some(TranscriptEvent {
                text,
                is_final: false,
            })),
            EVENT_FINAL => Ok(Some(TranscriptEvent {
                text,
                is_final: true,
            })),
            EVENT_ERROR => Err(LivesubError::Backend {
                message: format!("backend rejected input: {}", text),
            }),
            other => Err(LivesubError::Backend {
                message: format!("unknown event tag: {:#04x}", other),
            }),
        }
    }
}

fn write_frame(writer: &mut impl Write, tag: u8, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(&[tag])?;
    writer.write_all(&(payload.len() as u32).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

fn backend_io(e: std::io::Error) -> LivesubError {
    LivesubError::Backend {
        message: e.to_string(),
    }
}
