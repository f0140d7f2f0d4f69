use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, instrument, trace, warn};

// Wire protocol constants
pub const LENGTH_PREFIX_SIZE: usize = 4; // 4 bytes for u32 length prefix
pub const MAX_FRAME_SIZE: usize = 64 * 1024; // game messages are small
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Size limits and timeouts for framed I/O
#[derive(Debug, Clone)]
pub struct WireConfig {
    pub max_message_size: usize,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_FRAME_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl WireConfig {
    /// Create a WireConfig with custom message size and default timeouts
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            ..Self::default()
        }
    }

    /// Create a WireConfig with a single timeout for both read and write operations
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            read_timeout: timeout,
            write_timeout: timeout,
            ..Self::default()
        }
    }
}

/// Errors raised while reading or writing frames
#[derive(Error, Debug)]
pub enum WireProtocolError {
    #[error("Message too large: {size} bytes exceeds maximum of {max_size} bytes")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Invalid length prefix: {length}")]
    InvalidLength { length: u32 },

    #[error("Read operation timed out after {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("Write operation timed out after {timeout:?}")]
    WriteTimeout { timeout: Duration },

    #[error("Corrupted data: {reason}")]
    CorruptedData { reason: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Unexpected end of file while reading {operation}")]
    UnexpectedEof { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Length-prefixed UTF-8 frames: 4-byte big-endian length, then the payload
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    config: WireConfig,
}

impl FrameCodec {
    pub fn new(config: WireConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Reject zero and oversized lengths before allocating
    #[instrument(level = "trace", skip(self), fields(max_size = self.config.max_message_size))]
    fn validate_length(&self, length: u32) -> Result<usize, WireProtocolError> {
        if length == 0 {
            warn!("Received zero-length frame prefix");
            return Err(WireProtocolError::InvalidLength { length });
        }
        let size = length as usize;
        if size > self.config.max_message_size {
            error!(
                size = size,
                max_size = self.config.max_message_size,
                "Frame size exceeds maximum allowed size"
            );
            return Err(WireProtocolError::MessageTooLarge {
                size,
                max_size: self.config.max_message_size,
            });
        }
        trace!("Length validation passed for {} bytes", size);
        Ok(size)
    }

    /// Write one frame
    #[instrument(level = "debug", skip(self, writer, payload), fields(payload_size = payload.len()))]
    pub async fn write_frame(
        &self,
        writer: &mut (impl AsyncWrite + Unpin),
        payload: &str,
    ) -> Result<(), WireProtocolError> {
        let bytes = payload.as_bytes();
        if bytes.is_empty() {
            return Err(WireProtocolError::InvalidLength { length: 0 });
        }
        if bytes.len() > self.config.max_message_size {
            error!(size = bytes.len(), "Refusing to write oversized frame");
            return Err(WireProtocolError::MessageTooLarge {
                size: bytes.len(),
                max_size: self.config.max_message_size,
            });
        }

        let length_prefix = (bytes.len() as u32).to_be_bytes();
        let write = async {
            writer.write_all(&length_prefix).await?;
            writer.write_all(bytes).await?;
            writer.flush().await
        };

        match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(result) => {
                result?;
                debug!("Wrote {} byte frame", bytes.len());
                Ok(())
            }
            Err(_) => {
                warn!(timeout = ?self.config.write_timeout, "Frame write timed out");
                Err(WireProtocolError::WriteTimeout {
                    timeout: self.config.write_timeout,
                })
            }
        }
    }

    /// Read one frame
    ///
    /// A clean end of stream before the length prefix yields
    /// [`WireProtocolError::ConnectionClosed`]; an end of stream inside a
    /// frame is `UnexpectedEof`.
    #[instrument(level = "debug", skip(self, reader))]
    pub async fn read_frame(
        &self,
        reader: &mut (impl AsyncRead + Unpin),
    ) -> Result<String, WireProtocolError> {
        self.read_frame_within(reader, self.config.read_timeout).await
    }

    /// Read one frame with no deadline, for long-lived idle connections
    pub async fn next_frame(
        &self,
        reader: &mut (impl AsyncRead + Unpin),
    ) -> Result<String, WireProtocolError> {
        self.read_frame_inner(reader).await
    }

    /// Read one frame with an explicit deadline, e.g. for the hello frame
    pub async fn read_frame_within(
        &self,
        reader: &mut (impl AsyncRead + Unpin),
        timeout: Duration,
    ) -> Result<String, WireProtocolError> {
        match tokio::time::timeout(timeout, self.read_frame_inner(reader)).await {
            Ok(result) => result,
            Err(_) => Err(WireProtocolError::ReadTimeout { timeout }),
        }
    }

    async fn read_frame_inner(
        &self,
        reader: &mut (impl AsyncRead + Unpin),
    ) -> Result<String, WireProtocolError> {
        let mut length_buffer = [0u8; LENGTH_PREFIX_SIZE];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_SIZE {
            match reader.read(&mut length_buffer[filled..]).await? {
                0 if filled == 0 => return Err(WireProtocolError::ConnectionClosed),
                0 => {
                    return Err(WireProtocolError::UnexpectedEof {
                        operation: "length prefix".to_string(),
                    })
                }
                n => filled += n,
            }
        }

        let length = u32::from_be_bytes(length_buffer);
        let size = self.validate_length(length)?;

        let mut buffer = vec![0u8; size];
        reader.read_exact(&mut buffer).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                WireProtocolError::UnexpectedEof {
                    operation: format!("{} byte frame", size),
                }
            } else {
                WireProtocolError::Io(e)
            }
        })?;

        let payload = String::from_utf8(buffer).map_err(|e| WireProtocolError::CorruptedData {
            reason: format!("frame is not valid UTF-8: {}", e),
        })?;
        debug!("Read {} byte frame", size);
        Ok(payload)
    }
}
