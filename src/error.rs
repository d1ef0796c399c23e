#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    Io,
    ShortResponse { got: usize, expected: usize },
    CrcMismatch,
    UnexpectedReply,
    Exception(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    Config { field: &'static str, max_len: usize },
    NotConnected,
    PayloadTooLarge { len: usize, capacity: usize },
    Encode,
    Transport(String),
    Sensor(SensorError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<SensorError> for BridgeError {
    fn from(e: SensorError) -> Self {
        BridgeError::Sensor(e)
    }
}

impl std::fmt::Display for SensorError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SensorError::Io => write!(f, "serial I/O error"),
            SensorError::ShortResponse { got, expected } => {
                write!(f, "short response ({} of {} bytes)", got, expected)
            }
            SensorError::CrcMismatch => write!(f, "CRC mismatch"),
            SensorError::UnexpectedReply => write!(f, "unexpected reply"),
            SensorError::Exception(code) => write!(f, "Modbus exception 0x{:02X}", code),
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BridgeError::Config { field, max_len } => {
                write!(f, "{} too long (max {} chars)", field, max_len)
            }
            BridgeError::NotConnected => write!(f, "MQTT session not connected"),
            BridgeError::PayloadTooLarge { len, capacity } => {
                write!(f, "payload of {} bytes exceeds {} byte buffer", len, capacity)
            }
            BridgeError::Encode => write!(f, "JSON encoding failed"),
            BridgeError::Transport(msg) => write!(f, "MQTT transport error: {}", msg),
            BridgeError::Sensor(e) => write!(f, "PZEM error: {}", e),
        }
    }
}

impl std::error::Error for SensorError {}

impl std::error::Error for BridgeError {}
