// Classification results produced by the line classifier

/// What a single log line means to the aggregator
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// Startup line naming the host that produced this log
    HostIdentity(String),
    /// A completed or failed client-side transfer
    Transfer(TransferEvent),
    /// A transfer whose direction is not a read: the log belongs to a server
    ServerSide,
    /// A line that matched a trigger but whose fields could not be extracted
    Malformed(String),
    /// Anything else
    Irrelevant,
}

/// One transfer recorded by the traffic generator
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    /// Unix timestamp of the line in seconds, when the line carries one
    pub timestamp: Option<f64>,
    /// Payload size requested by the transfer
    pub bytes: u64,
    pub outcome: TransferOutcome,
}

/// How a transfer ended
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Success(TransferTiming),
    Error { code: String },
}

/// Timing fields of a completed transfer, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferTiming {
    pub command: f64,
    pub response: f64,
    pub first_byte: f64,
    pub last_byte: f64,
    pub checksum: f64,
}

impl TransferTiming {
    /// Time from issuing the command to receiving the first byte
    pub fn first_byte_latency(&self) -> f64 {
        self.first_byte - self.command
    }

    /// Time from issuing the command to receiving the last byte
    pub fn last_byte_latency(&self) -> f64 {
        self.last_byte - self.command
    }
}
