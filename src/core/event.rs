//! Event model: the typed, prioritized, cancellable unit of I/O work.
//!
//! Hosts construct an [`Event`], hand it to the isolation manager, and never
//! touch it again; after enqueue the only mutations are metadata stamps made
//! by the owning worker and the cancellation token. Structured fields that
//! the original design smuggled through a string map (timestamps, statuses,
//! sizes) live in [`EventMetadata`] as typed entries; a string overflow map
//! remains for caller-supplied extensions.
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Kind of work an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Incoming audio device data.
    AudioIn,
    /// Outgoing audio device data.
    AudioOut,
    /// Incoming MIDI messages.
    MidiIn,
    /// Outgoing MIDI messages.
    MidiOut,
    /// User interface input.
    UserInput,
    /// File read request.
    FileRead,
    /// File write request.
    FileWrite,
    /// Network transfer.
    Network,
    /// GPU texture sharing.
    TextureShare,
    /// Cache refresh.
    CacheUpdate,
    /// Metadata refresh.
    MetadataUpdate,
}

impl EventType {
    /// All event types, in routing-table order.
    pub const ALL: [EventType; 11] = [
        EventType::AudioIn,
        EventType::AudioOut,
        EventType::MidiIn,
        EventType::MidiOut,
        EventType::UserInput,
        EventType::FileRead,
        EventType::FileWrite,
        EventType::Network,
        EventType::TextureShare,
        EventType::CacheUpdate,
        EventType::MetadataUpdate,
    ];

    /// Whether events of this type may be processed in parallel within a
    /// batch. Device streams must preserve temporal order.
    pub fn is_parallelizable(self) -> bool {
        !matches!(
            self,
            EventType::AudioIn | EventType::AudioOut | EventType::MidiIn | EventType::MidiOut
        )
    }

    /// Parallelism cap inside one batch group. Order-sensitive types run
    /// one at a time; user input is capped at 2; everything else is
    /// unbounded within the batch.
    pub fn parallelism_limit(self) -> Option<usize> {
        if !self.is_parallelizable() {
            Some(1)
        } else if self == EventType::UserInput {
            Some(2)
        } else {
            None
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::AudioIn => "audio-in",
            EventType::AudioOut => "audio-out",
            EventType::MidiIn => "midi-in",
            EventType::MidiOut => "midi-out",
            EventType::UserInput => "user-input",
            EventType::FileRead => "file-read",
            EventType::FileWrite => "file-write",
            EventType::Network => "network",
            EventType::TextureShare => "texture-share",
            EventType::CacheUpdate => "cache-update",
            EventType::MetadataUpdate => "metadata-update",
        };
        write!(f, "{}", name)
    }
}

/// Priority band of an event, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventPriority {
    /// Must be handled before anything else.
    Critical = 0,
    /// Latency-sensitive host interaction.
    High = 1,
    /// Regular background work.
    Medium = 2,
    /// Deferrable housekeeping.
    Low = 3,
}

impl EventPriority {
    /// All priority bands, most urgent first.
    pub const ALL: [EventPriority; 4] = [
        EventPriority::Critical,
        EventPriority::High,
        EventPriority::Medium,
        EventPriority::Low,
    ];

    /// Index into per-priority structures.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventPriority::Critical => "critical",
            EventPriority::High => "high",
            EventPriority::Medium => "medium",
            EventPriority::Low => "low",
        };
        write!(f, "{}", name)
    }
}

/// Processing status stamped onto an event by its owning worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    /// Enqueued, not yet taken.
    Pending,
    /// Taken by a worker.
    Processing,
    /// Processor returned success.
    Success,
    /// Processor returned an error.
    Failed,
}

/// Typed metadata entries plus a string overflow map for caller extensions.
#[derive(Debug, Clone, Default)]
pub struct EventMetadata {
    /// When the manager accepted the event.
    pub queued_at: Option<Instant>,
    /// When a worker began processing it.
    pub processing_started_at: Option<Instant>,
    /// Current processing status.
    pub status: Option<EventStatus>,
    /// Submitting subsystem, as reported by the manager.
    pub source: Option<String>,
    /// Payload size recorded at enqueue, or a caller-declared file size.
    pub data_size: Option<u64>,
    /// Error message recorded on failure.
    pub error: Option<String>,
    /// Caller-supplied extension entries.
    pub extra: HashMap<String, String>,
}

/// Behavior flags for file-typed events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFlags {
    /// Keep a backup of the target until the write commits.
    pub create_backup: bool,
    /// Allow replacing an existing destination.
    pub overwrite: bool,
    /// Recurse into subdirectories when enumerating.
    pub recursive: bool,
}

/// A unit of I/O work submitted by the host.
#[derive(Debug)]
pub struct Event {
    /// Stable opaque identifier.
    pub id: String,
    /// Kind of work.
    pub event_type: EventType,
    /// Priority band.
    pub priority: EventPriority,
    /// Opaque payload bytes.
    pub payload: Option<Vec<u8>>,
    /// Typed metadata plus overflow map.
    pub metadata: EventMetadata,
    /// Source path for file operations.
    pub source_path: Option<PathBuf>,
    /// Destination path for copy operations.
    pub dest_path: Option<PathBuf>,
    /// Behavior flags.
    pub flags: EventFlags,
    /// Glob pattern for enumeration.
    pub search_pattern: Option<String>,
    /// When the event was constructed.
    pub created_at: Instant,
    /// How many times processing has been attempted and failed.
    pub retry_count: u32,
    /// Retry ceiling.
    pub max_retries: u32,
    /// How long the event stays eligible for processing.
    pub timeout: Duration,
    /// Cooperative cancellation handle, shared with the manager.
    pub cancel: CancellationToken,
}

impl Event {
    /// Create an event with a fresh id and default retry/timeout policy.
    pub fn new(event_type: EventType, priority: EventPriority) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            priority,
            payload: None,
            metadata: EventMetadata::default(),
            source_path: None,
            dest_path: None,
            flags: EventFlags::default(),
            search_pattern: None,
            created_at: Instant::now(),
            retry_count: 0,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.metadata.data_size = Some(payload.len() as u64);
        self.payload = Some(payload);
        self
    }

    /// Set the source path.
    pub fn with_source_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// Set the destination path.
    pub fn with_dest_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.dest_path = Some(path.into());
        self
    }

    /// Set the behavior flags.
    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the enumeration pattern.
    pub fn with_search_pattern<S: Into<String>>(mut self, pattern: S) -> Self {
        self.search_pattern = Some(pattern.into());
        self
    }

    /// Declare the size of the data behind this event (e.g. the on-disk file
    /// for a read) without attaching a payload.
    pub fn with_data_size(mut self, size: u64) -> Self {
        self.metadata.data_size = Some(size);
        self
    }

    /// Override the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the eligibility timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a caller extension metadata entry.
    pub fn with_extra<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }

    /// Whether the cancellation handle has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Whether the event may be attempted again after a failure.
    pub fn is_retryable(&self) -> bool {
        self.retry_count < self.max_retries
            && !self.is_cancelled()
            && self.created_at.elapsed() <= self.timeout
    }

    /// Payload length, zero when absent.
    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, |p| p.len())
    }
}
