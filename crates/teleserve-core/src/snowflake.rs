//! 53-bit snowflake ID generator.
//!
//! IDs fit in a JavaScript `Number` (`2^53 - 1`), so they survive a round trip
//! through a browser without being stringified:
//!
//! ```text
//!  52                      12 11      8 7        0
//! ┌─────────────────────────┬──────────┬──────────┐
//! │ timestamp (41 bits, ms) │ machine  │ sequence │
//! └─────────────────────────┴──────────┴──────────┘
//! ```
//!
//! The timestamp counts milliseconds since [`DEFAULT_EPOCH`]
//! (2024-01-01T00:00:00Z), which lasts roughly 69 years.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::info;

use crate::error::{SnowflakeError, SnowflakeResult};

pub const TIMESTAMP_BITS: u32 = 41;
pub const MACHINE_BITS: u32 = 4;
pub const SEQUENCE_BITS: u32 = 8;

pub const MAX_MACHINE_ID: u16 = (1 << MACHINE_BITS) - 1;
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

const MACHINE_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + MACHINE_BITS;

/// 2024-01-01T00:00:00Z in Unix milliseconds.
pub const DEFAULT_EPOCH: u64 = 1_704_067_200_000;

/// Clock used by the generator, swappable in tests.
type ClockFn = Box<dyn Fn() -> u64 + Send + Sync>;

struct State {
    last_timestamp: u64,
    sequence: u16,
}

/// A thread-safe snowflake generator for one machine id.
pub struct SnowflakeGenerator {
    machine_id: u16,
    epoch: u64,
    clock: ClockFn,
    state: Mutex<State>,
}

impl std::fmt::Debug for SnowflakeGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeGenerator")
            .field("machine_id", &self.machine_id)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl SnowflakeGenerator {
    /// Creates a generator using [`DEFAULT_EPOCH`].
    pub fn new(machine_id: u16) -> SnowflakeResult<Self> {
        Self::with_epoch(machine_id, DEFAULT_EPOCH)
    }

    /// Creates a generator with a custom epoch in Unix milliseconds.
    pub fn with_epoch(machine_id: u16, epoch: u64) -> SnowflakeResult<Self> {
        Self::with_clock(machine_id, epoch, system_millis)
    }

    fn with_clock<F>(machine_id: u16, epoch: u64, clock: F) -> SnowflakeResult<Self>
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        if machine_id > MAX_MACHINE_ID {
            return Err(SnowflakeError::InvalidMachineId(machine_id));
        }
        Ok(Self {
            machine_id,
            epoch,
            clock: Box::new(clock),
            state: Mutex::new(State {
                last_timestamp: 0,
                sequence: 0,
            }),
        })
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id
    }

    /// Generates the next ID.
    ///
    /// Fails if the clock moved backwards since the previous ID. When the
    /// 256 sequence numbers of a millisecond are exhausted, spins until the
    /// next millisecond.
    pub fn generate(&self) -> SnowflakeResult<u64> {
        let mut state = self.state.lock();
        let mut timestamp = (self.clock)();

        if timestamp < state.last_timestamp {
            return Err(SnowflakeError::ClockMovedBackwards(
                state.last_timestamp - timestamp,
            ));
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                while timestamp <= state.last_timestamp {
                    std::hint::spin_loop();
                    timestamp = (self.clock)();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp = timestamp;

        Ok((timestamp.saturating_sub(self.epoch) << TIMESTAMP_SHIFT)
            | (u64::from(self.machine_id) << MACHINE_SHIFT)
            | u64::from(state.sequence))
    }

    /// Splits an ID generated with this generator's epoch into its parts.
    pub fn decompose(&self, id: u64) -> Decomposed {
        decompose_with_epoch(id, self.epoch)
    }
}

/// The fields packed into a snowflake ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposed {
    /// Unix milliseconds.
    pub timestamp: u64,
    pub machine_id: u16,
    pub sequence: u16,
}

/// Splits an ID generated with [`DEFAULT_EPOCH`].
pub fn decompose(id: u64) -> Decomposed {
    decompose_with_epoch(id, DEFAULT_EPOCH)
}

fn decompose_with_epoch(id: u64, epoch: u64) -> Decomposed {
    Decomposed {
        timestamp: (id >> TIMESTAMP_SHIFT) + epoch,
        machine_id: ((id >> MACHINE_SHIFT) & u64::from(MAX_MACHINE_ID)) as u16,
        sequence: (id & u64::from(MAX_SEQUENCE)) as u16,
    }
}

// =============================================================================
// Global generator
// =============================================================================

static GENERATOR: OnceLock<SnowflakeGenerator> = OnceLock::new();

/// Initializes the process-wide generator.
///
/// Without an explicit id, `pid % 16` is used so that several worker
/// processes on one host do not collide.
pub fn init_snowflake(machine_id: Option<u16>) -> SnowflakeResult<u16> {
    let machine_id = match machine_id {
        Some(id) => id,
        None => {
            let pid = std::process::id();
            let id = (pid % (u32::from(MAX_MACHINE_ID) + 1)) as u16;
            info!(machine_id = id, pid = pid, "Auto-assigned snowflake machine id");
            id
        }
    };
    let generator = SnowflakeGenerator::new(machine_id)?;
    GENERATOR
        .set(generator)
        .map_err(|_| SnowflakeError::AlreadyInitialized)?;
    Ok(machine_id)
}

/// Returns whether [`init_snowflake`] has run.
pub fn is_initialized() -> bool {
    GENERATOR.get().is_some()
}

/// Generates an ID from the process-wide generator.
pub fn generate_id() -> SnowflakeResult<u64> {
    GENERATOR
        .get()
        .ok_or(SnowflakeError::NotInitialized)?
        .generate()
}
