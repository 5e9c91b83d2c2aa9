//! Configuration Module - Collector Tuning Parameters
//!
//! Manages the tunables of the mark-region collector and the inflated
//! header table. Geometry (block and line size) is fixed at compile time;
//! everything that shapes growth and collection pressure is configurable.

use crate::object::Address;

/// Size of a region block in bytes (32KB)
pub const BLOCK_SIZE: usize = 32 * KB;

/// Size of a line inside a block in bytes
pub const LINE_SIZE: usize = 128;

/// Number of lines per block
pub const LINES_PER_BLOCK: usize = BLOCK_SIZE / LINE_SIZE;

/// Minimum object alignment (bytes)
pub const OBJECT_ALIGNMENT: usize = 8;

/// First address handed out for region chunks
pub const REGION_BASE: Address = Address::new(0x1000_0000);

/// First address handed out for young objects
///
/// Young storage belongs to the young generation; the collector only needs
/// its addresses to be disjoint from the region.
pub const YOUNG_BASE: Address = Address::new(0x0100_0000);

/// Largest number of inflated headers the compact header index can name
pub const INFLATED_HEADER_INDEX_LIMIT: u64 = u32::MAX as u64 + 1;

/// Main configuration for the Immix collector
///
/// # Examples
///
/// ```rust
/// use immix::ImmixConfig;
///
/// let config = ImmixConfig {
///     blocks_per_chunk: 4,
///     diagnostics_enabled: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ImmixConfig {
    /// Number of blocks appended each time the region grows by one chunk
    ///
    /// Default: 32 (1MB chunks)
    pub blocks_per_chunk: usize,

    /// Number of chunks the region may hold before further growth tells the
    /// allocating caller to schedule a full collection
    ///
    /// The allocation that triggers growth still succeeds.
    /// Default: 1
    pub chunk_collection_threshold: usize,

    /// Growth budget consumed by the chunk-added hook
    ///
    /// Every appended chunk decrements a counter; when it reaches zero the
    /// counter is reset to this value and a full collection is scheduled.
    /// Default: 10
    pub chunks_before_collection: i64,

    /// Largest object the region will allocate
    ///
    /// Default: BLOCK_SIZE - LINE_SIZE
    pub max_object_size: usize,

    /// Copy young objects reached by a full trace into the region
    ///
    /// Default: true
    pub promote_on_trace: bool,

    /// Number of slots per inflated header chunk
    ///
    /// Default: 1024
    pub inflated_header_chunk_size: usize,

    /// Hard ceiling on inflated header indices
    ///
    /// Exceeding it is a fatal invariant violation.
    /// Default: 2^32
    pub inflated_header_limit: u64,

    /// Report diagnostics snapshots to the configured sink
    ///
    /// Default: false
    pub diagnostics_enabled: bool,

    /// Echo structured GC events to the console
    ///
    /// Default: false
    pub verbose: bool,
}

impl Default for ImmixConfig {
    fn default() -> Self {
        ImmixConfig {
            // Region growth
            blocks_per_chunk: 32,
            chunk_collection_threshold: 1,
            chunks_before_collection: 10,
            max_object_size: BLOCK_SIZE - LINE_SIZE,

            // Tracing
            promote_on_trace: true,

            // Inflated headers
            inflated_header_chunk_size: 1024,
            inflated_header_limit: INFLATED_HEADER_INDEX_LIMIT,

            // Debug
            diagnostics_enabled: false,
            verbose: false,
        }
    }
}

impl ImmixConfig {
    /// Validate configuration
    ///
    /// Checks if all values are in valid ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.blocks_per_chunk == 0 {
            return Err(ConfigError::InvalidChunkSize(
                "blocks_per_chunk must be > 0".to_string(),
            ));
        }

        if self.chunks_before_collection <= 0 {
            return Err(ConfigError::InvalidGrowthBudget(
                "chunks_before_collection must be > 0".to_string(),
            ));
        }

        if self.max_object_size == 0 || self.max_object_size > BLOCK_SIZE {
            return Err(ConfigError::InvalidObjectSize(format!(
                "max_object_size must be between 1 and {}",
                BLOCK_SIZE
            )));
        }

        if self.inflated_header_chunk_size == 0 {
            return Err(ConfigError::InvalidHeaderTable(
                "inflated_header_chunk_size must be > 0".to_string(),
            ));
        }

        if self.inflated_header_limit == 0
            || self.inflated_header_limit > INFLATED_HEADER_INDEX_LIMIT
        {
            return Err(ConfigError::InvalidHeaderTable(format!(
                "inflated_header_limit must be between 1 and {}",
                INFLATED_HEADER_INDEX_LIMIT
            )));
        }

        Ok(())
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with environment variables:
    /// - IMMIX_BLOCKS_PER_CHUNK
    /// - IMMIX_CHUNKS_BEFORE_COLLECTION
    /// - IMMIX_PROMOTE_ON_TRACE
    /// - IMMIX_DIAGNOSTICS
    /// - IMMIX_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("IMMIX_BLOCKS_PER_CHUNK") {
            if let Ok(blocks) = val.parse::<usize>() {
                config.blocks_per_chunk = blocks;
            }
        }

        if let Ok(val) = std::env::var("IMMIX_CHUNKS_BEFORE_COLLECTION") {
            if let Ok(chunks) = val.parse::<i64>() {
                config.chunks_before_collection = chunks;
            }
        }

        if let Ok(val) = std::env::var("IMMIX_PROMOTE_ON_TRACE") {
            config.promote_on_trace = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("IMMIX_DIAGNOSTICS") {
            config.diagnostics_enabled = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("IMMIX_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }

    /// Bytes covered by one chunk
    pub fn chunk_bytes(&self) -> usize {
        self.blocks_per_chunk * BLOCK_SIZE
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Invalid growth budget: {0}")]
    InvalidGrowthBudget(String),

    #[error("Invalid object size: {0}")]
    InvalidObjectSize(String),

    #[error("Invalid inflated header table: {0}")]
    InvalidHeaderTable(String),
}

const KB: usize = 1024;

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}
