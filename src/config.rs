/*!
This module holds the configuration options that can be passed when opening a
database.

Every numeric field falls back to its default at open time when it is left at
zero (or otherwise non-positive), so `Config { l0_target_num: 2, ..Default::default() }`
is the expected way to override a single knob.
*/

const KB: usize = 1024;
const MB: usize = 1024 * KB;

/// Holds options to control database behavior.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// The maximum number of levels in the skip list backing the memtable.
    ///
    /// **This defaults to 9.**
    pub skiplist_max_level: usize,

    /// The probability used for the skip list's level coin flips.
    ///
    /// **This defaults to 0.5.**
    pub skiplist_p: f64,

    /**
    The estimated byte size at which the memtable is frozen and queued for a
    flush to level 0.

    **This defaults to 4 MiB.**
    */
    pub memtable_byte_threshold: usize,

    /**
    The maximum number of frozen memtables that may be queued for flushing.
    Writers block once the queue is full.

    **This defaults to 10.**
    */
    pub immutable_buffer: usize,

    /// The byte threshold at which a table data block is cut.
    ///
    /// **This defaults to 4 KiB.**
    pub data_block_byte_threshold: usize,

    /// The number of level-0 tables that triggers compaction.
    ///
    /// **This defaults to 5.**
    pub l0_target_num: usize,

    /// The table-count multiplier between adjacent levels.
    ///
    /// **This defaults to 10.**
    pub level_ratio: usize,

    /// The unix permission mode used when creating the database directory.
    ///
    /// **This defaults to 0o755.**
    pub file_mode: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            skiplist_max_level: 9,
            skiplist_p: 0.5,
            memtable_byte_threshold: 4 * MB,
            immutable_buffer: 10,
            data_block_byte_threshold: 4 * KB,
            l0_target_num: 5,
            level_ratio: 10,
            file_mode: 0o755,
        }
    }
}

/// Crate-only methods
impl Config {
    /// Replace unset (non-positive) fields with their defaults.
    pub(crate) fn validate(&mut self) {
        let defaults = Config::default();
        if self.skiplist_max_level == 0 {
            self.skiplist_max_level = defaults.skiplist_max_level;
        }
        if self.skiplist_p <= 0.0 {
            self.skiplist_p = defaults.skiplist_p;
        }
        if self.memtable_byte_threshold == 0 {
            self.memtable_byte_threshold = defaults.memtable_byte_threshold;
        }
        if self.immutable_buffer == 0 {
            self.immutable_buffer = defaults.immutable_buffer;
        }
        if self.data_block_byte_threshold == 0 {
            self.data_block_byte_threshold = defaults.data_block_byte_threshold;
        }
        if self.l0_target_num == 0 {
            self.l0_target_num = defaults.l0_target_num;
        }
        if self.level_ratio == 0 {
            self.level_ratio = defaults.level_ratio;
        }
        if self.file_mode == 0 {
            self.file_mode = defaults.file_mode;
        }
    }
}
