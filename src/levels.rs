/*!
The level manager owns the on-disk portion of the tree: a level-partitioned
set of table files plus their in-memory handles (Bloom filter, decoded index,
level-local ordinal). Files are named `{level}-{idx}.db` where `idx` grows
monotonically within its level, so a lexicographic file-name scan is all that
recovery needs.

Level 0 receives freshly flushed memtables and its tables may overlap; deeper
levels are produced by compaction. Level `i` is over-full once it holds more
than `l0_target_num * level_ratio^i` tables, which triggers a compaction into
level `i + 1`.

A single mutex serializes every mutation as well as searches and scans; the
disk blocks fetched under it are small and compaction throughput, not
parallelism, is the design point here.

New table files are written to a temporary name, synced, and renamed into
place before any input table is removed, so a crash at any point leaves a
directory that recovery can rebuild from by scanning file names.
*/

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::errors::{MistDbError, MistDbResult};
use crate::filter_policy::BloomFilter;
use crate::key;
use crate::kway;
use crate::tables::{self, footer::SIZE_OF_FOOTER_BYTES, BlockHandle, DataBlock, Footer, IndexBlock};
use crate::types::Entry;
use crate::utils::bufferpool::BufferPool;

/// Suffix for table files.
const TABLE_EXT: &str = "db";

/// The in-memory handle for one table file.
pub(crate) struct TableHandle {
    /// Per-level monotonically increasing ordinal; part of the file name.
    level_idx: u64,

    /// Membership filter over the table's user keys.
    filter: BloomFilter,

    /// The table's decoded index block.
    index: IndexBlock,
}

/// The level-partitioned set of tables.
pub(crate) struct LevelManager {
    dir: PathBuf,
    l0_target_num: usize,
    ratio: usize,
    data_block_size: usize,
    pool: Arc<BufferPool>,

    levels: Mutex<Vec<Vec<TableHandle>>>,
}

/// Crate-only methods
impl LevelManager {
    pub(crate) fn new(
        dir: &Path,
        l0_target_num: usize,
        ratio: usize,
        data_block_size: usize,
        pool: Arc<BufferPool>,
    ) -> LevelManager {
        LevelManager {
            dir: dir.to_path_buf(),
            l0_target_num,
            ratio,
            data_block_size,
            pool,
            levels: Mutex::new(vec![]),
        }
    }

    /**
    Rebuild the level handles by scanning the directory for table files.

    Every data block named by a table's index is decoded so the Bloom filter
    covers all of the table's user keys and the maximum version on disk is
    observed exactly; the restored oracle horizon depends on it.

    Returns the maximum version seen across all tables.
    */
    pub(crate) fn recover(&self) -> MistDbResult<u64> {
        let start = Instant::now();
        let mut levels = self.levels.lock();

        let mut table_files: Vec<String> = vec![];
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(TABLE_EXT) {
                if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                    table_files.push(name.to_string());
                }
            }
        }

        if table_files.is_empty() {
            return Ok(0);
        }
        table_files.sort();

        let mut max_version = 0;
        for file_name in table_files {
            let (level, level_idx) = parse_file_name(&file_name).ok_or_else(|| {
                MistDbError::Corrupt(format!("unrecognized table file name {file_name:?}"))
            })?;

            let bytes = fs::read(self.dir.join(&file_name))?;
            let (index, entries) = decode_table(&bytes, &self.pool)
                .map_err(|error| match error {
                    MistDbError::Corrupt(reason) => {
                        MistDbError::Corrupt(format!("table {file_name}: {reason}"))
                    }
                    other => other,
                })?;

            for entry in &entries {
                max_version = max_version.max(entry.version);
            }
            let filter = BloomFilter::build(&entries);

            while levels.len() <= level {
                levels.push(vec![]);
            }
            levels[level].push(TableHandle {
                level_idx,
                filter,
                index,
            });
        }

        log::info!("level index recover elapsed: {:?}", start.elapsed());
        Ok(max_version)
    }

    /**
    Walk the levels from 0 downward looking for the smallest entry with key
    `>= target` in the first table that can contain the target's user key.
    Within a level, newer tables are consulted first: level-0 tables may
    hold overlapping versions of a key, and the newest flush carries the
    version a reader must see.

    The Bloom filter is probed with the *user part* of the target (filters
    are built from user keys).
    */
    pub(crate) fn search_lower_bound(&self, target: &[u8]) -> Option<Entry> {
        let levels = self.levels.lock();
        let user_key = key::parse_key(target);

        for (level, handles) in levels.iter().enumerate() {
            for table in handles.iter().rev() {
                if !table.filter.contains(user_key) {
                    // Definitely not in this table.
                    continue;
                }

                let block_handle = match table.index.search(target) {
                    Some(handle) => handle,
                    None => continue,
                };

                let block = self.fetch(level, table.level_idx, &block_handle);
                if let Some(entry) = block.lower_bound(target) {
                    return Some(entry);
                }
            }
        }

        None
    }

    /// Collect and merge every entry in `[start, end)` across all levels,
    /// deeper (older) levels feeding the merge first.
    pub(crate) fn scan(&self, start: &[u8], end: &[u8]) -> Vec<Entry> {
        let levels = self.levels.lock();

        let mut streams: Vec<Vec<Entry>> = vec![];
        for (level, handles) in levels.iter().enumerate().rev() {
            for table in handles {
                for block_handle in table.index.scan(start, end) {
                    let block = self.fetch(level, table.level_idx, &block_handle);
                    streams.push(block.scan(start, end));
                }
            }
        }

        kway::merge(streams)
    }

    /// Build a level-0 table from a frozen memtable's entries and persist it
    /// durably.
    pub(crate) fn flush_to_l0(&self, entries: Vec<Entry>) -> MistDbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut levels = self.levels.lock();
        if levels.is_empty() {
            levels.push(vec![]);
        }

        let filter = BloomFilter::build(&entries);
        let (index, bytes) = tables::build(&entries, self.data_block_size, 0, &self.pool)?;

        let level_idx = next_level_idx(&levels, 0);
        self.write_table_file(0, level_idx, &bytes)?;

        levels[0].push(TableHandle {
            level_idx,
            filter,
            index,
        });

        log::debug!("flushed memtable to table 0-{level_idx} ({} bytes)", bytes.len());
        Ok(())
    }

    /**
    Compact any over-full level.

    `discard_below` is the oracle's horizon: versions at or below it are
    collapsed to the newest per user key during the merge. The caller
    computes it once per check; a stale (smaller) horizon only retains more
    versions.
    */
    pub(crate) fn check_and_compact(&self, discard_below: u64) -> MistDbResult<()> {
        let mut levels = self.levels.lock();

        let mut level = 0;
        while level < levels.len() {
            if levels[level].len() > self.l0_target_num * self.ratio.pow(level as u32) {
                if level == 0 {
                    self.compact_l0(&mut levels, discard_below)?;
                } else {
                    self.compact_ln(&mut levels, level, discard_below)?;
                }
            }
            level += 1;
        }
        Ok(())
    }
}

/// Private methods
impl LevelManager {
    /**
    Compact level 0 into level 1.

    The oldest level-0 table seeds the input set; the set grows to a fixpoint
    with every level-0 table overlapping the growing key range, then every
    level-1 table intersecting the union range joins. Merge order is oldest
    first: chosen level-1 tables, then chosen level-0 tables.
    */
    fn compact_l0(
        &self,
        levels: &mut Vec<Vec<TableHandle>>,
        discard_below: u64,
    ) -> MistDbResult<()> {
        let start_time = Instant::now();
        if levels.len() < 2 {
            levels.push(vec![]);
        }
        if levels[0].is_empty() {
            return Ok(());
        }

        // Grow the level-0 overlap set from the oldest table outward.
        let mut chosen_l0 = vec![false; levels[0].len()];
        chosen_l0[0] = true;
        let (mut start, mut end) = table_range(&levels[0][0])?;
        loop {
            let mut changed = false;
            for (position, table) in levels[0].iter().enumerate() {
                if chosen_l0[position] {
                    continue;
                }
                let (table_start, table_end) = table_range(table)?;
                if overlaps(&table_start, &table_end, &start, &end) {
                    chosen_l0[position] = true;
                    if key::compare_keys(&table_start, &start).is_lt() {
                        start = table_start;
                    }
                    if key::compare_keys(&table_end, &end).is_gt() {
                        end = table_end;
                    }
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Every level-1 table intersecting the union range joins the merge.
        let mut chosen_l1 = vec![false; levels[1].len()];
        for (position, table) in levels[1].iter().enumerate() {
            let (table_start, table_end) = table_range(table)?;
            chosen_l1[position] = overlaps(&table_start, &table_end, &start, &end);
        }

        // Merge input, oldest source first: level 1, then level 0.
        let mut streams: Vec<Vec<Entry>> = vec![];
        for (position, table) in levels[1].iter().enumerate() {
            if chosen_l1[position] {
                streams.push(self.fetch(1, table.level_idx, &table.index.data_block).entries);
            }
        }
        for (position, table) in levels[0].iter().enumerate() {
            if chosen_l0[position] {
                streams.push(self.fetch(0, table.level_idx, &table.index.data_block).entries);
            }
        }

        let merged = kway::merge(streams);
        let survivors = discard_stale_entries(merged, discard_below);

        // Write the replacement table before touching the inputs.
        if !survivors.is_empty() {
            let level_idx = next_level_idx(levels, 1);
            let filter = BloomFilter::build(&survivors);
            let (index, bytes) = tables::build(&survivors, self.data_block_size, 1, &self.pool)?;
            self.write_table_file(1, level_idx, &bytes)?;
            levels[1].push(TableHandle {
                level_idx,
                filter,
                index,
            });
        }

        let removed_l0 = remove_chosen(&mut levels[0], &chosen_l0);
        let removed_l1 = remove_chosen(&mut levels[1], &chosen_l1);
        for level_idx in removed_l0 {
            fs::remove_file(self.file_name(0, level_idx))?;
        }
        for level_idx in removed_l1 {
            fs::remove_file(self.file_name(1, level_idx))?;
        }

        log::info!("compact level 0 elapsed: {:?}", start_time.elapsed());
        Ok(())
    }

    /// Compact the front table of level `n` (n >= 1) into level `n + 1`.
    fn compact_ln(
        &self,
        levels: &mut Vec<Vec<TableHandle>>,
        n: usize,
        discard_below: u64,
    ) -> MistDbResult<()> {
        let start_time = Instant::now();
        if levels.len() < n + 2 {
            levels.push(vec![]);
        }
        if levels[n].is_empty() {
            return Ok(());
        }

        let (start, end) = table_range(&levels[n][0])?;

        let mut chosen_next = vec![false; levels[n + 1].len()];
        for (position, table) in levels[n + 1].iter().enumerate() {
            let (table_start, table_end) = table_range(table)?;
            chosen_next[position] = overlaps(&table_start, &table_end, &start, &end);
        }

        // Oldest first: the deeper level's tables, then the one from level n.
        let mut streams: Vec<Vec<Entry>> = vec![];
        for (position, table) in levels[n + 1].iter().enumerate() {
            if chosen_next[position] {
                streams.push(
                    self.fetch(n + 1, table.level_idx, &table.index.data_block)
                        .entries,
                );
            }
        }
        let front = &levels[n][0];
        streams.push(self.fetch(n, front.level_idx, &front.index.data_block).entries);

        let merged = kway::merge(streams);
        let survivors = discard_stale_entries(merged, discard_below);

        if !survivors.is_empty() {
            let level_idx = next_level_idx(levels, n + 1);
            let filter = BloomFilter::build(&survivors);
            let (index, bytes) =
                tables::build(&survivors, self.data_block_size, (n + 1) as u64, &self.pool)?;
            self.write_table_file(n + 1, level_idx, &bytes)?;
            levels[n + 1].push(TableHandle {
                level_idx,
                filter,
                index,
            });
        }

        let removed_front = levels[n].remove(0).level_idx;
        let removed_next = remove_chosen(&mut levels[n + 1], &chosen_next);
        fs::remove_file(self.file_name(n, removed_front))?;
        for level_idx in removed_next {
            fs::remove_file(self.file_name(n + 1, level_idx))?;
        }

        log::info!("compact level {n} elapsed: {:?}", start_time.elapsed());
        Ok(())
    }

    /**
    Read and decode one block of a table file.

    # Panics

    Table files are immutable once written; failing to read one back means
    the on-disk state is gone or corrupt, which the engine cannot continue
    from.
    */
    fn fetch(&self, level: usize, level_idx: u64, handle: &BlockHandle) -> DataBlock {
        let path = self.file_name(level, level_idx);
        match self.try_fetch(&path, handle) {
            Ok(block) => block,
            Err(error) => {
                log::error!("failed to read table {path:?}: {error}");
                panic!("failed to read table {path:?}: {error}");
            }
        }
    }

    fn try_fetch(&self, path: &Path, handle: &BlockHandle) -> MistDbResult<DataBlock> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(handle.offset))?;

        let mut data = vec![0_u8; handle.length as usize];
        file.read_exact(&mut data)?;

        Ok(DataBlock::decode(&data, &self.pool)?)
    }

    /// Write table bytes to a temporary file, sync, and rename into place.
    fn write_table_file(&self, level: usize, level_idx: u64, bytes: &[u8]) -> MistDbResult<()> {
        let final_path = self.file_name(level, level_idx);
        let tmp_path = final_path.with_extension(format!("{TABLE_EXT}.tmp"));

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn file_name(&self, level: usize, level_idx: u64) -> PathBuf {
        self.dir.join(format!("{level}-{level_idx}.{TABLE_EXT}"))
    }
}

/// Decode a whole table file into its index and entries.
fn decode_table(bytes: &[u8], pool: &BufferPool) -> MistDbResult<(IndexBlock, Vec<Entry>)> {
    if bytes.len() < SIZE_OF_FOOTER_BYTES {
        return Err(MistDbError::Corrupt(format!(
            "table file shorter than its footer: {} bytes",
            bytes.len()
        )));
    }

    let footer = Footer::decode(&bytes[bytes.len() - SIZE_OF_FOOTER_BYTES..])?;
    let index_bytes = slice_block(bytes, footer.index_block.offset, footer.index_block.length)?;
    let index = IndexBlock::decode(index_bytes, pool)?;

    let mut entries = vec![];
    for record in &index.entries {
        let block_bytes = slice_block(bytes, record.handle.offset, record.handle.length)?;
        entries.extend(DataBlock::decode(block_bytes, pool)?.entries);
    }

    Ok((index, entries))
}

fn slice_block(bytes: &[u8], offset: u64, length: u64) -> MistDbResult<&[u8]> {
    let start = offset as usize;
    let end = start
        .checked_add(length as usize)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| {
            MistDbError::Corrupt(format!(
                "block handle [{offset}, +{length}) exceeds file of {} bytes",
                bytes.len()
            ))
        })?;
    Ok(&bytes[start..end])
}

/// Parse `{level}-{idx}.db` into its components.
fn parse_file_name(file_name: &str) -> Option<(usize, u64)> {
    let stem = file_name.strip_suffix(&format!(".{TABLE_EXT}"))?;
    let (level, idx) = stem.split_once('-')?;
    Some((level.parse().ok()?, idx.parse().ok()?))
}

/// The next level-local ordinal: one past the maximum in use, or 0.
fn next_level_idx(levels: &[Vec<TableHandle>], level: usize) -> u64 {
    levels
        .get(level)
        .and_then(|handles| handles.iter().map(|table| table.level_idx).max())
        .map(|max| max + 1)
        .unwrap_or(0)
}

/// The `[start_key, end_key]` range covered by a table.
fn table_range(table: &TableHandle) -> MistDbResult<(Vec<u8>, Vec<u8>)> {
    table
        .index
        .key_range()
        .map(|(start, end)| (start.to_vec(), end.to_vec()))
        .ok_or_else(|| MistDbError::Corrupt("table with an empty index".to_string()))
}

/// True iff `[a_start, a_end]` intersects `[b_start, b_end]`.
fn overlaps(a_start: &[u8], a_end: &[u8], b_start: &[u8], b_end: &[u8]) -> bool {
    key::compare_keys(a_start, b_end).is_le() && key::compare_keys(a_end, b_start).is_ge()
}

/// Drop the flagged handles from a level, returning their ordinals.
fn remove_chosen(handles: &mut Vec<TableHandle>, chosen: &[bool]) -> Vec<u64> {
    let mut removed = vec![];
    let mut position = 0;
    handles.retain(|table| {
        let keep = position >= chosen.len() || !chosen[position];
        if !keep {
            removed.push(table.level_idx);
        }
        position += 1;
        keep
    });
    removed
}

/**
Collapse stale versions out of a merged entry run.

Versions above `discard_below` are kept unconditionally; at or below it, only
the newest version of each user key survives. That one version must survive:
a snapshot between `discard_below` and the next-newer version still needs to
see it. When the newest version at or below the horizon is a tombstone,
nothing below the horizon survives at all — no remaining snapshot can
observe the deleted history, and the tombstone itself has nothing left to
shadow.
*/
fn discard_stale_entries(entries: Vec<Entry>, discard_below: u64) -> Vec<Entry> {
    use std::collections::HashMap;

    if discard_below == 0 {
        return entries;
    }

    let mut result = Vec::with_capacity(entries.len());
    let mut newest_at_or_below: HashMap<Vec<u8>, Entry> = HashMap::new();

    for entry in entries {
        let ts = key::parse_ts(&entry.key);
        if ts > discard_below {
            result.push(entry);
            continue;
        }

        let user_key = key::parse_key(&entry.key).to_vec();
        match newest_at_or_below.get(&user_key) {
            Some(kept) if key::parse_ts(&kept.key) >= ts => {}
            _ => {
                newest_at_or_below.insert(user_key, entry);
            }
        }
    }

    result.extend(
        newest_at_or_below
            .into_values()
            .filter(|entry| !entry.tombstone),
    );
    result.sort_by(|a, b| key::compare_keys(&a.key, &b.key));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(key: &str, value: &str) -> Entry {
        Entry::new(
            key.as_bytes().to_vec(),
            value.as_bytes().to_vec(),
            false,
            key::parse_ts(key.as_bytes()),
        )
    }

    fn sorted(mut entries: Vec<Entry>) -> Vec<Entry> {
        entries.sort_by(|a, b| key::compare_keys(&a.key, &b.key));
        entries
    }

    fn manager(dir: &Path) -> LevelManager {
        LevelManager::new(dir, 5, 10, 64, Arc::new(BufferPool::new()))
    }

    #[test]
    fn flush_then_search() {
        let dir = tempfile::tempdir().unwrap();
        let lm = manager(dir.path());

        lm.flush_to_l0(sorted(vec![
            entry("apple@1", "red"),
            entry("banana@2", "yellow"),
            entry("cherry@3", "dark"),
        ]))
        .unwrap();

        let found = lm.search_lower_bound(b"banana@5").unwrap();
        assert_eq!(found.key, b"banana@2");
        assert_eq!(found.value, b"yellow");

        assert!(lm.search_lower_bound(b"zucchini@5").is_none());
    }

    #[test]
    fn flush_assigns_increasing_ordinals() {
        let dir = tempfile::tempdir().unwrap();
        let lm = manager(dir.path());

        lm.flush_to_l0(sorted(vec![entry("a@1", "1")])).unwrap();
        lm.flush_to_l0(sorted(vec![entry("b@2", "2")])).unwrap();

        assert!(dir.path().join("0-0.db").exists());
        assert!(dir.path().join("0-1.db").exists());
    }

    #[test]
    fn newest_l0_table_wins_a_scan() {
        let dir = tempfile::tempdir().unwrap();
        let lm = manager(dir.path());

        lm.flush_to_l0(sorted(vec![entry("k@5", "old")])).unwrap();
        lm.flush_to_l0(sorted(vec![entry("k@5", "new")])).unwrap();

        let merged = lm.scan(b"a", b"z");
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].value, b"new");
    }

    #[test]
    fn recover_rebuilds_handles_and_max_version() {
        let dir = tempfile::tempdir().unwrap();
        {
            let lm = manager(dir.path());
            lm.flush_to_l0(sorted(vec![
                entry("alpha@3", "a"),
                entry("beta@9", "b"),
            ]))
            .unwrap();
            lm.flush_to_l0(sorted(vec![entry("gamma@7", "c")])).unwrap();
        }

        let lm = manager(dir.path());
        let max_version = lm.recover().unwrap();
        assert_eq!(max_version, 9);

        let found = lm.search_lower_bound(b"beta@9").unwrap();
        assert_eq!(found.value, b"b");
        let found = lm.search_lower_bound(b"gamma@9").unwrap();
        assert_eq!(found.value, b"c");
    }

    #[test]
    fn compaction_moves_l0_into_l1() {
        let dir = tempfile::tempdir().unwrap();
        let lm = LevelManager::new(dir.path(), 1, 2, 64, Arc::new(BufferPool::new()));

        lm.flush_to_l0(sorted(vec![entry("a@1", "1"), entry("b@2", "2")]))
            .unwrap();
        lm.flush_to_l0(sorted(vec![entry("a@3", "3"), entry("c@4", "4")]))
            .unwrap();

        // Two tables in L0 with a target of one: compaction must run.
        lm.check_and_compact(0).unwrap();

        let levels = lm.levels.lock();
        assert_eq!(levels[0].len(), 0);
        assert_eq!(levels[1].len(), 1);
        drop(levels);

        assert!(dir.path().join("1-0.db").exists());
        assert!(!dir.path().join("0-0.db").exists());
        assert!(!dir.path().join("0-1.db").exists());

        // All versions survive with a zero discard horizon.
        let merged = lm.scan(b"a", b"z");
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn compaction_discards_stale_versions() {
        // Both tables carry bracketing keys so their ranges overlap and the
        // two versions of "k" meet in one merge.
        let older = sorted(vec![entry("a@10", "pad"), entry("k@10", "ten")]);
        let newer = sorted(vec![entry("k@30", "thirty"), entry("z@30", "pad")]);

        // Horizon at 20: k@30 is above it and survives unconditionally;
        // k@10 is the newest version at or below it and must survive for
        // snapshots reading between 10 and 30.
        let dir = tempfile::tempdir().unwrap();
        let lm = LevelManager::new(dir.path(), 1, 2, 64, Arc::new(BufferPool::new()));
        lm.flush_to_l0(older.clone()).unwrap();
        lm.flush_to_l0(newer.clone()).unwrap();
        lm.check_and_compact(20).unwrap();

        let keys: Vec<Vec<u8>> = lm.scan(b"a", b"zz").iter().map(|e| e.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                b"a@10".to_vec(),
                b"k@30".to_vec(),
                b"k@10".to_vec(),
                b"z@30".to_vec()
            ]
        );

        // Horizon past every version: only the newest version per user key
        // survives.
        let dir = tempfile::tempdir().unwrap();
        let lm = LevelManager::new(dir.path(), 1, 2, 64, Arc::new(BufferPool::new()));
        lm.flush_to_l0(older).unwrap();
        lm.flush_to_l0(newer).unwrap();
        lm.check_and_compact(40).unwrap();

        let keys: Vec<Vec<u8>> = lm.scan(b"a", b"zz").iter().map(|e| e.key.clone()).collect();
        assert_eq!(
            keys,
            vec![b"a@10".to_vec(), b"k@30".to_vec(), b"z@30".to_vec()]
        );
    }

    #[test]
    fn discard_keeps_history_continuity() {
        let entries = sorted(vec![
            entry("user@10", "created"),
            entry("user@30", "updated"),
            entry("other@5", "x"),
        ]);

        let kept = discard_stale_entries(entries, 20);
        let keys: Vec<Vec<u8>> = kept.iter().map(|e| e.key.clone()).collect();

        // user@30 is above the horizon; user@10 is the newest at or below it
        // and must be retained for snapshots reading between 10 and 30.
        assert_eq!(
            keys,
            vec![b"other@5".to_vec(), b"user@30".to_vec(), b"user@10".to_vec()]
        );
    }

    #[test]
    fn stale_tombstone_removes_its_whole_history() {
        let deleted = Entry::new(b"gone@20".to_vec(), vec![], true, 20);
        let entries = sorted(vec![
            entry("gone@10", "value"),
            deleted,
            entry("kept@5", "x"),
        ]);

        // Horizon past the tombstone: the deletion and everything it shadows
        // vanish together.
        let kept = discard_stale_entries(entries, 30);
        let keys: Vec<Vec<u8>> = kept.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![b"kept@5".to_vec()]);
    }

    #[test]
    fn recent_tombstone_is_retained() {
        let deleted = Entry::new(b"gone@20".to_vec(), vec![], true, 20);
        let entries = sorted(vec![entry("gone@10", "value"), deleted]);

        // Horizon below the tombstone: it may still be needed by snapshots
        // and survives unconditionally; gone@10 is the newest at or below
        // the horizon and survives too.
        let kept = discard_stale_entries(entries, 15);
        let keys: Vec<Vec<u8>> = kept.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![b"gone@20".to_vec(), b"gone@10".to_vec()]);
    }

    #[test]
    fn zero_horizon_discards_nothing() {
        let entries = sorted(vec![entry("a@1", "1"), entry("a@2", "2")]);
        assert_eq!(discard_stale_entries(entries.clone(), 0), entries);
    }
}
